//! Plan finalization.
//!
//! Turns each optimized query block into a chain of wrapper nodes over its
//! join tree: restriction, grouping, select list, duplicate elimination,
//! sort, row count and a final projection dropping generated columns. The
//! cursor's ORDER BY, OFFSET and FETCH move into the tree here.

use crate::binder::{conjuncts, Numbering};
use crate::optimizer::{sort_cost, CostEstimate};
use crate::tree::{
    DistinctNode, GroupByNode, OrderByList, OrderByNode, Predicate, PredicateList, ProjectRestrictNode, ResultColumn,
    ResultColumnList, ResultSetNode, RowCountNode, SelectNode, SetOp, Statement, ValueNode, ValuesNode,
};

use super::error::{PlanError, PlanResult};

/// Cursor clauses applied above the top query block.
#[derive(Debug, Default)]
struct Clauses {
    order_by: Option<OrderByList>,
    offset: Option<ValueNode>,
    fetch: Option<ValueNode>,
}

/// Finalize every query block of an optimized statement.
pub fn finalize(statement: &mut Statement, numbering: &mut Numbering) -> PlanResult<()> {
    let mut finalizer = Finalizer { numbering };
    match statement {
        Statement::Cursor(cursor) => {
            let clauses = Clauses {
                order_by: cursor.order_by.take().filter(|o| !o.is_empty()),
                offset: cursor.offset.take(),
                fetch: cursor.fetch.take(),
            };
            let query = std::mem::replace(&mut cursor.query, placeholder());
            cursor.query = finalizer.query(query, clauses)?;
        }
        other => {
            let source = other.query_mut();
            let query = std::mem::replace(source, placeholder());
            *source = finalizer.query(query, Clauses::default())?;
        }
    }
    Ok(())
}

fn placeholder() -> ResultSetNode {
    ResultSetNode::Values(ValuesNode::new(Vec::new()))
}

fn with_cost(estimate: Option<CostEstimate>, extra: f64, rows: Option<f64>) -> Option<CostEstimate> {
    estimate.map(|c| {
        let rows = rows.unwrap_or(c.row_count);
        CostEstimate::new(c.cost + extra, rows, rows)
    })
}

fn sorted(estimate: Option<CostEstimate>) -> Option<CostEstimate> {
    let rows = estimate.map(|c| c.row_count).unwrap_or_default();
    with_cost(estimate, sort_cost(rows), None)
}

/// Aggregates of `expr` not already in `out`.
fn collect_aggregates(expr: &ValueNode, out: &mut Vec<ValueNode>) {
    expr.walk(&mut |node| {
        if matches!(node, ValueNode::Aggregate(_)) && !out.iter().any(|a| a.is_equivalent(node)) {
            out.push(node.clone());
        }
    });
}

/// Whether the block reads one base table and projects every key column of
/// one of its unique indexes, so its rows are already distinct.
fn projects_unique_key(plan: &ResultSetNode, columns: &ResultColumnList) -> bool {
    let table = match plan {
        ResultSetNode::BaseTable(table) => table,
        ResultSetNode::ProjectRestrict(p) => match p.child.as_ref() {
            ResultSetNode::BaseTable(table) => table,
            _ => return false,
        },
        _ => return false,
    };
    let (Some(descriptor), Some(table_number)) = (&table.descriptor, table.table_number) else {
        return false;
    };
    let projected: Vec<usize> = columns
        .iter()
        .filter(|c| !c.generated)
        .filter_map(|c| c.expression.as_column()?.source)
        .filter(|s| s.table_number == table_number)
        .map(|s| s.column_position)
        .collect();
    descriptor
        .indexes
        .iter()
        .filter(|index| index.unique)
        .any(|index| descriptor.index_key_positions(index).iter().all(|k| projected.contains(k)))
}

struct Finalizer<'n> {
    numbering: &'n mut Numbering,
}

impl Finalizer<'_> {
    fn query(&mut self, node: ResultSetNode, clauses: Clauses) -> PlanResult<ResultSetNode> {
        match node {
            ResultSetNode::Select(select) => self.select(select, clauses),
            ResultSetNode::SetOperator(mut set) => {
                let left = std::mem::replace(set.left.as_mut(), placeholder());
                *set.left = self.query(left, Clauses::default())?;
                let right = std::mem::replace(set.right.as_mut(), placeholder());
                *set.right = self.query(right, Clauses::default())?;
                let distinct = set.op == SetOp::Union && !set.all;
                let cost = set.cost;
                let mut node = ResultSetNode::SetOperator(set);
                if distinct {
                    node = ResultSetNode::Distinct(DistinctNode { child: Box::new(node), cost: sorted(cost) });
                }
                Ok(self.wrap_clauses(node, clauses, false))
            }
            mut other => {
                self.nested(&mut other)?;
                Ok(self.wrap_clauses(other, clauses, false))
            }
        }
    }

    /// Finalize subqueries inside an expression.
    fn expression(&mut self, value: &mut ValueNode) -> PlanResult<()> {
        match value {
            ValueNode::Subquery(subquery) => {
                if let Some(operand) = subquery.operand.as_deref_mut() {
                    self.expression(operand)?;
                }
                let body = std::mem::replace(subquery.query.as_mut(), placeholder());
                *subquery.query = self.query(body, Clauses::default())?;
            }
            other => {
                for child in other.children_mut() {
                    self.expression(child)?;
                }
            }
        }
        Ok(())
    }

    /// Finalize derived table bodies and expression subqueries below a
    /// join tree node.
    fn nested(&mut self, node: &mut ResultSetNode) -> PlanResult<()> {
        match node {
            ResultSetNode::Subquery(derived) => {
                let body = std::mem::replace(derived.query.as_mut(), placeholder());
                *derived.query = self.query(body, Clauses::default())?;
            }
            ResultSetNode::Values(values) => {
                for cell in values.rows.iter_mut().flatten() {
                    self.expression(cell)?;
                }
            }
            ResultSetNode::Join(join) => {
                for predicate in join.predicates.iter_mut() {
                    self.expression(&mut predicate.expr)?;
                }
                self.nested(&mut join.left)?;
                self.nested(&mut join.right)?;
            }
            ResultSetNode::ProjectRestrict(p) => {
                for predicate in p.restriction.iter_mut() {
                    self.expression(&mut predicate.expr)?;
                }
                self.nested(&mut p.child)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn select(&mut self, mut select: SelectNode, clauses: Clauses) -> PlanResult<ResultSetNode> {
        for column in select.result_columns.iter_mut() {
            self.expression(&mut column.expression)?;
        }
        for predicate in select.predicates.iter_mut() {
            self.expression(&mut predicate.expr)?;
        }
        for expr in select.group_by.iter_mut().chain(select.having.iter_mut()) {
            self.expression(expr)?;
        }

        let grouped = select.is_grouped();
        let SelectNode { result_columns, predicates, group_by, having, distinct, level, plan, sort_avoided, from_list, .. } =
            select;
        let mut node = match plan {
            Some(plan) => *plan,
            None if from_list.is_empty() => {
                let mut values = ValuesNode::new(vec![Vec::new()]);
                values.cost = Some(CostEstimate::unit());
                ResultSetNode::Values(values)
            }
            None => return Err(PlanError::Internal(format!("query block at level {} was not optimized", level))),
        };
        self.nested(&mut node)?;
        let unique_rows = projects_unique_key(&node, &result_columns);

        if !predicates.is_empty() {
            let cost = node.cost();
            node = ResultSetNode::ProjectRestrict(ProjectRestrictNode {
                result_columns: node.result_columns().clone(),
                child: Box::new(node),
                restriction: predicates,
                cost,
            });
        }

        if grouped {
            let mut aggregates = Vec::new();
            for expr in result_columns.iter().map(|c| &c.expression).chain(having.iter()) {
                collect_aggregates(expr, &mut aggregates);
            }
            let columns: ResultColumnList = group_by
                .iter()
                .chain(aggregates.iter())
                .map(|expr| ResultColumn::new(expr.to_string(), expr.clone()))
                .collect();
            let estimate = node.cost();
            let input_rows = estimate.map(|c| c.row_count).unwrap_or(1.0);
            // One row per ten input rows when grouped by keys, one otherwise.
            let rows = if group_by.is_empty() { 1.0 } else { (input_rows / 10.0).max(1.0) };
            node = ResultSetNode::GroupBy(GroupByNode {
                child: Box::new(node),
                group_by,
                aggregates,
                result_columns: columns,
                cost: with_cost(estimate, sort_cost(input_rows), Some(rows)),
            });
        }

        let mut restriction = PredicateList::new();
        for expr in having.map(conjuncts).unwrap_or_default() {
            restriction.push(Predicate::new(self.numbering.next_predicate(), expr, level));
        }
        let cost = node.cost();
        let visible: ResultColumnList = result_columns.iter().filter(|c| !c.generated).cloned().collect();
        let has_generated = result_columns.has_generated();
        node = ResultSetNode::ProjectRestrict(ProjectRestrictNode {
            child: Box::new(node),
            result_columns,
            restriction,
            cost,
        });

        let sort_keys = clauses.order_by.as_ref().map(|o| o.result_columns()).unwrap_or_default();
        let needs_sort = clauses.order_by.is_some() && !sort_avoided;
        let mut dedupe_in_sort = false;
        if distinct && !(unique_rows && !grouped) {
            if needs_sort && (0..visible.len()).all(|i| sort_keys.contains(&i)) {
                dedupe_in_sort = true;
            } else {
                let cost = sorted(node.cost());
                node = ResultSetNode::Distinct(DistinctNode { child: Box::new(node), cost });
            }
        } else if distinct {
            log::debug!("DISTINCT dropped: a unique key is projected");
        }

        let clauses = Clauses { order_by: clauses.order_by.filter(|_| needs_sort), ..clauses };
        node = self.wrap_clauses(node, clauses, dedupe_in_sort);

        if has_generated {
            let cost = node.cost();
            node = ResultSetNode::ProjectRestrict(ProjectRestrictNode {
                child: Box::new(node),
                result_columns: visible,
                restriction: PredicateList::new(),
                cost,
            });
        }
        Ok(node)
    }

    fn wrap_clauses(&mut self, mut node: ResultSetNode, clauses: Clauses, eliminate_duplicates: bool) -> ResultSetNode {
        if let Some(order_by) = clauses.order_by {
            let cost = sorted(node.cost());
            node = ResultSetNode::OrderBy(OrderByNode {
                child: Box::new(node),
                order_by,
                eliminate_duplicates,
                cost,
            });
        }
        if clauses.offset.is_some() || clauses.fetch.is_some() {
            let cost = node.cost();
            node = ResultSetNode::RowCount(RowCountNode {
                child: Box::new(node),
                offset: clauses.offset,
                fetch: clauses.fetch,
                cost,
            });
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::binder::{Binder, CompileFacts, CompilerContext};
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::optimizer::{NoopTrace, Optimizer, OptimizerConfig};
    use crate::sql::Parser;
    use crate::tree::DataType;

    fn catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_table(
                TableBuilder::new("T")
                    .column("ID", DataType::integer())
                    .column("A", DataType::integer())
                    .column("B", DataType::varchar(10))
                    .index("T_ID", &["ID"], true)
                    .index("T_A", &["A"], false)
                    .row_count(500)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add_table(
                TableBuilder::new("U")
                    .column("X", DataType::integer())
                    .row_count(20)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn finalized(sql: &str) -> ResultSetNode {
        let catalog = catalog();
        let mut statement = Parser::parse(sql).unwrap();
        let mut facts = CompileFacts::new();
        let mut numbering = Numbering::new();
        Binder::new(catalog.as_ref(), &CompilerContext::new(), &mut facts, &mut numbering)
            .bind(&mut statement)
            .unwrap();
        let config = OptimizerConfig::default();
        Optimizer::new(catalog.as_ref(), &config, &NoopTrace)
            .optimize(&mut statement, &mut numbering, &mut facts)
            .unwrap();
        finalize(&mut statement, &mut numbering).unwrap();
        statement.query().clone()
    }

    fn names(node: &ResultSetNode) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            names.push(n.node_name());
            current = match n {
                ResultSetNode::ProjectRestrict(p) => Some(p.child.as_ref()),
                ResultSetNode::GroupBy(g) => Some(g.child.as_ref()),
                ResultSetNode::Distinct(d) => Some(d.child.as_ref()),
                ResultSetNode::OrderBy(o) => Some(o.child.as_ref()),
                ResultSetNode::RowCount(r) => Some(r.child.as_ref()),
                _ => None,
            };
        }
        names
    }

    #[test]
    fn test_sort_and_row_count_wrap_select() {
        let plan = finalized("SELECT b FROM t ORDER BY b OFFSET 2 ROWS FETCH FIRST 5 ROWS ONLY");
        assert_eq!(names(&plan)[..3], ["RowCount", "OrderBy", "ProjectRestrict"]);
    }

    #[test]
    fn test_index_order_avoids_sort() {
        let plan = finalized("SELECT id, b FROM t ORDER BY id");
        assert!(!names(&plan).contains(&"OrderBy"));
    }

    #[test]
    fn test_distinct_handling() {
        let plan = finalized("SELECT DISTINCT id, b FROM t");
        assert!(!names(&plan).contains(&"Distinct"));

        let plan = finalized("SELECT DISTINCT b FROM t ORDER BY b");
        let ResultSetNode::OrderBy(sort) = &plan else { panic!("expected a sort, got {:?}", names(&plan)) };
        assert!(sort.eliminate_duplicates);

        let plan = finalized("SELECT DISTINCT a FROM t");
        assert_eq!(names(&plan)[0], "Distinct");
    }

    #[test]
    fn test_grouping_and_having() {
        let plan = finalized("SELECT a, COUNT(*) FROM t GROUP BY a HAVING COUNT(*) > 1");
        let ResultSetNode::ProjectRestrict(select_list) = &plan else { panic!("expected a projection") };
        assert_eq!(select_list.restriction.len(), 1);
        let ResultSetNode::GroupBy(group) = select_list.child.as_ref() else { panic!("expected grouping") };
        assert_eq!(group.aggregates.len(), 1);
    }

    #[test]
    fn test_generated_order_column_projected_off() {
        let plan = finalized("SELECT b FROM t ORDER BY a");
        assert_eq!(plan.node_name(), "ProjectRestrict");
        assert_eq!(plan.result_columns().len(), 1);
    }

    #[test]
    fn test_union_and_values() {
        let plan = finalized("SELECT a FROM t UNION SELECT x FROM u");
        assert_eq!(plan.node_name(), "Distinct");

        let plan = finalized("VALUES (1, 2, 3), (4, 5, 6) ORDER BY 2");
        let ResultSetNode::OrderBy(sort) = &plan else { panic!("expected a sort") };
        assert_eq!(sort.order_by.result_columns(), vec![1]);
    }
}
