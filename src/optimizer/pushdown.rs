//! Predicate placement and projection trimming.
//!
//! Before the search, single-table restrictions on a derived table are
//! copied into each arm of its body. After the search, every predicate of
//! the block is attached where its last table enters the join order and
//! base tables only project the columns something reads.

use std::collections::HashSet;

use crate::binder::Numbering;
use crate::tree::{
    ColumnReference, ColumnSource, JoinKind, JoinNode, Predicate, PredicateList, PredicateRole,
    ProjectRestrictNode, ResultColumnList, ResultSetNode, SelectNode, TableMap, ValueNode,
};

use super::access_path::ChosenAccess;
use super::join_strategy::JoinStrategyKind;
use super::optimizable::{Operand, Optimizable};
use super::search::SearchOutcome;

/// Flag every base table and derived table column that some expression of
/// the statement reads.
pub(crate) fn mark_referenced(query: &mut ResultSetNode) {
    let mut read: HashSet<(usize, usize)> = HashSet::new();
    query.walk_values(&mut |node| {
        if let ValueNode::Column(ColumnReference { source: Some(source), .. }) = node {
            read.insert((source.table_number, source.column_position));
        }
    });
    query.walk_result_sets_mut(&mut |node| {
        let (table_number, columns) = match node {
            ResultSetNode::BaseTable(t) => (t.table_number, &mut t.result_columns),
            ResultSetNode::Subquery(s) => (s.table_number, &mut s.result_columns),
            _ => return,
        };
        let Some(table_number) = table_number else { return };
        for (position, column) in columns.iter_mut().enumerate() {
            column.referenced = read.contains(&(table_number, position));
        }
    });
}

/// Arms of a derived table body a restriction can be copied into: every
/// arm must be an ungrouped SELECT.
fn collect_arms(node: &mut ResultSetNode) -> Option<Vec<&mut SelectNode>> {
    fn walk<'n>(node: &'n mut ResultSetNode, arms: &mut Vec<&'n mut SelectNode>) -> bool {
        match node {
            ResultSetNode::Select(select) if !select.is_grouped() => {
                arms.push(select);
                true
            }
            ResultSetNode::SetOperator(set) => walk(&mut set.left, arms) && walk(&mut set.right, arms),
            _ => false,
        }
    }
    let mut arms = Vec::new();
    walk(node, &mut arms).then_some(arms)
}

/// Rewrite `expr` over the result columns of `arm`: references to column
/// `i` of the derived table become the arm's `i`th select list expression.
fn remap_to_arm(expr: &ValueNode, derived: usize, level: usize, arm: &SelectNode) -> Option<ValueNode> {
    let mut rewritten = expr.clone();
    let mut complete = true;
    rewritten.walk_deep_mut(&mut |node| {
        let ValueNode::Column(ColumnReference {
            source: Some(ColumnSource { table_number, column_position, level: column_level }),
            ..
        }) = node
        else {
            return;
        };
        if *table_number != derived || *column_level != level {
            return;
        }
        match arm.result_columns.get(*column_position) {
            Some(column) if column.expression.is_copyable() => *node = column.expression.clone(),
            _ => complete = false,
        }
    });
    complete.then_some(rewritten)
}

/// Move restrictions that only read one derived table into its body.
/// The outer predicate is replaced by one fresh predicate per arm.
pub(crate) fn push_into_derived(select: &mut SelectNode, numbering: &mut Numbering) {
    let level = select.level;
    for item in select.from_list.iter_mut() {
        let ResultSetNode::Subquery(derived) = item else { continue };
        let Some(derived_table) = derived.table_number else { continue };
        let Some(mut arms) = collect_arms(&mut derived.query) else { continue };

        let candidates = select.predicates.take_where(|p| {
            p.referenced_tables == TableMap::single(derived_table) && !p.expr.contains_subquery()
        });
        for predicate in candidates {
            let rewritten: Option<Vec<ValueNode>> = arms
                .iter()
                .map(|arm| remap_to_arm(&predicate.expr, derived_table, level, arm))
                .collect();
            let Some(rewritten) = rewritten else {
                select.predicates.push(predicate);
                continue;
            };
            log::trace!("pushing {} into derived table {}", predicate.id, derived.alias);
            for (arm, expr) in arms.iter_mut().zip(rewritten) {
                let id = numbering.next_predicate();
                arm.predicates.push(Predicate::new(id, expr, arm.level));
            }
        }
    }
}

/// Result columns a base table must still produce.
fn trimmed_columns(node: &ResultSetNode) -> Option<ResultColumnList> {
    let ResultSetNode::BaseTable(table) = node else { return None };
    if table.result_columns.iter().all(|c| c.referenced) {
        return None;
    }
    Some(table.result_columns.iter().filter(|c| c.referenced).cloned().collect())
}

fn assign_roles(predicates: &mut PredicateList, access: &ChosenAccess, key_role: PredicateRole) {
    for predicate in predicates.iter_mut() {
        predicate.role = if access.key_predicates.contains(&predicate.id) {
            key_role
        } else {
            PredicateRole::Residual
        };
    }
}

fn concat_columns(left: &ResultSetNode, right: &ResultSetNode) -> ResultColumnList {
    left.result_columns()
        .iter()
        .chain(right.result_columns().iter())
        .cloned()
        .collect()
}

/// Assemble the left-deep join tree of a searched block. Predicates that
/// reference a table of the block move out of `predicates`; the ones that
/// reference none stay.
pub(crate) fn build_join_tree(
    from_list: Vec<ResultSetNode>,
    operands: &[Operand],
    outcome: &SearchOutcome,
    predicates: &mut PredicateList,
) -> Option<ResultSetNode> {
    let mut slots: Vec<Option<ResultSetNode>> = from_list.into_iter().map(Some).collect();
    let mut placed = TableMap::new();
    let mut tree: Option<ResultSetNode> = None;

    for (step, &index) in outcome.order.iter().enumerate() {
        let operand = &operands[index];
        let access = outcome.accesses[step].clone();
        let mut node = slots[index].take()?;
        node.set_access(access.clone());

        let mut own = predicates.take_where(|p| {
            !p.referenced_tables.is_empty() && p.referenced_tables.is_subset_of(&operand.covered)
        });
        assign_roles(&mut own, &access, PredicateRole::IndexKey);
        let trimmed = trimmed_columns(&node);
        if !own.is_empty() || trimmed.is_some() {
            let result_columns = trimmed.unwrap_or_else(|| node.result_columns().clone());
            node = ResultSetNode::ProjectRestrict(ProjectRestrictNode {
                child: Box::new(node),
                result_columns,
                restriction: own,
                cost: Some(access.cost),
            });
        }

        let available = placed.union(&operand.covered);
        tree = Some(match tree {
            None => node,
            Some(left) => {
                let mut joined =
                    predicates.take_where(|p| !p.referenced_tables.is_empty() && p.referenced_tables.is_subset_of(&available));
                let key_role = match access.strategy {
                    JoinStrategyKind::Hash => PredicateRole::HashKey,
                    JoinStrategyKind::NestedLoop => PredicateRole::IndexKey,
                };
                assign_roles(&mut joined, &access, key_role);
                let result_columns = concat_columns(&left, &node);
                let mut join = JoinNode::new(JoinKind::from(operand.role), left, node, None);
                join.predicates = joined;
                join.result_columns = result_columns;
                join.strategy = Some(access.strategy);
                join.cost = Some(outcome.steps[step]);
                ResultSetNode::Join(join)
            }
        });
        placed = available;
    }
    tree
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::binder::{Binder, CompileFacts, CompilerContext};
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::sql::Parser;
    use crate::tree::{DataType, Statement};

    fn catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        for name in ["T1", "T2"] {
            catalog
                .add_table(
                    TableBuilder::new(name)
                        .column("A", DataType::integer())
                        .column("B", DataType::integer())
                        .column("C", DataType::varchar(20))
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        Arc::new(catalog)
    }

    fn bound(sql: &str) -> (Statement, Numbering) {
        let catalog = catalog();
        let mut statement = Parser::parse(sql).unwrap();
        let mut facts = CompileFacts::new();
        let mut numbering = Numbering::new();
        Binder::new(catalog.as_ref(), &CompilerContext::new(), &mut facts, &mut numbering)
            .bind(&mut statement)
            .unwrap();
        (statement, numbering)
    }

    fn select_of(statement: &mut Statement) -> &mut SelectNode {
        match statement.query_mut() {
            ResultSetNode::Select(select) => select,
            other => panic!("expected a select, got {}", other.node_name()),
        }
    }

    #[test]
    fn test_mark_referenced_columns() {
        let (mut statement, _) = bound("SELECT a FROM t1 WHERE c = 'x'");
        mark_referenced(statement.query_mut());
        let select = select_of(&mut statement);
        let ResultSetNode::BaseTable(table) = &select.from_list[0] else { panic!("expected a base table") };
        assert_eq!(table.referenced_columns(), vec![0, 2]);
        assert!(trimmed_columns(&select.from_list[0]).is_some_and(|c| c.len() == 2));
    }

    #[test]
    fn test_restriction_pushed_into_each_arm() {
        let (mut statement, mut numbering) =
            bound("SELECT x FROM (SELECT a FROM t1 UNION SELECT b FROM t2) AS d (x) WHERE x > 3");
        let select = select_of(&mut statement);
        let before = select.predicates.ids();
        assert_eq!(before.len(), 1);

        push_into_derived(select, &mut numbering);
        assert!(select.predicates.is_empty());
        let ResultSetNode::Subquery(derived) = &select.from_list[0] else { panic!("expected a derived table") };
        let ids = derived.query.predicate_ids();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&before[0]));
    }

    #[test]
    fn test_grouped_body_keeps_restriction() {
        let (mut statement, mut numbering) =
            bound("SELECT n FROM (SELECT a, COUNT(*) FROM t1 GROUP BY a) AS d (a, n) WHERE a = 1");
        let select = select_of(&mut statement);
        push_into_derived(select, &mut numbering);
        assert_eq!(select.predicates.len(), 1);
    }
}
