//! Relational operands.
//!
//! `Select`, `BaseTable`, `Subquery`, `Join`, `SetOperator` and `Values`
//! come from the parser. The optimizer and finalizer wrap finished query
//! blocks in `ProjectRestrict`, `GroupBy`, `Distinct`, `OrderBy` and
//! `RowCount` nodes; a bound node's columns never change afterwards.

use std::fmt;
use std::sync::Arc;

use super::order::OrderByList;
use super::predicate::PredicateList;
use super::result_column::ResultColumnList;
use super::table_map::TableMap;
use super::value::{Position, ValueNode};
use crate::catalog::TableDescriptor;
use crate::optimizer::{ChosenAccess, CostEstimate, JoinStrategyKind};

/// Possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// How a FROM list entry joins the tables placed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinRole {
    #[default]
    Plain,
    /// Flattened EXISTS / IN subquery: at most one match per outer row.
    Exists,
    /// Flattened NOT EXISTS subquery.
    NotExists,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseTableNode {
    pub name: TableName,
    pub alias: Option<String>,
    pub position: Position,
    pub table_number: Option<usize>,
    pub descriptor: Option<Arc<TableDescriptor>>,
    pub result_columns: ResultColumnList,
    pub join_role: JoinRole,
    /// Tables that must precede this one in any join order.
    pub dependency_map: TableMap,
    pub access: Option<ChosenAccess>,
}

impl BaseTableNode {
    pub fn new(name: TableName, alias: Option<String>, position: Position) -> Self {
        Self {
            name,
            alias,
            position,
            table_number: None,
            descriptor: None,
            result_columns: ResultColumnList::new(),
            join_role: JoinRole::Plain,
            dependency_map: TableMap::new(),
            access: None,
        }
    }

    /// Name other clauses use to qualify this table's columns.
    pub fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name.name)
    }

    /// Positions of the columns something reads.
    pub fn referenced_columns(&self) -> Vec<usize> {
        self.result_columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.referenced)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Derived table: a subquery in the FROM list, or an expanded view.
#[derive(Debug, Clone, PartialEq)]
pub struct FromSubquery {
    pub query: Box<ResultSetNode>,
    pub alias: String,
    pub column_aliases: Vec<String>,
    pub table_number: Option<usize>,
    /// Nesting level of the inner query block.
    pub level: usize,
    pub result_columns: ResultColumnList,
    /// Set when the derived table is the body of this view.
    pub view: Option<TableName>,
    pub dependency_map: TableMap,
    pub access: Option<ChosenAccess>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Exists,
    NotExists,
}

impl JoinKind {
    pub fn sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::LeftOuter => "LEFT OUTER",
            JoinKind::Exists => "EXISTS",
            JoinKind::NotExists => "NOT EXISTS",
        }
    }
}

impl From<JoinRole> for JoinKind {
    fn from(role: JoinRole) -> Self {
        match role {
            JoinRole::Plain => JoinKind::Inner,
            JoinRole::Exists => JoinKind::Exists,
            JoinRole::NotExists => JoinKind::NotExists,
        }
    }
}

/// Join of two operands. Written joins carry an ON clause until the
/// flattener turns it into predicates; optimizer-built joins carry the join
/// predicates placed on them and the chosen strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub kind: JoinKind,
    pub left: Box<ResultSetNode>,
    pub right: Box<ResultSetNode>,
    pub on: Option<ValueNode>,
    pub predicates: PredicateList,
    pub result_columns: ResultColumnList,
    /// Assigned when an outer join stays in the FROM list as one operand.
    pub table_number: Option<usize>,
    pub dependency_map: TableMap,
    pub strategy: Option<JoinStrategyKind>,
    pub access: Option<ChosenAccess>,
    pub cost: Option<CostEstimate>,
}

impl JoinNode {
    pub fn new(kind: JoinKind, left: ResultSetNode, right: ResultSetNode, on: Option<ValueNode>) -> Self {
        Self {
            kind,
            left: Box::new(left),
            right: Box::new(right),
            on,
            predicates: PredicateList::new(),
            result_columns: ResultColumnList::new(),
            table_number: None,
            dependency_map: TableMap::new(),
            strategy: None,
            access: None,
            cost: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

impl SetOp {
    pub fn sql(&self) -> &'static str {
        match self {
            SetOp::Union => "UNION",
            SetOp::Intersect => "INTERSECT",
            SetOp::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOperatorNode {
    pub op: SetOp,
    pub all: bool,
    pub left: Box<ResultSetNode>,
    pub right: Box<ResultSetNode>,
    pub result_columns: ResultColumnList,
    pub cost: Option<CostEstimate>,
}

/// Row constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesNode {
    pub rows: Vec<Vec<ValueNode>>,
    pub result_columns: ResultColumnList,
    pub table_number: Option<usize>,
    pub access: Option<ChosenAccess>,
    pub cost: Option<CostEstimate>,
}

impl ValuesNode {
    pub fn new(rows: Vec<Vec<ValueNode>>) -> Self {
        Self {
            rows,
            result_columns: ResultColumnList::new(),
            table_number: None,
            access: None,
            cost: None,
        }
    }
}

/// Select-list entry before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard { qualifier: Option<String> },
    Expr { expr: ValueNode, alias: Option<String> },
}

/// One query block.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    pub items: Vec<SelectItem>,
    pub result_columns: ResultColumnList,
    pub from_list: Vec<ResultSetNode>,
    pub where_clause: Option<ValueNode>,
    /// Conjuncts of the normalized WHERE clause, built by the flattener.
    pub predicates: PredicateList,
    pub group_by: Vec<ValueNode>,
    pub having: Option<ValueNode>,
    pub distinct: bool,
    pub level: usize,
    /// Join tree chosen by the optimizer; replaces `from_list`.
    pub plan: Option<Box<ResultSetNode>>,
    /// The chosen join order already delivers the required ordering.
    pub sort_avoided: bool,
    pub cost: Option<CostEstimate>,
}

impl SelectNode {
    pub fn new(items: Vec<SelectItem>, from_list: Vec<ResultSetNode>) -> Self {
        Self {
            items,
            result_columns: ResultColumnList::new(),
            from_list,
            where_clause: None,
            predicates: PredicateList::new(),
            group_by: Vec::new(),
            having: None,
            distinct: false,
            level: 0,
            plan: None,
            sort_avoided: false,
            cost: None,
        }
    }

    pub fn has_aggregates(&self) -> bool {
        self.result_columns.iter().any(|c| c.expression.contains_aggregate())
            || self.having.as_ref().map(|h| h.contains_aggregate()).unwrap_or(false)
    }

    /// GROUP BY present or aggregates in the select list or HAVING.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregates()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRestrictNode {
    pub child: Box<ResultSetNode>,
    pub result_columns: ResultColumnList,
    pub restriction: PredicateList,
    pub cost: Option<CostEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupByNode {
    pub child: Box<ResultSetNode>,
    pub group_by: Vec<ValueNode>,
    pub aggregates: Vec<ValueNode>,
    /// Grouping expressions followed by aggregates.
    pub result_columns: ResultColumnList,
    pub cost: Option<CostEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctNode {
    pub child: Box<ResultSetNode>,
    pub cost: Option<CostEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByNode {
    pub child: Box<ResultSetNode>,
    pub order_by: OrderByList,
    /// The sort also removes duplicate rows.
    pub eliminate_duplicates: bool,
    pub cost: Option<CostEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowCountNode {
    pub child: Box<ResultSetNode>,
    pub offset: Option<ValueNode>,
    pub fetch: Option<ValueNode>,
    pub cost: Option<CostEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSetNode {
    Select(SelectNode),
    BaseTable(BaseTableNode),
    Subquery(FromSubquery),
    Join(JoinNode),
    SetOperator(SetOperatorNode),
    Values(ValuesNode),
    ProjectRestrict(ProjectRestrictNode),
    GroupBy(GroupByNode),
    Distinct(DistinctNode),
    OrderBy(OrderByNode),
    RowCount(RowCountNode),
}

impl ResultSetNode {
    pub fn node_name(&self) -> &'static str {
        match self {
            ResultSetNode::Select(_) => "Select",
            ResultSetNode::BaseTable(_) => "BaseTable",
            ResultSetNode::Subquery(_) => "Subquery",
            ResultSetNode::Join(_) => "Join",
            ResultSetNode::SetOperator(_) => "SetOperator",
            ResultSetNode::Values(_) => "Values",
            ResultSetNode::ProjectRestrict(_) => "ProjectRestrict",
            ResultSetNode::GroupBy(_) => "GroupBy",
            ResultSetNode::Distinct(_) => "Distinct",
            ResultSetNode::OrderBy(_) => "OrderBy",
            ResultSetNode::RowCount(_) => "RowCount",
        }
    }

    pub fn result_columns(&self) -> &ResultColumnList {
        match self {
            ResultSetNode::Select(s) => &s.result_columns,
            ResultSetNode::BaseTable(t) => &t.result_columns,
            ResultSetNode::Subquery(s) => &s.result_columns,
            ResultSetNode::Join(j) => &j.result_columns,
            ResultSetNode::SetOperator(s) => &s.result_columns,
            ResultSetNode::Values(v) => &v.result_columns,
            ResultSetNode::ProjectRestrict(p) => &p.result_columns,
            ResultSetNode::GroupBy(g) => &g.result_columns,
            ResultSetNode::Distinct(d) => d.child.result_columns(),
            ResultSetNode::OrderBy(o) => o.child.result_columns(),
            ResultSetNode::RowCount(r) => r.child.result_columns(),
        }
    }

    pub fn result_columns_mut(&mut self) -> &mut ResultColumnList {
        match self {
            ResultSetNode::Select(s) => &mut s.result_columns,
            ResultSetNode::BaseTable(t) => &mut t.result_columns,
            ResultSetNode::Subquery(s) => &mut s.result_columns,
            ResultSetNode::Join(j) => &mut j.result_columns,
            ResultSetNode::SetOperator(s) => &mut s.result_columns,
            ResultSetNode::Values(v) => &mut v.result_columns,
            ResultSetNode::ProjectRestrict(p) => &mut p.result_columns,
            ResultSetNode::GroupBy(g) => &mut g.result_columns,
            ResultSetNode::Distinct(d) => d.child.result_columns_mut(),
            ResultSetNode::OrderBy(o) => o.child.result_columns_mut(),
            ResultSetNode::RowCount(r) => r.child.result_columns_mut(),
        }
    }

    /// Table number of a FROM list operand.
    pub fn table_number(&self) -> Option<usize> {
        match self {
            ResultSetNode::BaseTable(t) => t.table_number,
            ResultSetNode::Subquery(s) => s.table_number,
            ResultSetNode::Join(j) => j.table_number,
            ResultSetNode::Values(v) => v.table_number,
            ResultSetNode::ProjectRestrict(p) => p.child.table_number(),
            _ => None,
        }
    }

    /// Table numbers of this operand and every table nested inside it in the
    /// same query block.
    pub fn referenced_tables(&self) -> TableMap {
        let mut map = TableMap::new();
        self.collect_tables(&mut map);
        map
    }

    fn collect_tables(&self, map: &mut TableMap) {
        if let Some(n) = self.table_number() {
            map.set(n);
        }
        match self {
            ResultSetNode::Select(s) => match &s.plan {
                Some(plan) => plan.collect_tables(map),
                None => s.from_list.iter().for_each(|f| f.collect_tables(map)),
            },
            ResultSetNode::Join(j) => {
                j.left.collect_tables(map);
                j.right.collect_tables(map);
            }
            ResultSetNode::ProjectRestrict(p) => p.child.collect_tables(map),
            ResultSetNode::GroupBy(g) => g.child.collect_tables(map),
            ResultSetNode::Distinct(d) => d.child.collect_tables(map),
            ResultSetNode::OrderBy(o) => o.child.collect_tables(map),
            ResultSetNode::RowCount(r) => r.child.collect_tables(map),
            _ => {}
        }
    }

    pub fn cost(&self) -> Option<CostEstimate> {
        match self {
            ResultSetNode::Select(s) => s.cost,
            ResultSetNode::BaseTable(t) => t.access.as_ref().map(|a| a.cost),
            ResultSetNode::Subquery(s) => s.access.as_ref().map(|a| a.cost).or_else(|| s.query.cost()),
            ResultSetNode::Join(j) => j.cost,
            ResultSetNode::SetOperator(s) => s.cost,
            ResultSetNode::Values(v) => v.cost,
            ResultSetNode::ProjectRestrict(p) => p.cost,
            ResultSetNode::GroupBy(g) => g.cost,
            ResultSetNode::Distinct(d) => d.cost,
            ResultSetNode::OrderBy(o) => o.cost,
            ResultSetNode::RowCount(r) => r.cost,
        }
    }

    /// Child result sets of wrapper and join nodes, and the body of a
    /// derived table.
    pub fn children(&self) -> Vec<&ResultSetNode> {
        match self {
            ResultSetNode::Select(s) => match &s.plan {
                Some(plan) => vec![plan.as_ref()],
                None => s.from_list.iter().collect(),
            },
            ResultSetNode::BaseTable(_) | ResultSetNode::Values(_) => Vec::new(),
            ResultSetNode::Subquery(s) => vec![s.query.as_ref()],
            ResultSetNode::Join(j) => vec![j.left.as_ref(), j.right.as_ref()],
            ResultSetNode::SetOperator(s) => vec![s.left.as_ref(), s.right.as_ref()],
            ResultSetNode::ProjectRestrict(p) => vec![p.child.as_ref()],
            ResultSetNode::GroupBy(g) => vec![g.child.as_ref()],
            ResultSetNode::Distinct(d) => vec![d.child.as_ref()],
            ResultSetNode::OrderBy(o) => vec![o.child.as_ref()],
            ResultSetNode::RowCount(r) => vec![r.child.as_ref()],
        }
    }

    /// Expressions owned directly by this node. Result columns of tables,
    /// derived tables and joins only restate their sources and are skipped.
    pub fn own_values(&self) -> Vec<&ValueNode> {
        let mut values = Vec::new();
        match self {
            ResultSetNode::Select(s) => {
                for item in &s.items {
                    if let SelectItem::Expr { expr, .. } = item {
                        values.push(expr);
                    }
                }
                values.extend(s.result_columns.iter().map(|c| &c.expression));
                values.extend(s.where_clause.iter());
                values.extend(s.predicates.iter().map(|p| &p.expr));
                values.extend(s.group_by.iter());
                values.extend(s.having.iter());
            }
            ResultSetNode::Join(j) => {
                values.extend(j.on.iter());
                values.extend(j.predicates.iter().map(|p| &p.expr));
            }
            ResultSetNode::Values(v) => values.extend(v.rows.iter().flatten()),
            ResultSetNode::ProjectRestrict(p) => {
                values.extend(p.result_columns.iter().map(|c| &c.expression));
                values.extend(p.restriction.iter().map(|p| &p.expr));
            }
            ResultSetNode::GroupBy(g) => {
                values.extend(g.group_by.iter());
                values.extend(g.aggregates.iter());
            }
            ResultSetNode::RowCount(r) => {
                values.extend(r.offset.iter());
                values.extend(r.fetch.iter());
            }
            _ => {}
        }
        values
    }

    /// Visit every expression in this tree, including subquery bodies.
    pub fn walk_values(&self, f: &mut dyn FnMut(&ValueNode)) {
        for value in self.own_values() {
            value.walk_deep(f);
        }
        for child in self.children() {
            child.walk_values(f);
        }
    }

    /// Mutable counterpart of [`walk_values`](Self::walk_values).
    pub fn walk_values_mut(&mut self, f: &mut dyn FnMut(&mut ValueNode)) {
        match self {
            ResultSetNode::Select(s) => {
                for item in &mut s.items {
                    if let SelectItem::Expr { expr, .. } = item {
                        expr.walk_deep_mut(f);
                    }
                }
                for column in s.result_columns.iter_mut() {
                    column.expression.walk_deep_mut(f);
                }
                if let Some(w) = &mut s.where_clause {
                    w.walk_deep_mut(f);
                }
                for p in s.predicates.iter_mut() {
                    p.expr.walk_deep_mut(f);
                }
                for g in &mut s.group_by {
                    g.walk_deep_mut(f);
                }
                if let Some(h) = &mut s.having {
                    h.walk_deep_mut(f);
                }
                match &mut s.plan {
                    Some(plan) => plan.walk_values_mut(f),
                    None => s.from_list.iter_mut().for_each(|n| n.walk_values_mut(f)),
                }
            }
            ResultSetNode::BaseTable(_) => {}
            ResultSetNode::Subquery(s) => s.query.walk_values_mut(f),
            ResultSetNode::Join(j) => {
                if let Some(on) = &mut j.on {
                    on.walk_deep_mut(f);
                }
                for p in j.predicates.iter_mut() {
                    p.expr.walk_deep_mut(f);
                }
                j.left.walk_values_mut(f);
                j.right.walk_values_mut(f);
            }
            ResultSetNode::SetOperator(s) => {
                s.left.walk_values_mut(f);
                s.right.walk_values_mut(f);
            }
            ResultSetNode::Values(v) => v.rows.iter_mut().flatten().for_each(|e| e.walk_deep_mut(f)),
            ResultSetNode::ProjectRestrict(p) => {
                for column in p.result_columns.iter_mut() {
                    column.expression.walk_deep_mut(f);
                }
                for pred in p.restriction.iter_mut() {
                    pred.expr.walk_deep_mut(f);
                }
                p.child.walk_values_mut(f);
            }
            ResultSetNode::GroupBy(g) => {
                g.group_by.iter_mut().for_each(|e| e.walk_deep_mut(f));
                g.aggregates.iter_mut().for_each(|e| e.walk_deep_mut(f));
                g.child.walk_values_mut(f);
            }
            ResultSetNode::Distinct(d) => d.child.walk_values_mut(f),
            ResultSetNode::OrderBy(o) => o.child.walk_values_mut(f),
            ResultSetNode::RowCount(r) => {
                if let Some(o) = &mut r.offset {
                    o.walk_deep_mut(f);
                }
                if let Some(n) = &mut r.fetch {
                    n.walk_deep_mut(f);
                }
                r.child.walk_values_mut(f);
            }
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut ResultSetNode> {
        match self {
            ResultSetNode::Select(s) => match &mut s.plan {
                Some(plan) => vec![plan.as_mut()],
                None => s.from_list.iter_mut().collect(),
            },
            ResultSetNode::BaseTable(_) | ResultSetNode::Values(_) => Vec::new(),
            ResultSetNode::Subquery(s) => vec![s.query.as_mut()],
            ResultSetNode::Join(j) => vec![j.left.as_mut(), j.right.as_mut()],
            ResultSetNode::SetOperator(s) => vec![s.left.as_mut(), s.right.as_mut()],
            ResultSetNode::ProjectRestrict(p) => vec![p.child.as_mut()],
            ResultSetNode::GroupBy(g) => vec![g.child.as_mut()],
            ResultSetNode::Distinct(d) => vec![d.child.as_mut()],
            ResultSetNode::OrderBy(o) => vec![o.child.as_mut()],
            ResultSetNode::RowCount(r) => vec![r.child.as_mut()],
        }
    }

    fn own_values_mut(&mut self) -> Vec<&mut ValueNode> {
        let mut values = Vec::new();
        match self {
            ResultSetNode::Select(s) => {
                for item in s.items.iter_mut() {
                    if let SelectItem::Expr { expr, .. } = item {
                        values.push(expr);
                    }
                }
                values.extend(s.result_columns.iter_mut().map(|c| &mut c.expression));
                values.extend(s.where_clause.iter_mut());
                values.extend(s.predicates.iter_mut().map(|p| &mut p.expr));
                values.extend(s.group_by.iter_mut());
                values.extend(s.having.iter_mut());
            }
            ResultSetNode::Join(j) => {
                values.extend(j.on.iter_mut());
                values.extend(j.predicates.iter_mut().map(|p| &mut p.expr));
            }
            ResultSetNode::Values(v) => values.extend(v.rows.iter_mut().flatten()),
            ResultSetNode::ProjectRestrict(p) => {
                values.extend(p.result_columns.iter_mut().map(|c| &mut c.expression));
                values.extend(p.restriction.iter_mut().map(|p| &mut p.expr));
            }
            ResultSetNode::GroupBy(g) => {
                values.extend(g.group_by.iter_mut());
                values.extend(g.aggregates.iter_mut());
            }
            ResultSetNode::RowCount(r) => {
                values.extend(r.offset.iter_mut());
                values.extend(r.fetch.iter_mut());
            }
            _ => {}
        }
        values
    }

    /// Mutable counterpart of [`walk_result_sets`](Self::walk_result_sets).
    pub fn walk_result_sets_mut(&mut self, f: &mut dyn FnMut(&mut ResultSetNode)) {
        fn nested(value: &mut ValueNode, f: &mut dyn FnMut(&mut ResultSetNode)) {
            if let ValueNode::Subquery(s) = value {
                s.query.walk_result_sets_mut(f);
            }
            for child in value.children_mut() {
                nested(child, f);
            }
        }
        f(self);
        for value in self.own_values_mut() {
            nested(value, f);
        }
        for child in self.children_mut() {
            child.walk_result_sets_mut(f);
        }
    }

    /// Visit every result set node in pre-order, including bodies of
    /// subqueries used as expressions.
    pub fn walk_result_sets(&self, f: &mut dyn FnMut(&ResultSetNode)) {
        f(self);
        for value in self.own_values() {
            value.walk(&mut |node| {
                if let ValueNode::Subquery(s) = node {
                    s.query.walk_result_sets(f);
                }
            });
        }
        for child in self.children() {
            child.walk_result_sets(f);
        }
    }

    /// Ids of every predicate attached anywhere in the tree.
    pub fn predicate_ids(&self) -> Vec<crate::tree::PredicateId> {
        let mut ids = Vec::new();
        self.walk_result_sets(&mut |node| match node {
            ResultSetNode::Select(s) => ids.extend(s.predicates.ids()),
            ResultSetNode::Join(j) => ids.extend(j.predicates.ids()),
            ResultSetNode::ProjectRestrict(p) => ids.extend(p.restriction.ids()),
            _ => {}
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ColumnReference, ColumnSource, DataType, ResultColumn};

    fn base_table(number: usize) -> ResultSetNode {
        let mut table = BaseTableNode::new(TableName::new(None, format!("T{}", number)), None, Position::default());
        table.table_number = Some(number);
        table.result_columns.push(ResultColumn::new(
            "A",
            ValueNode::Column(ColumnReference {
                table: Some(format!("T{}", number)),
                column: "A".into(),
                position: Position::default(),
                source: Some(ColumnSource { table_number: number, column_position: 0, level: 0 }),
                data_type: Some(DataType::integer()),
            }),
        ));
        ResultSetNode::BaseTable(table)
    }

    #[test]
    fn test_referenced_tables_of_join() {
        let mut join = JoinNode::new(JoinKind::LeftOuter, base_table(0), base_table(1), None);
        join.table_number = Some(2);
        let node = ResultSetNode::Join(join);
        assert_eq!(node.referenced_tables().iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_wrappers_delegate_result_columns() {
        let node = ResultSetNode::Distinct(DistinctNode {
            child: Box::new(base_table(0)),
            cost: None,
        });
        assert_eq!(node.result_columns().len(), 1);
        assert_eq!(node.table_number(), None);
    }

    #[test]
    fn test_base_table_columns_are_not_walked() {
        let mut count = 0;
        base_table(0).walk_values(&mut |_| count += 1);
        assert_eq!(count, 0);
    }
}
