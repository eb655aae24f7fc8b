//! FROM list entries as seen by the join-order search.

use std::sync::Arc;

use crate::catalog::TableDescriptor;
use crate::tree::{JoinRole, ResultColumnList, ResultSetNode, TableMap, ValueNode};

use super::access_path::ChosenAccess;
use super::cost::CostEstimate;
use super::error::{OptimizeError, OptimizeResult};
use super::stats::{RowEstimate, StatisticsAdapter};

/// A result set that can be placed in a join order.
pub trait Optimizable {
    /// Table number identifying the operand in predicates.
    fn optimizable_number(&self) -> Option<usize>;

    /// Table numbers the operand produces columns for, including tables
    /// nested inside an outer join.
    fn covered_tables(&self) -> TableMap;

    /// Tables that must be placed before this operand.
    fn required_predecessors(&self) -> TableMap;

    fn join_role(&self) -> JoinRole;

    fn chosen_access(&self) -> Option<&ChosenAccess>;

    fn set_access(&mut self, access: ChosenAccess);
}

impl Optimizable for ResultSetNode {
    fn optimizable_number(&self) -> Option<usize> {
        self.table_number()
    }

    fn covered_tables(&self) -> TableMap {
        self.referenced_tables()
    }

    fn required_predecessors(&self) -> TableMap {
        match self {
            ResultSetNode::BaseTable(t) => t.dependency_map.clone(),
            ResultSetNode::Subquery(s) => s.dependency_map.clone(),
            ResultSetNode::Join(j) => j.dependency_map.clone(),
            _ => TableMap::new(),
        }
    }

    fn join_role(&self) -> JoinRole {
        match self {
            ResultSetNode::BaseTable(t) => t.join_role,
            _ => JoinRole::Plain,
        }
    }

    fn chosen_access(&self) -> Option<&ChosenAccess> {
        match self {
            ResultSetNode::BaseTable(t) => t.access.as_ref(),
            ResultSetNode::Subquery(s) => s.access.as_ref(),
            ResultSetNode::Join(j) => j.access.as_ref(),
            ResultSetNode::Values(v) => v.access.as_ref(),
            _ => None,
        }
    }

    fn set_access(&mut self, access: ChosenAccess) {
        match self {
            ResultSetNode::BaseTable(t) => t.access = Some(access),
            ResultSetNode::Subquery(s) => s.access = Some(access),
            ResultSetNode::Join(j) => j.access = Some(access),
            ResultSetNode::Values(v) => v.access = Some(access),
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum OperandKind {
    Table {
        schema: String,
        descriptor: Arc<TableDescriptor>,
        rows: RowEstimate,
        referenced: Vec<usize>,
    },
    /// Derived table, VALUES list or outer join, already costed as a whole.
    Materialized {
        estimate: CostEstimate,
        row_width: u64,
        /// Reads columns of an enclosing query block, so its rows change
        /// with every outer row.
        correlated: bool,
    },
}

/// Search-time description of one FROM list entry.
#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub table_number: usize,
    pub name: String,
    pub covered: TableMap,
    pub dependencies: TableMap,
    pub role: JoinRole,
    pub kind: OperandKind,
}

fn row_width(columns: &ResultColumnList) -> u64 {
    columns
        .iter()
        .filter_map(|c| c.data_type())
        .map(|t| t.storage_width())
        .sum::<u64>()
        .max(1)
}

fn is_correlated(query: &ResultSetNode, level: usize) -> bool {
    let mut correlated = false;
    query.walk_values(&mut |node| {
        if let ValueNode::Column(column) = node {
            if column.source.map_or(false, |s| s.level < level) {
                correlated = true;
            }
        }
    });
    correlated
}

impl Operand {
    /// Bytes of one row as the operand delivers it: the referenced columns
    /// of a table, the result columns of anything else.
    pub fn row_width(&self) -> u64 {
        match &self.kind {
            OperandKind::Table { descriptor, referenced, .. } => referenced
                .iter()
                .filter_map(|&position| descriptor.columns.get(position))
                .map(|c| c.sql_type.storage_width())
                .sum::<u64>()
                .max(1),
            OperandKind::Materialized { row_width, .. } => *row_width,
        }
    }

    pub fn estimated_rows(&self) -> f64 {
        match &self.kind {
            OperandKind::Table { rows, .. } => rows.rows,
            OperandKind::Materialized { estimate, .. } => estimate.row_count,
        }
    }

    /// Describe a FROM list entry. Nested plans (derived bodies, outer
    /// joins, VALUES) must already carry their cost.
    pub fn from_node(node: &ResultSetNode, stats: &StatisticsAdapter<'_>) -> OptimizeResult<Self> {
        let table_number = node
            .optimizable_number()
            .ok_or_else(|| OptimizeError::Unsupported(format!("unnumbered {} in a FROM list", node.node_name())))?;
        let not_costed = || OptimizeError::Unsupported(format!("{} #{} was not costed", node.node_name(), table_number));

        let (name, kind) = match node {
            ResultSetNode::BaseTable(table) => {
                let descriptor = table
                    .descriptor
                    .clone()
                    .ok_or_else(|| OptimizeError::NoAccessPath { table: table.name.to_string() })?;
                let schema = table.name.schema.clone().unwrap_or_else(|| descriptor.schema.clone());
                let kind = OperandKind::Table {
                    schema,
                    rows: stats.row_count(&descriptor),
                    referenced: table.referenced_columns(),
                    descriptor,
                };
                (table.exposed_name().to_string(), kind)
            }
            ResultSetNode::Subquery(derived) => {
                let kind = OperandKind::Materialized {
                    estimate: derived.query.cost().ok_or_else(not_costed)?,
                    row_width: row_width(&derived.result_columns),
                    correlated: is_correlated(&derived.query, derived.level),
                };
                (derived.alias.clone(), kind)
            }
            ResultSetNode::Values(values) => {
                let kind = OperandKind::Materialized {
                    estimate: values.cost.ok_or_else(not_costed)?,
                    row_width: row_width(&values.result_columns),
                    correlated: false,
                };
                (format!("VALUES #{}", table_number), kind)
            }
            ResultSetNode::Join(join) => {
                let kind = OperandKind::Materialized {
                    estimate: join.cost.ok_or_else(not_costed)?,
                    row_width: row_width(&join.result_columns),
                    correlated: false,
                };
                (format!("{} JOIN #{}", join.kind.sql(), table_number), kind)
            }
            other => {
                return Err(OptimizeError::Unsupported(format!("{} in a FROM list", other.node_name())));
            }
        };

        Ok(Self {
            table_number,
            name,
            covered: node.covered_tables(),
            dependencies: node.required_predecessors(),
            role: node.join_role(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::optimizer::OptimizerConfig;
    use crate::tree::{BaseTableNode, JoinKind, JoinNode, Position, TableName};

    fn table(number: usize) -> ResultSetNode {
        let descriptor = TableBuilder::new(format!("T{}", number))
            .column("A", crate::tree::DataType::integer())
            .row_count(40)
            .build()
            .unwrap();
        let mut node = BaseTableNode::new(TableName::new(Some("APP"), format!("T{}", number)), None, Position::default());
        node.table_number = Some(number);
        node.descriptor = Some(Arc::new(descriptor));
        ResultSetNode::BaseTable(node)
    }

    #[test]
    fn test_table_operand() {
        let catalog = InMemoryCatalog::new();
        let config = OptimizerConfig::default();
        let stats = StatisticsAdapter::new(&catalog, &config);
        let mut node = table(3);
        if let ResultSetNode::BaseTable(t) = &mut node {
            t.dependency_map = TableMap::single(1);
            t.join_role = JoinRole::Exists;
        }
        let operand = Operand::from_node(&node, &stats).unwrap();
        assert_eq!(operand.table_number, 3);
        assert_eq!(operand.dependencies, TableMap::single(1));
        assert_eq!(operand.role, JoinRole::Exists);
        assert!(matches!(operand.kind, OperandKind::Table { rows, .. } if rows.rows == 40.0));
        assert_eq!(operand.row_width(), 1);
    }

    #[test]
    fn test_outer_join_needs_cost() {
        let catalog = InMemoryCatalog::new();
        let config = OptimizerConfig::default();
        let stats = StatisticsAdapter::new(&catalog, &config);
        let mut join = JoinNode::new(JoinKind::LeftOuter, table(0), table(1), None);
        join.table_number = Some(2);
        let mut node = ResultSetNode::Join(join);
        assert!(matches!(Operand::from_node(&node, &stats), Err(OptimizeError::Unsupported(_))));

        if let ResultSetNode::Join(j) = &mut node {
            j.cost = Some(CostEstimate::new(5.0, 40.0, 40.0));
        }
        let operand = Operand::from_node(&node, &stats).unwrap();
        assert_eq!(operand.covered.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
