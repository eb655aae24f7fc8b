//! Cost-based optimization of a bound statement.
//!
//! Query blocks are optimized bottom-up: derived table bodies, outer joins
//! and expression subqueries first, so every FROM list entry of a block is
//! costed before the block's own join order is searched.

use crate::binder::{CompileFacts, CompileWarning, DependencyKind, Numbering};
use crate::catalog::Catalog;
use crate::tree::{
    JoinNode, PredicateRole, ResultSetNode, SelectNode, SetOp, Statement, SubqueryNode, TableMap, ValueNode,
};

use super::access_path::{ChosenAccess, ConglomerateKind};
use super::config::OptimizerConfig;
use super::cost::{constants, CostEstimate};
use super::error::{OptimizeError, OptimizeResult};
use super::join_strategy::JoinStrategyKind;
use super::optimizable::{Operand, OperandKind, Optimizable};
use super::ordering::{remove_redundant_order_columns, RequiredOrder};
use super::pushdown::{build_join_tree, mark_referenced, push_into_derived};
use super::search::{applicable, JoinOrderSearch, Placer};
use super::stats::StatisticsAdapter;
use super::trace::{OptimizerTrace, TraceEvent};

/// Chooses join orders, access paths and join strategies for every query
/// block of a statement, in place.
pub struct Optimizer<'a> {
    catalog: &'a dyn Catalog,
    config: &'a OptimizerConfig,
    trace: &'a dyn OptimizerTrace,
}

/// Subquery bodies nested in the expressions of `value`.
fn nested_queries<'v>(value: &'v mut ValueNode, out: &mut Vec<&'v mut ResultSetNode>) {
    match value {
        ValueNode::Subquery(SubqueryNode { operand, query, .. }) => {
            if let Some(operand) = operand {
                nested_queries(operand, out);
            }
            out.push(query.as_mut());
        }
        other => {
            for child in other.children_mut() {
                nested_queries(child, out);
            }
        }
    }
}

fn join_queries<'v>(node: &'v mut ResultSetNode, out: &mut Vec<&'v mut ResultSetNode>) {
    if let ResultSetNode::Join(join) = node {
        for predicate in join.predicates.iter_mut() {
            nested_queries(&mut predicate.expr, out);
        }
        join_queries(&mut join.left, out);
        join_queries(&mut join.right, out);
    }
}

/// Bodies of the subqueries a block evaluates as expressions.
fn expression_queries(select: &mut SelectNode) -> Vec<&mut ResultSetNode> {
    let mut out = Vec::new();
    for column in select.result_columns.iter_mut() {
        nested_queries(&mut column.expression, &mut out);
    }
    for predicate in select.predicates.iter_mut() {
        nested_queries(&mut predicate.expr, &mut out);
    }
    for expr in select.group_by.iter_mut().chain(select.having.iter_mut()) {
        nested_queries(expr, &mut out);
    }
    for item in select.from_list.iter_mut() {
        join_queries(item, &mut out);
    }
    out
}

impl<'a> Optimizer<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a OptimizerConfig, trace: &'a dyn OptimizerTrace) -> Self {
        Self { catalog, config, trace }
    }

    /// Optimize every query block of `statement`.
    pub fn optimize(
        &self,
        statement: &mut Statement,
        numbering: &mut Numbering,
        facts: &mut CompileFacts,
    ) -> OptimizeResult<()> {
        log::debug!("optimizing {} statement", statement.kind());
        if self.trace.enabled() {
            self.trace.event(TraceEvent::StartStatement { kind: statement.kind().to_string() });
        }

        let mut required = None;
        if let Statement::Cursor(cursor) = statement {
            if let (ResultSetNode::Select(select), Some(order_by)) = (&mut cursor.query, &mut cursor.order_by) {
                remove_redundant_order_columns(select, order_by, facts);
                required = RequiredOrder::for_select(order_by, select);
            }
        }
        mark_referenced(statement.query_mut());

        let stats = StatisticsAdapter::new(self.catalog, self.config);
        self.optimize_query(statement.query_mut(), required.as_ref(), &stats, numbering, facts)?;

        if self.trace.enabled() {
            self.trace.event(TraceEvent::EndStatement);
        }
        Ok(())
    }

    fn optimize_query(
        &self,
        node: &mut ResultSetNode,
        order: Option<&RequiredOrder>,
        stats: &StatisticsAdapter<'_>,
        numbering: &mut Numbering,
        facts: &mut CompileFacts,
    ) -> OptimizeResult<()> {
        match node {
            ResultSetNode::Select(select) => self.optimize_select(select, order, stats, numbering, facts),
            ResultSetNode::SetOperator(set) => {
                self.optimize_query(&mut set.left, None, stats, numbering, facts)?;
                self.optimize_query(&mut set.right, None, stats, numbering, facts)?;
                let left = set.left.cost().unwrap_or_default();
                let right = set.right.cost().unwrap_or_default();
                let rows = match set.op {
                    SetOp::Union => left.row_count + right.row_count,
                    SetOp::Intersect => left.row_count.min(right.row_count),
                    SetOp::Except => left.row_count,
                };
                set.cost = Some(CostEstimate::new(left.cost + right.cost, rows, rows));
                Ok(())
            }
            ResultSetNode::Values(values) => {
                let mut nested = Vec::new();
                for cell in values.rows.iter_mut().flatten() {
                    nested_queries(cell, &mut nested);
                }
                for query in nested {
                    self.optimize_query(query, None, stats, numbering, facts)?;
                }
                let rows = values.rows.len() as f64;
                values.cost = Some(CostEstimate::new(
                    constants::HEAP_SCAN_OPEN + rows * constants::MATERIALIZED_ROW,
                    rows,
                    rows,
                ));
                Ok(())
            }
            ResultSetNode::Subquery(derived) => self.optimize_query(&mut derived.query, None, stats, numbering, facts),
            _ => Ok(()),
        }
    }

    /// Cost everything nested in a FROM list entry.
    fn prepare_operand(
        &self,
        node: &mut ResultSetNode,
        level: usize,
        stats: &StatisticsAdapter<'_>,
        numbering: &mut Numbering,
        facts: &mut CompileFacts,
    ) -> OptimizeResult<()> {
        match node {
            ResultSetNode::Join(join) => self.cost_outer_join(join, level, stats, numbering, facts),
            ResultSetNode::BaseTable(_) => Ok(()),
            other => self.optimize_query(other, None, stats, numbering, facts),
        }
    }

    /// Outer joins keep their written order: the preserved side is scanned
    /// once, the other side joined to it with the ON predicates.
    fn cost_outer_join(
        &self,
        join: &mut JoinNode,
        level: usize,
        stats: &StatisticsAdapter<'_>,
        numbering: &mut Numbering,
        facts: &mut CompileFacts,
    ) -> OptimizeResult<()> {
        self.prepare_operand(&mut join.left, level, stats, numbering, facts)?;
        self.prepare_operand(&mut join.right, level, stats, numbering, facts)?;
        let left = Operand::from_node(&join.left, stats)?;
        let right = Operand::from_node(&join.right, stats)?;
        self.note_statistics(&left, facts);
        self.note_statistics(&right, facts);

        let placer = Placer { config: self.config, stats, trace: self.trace, level };
        let left_access = placer
            .best_access(&left, &[], &TableMap::new(), 1.0, 0, None)
            .ok_or_else(|| OptimizeError::NoAccessPath { table: left.name.clone() })?;
        let on = applicable(&join.predicates, &right.covered, &left.covered);
        let right_access = placer
            .best_access(&right, &on, &left.covered, left_access.cost.row_count, 1, None)
            .ok_or_else(|| OptimizeError::NoAccessPath { table: right.name.clone() })?;

        let key_role = match right_access.strategy {
            JoinStrategyKind::Hash => PredicateRole::HashKey,
            JoinStrategyKind::NestedLoop => PredicateRole::IndexKey,
        };
        for predicate in join.predicates.iter_mut() {
            if right_access.key_predicates.contains(&predicate.id) {
                predicate.role = key_role;
            }
        }
        let rows = left_access.cost.row_count.max(right_access.cost.row_count);
        join.cost = Some(CostEstimate::new(left_access.cost.cost + right_access.cost.cost, rows, rows));
        join.strategy = Some(right_access.strategy);
        log::trace!("{} join #{:?}: {}", join.kind.sql(), join.table_number, rows);

        self.record_indexes(&left, &left_access, facts);
        self.record_indexes(&right, &right_access, facts);
        join.left.set_access(left_access);
        join.right.set_access(right_access);
        Ok(())
    }

    fn optimize_select(
        &self,
        select: &mut SelectNode,
        order: Option<&RequiredOrder>,
        stats: &StatisticsAdapter<'_>,
        numbering: &mut Numbering,
        facts: &mut CompileFacts,
    ) -> OptimizeResult<()> {
        let level = select.level;
        if self.trace.enabled() {
            self.trace.event(TraceEvent::StartQueryBlock { level, tables: select.from_list.len() });
        }

        push_into_derived(select, numbering);
        for item in select.from_list.iter_mut() {
            self.prepare_operand(item, level, stats, numbering, facts)?;
        }
        for query in expression_queries(select) {
            self.optimize_query(query, None, stats, numbering, facts)?;
        }

        if select.from_list.is_empty() {
            select.cost = Some(CostEstimate::unit());
            self.end_block(level, select.cost);
            return Ok(());
        }

        let operands = select
            .from_list
            .iter()
            .map(|node| Operand::from_node(node, stats))
            .collect::<OptimizeResult<Vec<_>>>()?;
        for operand in &operands {
            self.note_statistics(operand, facts);
        }

        let placer = Placer { config: self.config, stats, trace: self.trace, level };
        let outcome = JoinOrderSearch::new(&placer, &operands, &select.predicates, order).run()?;
        if outcome.timed_out {
            facts.warn(CompileWarning::OptimizerTimeout {
                elapsed_ms: outcome.elapsed_ms,
                permutations: outcome.permutations,
            });
        }
        for (&index, access) in outcome.order.iter().zip(&outcome.accesses) {
            self.record_indexes(&operands[index], access, facts);
        }

        let from_list = std::mem::take(&mut select.from_list);
        let plan = build_join_tree(from_list, &operands, &outcome, &mut select.predicates)
            .ok_or_else(|| OptimizeError::Unsupported(format!("join order {:?} is incomplete", outcome.order)))?;
        log::debug!(
            "level {} join order {:?}: {}{}",
            level,
            outcome.order.iter().map(|&i| operands[i].name.as_str()).collect::<Vec<_>>(),
            outcome.cost,
            if outcome.sort_avoided { ", sort avoided" } else { "" }
        );
        select.plan = Some(Box::new(plan));
        select.cost = Some(outcome.cost);
        select.sort_avoided = outcome.sort_avoided;
        self.end_block(level, select.cost);
        Ok(())
    }

    fn end_block(&self, level: usize, cost: Option<CostEstimate>) {
        if self.trace.enabled() {
            self.trace.event(TraceEvent::EndQueryBlock { level, cost });
        }
    }

    fn note_statistics(&self, operand: &Operand, facts: &mut CompileFacts) {
        if let OperandKind::Table { schema, descriptor, rows, .. } = &operand.kind {
            if self.config.use_statistics && !rows.from_statistics {
                facts.warn(CompileWarning::StatisticsUnavailable {
                    table: format!("{}.{}", schema, descriptor.name),
                });
            }
        }
    }

    fn record_indexes(&self, operand: &Operand, access: &ChosenAccess, facts: &mut CompileFacts) {
        if let (OperandKind::Table { schema, .. }, ConglomerateKind::Index { .. }) =
            (&operand.kind, &access.conglomerate.kind)
        {
            facts.depend(DependencyKind::Index, schema, &access.conglomerate.name);
        }
    }
}
