//! Join-order search.
//!
//! Two single orders are costed first: the first legal order in FROM-list
//! order, then the operands sorted by estimated rows. The cheaper of the two
//! bounds the full walk, which enumerates permutations depth first in
//! FROM-list order and skips both orders already costed. Each placement picks the cheapest conglomerate and join strategy
//! for the operand given the tables already placed. Two paths are kept per
//! prefix: the cheapest one, and the cheapest one that still delivers the
//! required ordering, since a pricier ordered path can beat a cheap path
//! followed by a sort.

use std::time::Instant;

use crate::catalog::TableDescriptor;
use crate::tree::{BinaryOp, Predicate, PredicateId, PredicateList, TableMap};

use super::access_path::{
    materialized_scan, residual_selectivity, rule_rank, ChosenAccess, Conglomerate, ConglomerateKind, LockMode,
    TableAccess,
};
use super::config::{JoinOrderMode, OptimizerConfig};
use super::cost::{selectivity, sort_cost, CostEstimate};
use super::error::{OptimizeError, OptimizeResult};
use super::join_strategy::{
    adjust_for_role, fits_in_memory, hash_join, hash_keys, key_selectivity, nested_loop, JoinStrategyKind,
};
use super::optimizable::{Operand, OperandKind};
use super::ordering::RequiredOrder;
use super::stats::StatisticsAdapter;
use super::trace::{OptimizerTrace, TraceEvent};

/// Costs the placement of one operand after a set of placed tables.
pub(crate) struct Placer<'a> {
    pub config: &'a OptimizerConfig,
    pub stats: &'a StatisticsAdapter<'a>,
    pub trace: &'a dyn OptimizerTrace,
    /// Level of the query block being optimized.
    pub level: usize,
}

/// Predicates that become evaluable when an operand covering `covered`
/// joins the tables in `placed`.
pub(crate) fn applicable<'p>(predicates: &'p PredicateList, covered: &TableMap, placed: &TableMap) -> Vec<&'p Predicate> {
    let available = placed.union(covered);
    predicates
        .iter()
        .filter(|p| p.referenced_tables.intersects(covered) && p.referenced_tables.is_subset_of(&available))
        .collect()
}

fn is_unique_column(descriptor: &TableDescriptor, column: usize) -> bool {
    descriptor
        .indexes
        .iter()
        .any(|index| index.unique && descriptor.index_key_positions(index) == [column])
}

impl Placer<'_> {
    /// Cheapest way to join `operand` to `placed`. With `order`, only
    /// access paths delivering that ordering qualify.
    pub fn best_access(
        &self,
        operand: &Operand,
        predicates: &[&Predicate],
        placed: &TableMap,
        outer_rows: f64,
        position: usize,
        order: Option<&RequiredOrder>,
    ) -> Option<ChosenAccess> {
        let mut candidates: Vec<(u8, ChosenAccess)> = Vec::new();
        match &operand.kind {
            OperandKind::Table { descriptor, rows, referenced, .. } => {
                let access = TableAccess {
                    table_number: operand.table_number,
                    level: self.level,
                    descriptor,
                    rows: rows.rows,
                    referenced,
                };
                for (conglomerate, scan) in access.scans(predicates, placed, self.stats) {
                    if let Some(order) = order {
                        if !self.provides_order(order, operand, descriptor, &conglomerate, predicates) {
                            continue;
                        }
                    }
                    let step = adjust_for_role(operand.role, outer_rows, nested_loop(outer_rows, &scan));
                    let rank = rule_rank(&conglomerate, &scan);
                    candidates.push((
                        rank,
                        ChosenAccess {
                            conglomerate,
                            strategy: JoinStrategyKind::NestedLoop,
                            lock_mode: LockMode::for_scan(
                                scan.has_keys(),
                                scan.rows_read * outer_rows,
                                self.config.table_lock_threshold,
                            ),
                            covering: scan.covering,
                            cost: step,
                            key_predicates: scan.key_predicates,
                        },
                    ));
                }
                if order.is_none() && !self.config.rule_based && position > 0 {
                    if let Some(hash) = self.hash_table(operand, &access, predicates, placed, outer_rows) {
                        candidates.push((u8::MAX, hash));
                    }
                }
            }
            OperandKind::Materialized { estimate, correlated, .. } => {
                if order.is_some() {
                    return None;
                }
                let scan = materialized_scan(estimate, predicates);
                candidates.push((
                    0,
                    ChosenAccess {
                        conglomerate: Conglomerate::materialized(&operand.name),
                        strategy: JoinStrategyKind::NestedLoop,
                        lock_mode: LockMode::Row,
                        covering: false,
                        cost: adjust_for_role(operand.role, outer_rows, nested_loop(outer_rows, &scan)),
                        key_predicates: Vec::new(),
                    },
                ));
                if !*correlated && !self.config.rule_based && position > 0 {
                    let keys = hash_keys(predicates, operand.table_number, self.level, placed);
                    let own: Vec<&Predicate> = predicates
                        .iter()
                        .copied()
                        .filter(|p| p.referenced_tables.is_subset_of(&operand.covered))
                        .collect();
                    let build = materialized_scan(estimate, &own);
                    let fits = fits_in_memory(build.rows, operand.row_width(), self.config.max_memory_per_table);
                    if !keys.is_empty() && fits {
                        let key_ids: Vec<PredicateId> = keys.iter().map(|(id, _)| *id).collect();
                        let joins: Vec<&Predicate> = predicates
                            .iter()
                            .copied()
                            .filter(|p| !p.referenced_tables.is_subset_of(&operand.covered))
                            .collect();
                        let selectivity =
                            selectivity::EQUALS.powi(keys.len() as i32) * residual_selectivity(&joins, &key_ids);
                        candidates.push((
                            u8::MAX,
                            ChosenAccess {
                                conglomerate: Conglomerate::materialized(&operand.name),
                                strategy: JoinStrategyKind::Hash,
                                lock_mode: LockMode::Row,
                                covering: false,
                                cost: adjust_for_role(operand.role, outer_rows, hash_join(outer_rows, &build, selectivity)),
                                key_predicates: key_ids,
                            },
                        ));
                    }
                }
            }
        }

        if self.trace.enabled() {
            for (_, candidate) in &candidates {
                self.trace.event(TraceEvent::ConglomerateCost {
                    table: operand.table_number,
                    conglomerate: candidate.conglomerate.to_string(),
                    strategy: candidate.strategy.to_string(),
                    cost: candidate.cost,
                });
            }
        }
        for (_, candidate) in &candidates {
            log::trace!(
                "#{} via {} ({}): {}",
                operand.table_number,
                candidate.conglomerate,
                candidate.strategy,
                candidate.cost
            );
        }

        let mut best: Option<(u8, ChosenAccess)> = None;
        for (rank, candidate) in candidates {
            let better = match &best {
                None => true,
                Some((best_rank, _)) if self.config.rule_based => rank < *best_rank,
                Some((_, current)) => candidate.cost.is_cheaper_than(&current.cost),
            };
            if better {
                best = Some((rank, candidate));
            }
        }
        best.map(|(_, access)| access)
    }

    /// Hash join with `operand` as the build side: the build reads the table
    /// once with its single-table predicates, the equijoins probe it.
    fn hash_table(
        &self,
        operand: &Operand,
        access: &TableAccess<'_>,
        predicates: &[&Predicate],
        placed: &TableMap,
        outer_rows: f64,
    ) -> Option<ChosenAccess> {
        let keys = hash_keys(predicates, operand.table_number, self.level, placed);
        if keys.is_empty() {
            return None;
        }
        let own: Vec<&Predicate> = predicates
            .iter()
            .copied()
            .filter(|p| p.referenced_tables.is_subset_of(&operand.covered))
            .collect();
        let (conglomerate, build) = access
            .scans(&own, &TableMap::new(), self.stats)
            .into_iter()
            .reduce(|best, next| if next.1.cost < best.1.cost { next } else { best })?;
        if !fits_in_memory(build.rows, operand.row_width(), self.config.max_memory_per_table) {
            log::trace!("#{} is too large to hash", operand.table_number);
            return None;
        }

        let key_ids: Vec<PredicateId> = keys.iter().map(|(id, _)| *id).collect();
        let joins: Vec<&Predicate> = predicates
            .iter()
            .copied()
            .filter(|p| !p.referenced_tables.is_subset_of(&operand.covered))
            .collect();
        let selectivity = keys
            .iter()
            .map(|(_, column)| key_selectivity(is_unique_column(access.descriptor, *column), access.rows))
            .product::<f64>()
            * residual_selectivity(&joins, &key_ids);

        let cost = adjust_for_role(operand.role, outer_rows, hash_join(outer_rows, &build, selectivity));
        let lock_mode = LockMode::for_scan(build.has_keys(), build.rows_read, self.config.table_lock_threshold);
        let mut key_predicates = build.key_predicates;
        key_predicates.extend(key_ids);
        Some(ChosenAccess {
            conglomerate,
            strategy: JoinStrategyKind::Hash,
            lock_mode,
            covering: build.covering,
            cost,
            key_predicates,
        })
    }

    fn provides_order(
        &self,
        order: &RequiredOrder,
        operand: &Operand,
        descriptor: &TableDescriptor,
        conglomerate: &Conglomerate,
        predicates: &[&Predicate],
    ) -> bool {
        if order.table_number != operand.table_number {
            return false;
        }
        let ConglomerateKind::Index { .. } = conglomerate.kind else {
            return false;
        };
        let Some(index) = descriptor.index(&conglomerate.name) else {
            return false;
        };
        let bound: Vec<usize> = predicates
            .iter()
            .filter_map(|p| p.column_comparison(operand.table_number, self.level))
            .filter(|c| c.op == BinaryOp::Eq && c.other_tables.is_empty())
            .map(|c| c.column_position)
            .collect();
        order.satisfied_by(&descriptor.index_key_positions(index), &bound)
    }
}

/// Accesses chosen for a join prefix.
#[derive(Debug, Clone)]
struct Path {
    accesses: Vec<ChosenAccess>,
    /// Cumulative estimate after each placement.
    steps: Vec<CostEstimate>,
    total: CostEstimate,
}

impl Path {
    fn start() -> Self {
        Self {
            accesses: Vec::new(),
            steps: Vec::new(),
            total: CostEstimate::unit(),
        }
    }

    fn extend(&self, access: ChosenAccess) -> Self {
        let total = self.total.add(&access.cost);
        let mut next = self.clone();
        next.accesses.push(access);
        next.steps.push(total);
        next.total = total;
        next
    }
}

/// The plan a search settled on.
#[derive(Debug, Clone)]
pub(crate) struct SearchOutcome {
    /// Operand indexes in join order.
    pub order: Vec<usize>,
    /// Access of each operand, parallel to `order`.
    pub accesses: Vec<ChosenAccess>,
    /// Cumulative estimate after each placement, parallel to `order`.
    pub steps: Vec<CostEstimate>,
    /// Total estimate, including a final sort when one is needed.
    pub cost: CostEstimate,
    pub sort_avoided: bool,
    pub timed_out: bool,
    pub permutations: usize,
    pub elapsed_ms: u64,
}

struct BestPlan {
    order: Vec<usize>,
    path: Path,
    cost: CostEstimate,
    sort_avoided: bool,
}

pub(crate) struct JoinOrderSearch<'a> {
    placer: &'a Placer<'a>,
    operands: &'a [Operand],
    predicates: &'a PredicateList,
    order: Option<&'a RequiredOrder>,
    started: Instant,
    permutations: usize,
    timed_out: bool,
    best: Option<BestPlan>,
    /// Orders costed before the full walk.
    first_looks: Vec<Vec<usize>>,
}

impl<'a> JoinOrderSearch<'a> {
    pub fn new(
        placer: &'a Placer<'a>,
        operands: &'a [Operand],
        predicates: &'a PredicateList,
        order: Option<&'a RequiredOrder>,
    ) -> Self {
        Self {
            placer,
            operands,
            predicates,
            order,
            started: Instant::now(),
            permutations: 0,
            timed_out: false,
            best: None,
            first_looks: Vec::new(),
        }
    }

    pub fn run(mut self) -> OptimizeResult<SearchOutcome> {
        if self.placer.config.join_order == JoinOrderMode::Fixed {
            self.check_fixed_order()?;
            let from_list: Vec<usize> = (0..self.operands.len()).collect();
            self.walk(Some(from_list.as_slice()))?;
        } else {
            self.first_look()?;
            self.walk(None)?;
        }

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let Some(best) = self.best else {
            return Err(OptimizeError::NoBestPlan {
                tables: self.operands.len(),
                timed_out: self.timed_out,
            });
        };
        log::debug!(
            "join order search at level {}: {} orders in {} ms, best {}",
            self.placer.level,
            self.permutations,
            elapsed_ms,
            best.cost
        );
        Ok(SearchOutcome {
            order: best.order,
            accesses: best.path.accesses,
            steps: best.path.steps,
            cost: best.cost,
            sort_avoided: best.sort_avoided,
            timed_out: self.timed_out,
            permutations: self.permutations,
            elapsed_ms,
        })
    }

    fn table_numbers(&self, order: &[usize]) -> Vec<usize> {
        order.iter().map(|&i| self.operands[i].table_number).collect()
    }

    /// Cost the first legal order, then jump to the order by ascending row
    /// estimate so the full walk starts with a tight bound.
    fn first_look(&mut self) -> OptimizeResult<()> {
        let Some(first) = self.legal_order(|_| 0.0) else {
            return Ok(());
        };
        self.walk(Some(first.as_slice()))?;
        let jump = self.legal_order(Operand::estimated_rows);
        self.first_looks.push(first);
        if let Some(jump) = jump {
            if !self.first_looks.contains(&jump) {
                log::trace!("jumping to join order {:?}", self.table_numbers(&jump));
                self.walk(Some(jump.as_slice()))?;
                self.first_looks.push(jump);
            }
        }
        Ok(())
    }

    /// Greedy order honoring dependencies: at each position the placeable
    /// operand with the lowest `key`, FROM-list position breaking ties.
    /// None when the dependencies admit no order.
    fn legal_order(&self, key: impl Fn(&Operand) -> f64) -> Option<Vec<usize>> {
        let mut order = Vec::with_capacity(self.operands.len());
        let mut placed = TableMap::new();
        while order.len() < self.operands.len() {
            let next = self
                .operands
                .iter()
                .enumerate()
                .filter(|(index, operand)| !order.contains(index) && operand.dependencies.is_subset_of(&placed))
                .min_by(|(_, a), (_, b)| key(*a).total_cmp(&key(*b)))
                .map(|(index, _)| index)?;
            placed.or(&self.operands[next].covered);
            order.push(next);
        }
        Some(order)
    }

    /// Walk every permutation, or only `only`.
    fn walk(&mut self, only: Option<&[usize]>) -> OptimizeResult<()> {
        let mut prefix = Vec::with_capacity(self.operands.len());
        self.extend(&mut prefix, &TableMap::new(), &Path::start(), None, only)
    }

    fn check_fixed_order(&self) -> OptimizeResult<()> {
        let mut placed = TableMap::new();
        for operand in self.operands {
            if !operand.dependencies.is_subset_of(&placed) {
                let names: Vec<&str> = self.operands.iter().map(|o| o.name.as_str()).collect();
                return Err(OptimizeError::IllegalForcedJoinOrder { order: names.join(", ") });
            }
            placed.or(&operand.covered);
        }
        Ok(())
    }

    fn extend(
        &mut self,
        prefix: &mut Vec<usize>,
        placed: &TableMap,
        normal: &Path,
        ordered: Option<&Path>,
        only: Option<&[usize]>,
    ) -> OptimizeResult<()> {
        let operands = self.operands;
        if prefix.len() == operands.len() {
            self.complete(prefix, normal, ordered);
            return Ok(());
        }
        let placer = self.placer;
        let position = prefix.len();
        for (index, operand) in operands.iter().enumerate() {
            if self.timed_out {
                break;
            }
            if prefix.contains(&index) || only.map_or(false, |order| order[position] != index) {
                continue;
            }
            if !operand.dependencies.is_subset_of(placed) {
                if placer.trace.enabled() {
                    let mut order = self.table_numbers(prefix);
                    order.push(operand.table_number);
                    placer.trace.event(TraceEvent::SkippingJoinOrder {
                        order,
                        reason: format!("#{} must follow {}", operand.table_number, operand.dependencies),
                    });
                }
                continue;
            }

            let predicates = applicable(self.predicates, &operand.covered, placed);
            let access = placer
                .best_access(operand, &predicates, placed, normal.total.row_count, position, None)
                .ok_or_else(|| OptimizeError::NoAccessPath { table: operand.name.clone() })?;
            let next_normal = normal.extend(access);
            let next_ordered = match (ordered, self.order) {
                (Some(path), _) => placer
                    .best_access(operand, &predicates, placed, path.total.row_count, position, None)
                    .map(|access| path.extend(access)),
                (None, Some(order)) if position == 0 => placer
                    .best_access(operand, &predicates, placed, 1.0, position, Some(order))
                    .map(|access| Path::start().extend(access)),
                (None, _) => None,
            };
            prefix.push(index);
            self.poll_timeout();

            if let Some(best) = &self.best {
                let too_costly = |path: &Path| path.total.cost >= best.cost.cost;
                if too_costly(&next_normal) && next_ordered.as_ref().map_or(true, too_costly) {
                    if placer.trace.enabled() {
                        placer.trace.event(TraceEvent::SkippingJoinOrder {
                            order: self.table_numbers(prefix),
                            reason: "costs more than the best plan".to_string(),
                        });
                    }
                    prefix.pop();
                    continue;
                }
            }

            let mut next_placed = placed.clone();
            next_placed.or(&operand.covered);
            self.extend(prefix, &next_placed, &next_normal, next_ordered.as_ref(), only)?;
            prefix.pop();
        }
        Ok(())
    }

    fn complete(&mut self, prefix: &[usize], normal: &Path, ordered: Option<&Path>) {
        if self.first_looks.iter().any(|order| order.as_slice() == prefix) {
            return;
        }
        self.permutations += 1;
        let trace = self.placer.trace;
        if trace.enabled() {
            trace.event(TraceEvent::ConsideringJoinOrder { order: self.table_numbers(prefix) });
        }

        let mut total = normal.total;
        if self.order.is_some() {
            total.cost += sort_cost(total.row_count);
        }
        let (path, cost, sort_avoided) = match ordered {
            Some(ordered) if ordered.total.is_cheaper_than(&total) => (ordered, ordered.total, true),
            _ => (normal, total, false),
        };

        if self.best.as_ref().map_or(true, |best| cost.is_cheaper_than(&best.cost)) {
            if trace.enabled() {
                trace.event(TraceEvent::RememberingBestPlan {
                    order: self.table_numbers(prefix),
                    cost,
                    sort_avoided,
                });
            }
            self.best = Some(BestPlan {
                order: prefix.to_vec(),
                path: path.clone(),
                cost,
                sort_avoided,
            });
        }
    }

    fn poll_timeout(&mut self) {
        if self.timed_out {
            return;
        }
        let config = self.placer.config;
        let elapsed = self.started.elapsed();
        let budget_spent = config.time_budget_duration().map_or(false, |budget| elapsed >= budget);
        let past_best_cost = !config.no_timeout
            && self.operands.len() > config.timeout_min_tables
            && self
                .best
                .as_ref()
                .map_or(false, |best| elapsed.as_millis() as f64 > best.cost.cost);
        if budget_spent || past_best_cost {
            self.timed_out = true;
            let elapsed_ms = elapsed.as_millis() as u64;
            log::debug!("join order search timed out after {} ms", elapsed_ms);
            if self.placer.trace.enabled() {
                self.placer.trace.event(TraceEvent::Timeout { elapsed_ms });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::optimizer::stats::RowEstimate;
    use crate::optimizer::trace::{CollectingTrace, NoopTrace};
    use crate::tree::{ColumnReference, ColumnSource, DataType, JoinRole, Position, ValueNode};

    fn col(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: None,
            column: "ID".into(),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    fn equijoin(id: usize, left: usize, right: usize) -> Predicate {
        Predicate::new(
            PredicateId(id),
            ValueNode::typed_binary(BinaryOp::Eq, col(left, 0), col(right, 0), DataType::boolean()),
            0,
        )
    }

    fn operand(number: usize, rows: u64, unique_id: bool) -> Operand {
        let mut builder = TableBuilder::new(format!("T{}", number))
            .column("ID", DataType::integer())
            .column("V", DataType::integer());
        if unique_id {
            builder = builder.index(format!("T{}_ID", number), &["ID"], true);
        }
        let descriptor = builder.build().unwrap();
        Operand {
            table_number: number,
            name: format!("T{}", number),
            covered: TableMap::single(number),
            dependencies: TableMap::new(),
            role: JoinRole::Plain,
            kind: OperandKind::Table {
                schema: "APP".into(),
                descriptor: Arc::new(descriptor),
                rows: RowEstimate { rows: rows as f64, from_statistics: true },
                referenced: vec![0, 1],
            },
        }
    }

    fn search(
        operands: &[Operand],
        predicates: &PredicateList,
        config: &OptimizerConfig,
        trace: &dyn OptimizerTrace,
    ) -> OptimizeResult<SearchOutcome> {
        let catalog = InMemoryCatalog::new();
        let stats = StatisticsAdapter::new(&catalog, config);
        let placer = Placer { config, stats: &stats, trace, level: 0 };
        JoinOrderSearch::new(&placer, operands, predicates, None).run()
    }

    #[test]
    fn test_small_outer_probes_unique_index() {
        let operands = [operand(0, 10, false), operand(1, 1000, true)];
        let predicates: PredicateList = vec![equijoin(0, 0, 1)].into_iter().collect();
        let outcome = search(&operands, &predicates, &OptimizerConfig::default(), &NoopTrace).unwrap();
        assert_eq!(outcome.order, vec![0, 1]);
        assert!(outcome.accesses[1].conglomerate.is_index());
        assert_eq!(outcome.accesses[1].strategy, JoinStrategyKind::NestedLoop);
        assert!((outcome.cost.cost - 45.5).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_inner_is_hashed() {
        let operands = [operand(0, 10, false), operand(1, 2, true)];
        let predicates: PredicateList = vec![equijoin(0, 0, 1)].into_iter().collect();
        let outcome = search(&operands, &predicates, &OptimizerConfig::default(), &NoopTrace).unwrap();
        assert_eq!(outcome.order, vec![0, 1]);
        assert_eq!(outcome.accesses[1].strategy, JoinStrategyKind::Hash);
        assert_eq!(outcome.accesses[1].key_predicates, vec![PredicateId(0)]);
        assert!((outcome.cost.cost - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_dependencies_are_never_violated() {
        let mut operands = vec![operand(0, 100, false), operand(1, 5, false), operand(2, 50, false), operand(3, 1, false)];
        operands[3].dependencies = [0, 2].into_iter().collect();
        operands[1].dependencies = TableMap::single(2);
        let trace = CollectingTrace::new();
        let outcome = search(&operands, &PredicateList::new(), &OptimizerConfig::default(), &trace).unwrap();

        let position = |n: usize| outcome.order.iter().position(|&i| i == n).unwrap();
        assert!(position(3) > position(0) && position(3) > position(2));
        assert!(position(1) > position(2));
        for event in trace.events() {
            if let TraceEvent::ConsideringJoinOrder { order } = event {
                let at = |n: usize| order.iter().position(|&t| t == n).unwrap();
                assert!(at(3) > at(0) && at(3) > at(2) && at(1) > at(2));
            }
        }
    }

    #[test]
    fn test_row_sorted_order_bounds_the_walk() {
        let operands = [operand(0, 1000, false), operand(1, 500, false), operand(2, 100, false), operand(3, 10, false)];
        let trace = CollectingTrace::new();
        let config = OptimizerConfig::default().no_timeout(true);
        let outcome = search(&operands, &PredicateList::new(), &config, &trace).unwrap();

        assert_eq!(outcome.order, vec![3, 2, 1, 0]);
        // Every order after the two first looks is abandoned before it completes.
        assert_eq!(outcome.permutations, 2);
        let remembered: Vec<Vec<usize>> = trace
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::RememberingBestPlan { order, .. } => Some(order),
                _ => None,
            })
            .collect();
        assert_eq!(remembered, vec![vec![0, 1, 2, 3], vec![3, 2, 1, 0]]);
    }

    #[test]
    fn test_fixed_order() {
        let mut operands = vec![operand(0, 1000, false), operand(1, 2, false)];
        let config = OptimizerConfig::default().join_order(JoinOrderMode::Fixed);
        let outcome = search(&operands, &PredicateList::new(), &config, &NoopTrace).unwrap();
        assert_eq!(outcome.order, vec![0, 1]);
        assert_eq!(outcome.permutations, 1);

        operands[0].dependencies = TableMap::single(1);
        assert!(matches!(
            search(&operands, &PredicateList::new(), &config, &NoopTrace),
            Err(OptimizeError::IllegalForcedJoinOrder { .. })
        ));
    }

    #[test]
    fn test_no_plan_outcomes() {
        let mut operands = vec![operand(0, 10, false), operand(1, 10, false)];
        let config = OptimizerConfig::default().time_budget(Duration::ZERO);
        assert!(matches!(
            search(&operands, &PredicateList::new(), &config, &NoopTrace),
            Err(OptimizeError::NoBestPlan { timed_out: true, .. })
        ));

        operands[0].dependencies = TableMap::single(1);
        operands[1].dependencies = TableMap::single(0);
        assert!(matches!(
            search(&operands, &PredicateList::new(), &OptimizerConfig::default(), &NoopTrace),
            Err(OptimizeError::NoBestPlan { timed_out: false, .. })
        ));

        let single = [operand(0, 10, false)];
        let outcome = search(&single, &PredicateList::new(), &config, &NoopTrace).unwrap();
        assert!(outcome.timed_out);
    }

    #[test]
    fn test_hash_build_over_memory_limit_falls_back() {
        let operands = [operand(0, 10, false), operand(1, 2, true)];
        let predicates: PredicateList = vec![equijoin(0, 0, 1)].into_iter().collect();
        // Two INTEGER columns of two rows need more than 8 bytes.
        let config = OptimizerConfig::default().max_memory_per_table(8);
        let outcome = search(&operands, &predicates, &config, &NoopTrace).unwrap();
        assert!(outcome.accesses.iter().all(|a| a.strategy == JoinStrategyKind::NestedLoop));
    }

    #[test]
    fn test_rule_based_never_hashes() {
        let operands = [operand(0, 10, false), operand(1, 2, true)];
        let predicates: PredicateList = vec![equijoin(0, 0, 1)].into_iter().collect();
        let config = OptimizerConfig::default().rule_based(true);
        let outcome = search(&operands, &predicates, &config, &NoopTrace).unwrap();
        // T0 first probes the index on T1 per row (45.5); T1 first scans T0
        // twice (23.5).
        assert_eq!(outcome.order, vec![1, 0]);
        assert!(outcome.accesses.iter().all(|a| a.strategy == JoinStrategyKind::NestedLoop));
        assert!((outcome.cost.cost - 23.5).abs() < 1e-9);
    }

    #[test]
    fn test_trace_records_best_plan() {
        let operands = [operand(0, 10, false), operand(1, 1000, true)];
        let predicates: PredicateList = vec![equijoin(0, 0, 1)].into_iter().collect();
        let trace = CollectingTrace::new();
        search(&operands, &predicates, &OptimizerConfig::default(), &trace).unwrap();
        let events = trace.events();
        assert!(events.iter().any(|e| matches!(e, TraceEvent::RememberingBestPlan { order, .. } if *order == vec![0, 1])));
        assert!(events.iter().any(|e| matches!(e, TraceEvent::SkippingJoinOrder { order, .. } if *order == vec![1])));
    }
}
