//! Optimizer trace: an ordered stream of search decisions for a pluggable
//! sink. Sinks only observe; nothing they do feeds back into the search.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use super::cost::CostEstimate;

/// One search decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraceEvent {
    StartStatement { kind: String },
    EndStatement,
    StartQueryBlock { level: usize, tables: usize },
    EndQueryBlock { level: usize, cost: Option<CostEstimate> },
    /// A candidate join order, as table numbers in placement order.
    ConsideringJoinOrder { order: Vec<usize> },
    SkippingJoinOrder { order: Vec<usize>, reason: String },
    ConglomerateCost {
        table: usize,
        conglomerate: String,
        strategy: String,
        cost: CostEstimate,
    },
    RememberingBestPlan { order: Vec<usize>, cost: CostEstimate, sort_avoided: bool },
    Timeout { elapsed_ms: u64 },
}

fn join(order: &[usize]) -> String {
    order.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::StartStatement { kind } => write!(f, "start {} statement", kind),
            TraceEvent::EndStatement => write!(f, "end statement"),
            TraceEvent::StartQueryBlock { level, tables } => {
                write!(f, "start query block at level {} with {} operands", level, tables)
            }
            TraceEvent::EndQueryBlock { level, cost } => match cost {
                Some(cost) => write!(f, "end query block at level {} ({})", level, cost),
                None => write!(f, "end query block at level {}", level),
            },
            TraceEvent::ConsideringJoinOrder { order } => write!(f, "considering join order [{}]", join(order)),
            TraceEvent::SkippingJoinOrder { order, reason } => {
                write!(f, "skipping join order [{}]: {}", join(order), reason)
            }
            TraceEvent::ConglomerateCost { table, conglomerate, strategy, cost } => {
                write!(f, "table #{} via {} ({}): {}", table, conglomerate, strategy, cost)
            }
            TraceEvent::RememberingBestPlan { order, cost, sort_avoided } => write!(
                f,
                "remembering join order [{}] as best ({}{})",
                join(order),
                cost,
                if *sort_avoided { ", sort avoided" } else { "" }
            ),
            TraceEvent::Timeout { elapsed_ms } => write!(f, "optimizer timed out after {} ms", elapsed_ms),
        }
    }
}

/// Receiver of trace events.
pub trait OptimizerTrace: Send + Sync {
    fn event(&self, event: TraceEvent);

    /// Whether events are wanted; callers skip building them otherwise.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl OptimizerTrace for NoopTrace {
    fn event(&self, _event: TraceEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Writes events to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl OptimizerTrace for LogTrace {
    fn event(&self, event: TraceEvent) {
        log::debug!(target: "querycore::trace", "{}", event);
    }

    fn enabled(&self) -> bool {
        log::log_enabled!(target: "querycore::trace", log::Level::Debug)
    }
}

/// Keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct CollectingTrace {
    events: Mutex<Vec<TraceEvent>>,
}

impl CollectingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Events rendered one per line.
    pub fn render(&self) -> String {
        self.events
            .lock()
            .iter()
            .map(|e| format!("{}\n", e))
            .collect()
    }
}

impl OptimizerTrace for CollectingTrace {
    fn event(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_collecting_trace_keeps_order() {
        let trace = CollectingTrace::new();
        trace.event(TraceEvent::StartQueryBlock { level: 0, tables: 2 });
        trace.event(TraceEvent::ConsideringJoinOrder { order: vec![1, 0] });
        assert_eq!(trace.events().len(), 2);
        assert_eq!(
            trace.render(),
            "start query block at level 0 with 2 operands\nconsidering join order [1 0]\n"
        );
        assert_eq!(trace.take().len(), 2);
        assert!(trace.events().is_empty());
    }

    #[test]
    fn test_trace_is_shareable() {
        let trace = Arc::new(CollectingTrace::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let trace = Arc::clone(&trace);
                thread::spawn(move || trace.event(TraceEvent::Timeout { elapsed_ms: i }))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(trace.events().len(), 4);
        assert!(!NoopTrace.enabled());
    }
}
