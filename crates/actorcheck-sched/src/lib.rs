//! Scheduling strategies for systematic testing of actor programs.
//!
//! An actor runtime exposes the operations it could run next. At every
//! scheduling point a [`SchedulingStrategy`] picks one of the enabled
//! operations, and at every nondeterministic choice it picks a value. All of
//! those decisions are drawn from [`ChoiceStream`]s, so a run can be replayed,
//! copied or mutated without touching the program under test.
//!
//! # Strategies
//!
//! - [`RandomStrategy`]: uniform choice among enabled operations
//! - [`PctStrategy`]: priorities with a bounded number of change points
//! - [`PctcpStrategy`]: PCT over chains of causally ordered operations
//! - [`FeedbackStrategy`]: keeps and mutates generators that found new behavior
//! - [`PatternGuidedStrategy`]: holds back sends the event pattern tracks
//! - [`ReplayStrategy`]: replays a recorded [`ScheduleTrace`]
//!
//! # Example
//!
//! ```
//! use actorcheck_sched::{Operation, RandomStrategy, SchedulingStrategy};
//!
//! let mut strategy = RandomStrategy::new(100, 42);
//! let ops: Vec<Operation> = (0..3).map(|i| Operation::new(i, format!("actor{}", i))).collect();
//! for _ in 0..50 {
//!     strategy.next_operation(None, &ops).unwrap();
//! }
//! assert_eq!(strategy.scheduled_steps(), 50);
//! assert!(!strategy.has_reached_max_steps());
//! ```
//!
//! # Determinism
//!
//! Every strategy is built from a seed and uses `ChaCha8Rng` internally. Two
//! strategies built from the same seed make the same decisions when shown
//! the same operations.

pub mod basic;
pub mod choice;
pub mod clock;
pub mod conflict;
pub mod feedback;
pub mod generator;
pub mod guided;
pub mod operation;
pub mod pct;
pub mod pctcp;
pub mod replay;
pub mod strategy;
pub mod trace;

pub use basic::{GeneratorStrategy, PctStrategy, PctcpStrategy, RandomStrategy};
pub use choice::ChoiceStream;
pub use clock::VectorClock;
pub use conflict::ConflictMonitor;
pub use feedback::{FeedbackMode, FeedbackSignal, FeedbackStrategy};
pub use generator::{
    InputGenerator, RandomScheduleGenerator, ScheduleGenerator, StrategyGenerator,
};
pub use guided::PatternGuidedStrategy;
pub use operation::{
    Operation, OperationId, OperationKind, OperationStatus, SendInfo, SendSite,
};
pub use pct::{ChangePointSampling, PctScheduleGenerator};
pub use pctcp::PctcpScheduleGenerator;
pub use replay::ReplayStrategy;
pub use strategy::{FeedbackStats, RunSummary, SchedulingStrategy, StrategyError};
pub use trace::{ScheduleTrace, TraceError, TraceStep};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = ChoiceStream::new(0);
        let _ = VectorClock::new();
        let _ = ConflictMonitor::new();
        let _ = RandomStrategy::new(10, 1);
        let _ = PctStrategy::new(10, 2, ChangePointSampling::Geometric, 1);
        let _ = PctcpStrategy::new(10, 2, 1);
        let _ = ReplayStrategy::new(ScheduleTrace::new(), 0);
    }
}
