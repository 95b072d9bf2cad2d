//! Iteration coordinator for systematic testing of actor programs.
//!
//! This crate drives an actor program through many executions, one per
//! iteration, with a scheduling strategy from `actorcheck-sched` deciding
//! every interleaving and nondeterministic choice:
//!
//! ```text
//! 1. Reset the program, the conflict monitor and the run observers
//! 2. Ask the strategy for the next enabled operation → execute it
//!    (sends feed the conflict monitor, dequeues feed coverage and the
//!    event-pattern matcher, choices are recorded in the trace)
//! 3. Repeat until nothing is enabled, a bug is reported, or the step
//!    bound is hit
//! 4. Merge coverage, hand the run summary back to the strategy
//! 5. Stop on a bug (unless full exploration), a timeout, a stop request,
//!    or when the strategy has nothing left; otherwise go to 1
//! ```
//!
//! # Example Usage
//!
//! ```
//! use actorcheck_explore::config::{ExplorerConfig, StrategyKind};
//! use actorcheck_explore::demo::RegisterRace;
//! use actorcheck_explore::explorer::Explorer;
//! use actorcheck_explore::report::format_report;
//!
//! let config = ExplorerConfig {
//!     iterations: 100,
//!     strategy: StrategyKind::Pct,
//!     strategy_bound: 3,
//!     max_unfair_steps: 500,
//!     max_fair_steps: 500,
//!     ..Default::default()
//! };
//!
//! let mut explorer = Explorer::new(config, RegisterRace::default()).unwrap();
//! let report = explorer.run().unwrap();
//!
//! println!("{}", format_report(&report));
//! ```
//!
//! # Module Structure
//!
//! - [`runtime`]: the seam to the actor runtime
//! - [`observer`]: pattern and timeline observers for one run
//! - [`coverage`]: event coverage collection and comparison
//! - [`bugs`]: bug reports with reproducible traces
//! - [`config`]: session configuration and strategy selection
//! - [`explorer`]: the iteration loop
//! - [`checkpoint`]: resumable sessions
//! - [`report`]: exploration session reports
//! - [`demo`]: a small racy program for trying things out
//!
//! # Determinism
//!
//! A session is deterministic given its seed and program. Every map that
//! affects ordering is a `BTreeMap`.

pub mod bugs;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod demo;
pub mod explorer;
pub mod observer;
pub mod report;
pub mod runtime;

pub use bugs::{BugLog, BugReport};
pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointError, ExplorationCheckpoint};
pub use config::{build_strategy, ConfigError, ExplorerConfig, StrategyKind};
pub use coverage::{CoverageCollector, CoverageStats, EventCoverage};
pub use explorer::{
    ExplorationReport, ExplorationStats, ExploreError, Explorer, IterationReport, StopReason,
};
pub use observer::{EventPatternObserver, RunObserver, TimelineObserver};
pub use runtime::{ActorRuntime, RunContext};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = EventCoverage::new();
        let _ = CoverageCollector::new();
        let _ = BugLog::new();
        let _ = RunObserver::new(None);
        let _ = ExplorerConfig::default();
        let _ = demo::RegisterRace::default();
    }
}
