//! The iteration loop: run the program once per iteration under the active
//! strategy, feed the results back, and decide whether to go on.

use crate::bugs::{BugLog, BugReport};
use crate::checkpoint::{save_checkpoint, CheckpointError, ExplorationCheckpoint};
use crate::config::{build_strategy, ConfigError, ExplorerConfig};
use crate::coverage::{CoverageCollector, CoverageStats};
use crate::observer::RunObserver;
use crate::runtime::{ActorRuntime, RunContext};
use actorcheck_sched::{
    ConflictMonitor, FeedbackStats, ReplayStrategy, ScheduleTrace, SchedulingStrategy, SendSite,
    StrategyError, TraceStep,
};
use log::{debug, info, warn};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the exploration engine.
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Strategy(#[from] StrategyError),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IterationsExhausted,
    BugFound,
    StrategyExhausted,
    TimedOut,
    Stopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::IterationsExhausted => "iteration budget exhausted",
            StopReason::BugFound => "bug found",
            StopReason::StrategyExhausted => "strategy has nothing left to explore",
            StopReason::TimedOut => "timed out",
            StopReason::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// The exploration engine.
pub struct Explorer<R> {
    config: ExplorerConfig,
    runtime: R,
    strategy: Box<dyn SchedulingStrategy>,
    monitor: ConflictMonitor,
    observer: RunObserver,
    coverage: CoverageCollector,
    bugs: BugLog,
    stop: Arc<AtomicBool>,
    iterations_completed: u64,
    total_steps: u64,
}

impl<R: ActorRuntime> Explorer<R> {
    /// Validate `config` and build its strategy.
    pub fn new(config: ExplorerConfig, runtime: R) -> Result<Self, ExploreError> {
        config.validate()?;
        let matcher = config.compile_pattern()?;
        let strategy = build_strategy(&config, matcher.as_ref())?;
        Self::assemble(config, runtime, strategy)
    }

    /// Use `strategy` instead of the configured one.
    pub fn with_strategy(
        config: ExplorerConfig,
        runtime: R,
        strategy: Box<dyn SchedulingStrategy>,
    ) -> Result<Self, ExploreError> {
        config.validate()?;
        Self::assemble(config, runtime, strategy)
    }

    /// Replay `trace` once. The step bound is the one the configured strategy
    /// ran under.
    pub fn for_replay(
        mut config: ExplorerConfig,
        runtime: R,
        trace: ScheduleTrace,
    ) -> Result<Self, ExploreError> {
        config.iterations = 1;
        config.full_exploration = false;
        config.liveness_temperature_threshold = trace.liveness_temperature_threshold;
        config.test_method = trace.test_method.clone();
        let strategy = Box::new(ReplayStrategy::new(trace, config.max_steps()));
        Self::with_strategy(config, runtime, strategy)
    }

    /// Carry on from a checkpoint, running `iterations` more iterations.
    pub fn from_checkpoint(
        checkpoint: ExplorationCheckpoint,
        runtime: R,
        iterations: Option<u64>,
    ) -> Result<Self, ExploreError> {
        let mut config = checkpoint.config.clone();
        if let Some(iterations) = iterations {
            config.iterations = iterations;
        }
        config.validate()?;

        let strategy_config = ExplorerConfig {
            seed: checkpoint.resume_seed(),
            ..config.clone()
        };
        let matcher = strategy_config.compile_pattern()?;
        let strategy = build_strategy(&strategy_config, matcher.as_ref())?;

        info!(
            "Restored checkpoint: {} iterations completed, {} steps, {} event pairs, {} bugs",
            checkpoint.iterations_completed,
            checkpoint.total_steps,
            checkpoint.global_coverage.count(),
            checkpoint.bugs.len()
        );

        let mut explorer = Self::assemble(config, runtime, strategy)?;
        explorer.coverage =
            CoverageCollector::with_global(checkpoint.global_coverage, checkpoint.iterations_completed);
        explorer.bugs = BugLog::from_reports(checkpoint.bugs);
        explorer.iterations_completed = checkpoint.iterations_completed;
        explorer.total_steps = checkpoint.total_steps;
        Ok(explorer)
    }

    fn assemble(
        config: ExplorerConfig,
        runtime: R,
        strategy: Box<dyn SchedulingStrategy>,
    ) -> Result<Self, ExploreError> {
        let observer = RunObserver::new(config.compile_pattern()?);
        Ok(Self {
            config,
            runtime,
            strategy,
            monitor: ConflictMonitor::new(),
            observer,
            coverage: CoverageCollector::new(),
            bugs: BugLog::new(),
            stop: Arc::new(AtomicBool::new(false)),
            iterations_completed: 0,
            total_steps: 0,
        })
    }

    /// Setting the flag stops the session before the next iteration starts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the full exploration loop.
    pub fn run(&mut self) -> Result<ExplorationReport, ExploreError> {
        info!(
            "Starting exploration: {} iterations of {} under {}",
            self.config.iterations,
            self.runtime.name(),
            self.strategy.description()
        );

        let started = Instant::now();
        let timeout = self.config.timeout_secs.map(Duration::from_secs);
        let mut iteration_reports = Vec::new();
        let mut stop_reason = StopReason::IterationsExhausted;

        for round in 0..self.config.iterations {
            if self.stop.load(Ordering::Relaxed) {
                stop_reason = StopReason::Stopped;
                break;
            }
            if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                stop_reason = StopReason::TimedOut;
                break;
            }

            let report = self.run_iteration()?;
            let found_bug = report.bug.is_some();
            iteration_reports.push(report);

            if found_bug && !self.config.full_exploration {
                stop_reason = StopReason::BugFound;
                break;
            }
            if round + 1 < self.config.iterations && !self.strategy.prepare_for_next_iteration() {
                stop_reason = StopReason::StrategyExhausted;
                break;
            }
        }

        info!(
            "Exploration finished ({}): {} iterations, {} steps, {} bugs",
            stop_reason,
            self.iterations_completed,
            self.total_steps,
            self.bugs.len()
        );

        if let Some(ref output_dir) = self.config.output_dir {
            if let Err(e) = self.save_checkpoint_to_dir(output_dir) {
                warn!("Failed to save checkpoint: {}", e);
            }
        }

        Ok(self.generate_report(iteration_reports, stop_reason, started.elapsed()))
    }

    /// Run the program once to completion, a bug, or the step bound.
    pub fn run_iteration(&mut self) -> Result<IterationReport, ExploreError> {
        let iteration = self.iterations_completed;
        self.runtime.reset();
        self.monitor.reset();
        self.observer.reset();

        let mut trace = ScheduleTrace {
            fair_scheduling: self.strategy.is_fair(),
            liveness_temperature_threshold: self.config.liveness_temperature_threshold,
            test_method: self.config.test_method.clone(),
            ..Default::default()
        };
        let mut current = None;
        let mut bug = None;
        let mut reached_max_steps = false;

        loop {
            if self.strategy.has_reached_max_steps() {
                reached_max_steps = true;
                break;
            }
            let ops = self.runtime.operations();
            let Some(id) = self.strategy.next_operation(current, &ops)? else {
                break;
            };
            trace.push(TraceStep::Schedule(id));

            let mut ctx = RunContext::new(
                self.strategy.as_mut(),
                &mut trace,
                &mut self.monitor,
                &mut self.observer,
                Some(id),
            );
            self.runtime.execute(id, &mut ctx)?;
            bug = ctx.take_bug();
            current = Some(id);
            if bug.is_some() {
                break;
            }
        }

        let steps = self.strategy.scheduled_steps();
        if bug.is_none() && reached_max_steps && self.config.fail_on_max_steps {
            bug = Some(format!("reached the maximum of {} steps", steps));
        }

        let new_coverage = self.coverage.update_global(self.observer.coverage());
        let summary = self.observer.summary(steps, bug.is_some());
        self.strategy.observe_running_results(&summary);

        self.iterations_completed += 1;
        self.total_steps += steps as u64;

        if let Some(message) = &bug {
            let bug_id = self.bugs.add(BugReport {
                bug_id: 0,
                iteration,
                message: message.clone(),
                steps,
                strategy: self.strategy.description(),
                trace: trace.to_string(),
            });
            warn!("Iteration {} found bug #{}: {}", iteration, bug_id, message);
        }

        debug!(
            "Iteration {}: {} steps, {} new event pairs{}",
            iteration,
            steps,
            new_coverage,
            if summary.pattern_matched {
                ", pattern matched"
            } else {
                ""
            }
        );

        Ok(IterationReport {
            iteration,
            steps,
            new_coverage,
            pattern_matched: summary.pattern_matched,
            reached_max_steps,
            bug,
        })
    }

    fn generate_report(
        &self,
        iteration_reports: Vec<IterationReport>,
        stop_reason: StopReason,
        elapsed: Duration,
    ) -> ExplorationReport {
        ExplorationReport {
            program: self.runtime.name().to_string(),
            strategy: self.strategy.description(),
            iterations: self.iterations_completed,
            total_steps: self.total_steps,
            stop_reason,
            bugs: self.bugs.bugs().to_vec(),
            coverage_stats: self.coverage.stats(),
            racing_pairs: self.monitor.racing_pairs(),
            feedback: self.strategy.feedback_stats(),
            pattern_matches: iteration_reports
                .iter()
                .filter(|r| r.pattern_matched)
                .count(),
            iteration_reports,
            elapsed,
        }
    }

    /// Get current exploration stats.
    pub fn stats(&self) -> ExplorationStats {
        ExplorationStats {
            iterations: self.iterations_completed,
            steps: self.total_steps,
            event_pairs: self.coverage.stats().total_pairs,
            bugs: self.bugs.len(),
            racing_pairs: self.monitor.conflict_count(),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn bugs(&self) -> &[BugReport] {
        self.bugs.bugs()
    }

    /// Save `checkpoint.json` and one `bug-N.trace` file per bug under `dir`.
    pub fn save_checkpoint_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), CheckpointError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let checkpoint_path = dir.join("checkpoint.json");
        save_checkpoint(&checkpoint_path, &self.create_checkpoint())?;
        for bug in self.bugs.bugs() {
            std::fs::write(dir.join(format!("bug-{}.trace", bug.bug_id)), &bug.trace)?;
        }

        info!("Checkpoint saved to {}", checkpoint_path.display());
        Ok(())
    }

    pub fn create_checkpoint(&self) -> ExplorationCheckpoint {
        ExplorationCheckpoint {
            config: self.config.clone(),
            global_coverage: self.coverage.global_coverage().clone(),
            bugs: self.bugs.bugs().to_vec(),
            iterations_completed: self.iterations_completed,
            total_steps: self.total_steps,
        }
    }
}

/// Result of a single iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: u64,
    pub steps: usize,
    /// Event pairs never seen before this iteration.
    pub new_coverage: usize,
    pub pattern_matched: bool,
    pub reached_max_steps: bool,
    pub bug: Option<String>,
}

/// Final exploration report.
#[derive(Debug, Clone)]
pub struct ExplorationReport {
    pub program: String,
    pub strategy: String,
    pub iterations: u64,
    pub total_steps: u64,
    pub stop_reason: StopReason,
    pub bugs: Vec<BugReport>,
    pub coverage_stats: CoverageStats,
    pub racing_pairs: Vec<(SendSite, SendSite)>,
    pub feedback: Option<FeedbackStats>,
    /// Iterations of this session in which the pattern matched.
    pub pattern_matches: usize,
    pub iteration_reports: Vec<IterationReport>,
    pub elapsed: Duration,
}

/// Current exploration statistics.
#[derive(Debug, Clone)]
pub struct ExplorationStats {
    pub iterations: u64,
    pub steps: u64,
    pub event_pairs: usize,
    pub bugs: usize,
    pub racing_pairs: usize,
}
