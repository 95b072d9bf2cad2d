//! The scheduling-strategy contract.

use crate::operation::{Operation, OperationId};
use std::collections::BTreeSet;
use thiserror::Error;

/// Failures inside a strategy. These are engine bugs or unusable traces,
/// never bugs in the program under test, and they end the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("replay diverged at step {step}: {detail}")]
    ReplayDivergence { step: usize, detail: String },

    #[error("replay trace exhausted after {steps} steps with operations still enabled")]
    TraceExhausted { steps: usize },

    #[error("scheduler invariant violated: {0}")]
    Invariant(String),
}

/// What one finished iteration looked like, as reported back to the strategy.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Scheduling decisions made.
    pub steps: usize,
    /// `receiver:event` pairs dequeued during the run.
    pub event_coverage: BTreeSet<String>,
    /// Pattern automaton states visited during the run.
    pub visited_states: BTreeSet<usize>,
    /// The pattern reached its accepting state at some point.
    pub pattern_matched: bool,
    /// Hash of the per-actor event timeline.
    pub timeline_hash: Option<u64>,
    /// Interesting event kinds dequeued, in order.
    pub matched_events: Vec<String>,
    pub bug_found: bool,
}

/// Counters exposed by feedback-guided strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub total_saved_inputs: usize,
    pub current_input_index: usize,
    pub covered_states: BTreeSet<usize>,
    pub last_saved_scheduling: Vec<String>,
}

/// Decides, at every scheduling point, what runs next.
pub trait SchedulingStrategy {
    /// Pick among the enabled operations in `ops`.
    ///
    /// `Ok(None)` means nothing is enabled and the iteration is over.
    fn next_operation(
        &mut self,
        current: Option<OperationId>,
        ops: &[Operation],
    ) -> Result<Option<OperationId>, StrategyError>;

    /// A boolean that is true with probability `1 / max_value`.
    fn next_boolean_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<bool, StrategyError>;

    /// An integer in `0..max_value`.
    fn next_integer_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError>;

    /// Reset per-iteration counters and move the generator state on.
    /// Returns false when there is nothing left to explore.
    fn prepare_for_next_iteration(&mut self) -> bool;

    fn scheduled_steps(&self) -> usize;

    fn has_reached_max_steps(&self) -> bool;

    fn is_fair(&self) -> bool;

    fn description(&self) -> String;

    /// Feedback from the iteration that just finished.
    fn observe_running_results(&mut self, _summary: &RunSummary) {}

    fn feedback_stats(&self) -> Option<FeedbackStats> {
        None
    }
}

impl<S: SchedulingStrategy + ?Sized> SchedulingStrategy for Box<S> {
    fn next_operation(
        &mut self,
        current: Option<OperationId>,
        ops: &[Operation],
    ) -> Result<Option<OperationId>, StrategyError> {
        (**self).next_operation(current, ops)
    }

    fn next_boolean_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<bool, StrategyError> {
        (**self).next_boolean_choice(current, max_value)
    }

    fn next_integer_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError> {
        (**self).next_integer_choice(current, max_value)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        (**self).prepare_for_next_iteration()
    }

    fn scheduled_steps(&self) -> usize {
        (**self).scheduled_steps()
    }

    fn has_reached_max_steps(&self) -> bool {
        (**self).has_reached_max_steps()
    }

    fn is_fair(&self) -> bool {
        (**self).is_fair()
    }

    fn description(&self) -> String {
        (**self).description()
    }

    fn observe_running_results(&mut self, summary: &RunSummary) {
        (**self).observe_running_results(summary)
    }

    fn feedback_stats(&self) -> Option<FeedbackStats> {
        (**self).feedback_stats()
    }
}

/// `max_steps == 0` means unbounded.
pub(crate) fn reached(max_steps: usize, scheduled_steps: usize) -> bool {
    max_steps > 0 && scheduled_steps >= max_steps
}
