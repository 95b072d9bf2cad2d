//! Pattern-guided scheduling.
//!
//! Sends of events the pattern cares about are held back while anything
//! else can run, so the rest of the program catches up before the tracked
//! events are delivered.

use crate::operation::{Operation, OperationId};
use crate::strategy::{FeedbackStats, RunSummary, SchedulingStrategy, StrategyError};
use actorcheck_pattern::InterestingEvents;

pub struct PatternGuidedStrategy {
    inner: Box<dyn SchedulingStrategy>,
    interesting: InterestingEvents,
    last_scheduling: Vec<String>,
}

impl PatternGuidedStrategy {
    pub fn new(inner: Box<dyn SchedulingStrategy>, interesting: InterestingEvents) -> Self {
        Self {
            inner,
            interesting,
            last_scheduling: Vec::new(),
        }
    }

    pub fn interesting(&self) -> &InterestingEvents {
        &self.interesting
    }

    fn is_deprioritized(&self, op: &Operation) -> bool {
        op.sent_event()
            .map_or(false, |event| self.interesting.contains(event))
    }

    /// Enabled operations that are not sends of interesting events, or `None`
    /// when that would leave nothing to run or nothing was held back.
    fn preferred(&self, ops: &[Operation]) -> Option<Vec<Operation>> {
        let mut held_back = false;
        let preferred: Vec<Operation> = ops
            .iter()
            .filter(|op| op.is_enabled())
            .filter(|op| {
                let hold = self.is_deprioritized(op);
                held_back |= hold;
                !hold
            })
            .cloned()
            .collect();
        if held_back && !preferred.is_empty() {
            Some(preferred)
        } else {
            None
        }
    }
}

impl SchedulingStrategy for PatternGuidedStrategy {
    fn next_operation(
        &mut self,
        current: Option<OperationId>,
        ops: &[Operation],
    ) -> Result<Option<OperationId>, StrategyError> {
        match self.preferred(ops) {
            Some(preferred) => self.inner.next_operation(current, &preferred),
            None => self.inner.next_operation(current, ops),
        }
    }

    fn next_boolean_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<bool, StrategyError> {
        self.inner.next_boolean_choice(current, max_value)
    }

    fn next_integer_choice(
        &mut self,
        current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError> {
        self.inner.next_integer_choice(current, max_value)
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.inner.prepare_for_next_iteration()
    }

    fn scheduled_steps(&self) -> usize {
        self.inner.scheduled_steps()
    }

    fn has_reached_max_steps(&self) -> bool {
        self.inner.has_reached_max_steps()
    }

    fn is_fair(&self) -> bool {
        self.inner.is_fair()
    }

    fn description(&self) -> String {
        format!("pattern[{}]", self.inner.description())
    }

    fn observe_running_results(&mut self, summary: &RunSummary) {
        self.last_scheduling = summary.matched_events.clone();
        self.inner.observe_running_results(summary);
    }

    fn feedback_stats(&self) -> Option<FeedbackStats> {
        let mut stats = self.inner.feedback_stats().unwrap_or_default();
        if stats.last_saved_scheduling.is_empty() {
            stats.last_saved_scheduling = self.last_scheduling.clone();
        }
        Some(stats)
    }
}
