//! Replays a recorded [`ScheduleTrace`] decision by decision.

use crate::operation::{Operation, OperationId};
use crate::strategy::{reached, SchedulingStrategy, StrategyError};
use crate::trace::{ScheduleTrace, TraceStep};

#[derive(Debug, Clone)]
pub struct ReplayStrategy {
    trace: ScheduleTrace,
    position: usize,
    max_steps: usize,
}

impl ReplayStrategy {
    /// `max_steps` should match the bound the trace was recorded under.
    pub fn new(trace: ScheduleTrace, max_steps: usize) -> Self {
        Self {
            trace,
            position: 0,
            max_steps,
        }
    }

    pub fn trace(&self) -> &ScheduleTrace {
        &self.trace
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.trace.len()
    }

    fn next_step(&mut self) -> Result<TraceStep, StrategyError> {
        let step = self
            .trace
            .steps
            .get(self.position)
            .copied()
            .ok_or(StrategyError::TraceExhausted {
                steps: self.position,
            })?;
        self.position += 1;
        Ok(step)
    }

    fn diverged(&self, detail: String) -> StrategyError {
        StrategyError::ReplayDivergence {
            step: self.position.saturating_sub(1),
            detail,
        }
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn next_operation(
        &mut self,
        _current: Option<OperationId>,
        ops: &[Operation],
    ) -> Result<Option<OperationId>, StrategyError> {
        if !ops.iter().any(Operation::is_enabled) {
            return Ok(None);
        }
        match self.next_step()? {
            TraceStep::Schedule(id) => {
                if ops.iter().any(|op| op.id == id && op.is_enabled()) {
                    Ok(Some(id))
                } else {
                    Err(self.diverged(format!("operation {} is not enabled", id)))
                }
            }
            other => Err(self.diverged(format!("expected an operation, trace has {}", other))),
        }
    }

    fn next_boolean_choice(
        &mut self,
        _current: Option<OperationId>,
        _max_value: u64,
    ) -> Result<bool, StrategyError> {
        match self.next_step()? {
            TraceStep::Boolean(value) => Ok(value),
            other => Err(self.diverged(format!("expected a boolean, trace has {}", other))),
        }
    }

    fn next_integer_choice(
        &mut self,
        _current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError> {
        match self.next_step()? {
            TraceStep::Integer(value) if max_value == 0 || value < max_value => Ok(value),
            TraceStep::Integer(value) => Err(self.diverged(format!(
                "integer {} is out of range 0..{}",
                value, max_value
            ))),
            other => Err(self.diverged(format!("expected an integer, trace has {}", other))),
        }
    }

    /// A trace replays exactly once.
    fn prepare_for_next_iteration(&mut self) -> bool {
        self.position = 0;
        false
    }

    fn scheduled_steps(&self) -> usize {
        self.position
    }

    fn has_reached_max_steps(&self) -> bool {
        reached(self.max_steps, self.position)
    }

    fn is_fair(&self) -> bool {
        self.trace.fair_scheduling
    }

    fn description(&self) -> String {
        format!("replay[{} steps]", self.trace.len())
    }
}
