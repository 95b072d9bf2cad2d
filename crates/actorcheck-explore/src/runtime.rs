//! The seam between the explorer and an actor runtime.
//!
//! The runtime owns actors, inboxes and timers. The explorer only asks it
//! which operations exist and tells it which one to run; everything the
//! runtime needs from the explorer while running goes through [`RunContext`].

use crate::observer::RunObserver;
use actorcheck_pattern::EventPayload;
use actorcheck_sched::{
    ConflictMonitor, Operation, OperationId, SchedulingStrategy, ScheduleTrace, StrategyError,
    TraceStep, VectorClock,
};

/// A program under test.
pub trait ActorRuntime {
    /// Put the program back in its initial state.
    fn reset(&mut self);

    /// Every operation of the current state, enabled or not, in a stable
    /// order.
    fn operations(&self) -> Vec<Operation>;

    /// Run one step of `op`.
    fn execute(&mut self, op: OperationId, ctx: &mut RunContext<'_>) -> Result<(), StrategyError>;

    fn name(&self) -> &str {
        "program"
    }
}

/// Hooks available to the runtime while it executes one operation.
pub struct RunContext<'a> {
    strategy: &'a mut dyn SchedulingStrategy,
    trace: &'a mut ScheduleTrace,
    monitor: &'a mut ConflictMonitor,
    observer: &'a mut RunObserver,
    current: Option<OperationId>,
    bug: Option<String>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        strategy: &'a mut dyn SchedulingStrategy,
        trace: &'a mut ScheduleTrace,
        monitor: &'a mut ConflictMonitor,
        observer: &'a mut RunObserver,
        current: Option<OperationId>,
    ) -> Self {
        Self {
            strategy,
            trace,
            monitor,
            observer,
            current,
            bug: None,
        }
    }

    /// True with probability `1 / max_value`.
    pub fn choose_bool(&mut self, max_value: u64) -> Result<bool, StrategyError> {
        let value = self.strategy.next_boolean_choice(self.current, max_value)?;
        self.trace.push(TraceStep::Boolean(value));
        Ok(value)
    }

    /// An integer in `0..max_value`.
    pub fn choose_int(&mut self, max_value: u64) -> Result<u64, StrategyError> {
        let value = self.strategy.next_integer_choice(self.current, max_value)?;
        self.trace.push(TraceStep::Integer(value));
        Ok(value)
    }

    /// Called for every message send, with the sender's clock after the send.
    pub fn on_send_event(
        &mut self,
        sender: &str,
        location: u32,
        receiver: &str,
        clock: &VectorClock,
    ) {
        let found = self.monitor.on_send_event(sender, location, receiver, clock);
        if found > 0 {
            log::debug!(
                "{} new racing send pair(s) at {} -> {} @{}",
                found,
                sender,
                receiver,
                location
            );
        }
    }

    /// Called whenever `receiver` takes an event out of its inbox.
    pub fn on_dequeue_event<E: EventPayload + ?Sized>(&mut self, receiver: &str, event: &E) {
        self.observer.on_dequeue_event(receiver, event);
    }

    /// Record a property violation. The first report of a run wins.
    pub fn report_bug(&mut self, message: impl Into<String>) {
        if self.bug.is_none() {
            self.bug = Some(message.into());
        }
    }

    pub fn conflicts(&self) -> &ConflictMonitor {
        self.monitor
    }

    pub fn current(&self) -> Option<OperationId> {
        self.current
    }

    pub fn take_bug(&mut self) -> Option<String> {
        self.bug.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actorcheck_pattern::Event;
    use actorcheck_sched::RandomStrategy;

    #[test]
    fn test_choices_are_traced() {
        let mut strategy = RandomStrategy::new(0, 3);
        let mut trace = ScheduleTrace::new();
        let mut monitor = ConflictMonitor::new();
        let mut observer = RunObserver::new(None);
        let mut ctx = RunContext::new(
            &mut strategy,
            &mut trace,
            &mut monitor,
            &mut observer,
            Some(OperationId(1)),
        );
        let flag = ctx.choose_bool(2).unwrap();
        let value = ctx.choose_int(10).unwrap();
        assert_eq!(ctx.current(), Some(OperationId(1)));
        drop(ctx);
        assert_eq!(
            trace.steps,
            vec![TraceStep::Boolean(flag), TraceStep::Integer(value)]
        );
    }

    #[test]
    fn test_hooks_reach_monitor_and_observer() {
        let mut strategy = RandomStrategy::new(0, 3);
        let mut trace = ScheduleTrace::new();
        let mut monitor = ConflictMonitor::new();
        let mut observer = RunObserver::new(None);
        let mut ctx = RunContext::new(&mut strategy, &mut trace, &mut monitor, &mut observer, None);
        let a: VectorClock = [("a", 1)].into_iter().collect();
        let b: VectorClock = [("b", 1)].into_iter().collect();
        ctx.on_send_event("a", 1, "server", &a);
        ctx.on_send_event("b", 2, "server", &b);
        ctx.on_dequeue_event("server", &Event::new("Write"));
        ctx.report_bug("first");
        ctx.report_bug("second");
        assert_eq!(ctx.conflicts().conflict_count(), 1);
        assert_eq!(ctx.take_bug().as_deref(), Some("first"));
        drop(ctx);
        assert!(observer.coverage().keys().contains("server:Write"));
    }
}
