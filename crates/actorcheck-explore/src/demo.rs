//! A small racy actor program used by the CLI and the end-to-end tests.
//!
//! One `server` actor holds a register. Each client writes its own value,
//! waits for the acknowledgement, reads the register back and checks that it
//! still sees its own write. The check fails whenever another client's write
//! is handled between a client's write and its read.

use crate::runtime::{ActorRuntime, RunContext};
use actorcheck_pattern::EventPayload;
use actorcheck_sched::{
    Operation, OperationId, OperationKind, OperationStatus, StrategyError, VectorClock,
};
use std::collections::{BTreeMap, VecDeque};

pub const SERVER: &str = "server";

const WRITE_SITE: u32 = 1;
const READ_SITE: u32 = 2;
const ACK_SITE: u32 = 10;
const VALUE_SITE: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoKind {
    Write,
    Ack,
    Read,
    Value,
}

impl DemoKind {
    pub fn name(self) -> &'static str {
        match self {
            DemoKind::Write => "Write",
            DemoKind::Ack => "Ack",
            DemoKind::Read => "Read",
            DemoKind::Value => "Value",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemoEvent {
    pub kind: DemoKind,
    pub from: String,
    pub value: u64,
    clock: VectorClock,
}

impl DemoEvent {
    fn new(kind: DemoKind, from: &str, value: u64) -> Self {
        Self {
            kind,
            from: from.to_string(),
            value,
            clock: VectorClock::new(),
        }
    }
}

impl EventPayload for DemoEvent {
    fn kind(&self) -> &str {
        self.kind.name()
    }

    fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("from".to_string(), self.from.clone());
        fields.insert("value".to_string(), self.value.to_string());
        fields
    }
}

#[derive(Debug, Clone)]
struct Outgoing {
    receiver: String,
    location: u32,
    event: DemoEvent,
}

#[derive(Debug, Clone)]
enum Role {
    Server { value: u64 },
    Client { index: usize, written: Option<u64>, done: bool },
}

#[derive(Debug, Clone)]
struct Actor {
    name: String,
    role: Role,
    clock: VectorClock,
    started: bool,
    inbox: VecDeque<DemoEvent>,
    outbox: VecDeque<Outgoing>,
}

impl Actor {
    fn new(name: String, role: Role) -> Self {
        Self {
            name,
            role,
            clock: VectorClock::new(),
            started: false,
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
        }
    }

    fn send(&mut self, receiver: &str, location: u32, kind: DemoKind, value: u64) {
        self.outbox.push_back(Outgoing {
            receiver: receiver.to_string(),
            location,
            event: DemoEvent::new(kind, &self.name, value),
        });
    }

    fn is_finished(&self) -> bool {
        match self.role {
            Role::Server { .. } => true,
            Role::Client { done, .. } => done,
        }
    }

    fn operation(&self, id: u64) -> Operation {
        let op = Operation::new(id, self.name.clone()).with_clock(self.clock.clone());
        if let Some(out) = self.outbox.front() {
            return op.sending(out.receiver.clone(), out.location, out.event.kind.name());
        }
        if !self.started {
            return op.with_kind(OperationKind::Start);
        }
        if !self.inbox.is_empty() {
            return op.with_kind(OperationKind::Receive);
        }
        let status = if self.is_finished() {
            OperationStatus::Completed
        } else {
            OperationStatus::Disabled
        };
        op.with_kind(OperationKind::Receive).with_status(status)
    }

    fn on_start(&mut self, ctx: &mut RunContext<'_>) -> Result<(), StrategyError> {
        if let Role::Client { index, written, .. } = &mut self.role {
            let value = (*index as u64 + 1) * 100 + ctx.choose_int(10)?;
            *written = Some(value);
            self.send(SERVER, WRITE_SITE, DemoKind::Write, value);
        }
        Ok(())
    }

    fn on_event(&mut self, event: DemoEvent, ctx: &mut RunContext<'_>) {
        let reply = match (&mut self.role, event.kind) {
            (Role::Server { value }, DemoKind::Write) => {
                *value = event.value;
                Some((event.from.clone(), ACK_SITE, DemoKind::Ack, *value))
            }
            (Role::Server { value }, DemoKind::Read) => {
                Some((event.from.clone(), VALUE_SITE, DemoKind::Value, *value))
            }
            (Role::Client { .. }, DemoKind::Ack) => {
                Some((SERVER.to_string(), READ_SITE, DemoKind::Read, 0))
            }
            (Role::Client { index, written, done }, DemoKind::Value) => {
                *done = true;
                if *written != Some(event.value) {
                    ctx.report_bug(format!(
                        "client{} read {} after writing {}",
                        index,
                        event.value,
                        written.unwrap_or_default()
                    ));
                }
                None
            }
            _ => None,
        };
        if let Some((receiver, location, kind, value)) = reply {
            self.send(&receiver, location, kind, value);
        }
    }
}

/// Clients racing their writes through a single register server.
#[derive(Debug, Clone)]
pub struct RegisterRace {
    clients: usize,
    actors: Vec<Actor>,
}

impl RegisterRace {
    pub fn new(clients: usize) -> Self {
        let mut program = Self {
            clients: clients.max(1),
            actors: Vec::new(),
        };
        program.reset();
        program
    }

    fn position(&self, name: &str) -> Result<usize, StrategyError> {
        self.actors
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| StrategyError::Invariant(format!("no actor named {}", name)))
    }
}

impl Default for RegisterRace {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ActorRuntime for RegisterRace {
    fn reset(&mut self) {
        self.actors.clear();
        self.actors
            .push(Actor::new(SERVER.to_string(), Role::Server { value: 0 }));
        for index in 0..self.clients {
            self.actors.push(Actor::new(
                format!("client{}", index),
                Role::Client {
                    index,
                    written: None,
                    done: false,
                },
            ));
        }
    }

    fn operations(&self) -> Vec<Operation> {
        self.actors
            .iter()
            .enumerate()
            .map(|(id, actor)| actor.operation(id as u64))
            .collect()
    }

    fn execute(&mut self, op: OperationId, ctx: &mut RunContext<'_>) -> Result<(), StrategyError> {
        let index = usize::try_from(op.0)
            .ok()
            .filter(|&i| i < self.actors.len())
            .ok_or_else(|| StrategyError::Invariant(format!("unknown operation {}", op)))?;
        let actor = &mut self.actors[index];

        if let Some(out) = actor.outbox.pop_front() {
            actor.clock.increment(&actor.name);
            let mut event = out.event;
            event.clock = actor.clock.clone();
            ctx.on_send_event(&actor.name, out.location, &out.receiver, &actor.clock);
            let target = self.position(&out.receiver)?;
            self.actors[target].inbox.push_back(event);
            return Ok(());
        }

        if !actor.started {
            actor.started = true;
            actor.clock.increment(&actor.name);
            return actor.on_start(ctx);
        }

        match actor.inbox.pop_front() {
            Some(event) => {
                actor.clock.merge(&event.clock);
                actor.clock.increment(&actor.name);
                ctx.on_dequeue_event(&actor.name, &event);
                actor.on_event(event, ctx);
                Ok(())
            }
            None => Err(StrategyError::Invariant(format!(
                "operation {} scheduled while disabled",
                op
            ))),
        }
    }

    fn name(&self) -> &str {
        "register-race"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RunObserver;
    use actorcheck_sched::{ConflictMonitor, RandomStrategy, ScheduleTrace, SchedulingStrategy};

    fn enabled_ids(ops: &[Operation]) -> Vec<OperationId> {
        ops.iter().filter(|op| op.is_enabled()).map(|op| op.id).collect()
    }

    /// Run the program with `pick` choosing among enabled operations.
    fn run_with(
        program: &mut RegisterRace,
        mut pick: impl FnMut(&[OperationId]) -> OperationId,
    ) -> (Option<String>, ConflictMonitor) {
        let mut strategy = RandomStrategy::new(0, 1);
        let mut trace = ScheduleTrace::new();
        let mut monitor = ConflictMonitor::new();
        let mut observer = RunObserver::new(None);
        program.reset();
        loop {
            let ids = enabled_ids(&program.operations());
            if ids.is_empty() {
                return (None, monitor);
            }
            let id = pick(&ids);
            let mut ctx =
                RunContext::new(&mut strategy, &mut trace, &mut monitor, &mut observer, Some(id));
            program.execute(id, &mut ctx).unwrap();
            if let Some(bug) = ctx.take_bug() {
                return (Some(bug), monitor);
            }
        }
    }

    #[test]
    fn test_sequential_clients_see_their_writes() {
        let mut program = RegisterRace::new(2);
        // Always run the lowest enabled id: server first, then client0 to
        // completion before client1 writes.
        let (bug, _) = run_with(&mut program, |ids| ids[0]);
        assert_eq!(bug, None);
        assert!(program.operations().iter().all(|op| !op.is_enabled()));
    }

    #[test]
    fn test_interleaved_write_is_reported() {
        let mut program = RegisterRace::new(2);
        // server, client0 start, client0 sends Write, client1 start, client1
        // sends Write, then prefer the server so both writes land before
        // client0's read.
        let mut script = vec![0u64, 1, 1, 2, 2].into_iter();
        let (bug, monitor) = run_with(&mut program, |ids| {
            let wanted = script.next().map(OperationId).unwrap_or(ids[0]);
            if ids.contains(&wanted) {
                wanted
            } else {
                ids[0]
            }
        });
        let bug = bug.expect("interleaving should break client0's read");
        assert!(bug.starts_with("client0 read 2"));
        // Both writes race, and so do client0's read and client1's write.
        assert_eq!(monitor.conflict_count(), 2);
    }

    #[test]
    fn test_operations_describe_pending_sends() {
        let mut program = RegisterRace::new(1);
        let mut strategy = RandomStrategy::new(0, 1);
        let mut trace = ScheduleTrace::new();
        let mut monitor = ConflictMonitor::new();
        let mut observer = RunObserver::new(None);
        let mut ctx = RunContext::new(&mut strategy, &mut trace, &mut monitor, &mut observer, None);
        program.execute(OperationId(1), &mut ctx).unwrap();
        let ops = program.operations();
        assert_eq!(ops[1].kind, OperationKind::Send);
        let send = ops[1].send.as_ref().unwrap();
        assert_eq!(send.receiver, SERVER);
        assert_eq!(send.event, "Write");
        assert_eq!(ops[0].kind, OperationKind::Start);
        assert!(strategy.scheduled_steps() > 0);
    }

    #[test]
    fn test_unknown_operation_is_an_error() {
        let mut program = RegisterRace::new(1);
        let mut strategy = RandomStrategy::new(0, 1);
        let mut trace = ScheduleTrace::new();
        let mut monitor = ConflictMonitor::new();
        let mut observer = RunObserver::new(None);
        let mut ctx = RunContext::new(&mut strategy, &mut trace, &mut monitor, &mut observer, None);
        assert!(program.execute(OperationId(9), &mut ctx).is_err());
    }
}
