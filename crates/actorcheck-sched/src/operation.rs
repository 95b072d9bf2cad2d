//! Schedulable operations as exposed by the actor runtime.

use crate::clock::VectorClock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a schedulable operation.
///
/// The runtime keeps one id per actor for the actor's whole lifetime, so an
/// id names "the next step of that actor" at every scheduling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Start,
    Send,
    Receive,
    Stop,
    InjectFailure,
    Timer,
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Enabled,
    Disabled,
    Completed,
}

/// Details of a pending send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInfo {
    pub receiver: String,
    /// Call-site of the send in the program under test.
    pub location: u32,
    /// Kind of the event being sent.
    pub event: String,
}

/// Where a send comes from and goes to. Races are tracked per site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SendSite {
    pub sender: String,
    pub receiver: String,
    pub location: u32,
}

impl fmt::Display for SendSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} @{}", self.sender, self.receiver, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: OperationId,
    /// Owning actor; also the sender for sends.
    pub actor: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    /// The actor's vector clock when this operation was offered.
    pub clock: VectorClock,
    pub send: Option<SendInfo>,
}

impl Operation {
    pub fn new(id: u64, actor: impl Into<String>) -> Self {
        Self {
            id: OperationId(id),
            actor: actor.into(),
            kind: OperationKind::Start,
            status: OperationStatus::Enabled,
            clock: VectorClock::new(),
            send: None,
        }
    }

    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_status(mut self, status: OperationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_clock(mut self, clock: VectorClock) -> Self {
        self.clock = clock;
        self
    }

    /// Make this a send of `event` to `receiver` from call-site `location`.
    pub fn sending(
        mut self,
        receiver: impl Into<String>,
        location: u32,
        event: impl Into<String>,
    ) -> Self {
        self.kind = OperationKind::Send;
        self.send = Some(SendInfo {
            receiver: receiver.into(),
            location,
            event: event.into(),
        });
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status == OperationStatus::Enabled
    }

    pub fn is_send(&self) -> bool {
        self.kind == OperationKind::Send
    }

    /// Event kind carried by a send.
    pub fn sent_event(&self) -> Option<&str> {
        if !self.is_send() {
            return None;
        }
        self.send.as_ref().map(|send| send.event.as_str())
    }

    pub fn send_site(&self) -> Option<SendSite> {
        if !self.is_send() {
            return None;
        }
        self.send.as_ref().map(|send| SendSite {
            sender: self.actor.clone(),
            receiver: send.receiver.clone(),
            location: send.location,
        })
    }
}

/// Enabled operations, in runtime order.
pub fn enabled(ops: &[Operation]) -> Vec<&Operation> {
    ops.iter().filter(|op| op.is_enabled()).collect()
}
