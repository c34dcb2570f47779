//! Event kinds, payloads, and handler types for the callback registry.

use std::fmt;
use std::str::FromStr;

use crate::media::VideoSink;
use crate::protocol::{AttendeeInfo, WorkspaceGrant};

// ---------------------------------------------------------------------------
// Event Kinds
// ---------------------------------------------------------------------------

/// Lifecycle events observable by the host application and plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Loading,
    Loaded,
    Alert,
    WorkspaceCreated,
    WorkspaceJoined,
    WorkspaceDestroyed,
    WorkspaceLeft,
    AttendeeJoined,
    AttendeeLeft,
    WorkspaceIsFull,
    CallStarted,
    CallAccepted,
    CallCompleted,
    CallEnded,
    Busy,
    /// Gate: accept an incoming ring from the owner.
    Ringing,
    /// Gate: owner confirms ending the call for everyone.
    TerminateCall,
    /// Gate: attendee confirms leaving the call.
    LeaveCall,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 18] = [
        CallbackKind::Loading,
        CallbackKind::Loaded,
        CallbackKind::Alert,
        CallbackKind::WorkspaceCreated,
        CallbackKind::WorkspaceJoined,
        CallbackKind::WorkspaceDestroyed,
        CallbackKind::WorkspaceLeft,
        CallbackKind::AttendeeJoined,
        CallbackKind::AttendeeLeft,
        CallbackKind::WorkspaceIsFull,
        CallbackKind::CallStarted,
        CallbackKind::CallAccepted,
        CallbackKind::CallCompleted,
        CallbackKind::CallEnded,
        CallbackKind::Busy,
        CallbackKind::Ringing,
        CallbackKind::TerminateCall,
        CallbackKind::LeaveCall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallbackKind::Loading => "loading",
            CallbackKind::Loaded => "loaded",
            CallbackKind::Alert => "alert",
            CallbackKind::WorkspaceCreated => "workspace-created",
            CallbackKind::WorkspaceJoined => "workspace-joined",
            CallbackKind::WorkspaceDestroyed => "workspace-destroyed",
            CallbackKind::WorkspaceLeft => "workspace-left",
            CallbackKind::AttendeeJoined => "attendee-joined",
            CallbackKind::AttendeeLeft => "attendee-left",
            CallbackKind::WorkspaceIsFull => "workspace-is-full",
            CallbackKind::CallStarted => "call-started",
            CallbackKind::CallAccepted => "call-accepted",
            CallbackKind::CallCompleted => "call-completed",
            CallbackKind::CallEnded => "call-ended",
            CallbackKind::Busy => "busy",
            CallbackKind::Ringing => "ringing",
            CallbackKind::TerminateCall => "terminate-call",
            CallbackKind::LeaveCall => "leave-call",
        }
    }

    /// Gates return a boolean decision instead of just observing.
    pub fn is_gate(self) -> bool {
        matches!(
            self,
            CallbackKind::Ringing | CallbackKind::TerminateCall | CallbackKind::LeaveCall
        )
    }

    /// Decision used when no gate handler is registered.
    pub fn gate_default(self) -> bool {
        matches!(self, CallbackKind::TerminateCall | CallbackKind::LeaveCall)
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallbackKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Payloads & Handlers
// ---------------------------------------------------------------------------

/// Data handed to a handler alongside the event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    Attendee(AttendeeInfo),
    Grant(WorkspaceGrant),
    Alert(String),
    /// Body of a plugin data-channel message.
    Message(serde_json::Value),
}

pub type NotifyFn = Box<dyn FnMut(&EventPayload) + Send>;
pub type GateFn = Box<dyn FnMut(&EventPayload) -> bool + Send>;
pub type RenderFn = Box<dyn FnMut(&AttendeeInfo, bool) -> Option<Box<dyn VideoSink>> + Send>;

/// A registered handler. The variant must match the kind it is bound to.
pub enum Callback {
    Notify(NotifyFn),
    Gate(GateFn),
}

impl Callback {
    pub fn notify<F>(f: F) -> Self
    where
        F: FnMut(&EventPayload) + Send + 'static,
    {
        Callback::Notify(Box::new(f))
    }

    pub fn gate<F>(f: F) -> Self
    where
        F: FnMut(&EventPayload) -> bool + Send + 'static,
    {
        Callback::Gate(Box::new(f))
    }

    pub(crate) fn is_gate(&self) -> bool {
        matches!(self, Callback::Gate(_))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Notify(_) => f.write_str("Callback::Notify"),
            Callback::Gate(_) => f.write_str("Callback::Gate"),
        }
    }
}

/// A named bundle of handlers.
///
/// Lifecycle handlers observe the same events as core handlers; message
/// handlers receive data-channel envelopes typed `"<plugin>::<event>"`.
pub struct Plugin {
    pub(crate) name: String,
    pub(crate) lifecycle: Vec<(CallbackKind, NotifyFn)>,
    pub(crate) messages: Vec<(String, NotifyFn)>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on<F>(mut self, kind: CallbackKind, f: F) -> Self
    where
        F: FnMut(&EventPayload) + Send + 'static,
    {
        self.lifecycle.push((kind, Box::new(f)));
        self
    }

    pub fn on_message<F>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&EventPayload) + Send + 'static,
    {
        self.messages.push((event.into(), Box::new(f)));
        self
    }
}
