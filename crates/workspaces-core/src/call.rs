//! Call phase and the ringing timeout.
//!
//! The controller only holds bookkeeping: which attendees were rung in the
//! current round, which of them answered, and the cancellable timer. The
//! transitions themselves run in the client's call flow.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::SessionInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPhase {
    #[default]
    Idle,
    /// We rang at least one attendee and wait for answers.
    RingingOutbound,
    /// A ring arrived and is being decided, or a call id was adopted while
    /// waiting for the owner's ring.
    RingingInbound,
    Active,
    Terminating,
}

pub struct CallController {
    phase: CallPhase,
    ringing_timeout: Duration,
    timer: Option<JoinHandle<()>>,
    targets: HashSet<String>,
    answered: HashSet<String>,
    /// Last call we turned down; later rings for it are refused too.
    declined: Option<String>,
    input_tx: mpsc::UnboundedSender<SessionInput>,
}

impl CallController {
    pub(crate) fn new(ringing_timeout: Duration, input_tx: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self {
            phase: CallPhase::Idle,
            ringing_timeout,
            timer: None,
            targets: HashSet::new(),
            answered: HashSet::new(),
            declined: None,
            input_tx,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: CallPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Call phase");
            self.phase = phase;
        }
    }

    pub fn ringing_timeout(&self) -> Duration {
        self.ringing_timeout
    }

    // -----------------------------------------------------------------------
    // Ringing timer
    // -----------------------------------------------------------------------

    /// (Re)start the ringing timer for `call_id`.
    pub(crate) fn arm(&mut self, call_id: &str) {
        self.cancel();
        let tx = self.input_tx.clone();
        let delay = self.ringing_timeout;
        let call_id = call_id.to_string();
        debug!(call_id = %call_id, timeout_ms = delay.as_millis() as u64, "Ringing timer armed");
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionInput::RingingTimeout { call_id });
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    pub(crate) fn add_target(&mut self, attendee_id: &str) {
        self.targets.insert(attendee_id.to_string());
    }

    pub(crate) fn mark_answered(&mut self, attendee_id: &str) {
        self.answered.insert(attendee_id.to_string());
    }

    /// Forget an attendee that left or was torn down.
    pub(crate) fn forget(&mut self, attendee_id: &str) {
        self.targets.remove(attendee_id);
        self.answered.remove(attendee_id);
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answered.len()
    }

    /// Rung attendees that never answered.
    pub fn unanswered(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|id| !self.answered.contains(*id))
            .cloned()
            .collect()
    }

    pub(crate) fn decline(&mut self, call_id: &str) {
        self.declined = Some(call_id.to_string());
    }

    pub fn has_declined(&self, call_id: &str) -> bool {
        self.declined.as_deref() == Some(call_id)
    }

    /// Back to idle: timer cancelled, bookkeeping cleared.
    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.targets.clear();
        self.answered.clear();
        self.set_phase(CallPhase::Idle);
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.cancel();
    }
}
