//! The workspace session: one value owning the roster, the call, and the
//! negotiation state, driven by a single task.
//!
//! Every relay message, peer event, and timer expiry is handled to
//! completion before the next one is taken. Nothing else mutates the
//! registry or the session.

mod call_flow;
mod commands;
mod dispatch;
mod peer;
mod workspace;


pub use commands::{ClientCommand, ClientHandle};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use workspaces_config::WorkspacesConfig;

use crate::call::CallController;
use crate::callbacks::CallbackRegistry;
use crate::media::{MediaCapability, MediaStream, PeerEvent, VideoSink};
use crate::negotiation::NegotiationEngine;
use crate::registry::AttendeeRegistry;
use crate::session::{KeyValueStore, SessionState};
use crate::signaling::{SignalingChannel, SignalingEvent};

/// Inputs raised inside the session: peer events and timer expiries.
#[derive(Debug)]
pub enum SessionInput {
    Peer(PeerEvent),
    RingingTimeout { call_id: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Already normalised against the floor.
    pub ringing_timeout: Duration,
    /// Persist the local identity in the key/value store.
    pub persist: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&WorkspacesConfig::default())
    }
}

impl From<&WorkspacesConfig> for ClientConfig {
    fn from(config: &WorkspacesConfig) -> Self {
        Self {
            ringing_timeout: config.call.effective_ringing_timeout(),
            persist: config.storage.enabled,
        }
    }
}

pub struct WorkspaceClient {
    signaling: Arc<dyn SignalingChannel>,
    media: Arc<dyn MediaCapability>,
    session: SessionState,
    registry: AttendeeRegistry,
    engine: NegotiationEngine,
    call: CallController,
    callbacks: CallbackRegistry,
    local_stream: Option<MediaStream>,
    local_sink: Option<Box<dyn VideoSink>>,
    input_rx: Option<mpsc::UnboundedReceiver<SessionInput>>,
}

impl WorkspaceClient {
    pub fn new(
        config: ClientConfig,
        signaling: Arc<dyn SignalingChannel>,
        media: Arc<dyn MediaCapability>,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let session = SessionState::new(store, config.persist);
        let mut registry = AttendeeRegistry::new();
        registry.set_local(session.attendee().cloned(), media.as_ref());

        Self {
            engine: NegotiationEngine::new(Arc::clone(&media), input_tx.clone()),
            call: CallController::new(config.ringing_timeout, input_tx),
            signaling,
            media,
            session,
            registry,
            callbacks: CallbackRegistry::new(),
            local_stream: None,
            local_sink: None,
            input_rx: Some(input_rx),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn registry(&self) -> &AttendeeRegistry {
        &self.registry
    }

    pub fn call(&self) -> &CallController {
        &self.call
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    pub async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Peer(event) => self.handle_peer_event(event).await,
            SessionInput::RingingTimeout { call_id } => self.on_ringing_timeout(&call_id).await,
        }
    }

    /// Handle every queued internal input, including the ones raised while
    /// handling. Returns how many were processed.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match self.input_rx.as_mut() {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            let Some(input) = next else {
                return handled;
            };
            self.handle_input(input).await;
            handled += 1;
        }
    }

    /// Drive the session until the command channel closes, a shutdown is
    /// requested, or the signaling connection stops for good.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<SignalingEvent>,
        mut commands: mpsc::Receiver<ClientCommand>,
    ) {
        let Some(mut inputs) = self.input_rx.take() else {
            return;
        };
        info!("Workspace client running");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_signaling_event(event).await,
                    None => {
                        debug!("Signaling event stream ended");
                        break;
                    }
                },
                Some(input) = inputs.recv() => self.handle_input(input).await,
                command = commands.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }

        self.shutdown();
        info!("Workspace client stopped");
    }

    /// Move the client onto its own task and return a handle to it.
    pub fn spawn(self, events: mpsc::Receiver<SignalingEvent>) -> (ClientHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let task = tokio::spawn(self.run(events, command_rx));
        (ClientHandle::new(command_tx), task)
    }

    /// Release every connection and the local media. The persisted
    /// identity is left alone so the next start can restore it.
    fn shutdown(&mut self) {
        self.hang_up(false);
    }
}
