//! Injected media and transport capability.
//!
//! The workspace core never touches capture devices or the SDP/ICE
//! machinery directly. A host supplies a [`MediaCapability`] that produces
//! local streams and per-attendee [`PeerConnection`]s; connection events
//! flow back through the [`PeerEventSink`] handed over at creation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use workspaces_common::Result;

use crate::client::SessionInput;
use crate::protocol::{IceCandidate, IceServer, SessionDescription};

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Which camera a local stream is captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    User,
    Environment,
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::User => CameraFacing::Environment,
            CameraFacing::Environment => CameraFacing::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn first_track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        self.tracks_of(kind).next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// States after which the owner restarts negotiation with the peer.
    pub fn needs_renegotiation(self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected | IceConnectionState::Failed
        )
    }
}

// ---------------------------------------------------------------------------
// Capability Traits
// ---------------------------------------------------------------------------

/// Device capture and peer-connection factory.
#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// Capture camera and microphone.
    async fn acquire_local_media(&self, facing: CameraFacing) -> Result<MediaStream>;

    /// Stop every track of a stream and release the device.
    fn stop_stream(&self, stream: &MediaStream);

    fn set_track_enabled(&self, track: &MediaTrack, enabled: bool);

    /// Allocate a negotiation handle. All of its events must be reported
    /// through `events`.
    async fn create_peer(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>>;

    /// Whether the device can switch between front and rear cameras.
    fn supports_facing_mode(&self) -> bool {
        true
    }
}

/// One negotiation handle, exclusively owned by an attendee entry.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&mut self) -> Result<SessionDescription>;
    async fn create_answer(&mut self) -> Result<SessionDescription>;
    async fn set_local_description(&mut self, description: SessionDescription) -> Result<()>;
    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<()>;
    fn add_track(&mut self, track: &MediaTrack, stream: &MediaStream) -> Result<()>;
    /// Create the outbound data channel. Its open/message events are
    /// reported through the peer's event sink.
    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>>;
    /// Swap the outgoing track of `kind` without renegotiating.
    async fn replace_track(&mut self, kind: TrackKind, track: &MediaTrack) -> Result<()>;
    fn close(&mut self);
}

pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;
    fn is_open(&self) -> bool;
    fn send(&self, text: &str) -> Result<()>;
    fn close(&self);
}

/// Opaque presentation handle a stream is rendered into.
pub trait VideoSink: Send {
    fn attach(&self, stream: &MediaStream);
    fn detach(&self);
}

// ---------------------------------------------------------------------------
// Peer Events
// ---------------------------------------------------------------------------

pub enum PeerEventKind {
    /// Local candidate gathered; must be relayed to the remote attendee.
    IceCandidate(IceCandidate),
    /// Remote media arrived.
    Track(MediaStream),
    IceConnectionState(IceConnectionState),
    /// The remote side opened a data channel towards us.
    DataChannel(Arc<dyn DataChannel>),
    DataChannelOpen,
    Message(String),
}

impl fmt::Debug for PeerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            Self::Track(s) => f.debug_tuple("Track").field(&s.id).finish(),
            Self::IceConnectionState(s) => f.debug_tuple("IceConnectionState").field(s).finish(),
            Self::DataChannel(dc) => f.debug_tuple("DataChannel").field(&dc.label()).finish(),
            Self::DataChannelOpen => f.write_str("DataChannelOpen"),
            Self::Message(m) => f.debug_tuple("Message").field(m).finish(),
        }
    }
}

#[derive(Debug)]
pub struct PeerEvent {
    pub attendee_id: String,
    pub kind: PeerEventKind,
}

/// Reports events of one attendee's peer connection into the session loop.
#[derive(Clone)]
pub struct PeerEventSink {
    attendee_id: String,
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl PeerEventSink {
    pub(crate) fn new(attendee_id: impl Into<String>, tx: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self {
            attendee_id: attendee_id.into(),
            tx,
        }
    }

    pub fn attendee_id(&self) -> &str {
        &self.attendee_id
    }

    /// Queue an event. Dropped silently once the session has shut down.
    pub fn emit(&self, kind: PeerEventKind) {
        let _ = self.tx.send(SessionInput::Peer(PeerEvent {
            attendee_id: self.attendee_id.clone(),
            kind,
        }));
    }
}

impl fmt::Debug for PeerEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerEventSink")
            .field("attendee_id", &self.attendee_id)
            .finish()
    }
}
