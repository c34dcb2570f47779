pub mod call;
pub mod callbacks;
pub mod client;
pub mod media;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod testing;

pub use call::{CallController, CallPhase};
pub use callbacks::{Callback, CallbackKind, CallbackRegistry, EventPayload, Plugin};
pub use client::{ClientCommand, ClientConfig, ClientHandle, SessionInput, WorkspaceClient};
pub use media::{
    CameraFacing, DataChannel, IceConnectionState, MediaCapability, MediaStream, MediaTrack,
    PeerConnection, PeerEvent, PeerEventKind, PeerEventSink, TrackKind, VideoSink,
};
pub use negotiation::NegotiationEngine;
pub use protocol::{
    AttendeeInfo, ClientMessage, Credentials, DataMessage, NewAttendee, NewWorkspace,
    ServerMessage, Workspace, WorkspaceGrant, WorkspaceLookup,
};
pub use registry::{AttendeeEntry, AttendeeRegistry};
pub use session::{FileStore, KeyValueStore, MemoryStore, SessionState};
pub use signaling::{
    SignalingChannel, SignalingClient, SignalingClientConfig, SignalingCommand, SignalingEvent,
};
