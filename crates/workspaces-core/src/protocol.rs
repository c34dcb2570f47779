//! Wire protocol between workspace clients and the signaling relay.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.
//! Payload fields are camelCase; SDP and ICE payloads follow the browser
//! `RTCSessionDescriptionInit` / `RTCIceCandidateInit` shapes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared Types
// ---------------------------------------------------------------------------

/// Public descriptor of a workspace participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRef {
    pub id: String,
}

impl AttendeeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRef {
    pub id: String,
}

/// A workspace as granted by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    /// Shareable join token.
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Attendee id of the owner.
    pub owner: String,
}

/// Identity handed out on create / attend / re-attend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceGrant {
    pub workspace: Workspace,
    pub attendee: AttendeeInfo,
    pub access_token: String,
    /// Everyone else currently in the workspace.
    #[serde(default)]
    pub attendees: Vec<AttendeeInfo>,
    /// Id of a call already in progress, reported on re-attend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Renegotiation payload, tagged by SDP role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NegotiationMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
}

/// Envelope carried over the peer data channel.
///
/// `kind` is namespaced as `"<plugin>::<event>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DataMessage {
    /// The plugin namespace, if the kind is namespaced at all.
    pub fn namespace(&self) -> Option<&str> {
        self.kind.split_once("::").map(|(prefix, _)| prefix)
    }
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Proof of membership attached to every request after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub workspace: WorkspaceRef,
    pub attendee: AttendeeRef,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendee {
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLookup {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub workspace: NewWorkspace,
    pub attendee: NewAttendee,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendRequest {
    pub workspace: WorkspaceLookup,
    pub attendee: NewAttendee,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub target: AttendeeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub call: CallRef,
    pub callee: AttendeeRef,
    pub offer: SessionDescription,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub call: CallRef,
    pub caller: AttendeeRef,
    pub answer: SessionDescription,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub call: CallRef,
    pub caller: AttendeeRef,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangupRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub call: CallRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub target: AttendeeRef,
    pub candidate: IceCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    #[serde(flatten)]
    pub auth: Credentials,
    pub target: AttendeeRef,
    pub message: NegotiationMessage,
}

/// Messages a client emits to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Create(CreateRequest),
    Destroy(Credentials),
    Attend(AttendRequest),
    ReAttend(Credentials),
    Leave(Credentials),
    Kick(KickRequest),
    Ring(RingRequest),
    Answer(AnswerRequest),
    Busy(BusyRequest),
    Hangup(HangupRequest),
    #[serde(rename = "icecandidate")]
    IceCandidate(IceCandidateRequest),
    Negotiation(NegotiationRequest),
    AttendeesQuery(Credentials),
    #[serde(rename = "iceservers-query")]
    IceServersQuery,
}

impl ClientMessage {
    /// Wire name of the event, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Destroy(_) => "destroy",
            Self::Attend(_) => "attend",
            Self::ReAttend(_) => "re-attend",
            Self::Leave(_) => "leave",
            Self::Kick(_) => "kick",
            Self::Ring(_) => "ring",
            Self::Answer(_) => "answer",
            Self::Busy(_) => "busy",
            Self::Hangup(_) => "hangup",
            Self::IceCandidate(_) => "icecandidate",
            Self::Negotiation(_) => "negotiation",
            Self::AttendeesQuery(_) => "attendees-query",
            Self::IceServersQuery => "iceservers-query",
        }
    }
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersNotice {
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateNotice {
    /// Attendee that produced the candidate.
    pub broadcaster: AttendeeRef,
    pub candidate: IceCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationNotice {
    pub broadcaster: AttendeeRef,
    pub message: NegotiationMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeesNotice {
    pub attendees: Vec<AttendeeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingNotice {
    pub caller: AttendeeInfo,
    pub call: CallRef,
    pub offer: SessionDescription,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerNotice {
    pub callee: AttendeeInfo,
    pub call: CallRef,
    pub answer: SessionDescription,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyNotice {
    pub callee: AttendeeInfo,
    pub call: CallRef,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangupNotice {
    pub attendee: AttendeeRef,
    pub call: CallRef,
}

/// Messages the relay delivers to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename = "iceservers")]
    IceServers(IceServersNotice),
    #[serde(rename = "icecandidate")]
    IceCandidate(IceCandidateNotice),
    Negotiation(NegotiationNotice),
    Alert(AlertNotice),
    Created(WorkspaceGrant),
    Destroyed,
    Attendees(AttendeesNotice),
    Attend(AttendeeInfo),
    Leave(AttendeeRef),
    AttendanceGranted(WorkspaceGrant),
    ReAttendanceGranted(WorkspaceGrant),
    Ring(RingNotice),
    Answer(AnswerNotice),
    Busy(BusyNotice),
    Hangup(HangupNotice),
    Full,
}

// =============================================================================
// Tests
// =============================================================================
