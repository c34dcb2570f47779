//! Peer connection events and data-channel messaging.

use serde_json::Value;
use tracing::{debug, info, warn};
use workspaces_common::{Result, WorkspaceError};

use super::WorkspaceClient;
use crate::callbacks::{CallbackKind, EventPayload};
use crate::media::{PeerEvent, PeerEventKind};
use crate::protocol::{
    AttendeeRef, ClientMessage, DataMessage, IceCandidateRequest, NegotiationMessage,
    NegotiationRequest,
};
use crate::registry::AttendeeEntry;

impl WorkspaceClient {
    pub(super) async fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent { attendee_id, kind } = event;
        let Some(entry) = self.registry.get_mut(&attendee_id) else {
            debug!(attendee_id = %attendee_id, event = ?kind, "Peer event for unknown attendee");
            return;
        };

        match kind {
            PeerEventKind::IceCandidate(candidate) => {
                let Ok(credentials) = self.credentials() else {
                    return;
                };
                self.emit(ClientMessage::IceCandidate(IceCandidateRequest {
                    auth: credentials,
                    target: AttendeeRef::new(attendee_id),
                    candidate,
                }))
                .await;
            }
            PeerEventKind::Track(stream) => {
                if let Some(old) = entry.remote_stream.take() {
                    if old.id != stream.id {
                        self.media.stop_stream(&old);
                    }
                }
                if entry.video_sink.is_none() {
                    entry.video_sink = self.callbacks.render_video_sink(&entry.info, false);
                }
                if let Some(sink) = &entry.video_sink {
                    sink.attach(&stream);
                }
                debug!(attendee_id = %attendee_id, stream_id = %stream.id, "Remote stream attached");
                entry.remote_stream = Some(stream);
            }
            PeerEventKind::IceConnectionState(state) => {
                debug!(attendee_id = %attendee_id, state = ?state, "ICE connection state");
                if state.needs_renegotiation() && entry.on_call && self.session.is_owner() {
                    self.renegotiate(&attendee_id).await;
                }
            }
            PeerEventKind::DataChannel(channel) => {
                debug!(attendee_id = %attendee_id, label = %channel.label(), "Data channel received");
                entry.data_channel = Some(channel);
                flush_messages(entry);
            }
            PeerEventKind::DataChannelOpen => {
                flush_messages(entry);
                let info = entry.info.clone();
                if self.session.is_on_call(None) {
                    info!(attendee_id = %attendee_id, "Call completed");
                    self.notify(CallbackKind::CallCompleted, EventPayload::Attendee(info));
                }
            }
            PeerEventKind::Message(text) => match serde_json::from_str::<DataMessage>(&text) {
                Ok(message) => {
                    if !self.callbacks.dispatch_message(&message) {
                        debug!(attendee_id = %attendee_id, kind = %message.kind, "Unhandled message");
                    }
                }
                Err(e) => debug!(attendee_id = %attendee_id, error = %e, "Malformed data message"),
            },
        }
    }

    /// Restart negotiation on an existing link after connectivity loss.
    async fn renegotiate(&mut self, attendee_id: &str) {
        let Ok(credentials) = self.credentials() else {
            return;
        };
        let Some(entry) = self.registry.get_mut(attendee_id) else {
            return;
        };
        match self.engine.renegotiate_offer(entry).await {
            Ok(offer) => {
                info!(attendee_id, "Renegotiating peer connection");
                self.emit(ClientMessage::Negotiation(NegotiationRequest {
                    auth: credentials,
                    target: AttendeeRef::new(attendee_id),
                    message: NegotiationMessage::Offer(offer),
                }))
                .await;
            }
            Err(e) => warn!(attendee_id, error = %e, "Renegotiation failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Send `{type: kind, data}` to one attendee, or to everyone on the call
    /// when `target` is `None`. Messages for a channel that is not open yet
    /// are queued and flushed in order once it opens.
    pub fn send_message(&mut self, kind: &str, data: Value, target: Option<&str>) -> Result<()> {
        if !self.session.is_on_call(None) {
            debug!(kind, "Not on a call, message dropped");
            return Ok(());
        }
        if target.is_some_and(|id| self.registry.is_local(id)) {
            return Ok(());
        }
        let text = serde_json::to_string(&DataMessage {
            kind: kind.to_string(),
            data,
        })?;

        match target {
            Some(id) => {
                let entry = self
                    .registry
                    .get_mut(id)
                    .ok_or_else(|| WorkspaceError::UnknownAttendee(id.to_string()))?;
                if entry.on_call {
                    deliver(entry, text);
                }
            }
            None => {
                for entry in self.registry.iter_mut().filter(|e| e.on_call) {
                    deliver(entry, text.clone());
                }
            }
        }
        Ok(())
    }
}

/// Queue behind earlier messages, then push out whatever the channel takes.
fn deliver(entry: &mut AttendeeEntry, text: String) {
    entry.queue_message(text);
    flush_messages(entry);
}

/// Send queued messages in order. The first failed send stops the flush and
/// leaves that message and everything after it queued for the next attempt.
fn flush_messages(entry: &mut AttendeeEntry) {
    if !entry.data_channel_open() {
        return;
    }
    let Some(channel) = entry.data_channel.clone() else {
        return;
    };
    let mut pending = entry.take_messages().into_iter();
    let mut flushed = 0usize;
    while let Some(text) = pending.next() {
        if let Err(e) = channel.send(&text) {
            warn!(
                attendee_id = %entry.info.id,
                error = %e,
                flushed,
                "Send failed, keeping the rest queued"
            );
            entry.requeue_messages(std::iter::once(text).chain(pending));
            return;
        }
        flushed += 1;
    }
    if flushed > 1 {
        debug!(attendee_id = %entry.info.id, count = flushed, "Flushed message buffer");
    }
}
