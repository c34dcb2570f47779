//! Routing of signaling events and relay messages.

use tracing::{debug, info, warn};

use super::WorkspaceClient;
use crate::callbacks::{CallbackKind, EventPayload};
use crate::protocol::{
    AttendeeRef, ClientMessage, IceCandidateNotice, NegotiationMessage, NegotiationNotice, NegotiationRequest,
    ServerMessage,
};
use crate::signaling::SignalingEvent;

impl WorkspaceClient {
    pub async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => {
                info!("Connected to relay");
                self.emit(ClientMessage::IceServersQuery).await;
                if self.session.has_joined() {
                    self.restore_session().await;
                }
            }
            SignalingEvent::Disconnected => warn!("Disconnected from relay"),
            SignalingEvent::Error(e) => warn!(error = %e, "Relay connection error"),
            SignalingEvent::Message(message) => self.handle_server_message(message).await,
        }
    }

    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::IceServers(notice) => self.engine.set_ice_servers(notice.ice_servers),
            ServerMessage::IceCandidate(notice) => self.on_remote_candidate(notice).await,
            ServerMessage::Negotiation(notice) => self.on_negotiation(notice).await,
            ServerMessage::Alert(notice) => {
                warn!(message = %notice.message, "Relay alert");
                self.notify(CallbackKind::Loaded, EventPayload::None);
                self.notify(CallbackKind::Alert, EventPayload::Alert(notice.message));
            }
            ServerMessage::Created(grant) => self.on_granted(grant, CallbackKind::WorkspaceCreated),
            ServerMessage::AttendanceGranted(grant) => {
                self.on_granted(grant, CallbackKind::WorkspaceJoined)
            }
            ServerMessage::ReAttendanceGranted(grant) => self.on_regranted(grant).await,
            ServerMessage::Destroyed => {
                self.notify(CallbackKind::Loaded, EventPayload::None);
                self.teardown_workspace(CallbackKind::WorkspaceDestroyed);
            }
            ServerMessage::Attendees(notice) => {
                self.registry.sync(notice.attendees, self.media.as_ref());
            }
            ServerMessage::Attend(info) => self.on_attendee_joined(info).await,
            ServerMessage::Leave(attendee) => {
                if self.registry.is_local(&attendee.id) {
                    info!("Removed from workspace by the owner");
                    self.teardown_workspace(CallbackKind::WorkspaceLeft);
                } else {
                    self.on_attendee_left(&attendee.id);
                }
            }
            ServerMessage::Ring(notice) => self.on_ring(notice).await,
            ServerMessage::Answer(notice) => self.on_answer(notice).await,
            ServerMessage::Busy(notice) => self.on_busy(notice).await,
            ServerMessage::Hangup(notice) => self.on_hangup(notice),
            ServerMessage::Full => {
                self.notify(CallbackKind::Loaded, EventPayload::None);
                self.notify(CallbackKind::WorkspaceIsFull, EventPayload::None);
            }
        }
    }

    async fn on_remote_candidate(&mut self, notice: IceCandidateNotice) {
        let attendee_id = notice.broadcaster.id;
        let Some(entry) = self.registry.get_mut(&attendee_id) else {
            debug!(attendee_id = %attendee_id, "ICE candidate from unknown attendee");
            return;
        };
        if let Err(e) = self.engine.add_ice_candidate(entry, notice.candidate).await {
            warn!(attendee_id = %attendee_id, error = %e, "Failed to apply ICE candidate");
        }
    }

    async fn on_negotiation(&mut self, notice: NegotiationNotice) {
        let attendee_id = notice.broadcaster.id;
        let Ok(credentials) = self.credentials() else {
            return;
        };
        let Some(entry) = self.registry.get_mut(&attendee_id) else {
            debug!(attendee_id = %attendee_id, "Negotiation from unknown attendee");
            return;
        };

        match notice.message {
            NegotiationMessage::Offer(offer) => {
                match self.engine.renegotiate_answer(entry, offer).await {
                    Ok(answer) => {
                        self.emit(ClientMessage::Negotiation(NegotiationRequest {
                            auth: credentials,
                            target: AttendeeRef::new(attendee_id.as_str()),
                            message: NegotiationMessage::Answer(answer),
                        }))
                        .await;
                    }
                    Err(e) => warn!(attendee_id = %attendee_id, error = %e, "Renegotiation failed"),
                }
            }
            NegotiationMessage::Answer(answer) => {
                if let Err(e) = self.engine.apply_answer(entry, answer).await {
                    warn!(attendee_id = %attendee_id, error = %e, "Renegotiation answer rejected");
                }
            }
        }
    }
}
