//! Call transitions: ring, answer, busy, hangup, and ringing timeout.

use tracing::{debug, info, warn};
use workspaces_common::{new_id, Result, WorkspaceError};

use super::WorkspaceClient;
use crate::call::CallPhase;
use crate::callbacks::{CallbackKind, EventPayload};
use crate::media::{MediaStream, TrackKind};
use crate::protocol::{
    AnswerNotice, AnswerRequest, AttendeeInfo, AttendeeRef, BusyNotice, BusyRequest, CallRef,
    ClientMessage, Credentials, HangupNotice, HangupRequest, RingNotice, RingRequest,
    SessionDescription,
};

/// Nonce action correlating a ring with its answer or busy reply.
const START_CALL: &str = "start-call";

impl WorkspaceClient {
    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Owner: ring every attendee not yet on the call. Anyone else asks the
    /// relay to re-admit them, which resumes an ongoing call.
    pub async fn start_call(&mut self) -> Result<()> {
        if !self.session.has_joined() {
            return Err(WorkspaceError::NotJoined);
        }
        if !self.session.is_owner() {
            self.restore_session().await;
            return Ok(());
        }
        self.engine.ensure_ready()?;

        let call_id = match self.session.call_id() {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                self.session.set_call(id.clone());
                id
            }
        };
        self.ensure_local_media().await?;

        let targets: Vec<String> = self
            .registry
            .iter()
            .filter(|e| !e.on_call)
            .map(|e| e.info.id.clone())
            .collect();
        let mut rung = 0;
        for attendee_id in targets {
            match self.ring_attendee(&attendee_id).await {
                Ok(()) => rung += 1,
                Err(e) => warn!(attendee_id = %attendee_id, error = %e, "Failed to ring attendee"),
            }
        }
        info!(call_id = %call_id, rung, "Call started");

        if rung > 0 {
            self.call.arm(&call_id);
            if self.call.phase() != CallPhase::Active {
                self.call.set_phase(CallPhase::RingingOutbound);
            }
        } else if self.call.phase() == CallPhase::Idle {
            self.call.set_phase(CallPhase::Active);
        }

        if let Some(local) = self.registry.local().cloned() {
            self.notify(CallbackKind::CallStarted, EventPayload::Attendee(local));
        }
        Ok(())
    }

    /// Run the offer flow towards one attendee and send the ring.
    pub(super) async fn ring_attendee(&mut self, attendee_id: &str) -> Result<()> {
        let credentials = self.credentials()?;
        let call_id = self
            .session
            .call_id()
            .map(str::to_string)
            .ok_or_else(|| WorkspaceError::Negotiation("no call in progress".into()))?;
        let local = self
            .local_stream
            .as_ref()
            .ok_or_else(|| WorkspaceError::Media("local media not acquired".into()))?;
        let entry = self
            .registry
            .get_mut(attendee_id)
            .ok_or_else(|| WorkspaceError::UnknownAttendee(attendee_id.to_string()))?;

        let offer = self.engine.offer(entry, local, &call_id).await?;
        self.call.add_target(attendee_id);
        let nonce = self.session.nonce(START_CALL, &call_id);
        debug!(attendee_id, call_id = %call_id, "Ringing");
        self.emit(ClientMessage::Ring(RingRequest {
            auth: credentials,
            call: CallRef { id: call_id },
            callee: AttendeeRef::new(attendee_id),
            offer,
            nonce,
        }))
        .await;
        Ok(())
    }

    /// Ask the matching gate, then hang up for everyone. Returns whether
    /// the call was ended.
    pub async fn end_call(&mut self) -> Result<bool> {
        let Some(call_id) = self.session.call_id().map(str::to_string) else {
            return Ok(false);
        };
        let credentials = self.credentials()?;
        let gate = if self.session.is_owner() {
            CallbackKind::TerminateCall
        } else {
            CallbackKind::LeaveCall
        };
        if !self.callbacks.gate(gate, &EventPayload::None) {
            debug!(gate = %gate, "Hangup declined");
            return Ok(false);
        }
        self.emit_hangup(&credentials, &call_id).await;
        self.hang_up(true);
        Ok(true)
    }

    pub(super) async fn emit_hangup(&mut self, credentials: &Credentials, call_id: &str) {
        self.emit(ClientMessage::Hangup(HangupRequest {
            auth: credentials.clone(),
            call: CallRef {
                id: call_id.to_string(),
            },
        }))
        .await;
    }

    /// End the call on our own initiative. The hangup tells the relay and
    /// the other attendees that this call id is gone.
    async fn close_call(&mut self) {
        let call_id = self.session.call_id().map(str::to_string);
        if let (Ok(credentials), Some(call_id)) = (self.credentials(), call_id) {
            self.emit_hangup(&credentials, &call_id).await;
        }
        self.hang_up(true);
    }

    /// Tear down every peer and the local media and forget the call.
    pub(super) fn hang_up(&mut self, notify: bool) {
        let had_call = self.session.call_id().is_some();
        self.call.set_phase(CallPhase::Terminating);
        self.call.reset();
        for entry in self.registry.iter_mut() {
            entry.release_connection(self.media.as_ref());
        }
        self.release_local_media();
        if let Some(call) = self.session.take_call() {
            info!(call_id = %call.id, "Call ended");
        }
        if notify && had_call {
            self.notify(CallbackKind::CallEnded, EventPayload::None);
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    pub(super) async fn on_ring(&mut self, notice: RingNotice) {
        let RingNotice {
            caller,
            call,
            offer,
            nonce,
        } = notice;
        let Ok(credentials) = self.credentials() else {
            return;
        };
        if self.registry.is_local(&caller.id) {
            return;
        }
        // The roster may lag behind the relay.
        self.registry.add(caller.clone());

        let from_owner = self.session.owner_id() == Some(caller.id.as_str());
        let already_on_call = self.session.is_on_call(Some(&call.id));
        // A call id adopted on re-attend may be long gone. The owner's ring
        // for a new call replaces it as long as nobody is connected on it.
        if from_owner
            && !already_on_call
            && self.session.is_on_call(None)
            && !self.registry.iter().any(|e| e.on_call)
        {
            info!(call_id = %call.id, "Owner started a new call, dropping the stale one");
            self.hang_up(false);
        }
        if self.session.is_on_call(None) && !already_on_call {
            debug!(call_id = %call.id, caller = %caller.id, "Busy on another call");
            self.emit_busy(credentials, call, &caller.id, nonce).await;
            return;
        }

        let adopted = !already_on_call;
        if adopted {
            self.session.set_call(call.id.clone());
            self.call.set_phase(CallPhase::RingingInbound);
        }

        let accept = if already_on_call {
            true
        } else if from_owner {
            self.callbacks
                .gate(CallbackKind::Ringing, &EventPayload::Attendee(caller.clone()))
        } else {
            !self.call.has_declined(&call.id)
        };

        if !accept {
            info!(call_id = %call.id, caller = %caller.id, "Call declined");
            self.call.decline(&call.id);
            self.discard_tentative_call(adopted);
            self.emit_busy(credentials, call, &caller.id, nonce).await;
            return;
        }

        if let Err(e) = self
            .accept_ring(&credentials, &caller, &call, offer, nonce.clone())
            .await
        {
            warn!(call_id = %call.id, caller = %caller.id, error = %e, "Failed to answer call");
            if let Some(entry) = self.registry.get_mut(&caller.id) {
                entry.release_connection(self.media.as_ref());
            }
            self.discard_tentative_call(adopted);
            self.emit_busy(credentials, call, &caller.id, nonce).await;
        }
    }

    async fn accept_ring(
        &mut self,
        credentials: &Credentials,
        caller: &AttendeeInfo,
        call: &CallRef,
        offer: SessionDescription,
        nonce: String,
    ) -> Result<()> {
        self.ensure_local_media().await?;
        let local = self
            .local_stream
            .as_ref()
            .ok_or_else(|| WorkspaceError::Media("local media not acquired".into()))?;
        let entry = self
            .registry
            .get_mut(&caller.id)
            .ok_or_else(|| WorkspaceError::UnknownAttendee(caller.id.clone()))?;

        let answer = self.engine.answer(entry, local, offer).await?;
        entry.on_call = true;
        self.emit(ClientMessage::Answer(AnswerRequest {
            auth: credentials.clone(),
            call: call.clone(),
            caller: AttendeeRef::new(caller.id.as_str()),
            answer,
            nonce,
        }))
        .await;

        let was_active = self.call.phase() == CallPhase::Active;
        self.call.set_phase(CallPhase::Active);
        info!(call_id = %call.id, caller = %caller.id, "Call accepted");
        if !was_active {
            if let Some(local) = self.registry.local().cloned() {
                self.notify(CallbackKind::CallStarted, EventPayload::Attendee(local));
            }
        }
        self.notify(CallbackKind::CallAccepted, EventPayload::Attendee(caller.clone()));
        Ok(())
    }

    /// Drop a call id adopted for a ring we did not take, unless some
    /// other peer already joined us on it.
    fn discard_tentative_call(&mut self, adopted: bool) {
        if adopted && !self.registry.iter().any(|e| e.on_call) {
            self.hang_up(false);
        }
    }

    async fn emit_busy(&mut self, credentials: Credentials, call: CallRef, caller_id: &str, nonce: String) {
        self.emit(ClientMessage::Busy(BusyRequest {
            auth: credentials,
            call,
            caller: AttendeeRef::new(caller_id),
            nonce,
        }))
        .await;
    }

    pub(super) async fn on_answer(&mut self, notice: AnswerNotice) {
        let AnswerNotice {
            callee,
            call,
            answer,
            nonce,
        } = notice;
        if !self.session.is_on_call(Some(&call.id)) || !self.session.verify_nonce(&nonce) {
            debug!(call_id = %call.id, callee = %callee.id, "Dropping stale answer");
            return;
        }
        let Some(entry) = self.registry.get_mut(&callee.id) else {
            return;
        };
        // The ringing timeout may already have released this peer.
        if !entry.has_peer() {
            debug!(callee = %callee.id, "Answer for a released peer");
            return;
        }
        if let Err(e) = self.engine.apply_answer(entry, answer).await {
            warn!(callee = %callee.id, error = %e, "Failed to apply answer");
            return;
        }
        entry.on_call = true;
        self.call.mark_answered(&callee.id);
        self.call.set_phase(CallPhase::Active);
        info!(call_id = %call.id, callee = %callee.id, "Call answered");
        self.notify(CallbackKind::CallAccepted, EventPayload::Attendee(callee));
    }

    /// Release the busy callee. The call ends only once nobody is connected
    /// and nobody is left ringing.
    pub(super) async fn on_busy(&mut self, notice: BusyNotice) {
        if !self.session.is_on_call(Some(&notice.call.id)) || !self.session.verify_nonce(&notice.nonce) {
            debug!(call_id = %notice.call.id, callee = %notice.callee.id, "Dropping stale busy");
            return;
        }
        info!(call_id = %notice.call.id, callee = %notice.callee.id, "Attendee is busy");
        if let Some(entry) = self.registry.get_mut(&notice.callee.id) {
            entry.release_connection(self.media.as_ref());
        }
        self.call.forget(&notice.callee.id);

        if self.call.unanswered().is_empty() && !self.registry.iter().any(|e| e.on_call) {
            self.close_call().await;
        }
        self.notify(CallbackKind::Busy, EventPayload::Attendee(notice.callee));
    }

    pub(super) fn on_hangup(&mut self, notice: HangupNotice) {
        if !self.session.is_on_call(Some(&notice.call.id)) {
            return;
        }
        let attendee_id = notice.attendee.id;
        if self.session.owner_id() == Some(attendee_id.as_str()) {
            info!(call_id = %notice.call.id, "Owner ended the call");
            self.hang_up(true);
            return;
        }
        let Some(entry) = self.registry.get_mut(&attendee_id) else {
            return;
        };
        entry.release_connection(self.media.as_ref());
        let info = entry.info.clone();
        self.call.forget(&attendee_id);
        info!(call_id = %notice.call.id, attendee_id = %attendee_id, "Attendee left the call");
        self.notify(CallbackKind::CallEnded, EventPayload::Attendee(info));
    }

    /// Release every rung attendee that never answered. With nobody left
    /// on the call, the call ends.
    pub(super) async fn on_ringing_timeout(&mut self, call_id: &str) {
        if !self.session.is_on_call(Some(call_id)) {
            return;
        }
        let pending = self.call.unanswered();
        info!(call_id, unanswered = pending.len(), "Ringing timed out");
        for attendee_id in &pending {
            if let Some(entry) = self.registry.get_mut(attendee_id) {
                if !entry.on_call {
                    entry.release_connection(self.media.as_ref());
                }
            }
            self.call.forget(attendee_id);
        }

        if self.registry.iter().any(|e| e.on_call) {
            self.call.set_phase(CallPhase::Active);
        } else {
            self.close_call().await;
        }
    }

    // -----------------------------------------------------------------------
    // Local media
    // -----------------------------------------------------------------------

    pub(super) async fn ensure_local_media(&mut self) -> Result<()> {
        if self.local_stream.is_some() {
            return Ok(());
        }
        let stream = self
            .media
            .acquire_local_media(self.session.camera_mode())
            .await?;
        if self.local_sink.is_none() {
            if let Some(local) = self.registry.local() {
                self.local_sink = self.callbacks.render_video_sink(local, true);
            }
        }
        if let Some(sink) = &self.local_sink {
            sink.attach(&stream);
        }
        debug!(stream_id = %stream.id, "Local media acquired");
        self.local_stream = Some(stream);
        Ok(())
    }

    fn release_local_media(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            self.media.stop_stream(&stream);
        }
        if let Some(sink) = self.local_sink.take() {
            sink.detach();
        }
    }

    /// Enable or disable the first audio track of the local stream, or of
    /// a remote attendee's stream.
    pub fn set_mic_state(&mut self, attendee_id: Option<&str>, enabled: bool) {
        self.set_track_state(attendee_id, TrackKind::Audio, enabled);
    }

    pub fn set_cam_state(&mut self, attendee_id: Option<&str>, enabled: bool) {
        self.set_track_state(attendee_id, TrackKind::Video, enabled);
    }

    fn set_track_state(&mut self, attendee_id: Option<&str>, kind: TrackKind, enabled: bool) {
        let stream: Option<&MediaStream> = match attendee_id {
            Some(id) if !self.registry.is_local(id) => {
                self.registry.get(id).and_then(|e| e.remote_stream())
            }
            _ => self.local_stream.as_ref(),
        };
        if let Some(track) = stream.and_then(|s| s.first_track(kind)) {
            self.media.set_track_enabled(track, enabled);
        }
    }

    pub fn camera_mode(&self) -> crate::media::CameraFacing {
        self.session.camera_mode()
    }

    /// Flip between front and rear camera and swap the outgoing video
    /// track on every peer. Returns `false` when there is nothing to
    /// switch.
    pub async fn switch_camera(&mut self) -> Result<bool> {
        if !self.media.supports_facing_mode() || self.local_stream.is_none() {
            return Ok(false);
        }
        let facing = self.session.camera_mode().toggled();
        let stream = self.media.acquire_local_media(facing).await?;

        if let Some(old) = self.local_stream.take() {
            self.media.stop_stream(&old);
        }
        if let Some(sink) = &self.local_sink {
            sink.attach(&stream);
        }
        if let Some(track) = stream.first_track(TrackKind::Video).cloned() {
            for entry in self.registry.iter_mut() {
                let attendee_id = entry.info.id.clone();
                if let Some(peer) = entry.peer.as_mut() {
                    if let Err(e) = peer.replace_track(TrackKind::Video, &track).await {
                        warn!(attendee_id = %attendee_id, error = %e, "Failed to replace video track");
                    }
                }
            }
        }
        self.session.set_camera_mode(facing);
        self.local_stream = Some(stream);
        info!(facing = ?facing, "Camera switched");
        Ok(true)
    }
}
