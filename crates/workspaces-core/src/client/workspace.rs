//! Workspace lifecycle, roster queries, and attendee state.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use workspaces_common::{Result, WorkspaceError};

use super::WorkspaceClient;
use crate::call::CallPhase;
use crate::callbacks::{Callback, CallbackKind, EventPayload, Plugin};
use crate::media::VideoSink;
use crate::protocol::{
    AttendRequest, AttendeeInfo, AttendeeRef, ClientMessage, CreateRequest, Credentials,
    KickRequest, NewAttendee, NewWorkspace, Workspace, WorkspaceGrant, WorkspaceLookup,
};

const CREATE_WORKSPACE: &str = "create-workspace";
const ATTEND_WORKSPACE: &str = "attend-workspace";

impl WorkspaceClient {
    pub(super) fn notify(&mut self, kind: CallbackKind, payload: EventPayload) {
        self.callbacks.notify(kind, &payload);
    }

    pub(super) async fn emit(&mut self, message: ClientMessage) {
        self.signaling.emit(message).await;
    }

    pub(super) fn credentials(&self) -> Result<Credentials> {
        self.session.credentials().ok_or(WorkspaceError::NotJoined)
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    pub fn register_callback(&mut self, kind: CallbackKind, callback: Callback) -> Result<()> {
        self.callbacks.register(kind, callback)
    }

    pub fn unregister_callback(&mut self, kind: CallbackKind) -> bool {
        self.callbacks.unregister(kind)
    }

    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<()> {
        self.callbacks.register_plugin(plugin)
    }

    pub fn set_video_renderer<F>(&mut self, renderer: F)
    where
        F: FnMut(&AttendeeInfo, bool) -> Option<Box<dyn VideoSink>> + Send + 'static,
    {
        self.callbacks.set_video_renderer(renderer);
    }

    // -----------------------------------------------------------------------
    // Workspace lifecycle
    // -----------------------------------------------------------------------

    pub async fn create_workspace(&mut self, workspace: NewWorkspace, attendee: NewAttendee) {
        self.notify(CallbackKind::Loading, EventPayload::None);
        let nonce = self.session.nonce(CREATE_WORKSPACE, &workspace.name);
        self.emit(ClientMessage::Create(CreateRequest {
            workspace,
            attendee,
            nonce,
        }))
        .await;
    }

    pub async fn join_workspace(&mut self, workspace: WorkspaceLookup, attendee: NewAttendee) {
        self.notify(CallbackKind::Loading, EventPayload::None);
        let nonce = self.session.nonce(ATTEND_WORKSPACE, &workspace.token);
        self.emit(ClientMessage::Attend(AttendRequest {
            workspace,
            attendee,
            nonce,
        }))
        .await;
    }

    /// Ask the relay to re-admit the stored identity. Returns `false` when
    /// there is nothing to restore.
    pub async fn restore_session(&mut self) -> bool {
        let Ok(credentials) = self.credentials() else {
            return false;
        };
        info!(workspace_id = %credentials.workspace.id, "Restoring workspace session");
        self.notify(CallbackKind::Loading, EventPayload::None);
        self.emit(ClientMessage::ReAttend(credentials)).await;
        true
    }

    /// Leave the workspace. The owner can only destroy it.
    pub async fn leave_workspace(&mut self) -> Result<()> {
        let credentials = self.credentials()?;
        if self.session.is_owner() {
            return Err(WorkspaceError::OwnerCannotLeave);
        }
        if let Some(call_id) = self.session.call_id().map(str::to_string) {
            self.emit_hangup(&credentials, &call_id).await;
            self.hang_up(true);
        }
        self.emit(ClientMessage::Leave(credentials)).await;
        self.teardown_workspace(CallbackKind::WorkspaceLeft);
        Ok(())
    }

    /// Owner only. Local state is released once the relay confirms with
    /// `destroyed`.
    pub async fn destroy_workspace(&mut self) -> Result<()> {
        let credentials = self.credentials()?;
        if !self.session.is_owner() {
            warn!("Only the workspace owner can destroy it");
            return Ok(());
        }
        self.hang_up(false);
        self.emit(ClientMessage::Destroy(credentials)).await;
        Ok(())
    }

    /// Owner only; kicking anyone else or ourselves is ignored.
    pub async fn kick(&mut self, attendee_id: &str) -> Result<()> {
        let credentials = self.credentials()?;
        if !self.session.is_owner() || self.registry.is_local(attendee_id) {
            debug!(attendee_id, "Ignoring kick request");
            return Ok(());
        }
        self.emit(ClientMessage::Kick(KickRequest {
            auth: credentials,
            target: AttendeeRef::new(attendee_id),
        }))
        .await;
        Ok(())
    }

    pub async fn refresh_attendees(&mut self) -> Result<()> {
        let credentials = self.credentials()?;
        self.emit(ClientMessage::AttendeesQuery(credentials)).await;
        Ok(())
    }

    pub fn set_persistence(&mut self, enabled: bool) -> Result<()> {
        self.session.set_persistence(enabled)
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    pub fn local(&self) -> Option<&AttendeeInfo> {
        self.registry.local()
    }

    /// Remote attendee, or the local one when `id` is ours.
    pub fn attendee(&self, id: &str) -> Option<&AttendeeInfo> {
        if self.registry.is_local(id) {
            return self.registry.local();
        }
        self.registry.get(id).map(|e| &e.info)
    }

    pub fn host(&self) -> Option<&AttendeeInfo> {
        let owner = self.session.owner_id()?;
        self.attendee(owner)
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.session.workspace()
    }

    pub fn is_local(&self, id: &str) -> bool {
        self.registry.is_local(id)
    }

    pub fn is_owner(&self) -> bool {
        self.session.is_owner()
    }

    pub fn is_on_call(&self, call_id: Option<&str>) -> bool {
        self.session.is_on_call(call_id)
    }

    pub fn has_joined(&self) -> bool {
        self.session.has_joined()
    }

    /// Remote attendees plus the local one.
    pub fn number_of_participants(&self) -> usize {
        self.registry.len() + usize::from(self.registry.local().is_some())
    }

    // -----------------------------------------------------------------------
    // Attendee state
    // -----------------------------------------------------------------------

    pub fn set_state(&mut self, attendee_id: &str, values: Map<String, Value>) -> Result<()> {
        self.registry.set_state(attendee_id, values)
    }

    pub fn state(&self, attendee_id: &str) -> Option<&Map<String, Value>> {
        self.registry.state(attendee_id)
    }

    pub fn clear_state(&mut self, attendee_id: &str, keys: &[&str]) -> Result<()> {
        self.registry.clear_state(attendee_id, keys)
    }

    pub fn clear_all_states(&mut self, keys: &[&str]) -> Result<()> {
        self.registry.clear_all_states(keys)
    }

    pub fn filter_state<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&Map<String, Value>) -> bool,
    {
        self.registry.filter_state(predicate)
    }

    // -----------------------------------------------------------------------
    // Relay notices
    // -----------------------------------------------------------------------

    /// Adopt identity and roster from `created` / `attendance-granted`.
    pub(super) fn on_granted(&mut self, grant: WorkspaceGrant, kind: CallbackKind) {
        self.session.establish(&grant);
        self.registry
            .set_local(Some(grant.attendee.clone()), self.media.as_ref());
        self.registry
            .sync(grant.attendees.clone(), self.media.as_ref());
        info!(
            workspace_id = %grant.workspace.id,
            attendee_id = %grant.attendee.id,
            attendees = self.registry.len(),
            "Joined workspace"
        );
        self.notify(CallbackKind::Loaded, EventPayload::None);
        self.notify(kind, EventPayload::Grant(grant));
    }

    /// A restored session is back. Resume an ongoing call if the relay
    /// reports one: the owner rings everyone again, anyone else adopts the
    /// call id and waits for the owner's ring.
    pub(super) async fn on_regranted(&mut self, grant: WorkspaceGrant) {
        let ongoing = grant.call.clone();
        self.on_granted(grant, CallbackKind::WorkspaceJoined);
        if self.local_sink.is_none() {
            if let Some(local) = self.registry.local() {
                self.local_sink = self.callbacks.render_video_sink(local, true);
            }
        }

        let Some(call_id) = ongoing else {
            return;
        };
        info!(call_id = %call_id, "Ongoing call found, resuming");
        if !self.session.is_on_call(Some(&call_id)) {
            self.session.set_call(call_id);
        }
        if self.session.is_owner() {
            if let Err(e) = self.start_call().await {
                warn!(error = %e, "Failed to resume call");
            }
        } else if self.call.phase() == CallPhase::Idle {
            self.call.set_phase(CallPhase::RingingInbound);
        }
    }

    pub(super) async fn on_attendee_joined(&mut self, info: AttendeeInfo) {
        if !self.registry.add(info.clone()) {
            return;
        }
        self.notify(CallbackKind::AttendeeJoined, EventPayload::Attendee(info.clone()));

        // Bring the newcomer into the call we are on.
        if self.session.is_on_call(None) && self.local_stream.is_some() {
            if let Err(e) = self.ring_attendee(&info.id).await {
                warn!(attendee_id = %info.id, error = %e, "Failed to ring new attendee");
            }
        }
    }

    pub(super) fn on_attendee_left(&mut self, attendee_id: &str) {
        let Some(info) = self.registry.remove(attendee_id, self.media.as_ref()) else {
            return;
        };
        self.call.forget(attendee_id);
        self.notify(CallbackKind::AttendeeLeft, EventPayload::Attendee(info));
    }

    /// Drop the workspace: end any call, forget the roster and identity,
    /// regenerate the salt, then report `kind`.
    pub(super) fn teardown_workspace(&mut self, kind: CallbackKind) {
        self.hang_up(false);
        self.registry.clear(self.media.as_ref());
        self.session.reset();
        if let Some(sink) = self.local_sink.take() {
            sink.detach();
        }
        info!(event = %kind, "Workspace released");
        self.notify(kind, EventPayload::None);
    }
}
