//! Local identity, the current call, and the correlation salt.

mod storage;

pub use storage::{FileStore, KeyValueStore, MemoryStore};

use serde_json::Value;
use tracing::{debug, warn};
use workspaces_common::{new_salt, Result};

use crate::media::CameraFacing;
use crate::protocol::{
    AttendeeInfo, AttendeeRef, Credentials, Workspace, WorkspaceGrant, WorkspaceRef,
};

pub const KEY_ATTENDEE: &str = "attendee";
pub const KEY_WORKSPACE: &str = "workspace";
pub const KEY_ACCESS_TOKEN: &str = "access-token";

/// Workspace and local attendee, always set and cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub workspace: Workspace,
    pub attendee: AttendeeInfo,
    pub access_token: String,
}

impl Identity {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            workspace: WorkspaceRef {
                id: self.workspace.id.clone(),
            },
            attendee: AttendeeRef::new(self.attendee.id.clone()),
            access_token: self.access_token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: String,
    pub facing: CameraFacing,
}

pub struct SessionState {
    identity: Option<Identity>,
    call: Option<Call>,
    salt: String,
    persist: bool,
    store: Box<dyn KeyValueStore>,
}

impl SessionState {
    /// Build the session, restoring a persisted identity when enabled.
    pub fn new(store: Box<dyn KeyValueStore>, persist: bool) -> Self {
        let mut session = Self {
            identity: None,
            call: None,
            salt: new_salt(),
            persist,
            store,
        };
        if persist {
            match session.load_identity() {
                Ok(Some(identity)) => {
                    debug!(
                        workspace_id = %identity.workspace.id,
                        attendee_id = %identity.attendee.id,
                        "Restored session identity"
                    );
                    session.identity = Some(identity);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring unreadable session store"),
            }
        }
        session
    }

    fn load_identity(&self) -> Result<Option<Identity>> {
        let attendee = self.store.get(KEY_ATTENDEE)?;
        let workspace = self.store.get(KEY_WORKSPACE)?;
        let token = self.store.get(KEY_ACCESS_TOKEN)?;
        let (Some(attendee), Some(workspace), Some(Value::String(access_token))) =
            (attendee, workspace, token)
        else {
            return Ok(None);
        };
        Ok(Some(Identity {
            workspace: serde_json::from_value(workspace)?,
            attendee: serde_json::from_value(attendee)?,
            access_token,
        }))
    }

    fn store_identity(&mut self) -> Result<()> {
        let Some(identity) = &self.identity else {
            return Ok(());
        };
        let attendee = serde_json::to_value(&identity.attendee)?;
        let workspace = serde_json::to_value(&identity.workspace)?;
        let token = Value::String(identity.access_token.clone());
        self.store.set(KEY_ATTENDEE, attendee)?;
        self.store.set(KEY_WORKSPACE, workspace)?;
        self.store.set(KEY_ACCESS_TOKEN, token)
    }

    fn forget_identity(&mut self) -> Result<()> {
        self.store.remove(KEY_ATTENDEE)?;
        self.store.remove(KEY_WORKSPACE)?;
        self.store.remove(KEY_ACCESS_TOKEN)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Adopt the workspace and local attendee from a relay grant.
    pub fn establish(&mut self, grant: &WorkspaceGrant) {
        self.identity = Some(Identity {
            workspace: grant.workspace.clone(),
            attendee: grant.attendee.clone(),
            access_token: grant.access_token.clone(),
        });
        if self.persist {
            if let Err(e) = self.store_identity() {
                warn!(error = %e, "Failed to persist session identity");
            }
        }
    }

    /// Drop the identity and any call, and delete the persisted keys.
    pub fn clear_identity(&mut self) {
        self.identity = None;
        self.call = None;
        if let Err(e) = self.forget_identity() {
            warn!(error = %e, "Failed to clear persisted identity");
        }
    }

    /// Full reset after leaving a workspace: identity gone, fresh salt.
    pub fn reset(&mut self) {
        self.clear_identity();
        self.reset_salt();
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.identity.as_ref().map(|i| &i.workspace)
    }

    pub fn attendee(&self) -> Option<&AttendeeInfo> {
        self.identity.as_ref().map(|i| &i.attendee)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.identity.as_ref().map(Identity::credentials)
    }

    pub fn has_joined(&self) -> bool {
        self.identity.is_some()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.workspace().map(|w| w.owner.as_str())
    }

    pub fn is_owner(&self) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|i| i.workspace.owner == i.attendee.id)
    }

    // -----------------------------------------------------------------------
    // Call
    // -----------------------------------------------------------------------

    pub fn call(&self) -> Option<&Call> {
        self.call.as_ref()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.id.as_str())
    }

    /// Any call when `call_id` is `None`, otherwise that exact call.
    pub fn is_on_call(&self, call_id: Option<&str>) -> bool {
        match (self.call_id(), call_id) {
            (Some(_), None) => true,
            (Some(current), Some(wanted)) => current == wanted,
            (None, _) => false,
        }
    }

    /// Adopt `id` as the current call. A call already in progress keeps
    /// its camera mode.
    pub fn set_call(&mut self, id: impl Into<String>) {
        let facing = self.camera_mode();
        self.call = Some(Call {
            id: id.into(),
            facing,
        });
    }

    pub fn take_call(&mut self) -> Option<Call> {
        self.call.take()
    }

    pub fn camera_mode(&self) -> CameraFacing {
        self.call.as_ref().map(|c| c.facing).unwrap_or_default()
    }

    pub fn set_camera_mode(&mut self, facing: CameraFacing) {
        if let Some(call) = self.call.as_mut() {
            call.facing = facing;
        }
    }

    // -----------------------------------------------------------------------
    // Correlation
    // -----------------------------------------------------------------------

    /// `"<action>:<prefix>:<salt>"`, echoed back by the relay and peers.
    pub fn nonce(&self, action: &str, prefix: &str) -> String {
        format!("{action}:{prefix}:{}", self.salt)
    }

    /// Whether `nonce` was produced by this session since the last reset.
    pub fn verify_nonce(&self, nonce: &str) -> bool {
        nonce.rsplit(':').next() == Some(self.salt.as_str())
    }

    pub fn reset_salt(&mut self) {
        self.salt = new_salt();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn persistence(&self) -> bool {
        self.persist
    }

    /// Enabling writes the current identity immediately; disabling wipes
    /// the store.
    pub fn set_persistence(&mut self, enabled: bool) -> Result<()> {
        self.persist = enabled;
        if enabled {
            self.store_identity()
        } else {
            self.store.clear()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::testing::attendee;

    /// Store backed by a shared map so tests can inspect it after handing
    /// ownership to the session.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<MemoryStore>>);

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> Result<Option<Value>> {
            self.0.lock().unwrap().get(key)
        }
        fn set(&mut self, key: &str, value: Value) -> Result<()> {
            self.0.lock().unwrap().set(key, value)
        }
        fn remove(&mut self, key: &str) -> Result<()> {
            self.0.lock().unwrap().remove(key)
        }
        fn clear(&mut self) -> Result<()> {
            self.0.lock().unwrap().clear()
        }
    }

    fn grant(attendee_id: &str, owner: &str) -> WorkspaceGrant {
        WorkspaceGrant {
            workspace: Workspace {
                id: "w1".into(),
                name: "Standup".into(),
                token: "tok-w1".into(),
                pin: None,
                owner: owner.into(),
            },
            attendee: attendee(attendee_id),
            access_token: "secret".into(),
            attendees: vec![],
            call: None,
        }
    }

    #[test]
    fn establish_and_clear_together() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        assert!(!session.has_joined());

        session.establish(&grant("a1", "a0"));
        assert!(session.has_joined());
        assert_eq!(session.workspace().unwrap().id, "w1");
        assert_eq!(session.attendee().unwrap().id, "a1");
        assert!(!session.is_owner());

        session.set_call("c1");
        session.clear_identity();
        assert!(session.workspace().is_none());
        assert!(session.attendee().is_none());
        assert!(!session.is_on_call(None));
    }

    #[test]
    fn owner_detection() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        session.establish(&grant("a0", "a0"));
        assert!(session.is_owner());
        assert_eq!(session.owner_id(), Some("a0"));
    }

    #[test]
    fn credentials_carry_token() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        assert!(session.credentials().is_none());
        session.establish(&grant("a1", "a0"));
        let creds = session.credentials().unwrap();
        assert_eq!(creds.workspace.id, "w1");
        assert_eq!(creds.attendee.id, "a1");
        assert_eq!(creds.access_token, "secret");
    }

    #[test]
    fn is_on_call_matches_id() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        assert!(!session.is_on_call(None));
        session.set_call("c1");
        assert!(session.is_on_call(None));
        assert!(session.is_on_call(Some("c1")));
        assert!(!session.is_on_call(Some("c2")));
        assert_eq!(session.take_call().unwrap().id, "c1");
        assert!(!session.is_on_call(None));
    }

    #[test]
    fn camera_mode_follows_call() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        assert_eq!(session.camera_mode(), CameraFacing::User);
        session.set_call("c1");
        session.set_camera_mode(CameraFacing::Environment);
        assert_eq!(session.camera_mode(), CameraFacing::Environment);
        session.set_call("c1");
        assert_eq!(session.camera_mode(), CameraFacing::Environment);
    }

    #[test]
    fn nonce_verifies_until_salt_reset() {
        let mut session = SessionState::new(Box::new(MemoryStore::new()), false);
        let nonce = session.nonce("start-call", "c1");
        assert!(nonce.starts_with("start-call:c1:"));
        assert!(session.verify_nonce(&nonce));
        assert!(!session.verify_nonce("start-call:c1:someone-else"));

        session.reset_salt();
        assert!(!session.verify_nonce(&nonce));
    }

    #[test]
    fn persisted_identity_is_restored() {
        let store = SharedStore::default();
        let mut session = SessionState::new(Box::new(store.clone()), true);
        session.establish(&grant("a1", "a0"));
        assert_eq!(
            store.get(KEY_ACCESS_TOKEN).unwrap(),
            Some(json!("secret"))
        );

        let restored = SessionState::new(Box::new(store.clone()), true);
        assert_eq!(restored.identity(), session.identity());

        let ignored = SessionState::new(Box::new(store), false);
        assert!(ignored.identity().is_none());
    }

    #[test]
    fn clear_identity_deletes_stored_keys() {
        let store = SharedStore::default();
        let mut session = SessionState::new(Box::new(store.clone()), true);
        session.establish(&grant("a1", "a0"));
        session.reset();
        assert!(store.get(KEY_ATTENDEE).unwrap().is_none());
        assert!(store.get(KEY_WORKSPACE).unwrap().is_none());
        assert!(store.get(KEY_ACCESS_TOKEN).unwrap().is_none());
    }

    #[test]
    fn toggling_persistence() {
        let store = SharedStore::default();
        let mut session = SessionState::new(Box::new(store.clone()), false);
        session.establish(&grant("a1", "a0"));
        assert!(store.get(KEY_ATTENDEE).unwrap().is_none());

        session.set_persistence(true).unwrap();
        assert_eq!(store.get(KEY_ATTENDEE).unwrap().unwrap()["id"], "a1");

        session.set_persistence(false).unwrap();
        assert!(store.get(KEY_ATTENDEE).unwrap().is_none());
        assert!(!session.persistence());
    }

    #[test]
    fn partial_store_restores_nothing() {
        let mut store = SharedStore::default();
        store.set(KEY_ACCESS_TOKEN, json!("secret")).unwrap();
        let session = SessionState::new(Box::new(store), true);
        assert!(session.identity().is_none());
    }
}
