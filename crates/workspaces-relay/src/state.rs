//! Room store: workspaces by id, their members, and the join-token index.
//!
//! Methods hand back cloned outboxes instead of sending under the lock, so
//! a slow client can never stall another connection's handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use workspaces_common::new_id;
use workspaces_core::protocol::{
    AttendeeInfo, Credentials, NewAttendee, NewWorkspace, Workspace, WorkspaceGrant,
    WorkspaceLookup,
};

/// Sending half of a connection's frame queue.
pub type Outbox = mpsc::Sender<String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("workspace not found")]
    WorkspaceNotFound,

    #[error("invalid pin")]
    InvalidPin,

    #[error("workspace is full")]
    Full,

    #[error("invalid credentials")]
    Unauthorized,

    #[error("only the workspace owner can do that")]
    NotOwner,

    #[error("workspace owner cannot leave, only destroy is allowed")]
    OwnerCannotLeave,

    #[error("unknown attendee: {0}")]
    UnknownAttendee(String),
}

struct Member {
    info: AttendeeInfo,
    access_token: String,
    /// `None` while the attendee is disconnected; the seat is kept for
    /// re-attend.
    outbox: Option<Outbox>,
}

struct Room {
    workspace: Workspace,
    members: Vec<Member>,
    call: Option<String>,
    last_active: Instant,
}

impl Room {
    fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.info.id == id)
    }

    fn is_owner(&self, id: &str) -> bool {
        self.workspace.owner == id
    }

    fn grant(&self, attendee_id: &str) -> Option<WorkspaceGrant> {
        let member = self.member(attendee_id)?;
        let mut workspace = self.workspace.clone();
        if !self.is_owner(attendee_id) {
            workspace.pin = None;
        }
        Some(WorkspaceGrant {
            workspace,
            attendee: member.info.clone(),
            access_token: member.access_token.clone(),
            attendees: self.others(attendee_id),
            call: self.call.clone(),
        })
    }

    fn others(&self, attendee_id: &str) -> Vec<AttendeeInfo> {
        self.members
            .iter()
            .filter(|m| m.info.id != attendee_id)
            .map(|m| m.info.clone())
            .collect()
    }

    /// Connected members other than `attendee_id`.
    fn outboxes_except(&self, attendee_id: &str) -> Vec<Outbox> {
        self.members
            .iter()
            .filter(|m| m.info.id != attendee_id)
            .filter_map(|m| m.outbox.clone())
            .collect()
    }

    fn outboxes(&self) -> Vec<Outbox> {
        self.members.iter().filter_map(|m| m.outbox.clone()).collect()
    }

    fn is_idle(&self) -> bool {
        self.members.iter().all(|m| m.outbox.is_none())
    }
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Room>,
    /// Join token -> workspace id.
    tokens: HashMap<String, String>,
}

impl Inner {
    /// Resolve the room the credentials belong to and check the token.
    fn authorize(&mut self, auth: &Credentials) -> Result<&mut Room, RelayError> {
        let room = self
            .rooms
            .get_mut(&auth.workspace.id)
            .ok_or(RelayError::WorkspaceNotFound)?;
        let valid = room
            .member(&auth.attendee.id)
            .is_some_and(|m| m.access_token == auth.access_token);
        if !valid {
            return Err(RelayError::Unauthorized);
        }
        room.last_active = Instant::now();
        Ok(room)
    }
}

/// Thread-safe room store.
#[derive(Clone, Default)]
pub struct RelayState {
    inner: Arc<RwLock<Inner>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new workspace owned by `attendee`.
    pub async fn create(
        &self,
        workspace: NewWorkspace,
        attendee: NewAttendee,
        outbox: Outbox,
    ) -> WorkspaceGrant {
        let owner = AttendeeInfo {
            id: new_id(),
            name: attendee.name,
            avatar: attendee.avatar,
        };
        let room = Room {
            workspace: Workspace {
                id: new_id(),
                name: workspace.name,
                token: new_id(),
                pin: workspace.pin.filter(|p| !p.is_empty()),
                owner: owner.id.clone(),
            },
            members: vec![Member {
                info: owner.clone(),
                access_token: new_id(),
                outbox: Some(outbox),
            }],
            call: None,
            last_active: Instant::now(),
        };
        let grant = WorkspaceGrant {
            workspace: room.workspace.clone(),
            attendee: owner,
            access_token: room.members[0].access_token.clone(),
            attendees: Vec::new(),
            call: None,
        };

        let mut inner = self.inner.write().await;
        inner
            .tokens
            .insert(room.workspace.token.clone(), room.workspace.id.clone());
        inner.rooms.insert(room.workspace.id.clone(), room);
        grant
    }

    /// Seat a new attendee through the join token. Returns the grant and
    /// the outboxes of everyone already connected.
    pub async fn attend(
        &self,
        lookup: WorkspaceLookup,
        attendee: NewAttendee,
        outbox: Outbox,
        max_attendees: usize,
    ) -> Result<(WorkspaceGrant, Vec<Outbox>), RelayError> {
        let mut inner = self.inner.write().await;
        let workspace_id = inner
            .tokens
            .get(&lookup.token)
            .cloned()
            .ok_or(RelayError::WorkspaceNotFound)?;
        let room = inner
            .rooms
            .get_mut(&workspace_id)
            .ok_or(RelayError::WorkspaceNotFound)?;

        if let Some(pin) = &room.workspace.pin {
            if lookup.pin.as_deref() != Some(pin.as_str()) {
                return Err(RelayError::InvalidPin);
            }
        }
        if room.members.len() >= max_attendees {
            return Err(RelayError::Full);
        }

        let info = AttendeeInfo {
            id: new_id(),
            name: attendee.name,
            avatar: attendee.avatar,
        };
        let others = room.outboxes();
        room.members.push(Member {
            info: info.clone(),
            access_token: new_id(),
            outbox: Some(outbox),
        });
        room.last_active = Instant::now();
        let grant = room.grant(&info.id).ok_or(RelayError::UnknownAttendee(info.id))?;
        Ok((grant, others))
    }

    /// Re-seat a returning attendee on a new connection.
    pub async fn reattend(&self, auth: &Credentials, outbox: Outbox) -> Result<WorkspaceGrant, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if let Some(member) = room.members.iter_mut().find(|m| m.info.id == auth.attendee.id) {
            member.outbox = Some(outbox);
        }
        room.grant(&auth.attendee.id)
            .ok_or_else(|| RelayError::UnknownAttendee(auth.attendee.id.clone()))
    }

    pub async fn attendees(&self, auth: &Credentials) -> Result<Vec<AttendeeInfo>, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        Ok(room.others(&auth.attendee.id))
    }

    /// Sender's descriptor plus the outbox of `target`, if connected.
    pub async fn route(
        &self,
        auth: &Credentials,
        target: &str,
    ) -> Result<(AttendeeInfo, Option<Outbox>), RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        let sender = room
            .member(&auth.attendee.id)
            .map(|m| m.info.clone())
            .ok_or(RelayError::Unauthorized)?;
        let target = room
            .member(target)
            .ok_or_else(|| RelayError::UnknownAttendee(target.to_string()))?;
        Ok((sender, target.outbox.clone()))
    }

    /// Record `call_id` as the room's ongoing call. The owner's ring always
    /// wins; a member's ring only fills an empty slot.
    pub async fn start_call(&self, auth: &Credentials, call_id: &str) -> Result<(), RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if room.call.is_none() || room.is_owner(&auth.attendee.id) {
            room.call = Some(call_id.to_string());
        }
        Ok(())
    }

    /// A hangup from the owner closes the ongoing call. Returns the
    /// outboxes that should hear about it.
    pub async fn hangup(&self, auth: &Credentials, call_id: &str) -> Result<Vec<Outbox>, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if room.is_owner(&auth.attendee.id) && room.call.as_deref() == Some(call_id) {
            room.call = None;
        }
        Ok(room.outboxes_except(&auth.attendee.id))
    }

    pub async fn leave(&self, auth: &Credentials) -> Result<Vec<Outbox>, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if room.is_owner(&auth.attendee.id) {
            return Err(RelayError::OwnerCannotLeave);
        }
        room.members.retain(|m| m.info.id != auth.attendee.id);
        Ok(room.outboxes())
    }

    /// Remove `target`. Returns the outboxes of everyone still seated plus
    /// the kicked attendee's own.
    pub async fn kick(&self, auth: &Credentials, target: &str) -> Result<Vec<Outbox>, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if !room.is_owner(&auth.attendee.id) {
            return Err(RelayError::NotOwner);
        }
        if room.is_owner(target) {
            return Ok(Vec::new());
        }
        let position = room
            .members
            .iter()
            .position(|m| m.info.id == target)
            .ok_or_else(|| RelayError::UnknownAttendee(target.to_string()))?;
        let kicked = room.members.remove(position);
        let mut outboxes = room.outboxes();
        outboxes.extend(kicked.outbox);
        Ok(outboxes)
    }

    /// Drop the workspace. Returns every connected member, owner included.
    pub async fn destroy(&self, auth: &Credentials) -> Result<Vec<Outbox>, RelayError> {
        let mut inner = self.inner.write().await;
        let room = inner.authorize(auth)?;
        if !room.is_owner(&auth.attendee.id) {
            return Err(RelayError::NotOwner);
        }
        let outboxes = room.outboxes();
        let token = room.workspace.token.clone();
        inner.tokens.remove(&token);
        inner.rooms.remove(&auth.workspace.id);
        Ok(outboxes)
    }

    /// Mark a member disconnected, unless it already came back on a newer
    /// connection.
    pub async fn disconnect(&self, workspace_id: &str, attendee_id: &str, outbox: &Outbox) {
        let mut inner = self.inner.write().await;
        let Some(room) = inner.rooms.get_mut(workspace_id) else {
            return;
        };
        if let Some(member) = room.members.iter_mut().find(|m| m.info.id == attendee_id) {
            if member.outbox.as_ref().is_some_and(|o| o.same_channel(outbox)) {
                member.outbox = None;
            }
        }
        room.last_active = Instant::now();
    }

    /// Drop rooms nobody has been connected to for longer than `max_age`.
    pub async fn reap_stale(&self, max_age: Duration) {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let stale: Vec<(String, String)> = inner
            .rooms
            .values()
            .filter(|r| r.is_idle() && now.duration_since(r.last_active) >= max_age)
            .map(|r| (r.workspace.id.clone(), r.workspace.token.clone()))
            .collect();
        for (id, token) in stale {
            tracing::info!(workspace_id = %id, "Reaping stale workspace");
            inner.rooms.remove(&id);
            inner.tokens.remove(&token);
        }
    }

    #[cfg(test)]
    pub async fn exists(&self, workspace_id: &str) -> bool {
        self.inner.read().await.rooms.contains_key(workspace_id)
    }

    /// Number of open workspaces.
    pub async fn count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
