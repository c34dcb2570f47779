//! Commands sent into a running client, and the cloneable handle that
//! sends them.

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use workspaces_common::{Result, WorkspaceError};

use super::WorkspaceClient;
use crate::protocol::{NewAttendee, NewWorkspace, WorkspaceLookup};

type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub enum ClientCommand {
    CreateWorkspace {
        workspace: NewWorkspace,
        attendee: NewAttendee,
    },
    JoinWorkspace {
        workspace: WorkspaceLookup,
        attendee: NewAttendee,
    },
    LeaveWorkspace {
        reply: Reply<()>,
    },
    DestroyWorkspace {
        reply: Reply<()>,
    },
    Kick {
        attendee_id: String,
        reply: Reply<()>,
    },
    RefreshAttendees {
        reply: Reply<()>,
    },
    StartCall {
        reply: Reply<()>,
    },
    EndCall {
        reply: Reply<bool>,
    },
    SendMessage {
        kind: String,
        data: Value,
        target: Option<String>,
        reply: Reply<()>,
    },
    SetState {
        attendee_id: String,
        values: Map<String, Value>,
        reply: Reply<()>,
    },
    ClearState {
        attendee_id: String,
        keys: Vec<String>,
        reply: Reply<()>,
    },
    SetMicState {
        attendee_id: Option<String>,
        enabled: bool,
    },
    SetCamState {
        attendee_id: Option<String>,
        enabled: bool,
    },
    SwitchCamera {
        reply: Reply<bool>,
    },
    SetPersistence {
        enabled: bool,
        reply: Reply<()>,
    },
    Shutdown,
}

/// Cloneable front end of a spawned [`WorkspaceClient`].
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub(crate) fn new(tx: mpsc::Sender<ClientCommand>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: ClientCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| WorkspaceError::ClientStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> ClientCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| WorkspaceError::ClientStopped)?
    }

    pub async fn create_workspace(&self, workspace: NewWorkspace, attendee: NewAttendee) -> Result<()> {
        self.send(ClientCommand::CreateWorkspace {
            workspace,
            attendee,
        })
        .await
    }

    pub async fn join_workspace(&self, workspace: WorkspaceLookup, attendee: NewAttendee) -> Result<()> {
        self.send(ClientCommand::JoinWorkspace {
            workspace,
            attendee,
        })
        .await
    }

    pub async fn leave_workspace(&self) -> Result<()> {
        self.request(|reply| ClientCommand::LeaveWorkspace { reply })
            .await
    }

    pub async fn destroy_workspace(&self) -> Result<()> {
        self.request(|reply| ClientCommand::DestroyWorkspace { reply })
            .await
    }

    pub async fn kick(&self, attendee_id: impl Into<String>) -> Result<()> {
        let attendee_id = attendee_id.into();
        self.request(|reply| ClientCommand::Kick { attendee_id, reply })
            .await
    }

    pub async fn refresh_attendees(&self) -> Result<()> {
        self.request(|reply| ClientCommand::RefreshAttendees { reply })
            .await
    }

    pub async fn start_call(&self) -> Result<()> {
        self.request(|reply| ClientCommand::StartCall { reply }).await
    }

    pub async fn end_call(&self) -> Result<bool> {
        self.request(|reply| ClientCommand::EndCall { reply }).await
    }

    pub async fn send_message(
        &self,
        kind: impl Into<String>,
        data: Value,
        target: Option<String>,
    ) -> Result<()> {
        let kind = kind.into();
        self.request(|reply| ClientCommand::SendMessage {
            kind,
            data,
            target,
            reply,
        })
        .await
    }

    pub async fn set_state(&self, attendee_id: impl Into<String>, values: Map<String, Value>) -> Result<()> {
        let attendee_id = attendee_id.into();
        self.request(|reply| ClientCommand::SetState {
            attendee_id,
            values,
            reply,
        })
        .await
    }

    pub async fn clear_state(&self, attendee_id: impl Into<String>, keys: Vec<String>) -> Result<()> {
        let attendee_id = attendee_id.into();
        self.request(|reply| ClientCommand::ClearState {
            attendee_id,
            keys,
            reply,
        })
        .await
    }

    pub async fn set_mic_state(&self, attendee_id: Option<String>, enabled: bool) -> Result<()> {
        self.send(ClientCommand::SetMicState {
            attendee_id,
            enabled,
        })
        .await
    }

    pub async fn set_cam_state(&self, attendee_id: Option<String>, enabled: bool) -> Result<()> {
        self.send(ClientCommand::SetCamState {
            attendee_id,
            enabled,
        })
        .await
    }

    pub async fn switch_camera(&self) -> Result<bool> {
        self.request(|reply| ClientCommand::SwitchCamera { reply })
            .await
    }

    pub async fn set_persistence(&self, enabled: bool) -> Result<()> {
        self.request(|reply| ClientCommand::SetPersistence { enabled, reply })
            .await
    }

    /// Stop the client task. Connections are released, the stored
    /// identity is kept.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ClientCommand::Shutdown).await
    }
}

impl WorkspaceClient {
    pub(super) async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::CreateWorkspace {
                workspace,
                attendee,
            } => self.create_workspace(workspace, attendee).await,
            ClientCommand::JoinWorkspace {
                workspace,
                attendee,
            } => self.join_workspace(workspace, attendee).await,
            ClientCommand::LeaveWorkspace { reply } => {
                let _ = reply.send(self.leave_workspace().await);
            }
            ClientCommand::DestroyWorkspace { reply } => {
                let _ = reply.send(self.destroy_workspace().await);
            }
            ClientCommand::Kick { attendee_id, reply } => {
                let _ = reply.send(self.kick(&attendee_id).await);
            }
            ClientCommand::RefreshAttendees { reply } => {
                let _ = reply.send(self.refresh_attendees().await);
            }
            ClientCommand::StartCall { reply } => {
                let _ = reply.send(self.start_call().await);
            }
            ClientCommand::EndCall { reply } => {
                let _ = reply.send(self.end_call().await);
            }
            ClientCommand::SendMessage {
                kind,
                data,
                target,
                reply,
            } => {
                let _ = reply.send(self.send_message(&kind, data, target.as_deref()));
            }
            ClientCommand::SetState {
                attendee_id,
                values,
                reply,
            } => {
                let _ = reply.send(self.set_state(&attendee_id, values));
            }
            ClientCommand::ClearState {
                attendee_id,
                keys,
                reply,
            } => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                let _ = reply.send(self.clear_state(&attendee_id, &keys));
            }
            ClientCommand::SetMicState {
                attendee_id,
                enabled,
            } => self.set_mic_state(attendee_id.as_deref(), enabled),
            ClientCommand::SetCamState {
                attendee_id,
                enabled,
            } => self.set_cam_state(attendee_id.as_deref(), enabled),
            ClientCommand::SwitchCamera { reply } => {
                let _ = reply.send(self.switch_camera().await);
            }
            ClientCommand::SetPersistence { enabled, reply } => {
                let _ = reply.send(self.set_persistence(enabled));
            }
            ClientCommand::Shutdown => debug!("Shutdown handled by the run loop"),
        }
    }
}
