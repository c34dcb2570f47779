//! Per-event routing: applies a client message to the room store and
//! fans the resulting notices out to the affected connections.

use tokio::sync::mpsc::error::TrySendError;
use workspaces_core::protocol::{
    AlertNotice, AnswerNotice, AttendeeRef, AttendeesNotice, BusyNotice, ClientMessage,
    HangupNotice, IceCandidateNotice, IceServer, IceServersNotice, NegotiationNotice, RingNotice,
    ServerMessage,
};

use crate::state::{Outbox, RelayError, RelayState};

/// Identity bound to a connection once it is seated in a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub workspace_id: String,
    pub attendee_id: String,
}

pub struct Connection {
    outbox: Outbox,
    seat: Option<Seat>,
}

impl Connection {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox, seat: None }
    }

    pub fn seat(&self) -> Option<&Seat> {
        self.seat.as_ref()
    }

    fn bind(&mut self, workspace_id: &str, attendee_id: &str) {
        self.seat = Some(Seat {
            workspace_id: workspace_id.to_string(),
            attendee_id: attendee_id.to_string(),
        });
    }
}

#[derive(Clone)]
pub struct Router {
    state: RelayState,
    ice_servers: Vec<IceServer>,
    max_attendees: usize,
}

impl Router {
    pub fn new(state: RelayState, ice_servers: Vec<IceServer>, max_attendees: usize) -> Self {
        Self {
            state,
            ice_servers,
            max_attendees,
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Apply one client message. Failures are reported back to the sender
    /// as `full` or `alert`.
    pub async fn handle(&self, conn: &mut Connection, message: ClientMessage) {
        let event = message.event_name();
        if let Err(e) = self.route(conn, message).await {
            tracing::debug!(event, error = %e, "Rejected client event");
            let reply = match e {
                RelayError::Full => ServerMessage::Full,
                e => ServerMessage::Alert(AlertNotice {
                    message: e.to_string(),
                }),
            };
            deliver(&conn.outbox, &reply);
        }
    }

    /// Release the connection's seat. The attendee stays in the roster
    /// until it leaves, is kicked, or the workspace is reaped.
    pub async fn disconnect(&self, conn: &Connection) {
        if let Some(seat) = &conn.seat {
            self.state
                .disconnect(&seat.workspace_id, &seat.attendee_id, &conn.outbox)
                .await;
        }
    }

    async fn route(&self, conn: &mut Connection, message: ClientMessage) -> Result<(), RelayError> {
        match message {
            ClientMessage::IceServersQuery => {
                let notice = ServerMessage::IceServers(IceServersNotice {
                    ice_servers: self.ice_servers.clone(),
                });
                deliver(&conn.outbox, &notice);
            }
            ClientMessage::Create(req) => {
                let grant = self
                    .state
                    .create(req.workspace, req.attendee, conn.outbox.clone())
                    .await;
                tracing::info!(
                    workspace_id = %grant.workspace.id,
                    owner = %grant.attendee.id,
                    "Workspace created"
                );
                conn.bind(&grant.workspace.id, &grant.attendee.id);
                deliver(&conn.outbox, &ServerMessage::Created(grant));
            }
            ClientMessage::Attend(req) => {
                let (grant, others) = self
                    .state
                    .attend(
                        req.workspace,
                        req.attendee,
                        conn.outbox.clone(),
                        self.max_attendees,
                    )
                    .await?;
                tracing::info!(
                    workspace_id = %grant.workspace.id,
                    attendee_id = %grant.attendee.id,
                    "Attendee joined"
                );
                conn.bind(&grant.workspace.id, &grant.attendee.id);
                broadcast(&others, &ServerMessage::Attend(grant.attendee.clone()));
                deliver(&conn.outbox, &ServerMessage::AttendanceGranted(grant));
            }
            ClientMessage::ReAttend(auth) => {
                let grant = self.state.reattend(&auth, conn.outbox.clone()).await?;
                tracing::info!(
                    workspace_id = %grant.workspace.id,
                    attendee_id = %grant.attendee.id,
                    call = ?grant.call,
                    "Attendee re-attended"
                );
                conn.bind(&grant.workspace.id, &grant.attendee.id);
                deliver(&conn.outbox, &ServerMessage::ReAttendanceGranted(grant));
            }
            ClientMessage::AttendeesQuery(auth) => {
                let attendees = self.state.attendees(&auth).await?;
                deliver(
                    &conn.outbox,
                    &ServerMessage::Attendees(AttendeesNotice { attendees }),
                );
            }
            ClientMessage::Leave(auth) => {
                let remaining = self.state.leave(&auth).await?;
                tracing::info!(attendee_id = %auth.attendee.id, "Attendee left");
                conn.seat = None;
                broadcast(&remaining, &ServerMessage::Leave(auth.attendee));
            }
            ClientMessage::Kick(req) => {
                let notified = self.state.kick(&req.auth, &req.target.id).await?;
                tracing::info!(attendee_id = %req.target.id, "Attendee kicked");
                broadcast(&notified, &ServerMessage::Leave(req.target));
            }
            ClientMessage::Destroy(auth) => {
                let notified = self.state.destroy(&auth).await?;
                tracing::info!(workspace_id = %auth.workspace.id, "Workspace destroyed");
                conn.seat = None;
                broadcast(&notified, &ServerMessage::Destroyed);
            }
            ClientMessage::Ring(req) => {
                self.state.start_call(&req.auth, &req.call.id).await?;
                let (caller, outbox) = self.state.route(&req.auth, &req.callee.id).await?;
                forward(
                    outbox,
                    &req.callee.id,
                    &ServerMessage::Ring(RingNotice {
                        caller,
                        call: req.call,
                        offer: req.offer,
                        nonce: req.nonce,
                    }),
                );
            }
            ClientMessage::Answer(req) => {
                let (callee, outbox) = self.state.route(&req.auth, &req.caller.id).await?;
                forward(
                    outbox,
                    &req.caller.id,
                    &ServerMessage::Answer(AnswerNotice {
                        callee,
                        call: req.call,
                        answer: req.answer,
                        nonce: req.nonce,
                    }),
                );
            }
            ClientMessage::Busy(req) => {
                let (callee, outbox) = self.state.route(&req.auth, &req.caller.id).await?;
                forward(
                    outbox,
                    &req.caller.id,
                    &ServerMessage::Busy(BusyNotice {
                        callee,
                        call: req.call,
                        nonce: req.nonce,
                    }),
                );
            }
            ClientMessage::Hangup(req) => {
                let others = self.state.hangup(&req.auth, &req.call.id).await?;
                broadcast(
                    &others,
                    &ServerMessage::Hangup(HangupNotice {
                        attendee: req.auth.attendee,
                        call: req.call,
                    }),
                );
            }
            ClientMessage::IceCandidate(req) => {
                let (sender, outbox) = self.state.route(&req.auth, &req.target.id).await?;
                forward(
                    outbox,
                    &req.target.id,
                    &ServerMessage::IceCandidate(IceCandidateNotice {
                        broadcaster: AttendeeRef::new(sender.id),
                        candidate: req.candidate,
                    }),
                );
            }
            ClientMessage::Negotiation(req) => {
                let (sender, outbox) = self.state.route(&req.auth, &req.target.id).await?;
                forward(
                    outbox,
                    &req.target.id,
                    &ServerMessage::Negotiation(NegotiationNotice {
                        broadcaster: AttendeeRef::new(sender.id),
                        message: req.message,
                    }),
                );
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode relay message");
            None
        }
    }
}

/// Queue a frame without waiting, so a handler never blocks on another
/// connection's full outbox.
fn deliver(outbox: &Outbox, message: &ServerMessage) {
    let Some(json) = encode(message) else {
        return;
    };
    push(outbox, json);
}

fn push(outbox: &Outbox, json: String) {
    match outbox.try_send(json) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => tracing::warn!("Outbox full, frame dropped"),
        Err(TrySendError::Closed(_)) => tracing::debug!("Outbox closed, frame dropped"),
    }
}

fn broadcast(outboxes: &[Outbox], message: &ServerMessage) {
    let Some(json) = encode(message) else {
        return;
    };
    for outbox in outboxes {
        push(outbox, json.clone());
    }
}

fn forward(outbox: Option<Outbox>, target: &str, message: &ServerMessage) {
    match outbox {
        Some(outbox) => deliver(&outbox, message),
        None => tracing::debug!(target_id = %target, "Target is not connected, frame dropped"),
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use workspaces_core::protocol::{
        AnswerRequest, AttendRequest, CallRef, CreateRequest, Credentials, HangupRequest,
        KickRequest, NewAttendee, NewWorkspace, RingRequest, SessionDescription, WorkspaceGrant,
        WorkspaceLookup, WorkspaceRef,
    };

    use super::*;

    struct Peer {
        conn: Connection,
        rx: mpsc::Receiver<String>,
    }

    impl Peer {
        fn new() -> Self {
            let (tx, rx) = mpsc::channel(32);
            Self {
                conn: Connection::new(tx),
                rx,
            }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(json) = self.rx.try_recv() {
                out.push(serde_json::from_str(&json).unwrap());
            }
            out
        }

        fn grant(&mut self) -> WorkspaceGrant {
            match self.drain().pop() {
                Some(ServerMessage::Created(grant))
                | Some(ServerMessage::AttendanceGranted(grant))
                | Some(ServerMessage::ReAttendanceGranted(grant)) => grant,
                other => panic!("expected a grant, got {other:?}"),
            }
        }
    }

    fn router(max_attendees: usize) -> Router {
        let ice = IceServer {
            urls: vec!["stun:stun.example.org:3478".into()],
            username: None,
            credential: None,
        };
        Router::new(RelayState::new(), vec![ice], max_attendees)
    }

    fn attendee(name: &str) -> NewAttendee {
        NewAttendee {
            name: name.into(),
            avatar: String::new(),
        }
    }

    fn creds(grant: &WorkspaceGrant) -> Credentials {
        Credentials {
            workspace: WorkspaceRef {
                id: grant.workspace.id.clone(),
            },
            attendee: AttendeeRef::new(grant.attendee.id.clone()),
            access_token: grant.access_token.clone(),
        }
    }

    async fn create(router: &Router, peer: &mut Peer, pin: Option<&str>) -> WorkspaceGrant {
        let msg = ClientMessage::Create(CreateRequest {
            workspace: NewWorkspace {
                name: "standup".into(),
                pin: pin.map(str::to_string),
            },
            attendee: attendee("Ada"),
            nonce: "create:x:salt".into(),
        });
        router.handle(&mut peer.conn, msg).await;
        peer.grant()
    }

    fn attend_msg(owner: &WorkspaceGrant, name: &str, pin: Option<&str>) -> ClientMessage {
        ClientMessage::Attend(AttendRequest {
            workspace: WorkspaceLookup {
                token: owner.workspace.token.clone(),
                pin: pin.map(str::to_string),
            },
            attendee: attendee(name),
            nonce: "attend:x:salt".into(),
        })
    }

    async fn attend(router: &Router, peer: &mut Peer, owner: &WorkspaceGrant) -> WorkspaceGrant {
        router.handle(&mut peer.conn, attend_msg(owner, "Bob", None)).await;
        peer.grant()
    }

    #[tokio::test]
    async fn ice_servers_query_replies_with_config() {
        let router = router(8);
        let mut peer = Peer::new();
        router
            .handle(&mut peer.conn, ClientMessage::IceServersQuery)
            .await;
        match &peer.drain()[..] {
            [ServerMessage::IceServers(notice)] => assert_eq!(notice.ice_servers.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn attend_announces_newcomer() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        let member_grant = attend(&router, &mut member, &owner_grant).await;

        assert_eq!(member_grant.attendees, vec![owner_grant.attendee.clone()]);
        assert_eq!(
            owner.drain(),
            vec![ServerMessage::Attend(member_grant.attendee.clone())]
        );
        assert_eq!(
            member.conn.seat().map(|s| s.attendee_id.as_str()),
            Some(member_grant.attendee.id.as_str())
        );
    }

    #[tokio::test]
    async fn full_and_bad_pin_are_reported() {
        let router = router(1);
        let mut owner = Peer::new();
        let owner_grant = create(&router, &mut owner, Some("42")).await;

        let mut late = Peer::new();
        router
            .handle(&mut late.conn, attend_msg(&owner_grant, "Bob", Some("42")))
            .await;
        assert_eq!(late.drain(), vec![ServerMessage::Full]);

        router
            .handle(&mut late.conn, attend_msg(&owner_grant, "Bob", Some("7")))
            .await;
        match &late.drain()[..] {
            [ServerMessage::Alert(alert)] => assert_eq!(alert.message, "invalid pin"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(late.conn.seat().is_none());
    }

    #[tokio::test]
    async fn ring_and_answer_are_forwarded_with_sender_info() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        let member_grant = attend(&router, &mut member, &owner_grant).await;
        owner.drain();

        let ring = ClientMessage::Ring(RingRequest {
            auth: creds(&owner_grant),
            call: CallRef { id: "c1".into() },
            callee: AttendeeRef::new(member_grant.attendee.id.clone()),
            offer: SessionDescription::offer("v=0"),
            nonce: "start-call:c1:salt".into(),
        });
        router.handle(&mut owner.conn, ring).await;
        match &member.drain()[..] {
            [ServerMessage::Ring(notice)] => {
                assert_eq!(notice.caller, owner_grant.attendee);
                assert_eq!(notice.call.id, "c1");
            }
            other => panic!("unexpected {other:?}"),
        }

        let answer = ClientMessage::Answer(AnswerRequest {
            auth: creds(&member_grant),
            call: CallRef { id: "c1".into() },
            caller: AttendeeRef::new(owner_grant.attendee.id.clone()),
            answer: SessionDescription::answer("v=0"),
            nonce: "start-call:c1:salt".into(),
        });
        router.handle(&mut member.conn, answer).await;
        match &owner.drain()[..] {
            [ServerMessage::Answer(notice)] => {
                assert_eq!(notice.callee, member_grant.attendee);
                assert_eq!(notice.nonce, "start-call:c1:salt");
            }
            other => panic!("unexpected {other:?}"),
        }

        // The ongoing call is handed to a reconnecting attendee.
        let mut again = Peer::new();
        router
            .handle(&mut again.conn, ClientMessage::ReAttend(creds(&member_grant)))
            .await;
        assert_eq!(again.grant().call.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn hangup_reaches_everyone_else() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        attend(&router, &mut member, &owner_grant).await;
        owner.drain();

        let hangup = ClientMessage::Hangup(HangupRequest {
            auth: creds(&owner_grant),
            call: CallRef { id: "c1".into() },
        });
        router.handle(&mut owner.conn, hangup).await;
        assert!(owner.drain().is_empty());
        match &member.drain()[..] {
            [ServerMessage::Hangup(notice)] => {
                assert_eq!(notice.attendee.id, owner_grant.attendee.id)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn kick_notifies_target_and_destroy_notifies_all() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        let member_grant = attend(&router, &mut member, &owner_grant).await;
        owner.drain();

        let kick = ClientMessage::Kick(KickRequest {
            auth: creds(&owner_grant),
            target: AttendeeRef::new(member_grant.attendee.id.clone()),
        });
        router.handle(&mut owner.conn, kick).await;
        let left = ServerMessage::Leave(AttendeeRef::new(member_grant.attendee.id.clone()));
        assert_eq!(owner.drain(), vec![left.clone()]);
        assert_eq!(member.drain(), vec![left]);

        router
            .handle(&mut owner.conn, ClientMessage::Destroy(creds(&owner_grant)))
            .await;
        assert_eq!(owner.drain(), vec![ServerMessage::Destroyed]);
        assert!(owner.conn.seat().is_none());
        assert_eq!(router.state().count().await, 0);
    }

    #[tokio::test]
    async fn member_destroy_is_rejected() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        let member_grant = attend(&router, &mut member, &owner_grant).await;

        router
            .handle(&mut member.conn, ClientMessage::Destroy(creds(&member_grant)))
            .await;
        match &member.drain()[..] {
            [ServerMessage::Alert(alert)] => {
                assert_eq!(alert.message, "only the workspace owner can do that")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(router.state().count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_keeps_roster() {
        let router = router(8);
        let mut owner = Peer::new();
        let mut member = Peer::new();
        let owner_grant = create(&router, &mut owner, None).await;
        let member_grant = attend(&router, &mut member, &owner_grant).await;

        router.disconnect(&member.conn).await;
        router
            .handle(
                &mut owner.conn,
                ClientMessage::AttendeesQuery(creds(&owner_grant)),
            )
            .await;
        match owner.drain().pop() {
            Some(ServerMessage::Attendees(notice)) => {
                assert_eq!(notice.attendees, vec![member_grant.attendee])
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
