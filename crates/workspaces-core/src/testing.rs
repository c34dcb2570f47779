//! In-memory fakes of the media capability, video sinks and signaling
//! channel, used by unit tests across the crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use workspaces_common::{Result, WorkspaceError};

use crate::media::{
    CameraFacing, DataChannel, MediaCapability, MediaStream, MediaTrack, PeerConnection,
    PeerEventSink, TrackKind, VideoSink,
};
use crate::protocol::{AttendeeInfo, ClientMessage, IceCandidate, IceServer, SessionDescription};
use crate::signaling::SignalingChannel;

pub(crate) fn attendee(id: &str) -> AttendeeInfo {
    AttendeeInfo {
        id: id.into(),
        name: format!("name-{id}"),
        avatar: String::new(),
    }
}

pub(crate) fn stun() -> Vec<IceServer> {
    vec![IceServer {
        urls: vec!["stun:stun.example.com:3478".into()],
        username: None,
        credential: None,
    }]
}

pub(crate) fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n}"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

// ---------------------------------------------------------------------------
// Data channel
// ---------------------------------------------------------------------------

pub(crate) struct FakeChannel {
    label: String,
    open: AtomicBool,
    closed: AtomicBool,
    failing: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub(crate) fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// While set, every send fails and nothing is recorded.
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DataChannel for FakeChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn send(&self, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WorkspaceError::Media("send failed".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Peer connection
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct PeerLog {
    pub(crate) ops: Vec<String>,
    pub(crate) candidates: Vec<IceCandidate>,
    pub(crate) tracks: Vec<String>,
    pub(crate) channels: Vec<Arc<FakeChannel>>,
    pub(crate) replaced: Vec<String>,
    pub(crate) closed: bool,
    offers: u32,
}

pub(crate) struct FakePeer {
    log: Arc<Mutex<PeerLog>>,
}

impl FakePeer {
    pub(crate) fn for_log(log: Arc<Mutex<PeerLog>>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let mut log = self.log.lock().unwrap();
        log.offers += 1;
        log.ops.push("create_offer".into());
        Ok(SessionDescription::offer(format!("offer-{}", log.offers)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        self.log.lock().unwrap().ops.push("create_answer".into());
        Ok(SessionDescription::answer("answer"))
    }

    async fn set_local_description(&mut self, description: SessionDescription) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .ops
            .push(format!("set_local:{}", description.sdp));
        Ok(())
    }

    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .ops
            .push(format!("set_remote:{}", description.sdp));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.ops.push("add_ice_candidate".into());
        log.candidates.push(candidate);
        Ok(())
    }

    fn add_track(&mut self, track: &MediaTrack, _stream: &MediaStream) -> Result<()> {
        self.log.lock().unwrap().tracks.push(track.id.clone());
        Ok(())
    }

    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let channel = FakeChannel::new(label);
        let mut log = self.log.lock().unwrap();
        log.ops.push(format!("create_data_channel:{label}"));
        log.channels.push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn replace_track(&mut self, _kind: TrackKind, track: &MediaTrack) -> Result<()> {
        self.log.lock().unwrap().replaced.push(track.id.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Media capability
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MediaLog {
    pub(crate) acquired: Vec<CameraFacing>,
    pub(crate) stopped: Vec<String>,
    pub(crate) toggled: Vec<(String, bool)>,
    pub(crate) peers: Vec<(String, Arc<Mutex<PeerLog>>)>,
    pub(crate) sinks: HashMap<String, PeerEventSink>,
    pub(crate) fail_peers: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeMedia {
    pub(crate) log: Arc<Mutex<MediaLog>>,
}

impl FakeMedia {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Most recent peer created for `attendee_id`.
    pub(crate) fn peer(&self, attendee_id: &str) -> Arc<Mutex<PeerLog>> {
        let log = self.log.lock().unwrap();
        log.peers
            .iter()
            .rev()
            .find(|(id, _)| id == attendee_id)
            .map(|(_, p)| Arc::clone(p))
            .unwrap_or_else(|| panic!("no peer created for {attendee_id}"))
    }

    pub(crate) fn peer_count(&self, attendee_id: &str) -> usize {
        let log = self.log.lock().unwrap();
        log.peers.iter().filter(|(id, _)| id == attendee_id).count()
    }

    pub(crate) fn sink(&self, attendee_id: &str) -> PeerEventSink {
        self.log.lock().unwrap().sinks[attendee_id].clone()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.log.lock().unwrap().acquired.len()
    }

    pub(crate) fn stopped(&self) -> Vec<String> {
        self.log.lock().unwrap().stopped.clone()
    }
}

#[async_trait]
impl MediaCapability for FakeMedia {
    async fn acquire_local_media(&self, facing: CameraFacing) -> Result<MediaStream> {
        let mut log = self.log.lock().unwrap();
        log.acquired.push(facing);
        let n = log.acquired.len();
        Ok(MediaStream {
            id: format!("local-{n}"),
            tracks: vec![
                MediaTrack {
                    id: format!("mic-{n}"),
                    kind: TrackKind::Audio,
                },
                MediaTrack {
                    id: format!("cam-{n}"),
                    kind: TrackKind::Video,
                },
            ],
        })
    }

    fn stop_stream(&self, stream: &MediaStream) {
        self.log.lock().unwrap().stopped.push(stream.id.clone());
    }

    fn set_track_enabled(&self, track: &MediaTrack, enabled: bool) {
        self.log
            .lock()
            .unwrap()
            .toggled
            .push((track.id.clone(), enabled));
    }

    async fn create_peer(
        &self,
        _ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>> {
        let mut log = self.log.lock().unwrap();
        if log.fail_peers {
            return Err(WorkspaceError::Media("no peer for you".into()));
        }
        let peer_log = Arc::new(Mutex::new(PeerLog::default()));
        let attendee_id = events.attendee_id().to_string();
        log.peers.push((attendee_id.clone(), Arc::clone(&peer_log)));
        log.sinks.insert(attendee_id, events);
        Ok(Box::new(FakePeer { log: peer_log }))
    }
}

// ---------------------------------------------------------------------------
// Video sinks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct SinkLog {
    pub(crate) rendered: Vec<(String, bool)>,
    pub(crate) attached: Vec<(String, String)>,
    pub(crate) detached: Vec<String>,
}

pub(crate) struct FakeSink {
    attendee_id: String,
    log: Arc<Mutex<SinkLog>>,
}

impl FakeSink {
    pub(crate) fn new(attendee_id: &str, log: Arc<Mutex<SinkLog>>) -> Self {
        Self {
            attendee_id: attendee_id.into(),
            log,
        }
    }
}

impl VideoSink for FakeSink {
    fn attach(&self, stream: &MediaStream) {
        self.log
            .lock()
            .unwrap()
            .attached
            .push((self.attendee_id.clone(), stream.id.clone()));
    }

    fn detach(&self) {
        self.log
            .lock()
            .unwrap()
            .detached
            .push(self.attendee_id.clone());
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSignaling {
    sent: Mutex<Vec<ClientMessage>>,
}

impl FakeSignaling {
    pub(crate) fn take(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl SignalingChannel for FakeSignaling {
    async fn emit(&self, message: ClientMessage) {
        self.sent.lock().unwrap().push(message);
    }
}
