//! A single remote attendee and the connection resources it owns.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::media::{DataChannel, MediaCapability, MediaStream, PeerConnection, VideoSink};
use crate::protocol::{AttendeeInfo, IceCandidate};

/// Remote attendee entry.
///
/// The negotiation handle, data channel, remote stream, sink, and both
/// buffers belong to this entry alone and are released together.
pub struct AttendeeEntry {
    pub info: AttendeeInfo,
    pub state: Map<String, Value>,
    pub on_call: bool,
    pub(crate) peer: Option<Box<dyn PeerConnection>>,
    /// Set once a remote description has been committed on `peer`.
    pub(crate) remote_committed: bool,
    pub(crate) data_channel: Option<Arc<dyn DataChannel>>,
    pub(crate) remote_stream: Option<MediaStream>,
    pub(crate) video_sink: Option<Box<dyn VideoSink>>,
    ice_buffer: VecDeque<IceCandidate>,
    message_buffer: VecDeque<String>,
}

impl AttendeeEntry {
    pub fn new(info: AttendeeInfo) -> Self {
        Self {
            info,
            state: Map::new(),
            on_call: false,
            peer: None,
            remote_committed: false,
            data_channel: None,
            remote_stream: None,
            video_sink: None,
            ice_buffer: VecDeque::new(),
            message_buffer: VecDeque::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    /// The handle exists and can accept ICE candidates.
    pub fn peer_ready(&self) -> bool {
        self.peer.is_some() && self.remote_committed
    }

    pub fn data_channel_open(&self) -> bool {
        self.data_channel.as_ref().is_some_and(|dc| dc.is_open())
    }

    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote_stream.as_ref()
    }

    // -- ICE buffer ---------------------------------------------------------

    pub(crate) fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.ice_buffer.push_back(candidate);
    }

    /// Drain buffered candidates in arrival order.
    pub(crate) fn take_candidates(&mut self) -> Vec<IceCandidate> {
        self.ice_buffer.drain(..).collect()
    }

    pub fn buffered_candidates(&self) -> usize {
        self.ice_buffer.len()
    }

    // -- Message buffer -----------------------------------------------------

    pub(crate) fn queue_message(&mut self, text: String) {
        self.message_buffer.push_back(text);
    }

    /// Drain queued messages in send order.
    pub(crate) fn take_messages(&mut self) -> Vec<String> {
        self.message_buffer.drain(..).collect()
    }

    /// Put messages back at the head of the queue, keeping their order.
    pub(crate) fn requeue_messages(&mut self, texts: impl IntoIterator<Item = String>) {
        let texts: Vec<String> = texts.into_iter().collect();
        for text in texts.into_iter().rev() {
            self.message_buffer.push_front(text);
        }
    }

    pub fn buffered_messages(&self) -> usize {
        self.message_buffer.len()
    }

    /// Tear down every connection resource and mark the attendee off-call.
    ///
    /// The roster entry itself (identity and state) survives.
    pub(crate) fn release_connection(&mut self, media: &dyn MediaCapability) {
        if let Some(dc) = self.data_channel.take() {
            dc.close();
        }
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        if let Some(stream) = self.remote_stream.take() {
            media.stop_stream(&stream);
        }
        if let Some(sink) = self.video_sink.take() {
            sink.detach();
        }
        self.remote_committed = false;
        self.ice_buffer.clear();
        self.message_buffer.clear();
        self.on_call = false;
        debug!(attendee_id = %self.info.id, "Released peer connection");
    }
}
