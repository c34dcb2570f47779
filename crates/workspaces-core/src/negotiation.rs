//! Per-attendee SDP offer/answer and ICE flows over the injected capability.
//!
//! Every flow is two-phase: a generated description is committed on the
//! handle before it is handed back for transmission.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use workspaces_common::{Result, WorkspaceError};

use crate::client::SessionInput;
use crate::media::{MediaCapability, MediaStream, PeerEventSink};
use crate::protocol::{IceCandidate, IceServer, SessionDescription};
use crate::registry::AttendeeEntry;

pub struct NegotiationEngine {
    media: Arc<dyn MediaCapability>,
    ice_servers: Option<Vec<IceServer>>,
    input_tx: mpsc::UnboundedSender<SessionInput>,
}

impl NegotiationEngine {
    pub(crate) fn new(
        media: Arc<dyn MediaCapability>,
        input_tx: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        Self {
            media,
            ice_servers: None,
            input_tx,
        }
    }

    pub fn set_ice_servers(&mut self, servers: Vec<IceServer>) {
        info!(count = servers.len(), "ICE servers received");
        self.ice_servers = Some(servers);
    }

    pub fn has_ice_servers(&self) -> bool {
        self.ice_servers.is_some()
    }

    /// Fail fast when no ICE server list has arrived yet.
    pub fn ensure_ready(&self) -> Result<&[IceServer]> {
        self.ice_servers
            .as_deref()
            .ok_or(WorkspaceError::IceServersNotInitialized)
    }

    async fn open_peer(&self, entry: &mut AttendeeEntry, local: Option<&MediaStream>) -> Result<()> {
        let servers = self.ensure_ready()?;
        // A fresh call on a stale link replaces the old handle outright.
        if let Some(dc) = entry.data_channel.take() {
            dc.close();
        }
        if let Some(mut old) = entry.peer.take() {
            old.close();
        }
        if let Some(stream) = entry.remote_stream.take() {
            self.media.stop_stream(&stream);
        }
        let sink = PeerEventSink::new(entry.id(), self.input_tx.clone());
        let mut peer = self.media.create_peer(servers, sink).await?;
        if let Some(stream) = local {
            for track in &stream.tracks {
                peer.add_track(track, stream)?;
            }
        }
        entry.peer = Some(peer);
        entry.remote_committed = false;
        Ok(())
    }

    /// Caller role: allocate a handle, attach local tracks, open the data
    /// channel labelled with the call id, then generate and commit an offer.
    pub async fn offer(
        &self,
        entry: &mut AttendeeEntry,
        local: &MediaStream,
        call_id: &str,
    ) -> Result<SessionDescription> {
        self.open_peer(entry, Some(local)).await?;
        let peer = entry
            .peer
            .as_mut()
            .ok_or_else(|| WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()))?;
        entry.data_channel = Some(peer.create_data_channel(call_id)?);

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        debug!(attendee_id = %entry.info.id, call_id, "Offer committed");
        Ok(offer)
    }

    /// Callee role: allocate a handle, commit the remote offer, flush any
    /// early candidates, then generate and commit an answer. The data
    /// channel arrives later through a peer event.
    pub async fn answer(
        &self,
        entry: &mut AttendeeEntry,
        local: &MediaStream,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        self.open_peer(entry, Some(local)).await?;
        self.accept_offer(entry, offer).await
    }

    /// Owner side of a restart: new offer on the existing handle. Neither
    /// the handle nor the data channel is recreated.
    pub async fn renegotiate_offer(&self, entry: &mut AttendeeEntry) -> Result<SessionDescription> {
        self.ensure_ready()?;
        let peer = entry
            .peer
            .as_mut()
            .ok_or_else(|| WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()))?;
        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        debug!(attendee_id = %entry.info.id, "Renegotiation offer committed");
        Ok(offer)
    }

    /// Answer a renegotiation offer on the existing handle.
    pub async fn renegotiate_answer(
        &self,
        entry: &mut AttendeeEntry,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        self.ensure_ready()?;
        if !entry.has_peer() {
            return Err(WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()));
        }
        self.accept_offer(entry, offer).await
    }

    async fn accept_offer(
        &self,
        entry: &mut AttendeeEntry,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        let peer = entry
            .peer
            .as_mut()
            .ok_or_else(|| WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()))?;
        peer.set_remote_description(offer).await?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        entry.remote_committed = true;
        self.flush_candidates(entry).await?;
        debug!(attendee_id = %entry.info.id, "Answer committed");
        Ok(answer)
    }

    /// Commit the remote answer to a previous offer, then flush candidates.
    pub async fn apply_answer(&self, entry: &mut AttendeeEntry, answer: SessionDescription) -> Result<()> {
        let peer = entry
            .peer
            .as_mut()
            .ok_or_else(|| WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()))?;
        peer.set_remote_description(answer).await?;
        entry.remote_committed = true;
        self.flush_candidates(entry).await
    }

    /// Apply a remote candidate, or buffer it until the handle can take it.
    pub async fn add_ice_candidate(&self, entry: &mut AttendeeEntry, candidate: IceCandidate) -> Result<()> {
        if !entry.peer_ready() {
            entry.buffer_candidate(candidate);
            debug!(
                attendee_id = %entry.info.id,
                buffered = entry.buffered_candidates(),
                "ICE candidate buffered"
            );
            return Ok(());
        }
        match entry.peer.as_mut() {
            Some(peer) => peer.add_ice_candidate(candidate).await,
            None => Err(WorkspaceError::NegotiationHandleMissing(entry.info.id.clone())),
        }
    }

    async fn flush_candidates(&self, entry: &mut AttendeeEntry) -> Result<()> {
        let pending = entry.take_candidates();
        if pending.is_empty() {
            return Ok(());
        }
        debug!(attendee_id = %entry.info.id, count = pending.len(), "Flushing ICE buffer");
        let peer = entry
            .peer
            .as_mut()
            .ok_or_else(|| WorkspaceError::NegotiationHandleMissing(entry.info.id.clone()))?;
        for candidate in pending {
            peer.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{attendee, candidate, stun, FakeMedia};

    fn engine(media: &FakeMedia) -> (NegotiationEngine, mpsc::UnboundedReceiver<SessionInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NegotiationEngine::new(Arc::new(media.clone()), tx), rx)
    }

    fn local_stream() -> MediaStream {
        MediaStream {
            id: "local".into(),
            tracks: vec![
                crate::media::MediaTrack {
                    id: "mic".into(),
                    kind: crate::media::TrackKind::Audio,
                },
                crate::media::MediaTrack {
                    id: "cam".into(),
                    kind: crate::media::TrackKind::Video,
                },
            ],
        }
    }

    #[tokio::test]
    async fn offer_requires_ice_servers() {
        let media = FakeMedia::new();
        let (engine, _rx) = engine(&media);
        let mut entry = AttendeeEntry::new(attendee("a1"));
        let err = engine
            .offer(&mut entry, &local_stream(), "call-1")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::IceServersNotInitialized));
        assert!(!entry.has_peer());
    }

    #[tokio::test]
    async fn offer_commits_before_returning() {
        let media = FakeMedia::new();
        let (mut engine, _rx) = engine(&media);
        engine.set_ice_servers(stun());
        let mut entry = AttendeeEntry::new(attendee("a1"));

        let offer = engine
            .offer(&mut entry, &local_stream(), "call-1")
            .await
            .unwrap();
        assert_eq!(offer.sdp, "offer-1");

        let peer = media.peer("a1");
        let log = peer.lock().unwrap();
        assert_eq!(
            log.ops,
            vec!["create_data_channel:call-1", "create_offer", "set_local:offer-1"]
        );
        assert_eq!(log.tracks, vec!["mic", "cam"]);
        assert!(entry.data_channel.is_some());
    }

    #[tokio::test]
    async fn answer_flushes_buffered_candidates_in_order() {
        let media = FakeMedia::new();
        let (mut engine, _rx) = engine(&media);
        engine.set_ice_servers(stun());
        let mut entry = AttendeeEntry::new(attendee("a1"));

        engine.add_ice_candidate(&mut entry, candidate(1)).await.unwrap();
        engine.add_ice_candidate(&mut entry, candidate(2)).await.unwrap();
        assert_eq!(entry.buffered_candidates(), 2);

        let answer = engine
            .answer(&mut entry, &local_stream(), SessionDescription::offer("remote"))
            .await
            .unwrap();
        assert_eq!(answer.sdp, "answer");
        assert_eq!(entry.buffered_candidates(), 0);

        let peer = media.peer("a1");
        let log = peer.lock().unwrap();
        let applied: Vec<&str> = log.candidates.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(applied, vec!["candidate:1", "candidate:2"]);
        assert_eq!(log.ops[0], "set_remote:remote");
        assert!(!log.ops.iter().any(|op| op.starts_with("create_data_channel")));
    }

    #[tokio::test]
    async fn candidates_after_commit_apply_immediately() {
        let media = FakeMedia::new();
        let (mut engine, _rx) = engine(&media);
        engine.set_ice_servers(stun());
        let mut entry = AttendeeEntry::new(attendee("a1"));
        engine
            .offer(&mut entry, &local_stream(), "call-1")
            .await
            .unwrap();

        // Handle exists but the remote answer is not committed yet.
        engine.add_ice_candidate(&mut entry, candidate(1)).await.unwrap();
        assert_eq!(entry.buffered_candidates(), 1);

        engine
            .apply_answer(&mut entry, SessionDescription::answer("remote"))
            .await
            .unwrap();
        assert_eq!(entry.buffered_candidates(), 0);

        engine.add_ice_candidate(&mut entry, candidate(2)).await.unwrap();
        assert_eq!(entry.buffered_candidates(), 0);
        let peer = media.peer("a1");
        assert_eq!(peer.lock().unwrap().candidates.len(), 2);
    }

    #[tokio::test]
    async fn renegotiation_keeps_handle_and_channel() {
        let media = FakeMedia::new();
        let (mut engine, _rx) = engine(&media);
        engine.set_ice_servers(stun());
        let mut entry = AttendeeEntry::new(attendee("a1"));
        engine
            .offer(&mut entry, &local_stream(), "call-1")
            .await
            .unwrap();

        let offer = engine.renegotiate_offer(&mut entry).await.unwrap();
        assert_eq!(offer.sdp, "offer-2");
        assert_eq!(media.peer_count("a1"), 1);
        let peer = media.peer("a1");
        assert_eq!(peer.lock().unwrap().channels.len(), 1);
    }

    #[tokio::test]
    async fn renegotiation_without_handle_fails() {
        let media = FakeMedia::new();
        let (mut engine, _rx) = engine(&media);
        engine.set_ice_servers(stun());
        let mut entry = AttendeeEntry::new(attendee("a1"));

        let err = engine.renegotiate_offer(&mut entry).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NegotiationHandleMissing(_)));

        let err = engine
            .renegotiate_answer(&mut entry, SessionDescription::offer("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NegotiationHandleMissing(_)));

        let err = engine
            .apply_answer(&mut entry, SessionDescription::answer("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NegotiationHandleMissing(_)));
    }
}
