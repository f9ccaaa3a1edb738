//! Deterministic media engine for headless runs and tests.
//!
//! No real devices are touched: capture handles are plain flags, peer
//! connections synthesize fixed descriptions, trickle a configurable
//! number of candidates after the local description is set, and surface a
//! remote track once the remote description lands.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

use telecore::types::call::{IceCandidate, SessionDescription};

use super::engine::{
    LocalMediaHandle, MediaEngine, MediaError, PeerConnectionConfig, PeerConnectionHandle,
    PeerConnectionState, PeerEvent, RemoteTrack,
};

const PEER_EVENT_CAPACITY: usize = 32;

pub struct MockMediaEngine {
    acquire_count: AtomicUsize,
    fail_next_acquire: AtomicBool,
    trickle_count: AtomicUsize,
    acquire_gate: Mutex<Option<Arc<Notify>>>,
    locals: Mutex<Vec<Arc<MockLocalMedia>>>,
    peers: Mutex<Vec<Arc<MockPeerConnection>>>,
    peer_seq: AtomicUsize,
}

impl MockMediaEngine {
    pub fn new() -> Self {
        Self {
            acquire_count: AtomicUsize::new(0),
            fail_next_acquire: AtomicBool::new(false),
            trickle_count: AtomicUsize::new(2),
            acquire_gate: Mutex::new(None),
            locals: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
            peer_seq: AtomicUsize::new(0),
        }
    }

    /// Make the next `acquire_local` fail like a denied permission prompt.
    pub fn fail_next_acquire(&self) {
        self.fail_next_acquire.store(true, Ordering::SeqCst);
    }

    /// How many candidates each connection trickles after its local
    /// description is set.
    pub fn set_trickle_count(&self, count: usize) {
        self.trickle_count.store(count, Ordering::SeqCst);
    }

    /// Gate `acquire_local` on a notify so tests can interleave a release
    /// with an in-flight device prompt.
    pub fn gate_acquire(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.acquire_gate.lock().expect("gate lock") = Some(gate.clone());
        gate
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn local_handles(&self) -> Vec<Arc<MockLocalMedia>> {
        self.locals.lock().expect("locals lock").clone()
    }

    pub fn peer_handles(&self) -> Vec<Arc<MockPeerConnection>> {
        self.peers.lock().expect("peers lock").clone()
    }

    /// True when nothing created by this engine is still live.
    pub fn all_resources_released(&self) -> bool {
        self.local_handles().iter().all(|l| l.is_stopped())
            && self.peer_handles().iter().all(|p| p.is_closed())
    }
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn acquire_local(&self) -> Result<Arc<dyn LocalMediaHandle>, MediaError> {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        let gate = self.acquire_gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_next_acquire.swap(false, Ordering::SeqCst) {
            return Err(MediaError::Acquisition("permission denied".to_string()));
        }
        let handle = Arc::new(MockLocalMedia {
            stopped: AtomicBool::new(false),
        });
        self.locals.lock().expect("locals lock").push(handle.clone());
        Ok(handle)
    }

    async fn create_peer_connection(
        &self,
        _config: &PeerConnectionConfig,
    ) -> Result<(Arc<dyn PeerConnectionHandle>, mpsc::Receiver<PeerEvent>), MediaError> {
        let (events_tx, events_rx) = mpsc::channel(PEER_EVENT_CAPACITY);
        let peer = Arc::new(MockPeerConnection {
            id: self.peer_seq.fetch_add(1, Ordering::SeqCst),
            closed: AtomicBool::new(false),
            trickled: AtomicBool::new(false),
            track_surfaced: AtomicBool::new(false),
            trickle_count: self.trickle_count.load(Ordering::SeqCst),
            tracks_added: AtomicUsize::new(0),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            events: events_tx,
        });
        self.peers.lock().expect("peers lock").push(peer.clone());
        Ok((peer, events_rx))
    }
}

#[derive(Debug)]
pub struct MockLocalMedia {
    stopped: AtomicBool,
}

impl LocalMediaHandle for MockLocalMedia {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct MockPeerConnection {
    id: usize,
    closed: AtomicBool,
    trickled: AtomicBool,
    track_surfaced: AtomicBool,
    trickle_count: usize,
    tracks_added: AtomicUsize,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    events: mpsc::Sender<PeerEvent>,
}

impl MockPeerConnection {
    fn guard_open(&self) -> Result<(), MediaError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(MediaError::PeerClosed)
        } else {
            Ok(())
        }
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().expect("candidates lock").clone()
    }

    pub fn tracks_added(&self) -> usize {
        self.tracks_added.load(Ordering::SeqCst)
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description
            .lock()
            .expect("description lock")
            .clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description
            .lock()
            .expect("description lock")
            .clone()
    }
}

#[async_trait]
impl PeerConnectionHandle for MockPeerConnection {
    async fn add_local_tracks(&self, _local: Arc<dyn LocalMediaHandle>) -> Result<(), MediaError> {
        self.guard_open()?;
        self.tracks_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        self.guard_open()?;
        Ok(SessionDescription(json!({
            "type": "offer",
            "sdp": format!("v=0 mock-offer-{}", self.id),
        })))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        self.guard_open()?;
        Ok(SessionDescription(json!({
            "type": "answer",
            "sdp": format!("v=0 mock-answer-{}", self.id),
        })))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.guard_open()?;
        *self.local_description.lock().expect("description lock") = Some(desc);
        // Candidate gathering starts once the local description exists,
        // like a real peer connection.
        if !self.trickled.swap(true, Ordering::SeqCst) {
            for seq in 0..self.trickle_count {
                let candidate = IceCandidate(json!({
                    "candidate": format!(
                        "candidate:{seq} 1 udp 2122252543 198.51.100.{} 544{seq:02} typ host",
                        self.id
                    ),
                    "sdpMLineIndex": 0,
                }));
                let _ = self
                    .events
                    .send(PeerEvent::LocalCandidate(candidate))
                    .await;
            }
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        self.guard_open()?;
        *self.remote_description.lock().expect("description lock") = Some(desc);
        if !self.track_surfaced.swap(true, Ordering::SeqCst) {
            let _ = self
                .events
                .send(PeerEvent::RemoteTrack(RemoteTrack {
                    stream_id: format!("remote-stream-{}", self.id),
                }))
                .await;
            let _ = self
                .events
                .send(PeerEvent::ConnectionStateChanged(
                    PeerConnectionState::Connected,
                ))
                .await;
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.guard_open()?;
        self.candidates
            .lock()
            .expect("candidates lock")
            .push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
