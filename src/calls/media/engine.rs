use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use telecore::types::call::{IceCandidate, SessionDescription};

#[derive(Debug, Error)]
pub enum MediaError {
    /// Permission denied, no device, or the platform refused capture.
    #[error("media device acquisition failed: {0}")]
    Acquisition(String),

    /// Malformed or inapplicable session description / candidate.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("peer connection is closed")]
    PeerClosed,

    /// The owning session was released while the operation was in flight;
    /// the result has been discarded.
    #[error("media session already released")]
    SessionReleased,
}

/// Configuration handed to the peer-connection layer.
#[derive(Debug, Clone)]
pub struct PeerConnectionConfig {
    pub ice_servers: Vec<String>,
}

impl Default for PeerConnectionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// Handle to a remote media stream, ready to bind to a render surface.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub stream_id: String,
}

/// Asynchronous events produced by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local connectivity candidate was found and should be trickled to
    /// the peer.
    LocalCandidate(IceCandidate),
    /// A remote stream arrived.
    RemoteTrack(RemoteTrack),
    ConnectionStateChanged(PeerConnectionState),
}

/// A live capture handle (camera + microphone).
pub trait LocalMediaHandle: Send + Sync + std::fmt::Debug {
    /// Stop all tracks and release the devices. Must be idempotent.
    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// A negotiable media connection to the remote peer.
#[async_trait]
pub trait PeerConnectionHandle: Send + Sync {
    /// Attach the local capture tracks to this connection.
    async fn add_local_tracks(&self, local: Arc<dyn LocalMediaHandle>) -> Result<(), MediaError>;

    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError>;

    /// Close the connection. Must be idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory for the two capabilities a call needs.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Request local audio+video capture.
    async fn acquire_local(&self) -> Result<Arc<dyn LocalMediaHandle>, MediaError>;

    /// Create a peer connection plus the stream of events it produces.
    async fn create_peer_connection(
        &self,
        config: &PeerConnectionConfig,
    ) -> Result<(Arc<dyn PeerConnectionHandle>, mpsc::Receiver<PeerEvent>), MediaError>;
}
