//! Per-attempt media session.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::{
    LocalMediaHandle, MediaEngine, MediaError, PeerConnectionConfig, PeerConnectionHandle,
    PeerEvent, RemoteTrack,
};

/// Owns the media resources of exactly one call attempt.
///
/// Invariants enforced here, for every caller:
/// - at most one capture handle and one peer connection per session;
/// - repeated `acquire` calls return the existing handle, the devices are
///   never requested twice;
/// - `release` runs at most once, every later call is a no-op;
/// - an acquisition that completes after `release` is discarded and its
///   handle stopped, never attached.
pub struct MediaSession {
    engine: Arc<dyn MediaEngine>,
    peer_config: PeerConnectionConfig,
    local: Mutex<Option<Arc<dyn LocalMediaHandle>>>,
    peer: Mutex<Option<Arc<dyn PeerConnectionHandle>>>,
    remote: Mutex<Option<RemoteTrack>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
}

impl MediaSession {
    pub fn new(engine: Arc<dyn MediaEngine>, peer_config: PeerConnectionConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            peer_config,
            local: Mutex::new(None),
            peer: Mutex::new(None),
            remote: Mutex::new(None),
            pump: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    /// Acquire the local capture devices, or return the handle acquired
    /// earlier in this session.
    pub async fn acquire(&self) -> Result<Arc<dyn LocalMediaHandle>, MediaError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(MediaError::SessionReleased);
        }
        {
            let slot = self.local.lock().await;
            if let Some(handle) = slot.as_ref() {
                return Ok(handle.clone());
            }
        }
        // The lock is not held across the engine call so a concurrent
        // release never waits on an in-flight device prompt.
        let handle = self.engine.acquire_local().await?;
        let mut slot = self.local.lock().await;
        if self.released.load(Ordering::SeqCst) {
            drop(slot);
            handle.stop();
            return Err(MediaError::SessionReleased);
        }
        if let Some(existing) = slot.as_ref() {
            // Lost a race against another acquire; keep the first handle.
            let existing = existing.clone();
            drop(slot);
            handle.stop();
            return Ok(existing);
        }
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Create the peer connection if it does not exist yet.
    ///
    /// Returns the handle, plus the peer event receiver when this call
    /// actually created the connection (`None` when the guard hit and the
    /// existing handle was returned).
    pub async fn ensure_peer(
        &self,
    ) -> Result<
        (
            Arc<dyn PeerConnectionHandle>,
            Option<mpsc::Receiver<PeerEvent>>,
        ),
        MediaError,
    > {
        if self.released.load(Ordering::SeqCst) {
            return Err(MediaError::SessionReleased);
        }
        {
            let slot = self.peer.lock().await;
            if let Some(peer) = slot.as_ref() {
                return Ok((peer.clone(), None));
            }
        }
        let (peer, events) = self.engine.create_peer_connection(&self.peer_config).await?;
        let mut slot = self.peer.lock().await;
        if self.released.load(Ordering::SeqCst) {
            drop(slot);
            peer.close();
            return Err(MediaError::SessionReleased);
        }
        if let Some(existing) = slot.as_ref() {
            let existing = existing.clone();
            drop(slot);
            peer.close();
            return Ok((existing, None));
        }
        *slot = Some(peer.clone());
        Ok((peer, Some(events)))
    }

    pub async fn peer(&self) -> Option<Arc<dyn PeerConnectionHandle>> {
        self.peer.lock().await.clone()
    }

    pub async fn local(&self) -> Option<Arc<dyn LocalMediaHandle>> {
        self.local.lock().await.clone()
    }

    /// Remember the task forwarding peer events so release can stop it.
    pub async fn set_pump(&self, pump: JoinHandle<()>) {
        if self.released.load(Ordering::SeqCst) {
            pump.abort();
            return;
        }
        *self.pump.lock().await = Some(pump);
    }

    /// Bind a remote stream to the display surface. Later tracks of the
    /// same session overwrite the binding.
    pub async fn attach_remote(&self, track: RemoteTrack) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        *self.remote.lock().await = Some(track);
    }

    pub async fn remote_track(&self) -> Option<RemoteTrack> {
        self.remote.lock().await.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Tear everything down. Every exit path funnels through here; the
    /// second and later calls do nothing.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        if let Some(peer) = self.peer.lock().await.take() {
            peer.close();
        }
        if let Some(local) = self.local.lock().await.take() {
            local.stop();
        }
        self.remote.lock().await.take();
        debug!("media session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::media::mock::MockMediaEngine;

    fn session(engine: &Arc<MockMediaEngine>) -> Arc<MediaSession> {
        MediaSession::new(engine.clone(), PeerConnectionConfig::default())
    }

    #[tokio::test]
    async fn acquire_is_idempotent() {
        let engine = Arc::new(MockMediaEngine::new());
        let session = session(&engine);

        let first = session.acquire().await.unwrap();
        let second = session.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.acquire_count(), 1);
    }

    #[tokio::test]
    async fn ensure_peer_is_a_no_op_when_a_handle_exists() {
        let engine = Arc::new(MockMediaEngine::new());
        let session = session(&engine);

        let (first, events) = session.ensure_peer().await.unwrap();
        assert!(events.is_some());
        let (second, events) = session.ensure_peer().await.unwrap();
        assert!(events.is_none());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.peer_handles().len(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_closes_everything() {
        let engine = Arc::new(MockMediaEngine::new());
        let session = session(&engine);

        let local = session.acquire().await.unwrap();
        let (peer, _events) = session.ensure_peer().await.unwrap();

        session.release().await;
        session.release().await;

        assert!(local.is_stopped());
        assert!(peer.is_closed());
        assert!(session.peer().await.is_none());
        assert!(session.local().await.is_none());
    }

    #[tokio::test]
    async fn late_acquisition_is_discarded_after_release() {
        let engine = Arc::new(MockMediaEngine::new());
        let gate = engine.gate_acquire();
        let session = session(&engine);

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.acquire().await })
        };
        // Let the acquire reach the gate, then release the session.
        tokio::task::yield_now().await;
        session.release().await;
        gate.notify_one();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(MediaError::SessionReleased)));
        // The device prompt completed, but its handle must be stopped.
        let handles = engine.local_handles();
        assert_eq!(handles.len(), 1);
        assert!(handles[0].is_stopped());
    }

    #[tokio::test]
    async fn remote_track_binding_overwrites() {
        let engine = Arc::new(MockMediaEngine::new());
        let session = session(&engine);

        session
            .attach_remote(RemoteTrack {
                stream_id: "a".into(),
            })
            .await;
        session
            .attach_remote(RemoteTrack {
                stream_id: "b".into(),
            })
            .await;
        assert_eq!(session.remote_track().await.unwrap().stream_id, "b");
    }
}
