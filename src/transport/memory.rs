//! In-process relay double.
//!
//! `MemoryRelay` stands in for the signaling server: every frame sent by
//! one endpoint is delivered to every other endpoint, which is exactly the
//! room-broadcast behavior the real relay applies to a two-party
//! consultation room. Integration tests and loopback demos wire two
//! clients to one relay; `MemoryEndpoint::sever` simulates transport loss.

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

use super::{Transport, TransportEvent, TransportFactory};
use crate::socket::consts;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The real relay rebroadcasts an inbound `sendMessage` to the room as
/// `receiveMessage`; the double has to do the same for chat to flow.
fn forward_frame(frame: &Bytes) -> Bytes {
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(frame) else {
        return frame.clone();
    };
    if value["event"] == consts::SEND_MESSAGE {
        value["event"] = consts::RECEIVE_MESSAGE.into();
        if let Ok(rewritten) = serde_json::to_vec(&value) {
            return Bytes::from(rewritten);
        }
    }
    frame.clone()
}

#[derive(Default)]
struct RelayState {
    endpoints: Vec<EndpointSlot>,
    /// Every frame that crossed the relay, with the sending endpoint id.
    frames: Vec<(usize, Bytes)>,
}

struct EndpointSlot {
    id: usize,
    events: mpsc::Sender<TransportEvent>,
}

struct RelayInner {
    state: Mutex<RelayState>,
    next_id: AtomicUsize,
}

/// The shared hub all endpoints of one test/demo session attach to.
#[derive(Clone)]
pub struct MemoryRelay {
    inner: Arc<RelayInner>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                state: Mutex::new(RelayState::default()),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a factory for one more endpoint of this relay.
    pub fn endpoint(&self) -> MemoryEndpoint {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        MemoryEndpoint {
            id,
            relay: self.inner.clone(),
            events: Mutex::new(None),
        }
    }

    /// All frames the relay has forwarded so far, with sender endpoint ids.
    pub async fn sent_frames(&self) -> Vec<(usize, Bytes)> {
        self.inner.state.lock().await.frames.clone()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// One attachable endpoint. Doubles as the `TransportFactory` handed to a
/// client; keep a clone to `sever` the connection mid-test.
pub struct MemoryEndpoint {
    id: usize,
    relay: Arc<RelayInner>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl MemoryEndpoint {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Drop this endpoint off the relay and surface `Disconnected` to its
    /// owner, as if the network path had gone away.
    pub async fn sever(&self) {
        self.relay
            .state
            .lock()
            .await
            .endpoints
            .retain(|slot| slot.id != self.id);
        if let Some(events) = self.events.lock().await.take() {
            let _ = events.send(TransportEvent::Disconnected).await;
        }
        debug!("memory endpoint {} severed", self.id);
    }
}

#[async_trait]
impl TransportFactory for MemoryEndpoint {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        {
            let mut state = self.relay.state.lock().await;
            state.endpoints.retain(|slot| slot.id != self.id);
            state.endpoints.push(EndpointSlot {
                id: self.id,
                events: events_tx.clone(),
            });
        }
        *self.events.lock().await = Some(events_tx.clone());

        events_tx
            .send(TransportEvent::Connected)
            .await
            .map_err(|_| anyhow::anyhow!("transport event receiver dropped"))?;

        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport {
            id: self.id,
            relay: self.relay.clone(),
            events: events_tx,
        });
        Ok((transport, events_rx))
    }
}

struct MemoryTransport {
    id: usize,
    relay: Arc<RelayInner>,
    events: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), anyhow::Error> {
        let frame = Bytes::copy_from_slice(frame);
        let peers: Vec<mpsc::Sender<TransportEvent>> = {
            let mut state = self.relay.state.lock().await;
            if !state.endpoints.iter().any(|slot| slot.id == self.id) {
                return Err(anyhow::anyhow!("endpoint is detached from the relay"));
            }
            state.frames.push((self.id, frame.clone()));
            state
                .endpoints
                .iter()
                .filter(|slot| slot.id != self.id)
                .map(|slot| slot.events.clone())
                .collect()
        };
        let outbound = forward_frame(&frame);
        for peer in peers {
            let _ = peer
                .send(TransportEvent::FrameReceived(outbound.clone()))
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.relay
            .state
            .lock()
            .await
            .endpoints
            .retain(|slot| slot.id != self.id);
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }
}
