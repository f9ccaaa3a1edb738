//! The client owning one consultation session's real-time resources.
//!
//! One `Client` maps to one page instance of the original design: it owns
//! the relay transport (created on connect, unconditionally closed on
//! shutdown), the event router with all handlers, the call manager, and
//! the event bus embedders subscribe to.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use telecore::types::events::{Connected, Disconnected};

use crate::calls::media::{MediaEngine, PeerConnectionConfig};
use crate::calls::{CallError, CallHandler, CallManager, CallManagerConfig};
use crate::config::ClientConfig;
use crate::handlers::chat::ChatPayload;
use crate::handlers::{ChatHandler, EventHandler, EventRouter};
use crate::identity::SessionContext;
use crate::socket::{RelayFrame, RelaySocket, SocketError, consts};
use crate::transport::{TransportEvent, TransportFactory};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("client is already connected")]
    AlreadyConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("call error: {0}")]
    Call(#[from] CallError),
}

pub struct Client {
    context: SessionContext,
    socket: Arc<RelaySocket>,
    router: EventRouter,
    bus: Arc<crate::types::events::EventBus>,
    calls: Arc<CallManager>,
    transport_factory: Arc<dyn TransportFactory>,
    transport_events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    is_connected: AtomicBool,
    expected_disconnect: AtomicBool,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        context: SessionContext,
        transport_factory: Arc<dyn TransportFactory>,
        media_engine: Arc<dyn MediaEngine>,
    ) -> Arc<Self> {
        let bus = Arc::new(crate::types::events::EventBus::new());
        let socket = Arc::new(RelaySocket::new());
        let calls = CallManager::new(
            context.clone(),
            CallManagerConfig {
                ring_timeout_secs: config.ring_timeout_secs,
                peer_config: PeerConnectionConfig {
                    ice_servers: config.ice_servers.clone(),
                },
            },
            socket.clone(),
            bus.clone(),
            media_engine,
        );

        let router = EventRouter::new();
        router.register(Arc::new(CallHandler));
        router.register(Arc::new(ChatHandler));

        Arc::new(Self {
            context,
            socket,
            router,
            bus,
            calls,
            transport_factory,
            transport_events: Mutex::new(None),
            is_connected: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn event_bus(&self) -> &Arc<crate::types::events::EventBus> {
        &self.bus
    }

    pub fn calls(&self) -> &Arc<CallManager> {
        &self.calls
    }

    /// Register an additional handler on the session's relay channel.
    /// Handlers for an already-claimed event all fire.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.router.register(handler);
    }

    /// Create the transport and bind it to the relay socket. `run` must
    /// be called afterwards to process events.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }
        let (transport, events) = match self.transport_factory.create_transport().await {
            Ok(pair) => pair,
            Err(e) => {
                self.is_connected.store(false, Ordering::SeqCst);
                return Err(ClientError::Transport(e.to_string()));
            }
        };
        self.socket.bind(transport).await;
        *self.transport_events.lock().await = Some(events);
        Ok(())
    }

    /// Consume transport events until the connection goes away, then tear
    /// the session down. Handler ordering is event arrival ordering.
    pub async fn run(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut events = self
            .transport_events
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;

        // However the loop exits, the connected flag must not stay up.
        let _flag = scopeguard::guard(self.clone(), |client| {
            client.is_connected.store(false, Ordering::SeqCst);
        });

        let mut result = Ok(());
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected => {
                    info!("relay transport connected");
                    let identity = self.context.identity();
                    if let Err(e) = self
                        .socket
                        .join(self.context.consultation(), &identity.id, identity.role)
                        .await
                    {
                        error!("failed to join consultation room: {e}");
                        result = Err(e.into());
                        break;
                    }
                    let _ = self.bus.connected.send(Arc::new(Connected {
                        consultation_id: self.context.consultation().clone(),
                    }));
                }
                TransportEvent::FrameReceived(raw) => {
                    let frame: RelayFrame = match serde_json::from_slice(&raw) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("undecodable relay frame: {e}");
                            continue;
                        }
                    };
                    self.router.dispatch(self.clone(), frame).await;
                }
                TransportEvent::Disconnected => {
                    if self.expected_disconnect.load(Ordering::SeqCst) {
                        debug!("relay transport closed");
                    } else {
                        warn!("relay transport lost");
                    }
                    break;
                }
            }
        }

        // Transport gone (or join failed): same silent teardown either way.
        self.calls.handle_transport_lost().await;
        self.socket.leave().await;
        let _ = self.bus.disconnected.send(Arc::new(Disconnected {
            expected: self.expected_disconnect.load(Ordering::SeqCst),
        }));
        result
    }

    /// Leave the room and close the transport. All session resources are
    /// released; handlers stop firing once `run` returns.
    pub async fn disconnect(&self) {
        self.expected_disconnect.store(true, Ordering::SeqCst);
        self.calls.handle_transport_lost().await;
        self.socket.leave().await;
    }

    /// Send an opaque chat payload into the consultation room.
    pub async fn send_chat(&self, message: &str) -> Result<(), ClientError> {
        let identity = self.context.identity();
        let payload = ChatPayload {
            consultation_id: self.context.consultation().clone(),
            user_id: identity.id.clone(),
            sender: identity.role.as_str().to_string(),
            message: message.to_string(),
        };
        self.socket.send(consts::SEND_MESSAGE, &payload).await?;
        Ok(())
    }
}
