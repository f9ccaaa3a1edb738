use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use telecore::types::call::ConsultationId;
use telecore::types::user::UserRole;

use super::consts;
use super::error::SocketError;
use crate::transport::Transport;

/// Envelope of every frame crossing the relay: a named event plus its
/// JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl RelayFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Payload of the `joinRoom` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub consultation_id: ConsultationId,
    pub user_id: String,
    pub role: UserRole,
}

/// The one relay channel a session owns.
///
/// Bound to a transport when the client connects and unbound when it
/// leaves; all signaling and chat frames of the session go through it.
pub struct RelaySocket {
    transport: Mutex<Option<Arc<dyn Transport>>>,
    joined: AtomicBool,
}

impl RelaySocket {
    pub fn new() -> Self {
        Self {
            transport: Mutex::new(None),
            joined: AtomicBool::new(false),
        }
    }

    pub(crate) async fn bind(&self, transport: Arc<dyn Transport>) {
        *self.transport.lock().await = Some(transport);
    }

    pub async fn is_bound(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Send a named event. Fire-and-forget from the protocol's point of
    /// view; errors only mean the frame never left this process.
    pub async fn send(
        &self,
        event: &str,
        payload: &impl Serialize,
    ) -> Result<(), SocketError> {
        let frame = RelayFrame::new(event, serde_json::to_value(payload)?);
        self.send_frame(frame).await
    }

    pub async fn send_frame(&self, frame: RelayFrame) -> Result<(), SocketError> {
        let bytes = serde_json::to_vec(&frame)?;
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(SocketError::NotConnected)?;
        transport
            .send_frame(&bytes)
            .await
            .map_err(|e| SocketError::Send(e.to_string()))?;
        debug!("relay frame sent: {}", frame.event);
        Ok(())
    }

    /// Enter the consultation room. Idempotent: only the first call after
    /// binding emits the `joinRoom` notification.
    pub async fn join(
        &self,
        consultation_id: &ConsultationId,
        user_id: &str,
        role: UserRole,
    ) -> Result<(), SocketError> {
        if self.joined.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let payload = JoinRoomPayload {
            consultation_id: consultation_id.clone(),
            user_id: user_id.to_string(),
            role,
        };
        self.send(consts::JOIN_ROOM, &payload).await
    }

    /// Unbind and close the transport. Safe to call more than once.
    pub async fn leave(&self) {
        self.joined.store(false, Ordering::SeqCst);
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
    }
}

impl Default for RelaySocket {
    fn default() -> Self {
        Self::new()
    }
}
