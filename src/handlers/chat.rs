//! Chat payload pass-through.
//!
//! Chat shares the relay channel with call signaling but carries no
//! protocol state: payloads are forwarded to the event bus as-is.

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use telecore::types::call::ConsultationId;
use telecore::types::events::ChatMessageReceived;

use crate::client::Client;
use crate::socket::consts;

use super::traits::EventHandler;

/// Wire payload of `sendMessage` / `receiveMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub consultation_id: ConsultationId,
    pub user_id: String,
    /// Role string of the sender ("doctor" / "patient").
    pub sender: String,
    pub message: String,
}

#[derive(Default)]
pub struct ChatHandler;

#[async_trait]
impl EventHandler for ChatHandler {
    fn events(&self) -> &'static [&'static str] {
        &[consts::RECEIVE_MESSAGE]
    }

    async fn handle(&self, client: Arc<Client>, event: &str, data: serde_json::Value) -> bool {
        let payload: ChatPayload = match serde_json::from_value(data) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse {} payload: {}", event, e);
                return false;
            }
        };
        if payload.consultation_id != *client.context().consultation() {
            warn!(
                "chat message for foreign consultation {}, dropping",
                payload.consultation_id
            );
            return false;
        }
        let _ = client
            .event_bus()
            .chat_message
            .send(Arc::new(ChatMessageReceived {
                consultation_id: payload.consultation_id,
                sender_id: payload.user_id,
                sender_role: payload.sender.parse().ok(),
                message: payload.message,
            }));
        true
    }
}
