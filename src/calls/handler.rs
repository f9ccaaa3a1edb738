//! Relay event handler for call signaling.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use crate::client::Client;
use crate::handlers::traits::EventHandler;
use crate::socket::consts;

use super::signaling::{SignalingEvent, SignalingMessage};

/// Handler for the seven call signaling events.
#[derive(Default)]
pub struct CallHandler;

#[async_trait]
impl EventHandler for CallHandler {
    fn events(&self) -> &'static [&'static str] {
        &[
            consts::CALL_REQUEST,
            consts::CALL_ACCEPTED,
            consts::CALL_DECLINED,
            consts::OFFER,
            consts::ANSWER,
            consts::ICE_CANDIDATE,
            consts::END_CALL,
        ]
    }

    async fn handle(&self, client: Arc<Client>, event: &str, data: serde_json::Value) -> bool {
        let Some(signaling_event) = SignalingEvent::from_name(event) else {
            return false;
        };
        let message = match SignalingMessage::from_frame(signaling_event, data) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to parse {} payload: {}", event, e);
                return false;
            }
        };
        if message.consultation_id() != client.context().consultation() {
            warn!(
                "signaling for foreign consultation {}, dropping",
                message.consultation_id()
            );
            return false;
        }

        debug!("received call signaling: {}", event);
        let calls = client.calls();
        match message {
            SignalingMessage::CallRequest { .. } => calls.handle_call_request().await,
            SignalingMessage::CallAccepted { .. } => calls.handle_call_accepted().await,
            SignalingMessage::CallDeclined { .. } => calls.handle_call_declined().await,
            SignalingMessage::Offer { sdp, .. } => calls.handle_offer(sdp).await,
            SignalingMessage::Answer { sdp, .. } => calls.handle_answer(sdp).await,
            SignalingMessage::IceCandidate { candidate, .. } => {
                calls.handle_ice_candidate(candidate).await
            }
            SignalingMessage::EndCall { .. } => calls.handle_end_call().await,
        }
        true
    }
}
