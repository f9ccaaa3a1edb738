//! Event payloads surfaced to embedders through the client event bus.

use chrono::{DateTime, Utc};

use super::call::{CallId, ConsultationId, EndCallReason};
use super::user::UserRole;

/// The relay transport connected and the room was joined.
#[derive(Debug, Clone)]
pub struct Connected {
    pub consultation_id: ConsultationId,
}

/// The relay transport is gone; the session is over.
#[derive(Debug, Clone)]
pub struct Disconnected {
    /// Whether the local side asked for the disconnect.
    pub expected: bool,
}

/// The remote peer asked to start a call; an accept/decline prompt should
/// be shown. No resources have been acquired yet.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
    pub received_at: DateTime<Utc>,
}

/// Our outgoing call request was accepted; negotiation is starting.
#[derive(Debug, Clone)]
pub struct CallAccepted {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
}

/// Our outgoing call request was declined. Nothing was acquired.
#[derive(Debug, Clone)]
pub struct CallDeclined {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
}

/// Offer/answer exchange completed; media is flowing.
#[derive(Debug, Clone)]
pub struct CallConnected {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
}

/// The call reached its terminal state and all resources were released.
#[derive(Debug, Clone)]
pub struct CallEnded {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
    pub reason: EndCallReason,
}

/// Call setup failed before the call became active (e.g. the capture
/// device was denied); the session is back at idle and can be retried.
#[derive(Debug, Clone)]
pub struct CallFailed {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
    pub error: String,
}

/// A remote media stream was bound to the display surface.
#[derive(Debug, Clone)]
pub struct RemoteStreamAttached {
    pub call_id: CallId,
    pub stream_id: String,
}

/// An opaque chat payload arrived over the relay channel.
#[derive(Debug, Clone)]
pub struct ChatMessageReceived {
    pub consultation_id: ConsultationId,
    pub sender_id: String,
    pub sender_role: Option<UserRole>,
    pub message: String,
}
