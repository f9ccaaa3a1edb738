use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the consultation whose two participants share the
/// real-time session. All signaling messages are scoped to it, and it
/// never changes for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsultationId(String);

impl ConsultationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-local identifier of one call attempt. A new id is generated for
/// every attempt; it never goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random 32-hex-char call id.
    pub fn generate() -> Self {
        let mut raw = [0u8; 16];
        rand::rng().fill_bytes(&mut raw);
        Self(hex::encode_upper(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a call attempt relative to this client.
///
/// `Outgoing` is the caller role of the signaling protocol, `Incoming`
/// the callee role. The direction is fixed per attempt, not per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

impl CallDirection {
    pub fn is_caller(self) -> bool {
        self == Self::Outgoing
    }
}

/// Why a call left the active part of its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndCallReason {
    /// The local user hung up.
    UserEnded,
    /// The remote peer hung up (`end-call` received).
    RemoteEnded,
    /// The callee declined the request.
    Declined,
    /// The outgoing request was never answered.
    Timeout,
    /// The relay transport dropped; treated like a remote hang-up.
    TransportLost,
    /// Offer/answer exchange failed.
    NegotiationFailed,
}

/// Opaque session description (SDP) payload. Produced and consumed by the
/// media layer; signaling only carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub serde_json::Value);

/// Opaque connectivity candidate, trickled incrementally by either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_call_ids_are_unique_hex() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn consultation_id_serializes_transparently() {
        let id = ConsultationId::new("consult-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"consult-42\"");
    }
}
