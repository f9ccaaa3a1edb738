//! Wire-level relay event names. Case-sensitive; the relay routes them to
//! the other participant(s) of the consultation room verbatim.

/// Sent once after the transport connects to enter the consultation room.
pub const JOIN_ROOM: &str = "joinRoom";

pub const CALL_REQUEST: &str = "call-request";
pub const CALL_ACCEPTED: &str = "call-accepted";
pub const CALL_DECLINED: &str = "call-declined";
pub const OFFER: &str = "offer";
pub const ANSWER: &str = "answer";
pub const ICE_CANDIDATE: &str = "ice-candidate";
pub const END_CALL: &str = "end-call";

/// Chat rides the same relay channel as opaque payloads.
pub const SEND_MESSAGE: &str = "sendMessage";
pub const RECEIVE_MESSAGE: &str = "receiveMessage";
