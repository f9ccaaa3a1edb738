//! Call signaling for consultation video sessions.
//!
//! This module implements the client side of the two-party call setup
//! protocol that runs over the relay channel: request/accept/decline,
//! renegotiation-free offer/answer exchange, candidate trickling, and
//! race-free teardown.
//!
//! # Architecture
//!
//! - [`SignalingEvent`] & [`SignalingMessage`]: the wire-level message set
//! - [`CallPhase`] & [`CallInfo`]: call state machine tracking one attempt
//! - [`CallHandler`]: relay event handler feeding the manager
//! - [`CallManager`]: orchestrates call lifecycle and state
//! - [`media`]: capability traits for capture devices and peer
//!   connections, plus the per-attempt media session
//!
//! # Protocol Overview
//!
//! The caller sends `call-request` and acquires nothing until the callee
//! accepts; the callee acquires its devices when the user accepts and
//! announces `call-accepted`; the caller then builds the offer, the callee
//! answers, and candidates trickle from both sides as they are found.
//! `end-call` from either side tears the session down silently on the
//! receiving side, so the signal is never echoed back.

mod error;
mod handler;
mod manager;
pub mod media;
mod signaling;
mod state;

pub use error::CallError;
pub use handler::CallHandler;
pub use manager::{CallManager, CallManagerConfig};
pub use signaling::{
    AnswerPayload, CallControlPayload, CandidatePayload, OfferPayload, SignalingEvent,
    SignalingMessage,
};
pub use state::{CallInfo, CallPhase, CallTransition, InvalidTransition};
