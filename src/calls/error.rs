//! Call-related error types.

use thiserror::Error;

use super::media::MediaError;
use super::state::InvalidTransition;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no active call")]
    NoActiveCall,

    #[error("a call attempt is already in progress")]
    CallInProgress,

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),
}
