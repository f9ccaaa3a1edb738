use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("relay socket is not connected")]
    NotConnected,

    #[error("frame encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport send failed: {0}")]
    Send(String),
}
