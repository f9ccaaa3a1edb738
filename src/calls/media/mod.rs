//! Media capabilities and the per-attempt media session.
//!
//! The platform primitives ("acquire camera and microphone", "create a
//! negotiable media connection", "bind a remote stream") are consumed
//! through traits so the protocol layer never touches a real device
//! pipeline directly. [`MediaSession`] owns the handles for exactly one
//! call attempt and enforces the acquire-once / release-once rules every
//! exit path relies on.

mod engine;
pub mod mock;
mod session;

pub use engine::{
    LocalMediaHandle, MediaEngine, MediaError, PeerConnectionConfig, PeerConnectionHandle,
    PeerConnectionState, PeerEvent, RemoteTrack,
};
pub use session::MediaSession;
