pub mod consts;
pub mod error;
mod relay_socket;

pub use error::SocketError;
pub use relay_socket::{JoinRoomPayload, RelayFrame, RelaySocket};
