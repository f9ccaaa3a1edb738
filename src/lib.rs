// Re-export core types for downstream use; events (with the EventBus)
// remain here because the bus is tokio-specific.
pub mod types {
    pub use telecore::types::*;
    pub mod events;
}

pub mod calls;
pub mod client;
pub mod config;
pub mod handlers;
pub mod identity;
pub mod socket;
pub mod store;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::ClientConfig;
pub use identity::SessionContext;
