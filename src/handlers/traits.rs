use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for handling named events received over the relay channel.
///
/// Each handler declares the event names it is responsible for. Several
/// handlers may subscribe to the same event; the router fires all of them,
/// which is what lets independent features share one relay connection.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The wire event names this handler wants to receive.
    fn events(&self) -> &'static [&'static str];

    /// Asynchronously handle one incoming event.
    ///
    /// # Returns
    /// `true` if the payload was successfully processed, `false` if it was
    /// malformed or not applicable (it will be logged as unhandled when no
    /// handler returns `true`).
    async fn handle(&self, client: Arc<Client>, event: &str, data: serde_json::Value) -> bool;
}
