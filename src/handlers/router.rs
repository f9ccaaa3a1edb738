use super::traits::EventHandler;
use crate::client::Client;
use crate::socket::RelayFrame;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

/// Central router for dispatching relay events to their handlers.
///
/// Unlike a tag-to-handler map, the registry keeps a list per event name:
/// every handler registered for an event fires, in registration order.
pub struct EventRouter {
    handlers: DashMap<&'static str, Vec<Arc<dyn EventHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for every event name it declares.
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        for &event in handler.events() {
            self.handlers.entry(event).or_default().push(handler.clone());
        }
    }

    /// Dispatch a frame to all handlers registered for its event name.
    ///
    /// Returns `true` if at least one handler processed the frame.
    pub async fn dispatch(&self, client: Arc<Client>, frame: RelayFrame) -> bool {
        // Clone the handler list out so the registry lock is not held
        // across handler await points.
        let matched: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(frame.event.as_str())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        if matched.is_empty() {
            debug!("no handler registered for relay event '{}'", frame.event);
            return false;
        }

        let mut handled = false;
        for handler in matched {
            handled |= handler
                .handle(client.clone(), &frame.event, frame.data.clone())
                .await;
        }
        if !handled {
            debug!("relay event '{}' was not consumed", frame.event);
        }
        handled
    }

    /// Number of distinct event names with at least one handler.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
