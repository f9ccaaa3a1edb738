use std::sync::Arc;
use tokio::sync::broadcast;
pub use telecore::types::events::*;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for
        /// each event type, so embedders subscribe only to what they render.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Call lifecycle events
    (incoming_call, Arc<IncomingCall>),
    (call_accepted, Arc<CallAccepted>),
    (call_declined, Arc<CallDeclined>),
    (call_connected, Arc<CallConnected>),
    (call_ended, Arc<CallEnded>),
    (call_failed, Arc<CallFailed>),

    // Media events
    (remote_stream, Arc<RemoteStreamAttached>),

    // Chat events
    (chat_message, Arc<ChatMessageReceived>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
