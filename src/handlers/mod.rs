pub mod chat;
pub mod router;
pub mod traits;

pub use chat::{ChatHandler, ChatPayload};
pub use router::EventRouter;
pub use traits::EventHandler;
