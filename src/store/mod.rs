//! Credential persistence.
//!
//! The platform stores one credential per role after login (out of scope
//! here); this module only reads them back so the identity resolver can
//! decide who is acting.

mod credentials;

pub use credentials::{FileCredentialStore, MemoryCredentialStore, StoredCredential};

use telecore::types::user::UserRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential store: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Read access to locally persisted login credentials.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, role: UserRole) -> Result<Option<StoredCredential>, StoreError>;
}
