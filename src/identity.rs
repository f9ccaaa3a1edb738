//! Identity resolution and the session context.
//!
//! Who is acting is decided exactly once, at startup, from the persisted
//! credentials; everything downstream receives the resolved identity
//! through [`SessionContext`] instead of re-reading storage ad hoc.

use thiserror::Error;

use telecore::types::call::ConsultationId;
use telecore::types::user::{SessionIdentity, UserRole};

use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Both a doctor and a patient credential are present. The roles are
    /// mutually exclusive per session; callers must pick one explicitly
    /// via [`resolve_with_preference`].
    #[error("both doctor and patient credentials are present; explicit role selection required")]
    AmbiguousRole,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve the acting identity from the credential store.
///
/// Returns `Ok(None)` when no credential is persisted at all, and an
/// [`IdentityError::AmbiguousRole`] error when both roles are logged in
/// at once.
pub fn resolve(store: &dyn CredentialStore) -> Result<Option<SessionIdentity>, IdentityError> {
    let doctor = store.credential(UserRole::Doctor)?;
    let patient = store.credential(UserRole::Patient)?;
    match (doctor, patient) {
        (Some(_), Some(_)) => Err(IdentityError::AmbiguousRole),
        (Some(d), None) => Ok(Some(SessionIdentity::new(d.user_id, UserRole::Doctor))),
        (None, Some(p)) => Ok(Some(SessionIdentity::new(p.user_id, UserRole::Patient))),
        (None, None) => Ok(None),
    }
}

/// Resolve with an explicit role selection for the ambiguous case. Falls
/// back to [`resolve`] when the preferred role has no credential.
pub fn resolve_with_preference(
    store: &dyn CredentialStore,
    preferred: UserRole,
) -> Result<Option<SessionIdentity>, IdentityError> {
    if let Some(credential) = store.credential(preferred)? {
        return Ok(Some(SessionIdentity::new(credential.user_id, preferred)));
    }
    resolve(store)
}

/// Everything a page needs to act in one consultation session: the
/// resolved identity and the room it is scoped to. Built once at
/// application start and passed into client construction.
#[derive(Debug, Clone)]
pub struct SessionContext {
    identity: SessionIdentity,
    consultation: ConsultationId,
}

impl SessionContext {
    pub fn new(identity: SessionIdentity, consultation: ConsultationId) -> Self {
        Self {
            identity,
            consultation,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn consultation(&self) -> &ConsultationId {
        &self.consultation
    }
}
