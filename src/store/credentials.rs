use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use telecore::types::user::UserRole;

use super::{CredentialStore, StoreError};

/// One persisted login: the API token plus the profile id it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CredentialFile {
    doctor: Option<StoredCredential>,
    patient: Option<StoredCredential>,
}

/// JSON-file-backed store, one file per browser-profile equivalent.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<CredentialFile, StoreError> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CredentialFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a credential for one role, keeping the other role's entry.
    pub fn store_credential(
        &self,
        role: UserRole,
        credential: StoredCredential,
    ) -> Result<(), StoreError> {
        let mut file = self.load()?;
        match role {
            UserRole::Doctor => file.doctor = Some(credential),
            UserRole::Patient => file.patient = Some(credential),
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn credential(&self, role: UserRole) -> Result<Option<StoredCredential>, StoreError> {
        let file = self.load()?;
        Ok(match role {
            UserRole::Doctor => file.doctor,
            UserRole::Patient => file.patient,
        })
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    doctor: Option<StoredCredential>,
    patient: Option<StoredCredential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doctor(mut self, credential: StoredCredential) -> Self {
        self.doctor = Some(credential);
        self
    }

    pub fn with_patient(mut self, credential: StoredCredential) -> Self {
        self.patient = Some(credential);
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credential(&self, role: UserRole) -> Result<Option<StoredCredential>, StoreError> {
        Ok(match role {
            UserRole::Doctor => self.doctor.clone(),
            UserRole::Patient => self.patient.clone(),
        })
    }
}
