//! Content-addressed credential persistence.

use std::sync::{Arc, Mutex};

use crate::credential::Credential;
use crate::error::{StorageError, StorageResult};

use super::blob_store::AtomicBlobStore;
use super::keys::{credential_blob, CREDENTIAL_INDEX_BLOB};

/// The wallet's single owner of credential records.
///
/// Both the scan path and the claim path insert through [`CredentialStore::insert`];
/// there is no other mutation. Inserting an id that is already stored is a no-op,
/// so replays of the same credential (retries, duplicate redemption) are harmless.
pub struct CredentialStore {
    blobs: Arc<dyn AtomicBlobStore>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Creates a store over `blobs`.
    #[must_use]
    pub fn new(blobs: Arc<dyn AtomicBlobStore>) -> Self {
        Self {
            blobs,
            write_lock: Mutex::new(()),
        }
    }

    /// Inserts `credential` unless its id is already stored (first write wins).
    ///
    /// Returns `true` if the credential was newly stored.
    ///
    /// The record is written before the index, so a crash in between leaves an
    /// unindexed record that the next insert of the same id simply overwrites.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or record cannot be read or written.
    pub fn insert(&self, credential: &Credential) -> StorageResult<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Lock("credential store poisoned".to_string()))?;

        let mut index = self.load_index()?;
        if index.iter().any(|id| *id == credential.id) {
            log::debug!("credential {} already stored", credential.id);
            return Ok(false);
        }

        self.blobs.write_atomic(
            &credential_blob(&credential.id),
            &serde_json::to_vec(credential)?,
        )?;
        index.insert(0, credential.id.clone());
        self.blobs
            .write_atomic(CREDENTIAL_INDEX_BLOB, &serde_json::to_vec(&index)?)?;

        log::info!("stored credential {}", credential.id);
        Ok(true)
    }

    /// Looks up a credential by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn get(&self, id: &str) -> StorageResult<Option<Credential>> {
        if !self.load_index()?.iter().any(|known| known == id) {
            return Ok(None);
        }
        self.load_record(id)
    }

    /// All stored credentials, most recently inserted first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or a record cannot be read.
    pub fn list(&self) -> StorageResult<Vec<Credential>> {
        let mut credentials = Vec::new();
        for id in self.load_index()? {
            match self.load_record(&id)? {
                Some(credential) => credentials.push(credential),
                None => log::warn!("credential {id} is indexed but has no record"),
            }
        }
        Ok(credentials)
    }

    /// Number of stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.load_index()?.len())
    }

    fn load_index(&self) -> StorageResult<Vec<String>> {
        self.blobs
            .read(CREDENTIAL_INDEX_BLOB)?
            .map_or_else(|| Ok(Vec::new()), |bytes| Ok(serde_json::from_slice(&bytes)?))
    }

    fn load_record(&self, id: &str) -> StorageResult<Option<Credential>> {
        self.blobs
            .read(&credential_blob(id))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(StorageError::from))
            .transpose()
    }
}
