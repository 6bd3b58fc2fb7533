//! The durable local ticket list.

use std::sync::{Arc, Mutex};

use crate::error::{StorageError, StorageResult};
use crate::storage::keys::CLAIM_QUEUE_BLOB;
use crate::storage::AtomicBlobStore;

use super::ticket::ClaimTicket;

/// Tickets persisted as one JSON list, rewritten atomically on every change.
pub struct TicketStore {
    blobs: Arc<dyn AtomicBlobStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for TicketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketStore").finish_non_exhaustive()
    }
}

impl TicketStore {
    /// Opens the ticket list in `blobs`.
    #[must_use]
    pub fn new(blobs: Arc<dyn AtomicBlobStore>) -> Self {
        Self {
            blobs,
            lock: Mutex::new(()),
        }
    }

    /// Inserts `ticket`, replacing the url and expiry of an existing ticket with
    /// the same token. The replaced ticket keeps its queue position.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be read or written.
    pub fn upsert(&self, ticket: &ClaimTicket) -> StorageResult<()> {
        self.modify(|tickets| {
            match tickets.iter_mut().find(|t| t.token == ticket.token) {
                Some(existing) => {
                    existing.url.clone_from(&ticket.url);
                    existing.expires_at = ticket.expires_at;
                    existing.saved_at = ticket.saved_at;
                }
                None => tickets.push(ticket.clone()),
            }
            true
        })
    }

    /// Removes the ticket with `token`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be read or written.
    pub fn remove(&self, token: &str) -> StorageResult<bool> {
        let mut removed = false;
        self.modify(|tickets| {
            let before = tickets.len();
            tickets.retain(|t| t.token != token);
            removed = tickets.len() != before;
            removed
        })?;
        Ok(removed)
    }

    /// Removes every ticket expired at `now`, returning their tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be read or written.
    pub fn purge_expired(&self, now: u64) -> StorageResult<Vec<String>> {
        let mut expired = Vec::new();
        self.modify(|tickets| {
            tickets.retain(|t| {
                if t.is_expired(now) {
                    expired.push(t.token.clone());
                    false
                } else {
                    true
                }
            });
            !expired.is_empty()
        })?;
        Ok(expired)
    }

    /// All queued tickets in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be read.
    pub fn list(&self) -> StorageResult<Vec<ClaimTicket>> {
        let _guard = self.guard()?;
        self.load()
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<ClaimTicket>) -> bool) -> StorageResult<()> {
        let _guard = self.guard()?;
        let mut tickets = self.load()?;
        if f(&mut tickets) {
            self.blobs
                .write_atomic(CLAIM_QUEUE_BLOB, &serde_json::to_vec(&tickets)?)?;
        }
        Ok(())
    }

    fn guard(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| StorageError::Lock("ticket store poisoned".to_string()))
    }

    fn load(&self) -> StorageResult<Vec<ClaimTicket>> {
        self.blobs
            .read(CLAIM_QUEUE_BLOB)?
            .map_or_else(|| Ok(Vec::new()), |bytes| Ok(serde_json::from_slice(&bytes)?))
    }
}
