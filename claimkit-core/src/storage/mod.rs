//! Durable local state: the blob store abstraction, the credential store, and
//! the blob naming scheme shared with the claim queue.
//!
//! Layout inside a blob store:
//!
//! - `claim_queue.json`: pending claim tickets
//! - `credential_index.json`: credential ids, newest first
//! - `credentials/<safe-id>.json`: one record per credential

mod blob_store;
mod credential_store;
pub mod keys;

pub use blob_store::{AtomicBlobStore, FsBlobStore, MemoryBlobStore};
pub use credential_store::CredentialStore;
