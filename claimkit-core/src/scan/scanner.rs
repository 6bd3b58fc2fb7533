//! Camera-facing entry point: routes scans, decodes completed transfers and stores them.

use std::sync::Arc;
use std::time::Instant;

use crate::claim::ClaimTicket;
use crate::config::ScanConfig;
use crate::credential::Credential;
use crate::envelope::EnvelopeDecoder;
use crate::error::{ClaimKitError, DecodeError};
use crate::fragment::FragmentParser;
use crate::payload::ScanPayload;
use crate::storage::CredentialStore;

use super::session::{DecodeOutcome, ScanSession, ScanStatus, SessionState};

/// What the caller should show after one scan callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The transfer is still in progress (or nothing relevant was scanned).
    Status(ScanStatus),
    /// A static claim link was scanned; queue it with a [`crate::claim::ClaimQueue`].
    ClaimLink(ClaimTicket),
    /// A credential was decoded and handed to the store.
    Stored {
        /// The decoded credential.
        credential: Credential,
        /// `false` if the store already held a credential with this id.
        inserted: bool,
    },
    /// The session failed. It resets itself once the error has been shown for
    /// [`ScanConfig::error_reset_delay`].
    Failed(DecodeError),
}

/// Drives a [`ScanSession`] from raw camera callbacks to the credential store.
#[derive(Debug)]
pub struct Scanner {
    session: ScanSession,
    parser: FragmentParser,
    decoder: EnvelopeDecoder,
    store: Arc<CredentialStore>,
}

impl Scanner {
    /// Creates a scanner inserting into `store`.
    #[must_use]
    pub fn new(config: ScanConfig, store: Arc<CredentialStore>) -> Self {
        Self {
            parser: FragmentParser::new(&config.scheme),
            session: ScanSession::new(config),
            decoder: EnvelopeDecoder,
            store,
        }
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Abandons the current transfer.
    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Processes one camera callback observed at `now`.
    ///
    /// A claim link is only reported while no fragment family is bound, so a
    /// stray link in the frame cannot interrupt a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error only if the decoded credential cannot be persisted.
    pub fn on_scan(&mut self, raw: &str, now: Instant) -> Result<ScanEvent, ClaimKitError> {
        if self.session.should_reset(now) {
            log::debug!("resetting errored scan session");
            self.session.reset();
        }

        if self.session.family().is_none() {
            if let ScanPayload::ClaimLink(ticket) = ScanPayload::classify(&self.parser, raw) {
                return Ok(ScanEvent::ClaimLink(ticket));
            }
        }

        match self.session.on_fragment_observed(raw, now) {
            SessionState::Complete => self.finish(now),
            SessionState::Errored => Ok(ScanEvent::Failed(
                self.session
                    .last_error()
                    .cloned()
                    .unwrap_or(DecodeError::NotReady),
            )),
            _ => Ok(ScanEvent::Status(self.session.status(now))),
        }
    }

    fn finish(&mut self, now: Instant) -> Result<ScanEvent, ClaimKitError> {
        let pending = self.session.completed_payload()?;
        let decoded = self.decoder.decode(&pending.bytes);

        match self.session.resolve_decode(pending.epoch, decoded, now) {
            DecodeOutcome::Accepted(envelope) => {
                let credential = Credential::from_envelope(envelope);
                let inserted = self.store.insert(&credential)?;
                Ok(ScanEvent::Stored {
                    credential,
                    inserted,
                })
            }
            DecodeOutcome::Failed(e) => Ok(ScanEvent::Failed(e)),
            DecodeOutcome::Stale => Ok(ScanEvent::Status(self.session.status(now))),
        }
    }
}
