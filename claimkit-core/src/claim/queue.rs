//! The offline-first claim queue and its two-tier redemption.

use std::collections::HashSet;
use std::sync::Arc;

use strum::Display;
use tokio::sync::Mutex;

use crate::config::RemoteConfig;
use crate::credential::Credential;
use crate::error::ClaimKitError;
use crate::http_request::Request;
use crate::storage::{AtomicBlobStore, CredentialStore};

use super::remote::{ClaimPayload, RemoteQueueClient, RemoteTicket};
use super::store::TicketStore;
use super::ticket::{unix_now, ClaimTicket};

/// Which redemption tier produced a [`RedeemSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RedeemTier {
    /// The remote service redeemed its queue in one batch call.
    RemoteBatch,
    /// The remote tier was unavailable; each local ticket was fetched directly.
    DirectFallback,
}

/// A ticket that stayed queued, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketFailure {
    /// The ticket token.
    pub token: String,
    /// Human-readable cause.
    pub reason: String,
}

/// The result of one [`ClaimQueue::redeem_all`] run.
///
/// Per-ticket failures are soft: the ticket stays queued for the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemSummary {
    /// The tier that ran.
    pub tier: RedeemTier,
    /// Tokens whose credential was handed to the caller and removed locally.
    pub redeemed: Vec<String>,
    /// Tokens that could not be redeemed this time.
    pub failures: Vec<TicketFailure>,
    /// Tokens dropped because they expired before redemption.
    pub expired: Vec<String>,
    /// Tickets still queued locally after the run.
    pub remaining: usize,
}

impl RedeemSummary {
    const fn new(tier: RedeemTier, expired: Vec<String>) -> Self {
        Self {
            tier,
            redeemed: Vec::new(),
            failures: Vec::new(),
            expired,
            remaining: 0,
        }
    }

    /// Whether some tickets were redeemed and others were not.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.redeemed.is_empty() && !self.failures.is_empty()
    }

    fn fail(&mut self, token: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("ticket {token} stays queued: {reason}");
        self.failures.push(TicketFailure {
            token: token.to_string(),
            reason,
        });
    }
}

/// Result of [`ClaimQueue::add_ticket_and_try_redeem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// At least one credential was obtained.
    Redeemed(RedeemSummary),
    /// Nothing could be redeemed yet; the ticket stays queued for a later run.
    Deferred(RedeemSummary),
}

/// The offline-first queue of claim tickets.
///
/// Tickets are always written locally first. Redemption pushes the local
/// queue to the remote service, tries its batch endpoint, and only when that
/// tier is unavailable fetches every local ticket directly. Local tickets the
/// batch did not answer for are reported as failures. Runs of [`ClaimQueue::redeem_all`] are
/// serialized: a second caller waits for the first to finish.
pub struct ClaimQueue {
    tickets: TicketStore,
    remote: RemoteQueueClient,
    redeem_lock: Mutex<()>,
}

impl std::fmt::Debug for ClaimQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimQueue").finish_non_exhaustive()
    }
}

impl ClaimQueue {
    /// Opens the queue persisted in `blobs`.
    #[must_use]
    pub fn new(blobs: Arc<dyn AtomicBlobStore>, request: Request) -> Self {
        Self {
            tickets: TicketStore::new(blobs),
            remote: RemoteQueueClient::new(request),
            redeem_lock: Mutex::new(()),
        }
    }

    /// Queues `ticket` locally, then mirrors it to the remote queue if configured.
    ///
    /// Mirror failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local write fails.
    pub async fn enqueue(
        &self,
        ticket: &ClaimTicket,
        remote: Option<&RemoteConfig>,
    ) -> Result<(), ClaimKitError> {
        self.tickets.upsert(ticket)?;
        log::info!("queued claim ticket {}", ticket.token);

        if let Some(config) = remote {
            let mirrored = self.remote.enqueue(config, ticket).await;
            if let Err(e) = mirrored {
                log::warn!("remote mirror of ticket {} failed: {e}", ticket.token);
            }
        }
        Ok(())
    }

    /// Tickets currently queued locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the local queue cannot be read.
    pub fn pending(&self) -> Result<Vec<ClaimTicket>, ClaimKitError> {
        Ok(self.tickets.list()?)
    }

    /// Redeems every queued ticket, handing each credential to `on_credential`.
    ///
    /// A ticket is removed from the local queue only after `on_credential`
    /// accepted its credential. `on_credential` must be idempotent since a
    /// ticket can be redeemed again after an ambiguous failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local queue cannot be read or written.
    /// Remote and per-ticket failures are reported in the summary.
    pub async fn redeem_all<F>(
        &self,
        remote: Option<&RemoteConfig>,
        mut on_credential: F,
    ) -> Result<RedeemSummary, ClaimKitError>
    where
        F: FnMut(Credential) -> Result<(), ClaimKitError> + Send,
    {
        let _running = self.redeem_lock.lock().await;

        let expired = self.tickets.purge_expired(unix_now())?;
        for token in &expired {
            log::info!("dropped expired claim ticket {token}");
        }

        let batch = match remote {
            Some(config) => {
                // Tickets queued offline, or whose mirror failed, are unknown remotely.
                if let Err(e) = self.mirror_all(config).await {
                    log::warn!("could not push local queue before redemption: {e}");
                }
                self.remote.redeem_all(config).await
            }
            None => Err(ClaimKitError::NoServerConfig),
        };

        let mut summary = match batch {
            Ok(response) => {
                log::info!(
                    "remote redeemed {} of {} tickets",
                    response.results.iter().filter(|r| r.ok).count(),
                    response.count
                );
                let mut summary = RedeemSummary::new(RedeemTier::RemoteBatch, expired);
                let mut answered = HashSet::new();
                for result in response.results {
                    answered.insert(result.token.clone());
                    match result.payload.filter(|_| result.ok) {
                        Some(payload) => {
                            self.accept(&result.token, &payload, &mut on_credential, &mut summary)?;
                        }
                        None => summary.fail(&result.token, "remote did not redeem the ticket"),
                    }
                }
                for ticket in self.tickets.list()? {
                    if !answered.contains(&ticket.token) {
                        summary.fail(&ticket.token, "remote queue does not hold the ticket");
                    }
                }
                summary
            }
            Err(e) => {
                log::info!("remote redemption unavailable, fetching tickets directly: {e}");
                let mut summary = RedeemSummary::new(RedeemTier::DirectFallback, expired);
                for ticket in self.tickets.list()? {
                    match self.remote.fetch_direct(&ticket).await {
                        Ok(payload) => {
                            self.accept(&ticket.token, &payload, &mut on_credential, &mut summary)?;
                        }
                        Err(e) => summary.fail(&ticket.token, e.to_string()),
                    }
                }
                summary
            }
        };

        summary.remaining = self.tickets.list()?.len();
        Ok(summary)
    }

    /// [`ClaimQueue::redeem_all`] inserting every credential into `store`.
    ///
    /// # Errors
    ///
    /// See [`ClaimQueue::redeem_all`].
    pub async fn redeem_into(
        &self,
        remote: Option<&RemoteConfig>,
        store: &CredentialStore,
    ) -> Result<RedeemSummary, ClaimKitError> {
        self.redeem_all(remote, |credential| {
            store.insert(&credential)?;
            Ok(())
        })
        .await
    }

    /// Queues `ticket` and immediately tries to redeem the whole queue.
    ///
    /// # Errors
    ///
    /// Returns an error only if local persistence fails.
    pub async fn add_ticket_and_try_redeem<F>(
        &self,
        ticket: &ClaimTicket,
        remote: Option<&RemoteConfig>,
        on_credential: F,
    ) -> Result<ClaimOutcome, ClaimKitError>
    where
        F: FnMut(Credential) -> Result<(), ClaimKitError> + Send,
    {
        self.enqueue(ticket, remote).await?;
        let summary = self.redeem_all(remote, on_credential).await?;
        if summary.redeemed.is_empty() {
            log::info!("claim ticket {} deferred", ticket.token);
            Ok(ClaimOutcome::Deferred(summary))
        } else {
            Ok(ClaimOutcome::Redeemed(summary))
        }
    }

    /// Pushes every local ticket to the remote queue in one `enqueue-batch` call.
    ///
    /// Returns the number of tickets sent.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig`, `RemoteUnavailable`, or a local read error.
    pub async fn mirror_all(&self, remote: &RemoteConfig) -> Result<usize, ClaimKitError> {
        let tickets = self.tickets.list()?;
        if tickets.is_empty() {
            return Ok(0);
        }
        self.remote.enqueue_batch(remote, &tickets).await?;
        Ok(tickets.len())
    }

    /// Tickets the remote queue currently holds.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig` or `RemoteUnavailable`.
    pub async fn remote_tickets(
        &self,
        remote: &RemoteConfig,
    ) -> Result<Vec<RemoteTicket>, ClaimKitError> {
        self.remote.list(remote).await
    }

    fn accept<F>(
        &self,
        token: &str,
        payload: &ClaimPayload,
        on_credential: &mut F,
        summary: &mut RedeemSummary,
    ) -> Result<(), ClaimKitError>
    where
        F: FnMut(Credential) -> Result<(), ClaimKitError>,
    {
        let Some(jws) = payload.signed_token() else {
            summary.fail(token, "payload carries no signed token");
            return Ok(());
        };

        if let Err(e) = on_credential(Credential::from_jws(jws, payload.digest.clone())) {
            summary.fail(token, format!("credential not accepted: {e}"));
            return Ok(());
        }

        self.tickets.remove(token)?;
        log::info!("redeemed claim ticket {token}");
        summary.redeemed.push(token.to_string());
        Ok(())
    }
}
