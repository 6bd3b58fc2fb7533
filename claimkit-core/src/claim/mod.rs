//! Offline-first redemption of static claim links.
//!
//! A claim link (`https://<issuer>/c/<token>`) becomes a [`ClaimTicket`] that is
//! persisted locally before anything else happens. [`ClaimQueue`] then drains the
//! queue into the wallet's credential store through the remote claim-queue
//! service, or directly from each ticket's URL when the service is unreachable.

mod queue;
mod remote;
mod store;
mod ticket;

pub use queue::{ClaimOutcome, ClaimQueue, RedeemSummary, RedeemTier, TicketFailure};
pub use remote::{ClaimPayload, RedeemAllResponse, RedeemResult, RemoteQueueClient, RemoteTicket};
pub use store::TicketStore;
pub use ticket::{unix_now, ClaimTicket};
