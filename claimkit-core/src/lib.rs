//! `claimkit-core` moves verifiable credentials from an issuer's display into
//! the holder's wallet.
//!
//! Two paths feed the same [`storage::CredentialStore`]:
//!
//! - **Scanning**: an animated QR sequence is reassembled by a
//!   [`scan::ScanSession`] into a compressed envelope, decoded by
//!   [`envelope::EnvelopeDecoder`] and stored. [`scan::Scanner`] wires the
//!   pieces together.
//! - **Claiming**: a static claim link becomes a [`claim::ClaimTicket`], which the
//!   [`claim::ClaimQueue`] persists locally and later redeems through the remote
//!   claim-queue service or by fetching the ticket directly.
//!
//! Both paths insert through the same idempotent operation, so the same
//! credential arriving twice is stored once.

pub mod claim;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod fragment;
pub mod logger;
pub mod payload;
pub mod scan;
pub mod storage;

mod error;
pub use error::*;

mod http_request;
pub use http_request::Request;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("claimkit_core");
