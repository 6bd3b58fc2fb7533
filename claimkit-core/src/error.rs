//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised while scanning and decoding a multi-part credential transfer.
///
/// Every variant aborts only the current scan session; the caller resets and retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum DecodeError {
    /// The scanned text matches neither the legacy nor the fountain fragment shape.
    #[error("unrecognized_fragment")]
    UnrecognizedFragment,
    /// The fragment has a recognized shape but cannot join the bound session.
    #[error("invalid_fragment: {reason}")]
    InvalidFragment {
        /// Why the fragment was rejected.
        reason: String,
    },
    /// A result was requested before the codec completed.
    #[error("not_ready")]
    NotReady,
    /// The reassembled payload is not a valid raw-deflate stream.
    #[error("inflate_failed: {0}")]
    InflateFailed(String),
    /// The inflated payload is not a CBOR envelope.
    #[error("malformed_envelope: {0}")]
    MalformedEnvelope(String),
    /// The envelope declares an unknown format or carries no signed token.
    #[error("unsupported_format: {0}")]
    UnsupportedFormat(String),
}

impl DecodeError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidFragment {
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the durable key-value layer.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum StorageError {
    /// Errors coming from the blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A storage lock was poisoned by a panicking writer.
    #[error("storage lock error: {0}")]
    Lock(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::BlobStore(error.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Error outputs from `ClaimKit`
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ClaimKitError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid
        attribute: String,
        /// The reason the input is invalid
        reason: String,
    },
    /// The claim link or ticket token is not acceptable
    #[error("invalid_ticket: {0}")]
    InvalidTicket(String),
    /// No API base or auth token is configured for the remote claim queue
    #[error("no_server_config")]
    NoServerConfig,
    /// A call to a remote service failed at the network or HTTP level
    #[error("remote_unavailable: {url} ({status:?}): {error}")]
    RemoteUnavailable {
        /// The URL of the request
        url: String,
        /// The HTTP status code of the response, if any
        status: Option<u16>,
        /// The error message
        error: String,
    },
    /// Direct retrieval of a single ticket failed
    #[error("ticket_fetch_failed_{token}: {reason}")]
    TicketFetchFailed {
        /// The ticket token
        token: String,
        /// Why the fetch did not yield a credential
        reason: String,
    },
    /// Unexpected error serializing information
    #[error("serialization_error: {error}")]
    SerializationError {
        /// The error message
        error: String,
    },
    /// Scan decoding failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Durable storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for ClaimKitError {
    fn from(error: reqwest::Error) -> Self {
        Self::RemoteUnavailable {
            url: error
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: error.status().map(|status| status.as_u16()),
            error: error.to_string(),
        }
    }
}
