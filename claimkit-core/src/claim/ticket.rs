use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ClaimKitError;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]{8,200}$")
        .unwrap_or_else(|e| unreachable!("token pattern must compile: {e}"))
});

static CLAIM_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/c/([A-Za-z0-9._-]{8,200})$")
        .unwrap_or_else(|e| unreachable!("claim path pattern must compile: {e}"))
});

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// A pending redemption, identified by its token.
///
/// Two tickets with the same token are the same logical claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ClaimTicket {
    /// Opaque redemption token, 8 to 200 characters of `[A-Za-z0-9._-]`.
    pub token: String,
    /// Where the credential can be fetched directly.
    pub url: String,
    /// Unix seconds after which the issuer no longer honours the ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Unix seconds when the ticket was queued locally.
    pub saved_at: u64,
}

impl ClaimTicket {
    /// Creates a ticket for `token` fetched from `url`, saved now.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::InvalidTicket`] if the token is malformed.
    pub fn new(token: impl Into<String>, url: impl Into<String>) -> Result<Self, ClaimKitError> {
        let token = token.into();
        if !TOKEN_RE.is_match(&token) {
            return Err(ClaimKitError::InvalidTicket(format!(
                "token must be 8-200 characters of [A-Za-z0-9._-], got {} characters",
                token.len()
            )));
        }
        Ok(Self {
            token,
            url: url.into(),
            expires_at: None,
            saved_at: unix_now(),
        })
    }

    /// Parses a static claim link of the form `https://<host>/c/<token>`.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::InvalidTicket`] if the text is not an https URL
    /// with a claim path.
    pub fn from_claim_url(raw: &str) -> Result<Self, ClaimKitError> {
        let raw = raw.trim();
        let url = reqwest::Url::parse(raw)
            .map_err(|e| ClaimKitError::InvalidTicket(format!("not a url: {e}")))?;
        if url.scheme() != "https" {
            return Err(ClaimKitError::InvalidTicket(format!(
                "claim links must be https, got {}",
                url.scheme()
            )));
        }
        let token = CLAIM_PATH_RE
            .captures(url.path())
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| ClaimKitError::InvalidTicket("no claim token in path".to_string()))?;

        Self::new(token.as_str(), raw)
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the ticket has expired at `now` (Unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_from_claim_url() {
        let ticket = ClaimTicket::from_claim_url(" https://h.example/c/abc123XY ").unwrap();
        assert_eq!(ticket.token, "abc123XY");
        assert_eq!(ticket.url, "https://h.example/c/abc123XY");
        assert_eq!(ticket.expires_at, None);
        assert!(ticket.saved_at > 0);
    }

    #[test_case("http://h.example/c/abc123XY" ; "plain http")]
    #[test_case("https://h.example/c/short" ; "token too short")]
    #[test_case("https://h.example/claim/abc123XY" ; "wrong path")]
    #[test_case("https://h.example/c/abc123XY/extra" ; "trailing segment")]
    #[test_case("https://h.example/c/abc%20123XY" ; "escaped character")]
    #[test_case("ur:bytes/1of2/aa" ; "fragment")]
    fn test_rejects_non_claim_urls(raw: &str) {
        assert!(matches!(
            ClaimTicket::from_claim_url(raw),
            Err(ClaimKitError::InvalidTicket(_))
        ));
    }

    #[test]
    fn test_token_length_bounds() {
        assert!(ClaimTicket::new("a".repeat(8), "https://h/c").is_ok());
        assert!(ClaimTicket::new("a".repeat(200), "https://h/c").is_ok());
        assert!(ClaimTicket::new("a".repeat(201), "https://h/c").is_err());
    }

    #[test]
    fn test_expiry() {
        let ticket = ClaimTicket::new("abc123XY", "https://h/c/abc123XY")
            .unwrap()
            .with_expiry(100);
        assert!(!ticket.is_expired(99));
        assert!(ticket.is_expired(100));

        let open = ClaimTicket::new("abc123XY", "https://h/c/abc123XY").unwrap();
        assert!(!open.is_expired(u64::MAX));
    }
}
