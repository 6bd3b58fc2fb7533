//! Tunables for scanning and networking.

use std::time::Duration;

use crate::error::ClaimKitError;

/// URI scheme shared by both fragment families.
pub const DEFAULT_FRAGMENT_SCHEME: &str = "ur";

/// Timing and window parameters of a [`crate::scan::ScanSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Fragments observed within this window of the previous accepted fragment are ignored.
    pub cooldown: Duration,
    /// Number of distinct accepted fragments remembered for de-duplication.
    pub dedup_window: usize,
    /// Time without a new fragment after which a partially complete session reports a stall.
    pub stall_after: Duration,
    /// Overall wall-clock budget of one session before it is treated as stalled.
    pub session_budget: Duration,
    /// How long an errored session is shown before it is reset.
    pub error_reset_delay: Duration,
    /// URI scheme fragments must carry.
    pub scheme: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(180),
            dedup_window: 256,
            stall_after: Duration::from_millis(2500),
            session_budget: Duration::from_secs(7),
            error_reset_delay: Duration::from_millis(900),
            scheme: DEFAULT_FRAGMENT_SCHEME.to_string(),
        }
    }
}

impl ScanConfig {
    /// Overrides the accept cooldown.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Overrides the de-duplication window size. A window of zero is raised to one.
    #[must_use]
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window.max(1);
        self
    }

    /// Overrides the stall threshold.
    #[must_use]
    pub const fn with_stall_after(mut self, stall_after: Duration) -> Self {
        self.stall_after = stall_after;
        self
    }

    /// Overrides the session budget.
    #[must_use]
    pub const fn with_session_budget(mut self, budget: Duration) -> Self {
        self.session_budget = budget;
        self
    }

    /// Overrides the fragment scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.trim().to_ascii_lowercase();
        self
    }
}

/// Connection details for the remote claim-queue service.
///
/// Both values are optional because a holder may use the wallet without an
/// account; every remote call then fails fast with [`ClaimKitError::NoServerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the claim-queue API, e.g. `https://api.example.org/claim-queue`.
    pub api_base: Option<String>,
    /// Bearer token for the holder's session.
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    /// Creates a complete remote configuration.
    #[must_use]
    pub fn new(api_base: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            api_base: Some(api_base.into()),
            auth_token: Some(auth_token.into()),
        }
    }

    /// Returns the trimmed API base and token, or `NoServerConfig` when either is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::NoServerConfig`] if the base or token is absent or blank.
    pub fn resolve(&self) -> Result<(&str, &str), ClaimKitError> {
        let base = self
            .api_base
            .as_deref()
            .map(|base| base.trim().trim_end_matches('/'))
            .filter(|base| !base.is_empty());
        let token = self
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty());

        match (base, token) {
            (Some(base), Some(token)) => Ok((base, token)),
            _ => Err(ClaimKitError::NoServerConfig),
        }
    }
}

/// Bounds applied to every outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(25),
            max_retries: 3, // total attempts = 4
        }
    }
}
