//! Routing of raw scanner output.

use crate::claim::ClaimTicket;
use crate::fragment::{Family, FragmentParser};

/// What a single scanned code turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    /// A static claim link, to be queued for redemption.
    ClaimLink(ClaimTicket),
    /// One fragment of a multi-part transfer.
    Fragment(Family),
    /// Anything else.
    Unrelated,
}

impl ScanPayload {
    /// Classifies `raw`. Fragments take precedence over claim links.
    #[must_use]
    pub fn classify(parser: &FragmentParser, raw: &str) -> Self {
        if let Some(family) = parser.classify(raw) {
            return Self::Fragment(family);
        }
        ClaimTicket::from_claim_url(raw).map_or(Self::Unrelated, Self::ClaimLink)
    }
}
