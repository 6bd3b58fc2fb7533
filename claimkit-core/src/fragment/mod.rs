//! Multi-part QR fragments and the codecs that reassemble them.
//!
//! A credential too large for one QR code is displayed as a cycling sequence
//! of fragment codes. Two encoding families are in use:
//!
//! - **Legacy** `ur:<type>/<k>of<n>/<hex>`: the payload is cut into `n` slices,
//!   fragment `k` carries slice `k`. Complete once every slice has been seen.
//! - **Fountain** `ur:<type>/<seq>-<k>/<hex>`: `RaptorQ` encoding packets of the
//!   payload. Any sufficiently large set of distinct packets reconstructs it,
//!   so the display can cycle through an unbounded stream of repair symbols.
//!
//! The family is fixed by the first fragment that classifies; see
//! [`FragmentCodec::bind`].

use regex::Regex;
use strum::{Display, EnumString};

use crate::config::DEFAULT_FRAGMENT_SCHEME;
use crate::error::DecodeError;

pub mod encode;
mod fountain;
mod legacy;

pub use fountain::FountainCodec;
pub use legacy::LegacyCodec;

/// Upper bound on declared part/symbol counts, well above anything a QR animation carries.
pub(crate) const MAX_PARTS: u32 = 4096;

/// The multi-part encoding family of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Family {
    /// Numbered `k of n` slices.
    #[strum(serialize = "legacy-k-of-n")]
    Legacy,
    /// Rateless `RaptorQ` packets.
    #[strum(serialize = "fountain")]
    Fountain,
}

/// A single scanned fragment, parsed but not yet ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    raw: String,
    normalized: String,
    family: Family,
    kind: String,
    index: u32,
    total: u32,
    payload: String,
}

impl Fragment {
    /// The text as delivered by the camera layer.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Trimmed, lower-cased text with all whitespace removed. Used as the dedup key.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The family this fragment's shape belongs to.
    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }

    /// The declared payload type, e.g. `bytes` or `vc-envelope`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Part number (legacy) or sequence number (fountain), 1-based.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Declared part count (legacy) or source-symbol count (fountain).
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Decodes the hex payload segment.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] if the segment is not valid hex.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        hex::decode(&self.payload)
            .map_err(|e| DecodeError::invalid(format!("payload is not hex: {e}")))
    }
}

/// Normalizes scanned text: trims, lower-cases and strips every whitespace character.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Recognizes fragment shapes for one URI scheme.
#[derive(Debug, Clone)]
pub struct FragmentParser {
    legacy: Regex,
    fountain: Regex,
}

impl Default for FragmentParser {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_SCHEME)
    }
}

impl FragmentParser {
    /// Builds a parser for fragments of the form `<scheme>:<type>/<descriptor>/<payload>`.
    #[must_use]
    pub fn new(scheme: &str) -> Self {
        let scheme = regex::escape(&normalize(scheme));
        // Both patterns are built from an escaped literal and fixed syntax, so they always compile.
        let build = |descriptor: &str| {
            Regex::new(&format!(
                r"^{scheme}:([a-z0-9-]+)/(\d+){descriptor}(\d+)/([a-z0-9].*)$"
            ))
            .unwrap_or_else(|e| unreachable!("fragment pattern must compile: {e}"))
        };

        Self {
            legacy: build("of"),
            fountain: build("-"),
        }
    }

    /// Returns the family of `raw`, or `None` if it is not a fragment.
    #[must_use]
    pub fn classify(&self, raw: &str) -> Option<Family> {
        let normalized = normalize(raw);
        if self.legacy.is_match(&normalized) {
            Some(Family::Legacy)
        } else if self.fountain.is_match(&normalized) {
            Some(Family::Fountain)
        } else {
            None
        }
    }

    /// Parses `raw` into a [`Fragment`].
    ///
    /// # Errors
    ///
    /// - [`DecodeError::UnrecognizedFragment`] if neither family matches.
    /// - [`DecodeError::InvalidFragment`] if the descriptor numbers are out of range.
    pub fn parse(&self, raw: &str) -> Result<Fragment, DecodeError> {
        let normalized = normalize(raw);
        let (family, captures) = if let Some(captures) = self.legacy.captures(&normalized) {
            (Family::Legacy, captures)
        } else if let Some(captures) = self.fountain.captures(&normalized) {
            (Family::Fountain, captures)
        } else {
            return Err(DecodeError::UnrecognizedFragment);
        };

        let number = |i: usize| -> Result<u32, DecodeError> {
            captures[i]
                .parse::<u32>()
                .map_err(|_| DecodeError::invalid("descriptor number out of range"))
        };
        let index = number(2)?;
        let total = number(3)?;
        if total == 0 || total > MAX_PARTS {
            return Err(DecodeError::invalid(format!("declared total {total} out of range")));
        }
        if index == 0 || (family == Family::Legacy && index > total) {
            return Err(DecodeError::invalid(format!("part {index} out of range")));
        }

        let kind = captures[1].to_string();
        let payload = captures[4].to_string();
        Ok(Fragment {
            raw: raw.to_string(),
            normalized,
            family,
            kind,
            index,
            total,
            payload,
        })
    }
}

/// The reassembly state for one logical transfer, bound to exactly one family.
#[derive(Debug)]
pub enum FragmentCodec {
    /// `k of n` reassembly.
    Legacy(LegacyCodec),
    /// `RaptorQ` reassembly.
    Fountain(FountainCodec),
}

impl FragmentCodec {
    /// Creates a codec for the family of `first` and ingests it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] if `first` cannot start a transfer.
    pub fn bind(first: &Fragment) -> Result<Self, DecodeError> {
        let mut codec = match first.family() {
            Family::Legacy => Self::Legacy(LegacyCodec::new(first.kind(), first.total())),
            Family::Fountain => Self::Fountain(FountainCodec::from_first(first)?),
        };
        codec.ingest(first)?;
        Ok(codec)
    }

    /// The family this codec is bound to.
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::Legacy(_) => Family::Legacy,
            Self::Fountain(_) => Family::Fountain,
        }
    }

    /// Adds a fragment to the transfer. Duplicates are harmless no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] if the fragment belongs to another
    /// family, another payload type or another transfer, or its payload is corrupt.
    pub fn ingest(&mut self, fragment: &Fragment) -> Result<(), DecodeError> {
        if fragment.family() != self.family() {
            return Err(DecodeError::invalid(format!(
                "session is bound to {} but fragment is {}",
                self.family(),
                fragment.family()
            )));
        }
        match self {
            Self::Legacy(codec) => codec.ingest(fragment),
            Self::Fountain(codec) => codec.ingest(fragment),
        }
    }

    /// Whether the payload can be extracted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Legacy(codec) => codec.is_complete(),
            Self::Fountain(codec) => codec.is_complete(),
        }
    }

    /// Completion estimate in `0..=100`.
    #[must_use]
    pub fn progress(&self) -> u8 {
        match self {
            Self::Legacy(codec) => codec.progress(),
            Self::Fountain(codec) => codec.progress(),
        }
    }

    /// Returns the reassembled (still compressed) payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotReady`] if the codec is not complete.
    pub fn extract_result(&self) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::Legacy(codec) => codec.extract_result(),
            Self::Fountain(codec) => codec.extract_result(),
        }
    }
}

/// Progress in percent, rounded down and clamped to `0..=cap`.
pub(crate) fn percent(have: usize, need: usize, cap: u8) -> u8 {
    if need == 0 {
        return cap;
    }
    let pct = (have.saturating_mul(100) / need).min(usize::from(cap));
    u8::try_from(pct).unwrap_or(cap)
}
