//! Issuer-side fragment generation.
//!
//! Produces the frame sequence an issuer display cycles through. The wallet
//! never needs this at runtime; it exists so transfers can be generated for
//! tests, demos and the developer CLI.

use raptorq::Encoder;

use crate::error::ClaimKitError;

use super::fountain::MAX_TRANSFER_LENGTH;
use super::{normalize, MAX_PARTS};

fn check_inputs(scheme: &str, kind: &str, payload: &[u8]) -> Result<(String, String), ClaimKitError> {
    let valid_label = |label: &str| {
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    let scheme = normalize(scheme);
    let kind = normalize(kind);
    if !valid_label(&scheme) || !valid_label(&kind) {
        return Err(ClaimKitError::InvalidInput {
            attribute: "kind".to_string(),
            reason: format!("{scheme}:{kind} is not a valid fragment prefix"),
        });
    }
    if payload.is_empty() {
        return Err(ClaimKitError::InvalidInput {
            attribute: "payload".to_string(),
            reason: "payload is empty".to_string(),
        });
    }
    Ok((scheme, kind))
}

fn too_many_parts(count: usize) -> ClaimKitError {
    ClaimKitError::InvalidInput {
        attribute: "payload".to_string(),
        reason: format!("payload needs {count} parts, limit is {MAX_PARTS}"),
    }
}

/// Splits `payload` into `ur:<kind>/<k>of<n>/<hex>` fragments of at most `part_size` bytes.
///
/// # Errors
///
/// Returns [`ClaimKitError::InvalidInput`] for an empty payload, a zero part size,
/// an invalid scheme or kind, or a payload needing more than the supported part count.
pub fn legacy_fragments(
    scheme: &str,
    kind: &str,
    payload: &[u8],
    part_size: usize,
) -> Result<Vec<String>, ClaimKitError> {
    let (scheme, kind) = check_inputs(scheme, kind, payload)?;
    if part_size == 0 {
        return Err(ClaimKitError::InvalidInput {
            attribute: "part_size".to_string(),
            reason: "part size must be positive".to_string(),
        });
    }

    let total = payload.len().div_ceil(part_size);
    if total > MAX_PARTS as usize {
        return Err(too_many_parts(total));
    }

    Ok(payload
        .chunks(part_size)
        .enumerate()
        .map(|(i, chunk)| format!("{scheme}:{kind}/{}of{total}/{}", i + 1, hex::encode(chunk)))
        .collect())
}

/// Encodes `payload` as `RaptorQ` packets, every source symbol followed by `repair`
/// repair symbols, each rendered as `ur:<kind>/<seq>-<k>/<hex>`.
///
/// `symbol_size` is rounded down to the `RaptorQ` symbol alignment.
///
/// # Errors
///
/// Returns [`ClaimKitError::InvalidInput`] for an empty or oversized payload, a
/// symbol size below the alignment, or an invalid scheme or kind.
pub fn fountain_fragments(
    scheme: &str,
    kind: &str,
    payload: &[u8],
    symbol_size: u16,
    repair: u32,
) -> Result<Vec<String>, ClaimKitError> {
    let (scheme, kind) = check_inputs(scheme, kind, payload)?;
    if symbol_size < 8 {
        return Err(ClaimKitError::InvalidInput {
            attribute: "symbol_size".to_string(),
            reason: "symbol size must be at least 8 bytes".to_string(),
        });
    }
    if payload.len() as u64 > MAX_TRANSFER_LENGTH {
        return Err(ClaimKitError::InvalidInput {
            attribute: "payload".to_string(),
            reason: format!("payload exceeds {MAX_TRANSFER_LENGTH} bytes"),
        });
    }

    let encoder = Encoder::with_defaults(payload, symbol_size);
    let oti = encoder.get_config();
    let source_symbols = oti
        .transfer_length()
        .div_ceil(u64::from(oti.symbol_size()));
    if source_symbols > u64::from(MAX_PARTS) {
        return Err(too_many_parts(usize::try_from(source_symbols).unwrap_or(usize::MAX)));
    }
    let oti = oti.serialize();

    Ok(encoder
        .get_encoded_packets(repair)
        .into_iter()
        .enumerate()
        .map(|(i, packet)| {
            let mut bytes = oti.to_vec();
            bytes.extend_from_slice(&packet.serialize());
            format!(
                "{scheme}:{kind}/{}-{source_symbols}/{}",
                i + 1,
                hex::encode(bytes)
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{Family, FragmentParser};

    #[test]
    fn test_legacy_fragment_shape() {
        let fragments = legacy_fragments("UR", "vc-envelope", b"\x01\x02\x03", 2).unwrap();
        assert_eq!(
            fragments,
            vec!["ur:vc-envelope/1of2/0102", "ur:vc-envelope/2of2/03"]
        );
    }

    #[test]
    fn test_fountain_fragments_classify() {
        let fragments = fountain_fragments("ur", "bytes", &[7u8; 100], 16, 3).unwrap();
        let parser = FragmentParser::default();
        // 100 bytes in 16-byte symbols: 7 source symbols plus 3 repair.
        assert_eq!(fragments.len(), 10);
        for (i, raw) in fragments.iter().enumerate() {
            let fragment = parser.parse(raw).unwrap();
            assert_eq!(fragment.family(), Family::Fountain);
            assert_eq!(fragment.index() as usize, i + 1);
            assert_eq!(fragment.total(), 7);
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(legacy_fragments("ur", "bytes", b"", 4).is_err());
        assert!(legacy_fragments("ur", "bytes", b"abc", 0).is_err());
        assert!(legacy_fragments("ur", "by/tes", b"abc", 4).is_err());
        assert!(fountain_fragments("ur", "bytes", b"abc", 4, 0).is_err());
    }
}
