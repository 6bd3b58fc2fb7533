//! Decoding of the reassembled transfer into a credential envelope.
//!
//! Wire layout: raw deflate ( CBOR map `{ format, jws, digest? }` ).

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{Deserialize, Serialize};

use crate::error::{ClaimKitError, DecodeError};

/// The only envelope format this wallet accepts.
pub const ENVELOPE_FORMAT: &str = "vc+jws";

/// Inflated envelopes larger than this are rejected.
pub const MAX_INFLATED_LEN: u64 = 1024 * 1024;

/// A decoded credential envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Format tag, always [`ENVELOPE_FORMAT`] once validated.
    pub format: String,
    /// Compact JWS: `header.payload.signature`, base64url segments.
    pub jws: String,
    /// Issuer-supplied content digest, used as the credential id when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    jws: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

impl Envelope {
    /// Creates a `vc+jws` envelope.
    #[must_use]
    pub fn new(jws: impl Into<String>, digest: Option<String>) -> Self {
        Self {
            format: ENVELOPE_FORMAT.to_string(),
            jws: jws.into(),
            digest,
        }
    }

    /// Serializes to CBOR and compresses with raw deflate, the inverse of
    /// [`EnvelopeDecoder::decode`].
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::SerializationError`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, ClaimKitError> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor).map_err(|e| ClaimKitError::SerializationError {
            error: format!("Failed to serialize envelope: {e}"),
        })?;

        let compress_error = |e: std::io::Error| ClaimKitError::SerializationError {
            error: format!("Failed to compress envelope: {e}"),
        };
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&cbor).map_err(compress_error)?;
        encoder.finish().map_err(compress_error)
    }
}

/// Turns completed scan payloads into validated envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeDecoder;

impl EnvelopeDecoder {
    /// Inflates, deserializes and validates `bytes`.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::InflateFailed`] if `bytes` is not raw deflate or inflates past
    ///   [`MAX_INFLATED_LEN`].
    /// - [`DecodeError::MalformedEnvelope`] if the inflated bytes are not a CBOR map.
    /// - [`DecodeError::UnsupportedFormat`] if the format tag is not [`ENVELOPE_FORMAT`]
    ///   or the signed token is missing or empty.
    pub fn decode(self, bytes: &[u8]) -> Result<Envelope, DecodeError> {
        let inflated = inflate(bytes)?;

        let raw: RawEnvelope = ciborium::from_reader(inflated.as_slice())
            .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;

        let format = raw.format.unwrap_or_default();
        if format != ENVELOPE_FORMAT {
            return Err(DecodeError::UnsupportedFormat(format!(
                "format {format:?} is not {ENVELOPE_FORMAT}"
            )));
        }
        // The token is kept byte for byte: the credential id may derive from it.
        let jws = raw
            .jws
            .filter(|jws| !jws.trim().is_empty())
            .ok_or_else(|| DecodeError::UnsupportedFormat("missing signed token".to_string()))?;

        Ok(Envelope {
            format,
            jws,
            digest: raw.digest.filter(|digest| !digest.trim().is_empty()),
        })
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(bytes)
        .take(MAX_INFLATED_LEN + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| DecodeError::InflateFailed(e.to_string()))?;
    if inflated.len() as u64 > MAX_INFLATED_LEN {
        return Err(DecodeError::InflateFailed(format!(
            "inflated payload exceeds {MAX_INFLATED_LEN} bytes"
        )));
    }
    if inflated.is_empty() {
        return Err(DecodeError::InflateFailed("empty stream".to_string()));
    }
    Ok(inflated)
}

/// Decodes one base64url segment of a compact JWS.
///
/// Maps the URL-safe alphabet back to the standard one and restores `=`
/// padding to a multiple of four before decoding.
///
/// # Errors
///
/// Returns the underlying decode error if the segment is not base64url.
pub fn base64url_decode(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let mut standard: String = segment
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    STANDARD.decode(standard)
}

/// Parses the payload (middle) segment of a compact JWS as a JSON object.
///
/// Returns `None` for anything that is not three segments with a JSON object in the middle.
#[must_use]
pub fn jws_payload(jws: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let mut segments = jws.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = base64url_decode(payload).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn compress(raw: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    fn cbor(value: &ciborium::Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    fn map(entries: &[(&str, &str)]) -> ciborium::Value {
        ciborium::Value::Map(
            entries
                .iter()
                .map(|(k, v)| ((*k).into(), (*v).into()))
                .collect(),
        )
    }

    #[test]
    fn test_round_trip_preserves_jws() {
        let envelope = Envelope::new("eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ4In0.c2ln", Some("d1".into()));
        let decoded = EnvelopeDecoder.decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_keeps_token_bytes_unchanged() {
        let jws = " eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ4In0.c2ln\n";
        let bytes = compress(&cbor(&map(&[("format", "vc+jws"), ("jws", jws)])));
        let envelope = EnvelopeDecoder.decode(&bytes).unwrap();
        assert_eq!(envelope.jws.as_bytes(), jws.as_bytes());
        assert_eq!(EnvelopeDecoder.decode(&envelope.encode().unwrap()).unwrap(), envelope);
    }

    #[test]
    fn test_decodes_issuer_encoded_map() {
        let bytes = compress(&cbor(&map(&[("format", "vc+jws"), ("jws", "a.b.c")])));
        let envelope = EnvelopeDecoder.decode(&bytes).unwrap();
        assert_eq!(envelope.jws, "a.b.c");
        assert_eq!(envelope.digest, None);
    }

    #[test]
    fn test_rejects_other_format() {
        let bytes = compress(&cbor(&map(&[("format", "something-else"), ("jws", "a.b.c")])));
        assert!(matches!(
            EnvelopeDecoder.decode(&bytes),
            Err(DecodeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_missing_or_blank_jws() {
        let missing = compress(&cbor(&map(&[("format", "vc+jws")])));
        let blank = compress(&cbor(&map(&[("format", "vc+jws"), ("jws", "  ")])));
        for bytes in [missing, blank] {
            assert!(matches!(
                EnvelopeDecoder.decode(&bytes),
                Err(DecodeError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn test_not_deflate() {
        assert!(matches!(
            EnvelopeDecoder.decode(&[0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::InflateFailed(_))
        ));
    }

    #[test]
    fn test_not_a_map() {
        let bytes = compress(&cbor(&ciborium::Value::Integer(42u8.into())));
        assert!(matches!(
            EnvelopeDecoder.decode(&bytes),
            Err(DecodeError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_base64url_decode_restores_padding_and_alphabet() {
        let raw = [0xfb, 0xff, 0xfe, 0x01];
        let encoded = URL_SAFE_NO_PAD.encode(raw);
        assert!(encoded.contains('-') || encoded.contains('_'));
        assert_eq!(base64url_decode(&encoded).unwrap(), raw);
        assert_eq!(base64url_decode("aGk").unwrap(), b"hi");
        assert_eq!(base64url_decode("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_jws_payload() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"did:example:123"}"#);
        let jws = format!("eyJhbGciOiJFUzI1NiJ9.{payload}.sig");
        let claims = jws_payload(&jws).unwrap();
        assert_eq!(claims["sub"], "did:example:123");

        assert!(jws_payload("a.b.c").is_none());
        assert!(jws_payload("only.two").is_none());
        assert!(jws_payload(&format!("h.{payload}.s.extra")).is_none());
    }
}
