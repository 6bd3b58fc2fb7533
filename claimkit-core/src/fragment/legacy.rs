//! `k of n` reassembly.

use crate::error::DecodeError;

use super::{percent, Fragment};

/// Collects numbered slices until all `n` are present.
#[derive(Debug, Clone)]
pub struct LegacyCodec {
    kind: String,
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl LegacyCodec {
    /// Creates an empty codec for a transfer of `total` parts of type `kind`.
    #[must_use]
    pub fn new(kind: &str, total: u32) -> Self {
        Self {
            kind: kind.to_string(),
            parts: vec![None; total as usize],
            received: 0,
        }
    }

    /// Stores the fragment's slice. A part that was already received is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] on a type or total mismatch or a
    /// payload that is not hex.
    pub fn ingest(&mut self, fragment: &Fragment) -> Result<(), DecodeError> {
        if fragment.kind() != self.kind {
            return Err(DecodeError::invalid(format!(
                "payload type {} does not match {}",
                fragment.kind(),
                self.kind
            )));
        }
        if fragment.total() as usize != self.parts.len() {
            return Err(DecodeError::invalid(format!(
                "declared {} parts but transfer has {}",
                fragment.total(),
                self.parts.len()
            )));
        }

        let slot = (fragment.index() as usize)
            .checked_sub(1)
            .and_then(|i| self.parts.get_mut(i))
            .ok_or_else(|| DecodeError::invalid(format!("part {} out of range", fragment.index())))?;
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(fragment.payload_bytes()?);
        self.received += 1;
        Ok(())
    }

    /// Whether every part has been received.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received == self.parts.len()
    }

    /// Share of parts received, in percent.
    #[must_use]
    pub fn progress(&self) -> u8 {
        percent(self.received, self.parts.len(), 100)
    }

    /// Part numbers still missing, 1-based.
    pub fn missing(&self) -> impl Iterator<Item = usize> + '_ {
        self.parts
            .iter()
            .enumerate()
            .filter(|(_, part)| part.is_none())
            .map(|(i, _)| i + 1)
    }

    /// Concatenates the parts in order.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotReady`] if any part is missing.
    pub fn extract_result(&self) -> Result<Vec<u8>, DecodeError> {
        if !self.is_complete() {
            return Err(DecodeError::NotReady);
        }
        Ok(self.parts.iter().flatten().flatten().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    use super::*;
    use crate::fragment::{encode::legacy_fragments, FragmentCodec, FragmentParser};

    fn codec_for(fragments: &[String]) -> FragmentCodec {
        let parser = FragmentParser::default();
        let mut iter = fragments.iter().map(|raw| parser.parse(raw).unwrap());
        let mut codec = FragmentCodec::bind(&iter.next().unwrap()).unwrap();
        for fragment in iter {
            codec.ingest(&fragment).unwrap();
        }
        codec
    }

    #[test]
    fn test_in_order_reassembly() {
        let payload: Vec<u8> = (0..=255).collect();
        let fragments = legacy_fragments("ur", "bytes", &payload, 40).unwrap();
        assert_eq!(fragments.len(), 7);

        let codec = codec_for(&fragments);
        assert!(codec.is_complete());
        assert_eq!(codec.progress(), 100);
        assert_eq!(codec.extract_result().unwrap(), payload);
    }

    #[test]
    fn test_any_permutation_with_repeats_yields_same_payload() {
        let payload: Vec<u8> = (0..500u16).map(|i| (i * 7 % 251) as u8).collect();
        let fragments = legacy_fragments("ur", "bytes", &payload, 32).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let mut stream = fragments.clone();
            for _ in 0..rng.gen_range(0..30) {
                let repeat = fragments[rng.gen_range(0..fragments.len())].clone();
                stream.push(repeat);
            }
            stream.shuffle(&mut rng);

            let codec = codec_for(&stream);
            assert_eq!(codec.extract_result().unwrap(), payload);
        }
    }

    #[test]
    fn test_not_ready_until_all_parts() {
        let fragments = legacy_fragments("ur", "bytes", b"abcdefghij", 4).unwrap();
        let codec = codec_for(&fragments[..2]);
        assert!(!codec.is_complete());
        assert_eq!(codec.progress(), 66);
        assert_eq!(codec.extract_result(), Err(DecodeError::NotReady));

        let FragmentCodec::Legacy(legacy) = codec else {
            panic!("expected legacy codec");
        };
        assert_eq!(legacy.missing().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_rejects_mismatched_total_and_type() {
        let parser = FragmentParser::default();
        let mut codec = FragmentCodec::bind(&parser.parse("ur:bytes/1of3/aa").unwrap()).unwrap();

        let other_total = codec.ingest(&parser.parse("ur:bytes/2of4/bb").unwrap());
        assert!(matches!(other_total, Err(DecodeError::InvalidFragment { .. })));

        let other_type = codec.ingest(&parser.parse("ur:psbt/2of3/bb").unwrap());
        assert!(matches!(other_type, Err(DecodeError::InvalidFragment { .. })));
    }

    #[test]
    fn test_duplicate_part_keeps_first_payload() {
        let parser = FragmentParser::default();
        let mut codec = FragmentCodec::bind(&parser.parse("ur:bytes/1of2/aa").unwrap()).unwrap();
        codec.ingest(&parser.parse("ur:bytes/1of2/ff").unwrap()).unwrap();
        codec.ingest(&parser.parse("ur:bytes/2of2/bb").unwrap()).unwrap();
        assert_eq!(codec.extract_result().unwrap(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_non_hex_payload_is_invalid() {
        let parser = FragmentParser::default();
        let err = FragmentCodec::bind(&parser.parse("ur:bytes/1of2/zz").unwrap()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFragment { .. }));
    }
}
