//! `RaptorQ` reassembly for the fountain family.
//!
//! Payload layout (before hex): the 12-byte RFC 6330 object transmission
//! information, then one serialized encoding packet (4-byte payload id and
//! the symbol). Every fragment repeats the transmission information so that
//! decoding can start from whichever fragment the camera happens to catch first.

use std::collections::HashSet;
use std::fmt;

use raptorq::{Decoder, EncodingPacket, ObjectTransmissionInformation};

use crate::error::DecodeError;

use super::{percent, Fragment};

/// Largest object a fountain transfer may declare.
pub(crate) const MAX_TRANSFER_LENGTH: u64 = 1024 * 1024;

const OTI_LEN: usize = 12;
const PAYLOAD_ID_LEN: usize = 4;

/// Feeds distinct encoding packets to a `RaptorQ` decoder until it reconstructs the object.
pub struct FountainCodec {
    kind: String,
    source_symbols: u32,
    oti: [u8; OTI_LEN],
    symbol_size: usize,
    source_blocks: u8,
    decoder: Decoder,
    received: HashSet<(u8, u32)>,
    result: Option<Vec<u8>>,
}

impl fmt::Debug for FountainCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FountainCodec")
            .field("kind", &self.kind)
            .field("source_symbols", &self.source_symbols)
            .field("received", &self.received.len())
            .field("complete", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

impl FountainCodec {
    /// Sets up a decoder from the transmission information carried by `first`.
    ///
    /// The fragment itself is not ingested.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] if the transmission information is
    /// malformed, out of bounds, or disagrees with the declared symbol count.
    pub fn from_first(first: &Fragment) -> Result<Self, DecodeError> {
        let bytes = first.payload_bytes()?;
        let (oti_bytes, _) = split_payload(&bytes)?;
        let oti = ObjectTransmissionInformation::deserialize(&oti_bytes);

        let symbol_size = usize::from(oti.symbol_size());
        let alignment = usize::from(oti.symbol_alignment());
        if symbol_size == 0 || alignment == 0 || symbol_size % alignment != 0 {
            return Err(DecodeError::invalid(format!(
                "symbol size {symbol_size} / alignment {alignment} invalid"
            )));
        }
        if oti.transfer_length() == 0 || oti.transfer_length() > MAX_TRANSFER_LENGTH {
            return Err(DecodeError::invalid(format!(
                "transfer length {} out of range",
                oti.transfer_length()
            )));
        }
        // Transfers are always sent as one source block with one sub-block.
        if oti.source_blocks() != 1 || oti.sub_blocks() != 1 {
            return Err(DecodeError::invalid(format!(
                "transfer split into {} blocks / {} sub-blocks",
                oti.source_blocks(),
                oti.sub_blocks()
            )));
        }

        let source_symbols = oti.transfer_length().div_ceil(symbol_size as u64);
        if source_symbols != u64::from(first.total()) {
            return Err(DecodeError::invalid(format!(
                "declared {} source symbols but transfer needs {source_symbols}",
                first.total()
            )));
        }

        Ok(Self {
            kind: first.kind().to_string(),
            source_symbols: first.total(),
            oti: oti_bytes,
            symbol_size,
            source_blocks: oti.source_blocks(),
            decoder: Decoder::new(oti),
            received: HashSet::new(),
            result: None,
        })
    }

    /// Hands the fragment's packet to the decoder. Packets already seen, and any
    /// packet arriving after reconstruction, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidFragment`] if the fragment belongs to another
    /// transfer or its packet does not fit the transfer's layout.
    pub fn ingest(&mut self, fragment: &Fragment) -> Result<(), DecodeError> {
        if fragment.kind() != self.kind {
            return Err(DecodeError::invalid(format!(
                "payload type {} does not match {}",
                fragment.kind(),
                self.kind
            )));
        }
        if fragment.total() != self.source_symbols {
            return Err(DecodeError::invalid(format!(
                "declared {} source symbols but transfer has {}",
                fragment.total(),
                self.source_symbols
            )));
        }

        let bytes = fragment.payload_bytes()?;
        let (oti, packet_bytes) = split_payload(&bytes)?;
        if oti != self.oti {
            return Err(DecodeError::invalid("transmission information changed mid-transfer"));
        }
        if packet_bytes.len() != PAYLOAD_ID_LEN + self.symbol_size {
            return Err(DecodeError::invalid(format!(
                "symbol of {} bytes, expected {}",
                packet_bytes.len().saturating_sub(PAYLOAD_ID_LEN),
                self.symbol_size
            )));
        }

        let packet = EncodingPacket::deserialize(packet_bytes);
        let block = packet.payload_id().source_block_number();
        if block >= self.source_blocks {
            return Err(DecodeError::invalid(format!("source block {block} out of range")));
        }

        if self.result.is_some()
            || !self
                .received
                .insert((block, packet.payload_id().encoding_symbol_id()))
        {
            return Ok(());
        }

        if let Some(object) = self.decoder.decode(packet) {
            log::debug!(
                "fountain transfer reconstructed from {} packets",
                self.received.len()
            );
            self.result = Some(object);
        }
        Ok(())
    }

    /// Whether the decoder has reconstructed the object.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Distinct packets received relative to the source-symbol count, held at 99
    /// until the decoder actually succeeds.
    #[must_use]
    pub fn progress(&self) -> u8 {
        if self.is_complete() {
            return 100;
        }
        percent(self.received.len(), self.source_symbols as usize, 99)
    }

    /// Number of distinct packets handed to the decoder.
    #[must_use]
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// Returns the reconstructed object.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotReady`] until reconstruction succeeds.
    pub fn extract_result(&self) -> Result<Vec<u8>, DecodeError> {
        self.result.clone().ok_or(DecodeError::NotReady)
    }
}

fn split_payload(bytes: &[u8]) -> Result<([u8; OTI_LEN], &[u8]), DecodeError> {
    if bytes.len() <= OTI_LEN + PAYLOAD_ID_LEN {
        return Err(DecodeError::invalid(format!(
            "fountain payload of {} bytes is too short",
            bytes.len()
        )));
    }
    let (oti, packet) = bytes.split_at(OTI_LEN);
    let oti: [u8; OTI_LEN] = oti
        .try_into()
        .map_err(|_| DecodeError::invalid("truncated transmission information"))?;
    Ok((oti, packet))
}
