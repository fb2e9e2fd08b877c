//! Framing of processed blocks into notification-sized packets.
//!
//! The payload is the raw little-endian dump of the processed block, no
//! header. The framer encodes a block once into its own buffer and hands out
//! borrowed slices of it, so packing costs one copy per block.
//!
//! ```text
//! ProcessedBlock ──encode_le──▶ [b0 b1 b2 ... bN] ──chunks──▶ notify, notify, ...
//! ```
//!
//! Chunks are a whole number of samples, never larger than the negotiated
//! payload, and come out in order.

use core::fmt;

use heapless::Vec;

use crate::block::{ProcessedBlock, MAX_ENCODED_BLOCK};
use crate::config::MAX_NOTIFY_PAYLOAD;

/// One notification worth of bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportPacket<'a> {
    payload: &'a [u8],
    index: usize,
    count: usize,
}

impl<'a> TransportPacket<'a> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Position of this packet within its block.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Packets the block was split into.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }
}

/// Framing failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramingError {
    /// Payload cannot hold a single sample.
    PayloadTooSmall { max_payload: usize, sample_width: usize },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooSmall {
                max_payload,
                sample_width,
            } => write!(
                f,
                "payload {} bytes smaller than one {}-byte sample",
                max_payload, sample_width
            ),
        }
    }
}

/// Bytes per packet for a payload limit: the largest whole number of samples.
#[inline]
pub fn chunk_size(max_payload: usize, sample_width: usize) -> usize {
    let limit = max_payload.min(MAX_NOTIFY_PAYLOAD);
    if sample_width == 0 {
        return limit;
    }
    limit - limit % sample_width
}

/// Packets needed for `byte_len` bytes.
#[inline]
pub fn packet_count(byte_len: usize, max_payload: usize, sample_width: usize) -> usize {
    let chunk = chunk_size(max_payload, sample_width);
    if chunk == 0 {
        return 0;
    }
    byte_len.div_ceil(chunk)
}

/// Encodes processed blocks and splits them into packets.
pub struct Framer {
    encoded: Vec<u8, MAX_ENCODED_BLOCK>,
}

impl Framer {
    pub const fn new() -> Self {
        Self {
            encoded: Vec::new(),
        }
    }

    /// Split `block` into packets of at most `max_payload` bytes.
    ///
    /// A block that fits yields exactly one packet. Payloads above
    /// [`MAX_NOTIFY_PAYLOAD`] are capped to it.
    pub fn pack(&mut self, block: &ProcessedBlock, max_payload: usize) -> Result<Packets<'_>, FramingError> {
        let sample_width = block.sample_width();
        let chunk = chunk_size(max_payload, sample_width);
        if chunk == 0 {
            return Err(FramingError::PayloadTooSmall {
                max_payload,
                sample_width,
            });
        }

        block.encode_le(&mut self.encoded);
        Ok(Packets {
            bytes: &self.encoded,
            chunk,
            next: 0,
            count: self.encoded.len().div_ceil(chunk),
        })
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the packets of one block.
pub struct Packets<'a> {
    bytes: &'a [u8],
    chunk: usize,
    next: usize,
    count: usize,
}

impl<'a> Packets<'a> {
    /// Total packets for the block.
    #[inline]
    pub fn count_total(&self) -> usize {
        self.count
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = TransportPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let start = self.next * self.chunk;
        let end = (start + self.chunk).min(self.bytes.len());
        let packet = TransportPacket {
            payload: &self.bytes[start..end],
            index: self.next,
            count: self.count,
        };
        self.next += 1;
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Packets<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> ProcessedBlock {
        let mut block = ProcessedBlock::empty();
        for i in 0..n {
            block.samples_mut().push(i as i16).unwrap();
        }
        block
    }

    #[test]
    fn test_single_packet_when_block_fits() {
        let mut framer = Framer::new();
        let block = samples(250);
        let packets = framer.pack(&block, 514).unwrap();
        assert_eq!(packets.len(), 1);
        let all: std::vec::Vec<_> = packets.collect();
        assert_eq!(all[0].payload().len(), 500);
        assert!(all[0].is_last());
    }

    #[test]
    fn test_never_splits_a_sample() {
        let mut framer = Framer::new();
        let block = samples(25);
        // 19 bytes rounds down to 18, nine samples per packet
        let sizes: std::vec::Vec<usize> = framer
            .pack(&block, 19)
            .unwrap()
            .map(|p| p.payload().len())
            .collect();
        assert_eq!(sizes, [18, 18, 14]);
    }

    #[test]
    fn test_payload_capped_to_max_notify() {
        assert_eq!(chunk_size(4096, 2), MAX_NOTIFY_PAYLOAD);
        assert_eq!(packet_count(2048, 4096, 2), 4);
    }

    #[test]
    fn test_too_small_payload() {
        let mut framer = Framer::new();
        let err = framer.pack(&ProcessedBlock::Level(1), 3).err();
        assert_eq!(
            err,
            Some(FramingError::PayloadTooSmall {
                max_payload: 3,
                sample_width: 4
            })
        );
    }

    #[test]
    fn test_empty_block_has_no_packets() {
        let mut framer = Framer::new();
        assert_eq!(framer.pack(&ProcessedBlock::empty(), 20).unwrap().count(), 0);
    }
}
