//! Sample containers flowing through the pipeline.
//!
//! Both containers have fixed capacity and are allocated once by the
//! streaming task, then overwritten every iteration. Nothing here
//! allocates at audio rate.

use heapless::Vec;

use crate::config::{ConfigError, MAX_BLOCK_SIZE};

/// Bytes of the largest processed block on the wire.
pub const MAX_ENCODED_BLOCK: usize = MAX_BLOCK_SIZE * 2;

/// One block of raw I2S samples.
///
/// The backing storage always holds `block_size` words; `filled` tracks how
/// many of them the reader has written. Only a complete block exposes its
/// samples through [`SampleBlock::raw`].
#[derive(Clone, Debug)]
pub struct SampleBlock {
    samples: Vec<i32, MAX_BLOCK_SIZE>,
    filled: usize,
}

impl SampleBlock {
    /// Create an empty block of `block_size` samples.
    pub fn new(block_size: usize) -> Result<Self, ConfigError> {
        if block_size == 0 {
            return Err(ConfigError::EmptyBlock);
        }
        let mut samples = Vec::new();
        samples
            .resize(block_size, 0)
            .map_err(|_| ConfigError::BlockTooLarge { block_size })?;
        Ok(Self { samples, filled: 0 })
    }

    /// Build a complete block from existing samples.
    pub fn from_samples(raw: &[i32]) -> Result<Self, ConfigError> {
        let mut block = Self::new(raw.len())?;
        block.samples.copy_from_slice(raw);
        block.filled = raw.len();
        Ok(block)
    }

    /// Samples per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.samples.len()
    }

    /// Samples written so far.
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.filled == self.samples.len()
    }

    /// Raw samples of a complete block, empty otherwise.
    #[inline]
    pub fn raw(&self) -> &[i32] {
        if self.is_complete() {
            &self.samples
        } else {
            &[]
        }
    }

    /// Storage not yet written by the reader.
    #[inline]
    pub fn unfilled_mut(&mut self) -> &mut [i32] {
        &mut self.samples[self.filled..]
    }

    /// Mark `count` more samples as written.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.filled = (self.filled + count).min(self.samples.len());
    }

    /// Forget the current contents.
    #[inline]
    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

/// Result of processing one [`SampleBlock`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessedBlock {
    /// Narrowed samples, 2 bytes each on the wire.
    Samples(Vec<i16, MAX_BLOCK_SIZE>),
    /// One aggregate per block, 4 bytes on the wire.
    Level(i32),
}

impl ProcessedBlock {
    /// Empty sample block.
    pub const fn empty() -> Self {
        ProcessedBlock::Samples(Vec::new())
    }

    /// Bytes per value on the wire.
    #[inline]
    pub fn sample_width(&self) -> usize {
        match self {
            ProcessedBlock::Samples(_) => 2,
            ProcessedBlock::Level(_) => 4,
        }
    }

    /// Number of values carried.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            ProcessedBlock::Samples(samples) => samples.len(),
            ProcessedBlock::Level(_) => 1,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes on the wire.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len() * self.sample_width()
    }

    /// Sample storage, switching the block to sample form if needed.
    pub fn samples_mut(&mut self) -> &mut Vec<i16, MAX_BLOCK_SIZE> {
        match self {
            ProcessedBlock::Samples(samples) => samples,
            ProcessedBlock::Level(_) => {
                *self = ProcessedBlock::Samples(Vec::new());
                self.samples_mut()
            }
        }
    }

    /// Write the little-endian wire image into `out`, replacing its contents.
    pub fn encode_le(&self, out: &mut Vec<u8, MAX_ENCODED_BLOCK>) {
        out.clear();
        match self {
            ProcessedBlock::Samples(samples) => {
                for sample in samples.iter() {
                    // Capacity is 2 * MAX_BLOCK_SIZE, cannot overflow
                    let _ = out.extend_from_slice(&sample.to_le_bytes());
                }
            }
            ProcessedBlock::Level(level) => {
                let _ = out.extend_from_slice(&level.to_le_bytes());
            }
        }
    }
}

impl Default for ProcessedBlock {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_exposes_only_complete_data() {
        let mut block = SampleBlock::new(4).unwrap();
        assert_eq!(block.block_size(), 4);
        assert!(block.raw().is_empty());

        block.unfilled_mut()[..2].copy_from_slice(&[1, 2]);
        block.advance(2);
        assert!(!block.is_complete());
        assert!(block.raw().is_empty());

        block.unfilled_mut().copy_from_slice(&[3, 4]);
        block.advance(2);
        assert_eq!(block.raw(), &[1, 2, 3, 4]);

        block.reset();
        assert!(block.raw().is_empty());
        assert_eq!(block.unfilled_mut().len(), 4);
    }

    #[test]
    fn test_block_size_limits() {
        assert_eq!(SampleBlock::new(0).unwrap_err(), ConfigError::EmptyBlock);
        assert!(SampleBlock::new(MAX_BLOCK_SIZE).is_ok());
        assert!(SampleBlock::new(MAX_BLOCK_SIZE + 1).is_err());
    }

    #[test]
    fn test_processed_sizes() {
        let mut processed = ProcessedBlock::empty();
        processed.samples_mut().extend_from_slice(&[1, -1, 3]).unwrap();
        assert_eq!(processed.byte_len(), 6);

        let level = ProcessedBlock::Level(7);
        assert_eq!(level.byte_len(), 4);
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn test_encode_little_endian() {
        let mut out = Vec::new();

        let mut processed = ProcessedBlock::empty();
        processed.samples_mut().extend_from_slice(&[0x0102, -2]).unwrap();
        processed.encode_le(&mut out);
        assert_eq!(out.as_slice(), &[0x02, 0x01, 0xFE, 0xFF]);

        ProcessedBlock::Level(0x0A0B0C0D).encode_le(&mut out);
        assert_eq!(out.as_slice(), &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn test_samples_mut_switches_from_level() {
        let mut processed = ProcessedBlock::Level(5);
        processed.samples_mut().push(9).unwrap();
        assert_eq!(processed, ProcessedBlock::Samples(Vec::from_slice(&[9]).unwrap()));
    }
}
