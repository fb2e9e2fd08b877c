//! Acquisition port: blocking reads of full sample blocks.
//!
//! The I2S driver owns its DMA ring and may return fewer samples than
//! asked. [`BlockReader`] turns that into the pipeline's contract: a block
//! is either complete or the read fails, and a failed read leaves the block
//! empty.

use core::fmt;

use crate::block::SampleBlock;
use crate::config::{ChannelMode, I2sPins, StreamConfig, CONTAINER_BITS};
use crate::fault::FaultCode;

/// Acquisition failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionFault {
    /// A01: driver install failed (ESP-IDF error code). Fatal.
    DriverInstall(i32),
    /// A02: pin configuration failed (ESP-IDF error code). Fatal.
    PinConfig(i32),
    /// A03: read attempted before `configure`. Fatal.
    NotConfigured,
    /// A04: driver read error (ESP-IDF error code). Block dropped.
    ReadFailed(i32),
    /// A05: no data within the read timeout. Block dropped.
    Timeout { filled: usize, expected: usize },
}

impl AcquisitionFault {
    /// Whether streaming cannot continue after this fault.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DriverInstall(_) | Self::PinConfig(_) | Self::NotConfigured
        )
    }

    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::DriverInstall(_) => "A01",
            Self::PinConfig(_) => "A02",
            Self::NotConfigured => "A03",
            Self::ReadFailed(_) => "A04",
            Self::Timeout { .. } => "A05",
        }
    }

    /// Fault record for a fatal acquisition failure.
    pub fn fault(&self) -> (FaultCode, u32) {
        match *self {
            Self::DriverInstall(err) => (FaultCode::AcquisitionInstall, err as u32),
            Self::PinConfig(err) => (FaultCode::AcquisitionPins, err as u32),
            Self::NotConfigured => (FaultCode::AcquisitionLost, 0),
            Self::ReadFailed(err) => (FaultCode::AcquisitionLost, err as u32),
            Self::Timeout { filled, .. } => (FaultCode::AcquisitionLost, filled as u32),
        }
    }
}

impl fmt::Display for AcquisitionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriverInstall(err) => write!(f, "{}: I2S driver install failed ({})", self.code(), err),
            Self::PinConfig(err) => write!(f, "{}: I2S pin config failed ({})", self.code(), err),
            Self::NotConfigured => write!(f, "{}: I2S not configured", self.code()),
            Self::ReadFailed(err) => write!(f, "{}: I2S read failed ({})", self.code(), err),
            Self::Timeout { filled, expected } => {
                write!(f, "{}: I2S timeout after {}/{} samples", self.code(), filled, expected)
            }
        }
    }
}

/// Parameters handed to the acquisition hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub sample_rate: u32,
    /// Container width in bits.
    pub sample_bits: u8,
    pub channel: ChannelMode,
    pub block_size: usize,
    pub pins: I2sPins,
    pub dma_buf_count: u32,
    pub dma_buf_len: u32,
}

impl From<&StreamConfig> for AcquisitionConfig {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            sample_bits: CONTAINER_BITS,
            channel: cfg.channel,
            block_size: cfg.block_size,
            pins: cfg.pins,
            dma_buf_count: cfg.dma_buf_count,
            dma_buf_len: cfg.dma_buf_len,
        }
    }
}

/// Blocking source of complete sample blocks.
pub trait AcquisitionPort {
    /// Install and configure the hardware.
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), AcquisitionFault>;

    /// Fill `block` completely, waiting at most `timeout_ms` for new data.
    ///
    /// On `Err` the block is left empty.
    fn read_block(&mut self, block: &mut SampleBlock, timeout_ms: u32) -> Result<(), AcquisitionFault>;
}

/// Raw driver interface: reads whatever is available.
pub trait SampleSource {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), AcquisitionFault>;

    /// Read up to `buf.len()` samples, waiting at most `timeout_ms`.
    ///
    /// `Ok(0)` means the wait expired without data.
    fn read_samples(&mut self, buf: &mut [i32], timeout_ms: u32) -> Result<usize, AcquisitionFault>;
}

/// Accumulates partial driver reads into complete blocks.
pub struct BlockReader<S> {
    source: S,
    configured: bool,
}

impl<S: SampleSource> BlockReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            configured: false,
        }
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Access the wrapped driver.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: SampleSource> AcquisitionPort for BlockReader<S> {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), AcquisitionFault> {
        self.configured = false;
        self.source.configure(config)?;
        self.configured = true;
        Ok(())
    }

    fn read_block(&mut self, block: &mut SampleBlock, timeout_ms: u32) -> Result<(), AcquisitionFault> {
        block.reset();
        if !self.configured {
            return Err(AcquisitionFault::NotConfigured);
        }

        while !block.is_complete() {
            let read = match self.source.read_samples(block.unfilled_mut(), timeout_ms) {
                Ok(read) => read,
                Err(fault) => {
                    block.reset();
                    return Err(fault);
                }
            };
            if read == 0 {
                let filled = block.filled();
                block.reset();
                return Err(AcquisitionFault::Timeout {
                    filled,
                    expected: block.block_size(),
                });
            }
            block.advance(read);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out data in fixed-size chunks, then a scripted fault.
    struct ChunkedSource {
        next: i32,
        chunk: usize,
        fail_after: Option<usize>,
        reads: usize,
    }

    impl SampleSource for ChunkedSource {
        fn configure(&mut self, _config: &AcquisitionConfig) -> Result<(), AcquisitionFault> {
            Ok(())
        }

        fn read_samples(&mut self, buf: &mut [i32], _timeout_ms: u32) -> Result<usize, AcquisitionFault> {
            if self.fail_after == Some(self.reads) {
                return Err(AcquisitionFault::ReadFailed(-1));
            }
            self.reads += 1;
            let n = buf.len().min(self.chunk);
            for slot in &mut buf[..n] {
                *slot = self.next;
                self.next += 1;
            }
            Ok(n)
        }
    }

    fn reader(chunk: usize, fail_after: Option<usize>) -> BlockReader<ChunkedSource> {
        let mut reader = BlockReader::new(ChunkedSource {
            next: 0,
            chunk,
            fail_after,
            reads: 0,
        });
        reader
            .configure(&AcquisitionConfig::from(&StreamConfig::live_microphone()))
            .unwrap();
        reader
    }

    #[test]
    fn test_partial_reads_assembled() {
        let mut reader = reader(3, None);
        let mut block = SampleBlock::new(8).unwrap();
        reader.read_block(&mut block, 10).unwrap();
        assert_eq!(block.raw(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(reader.source_mut().reads, 3);
    }

    #[test]
    fn test_fault_mid_block_leaves_block_empty() {
        let mut reader = reader(3, Some(2));
        let mut block = SampleBlock::new(8).unwrap();
        assert_eq!(
            reader.read_block(&mut block, 10),
            Err(AcquisitionFault::ReadFailed(-1))
        );
        assert_eq!(block.filled(), 0);
        assert!(block.raw().is_empty());
    }

    #[test]
    fn test_unconfigured_read_is_fatal() {
        let mut reader = BlockReader::new(ChunkedSource {
            next: 0,
            chunk: 4,
            fail_after: None,
            reads: 0,
        });
        let mut block = SampleBlock::new(4).unwrap();
        let fault = reader.read_block(&mut block, 10).unwrap_err();
        assert_eq!(fault, AcquisitionFault::NotConfigured);
        assert!(fault.is_fatal());
    }

    #[test]
    fn test_fault_classification() {
        assert!(AcquisitionFault::DriverInstall(1).is_fatal());
        assert!(AcquisitionFault::PinConfig(1).is_fatal());
        assert!(!AcquisitionFault::ReadFailed(1).is_fatal());
        assert!(!AcquisitionFault::Timeout { filled: 0, expected: 1 }.is_fatal());
    }
}
