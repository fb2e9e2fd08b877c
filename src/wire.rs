//! Receiver side of the notification payload.
//!
//! Payloads carry no header: the listener knows the format from the
//! firmware build. Samples are i16 little-endian, a level is one i32
//! little-endian. A block larger than the payload arrives as several
//! notifications that concatenate back to the block.

use core::fmt;

use heapless::Vec;

use crate::config::ProcessingMode;

/// Layout of a notification payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Sequence of i16 LE samples.
    Samples,
    /// One i32 LE level per block.
    Level,
}

impl PayloadFormat {
    pub const fn for_mode(mode: ProcessingMode) -> Self {
        match mode {
            ProcessingMode::BlockAverageMagnitude => PayloadFormat::Level,
            _ => PayloadFormat::Samples,
        }
    }

    /// Bytes per value.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            PayloadFormat::Samples => 2,
            PayloadFormat::Level => 4,
        }
    }
}

/// Payload that does not match its format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Length not a multiple of the value width.
    Misaligned { len: usize, width: usize },
    /// Destination buffer full.
    Overflow { capacity: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { len, width } => {
                write!(f, "{} byte payload not a multiple of {}", len, width)
            }
            Self::Overflow { capacity } => write!(f, "more than {} samples", capacity),
        }
    }
}

/// Append the samples in `payload` to `out`; returns how many were added.
///
/// `out` is left untouched on error.
pub fn decode_samples<const N: usize>(payload: &[u8], out: &mut Vec<i16, N>) -> Result<usize, WireError> {
    let width = PayloadFormat::Samples.width();
    if payload.len() % width != 0 {
        return Err(WireError::Misaligned {
            len: payload.len(),
            width,
        });
    }
    let count = payload.len() / width;
    if out.len() + count > N {
        return Err(WireError::Overflow { capacity: N });
    }
    for pair in payload.chunks_exact(width) {
        // capacity checked above
        let _ = out.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    Ok(count)
}

/// Level carried by a level-mode payload.
pub fn decode_level(payload: &[u8]) -> Result<i32, WireError> {
    match payload {
        [a, b, c, d] => Ok(i32::from_le_bytes([*a, *b, *c, *d])),
        _ => Err(WireError::Misaligned {
            len: payload.len(),
            width: PayloadFormat::Level.width(),
        }),
    }
}
