//! Per-block numeric transforms.
//!
//! Runs on the streaming core right after each acquisition. Every path is
//! O(block_size), allocation-free and non-blocking, so processing a block
//! always takes far less than the `block_size / sample_rate` it took to
//! capture it.

use crate::audio::ToneGenerator;
use crate::block::{ProcessedBlock, SampleBlock};
use crate::config::{ProcessingMode, StreamConfig};

/// Shift a raw container sample and narrow it to i16.
///
/// Saturates instead of wrapping; for samples within the microphone's
/// documented range the result equals `(raw >> shift) as i16`.
#[inline]
pub const fn shift_narrow(raw: i32, shift: u8) -> i16 {
    let shifted = raw >> shift;
    if shifted > i16::MAX as i32 {
        i16::MAX
    } else if shifted < i16::MIN as i32 {
        i16::MIN
    } else {
        shifted as i16
    }
}

/// `out[i] = shift_narrow(raw[i], shift)`; `out` is replaced.
pub fn passthrough_shift<const N: usize>(raw: &[i32], shift: u8, out: &mut heapless::Vec<i16, N>) {
    out.clear();
    for &sample in raw.iter().take(N) {
        // take(N) keeps us within capacity
        let _ = out.push(shift_narrow(sample, shift));
    }
}

/// Mean of `|raw[i] >> shift|`, truncated toward zero.
///
/// The sum runs in an i64 so 1024 full-scale terms cannot overflow.
/// An empty slice averages to 0.
pub fn block_average_magnitude(raw: &[i32], shift: u8) -> i32 {
    if raw.is_empty() {
        return 0;
    }
    let sum: i64 = raw.iter().map(|&x| i64::from(x >> shift).abs()).sum();
    (sum / raw.len() as i64) as i32
}

/// Transform selected by [`ProcessingMode`].
pub struct Processor {
    mode: ProcessingMode,
    shift: u8,
    tone: Option<ToneGenerator>,
}

impl Processor {
    pub fn new(mode: ProcessingMode, shift: u8, sample_rate: u32) -> Self {
        let tone = match mode {
            ProcessingMode::SyntheticTone { freq_hz, amplitude } => {
                Some(ToneGenerator::new(freq_hz, sample_rate, amplitude))
            }
            _ => None,
        };
        Self { mode, shift, tone }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.mode, config.shift, config.sample_rate)
    }

    #[inline]
    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Produce the processed form of `block` into `out`.
    ///
    /// The tone mode ignores the block contents and emits `block_size`
    /// generated samples.
    pub fn transform(&mut self, block: &SampleBlock, out: &mut ProcessedBlock) {
        match self.mode {
            ProcessingMode::PassthroughShift => {
                passthrough_shift(block.raw(), self.shift, out.samples_mut());
            }
            ProcessingMode::BlockAverageMagnitude => {
                *out = ProcessedBlock::Level(block_average_magnitude(block.raw(), self.shift));
            }
            ProcessingMode::SyntheticTone { .. } => {
                let samples = out.samples_mut();
                samples.clear();
                // block_size never exceeds the capacity
                let _ = samples.resize(block.block_size(), 0);
                if let Some(tone) = self.tone.as_mut() {
                    tone.fill(samples);
                }
            }
        }
    }

    /// Tone generator state, present only in tone mode.
    pub fn tone(&self) -> Option<&ToneGenerator> {
        self.tone.as_ref()
    }
}
