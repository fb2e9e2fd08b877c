//! Synthetic test tone with a fixed-point phase accumulator
//!
//! The accumulator is a u32 where 2^32 is one full cycle, so wrapping
//! at 2π is exact and the phase never grows without bound.

use super::lut::sine_at;

/// 2^32 as float, one full cycle of the accumulator.
const CYCLE: f32 = 4_294_967_296.0;

/// Sine generator feeding the pipeline instead of the microphone.
#[derive(Clone, Debug)]
pub struct ToneGenerator {
    /// Phase accumulator (32-bit fixed point, top 8 bits = LUT index)
    phase: u32,
    /// Phase increment per sample (determines frequency)
    phase_inc: u32,
    /// Peak amplitude in i16 units
    amplitude: i16,
}

impl ToneGenerator {
    /// Create new tone generator
    ///
    /// # Arguments
    /// * `freq_hz` - Tone frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `amplitude` - Peak value (max 32767)
    pub fn new(freq_hz: u32, sample_rate: u32, amplitude: i16) -> Self {
        Self {
            phase: 0,
            phase_inc: Self::calc_phase_inc(freq_hz, sample_rate),
            amplitude,
        }
    }

    /// phase_inc = (freq * 2^32) / sample_rate
    #[inline]
    fn calc_phase_inc(freq_hz: u32, sample_rate: u32) -> u32 {
        if sample_rate == 0 {
            return 0;
        }
        ((freq_hz as u64 * (1u64 << 32)) / sample_rate as u64) as u32
    }

    /// Generate next sample and advance the phase by 2π·F/R.
    #[inline]
    pub fn next_sample(&mut self) -> i16 {
        let sine = sine_at(self.phase) as i32;
        self.phase = self.phase.wrapping_add(self.phase_inc);
        ((sine * self.amplitude as i32) / 32767) as i16
    }

    /// Fill `out` with consecutive samples.
    pub fn fill(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }

    /// Current phase in radians, always in `[0, 2π)`.
    #[inline]
    pub fn phase_radians(&self) -> f32 {
        self.phase as f32 / CYCLE * core::f32::consts::TAU
    }

    /// Phase advance per sample in radians.
    #[inline]
    pub fn phase_step_radians(&self) -> f32 {
        self.phase_inc as f32 / CYCLE * core::f32::consts::TAU
    }

    #[inline]
    pub fn amplitude(&self) -> i16 {
        self.amplitude
    }

    /// Restart at phase zero.
    pub fn reset(&mut self) {
        self.phase = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let mut gen = ToneGenerator::new(1000, 20_000, 10_000);
        assert_eq!(gen.phase_radians(), 0.0);
        assert_eq!(gen.next_sample(), 0);
    }

    #[test]
    fn test_peak_matches_amplitude() {
        // 5 kHz at 20 kHz: quarter cycle per sample, second sample is the crest
        let mut gen = ToneGenerator::new(5_000, 20_000, 10_000);
        gen.next_sample();
        assert_eq!(gen.next_sample(), 10_000);
        assert_eq!(gen.next_sample(), 0);
        assert_eq!(gen.next_sample(), -10_000);
    }

    #[test]
    fn test_reset() {
        let mut gen = ToneGenerator::new(440, 8_000, 1_000);
        let first: [i16; 4] = core::array::from_fn(|_| gen.next_sample());
        gen.reset();
        let again: [i16; 4] = core::array::from_fn(|_| gen.next_sample());
        assert_eq!(first, again);
    }
}
