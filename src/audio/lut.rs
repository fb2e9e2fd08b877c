//! Sine wave lookup table for test tone generation
//!
//! 256-entry table covering one full cycle, read with linear
//! interpolation between neighbouring entries.

/// Number of entries in the sine LUT
pub const LUT_SIZE: usize = 256;

/// Pre-computed sine wave lookup table
///
/// 256 samples covering 0 to 2π
/// Amplitude: full i16 range (-32767 to +32767)
/// Index 0 = 0°, 64 = 90°, 128 = 180°, 192 = 270°
pub static SINE_LUT: [i16; LUT_SIZE] = {
    let mut table = [0i16; LUT_SIZE];
    let mut i = 0;
    while i < LUT_SIZE {
        let angle = (i as f64) * core::f64::consts::PI * 2.0 / (LUT_SIZE as f64);
        let sin_val = const_sin(angle);
        // Round to nearest
        let scaled = sin_val * 32767.0;
        table[i] = if scaled >= 0.0 {
            (scaled + 0.5) as i16
        } else {
            (scaled - 0.5) as i16
        };
        i += 1;
    }
    table
};

/// Const-compatible sine approximation using Taylor series
const fn const_sin(x: f64) -> f64 {
    use core::f64::consts::{FRAC_PI_2, PI};

    // Normalize to [-π, π]
    let mut x = x;
    while x > PI {
        x -= 2.0 * PI;
    }
    while x < -PI {
        x += 2.0 * PI;
    }

    // Fold to [-π/2, π/2] where the series converges fast
    if x > FRAC_PI_2 {
        x = PI - x;
    } else if x < -FRAC_PI_2 {
        x = -PI - x;
    }

    // Taylor series: sin(x) = x - x³/3! + x⁵/5! - x⁷/7! + ...
    let x2 = x * x;
    let x3 = x2 * x;
    let x5 = x3 * x2;
    let x7 = x5 * x2;
    let x9 = x7 * x2;
    let x11 = x9 * x2;

    x - x3 / 6.0 + x5 / 120.0 - x7 / 5040.0 + x9 / 362880.0 - x11 / 39916800.0
}

/// Interpolated sine for a 32-bit phase (2^32 = one cycle).
///
/// Top 8 bits select the table entry, the next 16 bits interpolate
/// towards the following entry.
#[inline]
pub fn sine_at(phase: u32) -> i16 {
    let idx = (phase >> 24) as usize;
    let frac = ((phase >> 8) & 0xFFFF) as i32;

    let a = SINE_LUT[idx] as i32;
    let b = SINE_LUT[(idx + 1) % LUT_SIZE] as i32;

    (a + (((b - a) * frac) >> 16)) as i16
}
