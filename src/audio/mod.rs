//! Signal sources that do not come from the microphone
//!
//! Architecture:
//! - Sine LUT with linear interpolation
//! - Phase accumulator tone generator (test streams without I2S input)

pub mod lut;
pub mod tone;

pub use lut::{sine_at, LUT_SIZE, SINE_LUT};
pub use tone::ToneGenerator;
