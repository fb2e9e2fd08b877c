//! Per-block transform tests over the microphone's full input range

use std::f64::consts::TAU;

use ble_mic_streamer::block::{ProcessedBlock, SampleBlock};
use ble_mic_streamer::config::{ProcessingMode, DEFAULT_SHIFT, EFFECTIVE_BITS, MAX_BLOCK_SIZE};
use ble_mic_streamer::processor::{shift_narrow, Processor};

const SHIFT: u8 = DEFAULT_SHIFT;

/// Container word carrying `value` above the shift, `pad` in the low bits.
fn padded(value: i32, pad: i32) -> i32 {
    (value << SHIFT) | (pad & ((1 << SHIFT) - 1))
}

/// `len` samples of a sine with the given period, starting at `offset`.
fn sine(len: usize, period: usize, amplitude: f64, offset: usize) -> Vec<i32> {
    (0..len)
        .map(|i| {
            let phase = ((offset + i) % period) as f64 / period as f64;
            let value = (amplitude * (TAU * phase).sin()).round() as i32;
            padded(value, i as i32 * 31)
        })
        .collect()
}

fn level(raw: &[i32]) -> i32 {
    let mut processor = Processor::new(ProcessingMode::BlockAverageMagnitude, SHIFT, 48_000);
    let mut out = ProcessedBlock::empty();
    processor.transform(&SampleBlock::from_samples(raw).unwrap(), &mut out);
    match out {
        ProcessedBlock::Level(level) => level,
        ProcessedBlock::Samples(_) => panic!("average mode emits a level"),
    }
}

#[test]
fn test_passthrough_matches_shift_across_18_bit_range() {
    let mut processor = Processor::new(ProcessingMode::PassthroughShift, SHIFT, 20_000);
    let mut out = ProcessedBlock::empty();

    let half = 1i32 << (EFFECTIVE_BITS - 1);
    let values: Vec<i32> = (-half..half).collect();
    assert_eq!(values.len(), 1 << EFFECTIVE_BITS);

    for chunk in values.chunks(MAX_BLOCK_SIZE) {
        let raw: Vec<i32> = chunk
            .iter()
            .map(|&v| padded(v, v.wrapping_mul(7_919)))
            .collect();
        processor.transform(&SampleBlock::from_samples(&raw).unwrap(), &mut out);
        let ProcessedBlock::Samples(samples) = &out else {
            panic!("passthrough emits samples");
        };
        assert_eq!(samples.len(), chunk.len());

        for ((&x, &v), &y) in raw.iter().zip(chunk).zip(samples.iter()) {
            assert_eq!(x >> SHIFT, v);
            assert_eq!(y, shift_narrow(x, SHIFT));
            assert_eq!(
                i32::from(y),
                v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)),
                "raw {:#010x}",
                x
            );
            if i16::try_from(v).is_ok() {
                assert_eq!(y, (x >> SHIFT) as i16);
            }
        }
    }
}

#[test]
fn test_average_agrees_across_block_sizes() {
    // 64-sample period: every small block holds exactly one cycle
    let signal = sine(1024, 64, 20_000.0, 0);
    let whole = level(&signal);

    for chunk in signal.chunks(64) {
        let small = level(chunk);
        assert!((small - whole).abs() <= 1, "64: {} vs 1024: {}", small, whole);
    }

    // Mean |sin| is 2/pi of the amplitude
    let expected = (20_000.0 * 2.0 / std::f64::consts::PI) as i32;
    assert!((whole - expected).abs() <= 64, "{} vs {}", whole, expected);
}

#[test]
fn test_average_of_small_blocks_tracks_large_block() {
    // 100 Hz at 48 kHz: 480-sample period, small blocks see partial cycles
    let signal = sine(1024, 480, 15_000.0, 17);
    let whole = level(&signal);

    let levels: Vec<i32> = signal.chunks(64).map(level).collect();
    assert_eq!(levels.len(), 16);
    let mean = levels.iter().map(|&l| f64::from(l)).sum::<f64>() / levels.len() as f64;

    assert!((mean - f64::from(whole)).abs() < 1.0, "{} vs {}", mean, whole);
}
