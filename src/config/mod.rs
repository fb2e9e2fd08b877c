//! Module: config
//!
//! Purpose: Compile-time configuration for the streaming pipeline.
//!
//! Architecture:
//! - `StreamConfig`: every tunable of the node in one `const`-constructible struct
//! - Presets mirror the three firmware builds that shipped so far
//!   (live microphone, level meter, synthetic tone)
//! - `CONFIG`: the preset compiled into the firmware
//!
//! Block size, sample width and MTU are co-designed: with the defaults one
//! acquired block becomes exactly one BLE notification.

use core::fmt;

use crate::transport::Capabilities;

/// Largest block the pipeline can carry (samples).
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Width of the I2S container word (bits).
pub const CONTAINER_BITS: u8 = 32;

/// Significant bits delivered by the microphone, left-justified in the container.
pub const EFFECTIVE_BITS: u8 = 18;

/// Right shift mapping the 18 effective bits into a signed 16-bit range.
pub const DEFAULT_SHIFT: u8 = 14;

/// ATT header bytes consumed by a notification (opcode + handle).
pub const ATT_NOTIFY_OVERHEAD: u16 = 3;

/// ATT MTU every BLE link starts with.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Largest ATT MTU the stack negotiates.
pub const MAX_ATT_MTU: u16 = 517;

/// Largest notification payload the pipeline ever emits (514 bytes).
pub const MAX_NOTIFY_PAYLOAD: usize = (MAX_ATT_MTU - ATT_NOTIFY_OVERHEAD) as usize;

/// GATT service advertised by the node.
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/// Notify characteristic carrying the audio payload.
pub const CHARACTERISTIC_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";

/// Notification payload for a given ATT MTU.
#[inline]
pub const fn notify_payload_for_mtu(mtu: u16) -> usize {
    if mtu <= ATT_NOTIFY_OVERHEAD {
        0
    } else {
        (mtu - ATT_NOTIFY_OVERHEAD) as usize
    }
}

/// Per-block transform applied by the processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Every sample shifted right and narrowed to i16.
    PassthroughShift,
    /// Mean absolute shifted value of the block, one i32 per block.
    BlockAverageMagnitude,
    /// Generated sine, no microphone input.
    SyntheticTone {
        freq_hz: u32,
        amplitude: i16,
    },
}

impl ProcessingMode {
    /// Whether the mode consumes microphone blocks.
    #[inline]
    pub const fn needs_acquisition(&self) -> bool {
        !matches!(self, ProcessingMode::SyntheticTone { .. })
    }

    /// Bytes per emitted value on the wire.
    #[inline]
    pub const fn sample_width(&self) -> usize {
        match self {
            ProcessingMode::BlockAverageMagnitude => 4,
            _ => 2,
        }
    }

    /// Short name for logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::PassthroughShift => "passthrough",
            ProcessingMode::BlockAverageMagnitude => "average",
            ProcessingMode::SyntheticTone { .. } => "tone",
        }
    }
}

/// I2S slot the microphone drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    OnlyLeft,
    OnlyRight,
}

/// I2S pin assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I2sPins {
    /// Word select.
    pub ws: i32,
    /// Serial clock.
    pub sck: i32,
    /// Serial data in.
    pub sd: i32,
}

/// Complete node configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// GAP device name.
    pub device_name: &'static str,
    pub service_uuid: &'static str,
    pub characteristic_uuid: &'static str,
    /// Properties of the data characteristic.
    pub capabilities: Capabilities,

    /// Microphone sample rate (Hz).
    pub sample_rate: u32,
    /// Samples per block.
    pub block_size: usize,
    /// Right shift applied to raw samples.
    pub shift: u8,
    pub mode: ProcessingMode,
    pub channel: ChannelMode,
    pub pins: I2sPins,
    /// I2S DMA descriptors.
    pub dma_buf_count: u32,
    /// Samples per DMA descriptor.
    pub dma_buf_len: u32,
    /// Upper bound on one block read before it is reported as a timeout (ms).
    pub read_timeout_ms: u32,

    /// ATT MTU requested from the peer.
    pub preferred_mtu: u16,
    /// Preferred connection interval carried in the advertising data, 1.25 ms units.
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,

    /// Core the streaming task is pinned to.
    pub stream_core: i32,
    pub stream_priority: u32,
    pub stream_stack_bytes: u32,

    /// Sleep while no peer is connected (ms).
    pub idle_backoff_ms: u32,
    /// Delay after each delivered block (ms), 0 disables pacing.
    pub pacing_ms: u32,
    /// Wait between a disconnect and re-advertising (ms).
    pub reconnect_settle_ms: u32,
    /// Wait between failed advertising restarts (ms).
    pub advertise_retry_ms: u32,
    /// Consecutive advertising failures before a fault is raised.
    pub max_advertise_attempts: u8,
    /// Attempts per start-up step before giving up.
    pub startup_attempts: u8,
    /// Delay between start-up attempts (ms).
    pub startup_retry_ms: u32,
    /// Interval between stream statistics log lines (blocks).
    pub stats_every_blocks: u32,
}

impl StreamConfig {
    /// 20 kHz microphone, 250 samples per block: 500 bytes per notification.
    pub const fn live_microphone() -> Self {
        Self {
            device_name: "ESP32_Audio_Stream",
            service_uuid: SERVICE_UUID,
            characteristic_uuid: CHARACTERISTIC_UUID,
            capabilities: Capabilities::NOTIFY,
            sample_rate: 20_000,
            block_size: 250,
            shift: DEFAULT_SHIFT,
            mode: ProcessingMode::PassthroughShift,
            channel: ChannelMode::OnlyLeft,
            pins: I2sPins { ws: 4, sck: 6, sd: 5 },
            dma_buf_count: 8,
            dma_buf_len: 256,
            read_timeout_ms: 100,
            preferred_mtu: MAX_ATT_MTU,
            adv_interval_min: 0x06, // 7.5 ms
            adv_interval_max: 0x0C, // 15 ms
            stream_core: 1,
            stream_priority: 1,
            stream_stack_bytes: 10_000,
            idle_backoff_ms: 100,
            pacing_ms: 0,
            reconnect_settle_ms: 500,
            advertise_retry_ms: 1_000,
            max_advertise_attempts: 5,
            startup_attempts: 3,
            startup_retry_ms: 200,
            stats_every_blocks: 400,
        }
    }

    /// 48 kHz microphone averaged over 1024 samples, about 20 levels per second.
    pub const fn level_meter() -> Self {
        let mut cfg = Self::live_microphone();
        cfg.device_name = "ESP32_Microphone";
        // Centrals may poll the level instead of subscribing
        cfg.capabilities = Capabilities::NOTIFY_READ;
        cfg.sample_rate = 48_000;
        cfg.block_size = 1024;
        cfg.mode = ProcessingMode::BlockAverageMagnitude;
        cfg.dma_buf_len = 1024;
        cfg.pacing_ms = 50;
        cfg.stats_every_blocks = 200;
        cfg
    }

    /// 60 Hz test tone at the live-microphone block rate, no I2S traffic.
    pub const fn synthetic_tone() -> Self {
        let mut cfg = Self::live_microphone();
        cfg.mode = ProcessingMode::SyntheticTone {
            freq_hz: 60,
            amplitude: 10_000,
        };
        // 250 samples at 20 kHz = 12.5 ms per block
        cfg.pacing_ms = 12;
        cfg
    }

    /// Bytes of one processed block on the wire.
    #[inline]
    pub const fn processed_block_bytes(&self) -> usize {
        match self.mode {
            ProcessingMode::BlockAverageMagnitude => 4,
            _ => self.block_size * 2,
        }
    }

    /// Whether one processed block fits a single notification.
    #[inline]
    pub const fn fits_single_packet(&self, max_payload: usize) -> bool {
        self.processed_block_bytes() <= max_payload
    }

    /// Acquisition time of one block (µs).
    #[inline]
    pub const fn block_duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.block_size as u64 * 1_000_000 / self.sample_rate as u64
    }

    /// Notification payload at the preferred MTU.
    #[inline]
    pub const fn preferred_payload(&self) -> usize {
        notify_payload_for_mtu(self.preferred_mtu)
    }

    /// Check the configuration for values the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.block_size == 0 {
            return Err(ConfigError::EmptyBlock);
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockTooLarge {
                block_size: self.block_size,
            });
        }
        if self.shift >= CONTAINER_BITS {
            return Err(ConfigError::ShiftTooLarge { shift: self.shift });
        }
        // Anything below the effective bits is padding and must be shifted out
        if self.mode.needs_acquisition() && self.shift < CONTAINER_BITS - EFFECTIVE_BITS {
            return Err(ConfigError::ShiftTooSmall { shift: self.shift });
        }
        if self.preferred_mtu < DEFAULT_ATT_MTU || self.preferred_mtu > MAX_ATT_MTU {
            return Err(ConfigError::MtuOutOfRange {
                mtu: self.preferred_mtu,
            });
        }
        if self.adv_interval_min == 0 || self.adv_interval_min > self.adv_interval_max {
            return Err(ConfigError::AdvertisingInterval);
        }
        if let ProcessingMode::SyntheticTone { freq_hz, .. } = self.mode {
            if freq_hz == 0 || freq_hz >= self.sample_rate / 2 {
                return Err(ConfigError::ToneAboveNyquist { freq_hz });
            }
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::live_microphone()
    }
}

/// Configuration compiled into the firmware.
pub const CONFIG: StreamConfig = StreamConfig::live_microphone();

/// Invalid configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// C01: sample rate is zero
    ZeroSampleRate,
    /// C02: block size is zero
    EmptyBlock,
    /// C03: block larger than MAX_BLOCK_SIZE
    BlockTooLarge { block_size: usize },
    /// C04: shift discards the whole container
    ShiftTooLarge { shift: u8 },
    /// C05: shift keeps container padding bits
    ShiftTooSmall { shift: u8 },
    /// C06: MTU outside 23..=517
    MtuOutOfRange { mtu: u16 },
    /// C07: advertising interval bounds inverted or zero
    AdvertisingInterval,
    /// C08: tone frequency zero or above Nyquist
    ToneAboveNyquist { freq_hz: u32 },
}

impl ConfigError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroSampleRate => "C01",
            Self::EmptyBlock => "C02",
            Self::BlockTooLarge { .. } => "C03",
            Self::ShiftTooLarge { .. } => "C04",
            Self::ShiftTooSmall { .. } => "C05",
            Self::MtuOutOfRange { .. } => "C06",
            Self::AdvertisingInterval => "C07",
            Self::ToneAboveNyquist { .. } => "C08",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSampleRate => write!(f, "{}: sample rate is zero", self.code()),
            Self::EmptyBlock => write!(f, "{}: block size is zero", self.code()),
            Self::BlockTooLarge { block_size } => write!(
                f,
                "{}: block size {} exceeds {}",
                self.code(),
                block_size,
                MAX_BLOCK_SIZE
            ),
            Self::ShiftTooLarge { shift } => {
                write!(f, "{}: shift {} discards the sample", self.code(), shift)
            }
            Self::ShiftTooSmall { shift } => {
                write!(f, "{}: shift {} keeps padding bits", self.code(), shift)
            }
            Self::MtuOutOfRange { mtu } => write!(
                f,
                "{}: MTU {} outside {}..={}",
                self.code(),
                mtu,
                DEFAULT_ATT_MTU,
                MAX_ATT_MTU
            ),
            Self::AdvertisingInterval => {
                write!(f, "{}: invalid advertising interval", self.code())
            }
            Self::ToneAboveNyquist { freq_hz } => {
                write!(f, "{}: tone {} Hz not below Nyquist", self.code(), freq_hz)
            }
        }
    }
}
