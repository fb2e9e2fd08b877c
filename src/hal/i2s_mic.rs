//! I2S MEMS microphone in standard (Philips) receive mode.
//!
//! The microphone clocks out 18-bit samples left-justified in 32-bit slots.
//! Only one slot is captured, so each DMA word is one sample.

use esp_idf_svc::hal::delay::TickType;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::i2s::config::{
    Config, DataBitWidth, SlotMode, StdClkConfig, StdConfig, StdGpioConfig, StdSlotConfig,
    StdSlotMask,
};
use esp_idf_svc::hal::i2s::{I2sDriver, I2sRx, I2S0};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::sys::{esp_err_t, EspError, ESP_ERR_INVALID_ARG, ESP_ERR_TIMEOUT};

use crate::acquisition::{AcquisitionConfig, AcquisitionFault, SampleSource};
use crate::config::ChannelMode;

const SAMPLE_BYTES: usize = core::mem::size_of::<i32>();

/// Raw sample source over the I2S0 peripheral.
///
/// Keeps the peripheral for its whole life so a failed `configure` can be
/// retried.
pub struct I2sMicrophone {
    peripheral: I2S0,
    driver: Option<I2sDriver<'static, I2sRx>>,
}

impl I2sMicrophone {
    pub fn new(i2s: I2S0) -> Self {
        Self {
            peripheral: i2s,
            driver: None,
        }
    }
}

fn slot_config(config: &AcquisitionConfig) -> StdSlotConfig {
    let mask = match config.channel {
        ChannelMode::OnlyLeft => StdSlotMask::Left,
        ChannelMode::OnlyRight => StdSlotMask::Right,
    };
    StdSlotConfig::philips_slot_default(DataBitWidth::Bits32, SlotMode::Mono).slot_mask(mask)
}

fn pin(num: i32) -> Result<AnyIOPin, AcquisitionFault> {
    if num < 0 {
        return Err(AcquisitionFault::PinConfig(ESP_ERR_INVALID_ARG as esp_err_t));
    }
    // SAFETY: the pin numbers come from the board configuration and are
    // not handed out anywhere else
    Ok(unsafe { AnyIOPin::new(num) })
}

impl SampleSource for I2sMicrophone {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), AcquisitionFault> {
        if self.driver.is_some() {
            return Ok(());
        }
        let bclk = pin(config.pins.sck)?;
        let din = pin(config.pins.sd)?;
        let ws = pin(config.pins.ws)?;

        let channel = Config::default()
            .dma_buffer_count(config.dma_buf_count)
            .frames_per_buffer(config.dma_buf_len);
        let std_config = StdConfig::new(
            channel,
            StdClkConfig::from_sample_rate_hz(config.sample_rate),
            slot_config(config),
            StdGpioConfig::default(),
        );

        // SAFETY: at most one driver holds the clone; a failed attempt drops
        // its driver before the next one is built
        let i2s = unsafe { self.peripheral.clone_unchecked() };
        let mut driver = I2sDriver::new_std_rx(i2s, &std_config, bclk, din, Option::<AnyIOPin>::None, ws)
            .map_err(|err: EspError| AcquisitionFault::DriverInstall(err.code()))?;
        driver
            .rx_enable()
            .map_err(|err| AcquisitionFault::DriverInstall(err.code()))?;

        self.driver = Some(driver);
        Ok(())
    }

    fn read_samples(&mut self, buf: &mut [i32], timeout_ms: u32) -> Result<usize, AcquisitionFault> {
        let driver = self.driver.as_mut().ok_or(AcquisitionFault::NotConfigured)?;

        // SAFETY: i32 has no invalid bit patterns and the byte view covers
        // exactly the same memory as `buf`
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<u8>(), buf.len() * SAMPLE_BYTES)
        };

        match driver.read(bytes, TickType::new_millis(u64::from(timeout_ms)).ticks()) {
            Ok(read) => Ok(read / SAMPLE_BYTES),
            Err(err) if err.code() == ESP_ERR_TIMEOUT as esp_err_t => Ok(0),
            Err(err) => Err(AcquisitionFault::ReadFailed(err.code())),
        }
    }
}
