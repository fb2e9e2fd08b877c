//! UART TX for log output.
//!
//! ```text
//! ESP32-S3 GPIO17 (TX) ──────▶ USB-UART RX
//!                               └─▶ PC Serial Monitor
//! ```
//!
//! The default console pins stay with ESP-IDF; the log drain writes here.

use esp_idf_svc::hal::gpio;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartTxDriver, UART1};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;

/// Log UART baud rate.
pub const LOG_BAUD_RATE: u32 = 115_200;

/// Initialize UART1 TX-only for logging output.
pub fn init_log_uart<'d>(
    uart: impl Peripheral<P = UART1> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
) -> Result<UartTxDriver<'d>, EspError> {
    let config = uart::config::Config::default().baudrate(Hertz(LOG_BAUD_RATE));

    UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None, // CTS
        Option::<gpio::AnyIOPin>::None, // RTS
        &config,
    )
}
