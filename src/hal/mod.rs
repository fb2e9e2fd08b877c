//! ESP-IDF adapters for the pipeline ports.
//!
//! Thin wrappers around ESP-IDF peripherals.
//! Business logic stays in core modules, HAL is just I/O.

pub mod ble;
pub mod clock;
pub mod i2s_mic;
pub mod log_uart;

pub use ble::BleServer;
pub use clock::FreeRtosClock;
pub use i2s_mic::I2sMicrophone;
pub use log_uart::init_log_uart;
