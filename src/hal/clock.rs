//! FreeRTOS time source.

use esp_idf_svc::hal::delay::FreeRtos;

use crate::clock::Clock;

/// `esp_timer` for time, `vTaskDelay` for sleeping.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeRtosClock;

impl FreeRtosClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for FreeRtosClock {
    #[inline]
    fn now_us(&self) -> i64 {
        // SAFETY: esp_timer_get_time is always safe to call
        unsafe { esp_idf_svc::sys::esp_timer_get_time() }
    }

    #[inline]
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
