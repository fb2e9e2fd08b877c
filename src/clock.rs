//! Time source and sleeping for the task loops.

/// Monotonic time plus a blocking delay.
pub trait Clock {
    /// Microseconds since boot.
    fn now_us(&self) -> i64;

    /// Block the calling task.
    fn delay_ms(&mut self, ms: u32);

    /// Milliseconds since boot.
    #[inline]
    fn now_ms(&self) -> u64 {
        (self.now_us() / 1000).max(0) as u64
    }
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
