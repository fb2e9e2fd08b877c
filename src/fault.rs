//! Fault state management for the streaming node.
//!
//! Fatal conditions (driver install failure, service start failure,
//! advertising that keeps failing) leave the node running but not
//! streaming. The fault is recorded here so the control core can report it
//! and the streaming core can stay idle.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Fault codes indicating why streaming stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    /// No fault (normal operation).
    None = 0,

    /// I2S driver could not be installed.
    AcquisitionInstall = 1,

    /// I2S pins could not be configured.
    AcquisitionPins = 2,

    /// Read attempted on an acquisition port that was never configured.
    AcquisitionLost = 3,

    /// GATT service or characteristic could not be started.
    ServiceStart = 4,

    /// Advertising restart failed repeatedly after a disconnect.
    /// Data: consecutive failed attempts.
    AdvertisingStalled = 5,

    /// Configuration rejected at start-up.
    InvalidConfig = 6,
}

impl FaultCode {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => FaultCode::None,
            1 => FaultCode::AcquisitionInstall,
            2 => FaultCode::AcquisitionPins,
            3 => FaultCode::AcquisitionLost,
            4 => FaultCode::ServiceStart,
            5 => FaultCode::AdvertisingStalled,
            6 => FaultCode::InvalidConfig,
            _ => FaultCode::None,
        }
    }

    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::None => "none",
            FaultCode::AcquisitionInstall => "i2s-install",
            FaultCode::AcquisitionPins => "i2s-pins",
            FaultCode::AcquisitionLost => "i2s-lost",
            FaultCode::ServiceStart => "gatt-service",
            FaultCode::AdvertisingStalled => "advertising",
            FaultCode::InvalidConfig => "config",
        }
    }
}

/// Thread-safe fault state.
///
/// Set by bring-up, the streaming task and the link supervisor.
/// Read by the control loop for periodic reporting.
///
/// # Usage
///
/// ```ignore
/// static FAULT: FaultState = FaultState::new();
///
/// // Streaming core, fatal read error:
/// FAULT.set(FaultCode::AcquisitionLost, 0);
///
/// // Control core:
/// if FAULT.is_active() {
///     rt_error!(RADIO_LOG, now, "streaming halted: {}", FAULT.code().as_str());
/// }
/// ```
pub struct FaultState {
    /// True if fault is active.
    active: AtomicBool,

    /// Fault code (reason for fault).
    code: AtomicU8,

    /// Additional data (e.g., ESP-IDF error code, attempt count).
    data: AtomicU32,

    /// Total fault count since boot (never cleared).
    count: AtomicU32,
}

impl FaultState {
    /// Create new fault state (no fault).
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            data: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Set fault state.
    ///
    /// This atomically sets the fault as active with the given code and data.
    /// Increments the fault counter.
    #[inline]
    pub fn set(&self, code: FaultCode, data: u32) {
        self.code.store(code as u8, Ordering::Release);
        self.data.store(data, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    /// Check if fault is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Get fault code (only meaningful if `is_active()` is true).
    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from_u8(self.code.load(Ordering::Acquire))
    }

    /// Get fault data (meaning depends on fault code).
    #[inline]
    pub fn data(&self) -> u32 {
        self.data.load(Ordering::Acquire)
    }

    /// Get total fault count since boot.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Clear the fault only if it still carries `code`.
    ///
    /// Lets a component retract its own fault without hiding another one.
    #[inline]
    pub fn clear_if(&self, code: FaultCode) -> bool {
        if self.is_active() && self.code() == code {
            self.clear();
            true
        } else {
            false
        }
    }

    /// Clear fault state (after recovery).
    ///
    /// Note: This clears the active flag but does NOT reset the counter.
    /// Fault history is preserved for diagnostics.
    #[inline]
    pub fn clear(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Get a snapshot of the current fault state.
    #[inline]
    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            active: self.is_active(),
            code: self.code(),
            data: self.data(),
            count: self.count(),
        }
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of fault state at a point in time.
#[derive(Clone, Copy, Debug)]
pub struct FaultSnapshot {
    pub active: bool,
    pub code: FaultCode,
    pub data: u32,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_state_basic() {
        let fault = FaultState::new();

        assert!(!fault.is_active());
        assert_eq!(fault.code(), FaultCode::None);
        assert_eq!(fault.count(), 0);

        fault.set(FaultCode::AcquisitionInstall, 259);

        assert!(fault.is_active());
        assert_eq!(fault.code(), FaultCode::AcquisitionInstall);
        assert_eq!(fault.data(), 259);
        assert_eq!(fault.count(), 1);

        fault.clear();

        assert!(!fault.is_active());
        assert_eq!(fault.count(), 1); // Count preserved
    }

    #[test]
    fn test_clear_if_matches_code() {
        let fault = FaultState::new();
        fault.set(FaultCode::ServiceStart, 1);

        assert!(!fault.clear_if(FaultCode::AdvertisingStalled));
        assert!(fault.is_active());

        assert!(fault.clear_if(FaultCode::ServiceStart));
        assert!(!fault.is_active());
    }

    #[test]
    fn test_code_roundtrip() {
        for raw in 0..=6u8 {
            assert_eq!(FaultCode::from_u8(raw) as u8, raw);
        }
        assert_eq!(FaultCode::from_u8(200), FaultCode::None);
    }
}
