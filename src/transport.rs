//! Transport port: the BLE GATT collaborator.
//!
//! The implementation owns the BLE stack. It reports link changes by
//! calling the [`ConnectionState`](crate::connection::ConnectionState)
//! handlers from its own callbacks; the pipeline only pushes bytes and asks
//! for advertising.

use core::fmt;

use crate::config::StreamConfig;
use crate::fault::FaultCode;

/// Characteristic properties exposed to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub notify: bool,
    pub read: bool,
    pub write: bool,
}

impl Capabilities {
    /// Notify only, what the audio characteristic uses.
    pub const NOTIFY: Self = Self {
        notify: true,
        read: false,
        write: false,
    };

    /// Notify plus reads of the last delivered value.
    pub const NOTIFY_READ: Self = Self {
        notify: true,
        read: true,
        write: false,
    };
}

/// GATT service definition plus advertising parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub device_name: &'static str,
    pub service_uuid: &'static str,
    pub characteristic_uuid: &'static str,
    pub capabilities: Capabilities,
    /// Preferred connection interval advertised to the central, 1.25 ms units.
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,
    pub preferred_mtu: u16,
}

impl From<&StreamConfig> for ServiceConfig {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            device_name: cfg.device_name,
            service_uuid: cfg.service_uuid,
            characteristic_uuid: cfg.characteristic_uuid,
            capabilities: cfg.capabilities,
            adv_interval_min: cfg.adv_interval_min,
            adv_interval_max: cfg.adv_interval_max,
            preferred_mtu: cfg.preferred_mtu,
        }
    }
}

/// Transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportFault {
    /// T01: no peer connected. Expected during disconnects.
    NotConnected,
    /// T02: stack out of buffers for notifications.
    Congested,
    /// T03: service registration failed (ESP-IDF error code). Fatal.
    ServiceStart(i32),
    /// T04: advertising start failed (ESP-IDF error code).
    Advertising(i32),
    /// T05: notify rejected by the stack (ESP-IDF error code).
    Notify(i32),
    /// T06: MTU outside what the stack accepts.
    InvalidMtu(u16),
}

impl TransportFault {
    /// Whether the transport cannot be used at all.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ServiceStart(_))
    }

    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "T01",
            Self::Congested => "T02",
            Self::ServiceStart(_) => "T03",
            Self::Advertising(_) => "T04",
            Self::Notify(_) => "T05",
            Self::InvalidMtu(_) => "T06",
        }
    }

    /// Fault record when this failure keeps the node from serving a peer.
    ///
    /// Per-packet failures abort one block and raise nothing.
    pub fn fault(&self) -> Option<(FaultCode, u32)> {
        match *self {
            Self::ServiceStart(err) => Some((FaultCode::ServiceStart, err as u32)),
            Self::Advertising(err) => Some((FaultCode::AdvertisingStalled, err as u32)),
            Self::NotConnected | Self::Congested | Self::Notify(_) | Self::InvalidMtu(_) => None,
        }
    }
}

/// Parse a canonical `8-4-4-4-12` UUID string into its 128-bit value.
///
/// The most significant byte is the first hex pair, the order BLE stacks
/// expect for a `u128` UUID constant.
pub const fn parse_uuid128(uuid: &str) -> Option<u128> {
    let bytes = uuid.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    let mut value: u128 = 0;
    let mut digits = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if i == 8 || i == 13 || i == 18 || i == 23 {
            if c != b'-' {
                return None;
            }
        } else {
            let nibble = match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => return None,
            };
            value = (value << 4) | nibble as u128;
            digits += 1;
        }
        i += 1;
    }
    if digits == 32 {
        Some(value)
    } else {
        None
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "{}: not connected", self.code()),
            Self::Congested => write!(f, "{}: congested", self.code()),
            Self::ServiceStart(err) => write!(f, "{}: service start failed ({})", self.code(), err),
            Self::Advertising(err) => write!(f, "{}: advertising failed ({})", self.code(), err),
            Self::Notify(err) => write!(f, "{}: notify failed ({})", self.code(), err),
            Self::InvalidMtu(mtu) => write!(f, "{}: invalid MTU {}", self.code(), mtu),
        }
    }
}

/// Wireless delivery collaborator.
pub trait TransportPort {
    /// Register the service and characteristic, set advertising data.
    fn start_service(&mut self, service: &ServiceConfig) -> Result<(), TransportFault>;

    /// Push `payload` to the connected peer as one notification.
    ///
    /// Fire-and-forget: returns once the stack accepted the bytes.
    fn notify(&mut self, payload: &[u8]) -> Result<(), TransportFault>;

    /// (Re)start advertising so a peer can connect.
    fn restart_advertising(&mut self) -> Result<(), TransportFault>;

    /// MTU the node asks for during the exchange.
    fn set_preferred_mtu(&mut self, mtu: u16) -> Result<(), TransportFault>;
}

impl<T: TransportPort + ?Sized> TransportPort for &mut T {
    fn start_service(&mut self, service: &ServiceConfig) -> Result<(), TransportFault> {
        (**self).start_service(service)
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), TransportFault> {
        (**self).notify(payload)
    }

    fn restart_advertising(&mut self) -> Result<(), TransportFault> {
        (**self).restart_advertising()
    }

    fn set_preferred_mtu(&mut self, mtu: u16) -> Result<(), TransportFault> {
        (**self).set_preferred_mtu(mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CHARACTERISTIC_UUID, SERVICE_UUID};

    #[test]
    fn test_parse_service_uuid() {
        assert_eq!(
            parse_uuid128(SERVICE_UUID),
            Some(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b)
        );
        assert_eq!(
            parse_uuid128(CHARACTERISTIC_UUID),
            Some(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_uuid128(""), None);
        assert_eq!(parse_uuid128("4fafc201-1fb5-459e-8fcc-c5c9c331914"), None);
        assert_eq!(parse_uuid128("4fafc201x1fb5-459e-8fcc-c5c9c331914b"), None);
        assert_eq!(parse_uuid128("4fafc201-1fb5-459e-8fcc-c5c9c331914g"), None);
    }

    #[test]
    fn test_service_config_from_stream_config() {
        let service = ServiceConfig::from(&StreamConfig::live_microphone());
        assert_eq!(service.device_name, "ESP32_Audio_Stream");
        assert_eq!(service.capabilities, Capabilities::NOTIFY);
        assert_eq!(service.preferred_mtu, 517);

        let service = ServiceConfig::from(&StreamConfig::level_meter());
        assert_eq!(service.capabilities, Capabilities::NOTIFY_READ);
    }

    #[test]
    fn test_only_service_start_is_fatal() {
        assert!(TransportFault::ServiceStart(-1).is_fatal());
        assert!(!TransportFault::NotConnected.is_fatal());
        assert!(!TransportFault::Notify(-1).is_fatal());
        assert!(!TransportFault::Advertising(-1).is_fatal());
    }

    #[test]
    fn test_only_link_level_failures_raise_faults() {
        assert_eq!(
            TransportFault::ServiceStart(-3).fault(),
            Some((FaultCode::ServiceStart, (-3i32) as u32))
        );
        assert_eq!(
            TransportFault::Advertising(-1).fault().map(|(code, _)| code),
            Some(FaultCode::AdvertisingStalled)
        );
        assert_eq!(TransportFault::NotConnected.fault(), None);
        assert_eq!(TransportFault::Congested.fault(), None);
        assert_eq!(TransportFault::Notify(-1).fault(), None);
        assert_eq!(TransportFault::InvalidMtu(600).fault(), None);
    }
}
