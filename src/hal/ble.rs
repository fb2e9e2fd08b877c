//! BLE GATT server on Bluedroid.
//!
//! One primary service with one notify characteristic and its CCCD. When
//! the characteristic is readable its value tracks the last notification.
//! Service registration in Bluedroid is a chain of callbacks:
//!
//! ```text
//! register_app ─▶ ServiceRegistered ─▶ create_service + adv data
//!              ─▶ ServiceCreated    ─▶ start_service + add_characteristic
//!              ─▶ CharacteristicAdded ─▶ add_descriptor (0x2902)
//!              ─▶ DescriptorAdded   ─▶ ready
//! AdvertisingConfigured ─▶ start_advertising
//! ```
//!
//! [`BleServer::start_service`] waits for that chain to finish. Link
//! callbacks are forwarded to the shared [`ConnectionState`].

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU8, Ordering};

use std::sync::{Arc, OnceLock};

use enumset::{enum_set, EnumSet};
use esp_idf_svc::bt::ble::gap::{AdvConfiguration, BleGapEvent, EspBleGap};
use esp_idf_svc::bt::ble::gatt::server::{EspGatts, GattsEvent};
use esp_idf_svc::bt::ble::gatt::{
    AutoResponse, GattCharacteristic, GattDescriptor, GattId, GattInterface, GattServiceId,
    GattStatus, Permission, Property,
};
use esp_idf_svc::bt::{Ble, BtDriver, BtStatus, BtUuid};
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{esp, esp_ble_gatt_set_local_mtu, esp_err_t, EspError, ESP_FAIL};

use crate::config::{DEFAULT_ATT_MTU, MAX_ATT_MTU, MAX_NOTIFY_PAYLOAD};
use crate::connection::ConnectionState;
use crate::transport::{parse_uuid128, ServiceConfig, TransportFault, TransportPort};
use crate::{rt_debug, rt_error, rt_info, RADIO_LOG};

type Driver = BtDriver<'static, Ble>;
type Gap = EspBleGap<'static, Ble, Arc<Driver>>;
type Gatts = EspGatts<'static, Ble, Arc<Driver>>;

const APP_ID: u16 = 0;

/// Client Characteristic Configuration descriptor.
const CCCD_UUID: u16 = 0x2902;

/// General discoverable, BR/EDR not supported.
const ADV_FLAGS: u8 = 0x06;

/// Service + characteristic declaration + value + CCCD.
const SERVICE_HANDLES: u16 = 4;

const SETUP_TIMEOUT_MS: u32 = 3_000;
const SETUP_POLL_MS: u32 = 10;

const NO_INTERFACE: u8 = u8::MAX;

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Setup {
    Pending = 0,
    Ready = 1,
    Failed = 2,
}

struct Inner {
    gap: Gap,
    gatts: Gatts,
    link: &'static ConnectionState,
    service: OnceLock<ServiceConfig>,
    setup: AtomicU8,
    setup_error: AtomicI32,
    gatt_if: AtomicU8,
    value_handle: AtomicU16,
    conn_id: AtomicU16,
    peer: AtomicBool,
    congested: AtomicBool,
}

/// Handle to the GATT server, cloned for each task that needs it.
#[derive(Clone)]
pub struct BleServer {
    inner: Arc<Inner>,
}

#[inline]
fn now_us() -> i64 {
    // SAFETY: esp_timer_get_time is always safe to call
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

impl BleServer {
    /// Bring up the controller and Bluedroid and hook the callbacks.
    pub fn new(
        modem: Modem,
        nvs: EspDefaultNvsPartition,
        link: &'static ConnectionState,
    ) -> Result<Self, EspError> {
        let driver = Arc::new(BtDriver::new(modem, Some(nvs))?);
        let inner = Arc::new(Inner {
            gap: EspBleGap::new(driver.clone())?,
            gatts: EspGatts::new(driver)?,
            link,
            service: OnceLock::new(),
            setup: AtomicU8::new(Setup::Pending as u8),
            setup_error: AtomicI32::new(0),
            gatt_if: AtomicU8::new(NO_INTERFACE),
            value_handle: AtomicU16::new(0),
            conn_id: AtomicU16::new(0),
            peer: AtomicBool::new(false),
            congested: AtomicBool::new(false),
        });

        let gap_inner = inner.clone();
        inner.gap.subscribe(move |event| gap_inner.on_gap_event(event))?;

        let gatts_inner = inner.clone();
        inner
            .gatts
            .subscribe(move |(gatt_if, event)| gatts_inner.on_gatts_event(gatt_if, event))?;

        Ok(Self { inner })
    }

    fn setup_state(&self) -> Setup {
        match self.inner.setup.load(Ordering::Acquire) {
            1 => Setup::Ready,
            2 => Setup::Failed,
            _ => Setup::Pending,
        }
    }
}

impl Inner {
    fn readable(&self) -> bool {
        self.service.get().is_some_and(|service| service.capabilities.read)
    }

    /// Drop a half-built registration so the chain can run again from
    /// `register_app`. Unregistering also deletes the app's service.
    fn reset_app(&self) -> Result<(), TransportFault> {
        let gatt_if = self.gatt_if.swap(NO_INTERFACE, Ordering::AcqRel);
        self.value_handle.store(0, Ordering::Release);
        if gatt_if != NO_INTERFACE {
            self.gatts
                .unregister_app(gatt_if)
                .map_err(|err| TransportFault::ServiceStart(err.code()))?;
        }
        self.setup.store(Setup::Pending as u8, Ordering::Release);
        Ok(())
    }

    fn fail(&self, code: esp_err_t) {
        self.setup_error.store(code, Ordering::Relaxed);
        self.setup.store(Setup::Failed as u8, Ordering::Release);
        rt_error!(RADIO_LOG, now_us(), "GATT setup failed ({})", code);
    }

    fn gatt_ok(&self, status: GattStatus) -> bool {
        if matches!(status, GattStatus::Ok) {
            true
        } else {
            self.fail(ESP_FAIL);
            false
        }
    }

    fn on_gap_event(&self, event: BleGapEvent) {
        if let BleGapEvent::AdvertisingConfigured(status) = event {
            if !matches!(status, BtStatus::Success) {
                self.fail(ESP_FAIL);
                return;
            }
            if let Err(err) = self.gap.start_advertising() {
                rt_error!(RADIO_LOG, now_us(), "advertising start failed ({})", err.code());
            }
        }
    }

    fn on_gatts_event(&self, gatt_if: GattInterface, event: GattsEvent) {
        if let Err(err) = self.handle_gatts_event(gatt_if, event) {
            self.fail(err.code());
        }
    }

    fn handle_gatts_event(&self, gatt_if: GattInterface, event: GattsEvent) -> Result<(), EspError> {
        match event {
            GattsEvent::ServiceRegistered { status, app_id } if app_id == APP_ID => {
                if self.gatt_ok(status) {
                    self.gatt_if.store(gatt_if, Ordering::Release);
                    self.create_service(gatt_if)?;
                }
            }
            GattsEvent::ServiceCreated {
                status,
                service_handle,
                ..
            } => {
                if self.gatt_ok(status) {
                    self.gatts.start_service(service_handle)?;
                    self.add_characteristic(service_handle)?;
                }
            }
            GattsEvent::CharacteristicAdded {
                status,
                attr_handle,
                service_handle,
                ..
            } => {
                if self.gatt_ok(status) {
                    self.value_handle.store(attr_handle, Ordering::Release);
                    self.gatts.add_descriptor(
                        service_handle,
                        &GattDescriptor {
                            uuid: BtUuid::uuid16(CCCD_UUID),
                            permissions: enum_set!(Permission::Read | Permission::Write),
                        },
                    )?;
                }
            }
            GattsEvent::DescriptorAdded { status, .. } => {
                if self.gatt_ok(status) {
                    self.setup.store(Setup::Ready as u8, Ordering::Release);
                }
            }
            GattsEvent::PeerConnected { conn_id, .. } => {
                self.conn_id.store(conn_id, Ordering::Release);
                self.congested.store(false, Ordering::Relaxed);
                self.peer.store(true, Ordering::Release);
                self.link.on_connect();
            }
            GattsEvent::PeerDisconnected { conn_id, .. } => {
                self.peer.store(false, Ordering::Release);
                self.link.on_disconnect();
                rt_debug!(RADIO_LOG, now_us(), "conn {} closed", conn_id);
            }
            GattsEvent::Mtu { mtu, .. } => {
                self.link.on_mtu_changed(mtu);
            }
            GattsEvent::Congest { congested, .. } => {
                self.congested.store(congested, Ordering::Relaxed);
            }
            _ => {}
        }
        Ok(())
    }

    fn create_service(&self, gatt_if: GattInterface) -> Result<(), EspError> {
        let Some(service) = self.service.get() else {
            return Ok(());
        };
        let Some(uuid) = parse_uuid128(service.service_uuid) else {
            self.fail(ESP_FAIL);
            return Ok(());
        };

        self.gap.set_device_name(service.device_name)?;
        self.gap.set_adv_conf(&AdvConfiguration {
            include_name: true,
            include_txpower: true,
            flag: ADV_FLAGS,
            service_uuid: Some(BtUuid::uuid128(uuid)),
            min_interval: i32::from(service.adv_interval_min),
            max_interval: i32::from(service.adv_interval_max),
            ..Default::default()
        })?;
        self.gatts.create_service(
            gatt_if,
            &GattServiceId {
                id: GattId {
                    uuid: BtUuid::uuid128(uuid),
                    inst_id: 0,
                },
                is_primary: true,
            },
            SERVICE_HANDLES,
        )?;
        Ok(())
    }

    fn add_characteristic(&self, service_handle: u16) -> Result<(), EspError> {
        let Some(service) = self.service.get() else {
            return Ok(());
        };
        let Some(uuid) = parse_uuid128(service.characteristic_uuid) else {
            self.fail(ESP_FAIL);
            return Ok(());
        };

        let caps = service.capabilities;
        let mut properties = EnumSet::empty();
        let mut permissions = EnumSet::empty();
        if caps.notify {
            properties.insert(Property::Notify);
        }
        if caps.read {
            properties.insert(Property::Read);
            permissions.insert(Permission::Read);
        }
        if caps.write {
            properties.insert(Property::Write);
            permissions.insert(Permission::Write);
        }

        self.gatts.add_characteristic(
            service_handle,
            &GattCharacteristic {
                uuid: BtUuid::uuid128(uuid),
                permissions,
                properties,
                max_len: MAX_NOTIFY_PAYLOAD,
                auto_rsp: AutoResponse::ByGatt,
            },
            &[],
        )?;
        Ok(())
    }
}

impl TransportPort for BleServer {
    fn start_service(&mut self, service: &ServiceConfig) -> Result<(), TransportFault> {
        match self.setup_state() {
            Setup::Ready => return Ok(()),
            Setup::Failed => self.inner.reset_app()?,
            Setup::Pending => {}
        }
        // First definition wins; later retries reuse it
        let _ = self.inner.service.set(*service);

        self.inner
            .gatts
            .register_app(APP_ID)
            .map_err(|err| TransportFault::ServiceStart(err.code()))?;

        let mut waited = 0;
        while waited < SETUP_TIMEOUT_MS {
            match self.setup_state() {
                Setup::Ready => {
                    rt_info!(RADIO_LOG, now_us(), "GATT service ready");
                    return Ok(());
                }
                Setup::Failed => {
                    return Err(TransportFault::ServiceStart(
                        self.inner.setup_error.load(Ordering::Relaxed),
                    ))
                }
                Setup::Pending => {}
            }
            FreeRtos::delay_ms(SETUP_POLL_MS);
            waited += SETUP_POLL_MS;
        }
        // Marked failed so the next attempt unregisters first
        self.inner.fail(ESP_FAIL);
        Err(TransportFault::ServiceStart(ESP_FAIL))
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), TransportFault> {
        if !self.inner.peer.load(Ordering::Acquire) {
            return Err(TransportFault::NotConnected);
        }
        if self.inner.congested.load(Ordering::Relaxed) {
            return Err(TransportFault::Congested);
        }
        let gatt_if = self.inner.gatt_if.load(Ordering::Acquire);
        if gatt_if == NO_INTERFACE {
            return Err(TransportFault::NotConnected);
        }
        let value_handle = self.inner.value_handle.load(Ordering::Acquire);

        // Reads return the last payload pushed
        if self.inner.readable() {
            self.inner
                .gatts
                .set_attr(value_handle, payload)
                .map_err(|err| TransportFault::Notify(err.code()))?;
        }

        self.inner
            .gatts
            .notify(
                gatt_if,
                self.inner.conn_id.load(Ordering::Acquire),
                value_handle,
                payload,
            )
            .map_err(|err| TransportFault::Notify(err.code()))
    }

    fn restart_advertising(&mut self) -> Result<(), TransportFault> {
        self.inner
            .gap
            .start_advertising()
            .map_err(|err| TransportFault::Advertising(err.code()))
    }

    fn set_preferred_mtu(&mut self, mtu: u16) -> Result<(), TransportFault> {
        if !(DEFAULT_ATT_MTU..=MAX_ATT_MTU).contains(&mtu) {
            return Err(TransportFault::InvalidMtu(mtu));
        }
        // SAFETY: plain setter on the initialized Bluedroid stack
        esp!(unsafe { esp_ble_gatt_set_local_mtu(mtu) }).map_err(|_| TransportFault::InvalidMtu(mtu))
    }
}
