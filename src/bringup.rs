//! Start-up sequence.
//!
//! Order: validate config, configure acquisition, register the GATT
//! service, request the MTU, start advertising. Hardware steps are retried
//! a bounded number of times. Acquisition and service failures record a
//! fault and leave the node up but not streaming. Advertising is different:
//! the node still streams and the link supervisor keeps retrying.

use core::fmt;

use crate::acquisition::{AcquisitionConfig, AcquisitionFault, AcquisitionPort};
use crate::clock::Clock;
use crate::config::{ConfigError, StreamConfig};
use crate::fault::{FaultCode, FaultState};
use crate::logging::LogStream;
use crate::transport::{ServiceConfig, TransportFault, TransportPort};
use crate::{rt_error, rt_info, rt_warn};

/// Start-up failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupError {
    Config(ConfigError),
    Acquisition(AcquisitionFault),
    Transport(TransportFault),
}

impl StartupError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(err) => err.code(),
            Self::Acquisition(err) => err.code(),
            Self::Transport(err) => err.code(),
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "config: {}", err),
            Self::Acquisition(err) => write!(f, "acquisition: {}", err),
            Self::Transport(err) => write!(f, "transport: {}", err),
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<AcquisitionFault> for StartupError {
    fn from(err: AcquisitionFault) -> Self {
        Self::Acquisition(err)
    }
}

impl From<TransportFault> for StartupError {
    fn from(err: TransportFault) -> Self {
        Self::Transport(err)
    }
}

/// How far start-up got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Started {
    /// Advertising, ready for a peer.
    Advertising,
    /// Everything but advertising is up; hand over to
    /// [`LinkSupervisor::request_advertising`](crate::supervisor::LinkSupervisor::request_advertising).
    AdvertisingPending(TransportFault),
}

impl Started {
    #[inline]
    pub fn is_advertising(&self) -> bool {
        matches!(self, Self::Advertising)
    }
}

/// Bring the node up. On `Err` the matching fault is already set.
pub fn start<A, T, C>(
    config: &StreamConfig,
    acquisition: &mut A,
    transport: &mut T,
    clock: &mut C,
    fault: &FaultState,
    log: &LogStream,
) -> Result<Started, StartupError>
where
    A: AcquisitionPort,
    T: TransportPort,
    C: Clock,
{
    if let Err(err) = config.validate() {
        fault.set(FaultCode::InvalidConfig, 0);
        rt_error!(log, clock.now_us(), "config rejected: {}", err);
        return Err(err.into());
    }

    if config.mode.needs_acquisition() {
        let acq_config = AcquisitionConfig::from(config);
        retry(config, clock, log, "i2s", || acquisition.configure(&acq_config)).map_err(|err| {
            let (code, data) = err.fault();
            fault.set(code, data);
            StartupError::from(err)
        })?;
    }

    let service = ServiceConfig::from(config);
    retry(config, clock, log, "gatt", || transport.start_service(&service)).map_err(|err| {
        let (code, data) = err.fault().unwrap_or((FaultCode::ServiceStart, 0));
        fault.set(code, data);
        StartupError::from(err)
    })?;

    // The link still works at the default MTU, only with more packets
    if let Err(err) = transport.set_preferred_mtu(config.preferred_mtu) {
        rt_warn!(log, clock.now_us(), "MTU {} not accepted: {}", config.preferred_mtu, err);
    }

    if !config.fits_single_packet(config.preferred_payload()) {
        rt_warn!(
            log,
            clock.now_us(),
            "{} byte blocks exceed the {} byte payload, multi-packet framing",
            config.processed_block_bytes(),
            config.preferred_payload()
        );
    }

    if let Err(err) = retry(config, clock, log, "advertising", || transport.restart_advertising()) {
        fault.set(FaultCode::AdvertisingStalled, u32::from(config.startup_attempts));
        rt_warn!(log, clock.now_us(), "starting without advertising, supervisor retries");
        return Ok(Started::AdvertisingPending(err));
    }

    rt_info!(
        log,
        clock.now_us(),
        "advertising as {} ({} mode)",
        config.device_name,
        config.mode.as_str()
    );
    Ok(Started::Advertising)
}

/// Run `op` up to `startup_attempts` times, `startup_retry_ms` apart.
fn retry<C, E, F>(config: &StreamConfig, clock: &mut C, log: &LogStream, step: &str, mut op: F) -> Result<(), E>
where
    C: Clock,
    E: fmt::Display,
    F: FnMut() -> Result<(), E>,
{
    let attempts = config.startup_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= attempts => {
                rt_error!(log, clock.now_us(), "{} failed after {} attempts: {}", step, attempt, err);
                return Err(err);
            }
            Err(err) => {
                rt_warn!(log, clock.now_us(), "{} attempt {} failed: {}", step, attempt, err);
                clock.delay_ms(config.startup_retry_ms);
                attempt += 1;
            }
        }
    }
}
