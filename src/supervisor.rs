//! Link supervisor: reconnection recovery on the control core.
//!
//! Consumes the connection events posted by the transport callbacks and
//! keeps the node discoverable. Every disconnect schedules an advertising
//! restart after a settle delay; a connect cancels it. Restarts that keep
//! failing raise [`FaultCode::AdvertisingStalled`] and are retried for as
//! long as the link stays down.

use crate::config::{notify_payload_for_mtu, StreamConfig};
use crate::connection::{ConnectionEvent, ConnectionState};
use crate::fault::{FaultCode, FaultState};
use crate::logging::LogStream;
use crate::transport::{TransportFault, TransportPort};
use crate::{rt_debug, rt_error, rt_info, rt_warn};

/// What one [`LinkSupervisor::poll`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkAction {
    /// Nothing due.
    None,
    /// Advertising restarted.
    Advertised,
    /// Restart failed, retry scheduled.
    AdvertiseFailed(TransportFault),
}

pub struct LinkSupervisor<'a> {
    link: &'a ConnectionState,
    fault: &'a FaultState,
    log: &'a LogStream,
    settle_ms: u64,
    retry_ms: u64,
    max_attempts: u8,
    restart_at_ms: Option<u64>,
    failures: u8,
    seen_dropped: u32,
}

impl<'a> LinkSupervisor<'a> {
    pub fn new(
        config: &StreamConfig,
        link: &'a ConnectionState,
        fault: &'a FaultState,
        log: &'a LogStream,
    ) -> Self {
        Self {
            link,
            fault,
            log,
            settle_ms: u64::from(config.reconnect_settle_ms),
            retry_ms: u64::from(config.advertise_retry_ms),
            max_attempts: config.max_advertise_attempts.max(1),
            restart_at_ms: None,
            failures: 0,
            seen_dropped: 0,
        }
    }

    /// When the next advertising restart is due, if one is pending.
    #[inline]
    pub fn pending_restart_ms(&self) -> Option<u64> {
        self.restart_at_ms
    }

    /// Consecutive failed restarts.
    #[inline]
    pub fn failures(&self) -> u8 {
        self.failures
    }

    /// Ask for advertising while no peer is connected, e.g. after start-up
    /// gave up on it. The restart runs `advertise_retry_ms` from `now_ms`.
    pub fn request_advertising(&mut self, now_ms: u64) {
        if !self.link.is_connected() {
            self.schedule(now_ms + self.retry_ms);
        }
    }

    /// Handle pending events and run a due restart.
    pub fn poll<T: TransportPort>(&mut self, transport: &mut T, now_ms: u64) -> LinkAction {
        let now_us = (now_ms * 1000) as i64;

        while let Some(event) = self.link.poll_event() {
            match event {
                ConnectionEvent::Connected => {
                    self.restart_at_ms = None;
                    self.failures = 0;
                    self.fault.clear_if(FaultCode::AdvertisingStalled);
                    rt_info!(
                        self.log,
                        now_us,
                        "peer connected (#{})",
                        self.link.connect_count()
                    );
                }
                ConnectionEvent::Disconnected => {
                    self.schedule(now_ms + self.settle_ms);
                    rt_info!(
                        self.log,
                        now_us,
                        "peer disconnected, advertising in {} ms",
                        self.settle_ms
                    );
                }
                ConnectionEvent::MtuChanged(mtu) => {
                    rt_info!(
                        self.log,
                        now_us,
                        "MTU {} ({} byte payload)",
                        mtu,
                        notify_payload_for_mtu(mtu)
                    );
                }
            }
        }

        // A lost Disconnected event must not leave the node invisible
        let dropped = self.link.dropped_events();
        if dropped != self.seen_dropped {
            rt_warn!(
                self.log,
                now_us,
                "{} connection events lost",
                dropped.wrapping_sub(self.seen_dropped)
            );
            self.seen_dropped = dropped;
            if !self.link.is_connected() {
                self.schedule(now_ms + self.settle_ms);
            }
        }

        match self.restart_at_ms {
            Some(at) if now_ms >= at => {}
            _ => return LinkAction::None,
        }

        if self.link.is_connected() {
            self.restart_at_ms = None;
            return LinkAction::None;
        }

        match transport.restart_advertising() {
            Ok(()) => {
                if self.failures > 0 {
                    rt_info!(
                        self.log,
                        now_us,
                        "advertising restarted after {} failures",
                        self.failures
                    );
                } else {
                    rt_debug!(self.log, now_us, "advertising restarted");
                }
                self.restart_at_ms = None;
                self.failures = 0;
                self.fault.clear_if(FaultCode::AdvertisingStalled);
                LinkAction::Advertised
            }
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                self.restart_at_ms = Some(now_ms + self.retry_ms);
                rt_warn!(
                    self.log,
                    now_us,
                    "advertising restart {} failed: {}",
                    self.failures,
                    err
                );
                if self.failures == self.max_attempts {
                    self.fault
                        .set(FaultCode::AdvertisingStalled, u32::from(self.failures));
                    rt_error!(
                        self.log,
                        now_us,
                        "advertising stalled after {} attempts",
                        self.failures
                    );
                }
                LinkAction::AdvertiseFailed(err)
            }
        }
    }

    #[inline]
    fn schedule(&mut self, at_ms: u64) {
        if self.restart_at_ms.is_none() {
            self.restart_at_ms = Some(at_ms);
        }
    }
}
