//! Connection state shared between the radio core and the streaming core.
//!
//! # Architecture
//!
//! ```text
//! Radio core (BLE callbacks)          Streaming core
//! ──────────────────────────          ──────────────
//! on_connect()     ──┐
//! on_disconnect()  ──┼──▶ ConnectionState ──▶ is_connected(), max_payload()
//! on_mtu_changed() ──┘        │
//!                             └── events ──▶ LinkSupervisor (radio core)
//! ```
//!
//! Writers are the transport's event handlers only. Readers never block:
//! the state and MTU are plain atomics, and every handler call is also
//! posted to a lock-free queue for the control plane.

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use heapless::mpmc::MpMcQueue;

use crate::config::{notify_payload_for_mtu, DEFAULT_ATT_MTU, MAX_ATT_MTU};

/// Pending connection events the queue can hold.
pub const EVENT_QUEUE_LEN: usize = 16;

/// Link state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connected = 1,
}

impl LinkState {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkState::Connected,
            _ => LinkState::Disconnected,
        }
    }
}

/// Event raised by the transport collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// Negotiated ATT MTU after clamping.
    MtuChanged(u16),
}

/// Process-wide connection state.
pub struct ConnectionState {
    state: AtomicU8,
    mtu: AtomicU16,
    connects: AtomicU32,
    disconnects: AtomicU32,
    dropped_events: AtomicU32,
    events: MpMcQueue<ConnectionEvent, EVENT_QUEUE_LEN>,
}

impl ConnectionState {
    /// Disconnected, default MTU.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Disconnected as u8),
            mtu: AtomicU16::new(DEFAULT_ATT_MTU),
            connects: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            dropped_events: AtomicU32::new(0),
            events: MpMcQueue::new(),
        }
    }

    /// Peer connected. Idempotent.
    pub fn on_connect(&self) {
        let previous = self.state.swap(LinkState::Connected as u8, Ordering::AcqRel);
        if LinkState::from_u8(previous) == LinkState::Disconnected {
            self.connects.fetch_add(1, Ordering::Relaxed);
        }
        self.post(ConnectionEvent::Connected);
    }

    /// Peer gone. Idempotent; the MTU falls back to the default.
    ///
    /// The event is posted on every call so advertising is restarted even
    /// when the stack reports a disconnect twice.
    pub fn on_disconnect(&self) {
        let previous = self.state.swap(LinkState::Disconnected as u8, Ordering::AcqRel);
        if LinkState::from_u8(previous) == LinkState::Connected {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.mtu.store(DEFAULT_ATT_MTU, Ordering::Release);
        self.post(ConnectionEvent::Disconnected);
    }

    /// MTU negotiated. Does not change the link state.
    ///
    /// Values are clamped to `DEFAULT_ATT_MTU..=MAX_ATT_MTU`. The streaming
    /// task picks the new value up at its next block.
    pub fn on_mtu_changed(&self, mtu: u16) {
        let mtu = mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU);
        self.mtu.store(mtu, Ordering::Release);
        self.post(ConnectionEvent::MtuChanged(mtu));
    }

    #[inline]
    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Negotiated ATT MTU.
    #[inline]
    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Acquire)
    }

    /// Notification payload available at the current MTU.
    #[inline]
    pub fn max_payload(&self) -> usize {
        notify_payload_for_mtu(self.mtu())
    }

    /// Take the oldest pending event.
    #[inline]
    pub fn poll_event(&self) -> Option<ConnectionEvent> {
        self.events.dequeue()
    }

    /// Connections since boot.
    #[inline]
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Disconnections since boot.
    #[inline]
    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Events lost because the queue was full.
    #[inline]
    pub fn dropped_events(&self) -> u32 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            state: self.state(),
            mtu: self.mtu(),
            connects: self.connect_count(),
            disconnects: self.disconnect_count(),
        }
    }

    #[inline]
    fn post(&self, event: ConnectionEvent) {
        if self.events.enqueue(event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the link at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub mtu: u16,
    pub connects: u32,
    pub disconnects: u32,
}
