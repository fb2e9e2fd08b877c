//! # BleMicStreamer
//!
//! Real-time I2S microphone streaming over BLE notifications.
//!
//! ## Architecture
//!
//! ```text
//! Streaming core                                   Radio core
//! ──────────────                                   ──────────
//! AcquisitionPort ─▶ Processor ─▶ Framer ─▶ TransportPort::notify
//!        ▲                                    │
//!        └──────── ConnectionState ◀──────────┘ BLE callbacks
//!                         │
//!                         └─ events ─▶ LinkSupervisor ─▶ restart_advertising
//! ```
//!
//! The streaming task owns its buffers and never allocates. The two cores
//! share only atomics: [`ConnectionState`], [`FaultState`] and the log
//! rings.

#![cfg_attr(not(test), no_std)]

#[cfg(target_os = "espidf")]
extern crate std;

pub mod acquisition;
pub mod audio;
pub mod block;
pub mod bringup;
pub mod clock;
pub mod config;
pub mod connection;
pub mod fault;
pub mod framer;
pub mod log_drain;
pub mod logging;
pub mod processor;
pub mod streaming;
pub mod supervisor;
pub mod transport;
pub mod wire;

#[cfg(target_os = "espidf")]
pub mod hal;

mod log_globals;

pub use acquisition::{AcquisitionConfig, AcquisitionFault, AcquisitionPort, BlockReader, SampleSource};
pub use block::{ProcessedBlock, SampleBlock};
pub use clock::Clock;
pub use config::{ProcessingMode, StreamConfig, CONFIG};
pub use connection::{ConnectionEvent, ConnectionState, LinkState};
pub use fault::{FaultCode, FaultState};
pub use framer::{Framer, TransportPacket};
pub use log_globals::{RADIO_LOG, STREAM_LOG};
pub use processor::Processor;
pub use streaming::{Iteration, StreamStats, StreamingTask};
pub use supervisor::{LinkAction, LinkSupervisor};
pub use transport::{ServiceConfig, TransportFault, TransportPort};
