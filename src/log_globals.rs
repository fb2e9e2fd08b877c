//! Global log stream instances.
//!
//! One ring per core, so each ring has a single producing context.

use crate::logging::LogStream;

/// Log ring for the streaming core.
///
/// Producer: StreamingTask. Consumer: LogDrain on the radio core.
pub static STREAM_LOG: LogStream = LogStream::new();

/// Log ring for the radio core.
///
/// Producers: bring-up, LinkSupervisor, BLE callbacks. Consumer: LogDrain.
pub static RADIO_LOG: LogStream = LogStream::new();
