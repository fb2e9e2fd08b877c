//! Log output on the radio core.
//!
//! Drains both log rings into a byte sink (UART on target). The streaming
//! ring is emptied first so its messages are not starved by control-plane
//! chatter.

use core::fmt::Write;

use crate::logging::{BufWriter, LogEntry, LogStream};

/// Interval between dropped-message reports (µs).
pub const DROP_REPORT_INTERVAL_US: i64 = 10_000_000;

/// Destination for formatted log lines.
pub trait LogSink {
    fn write_all(&mut self, bytes: &[u8]);
}

/// Format log entry to string.
///
/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut writer = BufWriter::new(buf);
    let _ = write!(
        writer,
        "[{:10}] {}: {}\n",
        entry.timestamp_us,
        entry.level.as_str(),
        entry.message()
    );
    writer.len()
}

/// Drains the streaming and radio log rings.
pub struct LogDrain<'a> {
    stream: &'a LogStream,
    radio: &'a LogStream,
    last_drop_report_us: i64,
}

impl<'a> LogDrain<'a> {
    pub fn new(stream: &'a LogStream, radio: &'a LogStream) -> Self {
        Self {
            stream,
            radio,
            last_drop_report_us: 0,
        }
    }

    /// Write every pending entry to `sink`.
    ///
    /// Reports dropped counts at most every [`DROP_REPORT_INTERVAL_US`].
    /// Returns the number of entries written.
    pub fn drain_once<S: LogSink>(&mut self, sink: &mut S, now_us: i64) -> usize {
        let mut format_buf = [0u8; 256];
        let mut written = 0;

        // Priority 1: streaming core
        while let Some(entry) = self.stream.drain() {
            let len = format_log_entry(&entry, &mut format_buf);
            sink.write_all(&format_buf[..len]);
            written += 1;
        }

        // Priority 2: radio core
        while let Some(entry) = self.radio.drain() {
            let len = format_log_entry(&entry, &mut format_buf);
            sink.write_all(&format_buf[..len]);
            written += 1;
        }

        if now_us - self.last_drop_report_us >= DROP_REPORT_INTERVAL_US {
            let stream_dropped = self.stream.dropped();
            let radio_dropped = self.radio.dropped();

            if stream_dropped > 0 || radio_dropped > 0 {
                let mut msg = [0u8; 64];
                let mut w = BufWriter::new(&mut msg);
                let _ = write!(
                    w,
                    "[WARN] Dropped: STREAM={}, RADIO={}\n",
                    stream_dropped, radio_dropped
                );
                let len = w.len();
                sink.write_all(&msg[..len]);

                self.stream.reset_dropped();
                self.radio.reset_dropped();
            }

            self.last_drop_report_us = now_us;
        }

        written
    }
}

#[cfg(target_os = "espidf")]
impl<'d> LogSink for esp_idf_svc::hal::uart::UartTxDriver<'d> {
    fn write_all(&mut self, bytes: &[u8]) {
        let _ = self.write(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MAX_MSG_LEN};

    struct VecSink(std::vec::Vec<u8>);

    impl LogSink for VecSink {
        fn write_all(&mut self, bytes: &[u8]) {
            self.0.extend_from_slice(bytes);
        }
    }

    #[test]
    fn test_format_log_entry() {
        let entry = LogEntry {
            timestamp_us: 1234567,
            level: LogLevel::Info,
            len: 9,
            msg: {
                let mut msg = [0u8; MAX_MSG_LEN];
                msg[..9].copy_from_slice(b"connected");
                msg
            },
        };

        let mut buf = [0u8; 256];
        let len = format_log_entry(&entry, &mut buf);

        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(formatted, "[   1234567] INFO: connected\n");
    }

    #[test]
    fn test_stream_ring_drained_first() {
        let stream = LogStream::new();
        let radio = LogStream::new();
        radio.push(1, LogLevel::Info, b"radio");
        stream.push(2, LogLevel::Warn, b"stream");

        let mut sink = VecSink(std::vec::Vec::new());
        let mut drain = LogDrain::new(&stream, &radio);
        assert_eq!(drain.drain_once(&mut sink, 0), 2);

        let text = std::string::String::from_utf8(sink.0).unwrap();
        let stream_pos = text.find("stream").unwrap();
        let radio_pos = text.find("radio").unwrap();
        assert!(stream_pos < radio_pos);
    }

    #[test]
    fn test_drop_report() {
        let stream = LogStream::new();
        let radio = LogStream::new();
        for i in 0..200 {
            stream.push(i, LogLevel::Debug, b"x");
        }
        assert!(stream.dropped() > 0);

        let mut sink = VecSink(std::vec::Vec::new());
        let mut drain = LogDrain::new(&stream, &radio);
        drain.drain_once(&mut sink, DROP_REPORT_INTERVAL_US);

        let text = std::string::String::from_utf8(sink.0).unwrap();
        assert!(text.contains("Dropped: STREAM=72, RADIO=0"));
        assert_eq!(stream.dropped(), 0);
    }
}
