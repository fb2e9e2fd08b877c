//! Mock ports shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;

use ble_mic_streamer::acquisition::{AcquisitionConfig, AcquisitionFault, BlockReader, SampleSource};
use ble_mic_streamer::clock::Clock;
use ble_mic_streamer::connection::ConnectionState;
use ble_mic_streamer::transport::{ServiceConfig, TransportFault, TransportPort};

/// Cycles through `data`, at most `chunk` samples per read.
///
/// Scripted results in `script` are returned before any data read.
pub struct VecSource {
    pub data: Vec<i32>,
    pub pos: usize,
    pub chunk: usize,
    pub script: VecDeque<Result<usize, AcquisitionFault>>,
    pub configure_faults: VecDeque<AcquisitionFault>,
    pub configured: u32,
    pub reads: u32,
}

impl VecSource {
    pub fn new(data: Vec<i32>) -> Self {
        Self {
            chunk: data.len(),
            data,
            pos: 0,
            script: VecDeque::new(),
            configure_faults: VecDeque::new(),
            configured: 0,
            reads: 0,
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}

impl SampleSource for VecSource {
    fn configure(&mut self, _config: &AcquisitionConfig) -> Result<(), AcquisitionFault> {
        self.configured += 1;
        match self.configure_faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn read_samples(&mut self, buf: &mut [i32], _timeout_ms: u32) -> Result<usize, AcquisitionFault> {
        self.reads += 1;
        if let Some(result) = self.script.pop_front() {
            return result;
        }
        let n = buf.len().min(self.chunk);
        for slot in &mut buf[..n] {
            *slot = self.data[self.pos % self.data.len()];
            self.pos += 1;
        }
        Ok(n)
    }
}

/// Configured block reader over `data`.
pub fn reader(data: Vec<i32>) -> BlockReader<VecSource> {
    use ble_mic_streamer::acquisition::AcquisitionPort;
    use ble_mic_streamer::config::StreamConfig;

    let mut reader = BlockReader::new(VecSource::new(data));
    reader
        .configure(&AcquisitionConfig::from(&StreamConfig::live_microphone()))
        .unwrap();
    reader
}

/// Records every notification; can drop the link or fail on cue.
#[derive(Default)]
pub struct RecordingTransport<'a> {
    pub link: Option<&'a ConnectionState>,
    pub packets: Vec<Vec<u8>>,
    /// Disconnect the link after this many successful notifies.
    pub disconnect_after: Option<usize>,
    /// Fail the notify with this index (0-based, counted over all calls).
    pub fail_at: Option<usize>,
    pub notify_calls: usize,
    pub service_faults: VecDeque<TransportFault>,
    pub advertise_faults: VecDeque<TransportFault>,
    pub services: Vec<ServiceConfig>,
    pub advertisements: u32,
    pub preferred_mtu: Option<u16>,
}

impl<'a> RecordingTransport<'a> {
    pub fn new(link: &'a ConnectionState) -> Self {
        Self {
            link: Some(link),
            ..Default::default()
        }
    }

    /// All payload bytes in delivery order.
    pub fn bytes(&self) -> Vec<u8> {
        self.packets.concat()
    }
}

impl<'a> TransportPort for RecordingTransport<'a> {
    fn start_service(&mut self, service: &ServiceConfig) -> Result<(), TransportFault> {
        if let Some(fault) = self.service_faults.pop_front() {
            return Err(fault);
        }
        self.services.push(*service);
        Ok(())
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), TransportFault> {
        let call = self.notify_calls;
        self.notify_calls += 1;
        if self.fail_at == Some(call) {
            return Err(TransportFault::Notify(-1));
        }
        self.packets.push(payload.to_vec());
        if self.disconnect_after == Some(self.packets.len()) {
            if let Some(link) = self.link {
                link.on_disconnect();
            }
        }
        Ok(())
    }

    fn restart_advertising(&mut self) -> Result<(), TransportFault> {
        if let Some(fault) = self.advertise_faults.pop_front() {
            return Err(fault);
        }
        self.advertisements += 1;
        Ok(())
    }

    fn set_preferred_mtu(&mut self, mtu: u16) -> Result<(), TransportFault> {
        self.preferred_mtu = Some(mtu);
        Ok(())
    }
}

/// Time only moves when someone sleeps.
#[derive(Default)]
pub struct ManualClock {
    pub now_us: Cell<i64>,
    pub sleeps: Vec<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept_ms(&self) -> u64 {
        self.sleeps.iter().map(|&ms| u64::from(ms)).sum()
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now_us.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleeps.push(ms);
        self.now_us.set(self.now_us.get() + i64::from(ms) * 1000);
    }
}

/// Raw container word whose `>> 14` is exactly `value`, low bits noisy.
pub fn container(value: i32) -> i32 {
    (value << 14) | 0x1234
}
