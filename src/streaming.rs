//! The streaming loop, pinned to its own core.
//!
//! # Iteration
//!
//! ```text
//! connected? ──no──▶ sleep idle_backoff_ms
//!     │yes
//!     ▼
//! read_block ──fault──▶ transient: count, next iteration
//!     │                 fatal:     raise fault, halt
//!     ▼
//! transform ─▶ pack(mtu snapshot) ─▶ notify × N ─▶ pacing
//!                                      │
//!                      error or disconnect: drop rest of block
//! ```
//!
//! Nothing in the loop allocates. Blocks are never retried: a lost block
//! is cheaper than a late one.

use crate::acquisition::{AcquisitionFault, AcquisitionPort};
use crate::block::{ProcessedBlock, SampleBlock};
use crate::clock::Clock;
use crate::config::{ConfigError, StreamConfig};
use crate::connection::ConnectionState;
use crate::fault::FaultState;
use crate::framer::{Framer, FramingError};
use crate::logging::LogStream;
use crate::processor::Processor;
use crate::transport::{TransportFault, TransportPort};
use crate::{rt_debug, rt_error, rt_info, rt_warn};

/// Outcome of one [`StreamingTask::run_once`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iteration {
    /// No peer, slept.
    Idle,
    /// Whole block sent.
    Delivered { packets: usize },
    /// Acquisition failed, block skipped.
    Dropped(AcquisitionFault),
    /// Negotiated payload cannot carry one sample.
    Unframed(FramingError),
    /// Block cut short after `sent` of `total` packets.
    Aborted {
        sent: usize,
        total: usize,
        fault: TransportFault,
    },
    /// Streaming stopped by a fatal fault.
    Halted,
}

/// Counters kept by the streaming task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub blocks_sent: u32,
    pub packets_sent: u32,
    pub bytes_sent: u64,
    /// Blocks lost before framing (acquisition or framing failure).
    pub dropped_blocks: u32,
    /// Blocks cut short during delivery.
    pub aborted_blocks: u32,
    pub idle_polls: u32,
}

pub struct StreamingTask<'a, A, T, C> {
    config: StreamConfig,
    acquisition: A,
    transport: T,
    clock: C,
    link: &'a ConnectionState,
    fault: &'a FaultState,
    log: &'a LogStream,
    block: SampleBlock,
    processed: ProcessedBlock,
    processor: Processor,
    framer: Framer,
    stats: StreamStats,
    halted: bool,
}

impl<'a, A, T, C> StreamingTask<'a, A, T, C>
where
    A: AcquisitionPort,
    T: TransportPort,
    C: Clock,
{
    /// Allocate the block buffers for `config`.
    ///
    /// The acquisition port must already be configured unless the mode
    /// generates its own samples.
    pub fn new(
        config: StreamConfig,
        acquisition: A,
        transport: T,
        clock: C,
        link: &'a ConnectionState,
        fault: &'a FaultState,
        log: &'a LogStream,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            block: SampleBlock::new(config.block_size)?,
            processed: ProcessedBlock::empty(),
            processor: Processor::from_config(&config),
            framer: Framer::new(),
            stats: StreamStats::default(),
            halted: false,
            config,
            acquisition,
            transport,
            clock,
            link,
            fault,
            log,
        })
    }

    #[inline]
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Last processed block, for inspection.
    pub fn processed(&self) -> &ProcessedBlock {
        &self.processed
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        rt_info!(
            self.log,
            self.clock.now_us(),
            "streaming: mode={} rate={} block={}",
            self.config.mode.as_str(),
            self.config.sample_rate,
            self.config.block_size
        );
        loop {
            self.run_once();
        }
    }

    /// One pass of the loop.
    pub fn run_once(&mut self) -> Iteration {
        if self.halted {
            self.clock.delay_ms(self.config.idle_backoff_ms);
            return Iteration::Halted;
        }

        if !self.link.is_connected() {
            self.stats.idle_polls = self.stats.idle_polls.wrapping_add(1);
            self.clock.delay_ms(self.config.idle_backoff_ms);
            return Iteration::Idle;
        }

        // Held for the whole block; a new MTU applies from the next one
        let max_payload = self.link.max_payload();

        if self.config.mode.needs_acquisition() {
            if let Err(fault) = self
                .acquisition
                .read_block(&mut self.block, self.config.read_timeout_ms)
            {
                return self.on_acquisition_fault(fault);
            }
        }

        self.processor.transform(&self.block, &mut self.processed);

        let packets = match self.framer.pack(&self.processed, max_payload) {
            Ok(packets) => packets,
            Err(err) => {
                self.stats.dropped_blocks = self.stats.dropped_blocks.wrapping_add(1);
                rt_warn!(self.log, self.clock.now_us(), "block dropped: {}", err);
                return Iteration::Unframed(err);
            }
        };

        let total = packets.len();
        let mut sent = 0;
        let mut bytes = 0;
        let mut failure = None;
        for packet in packets {
            if !self.link.is_connected() {
                failure = Some(TransportFault::NotConnected);
                break;
            }
            if let Err(fault) = self.transport.notify(packet.payload()) {
                failure = Some(fault);
                break;
            }
            sent += 1;
            bytes += packet.payload().len();
        }

        self.stats.packets_sent = self.stats.packets_sent.wrapping_add(sent as u32);
        self.stats.bytes_sent = self.stats.bytes_sent.wrapping_add(bytes as u64);

        if let Some(fault) = failure {
            self.stats.aborted_blocks = self.stats.aborted_blocks.wrapping_add(1);
            match fault {
                TransportFault::NotConnected => rt_debug!(
                    self.log,
                    self.clock.now_us(),
                    "block aborted at {}/{}: peer gone",
                    sent,
                    total
                ),
                _ => rt_warn!(
                    self.log,
                    self.clock.now_us(),
                    "block aborted at {}/{}: {}",
                    sent,
                    total,
                    fault
                ),
            }
            return Iteration::Aborted { sent, total, fault };
        }

        self.stats.blocks_sent = self.stats.blocks_sent.wrapping_add(1);
        if self.config.stats_every_blocks > 0
            && self.stats.blocks_sent % self.config.stats_every_blocks == 0
        {
            self.log_stats();
        }

        if self.config.pacing_ms > 0 {
            self.clock.delay_ms(self.config.pacing_ms);
        }

        Iteration::Delivered { packets: total }
    }

    fn on_acquisition_fault(&mut self, fault: AcquisitionFault) -> Iteration {
        let now_us = self.clock.now_us();
        if fault.is_fatal() {
            let (code, data) = fault.fault();
            self.fault.set(code, data);
            self.halted = true;
            rt_error!(self.log, now_us, "streaming halted: {}", fault);
            return Iteration::Halted;
        }

        self.stats.dropped_blocks = self.stats.dropped_blocks.wrapping_add(1);
        rt_warn!(self.log, now_us, "block dropped: {}", fault);
        Iteration::Dropped(fault)
    }

    fn log_stats(&self) {
        let stats = self.stats;
        rt_info!(
            self.log,
            self.clock.now_us(),
            "stats: blocks={} packets={} bytes={} dropped={} aborted={} mtu={}",
            stats.blocks_sent,
            stats.packets_sent,
            stats.bytes_sent,
            stats.dropped_blocks,
            stats.aborted_blocks,
            self.link.mtu()
        );
    }
}
