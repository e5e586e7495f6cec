//! # Transmit Loop
//!
//! Drains a blockchain's burst stream into a [`TxStreamer`].
//!
//! Each burst goes through a small state machine:
//!
//! ```text
//!            ┌──────────── partial accept ────────────┐
//!            ▼                                        │
//! Pending ─► Sending ─┬─ all accepted ─► Acked ───────┼──► next burst
//!                     ├─ nothing accepted ─► TimedOut ┘
//!                     │                        └─ too many in a row ─► Timeout error
//!                     └─ device error ──────────────────────────────► session ends
//! ```
//!
//! The first send of a burst carries its start/end-of-burst flags and, per
//! [`TimeTagPolicy`], the device time it should go on air. Retries after a
//! partial accept carry only the end-of-burst flag.

use crate::device::{SdrError, SdrResult};
use crate::hal::{TxMetadata, TxStreamer};
use burstline_core::config::TransmitConfig;
use burstline_core::types::IQSample;
use burstline_core::{Blockchain, Burst, TimeSpec, TimeTagPolicy};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Per-session transmit parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitParams {
    /// Samples per burst chunk
    pub chunk_size: usize,
    /// Device time that chain offset 0.0 maps to
    pub reference_time: TimeSpec,
    pub send_timeout: Duration,
    pub ack_timeout: Duration,
    /// Consecutive zero-accept sends tolerated for one burst
    pub max_stalled_sends: u32,
    pub time_tag: TimeTagPolicy,
}

impl TransmitParams {
    /// Derive parameters from config for a stream with the given per-call maximum.
    pub fn from_config(config: &TransmitConfig, stream_max: usize, reference_time: TimeSpec) -> Self {
        Self {
            chunk_size: config.chunk_size(stream_max),
            reference_time,
            send_timeout: config.send_timeout(),
            ack_timeout: config.ack_timeout(),
            max_stalled_sends: config.max_stalled_sends,
            time_tag: config.time_tag,
        }
    }
}

/// Counters for one transmit session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransmitReport {
    /// Device time of chain offset 0.0
    pub reference_time: TimeSpec,
    /// Bursts fully accepted by the device
    pub bursts: u64,
    /// File passes started (start-of-burst chunks)
    pub passes: u64,
    /// Samples per channel accepted
    pub samples: u64,
    /// Calls to `send`
    pub send_calls: u64,
    /// Sends that accepted some but not all of what was offered
    pub partial_sends: u64,
    /// Sends that accepted nothing
    pub stalled_sends: u64,
    /// Burst ACKs expected (channels × completed passes)
    pub acks_expected: u64,
    pub acks_received: u64,
    /// Async events other than burst ACKs
    pub other_events: u64,
    /// Nominal chain time covered by started passes
    pub chain_offset: f64,
    /// Stopped by cancellation rather than by the end of the chain
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl TransmitReport {
    pub fn missing_acks(&self) -> u64 {
        self.acks_expected.saturating_sub(self.acks_received)
    }
}

/// Per-burst transfer state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ChunkState {
    /// First send not yet prepared
    Pending,
    /// `sent` samples accepted so far; `stalled` consecutive empty sends
    Sending { sent: usize, stalled: u32 },
    /// Last send accepted nothing
    TimedOut { sent: usize, stalled: u32 },
    /// Whole burst accepted
    Acked,
}

struct TransmitLoop<'a> {
    streamer: &'a mut dyn TxStreamer,
    params: &'a TransmitParams,
    channels: usize,
    /// Device time of the most recent start-of-burst chunk
    pass_time: Option<TimeSpec>,
    report: TransmitReport,
}

impl<'a> TransmitLoop<'a> {
    fn new(streamer: &'a mut dyn TxStreamer, params: &'a TransmitParams) -> Self {
        let channels = streamer.num_channels();
        Self {
            streamer,
            params,
            channels,
            pass_time: None,
            report: TransmitReport {
                reference_time: params.reference_time,
                ..Default::default()
            },
        }
    }

    /// Metadata for the first send of `burst`.
    fn first_metadata(&mut self, burst: &Burst) -> TxMetadata {
        if burst.start_of_burst {
            self.pass_time = Some(self.params.reference_time + burst.relative_time);
            self.report.passes += 1;
        }
        let tagged = match self.params.time_tag {
            TimeTagPolicy::StartOfBurst => burst.start_of_burst,
            TimeTagPolicy::EndOfBurst => burst.end_of_burst,
        };
        let time_spec = if tagged { self.pass_time } else { None };
        TxMetadata::burst(burst.start_of_burst, burst.end_of_burst, time_spec)
    }

    fn send_burst(&mut self, burst: &Burst) -> SdrResult<()> {
        let mut first = None;
        let mut state = ChunkState::Pending;

        loop {
            state = match state {
                ChunkState::Pending => {
                    first = Some(self.first_metadata(burst));
                    ChunkState::Sending { sent: 0, stalled: 0 }
                }
                ChunkState::Sending { sent, stalled } => {
                    let metadata = if sent == 0 {
                        first.unwrap_or_default()
                    } else {
                        TxMetadata::burst(false, burst.end_of_burst, None)
                    };
                    let rest = &burst.samples[sent..];
                    let buffers: Vec<&[IQSample]> = vec![rest; self.channels];
                    let accepted = self
                        .streamer
                        .send(&buffers, &metadata, self.params.send_timeout)?
                        .min(rest.len());
                    self.report.send_calls += 1;

                    if accepted == rest.len() {
                        ChunkState::Acked
                    } else if accepted == 0 {
                        ChunkState::TimedOut {
                            sent,
                            stalled: stalled + 1,
                        }
                    } else {
                        self.report.partial_sends += 1;
                        let sent = sent + accepted;
                        trace!(sent, remaining = burst.len() - sent, "Partial send, retrying suffix");
                        ChunkState::Sending { sent, stalled: 0 }
                    }
                }
                ChunkState::TimedOut { sent, stalled } => {
                    self.report.stalled_sends += 1;
                    if stalled > self.params.max_stalled_sends {
                        return Err(SdrError::Timeout(format!(
                            "device buffer space ({} sends in a row accepted nothing, {} of {} samples sent)",
                            stalled,
                            sent,
                            burst.len()
                        )));
                    }
                    trace!(sent, stalled, "Send accepted nothing, retrying");
                    ChunkState::Sending { sent, stalled }
                }
                ChunkState::Acked => {
                    self.report.bursts += 1;
                    self.report.samples += burst.len() as u64;
                    self.collect_acks(burst.end_of_burst);
                    return Ok(());
                }
            };
        }
    }

    /// Poll for up to one event per channel after a burst was accepted.
    ///
    /// Only end-of-burst chunks are acknowledged, so only those wait.
    fn collect_acks(&mut self, end_of_burst: bool) {
        let timeout = if end_of_burst {
            self.params.ack_timeout
        } else {
            Duration::ZERO
        };

        let mut acks = 0u64;
        for _ in 0..self.channels {
            let Some(event) = self.streamer.recv_async_msg(timeout) else {
                break;
            };
            if event.code.is_ack() {
                acks += 1;
            } else {
                self.report.other_events += 1;
                warn!(channel = event.channel, code = ?event.code, "Async TX event");
            }
        }

        self.report.acks_received += acks;
        if end_of_burst {
            let expected = self.channels as u64;
            self.report.acks_expected += expected;
            if acks < expected {
                warn!(received = acks, expected, "Missing burst ACKs");
            }
        }
    }
}

/// Run one transmit session to completion or cancellation.
///
/// `cancel` is checked before each burst; a burst already started is always
/// sent and acknowledged first.
pub fn run(
    streamer: &mut dyn TxStreamer,
    chain: &Blockchain,
    params: &TransmitParams,
    cancel: &AtomicBool,
) -> SdrResult<TransmitReport> {
    let started = Instant::now();
    let mut stream = chain.stream(params.chunk_size)?;
    let mut tx = TransmitLoop::new(streamer, params);

    info!(
        blocks = chain.len(),
        chunk_size = params.chunk_size,
        channels = tx.channels,
        reference_time = %params.reference_time,
        "Transmit session started"
    );

    let outcome = loop {
        if cancel.load(Ordering::SeqCst) {
            tx.report.cancelled = true;
            break Ok(());
        }
        let burst = match stream.next() {
            Some(Ok(burst)) => burst,
            Some(Err(e)) => break Err(SdrError::from(e)),
            None => break Ok(()),
        };
        if let Err(e) = tx.send_burst(&burst) {
            break Err(e);
        }
    };

    let mut report = tx.report;
    report.chain_offset = stream.offset();
    report.elapsed_secs = started.elapsed().as_secs_f64();

    match outcome {
        Ok(()) => {
            info!(
                bursts = report.bursts,
                passes = report.passes,
                samples = report.samples,
                acks = report.acks_received,
                missing_acks = report.missing_acks(),
                cancelled = report.cancelled,
                "Transmit session finished"
            );
            Ok(report)
        }
        Err(e) => {
            error!(
                error = %e,
                bursts = report.bursts,
                samples = report.samples,
                "Transmit session failed"
            );
            Err(e)
        }
    }
}

/// Send a single burst outside of a chain, e.g. to prime a device.
pub fn send_one(
    streamer: &mut dyn TxStreamer,
    burst: &Burst,
    params: &TransmitParams,
) -> SdrResult<TransmitReport> {
    let mut tx = TransmitLoop::new(streamer, params);
    tx.send_burst(burst)?;
    debug!(samples = burst.len(), "Sent single burst");
    Ok(tx.report)
}
