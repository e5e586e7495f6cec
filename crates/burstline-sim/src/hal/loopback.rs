//! Software Loopback Device
//!
//! A TX-only device that accepts samples into a send log instead of putting
//! them on air. Used for dry runs of a plan (`loopback://`) and for testing
//! the transmit loop against scripted device behavior.
//!
//! ## Arguments
//!
//! | Key        | Meaning                                   | Default |
//! |------------|-------------------------------------------|---------|
//! | `channels` | Number of TX channels                     | 2       |
//! | `spp`      | Samples per send call                     | 2040    |
//! | `accept`   | Cap on samples accepted per send          | none    |
//! | `acks`     | Emit burst ACKs (`0`/`1`)                 | 1       |
//!
//! ```text
//!   send() ──► accept ≤ min(len, spp, accept) ──► SendLog
//!                          │
//!                          └─ EOB complete ──► BurstAck × channels ──► recv_async_msg()
//! ```

use super::{
    arg_value, parse_args, AsyncEvent, AsyncEventCode, ClockControl, DeviceDriver, StreamConfig,
    SyncSource, TimeBase, TunerControl, TxDevice, TxMetadata, TxStreamer,
};
use crate::device::{DeviceCapabilities, DeviceInfo, SdrError, SdrResult};
use burstline_core::types::IQSample;
use burstline_core::{ClockSource, TimeSource, TimeSpec};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Behavior of a loopback device.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackOptions {
    /// Number of TX channels
    pub tx_channels: usize,
    /// Samples per channel a send accepts at most
    pub samples_per_call: usize,
    /// Further cap on accepted samples, forcing partial sends
    pub max_accept: Option<usize>,
    /// Accepted counts for the first sends, consumed in order; overrides the caps
    pub accept_script: Vec<usize>,
    /// Emit one burst ACK per channel after each completed end-of-burst send
    pub acks: bool,
    /// Event queued ahead of the ACKs of every completed burst
    pub event_before_ack: Option<AsyncEventCode>,
    /// Fail the n-th send call (1-based) with a hardware error
    pub fail_on_send: Option<usize>,
    /// Gain resolution in dB (`None` = any gain is honored exactly)
    pub gain_step: Option<f64>,
    /// Keep a [`SendRecord`] per send; otherwise only counters are kept
    pub record_sends: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            tx_channels: 2,
            samples_per_call: 2040,
            max_accept: None,
            accept_script: Vec::new(),
            acks: true,
            event_before_ack: None,
            fail_on_send: None,
            gain_step: None,
            record_sends: false,
        }
    }
}

impl LoopbackOptions {
    /// Parse `key=value` device arguments.
    pub fn from_args(args: &str) -> SdrResult<Self> {
        let parsed = parse_args(args);
        let mut options = Self::default();

        let number = |key: &str, value: &str| {
            value.parse::<usize>().map_err(|_| {
                SdrError::ConfigError(format!("Loopback argument {}={} is not a count", key, value))
            })
        };

        if let Some(v) = arg_value(&parsed, "channels") {
            options.tx_channels = number("channels", v)?.max(1);
        }
        if let Some(v) = arg_value(&parsed, "spp") {
            options.samples_per_call = number("spp", v)?.max(1);
        }
        if let Some(v) = arg_value(&parsed, "accept") {
            options.max_accept = Some(number("accept", v)?);
        }
        if let Some(v) = arg_value(&parsed, "acks") {
            options.acks = !matches!(v, "0" | "false" | "no");
        }
        Ok(options)
    }
}

/// One call to [`TxStreamer::send`] as seen by a loopback stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRecord {
    /// Samples per channel offered
    pub offered: usize,
    /// Samples per channel accepted
    pub accepted: usize,
    pub metadata: TxMetadata,
    /// Number of channel buffers passed
    pub buffers: usize,
    /// First offered sample of the first buffer
    pub first_sample: Option<IQSample>,
}

/// Shared log of the sends a loopback stream received.
///
/// Send and sample counts are always kept. Per-send records are retained
/// only when the device was built with `record_sends`, so a forever plan on
/// `loopback://` runs in constant memory.
///
/// Clones refer to the same log, so a test can keep one while the stream
/// itself moves onto the transmit thread.
#[derive(Debug, Clone, Default)]
pub struct SendLog(Arc<Mutex<LogState>>);

#[derive(Debug, Default)]
struct LogState {
    record: bool,
    records: Vec<SendRecord>,
    sends: usize,
    accepted: u64,
}

impl SendLog {
    fn new(record: bool) -> Self {
        Self(Arc::new(Mutex::new(LogState {
            record,
            ..Default::default()
        })))
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, record: SendRecord) {
        let mut state = self.lock();
        state.sends += 1;
        state.accepted += record.accepted as u64;
        if state.record {
            state.records.push(record);
        }
    }

    /// Snapshot of the retained records (empty unless recording).
    pub fn records(&self) -> Vec<SendRecord> {
        self.lock().records.clone()
    }

    /// Number of send calls so far.
    pub fn len(&self) -> usize {
        self.lock().sends
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total samples per channel accepted.
    pub fn samples_accepted(&self) -> u64 {
        self.lock().accepted
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Driver for `loopback://` devices.
#[derive(Debug, Default)]
pub struct LoopbackDriver;

impl LoopbackDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDriver for LoopbackDriver {
    fn name(&self) -> &str {
        "loopback"
    }

    fn discover(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            driver: "loopback".to_string(),
            serial: "LOOP0".to_string(),
            label: "Software Loopback".to_string(),
            address: "loopback://".to_string(),
        }]
    }

    fn create_from_string(&self, args: &str) -> SdrResult<Box<dyn TxDevice>> {
        Ok(Box::new(LoopbackDevice::new(LoopbackOptions::from_args(args)?)))
    }
}

// =============================================================================
// Device
// =============================================================================

/// Software loopback device.
pub struct LoopbackDevice {
    name: String,
    options: LoopbackOptions,
    tuner: LoopbackTuner,
    clock: LoopbackClock,
    log: SendLog,
}

impl LoopbackDevice {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            name: format!("Software Loopback ({} TX channels)", options.tx_channels),
            tuner: LoopbackTuner::new(options.tx_channels, options.gain_step),
            clock: LoopbackClock::new(),
            log: SendLog::new(options.record_sends),
            options,
        }
    }

    /// Log shared by every stream this device creates.
    pub fn send_log(&self) -> SendLog {
        self.log.clone()
    }
}

impl TxDevice for LoopbackDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            min_frequency: 0.0,
            max_frequency: 1e12,
            min_sample_rate: 1.0,
            max_sample_rate: 1e9,
            tx_gain_range: (0.0, 100.0),
            tx_channels: self.options.tx_channels,
        }
    }

    fn tuner(&mut self) -> &mut dyn TunerControl {
        &mut self.tuner
    }

    fn clock(&mut self) -> &mut dyn ClockControl {
        &mut self.clock
    }

    fn create_tx_stream(&mut self, config: &StreamConfig) -> SdrResult<Box<dyn TxStreamer>> {
        let available = self.options.tx_channels;
        if config.channels.is_empty() {
            return Err(SdrError::ConfigError(
                "TX stream needs at least one channel".to_string(),
            ));
        }
        if let Some(&channel) = config.channels.iter().find(|&&c| c >= available) {
            return Err(SdrError::InvalidChannel { channel, available });
        }

        let mut options = self.options.clone();
        if let Some(spp) = config.samples_per_packet {
            options.samples_per_call = spp.max(1);
        }
        debug!(channels = ?config.channels, spp = options.samples_per_call, "Created loopback TX stream");
        Ok(Box::new(LoopbackTxStream::new(
            config.channels.len(),
            options,
            self.log.clone(),
        )))
    }
}

// =============================================================================
// Tuner and clock
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Tuning {
    rate: f64,
    frequency: f64,
    gain: f64,
}

struct LoopbackTuner {
    channels: Vec<Tuning>,
    gain_step: Option<f64>,
}

impl LoopbackTuner {
    fn new(tx_channels: usize, gain_step: Option<f64>) -> Self {
        Self {
            channels: vec![Tuning::default(); tx_channels],
            gain_step,
        }
    }

    fn channel_mut(&mut self, channel: usize) -> SdrResult<&mut Tuning> {
        let available = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(SdrError::InvalidChannel { channel, available })
    }
}

impl TunerControl for LoopbackTuner {
    fn set_tx_rate(&mut self, channel: usize, rate: f64) -> SdrResult<f64> {
        self.channel_mut(channel)?.rate = rate;
        Ok(rate)
    }

    fn tx_rate(&self, channel: usize) -> f64 {
        self.channels.get(channel).map_or(0.0, |c| c.rate)
    }

    fn set_tx_frequency(&mut self, channel: usize, freq_hz: f64) -> SdrResult<f64> {
        self.channel_mut(channel)?.frequency = freq_hz;
        Ok(freq_hz)
    }

    fn set_tx_gain(&mut self, channel: usize, gain_db: f64) -> SdrResult<f64> {
        let actual = match self.gain_step {
            Some(step) if step > 0.0 => (gain_db / step).round() * step,
            _ => gain_db,
        };
        self.channel_mut(channel)?.gain = actual;
        Ok(actual)
    }
}

struct LoopbackClock {
    sync: SyncSource,
    time: TimeBase,
}

impl LoopbackClock {
    fn new() -> Self {
        Self {
            sync: SyncSource::default(),
            time: TimeBase::new(TimeSpec::zero()),
        }
    }
}

impl ClockControl for LoopbackClock {
    fn set_sync_source(&mut self, sync: SyncSource) -> SdrResult<()> {
        let valid = self.sync_sources();
        if !valid.contains(&sync) {
            return Err(SdrError::SyncSource {
                requested: sync,
                valid,
            });
        }
        self.sync = sync;
        Ok(())
    }

    fn sync_source(&self) -> SyncSource {
        self.sync
    }

    fn sync_sources(&self) -> Vec<SyncSource> {
        let mut valid = Vec::new();
        for clock in [ClockSource::Internal, ClockSource::External] {
            for time in [TimeSource::Internal, TimeSource::External] {
                valid.push(SyncSource::new(clock, time));
            }
        }
        valid
    }

    fn time(&self) -> TimeSpec {
        self.time.now()
    }

    fn set_time(&mut self, time: TimeSpec) -> SdrResult<()> {
        self.time = TimeBase::new(time);
        Ok(())
    }
}

// =============================================================================
// Stream
// =============================================================================

struct LoopbackTxStream {
    num_channels: usize,
    options: LoopbackOptions,
    script: VecDeque<usize>,
    sends: usize,
    log: SendLog,
    events: VecDeque<AsyncEvent>,
}

impl LoopbackTxStream {
    fn new(num_channels: usize, options: LoopbackOptions, log: SendLog) -> Self {
        Self {
            num_channels,
            script: options.accept_script.iter().copied().collect(),
            options,
            sends: 0,
            log,
            events: VecDeque::new(),
        }
    }
}

impl TxStreamer for LoopbackTxStream {
    fn max_samples_per_call(&self) -> usize {
        self.options.samples_per_call
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn send(
        &mut self,
        buffers: &[&[IQSample]],
        metadata: &TxMetadata,
        _timeout: Duration,
    ) -> SdrResult<usize> {
        self.sends += 1;
        if self.options.fail_on_send == Some(self.sends) {
            return Err(SdrError::HardwareError(format!(
                "Loopback send {} failed",
                self.sends
            )));
        }

        if buffers.len() != self.num_channels {
            return Err(SdrError::ConfigError(format!(
                "Expected {} TX buffers, got {}",
                self.num_channels,
                buffers.len()
            )));
        }
        let len = buffers.first().map_or(0, |b| b.len());
        if buffers.iter().any(|b| b.len() != len) {
            return Err(SdrError::ConfigError(
                "TX buffers differ in length".to_string(),
            ));
        }

        let accepted = match self.script.pop_front() {
            Some(n) => n.min(len),
            None => {
                let cap = self.options.max_accept.unwrap_or(usize::MAX);
                len.min(self.options.samples_per_call).min(cap)
            }
        };
        trace!(offered = len, accepted, sob = metadata.start_of_burst, eob = metadata.end_of_burst, "Loopback send");

        self.log.push(SendRecord {
            offered: len,
            accepted,
            metadata: *metadata,
            buffers: buffers.len(),
            first_sample: buffers.first().and_then(|b| b.first().copied()),
        });

        if metadata.end_of_burst && accepted == len {
            if let Some(code) = self.options.event_before_ack {
                self.events.push_back(AsyncEvent {
                    channel: 0,
                    code,
                    time_spec: None,
                });
            }
            if self.options.acks {
                for channel in 0..self.num_channels {
                    self.events.push_back(AsyncEvent {
                        channel,
                        code: AsyncEventCode::BurstAck,
                        time_spec: None,
                    });
                }
            }
        }

        Ok(accepted)
    }

    fn recv_async_msg(&mut self, _timeout: Duration) -> Option<AsyncEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> Vec<IQSample> {
        (0..n).map(|i| IQSample::new(i as f32, 0.0)).collect()
    }

    #[test]
    fn test_options_from_args() {
        let options = LoopbackOptions::from_args("channels=4,spp=100,accept=30,acks=0").unwrap();
        assert_eq!(options.tx_channels, 4);
        assert_eq!(options.samples_per_call, 100);
        assert_eq!(options.max_accept, Some(30));
        assert!(!options.acks);

        assert_eq!(LoopbackOptions::from_args("").unwrap(), LoopbackOptions::default());
        assert!(LoopbackOptions::from_args("spp=lots").is_err());
    }

    #[test]
    fn test_driver_discovers_itself() {
        let driver = LoopbackDriver::new();
        let found = driver.discover();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "loopback://");
    }

    #[test]
    fn test_send_caps_and_log() {
        let mut device = LoopbackDevice::new(LoopbackOptions {
            samples_per_call: 64,
            max_accept: Some(40),
            record_sends: true,
            ..Default::default()
        });
        let log = device.send_log();
        let mut stream = device.create_tx_stream(&StreamConfig::new(vec![0])).unwrap();

        let data = samples(100);
        let md = TxMetadata::burst(true, true, None);
        assert_eq!(stream.send(&[&data], &md, Duration::ZERO).unwrap(), 40);
        assert_eq!(stream.send(&[&data[40..]], &md, Duration::ZERO).unwrap(), 40);

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].offered, 60);
        assert_eq!(records[1].first_sample, Some(IQSample::new(40.0, 0.0)));
        assert_eq!(log.samples_accepted(), 80);
        // Burst not complete yet
        assert!(stream.recv_async_msg(Duration::ZERO).is_none());
    }

    #[test]
    fn test_send_log_keeps_counters_only_by_default() {
        // Same options the driver builds for `loopback://`
        let mut device = LoopbackDevice::new(LoopbackOptions::from_args("").unwrap());
        let log = device.send_log();
        let mut stream = device.create_tx_stream(&StreamConfig::new(vec![0])).unwrap();

        let data = samples(100);
        let md = TxMetadata::burst(true, true, None);
        for _ in 0..1000 {
            assert_eq!(stream.send(&[&data], &md, Duration::ZERO).unwrap(), 100);
            while stream.recv_async_msg(Duration::ZERO).is_some() {}
        }

        assert_eq!(log.len(), 1000);
        assert_eq!(log.samples_accepted(), 100_000);
        assert!(log.records().is_empty());
    }

    #[test]
    fn test_accept_script_then_default() {
        let mut device = LoopbackDevice::new(LoopbackOptions {
            accept_script: vec![0, 5],
            ..Default::default()
        });
        let mut stream = device.create_tx_stream(&StreamConfig::new(vec![0])).unwrap();
        let data = samples(10);
        let md = TxMetadata::default();
        assert_eq!(stream.send(&[&data], &md, Duration::ZERO).unwrap(), 0);
        assert_eq!(stream.send(&[&data], &md, Duration::ZERO).unwrap(), 5);
        assert_eq!(stream.send(&[&data], &md, Duration::ZERO).unwrap(), 10);
    }

    #[test]
    fn test_acks_per_channel_after_complete_eob() {
        let mut device = LoopbackDevice::new(LoopbackOptions {
            event_before_ack: Some(AsyncEventCode::Underflow),
            ..Default::default()
        });
        let mut stream = device.create_tx_stream(&StreamConfig::new(vec![0, 1])).unwrap();
        let data = samples(10);
        let md = TxMetadata::burst(true, true, None);
        stream.send(&[&data, &data], &md, Duration::ZERO).unwrap();

        let codes: Vec<_> = std::iter::from_fn(|| stream.recv_async_msg(Duration::ZERO))
            .map(|e| (e.channel, e.code))
            .collect();
        assert_eq!(
            codes,
            vec![
                (0, AsyncEventCode::Underflow),
                (0, AsyncEventCode::BurstAck),
                (1, AsyncEventCode::BurstAck),
            ]
        );
    }

    #[test]
    fn test_injected_failure() {
        let mut device = LoopbackDevice::new(LoopbackOptions {
            fail_on_send: Some(2),
            ..Default::default()
        });
        let mut stream = device.create_tx_stream(&StreamConfig::new(vec![1])).unwrap();
        let data = samples(4);
        let md = TxMetadata::default();
        assert!(stream.send(&[&data], &md, Duration::ZERO).is_ok());
        assert!(matches!(
            stream.send(&[&data], &md, Duration::ZERO),
            Err(SdrError::HardwareError(_))
        ));
    }

    #[test]
    fn test_gain_step_and_channels() {
        let mut device = LoopbackDevice::new(LoopbackOptions {
            gain_step: Some(0.5),
            ..Default::default()
        });
        assert_eq!(device.tuner().set_tx_gain(0, 10.3).unwrap(), 10.5);
        assert_eq!(device.tuner().set_tx_rate(1, 1e6).unwrap(), 1e6);
        assert_eq!(device.tuner().tx_rate(1), 1e6);
        assert!(device.tuner().set_tx_rate(2, 1e6).is_err());
        assert!(device.create_tx_stream(&StreamConfig::new(vec![2])).is_err());
    }

    #[test]
    fn test_sync_sources() {
        let mut device = LoopbackDevice::new(LoopbackOptions::default());
        let ext = SyncSource::new(ClockSource::External, TimeSource::External);
        device.clock().set_sync_source(ext).unwrap();
        assert_eq!(device.clock().sync_source(), ext);
        let gps = SyncSource::new(ClockSource::Gpsdo, TimeSource::Gpsdo);
        assert!(matches!(
            device.clock().set_sync_source(gps),
            Err(SdrError::SyncSource { .. })
        ));
    }
}
