//! # UHD Driver Model for USRP Devices
//!
//! Software model of the transmit side of Ettus Research USRP devices as the
//! USRP Hardware Driver (UHD) presents them: per-family capabilities, the
//! valid clock/time source combinations, TX rate coercion to the master
//! clock, gain clamping, packet-sized sends and per-channel burst ACKs.
//!
//! ## Supported Families
//!
//! - **B-Series**: B200, B200mini, B205mini, B210
//! - **N-Series**: N200, N210
//! - **X-Series**: X300, X310
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burstline_sim::hal::{DriverRegistry, uhd::UhdDriver};
//!
//! let mut registry = DriverRegistry::new();
//! registry.register(Box::new(UhdDriver::new()));
//!
//! let mut device = registry.create("uhd-model://type=b210")?;
//! device.clock().set_sync_source(SyncSource::new(ClockSource::Gpsdo, TimeSource::Gpsdo))?;
//! ```

use super::{
    arg_value, parse_args, AsyncEvent, AsyncEventCode, ClockControl, DeviceDriver, StreamConfig,
    SyncSource, TimeBase, TunerControl, TxDevice, TxMetadata, TxStreamer,
};
use crate::device::{DeviceCapabilities, DeviceInfo, SdrError, SdrResult};
use burstline_core::types::IQSample;
use burstline_core::{ClockSource, TimeSource, TimeSpec};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Device Families
// =============================================================================

/// USRP product family; devices within a family share TX behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsrpFamily {
    /// B200, B200mini, B205mini (one TX channel)
    B200,
    /// B210 (two TX channels)
    B210,
    /// N200, N210
    N210,
    /// X300, X310
    X310,
}

impl UsrpFamily {
    /// Map a UHD `type=` value to a family.
    pub fn from_type(device_type: &str) -> Option<Self> {
        match device_type.to_lowercase().as_str() {
            "b200" | "b200mini" | "b205mini" => Some(UsrpFamily::B200),
            "b210" => Some(UsrpFamily::B210),
            "n200" | "n210" | "usrp2" => Some(UsrpFamily::N210),
            "x300" | "x310" => Some(UsrpFamily::X310),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UsrpFamily::B200 => "B200",
            UsrpFamily::B210 => "B210",
            UsrpFamily::N210 => "N210",
            UsrpFamily::X310 => "X310",
        }
    }

    /// TX capabilities of the family.
    pub fn capabilities(&self) -> DeviceCapabilities {
        match self {
            UsrpFamily::B200 => DeviceCapabilities {
                min_frequency: 70_000_000.0,
                max_frequency: 6_000_000_000.0,
                min_sample_rate: 200_000.0,
                max_sample_rate: 56_000_000.0,
                tx_gain_range: (0.0, 89.75),
                tx_channels: 1,
            },
            UsrpFamily::B210 => DeviceCapabilities {
                tx_channels: 2,
                ..UsrpFamily::B200.capabilities()
            },
            UsrpFamily::N210 => DeviceCapabilities {
                min_frequency: 10_000_000.0, // Depends on daughterboard
                max_frequency: 6_000_000_000.0,
                min_sample_rate: 195_312.5,
                max_sample_rate: 50_000_000.0,
                tx_gain_range: (0.0, 31.5),
                tx_channels: 1,
            },
            UsrpFamily::X310 => DeviceCapabilities {
                min_frequency: 10_000_000.0,
                max_frequency: 6_000_000_000.0,
                min_sample_rate: 200_000.0,
                max_sample_rate: 200_000_000.0,
                tx_gain_range: (0.0, 31.5),
                tx_channels: 2,
            },
        }
    }

    /// Fixed master clock rate; B-series pick theirs per requested rate.
    pub fn master_clock_rate(&self) -> Option<f64> {
        match self {
            UsrpFamily::B200 | UsrpFamily::B210 => None,
            UsrpFamily::N210 => Some(100_000_000.0),
            UsrpFamily::X310 => Some(200_000_000.0),
        }
    }

    /// Default TX samples per packet for sc16 over the wire.
    pub fn samples_per_packet(&self) -> usize {
        match self {
            UsrpFamily::B200 | UsrpFamily::B210 => 2040,
            UsrpFamily::N210 => 363,
            UsrpFamily::X310 => 1996,
        }
    }

    /// Clock/time source combinations UHD reports for the family.
    pub fn sync_sources(&self) -> Vec<SyncSource> {
        let mut sources = vec![
            SyncSource::new(ClockSource::Internal, TimeSource::Internal),
            SyncSource::new(ClockSource::External, TimeSource::Internal),
            SyncSource::new(ClockSource::External, TimeSource::External),
            SyncSource::new(ClockSource::Gpsdo, TimeSource::Gpsdo),
        ];
        if *self == UsrpFamily::N210 {
            sources.push(SyncSource::new(ClockSource::Mimo, TimeSource::Mimo));
        }
        sources
    }
}

// =============================================================================
// UHD Driver
// =============================================================================

/// Driver for software models of USRP hardware.
///
/// Models take UHD device arguments, e.g.
/// `uhd-model://type=b210,serial=31C9ABC`. No hardware is driven: sends are
/// accepted and acknowledged as a USRP would, and the samples are discarded.
#[derive(Debug, Default)]
pub struct UhdDriver;

impl UhdDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDriver for UhdDriver {
    fn name(&self) -> &str {
        "uhd-model"
    }

    fn discover(&self) -> Vec<DeviceInfo> {
        // Bus enumeration is not modelled; devices are opened by type.
        debug!("USRP models are not discoverable, address them with uhd-model://type=<model>");
        Vec::new()
    }

    fn create_from_string(&self, args: &str) -> SdrResult<Box<dyn TxDevice>> {
        let parsed = parse_args(args);
        let device_type = arg_value(&parsed, "type").unwrap_or("b200");
        let family = UsrpFamily::from_type(device_type).ok_or_else(|| {
            SdrError::DeviceNotFound(format!(
                "Unknown USRP type '{}'. Known types: b200, b200mini, b205mini, b210, n200, n210, x300, x310",
                device_type
            ))
        })?;

        let serial = arg_value(&parsed, "serial").unwrap_or_default().to_string();
        Ok(Box::new(UhdDevice::new(family, args, serial)))
    }
}

// =============================================================================
// UHD Device
// =============================================================================

/// A USRP device instance.
pub struct UhdDevice {
    name: String,
    family: UsrpFamily,
    serial: String,
    tuner: UhdTuner,
    clock: UhdClock,
}

impl UhdDevice {
    fn new(family: UsrpFamily, args: &str, serial: String) -> Self {
        warn!(
            family = family.label(),
            args,
            "Opening USRP software model; no hardware is driven and samples are discarded"
        );
        Self {
            name: format!("USRP {} ({})", family.label(), args),
            family,
            serial,
            tuner: UhdTuner::new(family),
            clock: UhdClock::new(family),
        }
    }

    pub fn family(&self) -> UsrpFamily {
        self.family
    }

    /// Serial number from the device arguments, empty if none was given.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl TxDevice for UhdDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.family.capabilities()
    }

    fn tuner(&mut self) -> &mut dyn TunerControl {
        &mut self.tuner
    }

    fn clock(&mut self) -> &mut dyn ClockControl {
        &mut self.clock
    }

    fn create_tx_stream(&mut self, config: &StreamConfig) -> SdrResult<Box<dyn TxStreamer>> {
        let available = self.family.capabilities().tx_channels;
        if config.channels.is_empty() {
            return Err(SdrError::ConfigError(
                "TX stream needs at least one channel".to_string(),
            ));
        }
        if let Some(&channel) = config.channels.iter().find(|&&c| c >= available) {
            return Err(SdrError::InvalidChannel { channel, available });
        }

        let spp = config
            .samples_per_packet
            .unwrap_or_else(|| self.family.samples_per_packet())
            .max(1);
        let sample_rate = self.tuner.tx_rate(config.channels[0]);

        info!(channels = ?config.channels, spp, "Created TX stream");
        Ok(Box::new(UhdTxStream::new(config.channels.clone(), spp, sample_rate)))
    }
}

// =============================================================================
// UHD Tuner
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct TxChannel {
    rate: f64,
    frequency: f64,
    gain: f64,
}

/// Per-channel TX tuning for USRP devices.
struct UhdTuner {
    family: UsrpFamily,
    caps: DeviceCapabilities,
    channels: Vec<TxChannel>,
}

impl UhdTuner {
    fn new(family: UsrpFamily) -> Self {
        let caps = family.capabilities();
        let channels = vec![
            TxChannel {
                rate: 1_000_000.0,
                frequency: 915_000_000.0,
                gain: 0.0,
            };
            caps.tx_channels
        ];
        Self {
            family,
            caps,
            channels,
        }
    }

    fn channel_mut(&mut self, channel: usize) -> SdrResult<&mut TxChannel> {
        let available = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(SdrError::InvalidChannel { channel, available })
    }

    /// Closest rate the DSP chain can produce.
    fn coerce_rate(&self, rate: f64) -> f64 {
        match self.family.master_clock_rate() {
            Some(mcr) => {
                let interp = (mcr / rate).round().max(1.0);
                mcr / interp
            }
            None => rate,
        }
    }
}

impl TunerControl for UhdTuner {
    fn set_tx_rate(&mut self, channel: usize, rate: f64) -> SdrResult<f64> {
        let (min, max) = (self.caps.min_sample_rate, self.caps.max_sample_rate);
        if !(min..=max).contains(&rate) {
            return Err(SdrError::ConfigError(format!(
                "Sample rate {} out of range [{}, {}]",
                rate, min, max
            )));
        }

        let actual = self.coerce_rate(rate);
        debug!(channel, requested = rate, actual, "Setting TX rate");
        self.channel_mut(channel)?.rate = actual;
        Ok(actual)
    }

    fn tx_rate(&self, channel: usize) -> f64 {
        self.channels.get(channel).map_or(0.0, |c| c.rate)
    }

    fn set_tx_frequency(&mut self, channel: usize, freq_hz: f64) -> SdrResult<f64> {
        let (min, max) = (self.caps.min_frequency, self.caps.max_frequency);
        if !(min..=max).contains(&freq_hz) {
            return Err(SdrError::ConfigError(format!(
                "Frequency {} Hz out of range [{}, {}]",
                freq_hz, min, max
            )));
        }

        debug!(channel, freq_hz, "Setting TX frequency");
        self.channel_mut(channel)?.frequency = freq_hz;
        Ok(freq_hz)
    }

    fn set_tx_gain(&mut self, channel: usize, gain_db: f64) -> SdrResult<f64> {
        let (min, max) = self.caps.tx_gain_range;
        let clamped = gain_db.clamp(min, max);

        debug!(channel, gain_db = clamped, "Setting TX gain");
        self.channel_mut(channel)?.gain = clamped;
        Ok(clamped)
    }
}

// =============================================================================
// UHD Clock Control
// =============================================================================

/// Clock and time source control for USRP devices.
struct UhdClock {
    sync: SyncSource,
    valid: Vec<SyncSource>,
    time: TimeBase,
}

impl UhdClock {
    fn new(family: UsrpFamily) -> Self {
        Self {
            sync: SyncSource::default(),
            valid: family.sync_sources(),
            time: TimeBase::new(TimeSpec::zero()),
        }
    }
}

impl ClockControl for UhdClock {
    fn set_sync_source(&mut self, sync: SyncSource) -> SdrResult<()> {
        if !self.valid.contains(&sync) {
            return Err(SdrError::SyncSource {
                requested: sync,
                valid: self.valid.clone(),
            });
        }

        info!(clock = %sync.clock, time = %sync.time, "Setting sync source");
        self.sync = sync;
        Ok(())
    }

    fn sync_source(&self) -> SyncSource {
        self.sync
    }

    fn sync_sources(&self) -> Vec<SyncSource> {
        self.valid.clone()
    }

    fn time(&self) -> TimeSpec {
        self.time.now()
    }

    fn set_time(&mut self, time: TimeSpec) -> SdrResult<()> {
        info!(%time, "Setting device time");
        self.time = TimeBase::new(time);
        Ok(())
    }
}

// =============================================================================
// UHD TX Stream
// =============================================================================

/// TX streamer for USRP devices.
///
/// A send moves at most one packet per channel; an end-of-burst send that
/// completes its buffer queues one burst ACK per channel.
struct UhdTxStream {
    channels: Vec<usize>,
    spp: usize,
    sample_rate: f64,
    burst_time: Option<TimeSpec>,
    burst_samples: u64,
    events: VecDeque<AsyncEvent>,
}

impl UhdTxStream {
    fn new(channels: Vec<usize>, spp: usize, sample_rate: f64) -> Self {
        Self {
            channels,
            spp,
            sample_rate,
            burst_time: None,
            burst_samples: 0,
            events: VecDeque::new(),
        }
    }
}

impl TxStreamer for UhdTxStream {
    fn max_samples_per_call(&self) -> usize {
        self.spp
    }

    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn send(
        &mut self,
        buffers: &[&[IQSample]],
        metadata: &TxMetadata,
        _timeout: Duration,
    ) -> SdrResult<usize> {
        if buffers.len() != self.channels.len() {
            return Err(SdrError::ConfigError(format!(
                "Expected {} TX buffers, got {}",
                self.channels.len(),
                buffers.len()
            )));
        }
        let len = buffers.first().map_or(0, |b| b.len());
        if buffers.iter().any(|b| b.len() != len) {
            return Err(SdrError::ConfigError(
                "TX buffers differ in length".to_string(),
            ));
        }

        if metadata.start_of_burst {
            self.burst_samples = 0;
            self.burst_time = None;
        }
        if let Some(t) = metadata.time_spec {
            self.burst_time = Some(t);
        }

        let accepted = len.min(self.spp);
        self.burst_samples += accepted as u64;

        if metadata.end_of_burst && accepted == len {
            let end = self
                .burst_time
                .map(|t| t + self.burst_samples as f64 / self.sample_rate);
            for channel in 0..self.channels.len() {
                self.events.push_back(AsyncEvent {
                    channel,
                    code: AsyncEventCode::BurstAck,
                    time_spec: end,
                });
            }
        }

        Ok(accepted)
    }

    fn recv_async_msg(&mut self, _timeout: Duration) -> Option<AsyncEvent> {
        self.events.pop_front()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn device(args: &str) -> Box<dyn TxDevice> {
        UhdDriver::new().create_from_string(args).unwrap()
    }

    #[test]
    fn test_uhd_driver_creation() {
        let driver = UhdDriver::new();
        assert_eq!(driver.name(), "uhd-model");
        assert!(driver.discover().is_empty());
    }

    #[test]
    fn test_device_identity() {
        let dev = UhdDevice::new(UsrpFamily::B210, "type=b210,serial=31C9ABC", "31C9ABC".into());
        assert_eq!(dev.family(), UsrpFamily::B210);
        assert_eq!(dev.serial(), "31C9ABC");
        assert_eq!(dev.name(), "USRP B210 (type=b210,serial=31C9ABC)");
        assert_eq!(UsrpFamily::from_type("B205mini"), Some(UsrpFamily::B200));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = UhdDriver::new().create_from_string("type=e320").err().unwrap();
        assert!(matches!(err, SdrError::DeviceNotFound(_)));
    }

    #[test]
    fn test_family_capabilities() {
        assert_eq!(device("type=b200").capabilities().tx_channels, 1);
        assert_eq!(device("type=B210").capabilities().tx_channels, 2);
        let caps = device("type=n210").capabilities();
        assert_eq!(caps.min_frequency, 10_000_000.0);
        assert_eq!(caps.tx_gain_range, (0.0, 31.5));
    }

    #[test]
    fn test_rate_coerced_to_master_clock() {
        let mut dev = device("type=n210");
        // 100 MHz / 33 = 3.0303... MS/s
        let actual = dev.tuner().set_tx_rate(0, 3_000_000.0).unwrap();
        assert!((actual - 100_000_000.0 / 33.0).abs() < 1e-6);

        let mut dev = device("type=b210");
        assert_eq!(dev.tuner().set_tx_rate(1, 3_000_000.0).unwrap(), 3_000_000.0);
    }

    #[test]
    fn test_tuner_range_checks() {
        let mut dev = device("type=b210");
        assert!(dev.tuner().set_tx_rate(0, 100.0).is_err());
        assert!(dev.tuner().set_tx_frequency(0, 10e9).is_err());
        assert_eq!(dev.tuner().set_tx_gain(0, 120.0).unwrap(), 89.75);
        assert!(matches!(
            dev.tuner().set_tx_gain(2, 10.0),
            Err(SdrError::InvalidChannel { channel: 2, available: 2 })
        ));
    }

    #[test]
    fn test_sync_sources() {
        let mut dev = device("type=b210");
        let gps = SyncSource::new(ClockSource::Gpsdo, TimeSource::Gpsdo);
        dev.clock().set_sync_source(gps).unwrap();
        assert_eq!(dev.clock().sync_source(), gps);

        let mimo = SyncSource::new(ClockSource::Mimo, TimeSource::Mimo);
        match dev.clock().set_sync_source(mimo) {
            Err(SdrError::SyncSource { requested, valid }) => {
                assert_eq!(requested, mimo);
                assert_eq!(valid.len(), 4);
            }
            other => panic!("expected sync source error, got {:?}", other.err()),
        }
        // Unchanged after rejection
        assert_eq!(dev.clock().sync_source(), gps);

        let mut n210 = device("type=n210");
        assert!(n210.clock().set_sync_source(mimo).is_ok());
    }

    #[test]
    fn test_device_time_runs_from_set_value() {
        let mut dev = device("type=x310");
        dev.clock().set_time(TimeSpec::new(100, 0.0)).unwrap();
        let now = dev.clock().time();
        assert!(now >= TimeSpec::new(100, 0.0));
        assert!(now - TimeSpec::new(100, 0.0) < 5.0);
    }

    #[test]
    fn test_stream_channel_validation() {
        let mut dev = device("type=b200");
        assert!(matches!(
            dev.create_tx_stream(&StreamConfig::new(vec![0, 1])).err(),
            Some(SdrError::InvalidChannel { channel: 1, available: 1 })
        ));
        assert!(dev.create_tx_stream(&StreamConfig::new(vec![])).is_err());
    }

    #[test]
    fn test_stream_sends_one_packet_and_acks() {
        let mut dev = device("type=b210");
        dev.tuner().set_tx_rate(0, 1_000_000.0).unwrap();
        let mut stream = dev.create_tx_stream(&StreamConfig::new(vec![0, 1])).unwrap();
        assert_eq!(stream.max_samples_per_call(), 2040);
        assert_eq!(stream.num_channels(), 2);

        let samples = vec![IQSample::new(0.5, 0.0); 3000];
        let start = TimeSpec::new(10, 0.0);
        let md = TxMetadata::burst(true, true, Some(start));
        let timeout = Duration::from_millis(10);

        let accepted = stream.send(&[&samples, &samples], &md, timeout).unwrap();
        assert_eq!(accepted, 2040);
        assert!(stream.recv_async_msg(timeout).is_none());

        let rest = &samples[accepted..];
        let md = TxMetadata::burst(false, true, None);
        assert_eq!(stream.send(&[rest, rest], &md, timeout).unwrap(), 960);

        let first = stream.recv_async_msg(timeout).unwrap();
        let second = stream.recv_async_msg(timeout).unwrap();
        assert_eq!((first.channel, second.channel), (0, 1));
        assert_eq!(first.code, AsyncEventCode::BurstAck);
        let end = first.time_spec.unwrap();
        assert!((end - start - 0.003).abs() < 1e-9);
        assert!(stream.recv_async_msg(timeout).is_none());
    }

    #[test]
    fn test_stream_rejects_mismatched_buffers() {
        let mut dev = device("type=b210");
        let mut stream = dev.create_tx_stream(&StreamConfig::new(vec![0, 1])).unwrap();
        let a = vec![IQSample::new(0.0, 0.0); 10];
        let b = vec![IQSample::new(0.0, 0.0); 9];
        let md = TxMetadata::default();
        assert!(stream.send(&[&a], &md, Duration::ZERO).is_err());
        assert!(stream.send(&[&a, &b], &md, Duration::ZERO).is_err());
    }
}
