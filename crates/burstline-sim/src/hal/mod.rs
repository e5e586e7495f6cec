//! # Hardware Abstraction Layer (HAL)
//!
//! Transmit-side abstraction of an SDR:
//!
//! - **TxStreamer**: timed, flagged transfers of I/Q samples plus the
//!   asynchronous event channel the device reports burst completion on
//! - **TunerControl**: per-channel sample rate, frequency, gain
//! - **ClockControl**: clock/time source selection and device time
//! - **TxDevice**: a device combining the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TxManager / transmit loop                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  HAL Interface (Rust traits)                │
//! │     TxDevice, TxStreamer, TunerControl, ClockControl        │
//! ├─────────────────────────────┬───────────────────────────────┤
//! │  Loopback (software)        │  UHD (USRP B2xx/N2xx/X3xx)    │
//! └─────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use burstline_sim::hal::{create_default_registry, StreamConfig, TxMetadata};
//!
//! let registry = create_default_registry();
//! let mut device = registry.create("uhd-model://type=b210")?;
//! device.tuner().set_tx_rate(0, 1_000_000.0)?;
//!
//! let mut stream = device.create_tx_stream(&StreamConfig::new(vec![0]))?;
//! let md = TxMetadata::burst(true, true, None);
//! stream.send(&[&samples], &md, Duration::from_millis(100))?;
//! ```

use crate::device::{DeviceCapabilities, DeviceInfo, SdrError, SdrResult};
use burstline_core::types::IQSample;
use burstline_core::TimeSpec;
use serde::Serialize;
use std::time::{Duration, Instant};

pub mod loopback;
pub mod uhd;

pub use crate::device::SyncSource;
pub use loopback::{LoopbackDevice, LoopbackDriver, LoopbackOptions, SendLog, SendRecord};
pub use uhd::UhdDriver;

/// Per-transfer metadata handed to [`TxStreamer::send`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TxMetadata {
    /// First transfer of a burst
    pub start_of_burst: bool,
    /// Last transfer of a burst; the device acknowledges it per channel
    pub end_of_burst: bool,
    /// Device time at which the transfer goes on air (`None` = as soon as possible)
    pub time_spec: Option<TimeSpec>,
}

impl TxMetadata {
    pub fn burst(start_of_burst: bool, end_of_burst: bool, time_spec: Option<TimeSpec>) -> Self {
        Self {
            start_of_burst,
            end_of_burst,
            time_spec,
        }
    }

    #[inline]
    pub fn has_time_spec(&self) -> bool {
        self.time_spec.is_some()
    }
}

/// Kinds of asynchronous TX events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncEventCode {
    /// An end-of-burst transfer has been fully transmitted
    BurstAck,
    /// The device ran out of samples between transfers
    Underflow,
    /// The device ran out of samples within a transfer
    UnderflowInPacket,
    /// A transfer was lost or arrived out of order
    SeqError,
    /// A transfer was lost or arrived out of order within a burst
    SeqErrorInBurst,
    /// A time-tagged transfer arrived after its time had passed
    TimeError,
    /// Vendor-specific payload
    UserPayload,
}

impl AsyncEventCode {
    pub fn is_ack(&self) -> bool {
        matches!(self, AsyncEventCode::BurstAck)
    }
}

/// An asynchronous message from a TX stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AsyncEvent {
    /// Stream channel position the event refers to
    pub channel: usize,
    pub code: AsyncEventCode,
    pub time_spec: Option<TimeSpec>,
}

/// TX stream configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Device channel indices, one buffer per entry on every send
    pub channels: Vec<usize>,
    /// Samples per packet override (`None` = driver default)
    pub samples_per_packet: Option<usize>,
}

impl StreamConfig {
    pub fn new(channels: Vec<usize>) -> Self {
        Self {
            channels,
            samples_per_packet: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(vec![0])
    }
}

/// Settings a channel ended up with after setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelSettings {
    pub channel: usize,
    pub sample_rate: f64,
    pub center_frequency: f64,
    pub gain: f64,
}

/// Transmit stream.
///
/// One `send` delivers the same number of samples on every channel of the
/// stream. Devices may accept fewer samples than offered; the caller resends
/// the remainder.
pub trait TxStreamer: Send {
    /// Largest number of samples per channel a single `send` accepts.
    fn max_samples_per_call(&self) -> usize;

    /// Number of channels (buffers per `send`).
    fn num_channels(&self) -> usize;

    /// Send samples.
    ///
    /// Returns the number of samples per channel actually accepted, which
    /// may be zero if the device had no room within `timeout`.
    ///
    /// # Arguments
    /// * `buffers` - One slice per channel, all the same length
    /// * `metadata` - Burst flags and optional time tag
    /// * `timeout` - Maximum time to wait for buffer space
    fn send(
        &mut self,
        buffers: &[&[IQSample]],
        metadata: &TxMetadata,
        timeout: Duration,
    ) -> SdrResult<usize>;

    /// Poll for an asynchronous event, waiting at most `timeout`.
    fn recv_async_msg(&mut self, timeout: Duration) -> Option<AsyncEvent>;
}

/// Per-channel TX tuning.
pub trait TunerControl: Send {
    /// Set TX sample rate. Returns the actual rate set.
    fn set_tx_rate(&mut self, channel: usize, rate: f64) -> SdrResult<f64>;

    /// Get current TX sample rate.
    fn tx_rate(&self, channel: usize) -> f64;

    /// Set TX center frequency. Returns the actual frequency set.
    fn set_tx_frequency(&mut self, channel: usize, freq_hz: f64) -> SdrResult<f64>;

    /// Set TX gain. Returns the actual gain set.
    fn set_tx_gain(&mut self, channel: usize, gain_db: f64) -> SdrResult<f64>;
}

/// Clock control interface for timing synchronization.
pub trait ClockControl: Send {
    /// Select clock and time source together.
    ///
    /// Rejected combinations return [`SdrError::SyncSource`] listing the
    /// combinations the device does support.
    fn set_sync_source(&mut self, sync: SyncSource) -> SdrResult<()>;

    /// Current clock and time source.
    fn sync_source(&self) -> SyncSource;

    /// Valid clock/time source combinations.
    fn sync_sources(&self) -> Vec<SyncSource>;

    /// Get current device time.
    fn time(&self) -> TimeSpec;

    /// Set device time.
    fn set_time(&mut self, time: TimeSpec) -> SdrResult<()>;
}

/// High-level transmit device interface.
pub trait TxDevice: Send {
    /// Get device name/description.
    fn name(&self) -> &str;

    /// Get device capabilities.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Get tuner control interface.
    fn tuner(&mut self) -> &mut dyn TunerControl;

    /// Get clock control interface.
    fn clock(&mut self) -> &mut dyn ClockControl;

    /// Create a TX stream over the given channels.
    fn create_tx_stream(&mut self, config: &StreamConfig) -> SdrResult<Box<dyn TxStreamer>>;
}

/// Driver factory for creating devices.
pub trait DeviceDriver: Send + Sync {
    /// Driver name (e.g., "uhd-model", "loopback").
    fn name(&self) -> &str;

    /// Discover available devices.
    fn discover(&self) -> Vec<DeviceInfo>;

    /// Create a device from the argument part of a URI.
    fn create_from_string(&self, args: &str) -> SdrResult<Box<dyn TxDevice>>;
}

/// Registry of available device drivers.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn DeviceDriver>>,
}

impl DriverRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    /// Register a device driver.
    pub fn register(&mut self, driver: Box<dyn DeviceDriver>) {
        self.drivers.push(driver);
    }

    /// Get a driver by name.
    pub fn get(&self, name: &str) -> Option<&dyn DeviceDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.as_ref())
    }

    /// List all available drivers.
    pub fn list(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Discover all devices across all drivers.
    pub fn discover_all(&self) -> Vec<(String, DeviceInfo)> {
        let mut devices = Vec::new();
        for driver in &self.drivers {
            for info in driver.discover() {
                devices.push((driver.name().to_string(), info));
            }
        }
        devices
    }

    /// Create a device from a connection string.
    ///
    /// Format: "driver://args" (e.g., "uhd-model://type=b210", "loopback://")
    pub fn create(&self, uri: &str) -> SdrResult<Box<dyn TxDevice>> {
        let Some((driver_name, args)) = uri.split_once("://") else {
            return Err(SdrError::ConfigError(format!(
                "Invalid URI '{}'. Use 'driver://args'",
                uri
            )));
        };

        let driver = self.get(driver_name).ok_or_else(|| {
            SdrError::DeviceNotFound(format!(
                "Unknown driver: {} (available: {})",
                driver_name,
                self.list().join(", ")
            ))
        })?;

        driver.create_from_string(args)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Free-running device time base: a time set at some instant plus the wall
/// time elapsed since.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeBase {
    set_at: Instant,
    value: TimeSpec,
}

impl TimeBase {
    pub(crate) fn new(value: TimeSpec) -> Self {
        Self {
            set_at: Instant::now(),
            value,
        }
    }

    pub(crate) fn now(&self) -> TimeSpec {
        self.value + self.set_at.elapsed()
    }
}

/// Parse `key=value,key=value` device arguments.
pub(crate) fn parse_args(args: &str) -> Vec<(String, String)> {
    args.split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect()
}

/// Value of `key` in parsed device arguments.
pub(crate) fn arg_value<'a>(args: &'a [(String, String)], key: &str) -> Option<&'a str> {
    args.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Create a driver registry with all built-in drivers.
///
/// - UHD driver model (USRP B2xx, N2xx, X3xx)
/// - Loopback driver (software device for dry runs and tests)
pub fn create_default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Box::new(uhd::UhdDriver::new()));
    registry.register(Box::new(loopback::LoopbackDriver::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.channels, vec![0]);
        assert_eq!(config.samples_per_packet, None);
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args("type=b210, Serial=ABC123,flag");
        assert_eq!(
            parsed,
            vec![
                ("type".to_string(), "b210".to_string()),
                ("serial".to_string(), "ABC123".to_string()),
            ]
        );
        assert!(parse_args("").is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::new();
        assert!(registry.list().is_empty());
        assert!(registry.get("loopback").is_none());
    }

    #[test]
    fn test_default_registry_creates_devices() {
        let registry = create_default_registry();
        assert_eq!(registry.list(), vec!["uhd-model", "loopback"]);

        let device = registry.create("loopback://").unwrap();
        assert!(device.name().contains("Loopback"));

        let device = registry.create("uhd-model://type=b210").unwrap();
        assert_eq!(device.capabilities().tx_channels, 2);

        // Only the model exists; a plain uhd:// URI must not pass for hardware
        assert!(matches!(
            registry.create("uhd://type=b210"),
            Err(SdrError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_registry_rejects_bad_uri() {
        let registry = create_default_registry();
        assert!(matches!(registry.create("b210"), Err(SdrError::ConfigError(_))));
        assert!(matches!(
            registry.create("soapy://driver=lime"),
            Err(SdrError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_metadata() {
        let md = TxMetadata::burst(true, false, Some(TimeSpec::new(5, 0.25)));
        assert!(md.has_time_spec());
        assert!(!TxMetadata::default().has_time_spec());
        assert!(AsyncEventCode::BurstAck.is_ack());
        assert!(!AsyncEventCode::Underflow.is_ack());
    }
}
