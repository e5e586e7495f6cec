//! SDR Device Errors and Descriptors
//!
//! Types shared by every driver: the error enum, capability description and
//! discovery records.

use burstline_core::ChainError;
use burstline_core::{ClockSource, TimeSource};
use serde::Serialize;

/// Result type for SDR operations
pub type SdrResult<T> = Result<T, SdrError>;

/// Errors that can occur during SDR operations
#[derive(Debug, thiserror::Error)]
pub enum SdrError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Hardware error: {0}")]
    HardwareError(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Transmit session already running")]
    AlreadyRunning,

    #[error("Device not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid channel {channel}: device has {available} TX channel(s)")]
    InvalidChannel { channel: usize, available: usize },

    #[error(
        "Clock and time source combination {} not valid for this device, valid combos are: {}",
        .requested,
        .valid.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    SyncSource {
        requested: SyncSource,
        valid: Vec<SyncSource>,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl SdrError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SdrError::Timeout(_))
    }
}

/// A clock source paired with a time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SyncSource {
    pub clock: ClockSource,
    pub time: TimeSource,
}

impl SyncSource {
    pub const fn new(clock: ClockSource, time: TimeSource) -> Self {
        Self { clock, time }
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clock_source={},time_source={}", self.clock, self.time)
    }
}

/// Device capabilities
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceCapabilities {
    /// Minimum frequency in Hz
    pub min_frequency: f64,
    /// Maximum frequency in Hz
    pub max_frequency: f64,
    /// Minimum sample rate
    pub min_sample_rate: f64,
    /// Maximum sample rate
    pub max_sample_rate: f64,
    /// TX gain range in dB
    pub tx_gain_range: (f64, f64),
    /// Number of TX channels
    pub tx_channels: usize,
}

/// Device information for discovery
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device type/driver
    pub driver: String,
    /// Device serial number
    pub serial: String,
    /// Device label/name
    pub label: String,
    /// Connection string
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_source_display() {
        let sync = SyncSource::new(ClockSource::Gpsdo, TimeSource::Gpsdo);
        assert_eq!(sync.to_string(), "clock_source=gpsdo,time_source=gpsdo");
    }

    #[test]
    fn test_sync_error_lists_valid_combos() {
        let err = SdrError::SyncSource {
            requested: SyncSource::new(ClockSource::Mimo, TimeSource::Internal),
            valid: vec![
                SyncSource::default(),
                SyncSource::new(ClockSource::External, TimeSource::External),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("clock_source=mimo,time_source=internal"));
        assert!(msg.contains("clock_source=internal,time_source=internal"));
        assert!(msg.contains("clock_source=external,time_source=external"));
    }

    #[test]
    fn test_chain_error_converts() {
        let err: SdrError = ChainError::Logic("closed".to_string()).into();
        assert!(matches!(err, SdrError::Chain(_)));
        assert!(!err.is_transient());
        assert!(SdrError::Timeout("send".into()).is_transient());
    }
}
