//! # Transmission Plan Configuration
//!
//! A plan file describes the device setup, transmit loop tuning, the chain
//! of sample files to play, and logging.
//!
//! ## Search Path
//!
//! [`PlanConfig::load`] uses the first file found:
//! 1. Path in the `BURSTLINE_CONFIG` environment variable
//! 2. `./burstline.yaml`
//!
//! ## Example
//!
//! ```yaml
//! device:
//!   uri: "loopback://"        # dry run; a USRP model is uhd-model://type=b210
//!   clock_source: external
//!   time_source: external
//!   channels: [0, 1]
//!   sample_rate: 1.0e6
//!   center_frequency: 915.0e6
//!   gain: 40.0
//!
//! transmit:
//!   max_chunk_size: 0        # 0 = device maximum per send call
//!   start_delay_ms: 500
//!   ack_timeout_ms: 100
//!
//! chain:
//!   blocks:
//!     - file: preamble.cf32
//!       duration: 0.01
//!       repeat: 1
//!     - file: beacon.cf32
//!       duration: 1.0
//!       repeat: 0            # forever
//! ```
//!
//! Relative block paths are resolved against the plan file's directory.

use crate::chain::Blockchain;
use crate::error::ChainResult;
use crate::observe::LogConfig;
use crate::timing::{ClockSource, TimeSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the plan file.
pub const CONFIG_ENV: &str = "BURSTLINE_CONFIG";

/// Error type for configuration operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),
    #[error("failed to read config: {0}")]
    ReadError(String),
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Radio device setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device URI, `driver://args` (e.g. `loopback://`, `uhd-model://type=b210`)
    pub uri: String,
    /// Frequency reference (internal, external, gpsdo, mimo)
    pub clock_source: String,
    /// Time reference (internal, external, gpsdo, mimo)
    pub time_source: String,
    /// TX channel indices to drive
    pub channels: Vec<usize>,
    /// Sample rate in Hz; also the rate the chain is validated against
    pub sample_rate: f64,
    /// Center frequency in Hz
    pub center_frequency: f64,
    /// TX gain in dB
    pub gain: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uri: "loopback://".to_string(),
            clock_source: "internal".to_string(),
            time_source: "internal".to_string(),
            channels: vec![0],
            sample_rate: 1_000_000.0,
            center_frequency: 915_000_000.0,
            gain: 0.0,
        }
    }
}

/// Which chunk of a file pass carries the device time tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeTagPolicy {
    /// Tag the first chunk of each pass (the radio holds the burst until then)
    #[default]
    StartOfBurst,
    /// Tag the closing chunk of each pass
    EndOfBurst,
}

/// Transmit loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Samples per burst chunk; 0 uses the stream's maximum per send call
    pub max_chunk_size: usize,
    /// Per-call timeout handed to the device's send primitive
    pub send_timeout_ms: u64,
    /// Upper bound on each acknowledgment poll after an end-of-burst chunk
    pub ack_timeout_ms: u64,
    /// Consecutive sends accepting nothing before the session fails
    pub max_stalled_sends: u32,
    /// Lead time between "now" on the device and the first burst
    pub start_delay_ms: u64,
    pub time_tag: TimeTagPolicy,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 0,
            send_timeout_ms: 100,
            ack_timeout_ms: 100,
            max_stalled_sends: 5,
            start_delay_ms: 100,
            time_tag: TimeTagPolicy::StartOfBurst,
        }
    }
}

impl TransmitConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Chunk size to stream with, given the stream's per-call maximum.
    pub fn chunk_size(&self, stream_max: usize) -> usize {
        match self.max_chunk_size {
            0 => stream_max.max(1),
            n => n,
        }
    }
}

/// One block of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    /// cf32 sample file
    pub file: PathBuf,
    /// Nominal on-air time per pass, in seconds
    pub duration: f64,
    /// Number of passes; 0 repeats forever (last block only)
    #[serde(default = "default_repeat")]
    pub repeat: i64,
}

fn default_repeat() -> i64 {
    1
}

/// Ordered block list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub blocks: Vec<BlockConfig>,
}

/// Complete plan file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub device: DeviceConfig,
    pub transmit: TransmitConfig,
    pub chain: ChainConfig,
    pub logging: LogConfig,
}

impl PlanConfig {
    /// Load from `$BURSTLINE_CONFIG` or `./burstline.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
            return Err(ConfigError::NotFound(format!(
                "{} points to {}",
                CONFIG_ENV,
                path.display()
            )));
        }

        let local = PathBuf::from("./burstline.yaml");
        if local.exists() {
            return Self::load_from(&local);
        }

        Err(ConfigError::NotFound(format!(
            "set {} or create ./burstline.yaml",
            CONFIG_ENV
        )))
    }

    /// Load from a specific file, resolving block paths relative to it.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::parse(&content)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Parse from a YAML string. Block paths are taken as written.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Make relative block paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for block in &mut self.chain.blocks {
            if block.file.is_relative() {
                block.file = base.join(&block.file);
            }
        }
    }

    /// Check values that can be checked without touching the device or files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        if !device.uri.contains("://") {
            return Err(ConfigError::ValidationError(format!(
                "device.uri '{}' must have the form driver://args",
                device.uri
            )));
        }
        device
            .clock_source
            .parse::<ClockSource>()
            .map_err(ConfigError::ValidationError)?;
        device
            .time_source
            .parse::<TimeSource>()
            .map_err(ConfigError::ValidationError)?;

        if !(device.sample_rate.is_finite() && device.sample_rate > 0.0) {
            return Err(ConfigError::ValidationError(
                "device.sample_rate must be positive".to_string(),
            ));
        }
        if device.channels.is_empty() {
            return Err(ConfigError::ValidationError(
                "device.channels must name at least one channel".to_string(),
            ));
        }
        let unique: HashSet<_> = device.channels.iter().collect();
        if unique.len() != device.channels.len() {
            return Err(ConfigError::ValidationError(
                "device.channels contains duplicates".to_string(),
            ));
        }

        if self.transmit.send_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transmit.send_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.transmit.max_stalled_sends == 0 {
            return Err(ConfigError::ValidationError(
                "transmit.max_stalled_sends must be > 0".to_string(),
            ));
        }

        if self.chain.blocks.is_empty() {
            return Err(ConfigError::ValidationError(
                "chain.blocks is empty".to_string(),
            ));
        }
        if let Some(pos) = self.chain.blocks.iter().position(|b| b.repeat == 0) {
            if pos + 1 != self.chain.blocks.len() {
                return Err(ConfigError::ValidationError(format!(
                    "chain.blocks[{}] repeats forever but is not the last block",
                    pos
                )));
            }
        }

        Ok(())
    }

    /// Build the chain at the device sample rate, appending blocks in order.
    pub fn build_chain(&self) -> ChainResult<Blockchain> {
        let mut chain = Blockchain::new(self.device.sample_rate)?;
        for block in &self.chain.blocks {
            chain.append(&block.file, block.duration, block.repeat)?;
        }
        Ok(chain)
    }

    /// Example plan as YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            device: DeviceConfig {
                uri: "loopback://".to_string(),
                clock_source: "external".to_string(),
                time_source: "external".to_string(),
                channels: vec![0, 1],
                gain: 40.0,
                ..Default::default()
            },
            chain: ChainConfig {
                blocks: vec![
                    BlockConfig {
                        file: PathBuf::from("preamble.cf32"),
                        duration: 0.01,
                        repeat: 1,
                    },
                    BlockConfig {
                        file: PathBuf::from("beacon.cf32"),
                        duration: 1.0,
                        repeat: 0,
                    },
                ],
            },
            ..Default::default()
        };
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Repeat;
    use crate::io::format;
    use crate::types::IQSample;
    use tempfile::TempDir;

    const PLAN: &str = r#"
device:
  uri: "loopback://"
  channels: [0, 1]
  sample_rate: 1000.0
transmit:
  max_chunk_size: 500
  time_tag: end_of_burst
chain:
  blocks:
    - file: a.cf32
      duration: 2.0
    - file: b.cf32
      duration: 1.0
      repeat: 0
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = PlanConfig::parse(PLAN).unwrap();
        assert_eq!(config.device.channels, vec![0, 1]);
        assert_eq!(config.device.clock_source, "internal");
        assert_eq!(config.transmit.max_chunk_size, 500);
        assert_eq!(config.transmit.time_tag, TimeTagPolicy::EndOfBurst);
        assert_eq!(config.transmit.ack_timeout(), Duration::from_millis(100));
        assert_eq!(config.chain.blocks[0].repeat, 1);
        assert_eq!(config.chain.blocks[1].repeat, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_falls_back_to_stream_max() {
        let mut transmit = TransmitConfig::default();
        assert_eq!(transmit.chunk_size(2040), 2040);
        transmit.max_chunk_size = 512;
        assert_eq!(transmit.chunk_size(2040), 512);
    }

    #[test]
    fn test_parse_error() {
        let err = PlanConfig::parse("device: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = PlanConfig::parse(PLAN).unwrap();

        let mut config = base.clone();
        config.device.channels = vec![0, 0];
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.device.clock_source = "rubidium".to_string();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.device.uri = "b210".to_string();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.chain.blocks.swap(0, 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not the last block"));

        let mut config = base;
        config.chain.blocks.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        format::write_file(dir.path().join("a.cf32"), &vec![IQSample::new(0.1, 0.1); 2000]).unwrap();
        format::write_file(dir.path().join("b.cf32"), &vec![IQSample::new(0.2, 0.2); 500]).unwrap();
        let plan_path = dir.path().join("plan.yaml");
        std::fs::write(&plan_path, PLAN).unwrap();

        let config = PlanConfig::load_from(&plan_path).unwrap();
        assert_eq!(config.chain.blocks[0].file, dir.path().join("a.cf32"));

        let chain = config.build_chain().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.sample_rate(), 1000.0);
        assert_eq!(chain.blocks()[1].repeat(), Repeat::Forever);
    }

    #[test]
    fn test_build_chain_reports_bad_block() {
        let dir = TempDir::new().unwrap();
        format::write_file(dir.path().join("a.cf32"), &vec![IQSample::new(0.1, 0.1); 3000]).unwrap();
        let mut config = PlanConfig::parse(PLAN).unwrap();
        config.resolve_paths(dir.path());
        // a.cf32 now plays 3 s but the block is declared 2 s
        assert!(config.build_chain().is_err());
    }

    #[test]
    fn test_example_yaml_roundtrips() {
        let yaml = PlanConfig::example_yaml();
        let config = PlanConfig::parse(&yaml).unwrap();
        assert_eq!(config.device.uri, "loopback://");
        assert_eq!(config.device.clock_source, "external");
        assert_eq!(config.chain.blocks.len(), 2);
        assert!(config.validate().is_ok());
    }
}
