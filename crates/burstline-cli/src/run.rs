//! Run command - configure the device and play a plan
//!
//! Ctrl-C (or `--max-seconds`) cancels the session; the burst in flight is
//! finished and acknowledged before the report is printed.

use anyhow::{anyhow, Context, Result};
use burstline_core::observe::init_logging;
use burstline_core::{ClockSource, PlanConfig, TimeSource};
use burstline_sim::hal::create_default_registry;
use burstline_sim::{SyncSource, TransmitReport, TxManager};
use clap::Args;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::plan;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Plan file (default: $BURSTLINE_CONFIG or ./burstline.yaml)
    pub plan: Option<PathBuf>,

    /// Device URI overriding the plan's (e.g. loopback://)
    #[arg(long)]
    pub uri: Option<String>,

    /// Stop after this many seconds of wall time
    #[arg(long)]
    pub max_seconds: Option<f64>,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    let mut config = plan::load(args.plan.as_deref())?;
    if let Some(uri) = args.uri {
        config.device.uri = uri;
    }
    init_logging(&config.logging);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let deadline = match args.max_seconds {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            Some(Instant::now() + Duration::from_secs_f64(secs))
        }
        Some(secs) => return Err(anyhow!("--max-seconds must be >= 0, got {}", secs)),
        None => None,
    };

    let report = play(&config, &stop, deadline)?;
    if report.missing_acks() > 0 {
        warn!(missing = report.missing_acks(), "Some bursts were not acknowledged");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Open the plan's device, play its chain and return the session report.
///
/// `stop` and `deadline` are polled while the session runs.
fn play(config: &PlanConfig, stop: &AtomicBool, deadline: Option<Instant>) -> Result<TransmitReport> {
    let chain = Arc::new(config.build_chain().context("Failed to build chain")?);
    let sync = SyncSource::new(
        config
            .device
            .clock_source
            .parse::<ClockSource>()
            .map_err(|e| anyhow!(e))?,
        config
            .device
            .time_source
            .parse::<TimeSource>()
            .map_err(|e| anyhow!(e))?,
    );

    let device = create_default_registry()
        .create(&config.device.uri)
        .with_context(|| format!("Failed to open {}", config.device.uri))?;
    let mut manager = TxManager::new(device, config.transmit.clone());
    manager
        .set_sync_source(sync)
        .context("Failed to set sync source")?;
    manager
        .setup_for_xmit(
            &config.device.channels,
            config.device.sample_rate,
            config.device.center_frequency,
            config.device.gain,
        )
        .context("Failed to configure device")?;

    manager.start(chain)?;
    info!("Transmitting, Ctrl-C to stop");

    let mut cancelled = false;
    while manager.is_transmitting() {
        let expired = deadline.is_some_and(|d| Instant::now() >= d);
        if stop.load(Ordering::SeqCst) || expired {
            cancelled = true;
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let report = if cancelled {
        manager.stop()?
    } else {
        manager.wait()?
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burstline_core::io::format;
    use burstline_core::IQSample;
    use tempfile::TempDir;

    fn write_plan(dir: &TempDir, repeat: i64) -> PlanConfig {
        format::write_file(dir.path().join("a.cf32"), &vec![IQSample::new(0.3, 0.0); 250]).unwrap();
        let yaml = format!(
            "device:\n  sample_rate: 1000.0\n  channels: [0, 1]\ntransmit:\n  start_delay_ms: 0\n  ack_timeout_ms: 5\nchain:\n  blocks:\n    - file: a.cf32\n      duration: 0.25\n      repeat: {}\n",
            repeat
        );
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, yaml).unwrap();
        plan::load(Some(path.as_path())).unwrap()
    }

    #[test]
    fn test_play_finite_plan() {
        let dir = TempDir::new().unwrap();
        let config = write_plan(&dir, 4);
        let report = play(&config, &AtomicBool::new(false), None).unwrap();
        assert_eq!(report.passes, 4);
        assert_eq!(report.samples, 1000);
        assert_eq!(report.acks_received, 8);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_play_forever_until_deadline() {
        let dir = TempDir::new().unwrap();
        let config = write_plan(&dir, 0);
        let deadline = Instant::now() + Duration::from_millis(20);
        let report = play(&config, &AtomicBool::new(false), Some(deadline)).unwrap();
        assert!(report.cancelled);
        assert!(report.passes >= 1);
    }

    #[test]
    fn test_play_stop_flag() {
        let dir = TempDir::new().unwrap();
        let config = write_plan(&dir, 0);
        let report = play(&config, &AtomicBool::new(true), None).unwrap();
        assert!(report.cancelled);
    }

    #[test]
    fn test_play_unknown_driver() {
        let dir = TempDir::new().unwrap();
        let mut config = write_plan(&dir, 1);
        config.device.uri = "soapy://".to_string();
        assert!(play(&config, &AtomicBool::new(false), None).is_err());
    }
}
