//! Check command - validate a plan without transmitting
//!
//! Inspects every sample file (size only), checks block timing
//! against the device sample rate, and with `--device` also opens and tunes
//! the device the plan names.

use anyhow::{Context, Result};
use burstline_core::{Blockchain, PlanConfig};
use burstline_sim::hal::create_default_registry;
use burstline_sim::TxManager;
use clap::Args;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::plan;

/// Arguments for the check command
#[derive(Args)]
pub struct CheckArgs {
    /// Plan file (default: $BURSTLINE_CONFIG or ./burstline.yaml)
    pub plan: Option<PathBuf>,

    /// Also open and configure the device
    #[arg(long)]
    pub device: bool,
}

/// Execute the check command
pub fn execute(args: CheckArgs) -> Result<()> {
    let config = plan::load(args.plan.as_deref())?;
    let chain = config.build_chain().context("Plan does not build a valid chain")?;
    print!("{}", summary(&config, &chain));

    if args.device {
        let device = create_default_registry()
            .create(&config.device.uri)
            .with_context(|| format!("Failed to open {}", config.device.uri))?;
        let mut manager = TxManager::new(device, config.transmit.clone());
        let settings = manager.setup_for_xmit(
            &config.device.channels,
            config.device.sample_rate,
            config.device.center_frequency,
            config.device.gain,
        )?;
        println!("Device: {}", manager.device().name());
        for s in settings {
            println!(
                "  ch{}: {} S/s @ {} Hz, gain {} dB",
                s.channel, s.sample_rate, s.center_frequency, s.gain
            );
        }
    }
    Ok(())
}

fn summary(config: &PlanConfig, chain: &Blockchain) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Plan OK: {} blocks at {} S/s on {}",
        chain.len(),
        chain.sample_rate(),
        config.device.uri
    );
    for (i, block) in chain.blocks().iter().enumerate() {
        let _ = writeln!(
            out,
            "  [{}] {} ({} samples, {} s, {})",
            i,
            block.path().display(),
            block.sample_count(),
            block.duration(),
            block.repeat()
        );
    }
    match chain.total_duration() {
        Some(total) => {
            let _ = writeln!(out, "Total: {} s", total);
        }
        None => {
            let _ = writeln!(out, "Total: repeats until stopped");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use burstline_core::io::format;
    use burstline_core::IQSample;
    use tempfile::TempDir;

    fn write_plan(dir: &TempDir, repeat: i64) -> PathBuf {
        format::write_file(dir.path().join("a.cf32"), &vec![IQSample::new(0.1, 0.0); 100]).unwrap();
        let yaml = format!(
            "device:\n  sample_rate: 1000.0\nchain:\n  blocks:\n    - file: a.cf32\n      duration: 0.2\n      repeat: {}\n",
            repeat
        );
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_summary_lists_blocks() {
        let dir = TempDir::new().unwrap();
        let config = plan::load(Some(write_plan(&dir, 3).as_path())).unwrap();
        let chain = config.build_chain().unwrap();

        let text = summary(&config, &chain);
        assert!(text.contains("1 blocks at 1000 S/s on loopback://"));
        assert!(text.contains("100 samples, 0.2 s, x3"));
        assert!(text.contains("Total: 0.6"));
    }

    #[test]
    fn test_summary_forever() {
        let dir = TempDir::new().unwrap();
        let config = plan::load(Some(write_plan(&dir, 0).as_path())).unwrap();
        let chain = config.build_chain().unwrap();
        assert!(summary(&config, &chain).contains("repeats until stopped"));
    }

    #[test]
    fn test_check_with_loopback_device() {
        let dir = TempDir::new().unwrap();
        let args = CheckArgs {
            plan: Some(write_plan(&dir, 1)),
            device: true,
        };
        execute(args).unwrap();
    }
}
