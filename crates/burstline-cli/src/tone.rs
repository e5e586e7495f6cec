//! Tone command - write a cf32 test tone

use anyhow::{bail, Context, Result};
use burstline_core::io::format;
use burstline_core::types::complex_ops;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the tone command
#[derive(Args)]
pub struct ToneArgs {
    /// Output file
    pub output: PathBuf,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 1_000_000.0)]
    pub rate: f64,

    /// Tone offset from the carrier in Hz
    #[arg(long, default_value_t = 10_000.0)]
    pub freq: f64,

    /// Length in seconds
    #[arg(long, default_value_t = 0.01)]
    pub duration: f64,

    /// Peak amplitude (full scale = 1.0)
    #[arg(long, default_value_t = 0.7)]
    pub amplitude: f32,
}

/// Execute the tone command
pub fn execute(args: ToneArgs) -> Result<()> {
    let (samples, bytes) = write_tone(&args)?;
    println!(
        "Wrote {} samples ({} bytes) to {}",
        samples,
        bytes,
        args.output.display()
    );
    Ok(())
}

fn write_tone(args: &ToneArgs) -> Result<(usize, usize)> {
    if !(args.rate.is_finite() && args.rate > 0.0) {
        bail!("Sample rate must be positive, got {}", args.rate);
    }
    if !(args.duration.is_finite() && args.duration >= 0.0) {
        bail!("Duration must be a non-negative number of seconds, got {}", args.duration);
    }

    // Floor so the file never plays longer than the duration asked for
    let count = (args.duration * args.rate).floor() as usize;
    let samples = complex_ops::tone(args.freq, args.rate, count, args.amplitude);
    let bytes = format::write_file(&args.output, &samples)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    Ok((count, bytes))
}
