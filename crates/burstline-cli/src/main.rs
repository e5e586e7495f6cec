//! Burstline - timed burst playback of IQ sample files through an SDR
//!
//! # Commands
//!
//! - `burstline run` - Configure the device and play a transmission plan
//! - `burstline check` - Validate a plan and its sample files
//! - `burstline drivers` - List device drivers and discoverable devices
//! - `burstline tone` - Write a cf32 test tone
//! - `burstline example` - Print an example plan
//!
//! # Usage
//!
//! ```bash
//! # Write a 10 ms tone and check the plan that uses it
//! burstline tone beacon.cf32 --rate 1e6 --duration 0.01
//! burstline check plan.yaml
//!
//! # Play it; Ctrl-C stops after the current burst
//! burstline run plan.yaml
//!
//! # Dry run against the software loopback device
//! burstline run plan.yaml --uri loopback://
//! ```
//!
//! Without a plan argument, `$BURSTLINE_CONFIG` and then `./burstline.yaml`
//! are tried.

mod check;
mod drivers;
mod plan;
mod run;
mod tone;

use anyhow::Result;
use burstline_core::observe::{init_logging, LogConfig};
use clap::{Parser, Subcommand};

/// Burstline - timed burst playback of IQ sample files through an SDR
#[derive(Parser)]
#[command(name = "burstline")]
#[command(about = "Timed burst playback of IQ sample files through an SDR")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the device and play a transmission plan
    Run(run::RunArgs),

    /// Validate a plan and the sample files it names
    Check(check::CheckArgs),

    /// List device drivers and discoverable devices as JSON
    Drivers,

    /// Write a cf32 test tone
    Tone(tone::ToneArgs),

    /// Print an example plan
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Logging for `run` comes from the plan file
        Commands::Run(args) => run::execute(args),
        Commands::Check(args) => {
            init_logging(&LogConfig::default());
            check::execute(args)
        }
        Commands::Drivers => {
            init_logging(&LogConfig::quiet());
            drivers::execute()
        }
        Commands::Tone(args) => {
            init_logging(&LogConfig::default());
            tone::execute(args)
        }
        Commands::Example => {
            print!("{}", burstline_core::PlanConfig::example_yaml());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["burstline", "run", "plan.yaml", "--uri", "loopback://"])
            .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.plan.unwrap().to_str(), Some("plan.yaml"));
                assert_eq!(args.uri.as_deref(), Some("loopback://"));
            }
            _ => panic!("expected run"),
        }
    }
}
