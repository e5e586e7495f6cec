//! # Burstline Core
//!
//! Burst scheduling for timed playback of IQ sample files through a
//! software-defined radio.
//!
//! ## Overview
//!
//! A transmission plan is an ordered list of sample files, each with a
//! nominal on-air duration and a repeat count. The last file may repeat
//! forever. This crate turns such a plan into one continuous stream of
//! fixed-size transfer chunks ([`Burst`]s) carrying burst-boundary flags and
//! start offsets, without ever holding more than one chunk in memory.
//!
//! - **Sample files**: headerless little-endian cf32 records ([`io`])
//! - **Blocks**: file + duration + repeat count ([`chain::Block`])
//! - **Blockchain**: the ordered plan and its lazy burst stream ([`chain`])
//! - **Timing**: sample clock, device time specs, sync sources ([`timing`])
//! - **Configuration**: YAML plan files ([`config`])
//!
//! ## Data Flow
//!
//! ```text
//! cf32 file ──► FileBursts ──► Block pass ──► BlockStream ──► transmit loop
//!  (bytes)      (chunks)       (SOB/EOB)      (relative_time)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use burstline_core::Blockchain;
//!
//! let mut chain = Blockchain::new(1_000_000.0)?;
//! chain.append("a.cf32", 2.0, 1)?;
//! chain.append("b.cf32", 1.0, 2)?;
//!
//! for burst in chain.stream(2040)? {
//!     let burst = burst?;
//!     println!("{} samples, sob={} eob={}", burst.len(), burst.start_of_burst, burst.end_of_burst);
//! }
//! # Ok::<(), burstline_core::ChainError>(())
//! ```

pub mod burst;
pub mod chain;
pub mod config;
pub mod error;
pub mod io;
pub mod observe;
pub mod timing;
pub mod types;

pub use burst::Burst;
pub use chain::{Block, BlockStream, Blockchain, Repeat};
pub use config::{ConfigError, PlanConfig, TimeTagPolicy};
pub use error::{ChainError, ChainResult};
pub use timing::{ClockSource, SampleClock, TimeSource, TimeSpec};
pub use types::IQSample;
