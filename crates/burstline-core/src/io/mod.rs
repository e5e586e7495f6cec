//! Sample file I/O.
//!
//! Sample files are headerless sequences of little-endian `cf32` records
//! (`f32` I followed by `f32` Q), the format written by UHD's
//! `rx_samples_to_file` and GNU Radio's file sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use burstline_core::io::{SampleFile, format};
//! use burstline_core::types::IQSample;
//!
//! let samples = vec![IQSample::new(0.5, -0.5); 1000];
//! format::write_file("/tmp/tone.cf32", &samples).unwrap();
//!
//! let file = SampleFile::inspect("/tmp/tone.cf32").unwrap();
//! for burst in file.bursts(256) {
//!     let burst = burst.unwrap();
//!     println!("{} samples, sob={} eob={}", burst.len(), burst.start_of_burst, burst.end_of_burst);
//! }
//! ```

pub mod format;
mod reader;

pub use reader::{FileBursts, SampleFile};
