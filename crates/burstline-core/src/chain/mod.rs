//! # Blockchain
//!
//! An ordered, append-only list of [`Block`]s that together describe one
//! continuous planned transmission.
//!
//! ```text
//!  Block A (2.0 s, x1)   Block B (1.0 s, x2)        Block C (0.5 s, forever)
//! ├────────────────────┼──────────┼──────────┼─────┼─────┼─────┼── ...
//! 0.0                  2.0        3.0        4.0   4.5   5.0
//! ```
//!
//! Each block is validated once, when appended, against the chain's sample
//! rate. Streaming ([`Blockchain::stream`]) walks the list lazily: file
//! contents are only read one chunk at a time, so a chain whose last block
//! repeats forever can be streamed indefinitely in constant memory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use burstline_core::chain::Blockchain;
//!
//! let mut chain = Blockchain::new(1_000_000.0).unwrap();
//! chain.append("preamble.cf32", 0.010, 1).unwrap();
//! chain.append("beacon.cf32", 1.0, 0).unwrap(); // 0 = repeat forever
//!
//! for burst in chain.stream(4096).unwrap().take(100) {
//!     let burst = burst.unwrap();
//!     if burst.start_of_burst {
//!         println!("pass starts at +{:.3} s", burst.relative_time);
//!     }
//! }
//! ```

mod block;
mod stream;

pub use block::{Block, Repeat};
pub use stream::BlockStream;

use crate::error::{ChainError, ChainResult};
use crate::io::SampleFile;
use std::path::PathBuf;
use tracing::debug;

/// Ordered sequence of blocks plus the sample rate used to validate them.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    sample_rate: f64,
}

impl Blockchain {
    /// Create an empty chain for samples played at `sample_rate` Hz.
    pub fn new(sample_rate: f64) -> ChainResult<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ChainError::InvalidArgument(format!(
                "Sample rate must be a positive number, got {}",
                sample_rate
            )));
        }
        Ok(Self {
            blocks: Vec::new(),
            sample_rate,
        })
    }

    /// Append a block playing `file` for `nominal_duration` seconds per pass.
    ///
    /// `repeat_count` is the number of passes; `0` repeats the block forever
    /// and closes the chain to further appends.
    ///
    /// # Errors
    ///
    /// - [`ChainError::InvalidArgument`] if the file is missing, not a regular
    ///   file, not a whole number of cf32 records, plays longer than
    ///   `nominal_duration`, or if `repeat_count` is negative
    /// - [`ChainError::Logic`] if the chain already ends in a forever block
    ///
    /// The chain is left unchanged on error.
    pub fn append<P: Into<PathBuf>>(
        &mut self,
        file: P,
        nominal_duration: f64,
        repeat_count: i64,
    ) -> ChainResult<()> {
        let source = SampleFile::inspect(file)?;

        if !nominal_duration.is_finite() || nominal_duration < 0.0 {
            return Err(ChainError::InvalidArgument(format!(
                "Block time must be a non-negative number of seconds, got {}",
                nominal_duration
            )));
        }
        let file_time = source.playback_time(self.sample_rate);
        if file_time > nominal_duration {
            return Err(ChainError::InvalidArgument(format!(
                "Block time can't be shorter than sample length; got time {} but file time is {}",
                nominal_duration, file_time
            )));
        }

        let repeat = Repeat::from_count(repeat_count)?;

        if self.is_infinite() {
            return Err(ChainError::Logic(
                "Can't add any more blocks after infinite repeat block".to_string(),
            ));
        }

        if repeat.is_forever() && source.sample_count() == 0 {
            return Err(ChainError::InvalidArgument(format!(
                "{} is empty and can't be repeated forever",
                source.path().display()
            )));
        }

        debug!(
            path = %source.path().display(),
            samples = source.sample_count(),
            duration = nominal_duration,
            repeat = %repeat,
            "Appending block"
        );
        self.blocks.push(Block::new(source, nominal_duration, repeat));
        Ok(())
    }

    /// Stream the whole chain as bursts of at most `max_chunk_size` samples.
    pub fn stream(&self, max_chunk_size: usize) -> ChainResult<BlockStream<'_>> {
        if max_chunk_size == 0 {
            return Err(ChainError::InvalidArgument(
                "Maximum chunk size must be at least one sample".to_string(),
            ));
        }
        Ok(BlockStream::new(&self.blocks, max_chunk_size))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether the chain ends in a forever block.
    pub fn is_infinite(&self) -> bool {
        self.blocks.last().is_some_and(|b| b.repeat().is_forever())
    }

    /// Planned on-air time of the whole chain; `None` when it never ends.
    pub fn total_duration(&self) -> Option<f64> {
        self.blocks.iter().map(Block::total_duration).sum()
    }
}
