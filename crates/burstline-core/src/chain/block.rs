//! A single playable unit of a chain.

use crate::error::{ChainError, ChainResult};
use crate::io::{FileBursts, SampleFile};
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;

/// How many times a block's file is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// A fixed number of passes
    Times(NonZeroU32),
    /// Replayed until the transmission is stopped; only legal on the last block
    Forever,
}

impl Repeat {
    /// Repeat count marking a block as replayed forever.
    pub const FOREVER_MARKER: i64 = 0;

    /// Interpret an integer repeat count: `0` is forever, negatives are rejected.
    pub fn from_count(count: i64) -> ChainResult<Self> {
        if count < 0 {
            return Err(ChainError::InvalidArgument(format!(
                "Repeat count can't be negative, got {}",
                count
            )));
        }
        if count == Self::FOREVER_MARKER {
            return Ok(Repeat::Forever);
        }
        u32::try_from(count)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Repeat::Times)
            .ok_or_else(|| {
                ChainError::InvalidArgument(format!("Repeat count {} is too large", count))
            })
    }

    #[inline]
    pub fn is_forever(&self) -> bool {
        matches!(self, Repeat::Forever)
    }

    /// Number of passes, `None` when unbounded.
    pub fn passes(&self) -> Option<u32> {
        match self {
            Repeat::Times(n) => Some(n.get()),
            Repeat::Forever => None,
        }
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repeat::Times(n) => write!(f, "x{}", n),
            Repeat::Forever => f.write_str("forever"),
        }
    }
}

/// A sample file with its nominal on-air duration and repeat count.
///
/// Immutable once built; the owning [`Blockchain`](super::Blockchain)
/// validates the timing against its sample rate before constructing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    source: SampleFile,
    duration: f64,
    repeat: Repeat,
}

impl Block {
    pub(crate) fn new(source: SampleFile, duration: f64, repeat: Repeat) -> Self {
        Self {
            source,
            duration,
            repeat,
        }
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn sample_count(&self) -> u64 {
        self.source.sample_count()
    }

    /// Nominal time the block occupies on air per pass, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// Total on-air time over all passes; `None` for a forever block.
    pub fn total_duration(&self) -> Option<f64> {
        self.repeat.passes().map(|n| self.duration * n as f64)
    }

    /// One pass of the block's file as bursts. Opens the file afresh.
    pub fn bursts(&self, max_chunk_size: usize) -> FileBursts {
        self.source.bursts(max_chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_from_count() {
        assert_eq!(Repeat::from_count(0).unwrap(), Repeat::Forever);
        assert_eq!(Repeat::from_count(3).unwrap().passes(), Some(3));
        assert!(matches!(
            Repeat::from_count(-1),
            Err(ChainError::InvalidArgument(_))
        ));
        assert!(Repeat::from_count(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_repeat_display() {
        assert_eq!(Repeat::Forever.to_string(), "forever");
        assert_eq!(Repeat::from_count(2).unwrap().to_string(), "x2");
    }
}
