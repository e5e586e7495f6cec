//! The unit of transfer between the chain and the transmit loop.

use crate::types::IQSample;

/// A bounded chunk of samples from one playback pass of a block's file.
///
/// `relative_time` is seconds since the start of the whole transmission and
/// is only meaningful on a start-of-burst chunk. Every other chunk of the pass
/// is contiguous with the start chunk that preceded it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Burst {
    /// Sample payload
    pub samples: Vec<IQSample>,
    /// First chunk of a file pass
    pub start_of_burst: bool,
    /// Last chunk of a file pass
    pub end_of_burst: bool,
    /// Offset from transmission start, in seconds
    pub relative_time: f64,
}

impl Burst {
    pub fn new(samples: Vec<IQSample>, start_of_burst: bool, end_of_burst: bool) -> Self {
        Self {
            samples,
            start_of_burst,
            end_of_burst,
            relative_time: 0.0,
        }
    }

    /// Number of samples in this chunk
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether this chunk is a whole pass on its own.
    #[inline]
    pub fn is_single_chunk(&self) -> bool {
        self.start_of_burst && self.end_of_burst
    }
}
