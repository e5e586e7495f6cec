//! Lazy composition of a chain into one timed burst stream.

use super::block::{Block, Repeat};
use crate::burst::Burst;
use crate::error::ChainResult;
use crate::io::FileBursts;
use tracing::{debug, trace};

/// The whole chain played once through, as a pull-based burst sequence.
///
/// State is a cursor (block index, completed passes of that block, the
/// current pass's reader) plus the running time offset; nothing is
/// pre-computed, so a trailing forever block streams in constant memory.
///
/// Every start-of-burst chunk gets `relative_time` set to the offset reached
/// so far, after which the offset advances by the block's nominal duration.
/// After an error has been yielded the stream ends.
pub struct BlockStream<'a> {
    blocks: &'a [Block],
    max_chunk_size: usize,
    index: usize,
    passes_done: u64,
    current: Option<FileBursts>,
    offset: f64,
    finished: bool,
}

impl<'a> BlockStream<'a> {
    pub(super) fn new(blocks: &'a [Block], max_chunk_size: usize) -> Self {
        Self {
            blocks,
            max_chunk_size,
            index: 0,
            passes_done: 0,
            current: None,
            offset: 0.0,
            finished: blocks.is_empty(),
        }
    }

    /// Seconds of nominal air time covered by the passes started so far.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Index of the block currently being played.
    pub fn block_index(&self) -> usize {
        self.index
    }

    /// Open the next pass, moving to the next block when this one is done.
    /// Returns `false` once every block has played out.
    fn begin_next_pass(&mut self) -> bool {
        loop {
            let Some(block) = self.blocks.get(self.index) else {
                return false;
            };
            let more = match block.repeat() {
                Repeat::Times(n) => self.passes_done < u64::from(n.get()),
                Repeat::Forever => true,
            };
            if more {
                debug!(
                    block = self.index,
                    pass = self.passes_done,
                    path = %block.path().display(),
                    "Starting block pass"
                );
                self.current = Some(block.bursts(self.max_chunk_size));
                return true;
            }
            self.index += 1;
            self.passes_done = 0;
        }
    }
}

impl Iterator for BlockStream<'_> {
    type Item = ChainResult<Burst>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let Some(pass) = self.current.as_mut() else {
                if !self.begin_next_pass() {
                    self.finished = true;
                }
                continue;
            };

            match pass.next() {
                Some(Ok(mut burst)) => {
                    if burst.start_of_burst {
                        burst.relative_time = self.offset;
                        self.offset += self.blocks[self.index].duration();
                    }
                    trace!(
                        samples = burst.len(),
                        sob = burst.start_of_burst,
                        eob = burst.end_of_burst,
                        "Burst"
                    );
                    return Some(Ok(burst));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.current = None;
                    return Some(Err(e));
                }
                None => {
                    self.current = None;
                    self.passes_done += 1;
                }
            }
        }
        None
    }
}
