//! Chunked reading of sample files.

use super::format;
use crate::burst::Burst;
use crate::error::{ChainError, ChainResult};
use crate::timing::SampleClock;
use crate::types::{IQSample, SAMPLE_SIZE};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated reference to a sample file on disk.
///
/// Only the file's metadata is inspected here; contents are read when a
/// pass is streamed with [`SampleFile::bursts`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFile {
    path: PathBuf,
    sample_count: u64,
}

impl SampleFile {
    /// Check that `path` is a regular file holding a whole number of records.
    pub fn inspect<P: Into<PathBuf>>(path: P) -> ChainResult<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path).map_err(|e| {
            ChainError::InvalidArgument(format!(
                "Sample file {} is not accessible: {}",
                path.display(),
                e
            ))
        })?;
        if !meta.is_file() {
            return Err(ChainError::InvalidArgument(format!(
                "{} must be a regular file",
                path.display()
            )));
        }

        let sample_count = format::sample_count(meta.len()).ok_or_else(|| {
            ChainError::InvalidArgument(format!(
                "Size of {} ({} bytes) is not a multiple of {} bytes; is this a cf32 IQ file?",
                path.display(),
                meta.len(),
                SAMPLE_SIZE
            ))
        })?;

        Ok(Self { path, sample_count })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complex samples in the file.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Seconds the samples take to play at `sample_rate`.
    pub fn playback_time(&self, sample_rate: f64) -> f64 {
        SampleClock::at_sample(self.sample_count, sample_rate).to_seconds()
    }

    /// One playback pass of the file, split into chunks of at most
    /// `max_chunk_size` samples.
    pub fn bursts(&self, max_chunk_size: usize) -> FileBursts {
        FileBursts::new(self.path.clone(), self.sample_count, max_chunk_size)
    }
}

/// Lazy, forward-only chunking of one pass over a sample file.
///
/// The file is opened on the first call to `next`. The first chunk is
/// flagged start-of-burst and the last end-of-burst; `relative_time` is
/// left at 0.0. After a read error the iterator yields nothing more.
pub struct FileBursts {
    path: PathBuf,
    file: Option<File>,
    remaining: u64,
    max_chunk_size: usize,
    started: bool,
    failed: bool,
    bytes: Vec<u8>,
}

impl FileBursts {
    fn new(path: PathBuf, sample_count: u64, max_chunk_size: usize) -> Self {
        Self {
            path,
            file: None,
            remaining: sample_count,
            max_chunk_size: max_chunk_size.max(1),
            started: false,
            failed: false,
            bytes: Vec::new(),
        }
    }

    fn fail(&mut self, source: std::io::Error) -> Option<ChainResult<Burst>> {
        self.failed = true;
        self.file = None;
        Some(Err(ChainError::Io {
            path: self.path.clone(),
            source,
        }))
    }
}

impl Iterator for FileBursts {
    type Item = ChainResult<Burst>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        if self.file.is_none() {
            debug!(path = %self.path.display(), samples = self.remaining, "Opening sample file");
            match File::open(&self.path) {
                Ok(file) => self.file = Some(file),
                Err(e) => return self.fail(e),
            }
        }
        let Some(file) = self.file.as_mut() else {
            return None;
        };

        let count = self.remaining.min(self.max_chunk_size as u64) as usize;
        self.bytes.resize(count * SAMPLE_SIZE, 0);
        if let Err(e) = file.read_exact(&mut self.bytes) {
            return self.fail(e);
        }

        let mut samples = vec![IQSample::new(0.0, 0.0); count];
        format::decode_into(&self.bytes, &mut samples);

        self.remaining -= count as u64;
        let start_of_burst = !self.started;
        self.started = true;
        let end_of_burst = self.remaining == 0;
        if end_of_burst {
            self.file = None;
        }

        Some(Ok(Burst::new(samples, start_of_burst, end_of_burst)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let chunks = self.remaining.div_ceil(self.max_chunk_size as u64) as usize;
        (0, Some(chunks))
    }
}
