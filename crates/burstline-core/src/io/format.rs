//! `cf32` record encoding.
//!
//! | Offset | Type     | Field |
//! |--------|----------|-------|
//! | 0      | f32 (LE) | I     |
//! | 4      | f32 (LE) | Q     |

use crate::types::{IQSample, SAMPLE_SIZE};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Returns the number of whole records in `byte_len` bytes, or `None` when
/// the length is not an exact multiple of the record size.
pub fn sample_count(byte_len: u64) -> Option<u64> {
    let size = SAMPLE_SIZE as u64;
    (byte_len % size == 0).then(|| byte_len / size)
}

/// Decode `bytes` into `out`. `bytes.len()` must be `out.len() * SAMPLE_SIZE`.
pub fn decode_into(bytes: &[u8], out: &mut [IQSample]) {
    debug_assert_eq!(bytes.len(), out.len() * SAMPLE_SIZE);
    for (sample, record) in out.iter_mut().zip(bytes.chunks_exact(SAMPLE_SIZE)) {
        sample.re = LittleEndian::read_f32(&record[0..4]);
        sample.im = LittleEndian::read_f32(&record[4..8]);
    }
}

/// Write samples as `cf32` records.
pub fn write_samples<W: Write>(writer: &mut W, samples: &[IQSample]) -> io::Result<usize> {
    for sample in samples {
        writer.write_f32::<LittleEndian>(sample.re)?;
        writer.write_f32::<LittleEndian>(sample.im)?;
    }
    Ok(samples.len() * SAMPLE_SIZE)
}

/// Create (or truncate) `path` and fill it with `samples`.
pub fn write_file<P: AsRef<Path>>(path: P, samples: &[IQSample]) -> io::Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = write_samples(&mut writer, samples)?;
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(0), Some(0));
        assert_eq!(sample_count(16), Some(2));
        assert_eq!(sample_count(12), None);
        assert_eq!(sample_count(7), None);
    }

    #[test]
    fn test_byte_layout() {
        let mut buffer = Vec::new();
        write_samples(&mut buffer, &[IQSample::new(1.0, -2.0)]).unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(&buffer[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&buffer[4..8], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_decode_into() {
        let samples = [IQSample::new(0.25, 0.75), IQSample::new(-1.0, 1.0)];
        let mut buffer = Vec::new();
        write_samples(&mut buffer, &samples).unwrap();
        let mut decoded = [IQSample::new(0.0, 0.0); 2];
        decode_into(&buffer, &mut decoded);
        assert_eq!(decoded, samples);
    }
}
