//! Core sample types
//!
//! Sample files and transfer buffers carry complex baseband samples as pairs
//! of 32-bit floats (the UHD `fc32` host format):
//!
//! ```text
//!   file:   | re0 | im0 | re1 | im1 | re2 | im2 | ...
//!           |<- 8 bytes ->|
//!   memory: [ Complex32(re0, im0), Complex32(re1, im1), ... ]
//! ```
//!
//! - **I (In-phase)**: the real component
//! - **Q (Quadrature)**: the imaginary component

use num_complex::Complex32;

/// A single I/Q sample point
pub type IQSample = Complex32;

/// A buffer of I/Q samples
pub type IQBuffer = Vec<IQSample>;

/// Size in bytes of one sample record on disk.
pub const SAMPLE_SIZE: usize = std::mem::size_of::<IQSample>();

/// Helper functions for building sample buffers
pub mod complex_ops {
    use super::*;
    use std::f64::consts::PI;

    /// Generate a complex exponential at `freq_hz` offset from the carrier.
    ///
    /// Phase is accumulated in f64 so long tones stay clean at f32 output.
    pub fn tone(freq_hz: f64, sample_rate: f64, num_samples: usize, amplitude: f32) -> IQBuffer {
        let phase_inc = 2.0 * PI * freq_hz / sample_rate;
        (0..num_samples)
            .map(|n| {
                let phase = phase_inc * n as f64;
                IQSample::new(
                    amplitude * phase.cos() as f32,
                    amplitude * phase.sin() as f32,
                )
            })
            .collect()
    }

    /// Peak magnitude of a buffer.
    pub fn peak(samples: &[IQSample]) -> f32 {
        samples.iter().map(|s| s.norm()).fold(0.0, f32::max)
    }
}
