//! Level meter: scalar loudness of one audio buffer.

use crate::audio_buffer::AudioSample;

/// Root-mean-square amplitude of `samples`.
///
/// An empty buffer measures 0. A buffer that produces a non-finite result
/// (NaN or infinite samples) also measures 0, so malformed input reads as
/// silence rather than as a loud frame.
pub fn rms(samples: &[AudioSample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();

    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;

    if rms.is_finite() {
        rms
    } else {
        0.0
    }
}
