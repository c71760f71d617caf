//! Amplitude reduction
//!
//! Reduces PCM windows to scalar loudness values and combines per-channel
//! series into the single series handed to the renderer.

use crate::error::{WaveformError, WaveformResult};

/// Root-mean-square of a buffer of PCM samples.
///
/// Returns 0.0 for an empty buffer.
pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = buffer.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / buffer.len() as f64).sqrt() as f32
}

/// Combine per-channel amplitude series into one.
///
/// Two non-empty series are averaged element-wise, a single non-empty
/// series passes through unchanged, and all-empty input is an error: a
/// waveform over no channel data is distinct from a waveform over silence.
pub fn channel_mean(channels: &[Vec<f32>]) -> WaveformResult<Vec<f32>> {
    let mut non_empty = channels.iter().filter(|series| !series.is_empty());
    match (non_empty.next(), non_empty.next()) {
        (Some(left), Some(right)) => Ok(left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| (l + r) / 2.0)
            .collect()),
        (Some(only), None) => Ok(only.clone()),
        (None, _) => Err(WaveformError::NoAudioChannels),
    }
}
