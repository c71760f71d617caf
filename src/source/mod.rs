//! Audio source backends
//!
//! Backend-agnostic access to decodable audio files:
//! - AudioSource trait over frame-windowed PCM reading
//! - WavFileSource for frame-indexed WAV files
//! - DecodedStreamSource for everything a demuxer/decoder pair can handle
//!
//! Open attempts the direct WAV reader first and falls back to the decoded
//! stream, so the extractor never sees backend-specific types.

pub mod decoded;
pub mod wav;

pub use decoded::DecodedStreamSource;
pub use wav::WavFileSource;

use crate::error::{WaveformError, WaveformResult};
use std::path::Path;

/// Which backend an open source is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Frame-indexed WAV reader.
    DirectWav,
    /// Demuxed and decoded container stream.
    DecodedStream,
}

/// One window of planar PCM, normalized to [-1, 1].
///
/// Holds up to two analysis channels of equal length. A window shorter than
/// requested is valid at end of stream.
#[derive(Debug, Clone)]
pub struct PcmWindow {
    channels: Vec<Vec<f32>>,
}

impl PcmWindow {
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self { channels }
    }

    /// Frames in this window.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, |series| series.len())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel; empty for an absent channel index.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels
            .get(index)
            .map_or(&[] as &[f32], |series| series.as_slice())
    }
}

/// An open, decodable audio resource with an advancing read cursor.
///
/// Owned exclusively by the extractor running it; dropping the source
/// releases the underlying decode handle.
pub trait AudioSource: Send + std::fmt::Debug {
    fn kind(&self) -> SourceKind;

    /// Total frames in the stream, per channel.
    fn total_frames(&self) -> u64;

    /// Analysis channels this source yields (1 or 2). Sources with more
    /// than two channels read the first two only.
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Read up to `frame_count` frames from the cursor.
    ///
    /// Returns a short window at the tail of the stream and `None` once no
    /// frames remain.
    fn read_window(&mut self, frame_count: usize) -> WaveformResult<Option<PcmWindow>>;
}

/// Open `path` with the first backend that accepts it.
///
/// The direct WAV reader is tried first; any container it rejects goes to
/// the decoded stream. Only when both refuse does this report an open
/// failure.
pub fn open_source(path: &Path) -> WaveformResult<Box<dyn AudioSource>> {
    let direct_err = match WavFileSource::open(path) {
        Ok(source) => {
            tracing::debug!(path = %path.display(), "opened with direct wav reader");
            return Ok(Box::new(source));
        }
        Err(err) => err,
    };

    tracing::debug!(
        path = %path.display(),
        error = %direct_err,
        "direct wav reader rejected file, falling back to decoded stream"
    );

    match DecodedStreamSource::open(path) {
        Ok(source) => Ok(Box::new(source)),
        Err(stream_err) => Err(WaveformError::Open(format!(
            "all backends rejected {}: direct ({}); decoded ({})",
            path.display(),
            direct_err,
            stream_err
        ))),
    }
}
