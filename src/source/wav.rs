//! Direct WAV source
//!
//! Frame-indexed reading of WAV files via `hound`. This is the fast path:
//! samples are pulled straight off the data chunk with no decode step, so
//! the cursor position and total frame count are exact.

use super::{AudioSource, PcmWindow, SourceKind};
use crate::error::{WaveformError, WaveformResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Frame-indexed WAV reader.
pub struct WavFileSource {
    reader: hound::WavReader<BufReader<File>>,
    spec: hound::WavSpec,
    total_frames: u64,
    frames_read: u64,
    /// Channels yielded for analysis, capped at two.
    channels: usize,
    /// Channels interleaved in the file.
    source_channels: usize,
}

impl std::fmt::Debug for WavFileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavFileSource")
            .field("spec", &self.spec)
            .field("total_frames", &self.total_frames)
            .field("frames_read", &self.frames_read)
            .field("channels", &self.channels)
            .field("source_channels", &self.source_channels)
            .finish_non_exhaustive()
    }
}

impl WavFileSource {
    pub fn open(path: &Path) -> WaveformResult<Self> {
        let reader = hound::WavReader::open(path)
            .map_err(|err| WaveformError::Open(format!("{}: {err}", path.display())))?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(WaveformError::Open(format!(
                "{}: wav reports zero channels",
                path.display()
            )));
        }

        let total_frames = reader.duration() as u64;
        let source_channels = spec.channels as usize;
        Ok(Self {
            reader,
            spec,
            total_frames,
            frames_read: 0,
            channels: source_channels.min(2),
            source_channels,
        })
    }

    /// Pull up to `frames` interleaved frames from the cursor, normalized
    /// to [-1, 1].
    fn read_interleaved(&mut self, frames: usize) -> WaveformResult<Vec<f32>> {
        let wanted = frames * self.source_channels;
        let mut interleaved = Vec::with_capacity(wanted);
        match self.spec.sample_format {
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (self.spec.bits_per_sample - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    let sample = sample
                        .map_err(|err| WaveformError::Read(format!("wav read failed: {err}")))?;
                    interleaved.push(sample as f32 / full_scale);
                }
            }
            hound::SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    let sample = sample
                        .map_err(|err| WaveformError::Read(format!("wav read failed: {err}")))?;
                    interleaved.push(sample);
                }
            }
        }
        Ok(interleaved)
    }
}

impl AudioSource for WavFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DirectWav
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn read_window(&mut self, frame_count: usize) -> WaveformResult<Option<PcmWindow>> {
        let remaining = self.total_frames.saturating_sub(self.frames_read);
        if remaining == 0 || frame_count == 0 {
            return Ok(None);
        }

        let frames = frame_count.min(remaining as usize);
        let interleaved = self.read_interleaved(frames)?;
        let got_frames = interleaved.len() / self.source_channels;
        if got_frames == 0 {
            return Ok(None);
        }

        let mut channels: Vec<Vec<f32>> = (0..self.channels)
            .map(|_| Vec::with_capacity(got_frames))
            .collect();
        for frame in interleaved.chunks_exact(self.source_channels) {
            for (ch, series) in channels.iter_mut().enumerate() {
                series.push(frame[ch]);
            }
        }

        self.frames_read += got_frames as u64;
        Ok(Some(PcmWindow::new(channels)))
    }
}
