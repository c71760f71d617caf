//! Decoded stream source
//!
//! Fallback backend for containers the direct reader rejects. `symphonia`
//! probes the container, the first decodable track is demuxed packet by
//! packet, and decoded chunks accumulate in a pending buffer until a full
//! window is available. Decoded samples are already full-scale-normalized
//! f32, matching the direct path's amplitude range.

use super::{AudioSource, PcmWindow, SourceKind};
use crate::error::{WaveformError, WaveformResult};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Demuxed, decoded audio stream with chunk accumulation.
pub struct DecodedStreamSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    total_frames: u64,
    /// Channels interleaved in decoded output.
    source_channels: usize,
    /// Channels yielded for analysis, capped at two.
    channels: usize,
    /// Decoded frames not yet handed out, per analysis channel.
    pending: Vec<VecDeque<f32>>,
    sample_buf: Option<SampleBuffer<f32>>,
    finished: bool,
}

impl std::fmt::Debug for DecodedStreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedStreamSource")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("total_frames", &self.total_frames)
            .field("source_channels", &self.source_channels)
            .field("channels", &self.channels)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl DecodedStreamSource {
    pub fn open(path: &Path) -> WaveformResult<Self> {
        let file = File::open(path)
            .map_err(|err| WaveformError::Open(format!("{}: {err}", path.display())))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| {
                WaveformError::Open(format!("{}: unsupported container: {err}", path.display()))
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                WaveformError::Open(format!("{}: no decodable audio track", path.display()))
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|err| {
                WaveformError::Open(format!("{}: no decoder for track: {err}", path.display()))
            })?;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            WaveformError::Open(format!("{}: track reports no sample rate", path.display()))
        })?;
        // Windows are sized up front from the total frame count, so a
        // stream that does not report its length cannot be extracted.
        let total_frames = params.n_frames.ok_or_else(|| {
            WaveformError::Open(format!(
                "{}: stream does not report its frame count",
                path.display()
            ))
        })?;

        let source_channels = params.channels.map_or(0, |channels| channels.count());
        let channels = source_channels.min(2);

        let mut source = Self {
            format,
            decoder,
            track_id,
            sample_rate,
            total_frames,
            source_channels,
            channels,
            pending: (0..channels).map(|_| VecDeque::new()).collect(),
            sample_buf: None,
            finished: false,
        };

        // Some codecs only report their channel layout once the first
        // packet decodes; prime the pending buffer to learn it.
        if source.channels == 0 {
            while source.channels == 0 && !source.finished {
                source.decode_next_packet()?;
            }
            if source.channels == 0 {
                return Err(WaveformError::Open(format!(
                    "{}: no audio channels",
                    path.display()
                )));
            }
        }

        Ok(source)
    }

    fn buffered_frames(&self) -> usize {
        self.pending.first().map_or(0, |queue| queue.len())
    }

    /// Demux and decode one packet, appending its frames to the pending
    /// buffer. Sets `finished` at end of stream.
    fn decode_next_packet(&mut self) -> WaveformResult<()> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                self.finished = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                self.finished = true;
                return Ok(());
            }
            Err(err) => return Err(WaveformError::Read(format!("demux failed: {err}"))),
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                if self.sample_buf.is_none() {
                    let spec = *decoded.spec();
                    self.source_channels = spec.channels.count();
                    self.channels = self.source_channels.min(2);
                    self.pending = (0..self.channels).map(|_| VecDeque::new()).collect();
                    self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if self.source_channels == 0 {
                    self.finished = true;
                    return Ok(());
                }
                let buf = self
                    .sample_buf
                    .as_mut()
                    .expect("sample buffer initialized above");
                buf.copy_interleaved_ref(decoded);
                for frame in buf.samples().chunks_exact(self.source_channels) {
                    for (ch, queue) in self.pending.iter_mut().enumerate() {
                        queue.push_back(frame[ch]);
                    }
                }
            }
            // Single bad packets are skipped; the decoder resynchronizes.
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::warn!(error = err, "skipping undecodable packet");
            }
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                self.finished = true;
            }
            Err(err) => return Err(WaveformError::Read(format!("decode failed: {err}"))),
        }
        Ok(())
    }
}

impl AudioSource for DecodedStreamSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DecodedStream
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_window(&mut self, frame_count: usize) -> WaveformResult<Option<PcmWindow>> {
        if frame_count == 0 {
            return Ok(None);
        }
        while self.buffered_frames() < frame_count && !self.finished {
            self.decode_next_packet()?;
        }

        let take = frame_count.min(self.buffered_frames());
        if take == 0 {
            return Ok(None);
        }

        let channels: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|queue| queue.drain(..take).collect())
            .collect();
        Ok(Some(PcmWindow::new(channels)))
    }
}
