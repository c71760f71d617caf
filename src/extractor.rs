//! Waveform extraction
//!
//! Blocking state machine that turns one audio file into a fixed-length
//! amplitude series. Runs on a worker thread; the registry wraps it in a
//! session, but it can also be driven directly by callers that manage
//! their own threads.

use crate::dsp;
use crate::error::WaveformResult;
use crate::events::{EventSink, ExtractionEvent};
use crate::session::{ExtractionConfig, ExtractionOutcome};
use crate::source::open_source;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Current state of one extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionState {
    /// Not started yet
    Idle,
    /// Resolving the path to an audio source
    Opening,
    /// Reading and reducing windows
    Extracting,
    /// Full series produced
    Completed,
    /// Cancelled at a window boundary; result discarded
    Cancelled,
    /// Terminal failure; no result
    Failed,
}

impl Default for ExtractionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Extracts one amplitude series from one audio file.
pub struct WaveformExtractor {
    config: ExtractionConfig,
    cancel: Arc<AtomicBool>,
    sink: EventSink,
    state: ExtractionState,
}

impl WaveformExtractor {
    pub fn new(config: ExtractionConfig, cancel: Arc<AtomicBool>, sink: EventSink) -> Self {
        Self {
            config,
            cancel,
            sink,
            state: ExtractionState::Idle,
        }
    }

    /// Terminal (or current) state of this extraction.
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Run the extraction to a terminal state.
    ///
    /// Blocks until the series is complete, the session is cancelled, or an
    /// error ends it. Emits `Complete`/`Error` events; cancellation emits
    /// nothing and yields [`ExtractionOutcome::Discarded`].
    pub fn run(&mut self) -> WaveformResult<ExtractionOutcome> {
        let session_key = self.config.session_key.clone();
        match self.extract() {
            Ok(Some(waveform)) => {
                self.state = ExtractionState::Completed;
                tracing::info!(
                    session_key = %session_key,
                    samples = waveform.len(),
                    "extraction complete"
                );
                (self.sink)(ExtractionEvent::Complete {
                    session_key,
                    waveform: waveform.clone(),
                });
                Ok(ExtractionOutcome::Completed(waveform))
            }
            Ok(None) => {
                self.state = ExtractionState::Cancelled;
                tracing::info!(session_key = %session_key, "extraction cancelled");
                Ok(ExtractionOutcome::Discarded)
            }
            Err(err) => {
                self.state = ExtractionState::Failed;
                tracing::error!(session_key = %session_key, error = %err, "extraction failed");
                (self.sink)(ExtractionEvent::Error {
                    session_key,
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Window loop. `Ok(None)` means cancelled.
    fn extract(&mut self) -> WaveformResult<Option<Vec<f32>>> {
        self.config.validate()?;

        self.state = ExtractionState::Opening;
        let mut source = open_source(Path::new(&self.config.audio_path))?;

        let target = self.config.samples_per_pixel;
        let total_frames = source.total_frames();
        // Guard against targets beyond the stream length: every window
        // reads at least one frame, the unfilled tail stays zero.
        let frames_per_window = (total_frames / target as u64).max(1) as usize;

        tracing::debug!(
            session_key = %self.config.session_key,
            backend = ?source.kind(),
            total_frames,
            channels = source.channel_count(),
            sample_rate = source.sample_rate(),
            frames_per_window,
            "audio source opened"
        );

        let mut data: Vec<Vec<f32>> = (0..source.channel_count())
            .map(|_| vec![0.0; target])
            .collect();

        self.state = ExtractionState::Extracting;
        for index in 0..target {
            // Cooperative cancellation, checked between windows only.
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }

            let window = match source.read_window(frames_per_window)? {
                Some(window) => window,
                None => break,
            };
            for (ch, series) in data.iter_mut().enumerate() {
                series[index] = dsp::rms(window.channel(ch));
            }

            (self.sink)(ExtractionEvent::Progress {
                session_key: self.config.session_key.clone(),
                waveform: dsp::channel_mean(&data)?,
                progress: (index + 1) as f32 / target as f32,
            });
        }

        dsp::channel_mean(&data).map(Some)
    }
}
