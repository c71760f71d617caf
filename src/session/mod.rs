//! Extraction sessions
//!
//! This module implements the session layer over the extractor:
//! - ExtractionConfig describing one request
//! - ExtractionHandle/ExtractionOutcome for awaiting the result
//! - SessionRegistry keeping at most one live extraction per key

pub mod registry;

pub use registry::SessionRegistry;

use crate::error::{WaveformError, WaveformResult};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Amplitude values per extraction when the caller does not specify one.
pub const DEFAULT_SAMPLES_PER_PIXEL: usize = 100;

fn default_samples_per_pixel() -> usize {
    DEFAULT_SAMPLES_PER_PIXEL
}

/// One extraction request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Path of the audio file to extract from.
    pub audio_path: String,

    /// Key of the logical player/recording this extraction serves. At
    /// most one extraction is live per key.
    pub session_key: String,

    /// Number of amplitude values to produce (one per rendered candle).
    #[serde(default = "default_samples_per_pixel")]
    pub samples_per_pixel: usize,
}

impl ExtractionConfig {
    pub fn new(audio_path: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            audio_path: audio_path.into(),
            session_key: session_key.into(),
            samples_per_pixel: DEFAULT_SAMPLES_PER_PIXEL,
        }
    }

    pub fn with_samples_per_pixel(mut self, samples_per_pixel: usize) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self
    }

    pub fn validate(&self) -> WaveformResult<()> {
        if self.samples_per_pixel < 1 {
            return Err(WaveformError::InvalidConfig(format!(
                "samplesPerPixel must be at least 1, got {}",
                self.samples_per_pixel
            )));
        }
        if self.session_key.is_empty() {
            return Err(WaveformError::InvalidConfig(
                "sessionKey must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// How an extraction session ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Full amplitude series, length equal to the requested sample count.
    Completed(Vec<f32>),

    /// The session was cancelled or superseded; no result exists.
    Discarded,
}

/// Awaitable result of one submitted extraction.
#[derive(Debug)]
pub struct ExtractionHandle {
    pub(crate) session_key: String,
    pub(crate) rx: oneshot::Receiver<WaveformResult<ExtractionOutcome>>,
}

impl ExtractionHandle {
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Wait for the session's terminal state.
    pub async fn wait(self) -> WaveformResult<ExtractionOutcome> {
        match self.rx.await {
            Ok(result) => result,
            // The worker never reports without sending; a dropped sender
            // means it died mid-extraction.
            Err(_) => Err(WaveformError::Read(
                "extraction worker terminated before reporting a result".to_string(),
            )),
        }
    }
}
