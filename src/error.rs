//! Error types and handling
//!
//! Common error types used across the extraction core.

use thiserror::Error;

/// Errors raised by waveform extraction
///
/// Every error is terminal for the session that raised it; the caller may
/// resubmit. Cancellation is not an error and is reported as a distinct
/// [`ExtractionOutcome::Discarded`](crate::session::ExtractionOutcome)
/// instead.
#[derive(Error, Debug)]
pub enum WaveformError {
    /// The file is missing, unreadable, or no backend supports its format.
    #[error("failed to open audio source: {0}")]
    Open(String),

    /// I/O or decode failure after the source was opened.
    #[error("failed to read audio stream: {0}")]
    Read(String),

    /// Channel reduction was asked to combine only empty series.
    #[error("cannot combine channels: all channel series are empty")]
    NoAudioChannels,

    /// The extraction request itself is malformed.
    #[error("invalid extraction config: {0}")]
    InvalidConfig(String),
}

impl WaveformError {
    /// Stable code string for the event channel and UI layers.
    pub fn code(&self) -> &'static str {
        match self {
            WaveformError::Open(_) => "OPEN_ERROR",
            WaveformError::Read(_) => "READ_ERROR",
            WaveformError::NoAudioChannels => "NO_AUDIO_CHANNELS",
            WaveformError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Result type alias using WaveformError
pub type WaveformResult<T> = Result<T, WaveformError>;
