//! waveform-core - Cancellable audio waveform extraction.
//!
//! Turns an audio file into a fixed-length series of RMS amplitudes, one
//! value per rendered candle, for waveform visualization. Extraction runs
//! on background workers, streams partial progress to a caller-supplied
//! event sink, and is cancellable between windows. A session registry
//! keeps at most one live extraction per session key, superseding any
//! in-flight extraction when the same key is resubmitted.
//!
//! ```no_run
//! use std::sync::Arc;
//! use waveform_core::{ExtractionConfig, ExtractionOutcome, SessionRegistry};
//!
//! # async fn demo() -> waveform_core::WaveformResult<()> {
//! let registry = SessionRegistry::new();
//! let config = ExtractionConfig::new("speech.m4a", "player-1");
//! let handle = registry
//!     .submit(config, Arc::new(|event| println!("{event:?}")))
//!     .await?;
//!
//! match handle.wait().await? {
//!     ExtractionOutcome::Completed(waveform) => println!("{} candles", waveform.len()),
//!     ExtractionOutcome::Discarded => println!("superseded or cancelled"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod dsp;
pub mod error;
pub mod events;
pub mod extractor;
pub mod session;
pub mod source;

pub use error::{WaveformError, WaveformResult};
pub use events::{noop_sink, EventSink, ExtractionEvent};
pub use extractor::{ExtractionState, WaveformExtractor};
pub use session::{
    ExtractionConfig, ExtractionHandle, ExtractionOutcome, SessionRegistry,
    DEFAULT_SAMPLES_PER_PIXEL,
};
pub use source::{open_source, AudioSource, PcmWindow, SourceKind};
