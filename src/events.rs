//! Extraction events
//!
//! Events emitted by a running extraction toward the UI layer. The sink is
//! supplied per submission and invoked synchronously on the worker thread;
//! marshaling onto a particular thread is the sink's responsibility.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback receiving events from one extraction session.
pub type EventSink = Arc<dyn Fn(ExtractionEvent) + Send + Sync>;

/// Events emitted during extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ExtractionEvent {
    /// A window was reduced; carries the partial mean series built so far.
    #[serde(rename_all = "camelCase")]
    Progress {
        session_key: String,
        waveform: Vec<f32>,
        /// Fraction of windows processed, in (0, 1].
        progress: f32,
    },

    /// Extraction finished; carries the full amplitude series.
    #[serde(rename_all = "camelCase")]
    Complete {
        session_key: String,
        waveform: Vec<f32>,
    },

    /// Extraction failed. Never emitted for cancellation.
    #[serde(rename_all = "camelCase")]
    Error {
        session_key: String,
        code: String,
        message: String,
    },
}

impl ExtractionEvent {
    /// Key of the session that emitted this event.
    pub fn session_key(&self) -> &str {
        match self {
            ExtractionEvent::Progress { session_key, .. }
            | ExtractionEvent::Complete { session_key, .. }
            | ExtractionEvent::Error { session_key, .. } => session_key,
        }
    }
}

/// Sink that drops every event, for callers that only await the outcome.
pub fn noop_sink() -> EventSink {
    Arc::new(|_event: ExtractionEvent| {})
}
