//! Session registry
//!
//! Process-wide table of in-flight extractions, keyed by session key.
//! Submitting under an occupied key cancels the prior session and waits
//! for its worker to reach a terminal state before the replacement starts,
//! so at most one extraction is ever live per key.

use super::{ExtractionConfig, ExtractionHandle};
use crate::error::WaveformResult;
use crate::events::EventSink;
use crate::extractor::WaveformExtractor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

struct SessionEntry {
    /// Distinguishes this session from a replacement under the same key.
    id: Uuid,
    cancel: Arc<AtomicBool>,
    /// Flips to true when the worker reaches a terminal state.
    done: watch::Receiver<bool>,
}

/// Keyed table of live extraction sessions.
///
/// Each session runs on its own blocking worker; the registry only holds
/// the cancel flag and teardown signal, so two sessions under different
/// keys share no audio state and run fully in parallel.
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit an extraction request.
    ///
    /// Validates the config, supersedes any in-flight session under the
    /// same key (its handle resolves to `ExtractionOutcome::Discarded`),
    /// starts a worker, and returns a handle that resolves at the new
    /// session's terminal state.
    pub async fn submit(
        &self,
        config: ExtractionConfig,
        sink: EventSink,
    ) -> WaveformResult<ExtractionHandle> {
        config.validate()?;
        let session_key = config.session_key.clone();

        self.supersede(&session_key).await;

        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        let (result_tx, result_rx) = oneshot::channel();

        self.sessions.lock().insert(
            session_key.clone(),
            SessionEntry {
                id,
                cancel: Arc::clone(&cancel),
                done: done_rx,
            },
        );

        tracing::info!(
            session_key = %session_key,
            samples_per_pixel = config.samples_per_pixel,
            "starting extraction session"
        );

        let sessions = Arc::clone(&self.sessions);
        let worker_key = session_key.clone();
        tokio::task::spawn_blocking(move || {
            let mut extractor = WaveformExtractor::new(config, cancel, sink);
            let result = extractor.run();

            // Retire this session, unless a replacement already took the
            // key while this worker was finishing.
            {
                let mut sessions = sessions.lock();
                if sessions
                    .get(&worker_key)
                    .is_some_and(|entry| entry.id == id)
                {
                    sessions.remove(&worker_key);
                }
            }
            let _ = done_tx.send(true);
            let _ = result_tx.send(result);
        });

        Ok(ExtractionHandle {
            session_key,
            rx: result_rx,
        })
    }

    /// Request cancellation of the session under `key`.
    ///
    /// Takes effect at the session's next window boundary. Unknown keys
    /// are a no-op.
    pub fn cancel(&self, key: &str) {
        let sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(key) {
            tracing::info!(session_key = key, "cancelling extraction session");
            entry.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Cancel every live session and wait for all workers to tear down.
    pub async fn cancel_all(&self) {
        let drained: Vec<watch::Receiver<bool>> = {
            let mut sessions = self.sessions.lock();
            sessions
                .drain()
                .map(|(_, entry)| {
                    entry.cancel.store(true, Ordering::Relaxed);
                    entry.done
                })
                .collect()
        };
        if drained.is_empty() {
            return;
        }

        tracing::info!(count = drained.len(), "cancelling all extraction sessions");
        for done in drained {
            Self::wait_done(done).await;
        }
    }

    /// Whether a session is live under `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.sessions.lock().contains_key(key)
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Cancel and wait out any session holding `key`.
    async fn supersede(&self, key: &str) {
        let prior = self.sessions.lock().remove(key);
        let Some(prior) = prior else {
            return;
        };

        tracing::info!(session_key = key, "superseding in-flight extraction");
        prior.cancel.store(true, Ordering::Relaxed);
        Self::wait_done(prior.done).await;
    }

    /// Wait for a worker's terminal state; a dropped sender (worker died)
    /// also counts as torn down.
    async fn wait_done(mut done: watch::Receiver<bool>) {
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
