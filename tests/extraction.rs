//! End-to-end extraction tests
//!
//! Drives the session registry against generated WAV fixtures: completion,
//! cancellation, supersession, backend fallback, and error surfacing.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use waveform_core::{
    noop_sink, EventSink, ExtractionConfig, ExtractionEvent, ExtractionOutcome, SessionRegistry,
    SourceKind, WaveformError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waveform_core=debug".into()),
        )
        .try_init();
}

/// Write a 440 Hz sine fixture and return its path.
fn write_sine_wav(
    dir: &TempDir,
    name: &str,
    seconds: f32,
    sample_rate: u32,
    channels: u16,
    amplitude: f32,
) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = (seconds * sample_rate as f32) as u32;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = (amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// Hand-rolled A-law WAV; the direct reader rejects the format tag, so it
/// exercises the decoded-stream fallback.
fn write_alaw_wav(path: &Path, frames: usize) {
    let data_len = frames as u32;
    let mut bytes = Vec::with_capacity(46 + frames);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(4 + 8 + 18 + 8 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&18u32.to_le_bytes());
    bytes.extend_from_slice(&6u16.to_le_bytes()); // WAVE_FORMAT_ALAW
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&8000u32.to_le_bytes()); // sample rate
    bytes.extend_from_slice(&8000u32.to_le_bytes()); // byte rate
    bytes.extend_from_slice(&1u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(&0u16.to_le_bytes()); // cbSize
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.extend(std::iter::repeat(0x55u8).take(frames));
    std::fs::write(path, bytes).unwrap();
}

type Events = Arc<Mutex<Vec<ExtractionEvent>>>;

fn collecting_sink() -> (EventSink, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink: EventSink = Arc::new(move |event| sink_events.lock().unwrap().push(event));
    (sink, events)
}

/// Sink that parks the worker on its first progress event until released,
/// so cancellation can be injected at a known point mid-extraction.
fn gated_sink() -> (EventSink, Events, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let (notify_tx, notify_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let sink_events = Arc::clone(&events);
    let notify_tx = Mutex::new(notify_tx);
    let release_rx = Mutex::new(release_rx);
    let armed = AtomicBool::new(true);
    let sink: EventSink = Arc::new(move |event| {
        let is_progress = matches!(event, ExtractionEvent::Progress { .. });
        sink_events.lock().unwrap().push(event);
        if is_progress && armed.swap(false, Ordering::SeqCst) {
            let _ = notify_tx.lock().unwrap().send(());
            let _ = release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
        }
    });
    (sink, events, notify_rx, release_tx)
}

fn release_after(release_tx: mpsc::Sender<()>, delay: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        let _ = release_tx.send(());
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn extraction_yields_requested_sample_count() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "tone.wav", 1.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let (sink, events) = collecting_sink();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(100);
    let handle = registry.submit(config, sink).await?;

    let ExtractionOutcome::Completed(waveform) = handle.wait().await? else {
        panic!("expected completion");
    };
    assert_eq!(waveform.len(), 100);
    assert!(waveform.iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert!(!registry.is_active("player-1"));

    let events = events.lock().unwrap();
    let progress: Vec<f32> = events
        .iter()
        .filter_map(|event| match event {
            ExtractionEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 100);
    assert!((progress.last().unwrap() - 1.0).abs() < 1e-6);
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(matches!(
        events.last(),
        Some(ExtractionEvent::Complete { .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn ten_second_mono_file_reduces_to_bounded_rms() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "long.wav", 10.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(100);
    let handle = registry.submit(config, noop_sink()).await?;

    let ExtractionOutcome::Completed(waveform) = handle.wait().await? else {
        panic!("expected completion");
    };
    assert_eq!(waveform.len(), 100);
    assert!(waveform.iter().all(|&v| (0.0..=1.0).contains(&v)));
    // Sine RMS is amplitude over sqrt(2); every full window sees the same
    // tone, so mid-series candles sit near 0.354.
    let expected = 0.5 / 2f32.sqrt();
    assert!((waveform[50] - expected).abs() < 0.02);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stereo_channels_mean_into_single_series() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "stereo.wav", 1.0, 44100, 2, 0.5);

    let registry = SessionRegistry::new();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(50);
    let handle = registry.submit(config, noop_sink()).await?;

    let ExtractionOutcome::Completed(waveform) = handle.wait().await? else {
        panic!("expected completion");
    };
    assert_eq!(waveform.len(), 50);
    // Identical channels mean to the mono value.
    let expected = 0.5 / 2f32.sqrt();
    assert!((waveform[25] - expected).abs() < 0.02);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn target_beyond_total_frames_still_fills_requested_length() -> Result<()> {
    let dir = TempDir::new()?;
    // 50 frames, 100 candles: one-frame windows, then a zero tail.
    let path = write_sine_wav(&dir, "tiny.wav", 50.0 / 44100.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(100);
    let handle = registry.submit(config, noop_sink()).await?;

    let ExtractionOutcome::Completed(waveform) = handle.wait().await? else {
        panic!("expected completion");
    };
    assert_eq!(waveform.len(), 100);
    assert!(waveform[60..].iter().all(|&v| v == 0.0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_file_surfaces_open_error_without_progress() -> Result<()> {
    let dir = TempDir::new()?;
    let garbage = dir.path().join("corrupt.mp3");
    std::fs::write(&garbage, vec![0xA5u8; 2048])?;

    let registry = SessionRegistry::new();
    let (sink, events) = collecting_sink();
    let config = ExtractionConfig::new(garbage.to_string_lossy(), "player-1");
    let handle = registry.submit(config, sink).await?;

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, WaveformError::Open(_)));
    assert_eq!(err.code(), "OPEN_ERROR");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ExtractionEvent::Error { .. }));
    assert!(!registry.is_active("player-1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_sample_count_rejected_before_session_starts() -> Result<()> {
    let registry = SessionRegistry::new();
    let config = ExtractionConfig::new("tone.wav", "player-1").with_samples_per_pixel(0);

    let err = registry.submit(config, noop_sink()).await.unwrap_err();
    assert!(matches!(err, WaveformError::InvalidConfig(_)));
    assert_eq!(registry.active_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_discards_session_without_completion_events() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "tone.wav", 1.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let (sink, events, first_progress, release) = gated_sink();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(8);
    let handle = registry.submit(config, sink).await?;

    // Worker is parked mid-extraction after its first window.
    first_progress.recv_timeout(Duration::from_secs(5))?;
    registry.cancel("player-1");
    release.send(())?;

    assert_eq!(handle.wait().await?, ExtractionOutcome::Discarded);
    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .all(|event| matches!(event, ExtractionEvent::Progress { .. })));
    assert!(!registry.is_active("player-1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn resubmitting_same_key_supersedes_in_flight_session() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "tone.wav", 1.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let (first_sink, _first_events, first_progress, release) = gated_sink();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(8);
    let first = registry.submit(config.clone(), first_sink).await?;

    first_progress.recv_timeout(Duration::from_secs(5))?;

    // The resubmission below cancels the parked worker and then blocks on
    // its teardown, so the release has to arrive from the side.
    release_after(release, Duration::from_millis(250));
    let (second_sink, _second_events) = collecting_sink();
    let second = registry.submit(config, second_sink).await?;

    assert_eq!(first.wait().await?, ExtractionOutcome::Discarded);
    let ExtractionOutcome::Completed(waveform) = second.wait().await? else {
        panic!("expected replacement to complete");
    };
    assert_eq!(waveform.len(), 8);
    assert!(!registry.is_active("player-1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_unknown_key_is_a_noop() -> Result<()> {
    let registry = SessionRegistry::new();
    registry.cancel("never-submitted");
    assert_eq!(registry.active_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_all_tears_down_every_session() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_sine_wav(&dir, "tone.wav", 1.0, 44100, 1, 0.5);

    let registry = SessionRegistry::new();
    let (sink_a, _events_a, progress_a, release_a) = gated_sink();
    let (sink_b, _events_b, progress_b, release_b) = gated_sink();
    let handle_a = registry
        .submit(
            ExtractionConfig::new(path.to_string_lossy(), "player-a").with_samples_per_pixel(8),
            sink_a,
        )
        .await?;
    let handle_b = registry
        .submit(
            ExtractionConfig::new(path.to_string_lossy(), "player-b").with_samples_per_pixel(8),
            sink_b,
        )
        .await?;

    progress_a.recv_timeout(Duration::from_secs(5))?;
    progress_b.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(registry.active_count(), 2);

    release_after(release_a, Duration::from_millis(250));
    release_after(release_b, Duration::from_millis(250));
    registry.cancel_all().await;

    assert_eq!(handle_a.wait().await?, ExtractionOutcome::Discarded);
    assert_eq!(handle_b.wait().await?, ExtractionOutcome::Discarded);
    assert_eq!(registry.active_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_under_different_keys_run_in_parallel() -> Result<()> {
    let dir = TempDir::new()?;
    let path_a = write_sine_wav(&dir, "a.wav", 1.0, 44100, 1, 0.3);
    let path_b = write_sine_wav(&dir, "b.wav", 1.0, 44100, 2, 0.6);

    let registry = SessionRegistry::new();
    let handle_a = registry
        .submit(
            ExtractionConfig::new(path_a.to_string_lossy(), "player-a").with_samples_per_pixel(40),
            noop_sink(),
        )
        .await?;
    let handle_b = registry
        .submit(
            ExtractionConfig::new(path_b.to_string_lossy(), "player-b").with_samples_per_pixel(60),
            noop_sink(),
        )
        .await?;

    let (outcome_a, outcome_b) = tokio::join!(handle_a.wait(), handle_b.wait());
    let ExtractionOutcome::Completed(series_a) = outcome_a? else {
        panic!("expected completion");
    };
    let ExtractionOutcome::Completed(series_b) = outcome_b? else {
        panic!("expected completion");
    };
    assert_eq!(series_a.len(), 40);
    assert_eq!(series_b.len(), 60);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn alaw_container_falls_back_to_decoded_stream() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = dir.path().join("voice.wav");
    write_alaw_wav(&path, 8000);

    // Selection policy routes the format the direct reader rejects.
    let source = waveform_core::open_source(&path)?;
    assert_eq!(source.kind(), SourceKind::DecodedStream);
    drop(source);

    let registry = SessionRegistry::new();
    let config =
        ExtractionConfig::new(path.to_string_lossy(), "player-1").with_samples_per_pixel(25);
    let handle = registry.submit(config, noop_sink()).await?;

    let ExtractionOutcome::Completed(waveform) = handle.wait().await? else {
        panic!("expected completion");
    };
    assert_eq!(waveform.len(), 25);
    assert!(waveform.iter().all(|&v| (0.0..=1.0).contains(&v)));
    Ok(())
}
