//! Session Telemetry: per-stage atomic counters, latencies, and a
//! pluggable sink fan-out for structured event/rollup records.
//!
//! Counter shape follows the Arc<AtomicU64> struct style of a pipeline
//! metrics module; the two-table persisted schema (per-step events, a
//! per-session rollup) mirrors the reference implementation's database
//! logger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::session::SessionId;

#[derive(Debug, Default)]
pub struct Counters {
    pub total_frames: AtomicU64,
    pub voice_frames: AtomicU64,
    pub recordings_created: AtomicU64,
    pub queue_timeouts: AtomicU64,
    pub processing_errors: AtomicU64,
    pub asr_latency_ms: AtomicU64,
    pub mt_latency_ms: AtomicU64,
    pub tts_latency_ms: AtomicU64,
    pub e2e_latency_ms: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            voice_frames: self.voice_frames.load(Ordering::Relaxed),
            recordings_created: self.recordings_created.load(Ordering::Relaxed),
            queue_timeouts: self.queue_timeouts.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            asr_latency_ms: self.asr_latency_ms.load(Ordering::Relaxed),
            mt_latency_ms: self.mt_latency_ms.load(Ordering::Relaxed),
            tts_latency_ms: self.tts_latency_ms.load(Ordering::Relaxed),
            e2e_latency_ms: self.e2e_latency_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountersSnapshot {
    pub total_frames: u64,
    pub voice_frames: u64,
    pub recordings_created: u64,
    pub queue_timeouts: u64,
    pub processing_errors: u64,
    pub asr_latency_ms: u64,
    pub mt_latency_ms: u64,
    pub tts_latency_ms: u64,
    pub e2e_latency_ms: u64,
}

/// thread id per the reference schema: 1=Capture, 2=Worker, 3=Playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Capture = 1,
    Worker = 2,
    Playback = 3,
}

#[derive(Debug, Clone)]
pub struct StepEvent {
    pub session_id: SessionId,
    pub thread: ThreadKind,
    pub timestamp: DateTime<Utc>,
    pub step_kind: String,
    pub channel: Option<String>,
    pub message: Option<String>,
    pub latency_ms: Option<f64>,
    pub model_used: Option<String>,
    pub language: Option<String>,
    pub errors: Vec<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SessionRollup {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub input_language: String,
    pub output_language: String,
    pub input_channel: Option<String>,
    pub output_channel: Option<String>,
    pub full_message_input: String,
    pub full_message_translated: String,
    pub total_segments_audio: u32,
    pub total_segments_asr: u32,
    pub total_segments_output: u32,
    pub model_used: Option<String>,
    pub total_latency_ms: f64,
    pub errors: Vec<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    Step(StepEvent),
    Rollup(SessionRollup),
}

pub trait TelemetrySink: Send {
    fn on_event(&mut self, event: &TelemetryEvent);
    fn on_summary(&mut self, snapshot: CountersSnapshot) {
        let _ = snapshot;
    }
}

/// Logs every event as a structured `tracing` record.
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn on_event(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::Step(e) => tracing::info!(
                session_id = %e.session_id,
                thread = ?e.thread,
                step = %e.step_kind,
                latency_ms = e.latency_ms,
                language = e.language.as_deref(),
                errors = ?e.errors,
                "telemetry step"
            ),
            TelemetryEvent::Rollup(r) => tracing::info!(
                session_id = %r.session_id,
                total_latency_ms = r.total_latency_ms,
                segments_audio = r.total_segments_audio,
                "telemetry rollup"
            ),
        }
    }

    fn on_summary(&mut self, snapshot: CountersSnapshot) {
        tracing::info!(
            total_frames = snapshot.total_frames,
            voice_frames = snapshot.voice_frames,
            recordings_created = snapshot.recordings_created,
            queue_timeouts = snapshot.queue_timeouts,
            processing_errors = snapshot.processing_errors,
            "periodic telemetry summary"
        );
    }
}

/// Persists both tables into an embedded SQLite database.
pub struct SqlSink {
    conn: rusqlite::Connection,
}

impl SqlSink {
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                thread_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                step_type TEXT NOT NULL,
                channel TEXT,
                message TEXT,
                latency_ms REAL,
                model_used TEXT,
                language TEXT,
                errors TEXT,
                metadata TEXT
            );
            CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                input_language TEXT NOT NULL,
                output_language TEXT NOT NULL,
                input_channel TEXT,
                output_channel TEXT,
                full_message_input TEXT,
                full_message_translated TEXT,
                total_segments_audio INTEGER DEFAULT 0,
                total_segments_asr INTEGER DEFAULT 0,
                total_segments_output INTEGER DEFAULT 0,
                model_used TEXT,
                total_latency_ms REAL,
                errors TEXT,
                metadata TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_translation_logs_session_id ON translation_logs(session_id);
            CREATE INDEX IF NOT EXISTS idx_translations_session_id ON translations(session_id);",
        )?;
        Ok(Self { conn })
    }
}

impl TelemetrySink for SqlSink {
    fn on_event(&mut self, event: &TelemetryEvent) {
        let result = match event {
            TelemetryEvent::Step(e) => self.conn.execute(
                "INSERT INTO translation_logs
                    (session_id, thread_id, timestamp, step_type, channel, message,
                     latency_ms, model_used, language, errors, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    e.session_id.as_str(),
                    e.thread as i64 as i32,
                    e.timestamp.to_rfc3339(),
                    e.step_kind,
                    e.channel,
                    e.message,
                    e.latency_ms,
                    e.model_used,
                    e.language,
                    serde_json::to_string(&e.errors).unwrap_or_default(),
                    e.metadata.to_string(),
                ],
            ),
            TelemetryEvent::Rollup(r) => self.conn.execute(
                "INSERT INTO translations
                    (session_id, timestamp, input_language, output_language, input_channel,
                     output_channel, full_message_input, full_message_translated,
                     total_segments_audio, total_segments_asr, total_segments_output,
                     model_used, total_latency_ms, errors, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                rusqlite::params![
                    r.session_id.as_str(),
                    r.timestamp.to_rfc3339(),
                    r.input_language,
                    r.output_language,
                    r.input_channel,
                    r.output_channel,
                    r.full_message_input,
                    r.full_message_translated,
                    r.total_segments_audio,
                    r.total_segments_asr,
                    r.total_segments_output,
                    r.model_used,
                    r.total_latency_ms,
                    serde_json::to_string(&r.errors).unwrap_or_default(),
                    r.metadata.to_string(),
                ],
            ),
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "telemetry persistence write failed");
        }
    }
}

/// Owns the counters and fans events out to every configured sink on a
/// dedicated thread, so a slow sink never blocks an emitting stage. A full
/// channel drops the oldest queued event rather than applying backpressure.
pub struct TelemetryHub {
    pub counters: Arc<Counters>,
    tx: Sender<TelemetryEvent>,
    /// Kept only so `emit` can pop the oldest queued event when the channel
    /// is full; the consumer thread holds its own clone of the receiver.
    evict_rx: Receiver<TelemetryEvent>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryHub {
    pub fn spawn(mut sinks: Vec<Box<dyn TelemetrySink>>, summary_interval: Duration) -> Self {
        let counters = Arc::new(Counters::default());
        let (tx, rx): (Sender<TelemetryEvent>, Receiver<TelemetryEvent>) =
            crossbeam_channel::bounded(256);
        let evict_rx = rx.clone();
        let hub_counters = counters.clone();

        let handle = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || loop {
                match rx.recv_timeout(summary_interval) {
                    Ok(event) => {
                        for sink in sinks.iter_mut() {
                            sink.on_event(&event);
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let snapshot = hub_counters.snapshot();
                        for sink in sinks.iter_mut() {
                            sink.on_summary(snapshot);
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn telemetry thread");

        Self {
            counters,
            tx,
            evict_rx,
            handle: Some(handle),
        }
    }

    /// Enqueues `event` for the sinks. A full channel drops the oldest
    /// queued event rather than applying backpressure to the emitting stage.
    pub fn emit(&self, event: TelemetryEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let _ = self.evict_rx.try_recv();
                if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
                    tracing::debug!("telemetry channel still full after evicting oldest event");
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn shutdown(mut self) {
        let handle = self.handle.take();
        drop(self.tx);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
