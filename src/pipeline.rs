//! Wires the Ring Buffer through Capture, Worker, Jitter Buffer, and
//! Playback across the bounded queues, and coordinates shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::capture::CaptureStage;
use crate::audio::playback::PlaybackStage;
use crate::config::AppConfig;
use crate::engines::{AsrEngine, MtEngine, TtsEngine};
use crate::jitter_buffer::JitterBuffer;
use crate::queue::BoundedQueue;
use crate::session::SessionId;
use crate::telemetry::TelemetryHub;
use crate::worker::{SynthesizedChunk, UtteranceRecord, WorkerStage};

pub struct PipelineHandles {
    pub session: SessionId,
    pub telemetry: Arc<TelemetryHub>,
    stop: Arc<AtomicBool>,
    capture: Option<CaptureStage>,
    worker_thread: Option<std::thread::JoinHandle<()>>,
    playback: Option<PlaybackStage>,
    input_queue: Arc<BoundedQueue<UtteranceRecord>>,
    output_queue: Arc<BoundedQueue<SynthesizedChunk>>,
}

#[allow(clippy::too_many_arguments)]
pub fn start(
    cfg: &AppConfig,
    input_device: Option<&str>,
    output_device: Option<&str>,
    asr: Arc<dyn AsrEngine>,
    mt: Arc<dyn MtEngine>,
    tts: Arc<dyn TtsEngine>,
    src_lang: String,
    dst_lang: String,
    telemetry: Arc<TelemetryHub>,
) -> anyhow::Result<PipelineHandles> {
    let session = SessionId::new();
    let stop = Arc::new(AtomicBool::new(false));

    let input_queue = Arc::new(BoundedQueue::new(cfg.queues.asr_input_capacity));
    let output_queue = Arc::new(BoundedQueue::new(cfg.queues.output_capacity));
    let jitter = Arc::new(JitterBuffer::new(
        cfg.jitter_buffer.target_ms,
        cfg.worker.playback_sample_rate,
        cfg.playback.sub_chunk_samples,
    ));

    let worker = WorkerStage::new(cfg.worker.clone(), asr, mt, tts, src_lang, dst_lang);
    let worker_input = input_queue.clone();
    let worker_output = output_queue.clone();
    let worker_telemetry = telemetry.clone();
    let worker_stop = stop.clone();
    let worker_thread = std::thread::Builder::new()
        .name("worker".into())
        .spawn(move || worker.run(&worker_input, &worker_output, &worker_telemetry, &worker_stop))?;

    let capture = CaptureStage::start(
        input_device,
        &cfg.ring_buffer,
        &cfg.vad,
        &cfg.capture,
        input_queue.clone(),
        telemetry.clone(),
        session.clone(),
        stop.clone(),
    )?;

    let playback = PlaybackStage::start(
        output_device.map(str::to_string),
        cfg.playback.clone(),
        output_queue.clone(),
        jitter,
        stop.clone(),
    )?;

    Ok(PipelineHandles {
        session,
        telemetry,
        stop,
        capture: Some(capture),
        worker_thread: Some(worker_thread),
        playback: Some(playback),
        input_queue,
        output_queue,
    })
}

impl PipelineHandles {
    /// Set the stop flag, close queues so blocked stages observe it, and
    /// join every thread with a bounded timeout (default 2s per the
    /// concurrency model). A thread that outlives its timeout is left
    /// running rather than blocking shutdown indefinitely.
    pub fn shutdown(mut self, timeout: Duration) {
        self.stop.store(true, Ordering::SeqCst);
        self.input_queue.close();

        if let Some(capture) = self.capture.take() {
            drop(capture);
        }

        if let Some(handle) = self.worker_thread.take() {
            if !join_with_timeout(handle, timeout) {
                tracing::warn!("worker thread did not stop within shutdown timeout");
            }
        }
        self.output_queue.close();

        if let Some(playback) = self.playback.take() {
            let handle = std::thread::spawn(move || playback.join());
            if !join_with_timeout(handle, timeout) {
                tracing::warn!("playback thread did not stop within shutdown timeout");
            }
        }
    }
}

/// Joins `handle` on a proxy thread and waits at most `timeout` for it to
/// finish. Returns `false` on timeout; the proxy thread (and whatever it is
/// joining) is left to finish on its own rather than being blocked on.
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}
