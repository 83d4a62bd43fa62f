//! Error taxonomy for the pipeline, one enum per fallible boundary.
//!
//! Recoverable kinds are logged and folded into telemetry by the caller;
//! only the kinds marked fatal below are allowed to unwind the host process.

use thiserror::Error;

/// Errors raised by the Ring Audio Buffer / VAD Segmenter boundary.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("input device callback reported underrun/overrun: {0}")]
    Underrun(String),

    #[error("VAD frame size mismatch: expected {expected} samples, got {got}")]
    FrameSizeMismatch { expected: usize, got: usize },

    #[error("input device open failed: {0}")]
    DeviceOpen(#[source] anyhow::Error),

    #[error("WAV encoding failed: {0}")]
    WavEncode(#[source] anyhow::Error),
}

/// Errors raised while pushing/popping the bounded stage queues.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue full — recording dropped")]
    Full,

    #[error("queue closed")]
    Closed,

    #[error("queue empty")]
    Empty,
}

/// Worker-stage per-phase failures. These never stop the worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("ASR failed: {0}")]
    Asr(#[source] anyhow::Error),

    #[error("ASR produced empty transcript")]
    EmptyTranscript,

    #[error("translation failed: {0}")]
    Translation(#[source] anyhow::Error),

    #[error("translation produced empty text")]
    EmptyTranslation,

    #[error("synthesis failed: {0}")]
    Synthesis(#[source] anyhow::Error),

    #[error("model cache lookup failed: {0}")]
    ModelLoad(#[from] ModelCacheError),
}

/// Model Cache failures, shared across every single-flight waiter on a key.
#[derive(Debug, Error, Clone)]
pub enum ModelCacheError {
    #[error("load failed for {0}")]
    LoadFailed(String),

    #[error("unsupported model parameters: {0}")]
    Unsupported(String),
}

/// Playback-stage failures.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("output device write failed: {0}")]
    DeviceWrite(#[source] anyhow::Error),

    #[error("output device lost, reopen failed: {0}")]
    DeviceLost(#[source] anyhow::Error),
}

/// Fatal startup failures (taxonomy kind 9), surfaced as a non-zero exit.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open audio device: {0}")]
    Device(#[source] anyhow::Error),

    #[error("config file is malformed: {0}")]
    Config(#[source] anyhow::Error),

    #[error("language config is malformed or missing an entry: {0}")]
    LanguageConfig(String),

    #[error("--src and --dst must differ")]
    SameLanguage,
}
