//! Typed application configuration, loaded from an optional TOML file.
//!
//! Every field is defaulted so a missing or partially-specified file still
//! produces a runnable configuration. A file explicitly named on the command
//! line that fails to parse is a fatal startup error; a file that is simply
//! absent is not.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilencePreset {
    Sensitive,
    Balanced,
    Aggressive,
    VeryAggressive,
}

impl Default for SilencePreset {
    fn default() -> Self {
        SilencePreset::Balanced
    }
}

impl SilencePreset {
    /// (silence_threshold_ms, aggressiveness)
    pub fn params(self) -> (u32, u8) {
        match self {
            SilencePreset::Sensitive => (600, 1),
            SilencePreset::Balanced => (800, 2),
            SilencePreset::Aggressive => (1200, 3),
            SilencePreset::VeryAggressive => (1500, 3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingBufferConfig {
    /// Seconds of audio retained by the ring buffer.
    pub duration_secs: f32,
    pub sample_rate: u32,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            duration_secs: 1.0,
            sample_rate: 16_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub frame_ms: u32,
    pub voice_threshold_ms: u32,
    pub silence_threshold_ms: u32,
    pub aggressiveness: u8,
    pub preset: SilencePreset,
    pub enabled: bool,
    /// Amplitude gate (dBFS) applied ahead of the VAD primitive; frames
    /// quieter than this are forced silent without invoking the detector.
    pub silence_thresh_dbfs: Option<f32>,
}

impl Default for VadConfig {
    fn default() -> Self {
        let (silence_threshold_ms, aggressiveness) = SilencePreset::default().params();
        Self {
            frame_ms: 30,
            voice_threshold_ms: 200,
            silence_threshold_ms,
            aggressiveness,
            preset: SilencePreset::default(),
            enabled: true,
            silence_thresh_dbfs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub pre_roll_ms: u32,
    pub max_blocking_ms: u64,
    /// Hard ceiling on a single in-progress utterance, in seconds. `None`
    /// means unbounded (VAD silence detection is the only stop condition).
    pub max_duration_secs: Option<f32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pre_roll_ms: 200,
            max_blocking_ms: 50,
            max_duration_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub asr_input_capacity: usize,
    pub output_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            asr_input_capacity: 10,
            output_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub long_audio_threshold_secs: f32,
    pub chunk_secs: f32,
    pub chunk_overlap_secs: f32,
    pub playback_sample_rate: u32,
    /// When true (default), an utterance already popped off the queue runs
    /// to completion even after shutdown is requested. When false, it is
    /// abandoned as soon as shutdown is observed between phases. Either way
    /// the queue tail itself is always discarded on shutdown.
    pub drain_on_stop: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            long_audio_threshold_secs: 30.0,
            chunk_secs: 30.0,
            chunk_overlap_secs: 2.0,
            playback_sample_rate: 44_100,
            drain_on_stop: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBufferConfig {
    pub target_ms: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self { target_ms: 250 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sub_chunk_samples: usize,
    pub pop_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sub_chunk_samples: 1024,
            pop_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCacheConfig {
    pub capacity: usize,
    pub cache_dir: Option<String>,
}

impl Default for ModelCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub summary_interval_secs: u64,
    /// Path to a SQLite file enabling the persistence sink; `None` disables it.
    pub persist_path: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: 30,
            persist_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ring_buffer: RingBufferConfig,
    pub vad: VadConfig,
    pub capture: CaptureConfig,
    pub queues: QueueConfig,
    pub worker: WorkerConfig,
    pub jitter_buffer: JitterBufferConfig,
    pub playback: PlaybackConfig,
    pub model_cache: ModelCacheConfig,
    pub telemetry: TelemetryConfig,
}

/// Load configuration from `path`. A missing file silently falls back to
/// defaults; a file that fails to parse is a hard error — the caller should
/// only pass a path the user explicitly named.
pub fn read_app_config(path: &Path) -> Result<AppConfig, StartupError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "config file unreadable, using defaults");
            return Ok(AppConfig::default());
        }
    };
    toml::from_str(&text).map_err(|err| StartupError::Config(anyhow::Error::new(err)))
}
