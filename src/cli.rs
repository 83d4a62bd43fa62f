//! Command-line surface: argument parsing, config/lang-table assembly, and
//! the exit-code boundary. Flag set mirrors the reference implementation's
//! `translate_rt.py` CLI.

use std::path::PathBuf;

use clap::Parser;

use crate::config::SilencePreset;

#[derive(Debug, Parser)]
#[command(name = "echofluent", about = "Real-time speech translation pipeline")]
pub struct Args {
    /// Source language code.
    #[arg(long)]
    pub src: String,

    /// Destination language code.
    #[arg(long)]
    pub dst: String,

    /// Synthesized voice.
    #[arg(long, value_enum, default_value_t = Voice::Female)]
    pub voice: Voice,

    /// VAD aggressiveness (0-3).
    #[arg(long, default_value_t = 2)]
    pub vad: u8,

    /// ASR model tag, forwarded opaquely to the ASR engine.
    #[arg(long, default_value = "medium")]
    pub whisper_model: String,

    /// Model cache directory, forwarded to the pluggable model loader.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Eagerly load ASR/MT/TTS handles for --src/--dst before starting capture.
    #[arg(long, default_value_t = false)]
    pub preload: bool,

    /// Whether VAD-based segmentation is active at all.
    #[arg(long, default_value_t = true)]
    pub silence_detection: bool,

    #[arg(long, value_enum, default_value_t = SilencePresetArg::Balanced)]
    pub silence_preset: SilencePresetArg,

    /// Overrides the preset's silence threshold, in milliseconds.
    #[arg(long)]
    pub min_silence_len: Option<u32>,

    /// Amplitude gate in dBFS, applied ahead of the VAD primitive.
    #[arg(long)]
    pub silence_thresh: Option<f32>,

    /// Hard ceiling on a single utterance, in seconds.
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Optional TOML config file. A file named here that fails to parse is
    /// a fatal startup error.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Optional TOML language table overriding the built-in defaults.
    #[arg(long)]
    pub lang_config: Option<PathBuf>,

    /// Input device name; default device if omitted.
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device name; default device if omitted.
    #[arg(long)]
    pub output_device: Option<String>,

    /// Directory for rotating log files; terminal-only if omitted.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Voice {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SilencePresetArg {
    Sensitive,
    Balanced,
    Aggressive,
    VeryAggressive,
}

impl From<SilencePresetArg> for SilencePreset {
    fn from(value: SilencePresetArg) -> Self {
        match value {
            SilencePresetArg::Sensitive => SilencePreset::Sensitive,
            SilencePresetArg::Balanced => SilencePreset::Balanced,
            SilencePresetArg::Aggressive => SilencePreset::Aggressive,
            SilencePresetArg::VeryAggressive => SilencePreset::VeryAggressive,
        }
    }
}

/// Exit codes per the external interface contract.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUNTIME_FAILURE: i32 = 1;
pub const EXIT_ARGUMENT_ERROR: i32 = 2;

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.src == self.dst {
            return Err("--src and --dst must differ".to_string());
        }
        Ok(())
    }

    pub fn apply_to_config(&self, cfg: &mut crate::config::AppConfig) {
        // --vad is independent of the silence-detection preset (§4.11).
        cfg.vad.aggressiveness = self.vad.min(3);
        cfg.vad.enabled = self.silence_detection;
        cfg.vad.preset = self.silence_preset.into();
        let (preset_silence_ms, _preset_aggr) = cfg.vad.preset.params();
        cfg.vad.silence_threshold_ms = self.min_silence_len.unwrap_or(preset_silence_ms);
        if let Some(thresh) = self.silence_thresh {
            cfg.vad.silence_thresh_dbfs = Some(thresh);
        }
        if let Some(max_duration) = self.max_duration {
            cfg.capture.max_duration_secs = Some(max_duration);
        }
        if let Some(cache_dir) = &self.cache_dir {
            cfg.model_cache.cache_dir = Some(cache_dir.display().to_string());
        }
    }
}
