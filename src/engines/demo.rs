//! Pass-through stand-ins for the opaque ASR/MT/TTS boundaries.
//!
//! ASR, machine translation, and speech synthesis are explicitly out of
//! scope for this core (they are external collaborators with only their
//! interfaces specified). These implementations exist solely so the
//! pipeline can be wired and exercised end-to-end in tests and as the
//! binary's default when no real backend is configured; they do not
//! transcribe, translate, or synthesize anything.

use crate::audio::wav;
use crate::engines::asr::{AsrEngine, AsrResult};
use crate::engines::synthesis::{EncodedAudio, TtsEngine};
use crate::engines::translate::MtEngine;

/// Reports a fixed transcript derived only from the WAV's sample count, so
/// pipeline wiring tests can assert on deterministic behavior without a
/// real model.
pub struct EchoAsr {
    pub fixed_text: String,
}

impl AsrEngine for EchoAsr {
    fn transcribe(&self, wav_bytes: &[u8], language_hint: Option<&str>) -> anyhow::Result<AsrResult> {
        let (samples, _rate) = wav::decode(wav_bytes)?;
        if samples.is_empty() {
            return Ok(AsrResult::default());
        }
        Ok(AsrResult {
            text: self.fixed_text.clone(),
            detected_language: language_hint.map(str::to_string),
            segment_confidences: None,
        })
    }
}

/// Identity translation — returns the source text unchanged.
pub struct IdentityMt;

impl MtEngine for IdentityMt {
    fn translate(&self, text: &str, _src: &str, _dst: &str) -> anyhow::Result<String> {
        Ok(text.to_string())
    }
}

/// Synthesizes a short tone whose duration is proportional to the input
/// text length, encoded as WAV.
pub struct ToneTts {
    pub sample_rate: u32,
}

impl TtsEngine for ToneTts {
    fn synthesize(&self, text: &str, _language: &str) -> anyhow::Result<EncodedAudio> {
        let duration_secs = (text.split_whitespace().count().max(1) as f32 * 0.3).min(5.0);
        let n = (self.sample_rate as f32 * duration_secs) as usize;
        let samples: Vec<i16> = (0..n)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                ((t * 440.0 * std::f32::consts::TAU).sin() * i16::MAX as f32 * 0.2) as i16
            })
            .collect();
        let bytes = wav::encode(&samples, self.sample_rate)?;
        Ok(EncodedAudio {
            bytes,
            format_hint: "wav",
        })
    }
}
