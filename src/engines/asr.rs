//! Opaque ASR engine boundary. No concrete backend ships in this core; the
//! worker is generic over any implementor.

/// Outcome of one ASR call.
#[derive(Debug, Clone, Default)]
pub struct AsrResult {
    pub text: String,
    pub detected_language: Option<String>,
    pub segment_confidences: Option<Vec<f32>>,
}

/// `transcribe(wav_bytes, language_hint) -> { text, detected_language, segments? }`
/// per the external interface contract. Implementations may hold state
/// internally (a loaded model) but are called as a pure function from the
/// worker's perspective.
pub trait AsrEngine: Send + Sync {
    fn transcribe(&self, wav_bytes: &[u8], language_hint: Option<&str>) -> anyhow::Result<AsrResult>;
}
