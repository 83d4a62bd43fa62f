//! Opaque text-to-speech engine boundary.

/// `synthesize(text, language) -> encoded_audio_bytes`; the core decodes
/// whatever format the implementation returns (format is discoverable via
/// `format_hint`, e.g. "wav" or "mp3").
pub trait TtsEngine: Send + Sync {
    fn synthesize(&self, text: &str, language: &str) -> anyhow::Result<EncodedAudio>;
}

pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub format_hint: &'static str,
}
