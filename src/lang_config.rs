//! Static language-code → {asr_tag, tts_tag} lookup.
//!
//! A built-in default table covers a baseline set of languages; a TOML file
//! named in configuration can extend or override it. Lookups for a language
//! absent from the resolved table fail fast at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageTags {
    pub asr_tag: String,
    pub tts_tag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageConfig {
    #[serde(flatten)]
    table: HashMap<String, LanguageTags>,
}

impl LanguageConfig {
    /// The baseline table bundled with the binary.
    pub fn builtin() -> Self {
        let mut table = HashMap::new();
        for (code, asr, tts) in [
            ("en", "en", "en"),
            ("es", "es", "es"),
            ("fr", "fr", "fr"),
            ("de", "de", "de"),
            ("it", "it", "it"),
            ("pt", "pt", "pt"),
        ] {
            table.insert(
                code.to_string(),
                LanguageTags {
                    asr_tag: asr.to_string(),
                    tts_tag: tts.to_string(),
                },
            );
        }
        Self { table }
    }

    /// Load the builtin table, then merge in overrides from `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, StartupError> {
        let mut cfg = Self::builtin();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path).map_err(|err| {
                StartupError::LanguageConfig(format!("cannot read {}: {err}", path.display()))
            })?;
            let overrides: HashMap<String, LanguageTags> = toml::from_str(&text)
                .map_err(|err| StartupError::LanguageConfig(format!("malformed: {err}")))?;
            cfg.table.extend(overrides);
        }
        Ok(cfg)
    }

    pub fn resolve(&self, code: &str) -> Result<&LanguageTags, StartupError> {
        self.table
            .get(code)
            .ok_or_else(|| StartupError::LanguageConfig(format!("unknown language code {code:?}")))
    }

    /// Fail fast if any of `codes` is missing from the table.
    pub fn validate_known(&self, codes: &[&str]) -> Result<(), StartupError> {
        for code in codes {
            self.resolve(code)?;
        }
        Ok(())
    }
}
