pub mod asr;
pub mod demo;
pub mod synthesis;
pub mod translate;

pub use asr::{AsrEngine, AsrResult};
pub use synthesis::TtsEngine;
pub use translate::MtEngine;
