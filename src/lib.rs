pub mod audio;
pub mod cli;
pub mod config;
pub mod engines;
pub mod error;
pub mod jitter_buffer;
pub mod lang_config;
pub mod logging;
pub mod model_cache;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod telemetry;
pub mod worker;
