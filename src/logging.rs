//! Process-wide structured logging, installed once at startup.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global `tracing` subscriber. `verbosity` is the number of
/// times `-v` was passed on the command line; `log_dir` optionally enables
/// a rotating file appender alongside the terminal output.
///
/// Returns the file appender's worker guard, which must be kept alive for
/// the lifetime of the process or buffered log lines will be lost on exit.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "echofluent.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
