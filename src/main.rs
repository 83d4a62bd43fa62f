use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use echofluent::cli::{Args, EXIT_ARGUMENT_ERROR, EXIT_RUNTIME_FAILURE, EXIT_SUCCESS};
use echofluent::config::{self, AppConfig};
use echofluent::engines::demo::{EchoAsr, IdentityMt, ToneTts};
use echofluent::lang_config::LanguageConfig;
use echofluent::model_cache::{ModelCache, ModelHandle, ModelKey};
use echofluent::telemetry::{LogSink, SqlSink, TelemetryHub, TelemetrySink};
use echofluent::{logging, pipeline};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(msg) = args.validate() {
        eprintln!("argument error: {msg}");
        std::process::exit(EXIT_ARGUMENT_ERROR);
    }

    let _log_guard = logging::init(args.verbose, args.log_dir.as_deref());

    match run(args).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            std::process::exit(EXIT_RUNTIME_FAILURE);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut app_config = match &args.config {
        Some(path) => config::read_app_config(path)?,
        None => AppConfig::default(),
    };
    args.apply_to_config(&mut app_config);

    let lang_config = LanguageConfig::load(args.lang_config.as_deref())?;
    lang_config.validate_known(&[&args.src, &args.dst])?;

    let mut sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(LogSink)];
    if let Some(path) = &app_config.telemetry.persist_path {
        sinks.push(Box::new(SqlSink::open(Path::new(path))?));
    }
    let telemetry = Arc::new(TelemetryHub::spawn(
        sinks,
        Duration::from_secs(app_config.telemetry.summary_interval_secs),
    ));

    let asr: Arc<dyn echofluent::engines::AsrEngine> = Arc::new(EchoAsr {
        fixed_text: "hello".to_string(),
    });
    let mt: Arc<dyn echofluent::engines::MtEngine> = Arc::new(IdentityMt);
    let tts: Arc<dyn echofluent::engines::TtsEngine> = Arc::new(ToneTts {
        sample_rate: app_config.worker.playback_sample_rate,
    });

    if args.preload {
        preload(&app_config, &args.src, &args.dst, asr.clone(), mt.clone(), tts.clone()).await;
    }

    let handles = pipeline::start(
        &app_config,
        args.input_device.as_deref(),
        args.output_device.as_deref(),
        asr,
        mt,
        tts,
        args.src.clone(),
        args.dst.clone(),
        telemetry,
    )?;

    tracing::info!(session = %handles.session, "pipeline started, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    handles.shutdown(Duration::from_secs(2));

    Ok(())
}

/// Eagerly resolve ASR/MT/TTS handles for `[src, dst]` before capture
/// starts, loading them concurrently and reporting combined progress
/// through the log sink.
async fn preload(
    cfg: &AppConfig,
    src: &str,
    dst: &str,
    asr: Arc<dyn echofluent::engines::AsrEngine>,
    mt: Arc<dyn echofluent::engines::MtEngine>,
    tts: Arc<dyn echofluent::engines::TtsEngine>,
) {
    let mut cache: ModelCache<ModelHandle> = ModelCache::new(cfg.model_cache.capacity, |handle| match handle {
        ModelHandle::Asr(a) => Arc::strong_count(a) - 1,
        ModelHandle::Mt(m) => Arc::strong_count(m) - 1,
        ModelHandle::Tts(t) => Arc::strong_count(t) - 1,
    });
    cache.progress = Some(Box::new(|message, percent| {
        tracing::info!(message, percent, "preload progress");
    }));
    let cache = Arc::new(cache);

    let languages = vec![src.to_string(), dst.to_string()];
    let results = cache
        .load_all(&languages, move |key| match key {
            ModelKey::Asr(_) => Ok(ModelHandle::Asr(asr.clone())),
            ModelKey::Mt(..) => Ok(ModelHandle::Mt(mt.clone())),
            ModelKey::Tts(_) => Ok(ModelHandle::Tts(tts.clone())),
        })
        .await;
    for (key, result) in results {
        if let Err(err) = result {
            tracing::warn!(%key, error = %err, "preload failed for key");
        }
    }
}
