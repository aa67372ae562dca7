//! skin_classifierd - live camera classification daemon
//!
//! This daemon:
//! 1. Loads the classifier model once (fatal on failure)
//! 2. Starts the classifier worker
//! 3. Attaches the configured camera (synthetic `stub://` or image replay)
//! 4. Logs every `Result: <label>` until Ctrl-C or the camera runs dry

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use skin_classifier::{
    open_camera, Classifier, ClassifierConfig, DisplaySink, LogDisplay, Pipeline, PipelineError,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension). Defaults to $SKIN_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera url: stub://<name> or a local image file/directory.
    #[arg(long)]
    camera: Option<String>,
    /// Inference backend (stub or tract).
    #[arg(long)]
    backend: Option<String>,
    /// Model artifact path.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Confidence threshold in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => ClassifierConfig::load_from(Some(path))?,
        None => ClassifierConfig::load()?,
    };
    if let Some(camera) = args.camera {
        cfg.camera.url = camera;
    }
    if let Some(backend) = args.backend {
        cfg.model.backend = backend;
    }
    if let Some(model) = args.model {
        cfg.model.path = model;
    }
    if let Some(threshold) = args.threshold {
        cfg.model.confidence_threshold = threshold;
    }
    cfg.validate()?;

    let classifier =
        Classifier::from_settings(&cfg.model).context("classifier initialization failed")?;
    let display: Arc<dyn DisplaySink> = Arc::new(LogDisplay);
    let mut pipeline = Pipeline::spawn(classifier, display)?;

    let camera = open_camera(&cfg.camera)?;
    match pipeline.attach_camera(camera) {
        Ok(()) => {}
        Err(PipelineError::PermissionDenied(source)) => {
            log::error!(
                "camera permission denied for {}; classification disabled",
                source
            );
            pipeline.shutdown();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "skin_classifierd running. camera={} backend={}",
        cfg.camera.url,
        cfg.model.backend
    );

    loop {
        match rx.recv_timeout(HEALTH_LOG_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping pipeline...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let stats = pipeline.stats();
                log::info!(
                    "pipeline health: received={} classified={} dropped={} failed={}",
                    stats.frames_received,
                    stats.frames_classified,
                    stats.frames_dropped,
                    stats.frames_failed
                );
                if !pipeline.camera_running() {
                    log::info!("camera finished delivering frames");
                    break;
                }
            }
        }
    }

    let stats = pipeline.shutdown();
    log::info!(
        "skin_classifierd stopped: {} frames classified, {} dropped, {} failed",
        stats.frames_classified,
        stats.frames_dropped,
        stats.frames_failed
    );
    Ok(())
}
