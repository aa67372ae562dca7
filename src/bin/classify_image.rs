//! classify_image - run the classifier over still images
//!
//! Each image goes through the same path as a camera frame: packed RGB is
//! converted to a planar 4:2:0 frame, normalized and classified. One
//! `Result: <label>` line is printed per image.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use skin_classifier::ingest::rgb_to_frame;
use skin_classifier::ingest::still::load_even_rgb;
use skin_classifier::{
    format_result, process_frame, ClassLabel, Classification, Classifier, ClassifierConfig,
    TensorLayout,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image files (JPEG or PNG).
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Config file (JSON, or TOML with a .toml extension). Defaults to $SKIN_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Inference backend (stub or tract).
    #[arg(long)]
    backend: Option<String>,
    /// Model artifact path.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Confidence threshold in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,
    /// Model input layout (nhwc or nchw).
    #[arg(long)]
    layout: Option<TensorLayout>,
    /// Print every class score, not only the label.
    #[arg(long)]
    scores: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => ClassifierConfig::load_from(Some(path))?,
        None => ClassifierConfig::load()?,
    };
    if let Some(backend) = args.backend {
        cfg.model.backend = backend;
    }
    if let Some(model) = args.model {
        cfg.model.path = model;
    }
    if let Some(threshold) = args.threshold {
        cfg.model.confidence_threshold = threshold;
    }
    if let Some(layout) = args.layout {
        cfg.model.layout = layout;
    }
    cfg.validate()?;

    let classifier =
        Classifier::from_settings(&cfg.model).context("classifier initialization failed")?;

    let mut failures = 0usize;
    for path in &args.images {
        match classify_path(&classifier, path) {
            Ok(classification) => {
                println!(
                    "{}: {}",
                    path.display(),
                    format_result(classification.label)
                );
                if args.scores {
                    println!("  {}", render_scores(&classification));
                }
            }
            Err(e) => {
                failures += 1;
                log::warn!("{}: {:#}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!(
            "{} of {} images could not be classified",
            failures,
            args.images.len()
        ));
    }
    Ok(())
}

fn classify_path(classifier: &Classifier, path: &std::path::Path) -> Result<Classification> {
    let image = load_even_rgb(path)?;
    let frame = rgb_to_frame(&image)?;
    Ok(process_frame(classifier, frame)?)
}

fn render_scores(classification: &Classification) -> String {
    ClassLabel::CLASSES
        .iter()
        .filter_map(|&label| {
            let score = classification.scores.get(label)?;
            Some(format!("{}={:.3}", label, score))
        })
        .collect::<Vec<_>>()
        .join(" ")
}
