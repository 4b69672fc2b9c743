//! PanoOCR command line
//!
//! Reads an equirectangular panorama, runs the OCR pipeline over a ring of
//! perspective views and writes the spherical detections as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use panoocr::config::{self, AppConfig};
use panoocr::panorama::{EquirectangularImage, PerspectivePreset};
use panoocr::pipeline::PanoOcrPipeline;
use panoocr::vision::{self, TextRecognizer};

/// Extract text from a 360° panorama
#[derive(Parser, Debug)]
#[command(name = "panoocr")]
#[command(about = "Run OCR over an equirectangular panorama and report text positions on the sphere")]
struct Args {
    /// Path to the equirectangular panorama image
    #[arg(long)]
    image_path: Option<PathBuf>,

    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Perspective preset: default, zoomed_in, zoomed_out, wide_angle, spherical
    #[arg(long)]
    preset: Option<PerspectivePreset>,

    /// Output JSON path (defaults to <image stem>.<engine>.json next to the image)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model cache directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Write every rendered perspective view as a PNG into this directory
    #[arg(long)]
    dump_perspectives: Option<PathBuf>,

    /// Download the OCR models and exit
    #[arg(long)]
    download_models: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = config::resolve_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    if args.download_models {
        let manager = vision::model_manager(&config.recognition)?;
        manager.ensure_all_models()?;
        info!("Models ready in {:?}", manager.models_dir());
        return Ok(());
    }

    let image_path = args
        .image_path
        .as_deref()
        .context("--image-path is required unless --download-models is given")?;

    let panorama = EquirectangularImage::open(image_path)
        .with_context(|| format!("Failed to open panorama {:?}", image_path))?;
    let pipeline = PanoOcrPipeline::from_config(&config)?;
    let mut recognizer = vision::create_recognizer(&config.recognition)?;

    if let Some(dir) = &args.dump_perspectives {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let report = pipeline.run_with_inspector(&panorama, &mut recognizer, |index, view| {
        if let Some(dir) = &args.dump_perspectives {
            view.save(&dir.join(format!("view_{:02}.png", index)))?;
        }
        Ok(())
    })?;

    for failure in &report.failures {
        warn!("View {} failed: {}", failure.view_index, failure.error);
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(image_path, recognizer.engine_tag()));
    let json = serde_json::to_string_pretty(&report.records())?;
    std::fs::write(&output, json).with_context(|| format!("Failed to write {:?}", output))?;

    info!("Wrote {} detections to {:?}", report.detections.len(), output);
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(preset) = args.preset {
        config.perspectives.preset = preset;
        config.perspectives.cameras = None;
    }
    if let Some(dir) = &args.models_dir {
        config.recognition.models_dir = Some(dir.clone());
    }
}

/// `<dir>/<stem>.<engine>.json`
fn default_output_path(image_path: &Path, engine_tag: &str) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "panorama".to_string());
    image_path.with_file_name(format!("{}.{}.json", stem, engine_tag.to_lowercase()))
}
