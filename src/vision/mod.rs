//! Text recognition layer
//!
//! The pipeline only depends on the [`TextRecognizer`] capability; the
//! shipped backend is PaddleOCR via ONNX Runtime.

pub mod models;
pub mod paddle;
pub mod preprocess;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::FlatDetection;

pub use models::{ModelManager, ModelType, OnnxSession};
pub use paddle::PaddleOcrEngine;

/// External capability turning a perspective image into flat detections.
///
/// Boxes must be normalized to the image that was passed in.
pub trait TextRecognizer {
    /// Short identifier stamped on every detection (e.g. `PADDLE_OCR`)
    fn engine_tag(&self) -> &str;

    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<FlatDetection>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn engine_tag(&self) -> &str {
        (**self).engine_tag()
    }

    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<FlatDetection>> {
        (**self).recognize(image)
    }
}

/// Recognition language; selects the recognition model and dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrLanguage {
    #[default]
    English,
    Chinese,
    French,
    German,
    Japanese,
    Korean,
}

impl OcrLanguage {
    pub const ALL: [OcrLanguage; 6] = [
        OcrLanguage::English,
        OcrLanguage::Chinese,
        OcrLanguage::French,
        OcrLanguage::German,
        OcrLanguage::Japanese,
        OcrLanguage::Korean,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OcrLanguage::English => "english",
            OcrLanguage::Chinese => "chinese",
            OcrLanguage::French => "french",
            OcrLanguage::German => "german",
            OcrLanguage::Japanese => "japanese",
            OcrLanguage::Korean => "korean",
        }
    }

    /// Model family on the model host; French and German share the latin model
    pub fn model_family(&self) -> &'static str {
        match self {
            OcrLanguage::English => "english",
            OcrLanguage::Chinese => "chinese",
            OcrLanguage::French | OcrLanguage::German => "latin",
            OcrLanguage::Japanese => "japanese",
            OcrLanguage::Korean => "korean",
        }
    }
}

impl fmt::Display for OcrLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OcrLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let alias = match normalized.as_str() {
            "en" | "en-us" => "english",
            "zh" | "ch" | "zh-cn" => "chinese",
            "fr" => "french",
            "de" => "german",
            "ja" | "jp" | "japan" => "japanese",
            "ko" => "korean",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|lang| lang.name() == alias)
            .ok_or_else(|| format!("unsupported OCR language '{}'", s))
    }
}

/// Configuration for the recognition backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub language: OcrLanguage,
    /// Minimum recognition confidence for a detection to be kept (0.0 - 1.0)
    pub min_confidence: f32,
    /// Probability threshold for the detection map (0.0 - 1.0)
    pub det_threshold: f32,
    /// Minimum mean probability of a text region (0.0 - 1.0)
    pub box_threshold: f32,
    /// Box expansion ratio applied to detected regions
    pub unclip_ratio: f32,
    /// Longest side of the detection input (larger views are scaled down)
    pub det_max_side: u32,
    /// Model cache directory; platform data dir when unset
    pub models_dir: Option<PathBuf>,
    /// Whether to use GPU acceleration
    pub use_gpu: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: OcrLanguage::English,
            min_confidence: 0.5,
            det_threshold: 0.3,
            box_threshold: 0.5,
            unclip_ratio: 1.6,
            det_max_side: 960,
            models_dir: None,
            use_gpu: false,
        }
    }
}

/// Model manager for the configured models directory
pub fn model_manager(config: &RecognitionConfig) -> Result<ModelManager> {
    match &config.models_dir {
        Some(dir) => ModelManager::with_dir(dir.clone(), config.language),
        None => ModelManager::new(config.language),
    }
}

/// Make sure the models are present, then load the PaddleOCR engine
pub fn create_recognizer(config: &RecognitionConfig) -> Result<PaddleOcrEngine> {
    let manager = model_manager(config)?;
    manager.ensure_all_models()?;

    info!(
        "Initializing PaddleOCR backend ({}, models in {:?})",
        config.language,
        manager.models_dir()
    );
    let engine = PaddleOcrEngine::from_manager(&manager, config.clone())?;
    info!("PaddleOCR initialized successfully");
    Ok(engine)
}
