//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of the PaddleOCR models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::OcrLanguage;

/// Models are fetched from Hugging Face (monkt/paddleocr-onnx)
const MODEL_BASE_URL: &str = "https://huggingface.co/monkt/paddleocr-onnx/resolve/main";

/// Environment variable disabling downloads
pub const OFFLINE_ENV: &str = "PANOOCR_OFFLINE";

/// PaddleOCR component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (CRNN)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [ModelType::Detection, ModelType::Recognition, ModelType::Dictionary];

    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Detection => "det.onnx",
            ModelType::Recognition => "rec.onnx",
            ModelType::Dictionary => "dict.txt",
        }
    }

    /// Download URL; the detection model is shared by every language
    pub fn download_url(&self, language: OcrLanguage) -> String {
        match self {
            ModelType::Detection => format!("{}/detection/v3/det.onnx", MODEL_BASE_URL),
            ModelType::Recognition | ModelType::Dictionary => format!(
                "{}/languages/{}/{}",
                MODEL_BASE_URL,
                language.model_family(),
                self.filename()
            ),
        }
    }

    /// Plausible file size in bytes
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Detection => (2_000_000, 5_000_000),
            ModelType::Recognition => (5_000_000, 30_000_000),
            ModelType::Dictionary => (100, 200_000),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detection => "Text Detection",
            ModelType::Recognition => "Text Recognition",
            ModelType::Dictionary => "Character Dictionary",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    /// Path relative to the models directory
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    /// Unix timestamp in seconds
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Downloads and caches the ONNX models of one language
pub struct ModelManager {
    models_dir: PathBuf,
    language: OcrLanguage,
}

impl ModelManager {
    /// Model manager rooted in the platform data directory
    pub fn new(language: OcrLanguage) -> Result<Self> {
        let models_dir = crate::storage::get_data_dir()?.join("models");
        Self::with_dir(models_dir, language)
    }

    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf, language: OcrLanguage) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self { models_dir, language })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn language(&self) -> OcrLanguage {
        self.language
    }

    /// Path of a model file; language specific files live in a per-family folder
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        match model_type {
            ModelType::Detection => self.models_dir.join(model_type.filename()),
            ModelType::Recognition | ModelType::Dictionary => self
                .models_dir
                .join(self.language.model_family())
                .join(model_type.filename()),
        }
    }

    /// Check if a model is already downloaded with a plausible size
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        match std::fs::metadata(self.model_path(model_type)) {
            Ok(metadata) => {
                let (min, max) = model_type.expected_size_range();
                (min..=max).contains(&metadata.len())
            }
            Err(_) => false,
        }
    }

    pub fn are_models_ready(&self) -> bool {
        ModelType::ALL.iter().all(|&m| self.is_model_available(m))
    }

    /// (model, available, size on disk)
    pub fn get_model_status(&self) -> Vec<(ModelType, bool, Option<u64>)> {
        ModelType::ALL
            .iter()
            .map(|&model_type| {
                let size = std::fs::metadata(self.model_path(model_type)).ok().map(|m| m.len());
                (model_type, self.is_model_available(model_type), size)
            })
            .collect()
    }

    /// Download a model if not already available; returns its path
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        if path.exists() {
            warn!("Model {:?} at {:?} has an unexpected size, downloading again", model_type, path);
        }

        self.download_model(model_type)?;
        Ok(path)
    }

    pub fn ensure_all_models(&self) -> Result<()> {
        for model_type in ModelType::ALL {
            self.ensure_model(model_type)?;
        }
        Ok(())
    }

    /// Download a specific model (blocking)
    pub fn download_model(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url(self.language);
        let path = self.model_path(model_type);

        if std::env::var_os(OFFLINE_ENV).is_some() {
            anyhow::bail!(
                "Offline mode: cannot download models. Please download manually from {} and place at {:?}",
                url,
                path
            );
        }

        info!("Downloading {} model from {}", model_type.display_name(), url);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let hash = rt.block_on(download_file_async(&url, &path))?;

        if !self.is_model_available(model_type) {
            anyhow::bail!(
                "Download of {} completed but the file size is outside the expected range",
                model_type.display_name()
            );
        }

        self.update_manifest_for_model(model_type, hash)?;

        info!("Successfully downloaded {} model", model_type.display_name());
        Ok(())
    }

    fn update_manifest_for_model(&self, model_type: ModelType, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();

        let path = self.model_path(model_type);
        let metadata = std::fs::metadata(&path)?;
        let filename = path
            .strip_prefix(&self.models_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename,
            size_bytes: metadata.len(),
            sha256: Some(sha256),
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.filename == model_info.filename) {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream `url` into a temp file next to `path`, then move it into place.
/// Returns the SHA-256 of the downloaded bytes.
async fn download_file_async(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let total_size = response.content_length();
    debug!("Download size: {:?} bytes", total_size);

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
    }

    file.flush().context("Failed to flush temp file")?;
    drop(file);
    debug!("Downloaded {} bytes from {}", downloaded, url);

    std::fs::rename(&temp_path, path).context("Failed to move downloaded file to final location")?;

    Ok(format!("{:x}", hasher.finalize()))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path, use_gpu: bool) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        #[cfg(target_os = "windows")]
        let builder = if use_gpu {
            use ort::execution_providers::DirectMLExecutionProvider;
            match builder.with_execution_providers([DirectMLExecutionProvider::default().build()]) {
                Ok(builder) => {
                    info!("DirectML GPU acceleration enabled");
                    builder
                }
                Err(e) => {
                    warn!("DirectML not available, using CPU: {}", e);
                    Session::builder()?
                        .with_optimization_level(GraphOptimizationLevel::Level3)?
                        .with_intra_threads(4)?
                }
            }
        } else {
            builder
        };

        #[cfg(not(target_os = "windows"))]
        if use_gpu {
            warn!("GPU acceleration is only wired up on Windows, using CPU");
        }

        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();

        info!("Model loaded. Inputs: {:?}, Outputs: {:?}", input_names, output_names);

        Ok(Self {
            session,
            input_names,
        })
    }

    /// Run a single-input, single-output model on an NCHW tensor.
    /// Returns the output shape and its data.
    pub fn run(&mut self, tensor: ndarray::Array4<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
        let input_name = self
            .input_names
            .first()
            .cloned()
            .context("Model has no inputs")?;

        let shape: Vec<usize> = tensor.shape().to_vec();
        let (data, _offset) = tensor.into_raw_vec_and_offset();
        let input = ort::value::Value::from_array((shape.as_slice(), data))
            .context("Failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => input])
            .context("Inference failed")?;

        let (out_shape, out_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;
        let out_shape: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((out_shape, out_data.to_vec()))
    }
}
