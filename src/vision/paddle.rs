//! PaddleOCR backend via ONNX Runtime
//!
//! Two-stage recognizer: a DBNet detection model produces a text
//! probability map, regions are extracted from it, then every region is
//! cropped and read by a CRNN model decoded with greedy CTC.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array3;
use tracing::debug;

use super::models::{ModelManager, ModelType, OnnxSession};
use super::preprocess::{self, PreprocessConfig};
use super::{RecognitionConfig, TextRecognizer};
use crate::detection::{FlatDetection, NormalizedBox};

pub const ENGINE_TAG: &str = "PADDLE_OCR";

/// Regions narrower or shorter than this (in map pixels) are noise
const MIN_REGION_SIDE: f32 = 3.0;

/// Text region in pixel coordinates (edges inclusive of the covered area)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// Mean detection probability inside the region
    pub score: f32,
}

impl TextBox {
    fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x0: self.x0 * sx,
            y0: self.y0 * sy,
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            score: self.score,
        }
    }

    fn corners(&self) -> [(f32, f32); 4] {
        [(self.x0, self.y0), (self.x1, self.y0), (self.x1, self.y1), (self.x0, self.y1)]
    }
}

/// Extract text boxes from a DB probability map of `width × height`.
///
/// Pixels above `det_threshold` are grouped into 8-connected regions;
/// regions whose mean probability is below `box_threshold` are dropped and
/// the rest are expanded by `area * unclip_ratio / perimeter`. Boxes are
/// returned top-to-bottom, then left-to-right.
pub fn boxes_from_probability_map(
    probabilities: &[f32],
    width: usize,
    height: usize,
    det_threshold: f32,
    box_threshold: f32,
    unclip_ratio: f32,
) -> Vec<TextBox> {
    if width == 0 || height == 0 || probabilities.len() < width * height {
        return Vec::new();
    }

    let binary = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let p = probabilities[y as usize * width + x as usize];
        Luma([if p > det_threshold { 255 } else { 0 }])
    });
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    struct Region {
        min_x: u32,
        min_y: u32,
        max_x: u32,
        max_y: u32,
        sum: f32,
        count: u32,
    }

    let mut regions: Vec<Option<Region>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        if regions.len() < label {
            regions.resize_with(label, || None);
        }
        let p = probabilities[y as usize * width + x as usize];
        let region = regions[label - 1].get_or_insert(Region {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum: 0.0,
            count: 0,
        });
        region.min_x = region.min_x.min(x);
        region.min_y = region.min_y.min(y);
        region.max_x = region.max_x.max(x);
        region.max_y = region.max_y.max(y);
        region.sum += p;
        region.count += 1;
    }

    let mut boxes: Vec<TextBox> = regions
        .into_iter()
        .flatten()
        .filter_map(|r| {
            let w = (r.max_x - r.min_x + 1) as f32;
            let h = (r.max_y - r.min_y + 1) as f32;
            if w.min(h) < MIN_REGION_SIDE {
                return None;
            }
            let score = r.sum / r.count as f32;
            if score < box_threshold {
                return None;
            }

            let distance = w * h * unclip_ratio / (2.0 * (w + h));
            Some(TextBox {
                x0: (r.min_x as f32 - distance).max(0.0),
                y0: (r.min_y as f32 - distance).max(0.0),
                x1: (r.max_x as f32 + 1.0 + distance).min(width as f32),
                y1: (r.max_y as f32 + 1.0 + distance).min(height as f32),
                score,
            })
        })
        .collect();

    boxes.sort_by(|a, b| a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0)));
    boxes
}

/// Greedy CTC decoding of a `timesteps × vocab` probability matrix.
///
/// Index 0 is the blank; index `k` maps to `dictionary[k - 1]`. Repeated
/// indices collapse. Confidence is the mean probability of the emitted
/// characters (0 when nothing is emitted).
pub fn ctc_greedy_decode(probabilities: &[f32], timesteps: usize, vocab: usize, dictionary: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut score_sum = 0.0f32;
    let mut emitted = 0usize;
    let mut previous = 0usize;

    for step in probabilities.chunks_exact(vocab.max(1)).take(timesteps) {
        let (index, &prob) = step
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));

        if index != 0 && index != previous {
            if let Some(symbol) = dictionary.get(index - 1) {
                text.push_str(symbol);
                score_sum += prob;
                emitted += 1;
            }
        }
        previous = index;
    }

    let confidence = if emitted > 0 { score_sum / emitted as f32 } else { 0.0 };
    (text, confidence)
}

/// Load a recognition dictionary, one symbol per line; the model's last
/// class is the space character
pub fn load_dictionary(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dictionary {:?}", path))?;
    let mut symbols: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect();
    symbols.push(" ".to_string());
    Ok(symbols)
}

/// PaddleOCR text recognizer
pub struct PaddleOcrEngine {
    detector: OnnxSession,
    recognizer: OnnxSession,
    dictionary: Vec<String>,
    config: RecognitionConfig,
    preprocess: PreprocessConfig,
}

impl PaddleOcrEngine {
    pub fn new(det_path: &Path, rec_path: &Path, dict_path: &Path, config: RecognitionConfig) -> Result<Self> {
        let detector = OnnxSession::new(det_path, config.use_gpu)?;
        let recognizer = OnnxSession::new(rec_path, config.use_gpu)?;
        let dictionary = load_dictionary(dict_path)?;
        debug!("Loaded dictionary with {} symbols", dictionary.len());

        let preprocess = PreprocessConfig {
            det_max_side: config.det_max_side,
            ..PreprocessConfig::default()
        };

        Ok(Self {
            detector,
            recognizer,
            dictionary,
            config,
            preprocess,
        })
    }

    /// Load the models already present in a model manager
    pub fn from_manager(manager: &ModelManager, config: RecognitionConfig) -> Result<Self> {
        Self::new(
            &manager.model_path(ModelType::Detection),
            &manager.model_path(ModelType::Recognition),
            &manager.model_path(ModelType::Dictionary),
            config,
        )
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Text boxes in the pixel coordinates of `image`
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<TextBox>> {
        let (tensor, (sx, sy)) = preprocess::preprocess_for_detection(image, &self.preprocess);
        let (shape, data) = self.detector.run(tensor).context("Text detection failed")?;

        let (map_h, map_w) = match shape.as_slice() {
            [.., h, w] => (*h, *w),
            _ => anyhow::bail!("Unexpected detection output shape {:?}", shape),
        };

        let boxes = boxes_from_probability_map(
            &data,
            map_w,
            map_h,
            self.config.det_threshold,
            self.config.box_threshold,
            self.config.unclip_ratio,
        );
        Ok(boxes.iter().map(|b| b.scaled(sx, sy)).collect())
    }

    /// Read the text of one crop
    fn read(&mut self, crop: &Array3<f32>) -> Result<(String, f32)> {
        let tensor = preprocess::preprocess_for_recognition(crop, &self.preprocess);
        let (shape, data) = self.recognizer.run(tensor).context("Text recognition failed")?;

        let (timesteps, vocab) = match shape.as_slice() {
            [_, t, v] => (*t, *v),
            _ => anyhow::bail!("Unexpected recognition output shape {:?}", shape),
        };
        Ok(ctc_greedy_decode(&data, timesteps, vocab, &self.dictionary))
    }
}

impl TextRecognizer for PaddleOcrEngine {
    fn engine_tag(&self) -> &str {
        ENGINE_TAG
    }

    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<FlatDetection>> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        let rgb = preprocess::rgb_to_f32(image);

        let boxes = self.detect(image)?;
        let mut detections = Vec::with_capacity(boxes.len());

        for text_box in &boxes {
            let Some(crop) = preprocess::crop(
                &rgb,
                text_box.x0.floor() as usize,
                text_box.y0.floor() as usize,
                text_box.x1.ceil() as usize,
                text_box.y1.ceil() as usize,
            ) else {
                continue;
            };

            let (text, confidence) = self.read(&crop)?;
            let text = text.trim().to_string();
            if text.is_empty() || confidence < self.config.min_confidence {
                continue;
            }

            if let Some(bbox) = NormalizedBox::from_pixel_points(&text_box.corners(), width, height) {
                detections.push(FlatDetection::new(text, confidence.clamp(0.0, 1.0), bbox, ENGINE_TAG));
            }
        }

        debug!(
            "PaddleOCR read {} of {} regions in {:?}",
            detections.len(),
            boxes.len(),
            start.elapsed()
        );
        Ok(detections)
    }
}
