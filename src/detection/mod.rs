//! Text detections in flat (perspective image) and spherical space

pub mod back_project;

pub use back_project::box_to_region;

use serde::{Deserialize, Serialize};

use crate::error::{PanoOcrError, Result};
use crate::geometry::SphereRegion;

/// Slack allowed on the normalized-box invariants
const BOX_EPSILON: f64 = 1e-6;

/// Axis-aligned box relative to the image that produced it, all in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Box from its edges, deriving width and height
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Bounding box of pixel-space points (e.g. a detector polygon), clamped to the image
    pub fn from_pixel_points(points: &[(f32, f32)], image_width: u32, image_height: u32) -> Option<Self> {
        if points.is_empty() || image_width == 0 || image_height == 0 {
            return None;
        }

        let min_x = points.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let min_y = points.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_x = points.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let max_y = points.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        let w = image_width as f64;
        let h = image_height as f64;
        Some(Self::from_edges(
            (min_x as f64 / w).clamp(0.0, 1.0),
            (min_y as f64 / h).clamp(0.0, 1.0),
            (max_x as f64 / w).clamp(0.0, 1.0),
            (max_y as f64 / h).clamp(0.0, 1.0),
        ))
    }

    /// Check the box invariants; nothing is corrected silently
    pub fn validate(&self) -> std::result::Result<(), String> {
        let fields = [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("width", self.width),
            ("height", self.height),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < -BOX_EPSILON || value > 1.0 + BOX_EPSILON {
                return Err(format!("{} = {} is outside [0, 1]", name, value));
            }
        }
        if self.right < self.left {
            return Err(format!("right {} < left {}", self.right, self.left));
        }
        if self.bottom < self.top {
            return Err(format!("bottom {} < top {}", self.bottom, self.top));
        }
        if (self.width - (self.right - self.left)).abs() > BOX_EPSILON {
            return Err(format!("width {} != right - left", self.width));
        }
        if (self.height - (self.bottom - self.top)).abs() > BOX_EPSILON {
            return Err(format!("height {} != bottom - top", self.height));
        }
        Ok(())
    }

    /// Corners as `(u, v)`: top-left, top-right, bottom-right, bottom-left
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.left, self.top),
            (self.right, self.top),
            (self.right, self.bottom),
            (self.left, self.bottom),
        ]
    }

    pub fn contains(&self, u: f64, v: f64) -> bool {
        u >= self.left && u <= self.right && v >= self.top && v <= self.bottom
    }
}

/// Recognition result in perspective-image space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatDetection {
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    pub bbox: NormalizedBox,
    pub engine_tag: String,
}

impl FlatDetection {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: NormalizedBox, engine_tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
            engine_tag: engine_tag.into(),
        }
    }

    /// Reject detections whose box or confidence break the invariants
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| PanoOcrError::MalformedDetection {
            text: self.text.clone(),
            reason,
        };
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(malformed(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        self.bbox.validate().map_err(malformed)
    }
}

/// Detection placed on the sphere, tagged with the view that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereDetection {
    pub text: String,
    pub confidence: f32,
    pub engine_tag: String,
    pub region: SphereRegion,
    /// Index of the originating camera in the perspective set
    pub view_index: usize,
}

impl SphereDetection {
    /// Flat output record (angles in degrees)
    pub fn to_record(&self) -> OutputRecord {
        OutputRecord {
            text: self.text.clone(),
            confidence: self.confidence,
            engine_tag: self.engine_tag.clone(),
            yaw_min: self.region.yaw_min.to_degrees(),
            yaw_max: self.region.yaw_max.to_degrees(),
            pitch_min: self.region.pitch_min.to_degrees(),
            pitch_max: self.region.pitch_max.to_degrees(),
            wraps: self.region.wraps,
            view_index: self.view_index,
        }
    }
}

/// Persisted spherical text annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub text: String,
    pub confidence: f32,
    pub engine_tag: String,
    pub yaw_min: f64,
    pub yaw_max: f64,
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub wraps: bool,
    pub view_index: usize,
}
