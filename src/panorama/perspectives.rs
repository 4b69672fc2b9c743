//! Perspective sets: ordered rings of overlapping cameras
//!
//! Adjacency is index based: view `i` neighbours `(i + 1) % len`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PanoOcrError, Result};
use crate::geometry::{wrap_angle, CameraSpec};

/// Named camera rings. All but `Spherical` are a single band at pitch 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerspectivePreset {
    /// 16 views, 45° × 45°, 22.5° apart
    #[default]
    Default,
    /// 32 views, 22.5° × 22.5°, 11.25° apart
    ZoomedIn,
    /// 12 views, 60° × 60°, 30° apart
    ZoomedOut,
    /// 8 views, 90° × 60°, 45° apart
    WideAngle,
    /// 12 views, 60° × 75°, 30° apart, then a 120° cap on each pole
    Spherical,
}

impl PerspectivePreset {
    pub const ALL: [PerspectivePreset; 5] = [
        PerspectivePreset::Default,
        PerspectivePreset::ZoomedIn,
        PerspectivePreset::ZoomedOut,
        PerspectivePreset::WideAngle,
        PerspectivePreset::Spherical,
    ];

    const CAP_FOV: f64 = 120.0;

    /// (view count, horizontal fov°, vertical fov°)
    fn layout(&self) -> (usize, f64, f64) {
        match self {
            PerspectivePreset::Default => (16, 45.0, 45.0),
            PerspectivePreset::ZoomedIn => (32, 22.5, 22.5),
            PerspectivePreset::ZoomedOut => (12, 60.0, 60.0),
            PerspectivePreset::WideAngle => (8, 90.0, 60.0),
            PerspectivePreset::Spherical => (12, 60.0, 75.0),
        }
    }

    /// Cameras of the ring, ordered by increasing yaw starting at 0°.
    ///
    /// `Spherical` appends the zenith and nadir caps after the band, so the
    /// last band view neighbours the zenith cap and the nadir cap closes the
    /// ring back to view 0.
    pub fn cameras(&self) -> Vec<CameraSpec> {
        let (count, hfov, vfov) = self.layout();
        let step = 360.0 / count as f64;
        let mut cameras: Vec<CameraSpec> = (0..count)
            .map(|i| {
                let mut camera = CameraSpec::from_degrees(hfov, vfov, 0.0, 0.0);
                camera.yaw_offset = wrap_angle((i as f64 * step).to_radians());
                camera
            })
            .collect();

        if *self == PerspectivePreset::Spherical {
            for pitch in [90.0, -90.0] {
                cameras.push(CameraSpec::from_degrees(Self::CAP_FOV, Self::CAP_FOV, 0.0, pitch));
            }
        }
        cameras
    }

    pub fn name(&self) -> &'static str {
        match self {
            PerspectivePreset::Default => "default",
            PerspectivePreset::ZoomedIn => "zoomed_in",
            PerspectivePreset::ZoomedOut => "zoomed_out",
            PerspectivePreset::WideAngle => "wide_angle",
            PerspectivePreset::Spherical => "spherical",
        }
    }
}

impl fmt::Display for PerspectivePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PerspectivePreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                format!("unknown preset '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Ordered, cyclic collection of cameras sharing one output resolution
#[derive(Debug, Clone)]
pub struct PerspectiveSet {
    cameras: Vec<CameraSpec>,
    width: u32,
    height: u32,
}

impl PerspectiveSet {
    /// Create a set, validating every camera
    pub fn new(cameras: Vec<CameraSpec>, width: u32, height: u32) -> Result<Self> {
        if cameras.is_empty() {
            return Err(PanoOcrError::EmptyPerspectiveSet);
        }
        for camera in &cameras {
            camera.validate()?;
        }
        Ok(Self {
            cameras,
            width,
            height,
        })
    }

    pub fn from_preset(preset: PerspectivePreset, width: u32, height: u32) -> Result<Self> {
        Self::new(preset.cameras(), width, height)
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn cameras(&self) -> &[CameraSpec] {
        &self.cameras
    }

    pub fn get(&self, index: usize) -> Option<&CameraSpec> {
        self.cameras.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraSpec> {
        self.cameras.iter()
    }

    /// Output (width, height) of every rendered view
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Next view in the ring
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.cameras.len()
    }

    /// Every ring edge exactly once
    pub fn adjacent_pairs(&self) -> Vec<(usize, usize)> {
        ring_pairs(self.cameras.len())
    }
}

/// Edges of a ring of `len` nodes: `(i, (i + 1) % len)`.
///
/// A single node has no neighbour; two nodes share a single edge.
pub fn ring_pairs(len: usize) -> Vec<(usize, usize)> {
    match len {
        0 | 1 => Vec::new(),
        2 => vec![(0, 1)],
        n => (0..n).map(|i| (i, (i + 1) % n)).collect(),
    }
}
