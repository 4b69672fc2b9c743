//! Spherical geometry shared by projection, back-projection and deduplication
//!
//! Angles are radians throughout. Yaw lives in `[-π, π]` with the seam at ±π,
//! pitch in `[-π/2, π/2]` with positive pitch pointing up.

pub mod camera;

pub use camera::{angles_to_ray, ray_to_angles, CameraProjector, CameraSpec};

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Axis-aligned region on the yaw/pitch rectangle.
///
/// When `wraps` is set the region straddles the ±π seam and covers
/// `[yaw_min, π] ∪ [-π, yaw_max]` (so `yaw_min > yaw_max` numerically).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereRegion {
    pub yaw_min: f64,
    pub yaw_max: f64,
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub wraps: bool,
}

impl SphereRegion {
    /// Region that does not cross the seam
    pub fn new(yaw_min: f64, yaw_max: f64, pitch_min: f64, pitch_max: f64) -> Self {
        Self {
            yaw_min,
            yaw_max,
            pitch_min,
            pitch_max,
            wraps: false,
        }
    }

    /// Region crossing the seam: `[yaw_min, π] ∪ [-π, yaw_max]`
    pub fn wrapped(yaw_min: f64, yaw_max: f64, pitch_min: f64, pitch_max: f64) -> Self {
        Self {
            yaw_min,
            yaw_max,
            pitch_min,
            pitch_max,
            wraps: true,
        }
    }

    /// Band covering every yaw between two pitches
    pub fn full_yaw(pitch_min: f64, pitch_max: f64) -> Self {
        Self::new(-PI, PI, pitch_min, pitch_max)
    }

    /// Bounding region of a set of yaw samples.
    ///
    /// Samples that fit in a span shorter than π are taken as-is. Otherwise the
    /// samples are re-read with negative yaws shifted by 2π; if that span is
    /// shorter than π the region straddles the seam. If neither reading is
    /// compact the samples surround a pole and the whole yaw range is covered.
    pub fn from_yaw_samples(yaws: &[f64], pitch_min: f64, pitch_max: f64) -> Self {
        let (lo, hi) = min_max(yaws.iter().copied());
        if hi - lo < PI {
            return Self::new(lo, hi, pitch_min, pitch_max);
        }

        let shifted = yaws.iter().map(|&y| if y < 0.0 { y + TAU } else { y });
        let (slo, shi) = min_max(shifted);
        if shi - slo < PI {
            // a sample at exactly -π lands on π and must not open a wrap
            if shi <= PI {
                return Self::new(slo, shi, pitch_min, pitch_max);
            }
            if slo >= PI {
                return Self::new(slo - TAU, shi - TAU, pitch_min, pitch_max);
            }
            return Self::wrapped(slo, shi - TAU, pitch_min, pitch_max);
        }

        Self::full_yaw(pitch_min, pitch_max)
    }

    /// Linear yaw intervals covered by this region (one, or two when wrapped)
    pub fn yaw_segments(&self) -> Vec<(f64, f64)> {
        if self.wraps {
            vec![(self.yaw_min, PI), (-PI, self.yaw_max)]
        } else {
            vec![(self.yaw_min, self.yaw_max)]
        }
    }

    pub fn yaw_span(&self) -> f64 {
        self.yaw_segments().iter().map(|(lo, hi)| (hi - lo).max(0.0)).sum()
    }

    pub fn pitch_span(&self) -> f64 {
        (self.pitch_max - self.pitch_min).max(0.0)
    }

    /// Area on the yaw/pitch rectangle (rad²)
    pub fn area(&self) -> f64 {
        self.yaw_span() * self.pitch_span()
    }

    /// Overlap area on the yaw/pitch rectangle, seam-aware
    pub fn intersection_area(&self, other: &SphereRegion) -> f64 {
        let pitch = interval_overlap(
            (self.pitch_min, self.pitch_max),
            (other.pitch_min, other.pitch_max),
        );
        if pitch <= 0.0 {
            return 0.0;
        }

        let mut yaw = 0.0;
        for a in self.yaw_segments() {
            for b in other.yaw_segments() {
                yaw += interval_overlap(a, b);
            }
        }
        yaw * pitch
    }

    /// Intersection over union on the yaw/pitch rectangle
    pub fn iou(&self, other: &SphereRegion) -> f64 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= f64::EPSILON {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }

    /// Whether a direction lies inside the region
    pub fn contains(&self, yaw: f64, pitch: f64) -> bool {
        pitch >= self.pitch_min
            && pitch <= self.pitch_max
            && self
                .yaw_segments()
                .iter()
                .any(|&(lo, hi)| yaw >= lo && yaw <= hi)
    }
}

/// Wrap an angle into `(-π, π]`
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

fn interval_overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.1.min(b.1) - a.0.max(b.0)).max(0.0)
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
