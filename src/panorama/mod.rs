//! Equirectangular panoramas and the perspective generator
//!
//! Every output pixel of a perspective view is inverse-mapped to a direction
//! on the sphere and sampled from the panorama. Rows are rendered as
//! independent rayon tasks.

pub mod perspectives;

pub use perspectives::{ring_pairs, PerspectivePreset, PerspectiveSet};

use image::{DynamicImage, Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::geometry::CameraSpec;

/// How source pixels are sampled when remapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Nearest,
    #[default]
    Bilinear,
}

/// Full-sphere raster: `x` maps linearly to yaw, `y` to pitch
#[derive(Debug, Clone)]
pub struct EquirectangularImage {
    image: RgbImage,
}

impl EquirectangularImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Load a panorama from disk
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Ok(Self::from_dynamic(image))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// `(yaw, pitch)` of a continuous pixel coordinate (pixel centers at `i + 0.5`)
    pub fn pixel_to_angles(&self, x: f64, y: f64) -> (f64, f64) {
        let yaw = x / self.width() as f64 * TAU - PI;
        let pitch = FRAC_PI_2 - y / self.height() as f64 * PI;
        (yaw, pitch)
    }

    /// Continuous pixel coordinate of a direction
    pub fn angles_to_pixel(&self, yaw: f64, pitch: f64) -> (f64, f64) {
        let x = (yaw + PI) / TAU * self.width() as f64;
        let y = (FRAC_PI_2 - pitch) / PI * self.height() as f64;
        (x, y)
    }

    /// Sample the panorama in a direction, wrapping across the yaw seam.
    /// An empty panorama samples as black.
    pub fn sample(&self, yaw: f64, pitch: f64, mode: SamplingMode) -> Rgb<u8> {
        if self.width() == 0 || self.height() == 0 {
            return Rgb([0, 0, 0]);
        }
        let (x, y) = self.angles_to_pixel(yaw, pitch);
        match mode {
            SamplingMode::Nearest => self.sample_nearest(x, y),
            SamplingMode::Bilinear => self.sample_bilinear(x, y),
        }
    }

    fn sample_nearest(&self, x: f64, y: f64) -> Rgb<u8> {
        let w = self.width() as i64;
        let h = self.height() as i64;
        let xi = (x.floor() as i64).rem_euclid(w);
        let yi = (y.floor() as i64).clamp(0, h - 1);
        *self.image.get_pixel(xi as u32, yi as u32)
    }

    fn sample_bilinear(&self, x: f64, y: f64) -> Rgb<u8> {
        let w = self.width() as i64;
        let h = self.height() as i64;

        let px = x - 0.5;
        let py = y - 0.5;
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;

        let xa = (x0 as i64).rem_euclid(w) as u32;
        let xb = (x0 as i64 + 1).rem_euclid(w) as u32;
        let ya = (y0 as i64).clamp(0, h - 1) as u32;
        let yb = (y0 as i64 + 1).clamp(0, h - 1) as u32;

        let p00 = self.image.get_pixel(xa, ya).0;
        let p10 = self.image.get_pixel(xb, ya).0;
        let p01 = self.image.get_pixel(xa, yb).0;
        let p11 = self.image.get_pixel(xb, yb).0;

        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
            let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    }

    /// Render a rectilinear view through `camera`.
    ///
    /// Fails with `InvalidSpec` when either field of view is outside (0, π).
    pub fn render_perspective(
        &self,
        camera: &CameraSpec,
        width: u32,
        height: u32,
        mode: SamplingMode,
    ) -> Result<PerspectiveImage> {
        let projector = camera.projector()?;
        let mut image = RgbImage::new(width, height);

        if width > 0 && height > 0 && self.width() > 0 && self.height() > 0 {
            let row_len = width as usize * 3;
            let buffer: &mut [u8] = &mut image;
            buffer
                .par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, pixels)| {
                    let v = (row as f64 + 0.5) / height as f64;
                    for (col, pixel) in pixels.chunks_exact_mut(3).enumerate() {
                        let u = (col as f64 + 0.5) / width as f64;
                        let (yaw, pitch) = projector.image_to_sphere(u, v);
                        pixel.copy_from_slice(&self.sample(yaw, pitch, mode).0);
                    }
                });
        }

        debug!(
            "Rendered {}x{} perspective at yaw {:.1}°, pitch {:.1}°",
            width,
            height,
            camera.yaw_offset.to_degrees(),
            camera.pitch_offset.to_degrees()
        );

        Ok(PerspectiveImage {
            camera: *camera,
            image,
        })
    }
}

/// Rectilinear view rendered from a panorama
#[derive(Debug, Clone)]
pub struct PerspectiveImage {
    camera: CameraSpec,
    image: RgbImage,
}

impl PerspectiveImage {
    /// Camera the view was rendered through
    pub fn camera(&self) -> &CameraSpec {
        &self.camera
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image.save(path)?;
        Ok(())
    }
}
