//! Rectilinear (pinhole) camera looking outward from the sphere's center
//!
//! World frame: `+z` is yaw 0, `+x` is yaw +90°, `+y` is up. A camera with
//! yaw `ψ` and pitch `θ` maps camera-local rays to the world with
//! `R_y(ψ) · R_x(-θ)`, i.e. tilt first, then turn.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{PanoOcrError, Result};

/// One perspective camera (angles in radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub horizontal_fov: f64,
    pub vertical_fov: f64,
    pub yaw_offset: f64,
    pub pitch_offset: f64,
}

impl CameraSpec {
    pub fn new(horizontal_fov: f64, vertical_fov: f64, yaw_offset: f64, pitch_offset: f64) -> Self {
        Self {
            horizontal_fov,
            vertical_fov,
            yaw_offset,
            pitch_offset,
        }
    }

    /// Build a camera from angles given in degrees
    pub fn from_degrees(horizontal_fov: f64, vertical_fov: f64, yaw_offset: f64, pitch_offset: f64) -> Self {
        Self::new(
            horizontal_fov.to_radians(),
            vertical_fov.to_radians(),
            yaw_offset.to_radians(),
            pitch_offset.to_radians(),
        )
    }

    /// Check both fields of view lie in the open interval (0, π)
    pub fn validate(&self) -> Result<()> {
        check_fov("horizontal", self.horizontal_fov)?;
        check_fov("vertical", self.vertical_fov)
    }

    /// Validated projector with the rotation and plane extents precomputed
    pub fn projector(&self) -> Result<CameraProjector> {
        self.validate()?;
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw_offset)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), -self.pitch_offset);
        Ok(CameraProjector {
            rotation,
            tan_half_h: (self.horizontal_fov / 2.0).tan(),
            tan_half_v: (self.vertical_fov / 2.0).tan(),
        })
    }
}

fn check_fov(axis: &'static str, fov: f64) -> Result<()> {
    if fov.is_finite() && fov > 0.0 && fov < PI {
        Ok(())
    } else {
        Err(PanoOcrError::InvalidSpec {
            axis,
            fov_degrees: fov.to_degrees(),
        })
    }
}

/// Forward/inverse mapping between normalized image coordinates and the sphere.
///
/// Normalized coordinates `(u, v)` are in `[0, 1]` with `v` growing downward,
/// matching image rows.
#[derive(Debug, Clone, Copy)]
pub struct CameraProjector {
    rotation: Rotation3<f64>,
    tan_half_h: f64,
    tan_half_v: f64,
}

impl CameraProjector {
    /// Unit viewing ray in camera-local space
    #[inline]
    pub fn local_ray(&self, u: f64, v: f64) -> Vector3<f64> {
        let x = self.tan_half_h * (2.0 * u - 1.0);
        let y = self.tan_half_v * (1.0 - 2.0 * v);
        Vector3::new(x, y, 1.0).normalize()
    }

    /// Unit viewing ray in world space
    #[inline]
    pub fn world_ray(&self, u: f64, v: f64) -> Vector3<f64> {
        self.rotation * self.local_ray(u, v)
    }

    /// `(yaw, pitch)` seen through normalized image point `(u, v)`
    #[inline]
    pub fn image_to_sphere(&self, u: f64, v: f64) -> (f64, f64) {
        ray_to_angles(&self.world_ray(u, v))
    }

    /// Normalized image point of a world direction, `None` behind the camera.
    ///
    /// Points outside the frustum return coordinates outside `[0, 1]`.
    pub fn ray_to_image(&self, ray: &Vector3<f64>) -> Option<(f64, f64)> {
        let local = self.rotation.inverse_transform_vector(ray);
        if local.z <= 1e-12 {
            return None;
        }
        let x = local.x / local.z;
        let y = local.y / local.z;
        let u = (x / self.tan_half_h + 1.0) / 2.0;
        let v = (1.0 - y / self.tan_half_v) / 2.0;
        Some((u, v))
    }

    pub fn sphere_to_image(&self, yaw: f64, pitch: f64) -> Option<(f64, f64)> {
        self.ray_to_image(&angles_to_ray(yaw, pitch))
    }
}

/// `(yaw, pitch)` of a unit direction
#[inline]
pub fn ray_to_angles(ray: &Vector3<f64>) -> (f64, f64) {
    let yaw = ray.x.atan2(ray.z);
    let pitch = ray.y.clamp(-1.0, 1.0).asin();
    (yaw, pitch)
}

/// Unit direction of `(yaw, pitch)`
#[inline]
pub fn angles_to_ray(yaw: f64, pitch: f64) -> Vector3<f64> {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let (sin_pitch, cos_pitch) = pitch.sin_cos();
    Vector3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_rejects_bad_fov() {
        assert!(CameraSpec::from_degrees(0.0, 45.0, 0.0, 0.0).validate().is_err());
        assert!(CameraSpec::from_degrees(45.0, 180.0, 0.0, 0.0).validate().is_err());
        assert!(CameraSpec::from_degrees(-10.0, 45.0, 0.0, 0.0).projector().is_err());
        assert!(CameraSpec::new(f64::NAN, 0.5, 0.0, 0.0).validate().is_err());
        assert!(CameraSpec::from_degrees(179.0, 1.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_optical_center_maps_to_offsets() {
        for &(yaw, pitch) in &[(0.0, 0.0), (45.0, 0.0), (-135.0, 20.0), (170.0, -60.0), (90.0, 89.0)] {
            let cam = CameraSpec::from_degrees(60.0, 45.0, yaw, pitch);
            let (y, p) = cam.projector().unwrap().image_to_sphere(0.5, 0.5);
            assert!((y - f64::to_radians(yaw)).abs() < EPS, "yaw {} -> {}", yaw, y.to_degrees());
            assert!((p - f64::to_radians(pitch)).abs() < EPS, "pitch {} -> {}", pitch, p.to_degrees());
        }
    }

    #[test]
    fn test_image_axes_orientation() {
        let cam = CameraSpec::from_degrees(90.0, 90.0, 0.0, 0.0).projector().unwrap();
        // right edge center is yaw +45°
        let (yaw, pitch) = cam.image_to_sphere(1.0, 0.5);
        assert!((yaw - f64::to_radians(45.0)).abs() < EPS);
        assert!(pitch.abs() < EPS);
        // top edge center is pitch +45°
        let (yaw, pitch) = cam.image_to_sphere(0.5, 0.0);
        assert!(yaw.abs() < EPS);
        assert!((pitch - f64::to_radians(45.0)).abs() < EPS);
    }

    #[test]
    fn test_inverse_mapping() {
        let cam = CameraSpec::from_degrees(70.0, 50.0, 123.0, -17.0).projector().unwrap();
        for &(u, v) in &[(0.1, 0.2), (0.5, 0.5), (0.9, 0.75), (0.0, 1.0)] {
            let (yaw, pitch) = cam.image_to_sphere(u, v);
            let (u2, v2) = cam.sphere_to_image(yaw, pitch).unwrap();
            assert!((u - u2).abs() < 1e-9);
            assert!((v - v2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_behind_camera() {
        let cam = CameraSpec::from_degrees(60.0, 60.0, 0.0, 0.0).projector().unwrap();
        assert!(cam.sphere_to_image(PI, 0.0).is_none());
    }

    #[test]
    fn test_angles_ray_roundtrip() {
        let (yaw, pitch) = ray_to_angles(&angles_to_ray(-2.5, 0.7));
        assert!((yaw + 2.5).abs() < EPS);
        assert!((pitch - 0.7).abs() < EPS);
    }
}
