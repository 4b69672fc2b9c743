//! Angular back-projection of flat boxes onto the sphere
//!
//! The gnomonic mapping is non-linear, so a flat box becomes a curved patch
//! on the sphere. The patch is approximated by the yaw/pitch bounding box of
//! the four projected corners.

use std::f64::consts::FRAC_PI_2;

use super::{FlatDetection, NormalizedBox, SphereDetection};
use crate::error::{PanoOcrError, Result};
use crate::geometry::{CameraProjector, CameraSpec, SphereRegion};

impl FlatDetection {
    /// Project this detection through the camera of view `view_index`
    pub fn to_sphere(&self, camera: &CameraSpec, view_index: usize) -> Result<SphereDetection> {
        self.validate()?;
        let projector = camera.projector()?;
        Ok(SphereDetection {
            text: self.text.clone(),
            confidence: self.confidence,
            engine_tag: self.engine_tag.clone(),
            region: project_box(&self.bbox, &projector),
            view_index,
        })
    }
}

/// Spherical region covered by a normalized box seen through `camera`
pub fn box_to_region(bbox: &NormalizedBox, camera: &CameraSpec) -> Result<SphereRegion> {
    bbox.validate()
        .map_err(|reason| PanoOcrError::MalformedDetection {
            text: String::new(),
            reason,
        })?;
    let projector = camera.projector()?;
    Ok(project_box(bbox, &projector))
}

fn project_box(bbox: &NormalizedBox, projector: &CameraProjector) -> SphereRegion {
    let angles = bbox.corners().map(|(u, v)| projector.image_to_sphere(u, v));

    let yaws = angles.map(|(yaw, _)| yaw);
    let mut pitch_min = angles.iter().map(|a| a.1).fold(f64::INFINITY, f64::min);
    let mut pitch_max = angles.iter().map(|a| a.1).fold(f64::NEG_INFINITY, f64::max);

    // A box around a pole sees every yaw and reaches the pole itself
    let mut around_pole = false;
    for pole in [FRAC_PI_2, -FRAC_PI_2] {
        if let Some((u, v)) = projector.sphere_to_image(0.0, pole) {
            if bbox.contains(u, v) {
                around_pole = true;
                pitch_min = pitch_min.min(pole);
                pitch_max = pitch_max.max(pole);
            }
        }
    }

    if around_pole {
        SphereRegion::full_yaw(pitch_min, pitch_max)
    } else {
        SphereRegion::from_yaw_samples(&yaws, pitch_min, pitch_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    #[test]
    fn test_center_point_roundtrip() {
        let camera = CameraSpec::from_degrees(45.0, 45.0, 67.5, -12.0);
        let point = NormalizedBox::from_edges(0.5, 0.5, 0.5, 0.5);
        let region = box_to_region(&point, &camera).unwrap();
        assert!(!region.wraps);
        assert!((region.yaw_min - camera.yaw_offset).abs() < EPS);
        assert!((region.yaw_max - camera.yaw_offset).abs() < EPS);
        assert!((region.pitch_min - camera.pitch_offset).abs() < EPS);
        assert!((region.pitch_max - camera.pitch_offset).abs() < EPS);
    }

    #[test]
    fn test_full_frame_matches_fov() {
        let camera = CameraSpec::from_degrees(60.0, 40.0, 0.0, 0.0);
        let frame = NormalizedBox::from_edges(0.0, 0.0, 1.0, 1.0);
        let region = box_to_region(&frame, &camera).unwrap();
        assert!((region.yaw_min + deg(30.0)).abs() < EPS);
        assert!((region.yaw_max - deg(30.0)).abs() < EPS);
        // corners sit slightly below the vertical half-fov at the edge centers
        assert!(region.pitch_max < deg(20.0) && region.pitch_max > deg(15.0));
        assert!((region.pitch_min + region.pitch_max).abs() < EPS);
    }

    #[test]
    fn test_seam_box_wraps() {
        // camera looks straight at the seam; box spans yaw 179°..181°
        let camera = CameraSpec::from_degrees(45.0, 45.0, 180.0, 0.0);
        let half = deg(1.0).tan() / deg(22.5).tan() / 2.0;
        let bbox = NormalizedBox::from_edges(0.5 - half, 0.45, 0.5 + half, 0.55);
        let region = box_to_region(&bbox, &camera).unwrap();
        assert!(region.wraps);
        assert!((region.yaw_min - deg(179.0)).abs() < 1e-6);
        assert!((region.yaw_max - deg(-179.0)).abs() < 1e-6);

        let wider = SphereRegion::wrapped(deg(175.0), deg(-175.0), region.pitch_min, region.pitch_max);
        let iou = region.iou(&wider);
        assert!(iou > 0.19, "iou across seam should be large, got {}", iou);
    }

    #[test]
    fn test_box_ending_on_seam_from_negative_half_turn() {
        let left = CameraSpec::from_degrees(60.0, 60.0, -180.0, 0.0);
        let right = CameraSpec::from_degrees(60.0, 60.0, 180.0, 0.0);
        let bbox = NormalizedBox::from_edges(0.4, 0.45, 0.5, 0.55);

        let a = box_to_region(&bbox, &left).unwrap();
        let b = box_to_region(&bbox, &right).unwrap();
        assert!(a.yaw_span() < deg(20.0), "span = {}", a.yaw_span().to_degrees());
        assert!(b.yaw_span() < deg(20.0), "span = {}", b.yaw_span().to_degrees());
        assert!(a.iou(&b) > 0.9, "iou = {}", a.iou(&b));
    }

    #[test]
    fn test_box_around_zenith() {
        let camera = CameraSpec::from_degrees(60.0, 60.0, 30.0, 90.0);
        let bbox = NormalizedBox::from_edges(0.4, 0.4, 0.6, 0.6);
        let region = box_to_region(&bbox, &camera).unwrap();
        assert!(!region.wraps);
        assert!((region.yaw_span() - std::f64::consts::TAU).abs() < EPS);
        assert!((region.pitch_max - FRAC_PI_2).abs() < EPS);
        assert!(region.pitch_min > deg(80.0));
    }

    #[test]
    fn test_to_sphere_keeps_metadata() {
        let camera = CameraSpec::from_degrees(45.0, 45.0, 0.0, 0.0);
        let detection = FlatDetection::new(
            "EXIT",
            0.75,
            NormalizedBox::from_edges(0.4, 0.4, 0.6, 0.5),
            "TEST",
        );
        let sphere = detection.to_sphere(&camera, 7).unwrap();
        assert_eq!(sphere.text, "EXIT");
        assert_eq!(sphere.view_index, 7);
        assert_eq!(sphere.engine_tag, "TEST");
        assert!(sphere.region.yaw_min < 0.0 && sphere.region.yaw_max > 0.0);
    }

    #[test]
    fn test_to_sphere_rejects_malformed_box() {
        let camera = CameraSpec::from_degrees(45.0, 45.0, 0.0, 0.0);
        let mut bbox = NormalizedBox::from_edges(0.4, 0.4, 0.6, 0.5);
        bbox.right = 0.3;
        let detection = FlatDetection::new("EXIT", 0.75, bbox, "TEST");
        assert!(matches!(
            detection.to_sphere(&camera, 0),
            Err(PanoOcrError::MalformedDetection { .. })
        ));
    }

    #[test]
    fn test_to_sphere_propagates_bad_camera() {
        let camera = CameraSpec::from_degrees(45.0, 200.0, 0.0, 0.0);
        let detection = FlatDetection::new(
            "EXIT",
            0.75,
            NormalizedBox::from_edges(0.4, 0.4, 0.6, 0.5),
            "TEST",
        );
        assert!(matches!(
            detection.to_sphere(&camera, 0),
            Err(PanoOcrError::InvalidSpec { .. })
        ));
    }
}
