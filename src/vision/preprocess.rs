//! Image preprocessing for OCR models
//!
//! Handles image resizing, normalization, and tensor conversion for PaddleOCR models.

use image::RgbImage;
use ndarray::{s, Array3, Array4};

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest side of the detection input
    pub det_max_side: u32,
    /// Target height for recognition model (typically 32 or 48)
    pub rec_target_height: u32,
    /// Maximum width for recognition
    pub rec_max_width: u32,
    /// Detection normalization [R, G, B] (ImageNet)
    pub det_mean: [f32; 3],
    pub det_std: [f32; 3],
    /// Recognition normalization: (pixel / 255.0 - 0.5) / 0.5
    pub rec_mean: [f32; 3],
    pub rec_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            det_max_side: 960,
            rec_target_height: 48,
            rec_max_width: 960,
            det_mean: [0.485, 0.456, 0.406],
            det_std: [0.229, 0.224, 0.225],
            rec_mean: [0.5, 0.5, 0.5],
            rec_std: [0.5, 0.5, 0.5],
        }
    }
}

/// Convert an RGB image to an HWC f32 array in 0-1
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
    })
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let mut normalized = image.clone();
    for ((_, _, c), value) in normalized.indexed_iter_mut() {
        *value = (*value - mean[c]) / std[c];
    }
    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));
    for ((y, x, ch), &value) in image.indexed_iter() {
        tensor[[0, ch, y, x]] = value;
    }
    tensor
}

/// Bilinear resize of an HWC array
pub fn resize_bilinear(image: &Array3<f32>, new_h: usize, new_w: usize) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let mut resized = Array3::<f32>::zeros((new_h, new_w, c));
    if h == 0 || w == 0 || new_h == 0 || new_w == 0 {
        return resized;
    }

    let scale_y = h as f32 / new_h as f32;
    let scale_x = w as f32 / new_w as f32;

    for y in 0..new_h {
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (h - 1) as f32);
        let y0 = src_y.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let fy = src_y - y0 as f32;

        for x in 0..new_w {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (w - 1) as f32);
            let x0 = src_x.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let fx = src_x - x0 as f32;

            for ch in 0..c {
                let v0 = image[[y0, x0, ch]] * (1.0 - fx) + image[[y0, x1, ch]] * fx;
                let v1 = image[[y1, x0, ch]] * (1.0 - fx) + image[[y1, x1, ch]] * fx;
                resized[[y, x, ch]] = v0 * (1.0 - fy) + v1 * fy;
            }
        }
    }

    resized
}

/// Detection input size: longest side at most `max_side`, both sides
/// rounded to a multiple of 32 (at least 32)
pub fn detection_size(width: u32, height: u32, max_side: u32) -> (usize, usize) {
    let longest = width.max(height).max(1) as f32;
    let scale = if longest > max_side as f32 {
        max_side as f32 / longest
    } else {
        1.0
    };
    let round32 = |v: f32| (((v / 32.0).round() as usize) * 32).max(32);
    (round32(height as f32 * scale), round32(width as f32 * scale))
}

/// Resize for the detection model; returns the resized image and the
/// (x, y) factors mapping detection-map pixels back to the input image
pub fn resize_for_detection(image: &Array3<f32>, max_side: u32) -> (Array3<f32>, (f32, f32)) {
    let (h, w, _) = image.dim();
    let (new_h, new_w) = detection_size(w as u32, h as u32, max_side);
    let resized = resize_bilinear(image, new_h, new_w);
    (resized, (w as f32 / new_w as f32, h as f32 / new_h as f32))
}

/// Resize image for recognition model (fixed height, variable width)
pub fn resize_for_recognition(image: &Array3<f32>, target_height: u32, max_width: u32) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let scale = target_height as f32 / h.max(1) as f32;
    let new_w = ((w as f32 * scale).ceil() as usize).clamp(1, max_width.max(1) as usize);
    resize_bilinear(image, target_height as usize, new_w)
}

/// Crop a pixel rectangle `[x0, x1) × [y0, y1)`, clamped to the image
pub fn crop(image: &Array3<f32>, x0: usize, y0: usize, x1: usize, y1: usize) -> Option<Array3<f32>> {
    let (h, w, _) = image.dim();
    let (x1, y1) = (x1.min(w), y1.min(h));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(image.slice(s![y0..y1, x0..x1, ..]).to_owned())
}

/// Full preprocessing pipeline for detection
pub fn preprocess_for_detection(image: &RgbImage, config: &PreprocessConfig) -> (Array4<f32>, (f32, f32)) {
    let rgb = rgb_to_f32(image);
    let (resized, ratio) = resize_for_detection(&rgb, config.det_max_side);
    let normalized = normalize(&resized, &config.det_mean, &config.det_std);
    (hwc_to_nchw(&normalized), ratio)
}

/// Full preprocessing pipeline for recognition of a 0-1 HWC crop
pub fn preprocess_for_recognition(crop: &Array3<f32>, config: &PreprocessConfig) -> Array4<f32> {
    let resized = resize_for_recognition(crop, config.rec_target_height, config.rec_max_width);
    let normalized = normalize(&resized, &config.rec_mean, &config.rec_std);
    hwc_to_nchw(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_rgb_to_f32() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 0]));

        let rgb = rgb_to_f32(&image);
        assert_eq!(rgb.dim(), (2, 2, 3));
        assert!((rgb[[0, 0, 0]] - 1.0).abs() < 0.01);
        assert!(rgb[[0, 0, 1]].abs() < 0.01);
        assert!((rgb[[0, 1, 1]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_hwc_to_nchw() {
        let hwc = Array3::<f32>::from_shape_fn((10, 20, 3), |(h, w, c)| (h * 100 + w * 10 + c) as f32);
        let nchw = hwc_to_nchw(&hwc);
        assert_eq!(nchw.dim(), (1, 3, 10, 20));
        assert_eq!(nchw[[0, 1, 5, 10]], hwc[[5, 10, 1]]);
    }

    #[test]
    fn test_normalize() {
        let image = Array3::<f32>::from_elem((2, 2, 3), 0.5);
        let config = PreprocessConfig::default();
        let normalized = normalize(&image, &config.det_mean, &config.det_std);
        assert!((normalized[[0, 0, 0]] - (0.5 - 0.485) / 0.229).abs() < 1e-5);

        let rec = normalize(&image, &config.rec_mean, &config.rec_std);
        assert!(rec[[1, 1, 2]].abs() < 1e-6);
    }

    #[test]
    fn test_detection_size_multiple_of_32() {
        assert_eq!(detection_size(640, 480, 960), (480, 640));
        assert_eq!(detection_size(1920, 1080, 960), (544, 960));
        assert_eq!(detection_size(10, 10, 960), (32, 32));
    }

    #[test]
    fn test_resize_for_recognition_keeps_aspect() {
        let crop = Array3::<f32>::from_elem((24, 100, 3), 1.0);
        let resized = resize_for_recognition(&crop, 48, 960);
        assert_eq!(resized.dim(), (48, 200, 3));
        assert!((resized[[10, 10, 0]] - 1.0).abs() < 1e-6);

        let capped = resize_for_recognition(&crop, 48, 120);
        assert_eq!(capped.dim(), (48, 120, 3));
    }

    #[test]
    fn test_crop_clamps() {
        let image = Array3::<f32>::from_shape_fn((10, 10, 3), |(y, x, _)| (y * 10 + x) as f32);
        let cropped = crop(&image, 8, 8, 20, 20).unwrap();
        assert_eq!(cropped.dim(), (2, 2, 3));
        assert_eq!(cropped[[0, 0, 0]], 88.0);
        assert!(crop(&image, 5, 5, 5, 9).is_none());
    }
}
