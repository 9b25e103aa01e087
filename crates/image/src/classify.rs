//! Photo/graphic classification from sampled color variance.

use crate::DecodedSurface;
use serde::{Deserialize, Serialize};

/// Variance above which an image counts as a photo.
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 2000.0;

/// Number of pixels sampled for classification.
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Coarse content class used to order the optimizer's levers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageClass {
    /// High color variance; tolerates quality loss
    Photo,
    /// Flat colors; tolerates downscaling better than artifacts
    Graphic,
}

/// Summed per-channel variance of an evenly spaced grid of pixels.
///
/// At most `sample_count` pixels are read. The grid has roughly
/// `sqrt(sample_count)` columns and rows.
pub fn color_variance(surface: &DecodedSurface, sample_count: usize) -> f64 {
    let (width, height) = surface.dimensions();
    if width == 0 || height == 0 || sample_count == 0 {
        return 0.0;
    }

    let side = ((sample_count as f64).sqrt().round() as u32).max(1);
    let step_x = (width / side).max(1) as usize;
    let step_y = (height / side).max(1) as usize;

    let pixels = surface.pixels();
    let samples: Vec<[f64; 3]> = (0..height)
        .step_by(step_y)
        .flat_map(|y| (0..width).step_by(step_x).map(move |x| (x, y)))
        .take(sample_count)
        .map(|(x, y)| {
            let p = pixels.get_pixel(x, y);
            [p[0] as f64, p[1] as f64, p[2] as f64]
        })
        .collect();

    let n = samples.len() as f64;
    let mut mean = [0.0f64; 3];
    for s in &samples {
        for c in 0..3 {
            mean[c] += s[c];
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let sum: f64 = samples
        .iter()
        .map(|s| (0..3).map(|c| (s[c] - mean[c]).powi(2)).sum::<f64>())
        .sum();
    sum / n
}

/// Classify a surface as photo or graphic.
pub fn classify(surface: &DecodedSurface, sample_count: usize, threshold: f64) -> ImageClass {
    if color_variance(surface, sample_count) > threshold {
        ImageClass::Photo
    } else {
        ImageClass::Graphic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn noise(width: u32, height: u32) -> DecodedSurface {
        let mut state: u32 = 0x1234_5678;
        DecodedSurface::new(RgbaImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            };
            Rgba([next(), next(), next(), 255])
        }))
    }

    #[test]
    fn test_flat_color_is_graphic() {
        let surface = DecodedSurface::new(RgbaImage::from_pixel(200, 200, Rgba([40, 90, 200, 255])));
        assert_eq!(color_variance(&surface, DEFAULT_SAMPLE_COUNT), 0.0);
        assert_eq!(
            classify(&surface, DEFAULT_SAMPLE_COUNT, DEFAULT_VARIANCE_THRESHOLD),
            ImageClass::Graphic
        );
    }

    #[test]
    fn test_noise_is_photo() {
        let surface = noise(160, 120);
        assert!(color_variance(&surface, DEFAULT_SAMPLE_COUNT) > DEFAULT_VARIANCE_THRESHOLD);
        assert_eq!(
            classify(&surface, DEFAULT_SAMPLE_COUNT, DEFAULT_VARIANCE_THRESHOLD),
            ImageClass::Photo
        );
    }

    #[test]
    fn test_tiny_image_does_not_oversample() {
        let surface = noise(3, 2);
        let variance = color_variance(&surface, DEFAULT_SAMPLE_COUNT);
        assert!(variance.is_finite());
    }

    #[test]
    fn test_threshold_is_tunable() {
        let surface = noise(64, 64);
        assert_eq!(classify(&surface, 100, f64::MAX), ImageClass::Graphic);
        assert_eq!(classify(&surface, 100, 0.0), ImageClass::Photo);
    }
}
