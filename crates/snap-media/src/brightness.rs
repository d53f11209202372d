//! Light/dark classification of thumbnails.
//!
//! Clients pick overlay colours from the verdict, so an unreadable thumbnail
//! falls back to dark instead of failing the run.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Average luminance below which a thumbnail counts as dark.
pub const DARK_THRESHOLD: f64 = 80.0;

/// Upper bound of the sampling grid edge.
pub const MAX_SAMPLE_GRID: u32 = 100;

/// Outcome of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessVerdict {
    pub width: u32,
    pub height: u32,
    /// Mean luminance on a 0-255 scale, absent when the image could not be read
    pub average_brightness: Option<f64>,
    pub is_dark: bool,
}

impl BrightnessVerdict {
    /// Verdict used when the image cannot be measured.
    pub fn fallback(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            average_brightness: None,
            is_dark: true,
        }
    }
}

/// Classify an in-memory image.
///
/// The image is downsampled to an N x N grid with `N = min(width, height, 100)`
/// and each sample's luminance is the plain mean of its red, green and blue values.
pub fn classify_image(img: &DynamicImage) -> BrightnessVerdict {
    let (width, height) = img.dimensions();
    let n = width.min(height).min(MAX_SAMPLE_GRID);
    if n == 0 {
        return BrightnessVerdict::fallback(width, height);
    }

    let grid = if width == n && height == n {
        img.to_rgb8()
    } else {
        img.resize_exact(n, n, FilterType::Triangle).to_rgb8()
    };

    let total: f64 = grid
        .pixels()
        .map(|p| (f64::from(p[0]) + f64::from(p[1]) + f64::from(p[2])) / 3.0)
        .sum();
    let average = total / f64::from(n * n);

    BrightnessVerdict {
        width,
        height,
        average_brightness: Some(average),
        is_dark: average < DARK_THRESHOLD,
    }
}

/// Classify an image file, falling back to dark when it cannot be read.
pub fn classify_file(path: &Path) -> BrightnessVerdict {
    let (width, height) = match image::image_dimensions(path) {
        Ok(dims) => dims,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Could not read thumbnail dimensions, assuming dark"
            );
            return BrightnessVerdict::fallback(0, 0);
        }
    };

    match image::open(path) {
        Ok(img) => classify_image(&img),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Could not decode thumbnail, assuming dark"
            );
            BrightnessVerdict::fallback(width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn uniform(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
    }

    #[test]
    fn test_uniform_threshold() {
        for value in [0u8, 40, 79, 80, 81, 128, 255] {
            let verdict = classify_image(&uniform(50, 50, value));
            assert_eq!(verdict.is_dark, f64::from(value) < DARK_THRESHOLD, "value {}", value);
            assert_eq!(verdict.average_brightness, Some(f64::from(value)));
        }
    }

    #[test]
    fn test_downsampled_image() {
        let dark = classify_image(&uniform(512, 288, 30));
        assert!(dark.is_dark);
        assert_eq!((dark.width, dark.height), (512, 288));

        let light = classify_image(&uniform(512, 910, 200));
        assert!(!light.is_dark);
    }

    #[test]
    fn test_channels_are_unweighted() {
        // Pure green: weighted luma would be ~150, the plain mean is 85.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 255, 0])));
        let verdict = classify_image(&img);
        assert_eq!(verdict.average_brightness, Some(85.0));
        assert!(!verdict.is_dark);

        // Pure blue: plain mean 85 as well, weighted luma would be dark.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 255])));
        assert!(!classify_image(&img).is_dark);
    }

    #[test]
    fn test_unreadable_file_is_dark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumbnail.png");
        std::fs::write(&path, b"not a png").unwrap();

        let verdict = classify_file(&path);
        assert!(verdict.is_dark);
        assert!(verdict.average_brightness.is_none());

        let missing = classify_file(&dir.path().join("missing.png"));
        assert!(missing.is_dark);
    }

    #[test]
    fn test_classify_file_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumbnail.png");
        uniform(64, 36, 220).save(&path).unwrap();

        let verdict = classify_file(&path);
        assert!(!verdict.is_dark);
        assert_eq!((verdict.width, verdict.height), (64, 36));
    }
}
