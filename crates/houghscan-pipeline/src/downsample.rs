//! Image size reduction ahead of edge detection.
//!
//! Two reductions apply, in order:
//!
//! 1. [`limit_pixels`] caps the total pixel count, scaling both axes by
//!    `sqrt(max_pixels / (W * H))` so very large scans do not dominate a
//!    batch run.
//! 2. [`scale_down`] divides both axes by a fixed integer, the working
//!    scale of the Hough variant.
//!
//! Both preserve aspect ratio and never produce a zero-sized image.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Resampling filter used when reducing an image.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, averages neighboring pixels.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Scale `image` down so it has at most `max_pixels` pixels.
///
/// Returns the (possibly unchanged) image and whether a resize was
/// applied.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn limit_pixels(
    image: &GrayImage,
    max_pixels: u64,
    filter: DownsampleFilter,
) -> (GrayImage, bool) {
    let (w, h) = image.dimensions();
    let pixels = u64::from(w) * u64::from(h);
    if pixels <= max_pixels || pixels == 0 {
        return (image.clone(), false);
    }
    let scale = (max_pixels as f64 / pixels as f64).sqrt();
    let new_w = ((f64::from(w) * scale) as u32).max(1);
    let new_h = ((f64::from(h) * scale) as u32).max(1);
    let resized = image::imageops::resize(image, new_w, new_h, filter.to_image_filter());
    (resized, true)
}

/// Divide both axes by `divisor` (floored, at least one pixel).
///
/// A divisor of 0 or 1 returns the image unchanged.
#[must_use]
pub fn scale_down(image: &GrayImage, divisor: u32, filter: DownsampleFilter) -> GrayImage {
    if divisor <= 1 {
        return image.clone();
    }
    let new_w = (image.width() / divisor).max(1);
    let new_h = (image.height() / divisor).max(1);
    image::imageops::resize(image, new_w, new_h, filter.to_image_filter())
}
