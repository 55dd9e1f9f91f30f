//! Gaussian pre-blur before gradient estimation.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] to suppress pixel noise
//! that would otherwise seed spurious strong edges in the Hough variant.

use image::GrayImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || !sigma.is_finite() {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}
