//! 8-bit storage forms of float rasters.
//!
//! Persisted artifacts keep every raster as `u8`:
//!
//! - magnitudes are divided by their maximum and scaled to `0..=255`;
//! - orientations map `(-pi, pi]` linearly onto `0..=255`;
//! - any raster can be strided to keep every `n`-th row and column.

use std::f32::consts::PI;

use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::definitions::Image;

use crate::gradient::max_value;

/// Guard against division by zero for flat rasters.
const EPSILON: f32 = 1e-8;

/// Keep every `step`-th pixel on both axes, starting at `(0, 0)`.
///
/// The result is `ceil(W / step)` by `ceil(H / step)`. A step of
/// 0 or 1 copies the raster.
#[must_use]
pub fn stride<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, step: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let step = step.max(1);
    let (w, h) = image.dimensions();
    ImageBuffer::from_fn(w.div_ceil(step), h.div_ceil(step), |x, y| {
        *image.get_pixel(x * step, y * step)
    })
}

/// Scale a non-negative raster by its maximum into `0..=255`.
///
/// An all-zero raster maps to all zeros.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_by_max(image: &Image<Luma<f32>>) -> GrayImage {
    let scale = 255.0 / (max_value(image) + EPSILON);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([(image.get_pixel(x, y).0[0] * scale).clamp(0.0, 255.0) as u8])
    })
}

/// Map orientations in radians onto `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_orientation(image: &Image<Luma<f32>>) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let phi = image.get_pixel(x, y).0[0];
        Luma([((phi + PI) / (2.0 * PI) * 255.0).clamp(0.0, 255.0) as u8])
    })
}
