//! Per-pixel intensity gradient: magnitude and orientation.
//!
//! The image is correlated with a horizontal and a vertical first
//! derivative kernel through `imageproc::filter::filter_clamped`, which
//! replicates the nearest border pixel for out-of-range taps. A uniform
//! image therefore has zero gradient everywhere, including the border
//! rows and columns.
//!
//! Two kernels are available:
//!
//! - [`GradientKernel::Sobel`]: the fixed 3x3 Sobel pair.
//! - [`GradientKernel::GaussianDerivative`]: a 1D derivative-of-Gaussian
//!   row (and its transpose), smoother for larger `sigma`.

use image::{GrayImage, Luma, Primitive};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel::{self, Kernel};
use serde::{Deserialize, Serialize};

/// First-derivative kernel used to estimate the gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientKernel {
    /// 3x3 Sobel operator.
    #[default]
    Sobel,
    /// Derivative of a Gaussian with the given standard deviation.
    /// Taps span `ceil(3 * sigma)` pixels either side of center.
    GaussianDerivative {
        /// Standard deviation in pixels. Must be positive.
        sigma: f32,
    },
}

/// Build `x * exp(-x^2 / 2 sigma^2)` over `x in [-r, r]`, `r = ceil(3 sigma)`,
/// normalized so the absolute taps sum to one.
///
/// Positive taps sit on the `+x` side, so correlation yields a positive
/// response where intensity increases along the axis.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn gaussian_derivative_taps(sigma: f32) -> Vec<f32> {
    let sigma = sigma.max(f32::EPSILON);
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|x| {
            let x = x as f32;
            x * (-(x * x) / two_sigma_sq).exp()
        })
        .collect();
    let norm: f32 = taps.iter().map(|t| t.abs()).sum();
    if norm > 0.0 {
        for t in &mut taps {
            *t /= norm;
        }
    }
    taps
}

/// Horizontal and vertical derivatives of `image`.
fn derivatives(
    image: &GrayImage,
    gradient_kernel: GradientKernel,
) -> (Image<Luma<f32>>, Image<Luma<f32>>) {
    match gradient_kernel {
        GradientKernel::Sobel => {
            // |response| <= 4 * 255, well inside i16.
            let gx = filter_clamped::<_, i32, i16>(image, kernel::SOBEL_HORIZONTAL_3X3);
            let gy = filter_clamped::<_, i32, i16>(image, kernel::SOBEL_VERTICAL_3X3);
            (to_f32(&gx), to_f32(&gy))
        }
        GradientKernel::GaussianDerivative { sigma } => {
            let taps = gaussian_derivative_taps(sigma);
            #[allow(clippy::cast_possible_truncation)]
            let len = taps.len() as u32;
            let intensity = to_f32(image);
            let gx = filter_clamped::<_, f32, f32>(&intensity, Kernel::new(taps.as_slice(), len, 1));
            let gy = filter_clamped::<_, f32, f32>(&intensity, Kernel::new(taps.as_slice(), 1, len));
            (gx, gy)
        }
    }
}

fn to_f32<T: Primitive + Into<f32>>(image: &Image<Luma<T>>) -> Image<Luma<f32>> {
    Image::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y).0[0].into()])
    })
}

/// Gradient magnitude and orientation for one image.
///
/// Both rasters have the source image's dimensions. Magnitude is
/// non-negative; orientation is `atan2(gy, gx)` in `(-pi, pi]`.
#[derive(Debug, Clone)]
pub struct GradientField {
    magnitude: Image<Luma<f32>>,
    orientation: Image<Luma<f32>>,
}

impl GradientField {
    /// Compute the gradient field of a grayscale image.
    #[must_use]
    pub fn compute(image: &GrayImage, kernel: GradientKernel) -> Self {
        let (gx, gy) = derivatives(image, kernel);
        Self::from_derivatives(&gx, &gy)
    }

    /// Build a field from precomputed horizontal and vertical derivatives.
    ///
    /// The two rasters must have equal dimensions.
    #[must_use]
    pub fn from_derivatives(gx: &Image<Luma<f32>>, gy: &Image<Luma<f32>>) -> Self {
        debug_assert_eq!(gx.dimensions(), gy.dimensions());
        let (w, h) = gx.dimensions();
        let magnitude = Image::from_fn(w, h, |x, y| {
            Luma([gx.get_pixel(x, y).0[0].hypot(gy.get_pixel(x, y).0[0])])
        });
        let orientation = Image::from_fn(w, h, |x, y| {
            Luma([gy.get_pixel(x, y).0[0].atan2(gx.get_pixel(x, y).0[0])])
        });
        Self {
            magnitude,
            orientation,
        }
    }

    /// Gradient magnitude raster.
    #[must_use]
    pub const fn magnitude(&self) -> &Image<Luma<f32>> {
        &self.magnitude
    }

    /// Gradient orientation raster, radians.
    #[must_use]
    pub const fn orientation(&self) -> &Image<Luma<f32>> {
        &self.orientation
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.magnitude.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.magnitude.height()
    }

    /// Largest magnitude in the field, `0.0` for an empty or flat image.
    #[must_use]
    pub fn max_magnitude(&self) -> f32 {
        max_value(&self.magnitude)
    }
}

/// Largest value in a float raster, floored at zero.
pub(crate) fn max_value(image: &Image<Luma<f32>>) -> f32 {
    image.pixels().map(|p| p.0[0]).fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use super::*;

    fn vertical_step(width: u32, height: u32, at: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([if x < at { 0 } else { 200 }]))
    }

    #[test]
    fn flat_image_has_zero_gradient() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let field = GradientField::compute(&img, GradientKernel::Sobel);
        assert_eq!(field.width(), 4);
        assert_eq!(field.height(), 4);
        assert!(field.magnitude().pixels().all(|p| p.0[0] == 0.0));
        assert!(field.max_magnitude().abs() < f32::EPSILON);
    }

    #[test]
    fn border_replication_keeps_flat_border_flat() {
        let img = GrayImage::from_pixel(6, 5, Luma([173]));
        for kernel in [
            GradientKernel::Sobel,
            GradientKernel::GaussianDerivative { sigma: 1.0 },
        ] {
            let field = GradientField::compute(&img, kernel);
            assert!(
                field.magnitude().pixels().all(|p| p.0[0].abs() < 1e-4),
                "{kernel:?} produced a border response on a flat image",
            );
        }
    }

    #[test]
    fn sobel_vertical_step_points_along_x() {
        let img = vertical_step(10, 10, 5);
        let field = GradientField::compute(&img, GradientKernel::Sobel);
        // Sobel response to a 200-level step is 4 * 200.
        let m = field.magnitude().get_pixel(5, 5).0[0];
        assert!((m - 800.0).abs() < 1e-3, "magnitude {m}");
        let phi = field.orientation().get_pixel(5, 5).0[0];
        assert!(phi.abs() < 1e-6, "orientation {phi}");
        // Far from the step the field is flat.
        assert!(field.magnitude().get_pixel(1, 5).0[0].abs() < f32::EPSILON);
    }

    #[test]
    fn horizontal_step_points_along_y() {
        let img = GrayImage::from_fn(10, 10, |_, y| Luma([if y < 5 { 0 } else { 90 }]));
        let field = GradientField::compute(&img, GradientKernel::Sobel);
        let phi = field.orientation().get_pixel(4, 5).0[0];
        assert!((phi - FRAC_PI_2).abs() < 1e-6, "orientation {phi}");
    }

    #[test]
    fn falling_step_points_backwards() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 200 } else { 0 }]));
        let field = GradientField::compute(&img, GradientKernel::Sobel);
        let phi = field.orientation().get_pixel(5, 5).0[0];
        assert!((phi.abs() - PI).abs() < 1e-6, "orientation {phi}");
    }

    #[test]
    fn gaussian_derivative_taps_are_odd_and_normalized() {
        let taps = gaussian_derivative_taps(1.0);
        assert_eq!(taps.len(), 7);
        let abs_sum: f32 = taps.iter().map(|t| t.abs()).sum();
        assert!((abs_sum - 1.0).abs() < 1e-6);
        for i in 0..taps.len() {
            assert!((taps[i] + taps[taps.len() - 1 - i]).abs() < 1e-6);
        }
        assert!(taps[6] > 0.0);
    }

    #[test]
    fn gaussian_derivative_responds_to_step() {
        let img = vertical_step(16, 8, 8);
        let field =
            GradientField::compute(&img, GradientKernel::GaussianDerivative { sigma: 1.5 });
        let at_step = field.magnitude().get_pixel(8, 4).0[0];
        let far = field.magnitude().get_pixel(1, 4).0[0];
        assert!(at_step > 10.0, "expected a response at the step, got {at_step}");
        assert!(far < at_step / 10.0);
        assert!(field.orientation().get_pixel(8, 4).0[0].abs() < 1e-6);
    }

    #[test]
    fn orientation_range_is_half_open() {
        let img = GrayImage::from_fn(9, 9, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        let field = GradientField::compute(&img, GradientKernel::Sobel);
        for p in field.orientation().pixels() {
            assert!(p.0[0] > -PI - 1e-6 && p.0[0] <= PI + 1e-6);
        }
        assert!(field.magnitude().pixels().all(|p| p.0[0] >= 0.0));
    }
}
