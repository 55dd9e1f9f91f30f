//! Dense polar-parameter Hough accumulator over a binary edge map.
//!
//! Every edge pixel `(x, y)` votes once in each of `num_theta` angle
//! bins, at the distance bin its line through that angle falls in:
//!
//! ```text
//! theta_j = -pi/2 + j * pi / num_theta          j in 0..num_theta
//! rho     = x cos(theta_j) + y sin(theta_j)
//! bin     = round((rho + D) / (2 D) * (num_rho - 1)),  clamped
//! D       = ceil(sqrt(W^2 + H^2))
//! ```
//!
//! Each pixel therefore contributes its whole sinusoid rather than a
//! single line membership, which is what the similarity and
//! visualization consumers want. Collinear pixels pile up where their
//! sinusoids cross; [`suppress_non_maximum`] sharpens those crossings.
//!
//! The accumulator is an image whose rows are distance bins and whose
//! columns are angle bins, so `acc.get_pixel(theta, rho)`.

use std::f64::consts::{FRAC_PI_2, PI};

use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Vote counts, `num_theta` wide and `num_rho` tall.
pub type Accumulator = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Accumulator bin counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Number of distance bins.
    pub num_rho: u32,
    /// Number of angle bins spanning `[-pi/2, pi/2)`.
    pub num_theta: u32,
}

impl HoughConfig {
    /// Default number of distance bins.
    pub const DEFAULT_NUM_RHO: u32 = 180;
    /// Default number of angle bins.
    pub const DEFAULT_NUM_THETA: u32 = 180;

    /// Reject zero bin counts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either count is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.num_rho == 0 || self.num_theta == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "hough bin counts must be positive, got num_rho={} num_theta={}",
                self.num_rho, self.num_theta,
            )));
        }
        Ok(())
    }

    /// Angle of bin `j` in radians.
    #[must_use]
    pub fn theta(&self, j: u32) -> f64 {
        f64::from(j).mul_add(PI / f64::from(self.num_theta), -FRAC_PI_2)
    }

    /// Distance bin for `rho` given the maximum distance `d`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rho_bin(&self, rho: f64, d: f64) -> u32 {
        let top = f64::from(self.num_rho - 1);
        let bin = ((rho + d) / (2.0 * d) * top).round();
        bin.clamp(0.0, top) as u32
    }
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            num_rho: Self::DEFAULT_NUM_RHO,
            num_theta: Self::DEFAULT_NUM_THETA,
        }
    }
}

/// Largest perpendicular distance from the origin to any pixel,
/// `ceil(sqrt(W^2 + H^2))`.
#[must_use]
pub fn max_distance(width: u32, height: u32) -> u32 {
    let (w, h) = (u64::from(width), u64::from(height));
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let d = ((w * w + h * h) as f64).sqrt().ceil() as u32;
    d
}

/// Vote every nonzero pixel of `edges` into a fresh accumulator.
///
/// An edge map with no set pixels returns an all-zero accumulator
/// without entering the voting loop.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for zero bin counts.
pub fn accumulate(edges: &GrayImage, config: HoughConfig) -> Result<Accumulator, PipelineError> {
    config.validate()?;
    let mut acc = Accumulator::new(config.num_theta, config.num_rho);

    let points: Vec<(f64, f64)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (f64::from(x), f64::from(y)))
        .collect();
    if points.is_empty() {
        return Ok(acc);
    }

    let d = f64::from(max_distance(edges.width(), edges.height()).max(1));
    let trig: Vec<(f64, f64)> = (0..config.num_theta)
        .map(|j| {
            let theta = config.theta(j);
            (theta.cos(), theta.sin())
        })
        .collect();

    for &(x, y) in &points {
        for (j, &(cos_t, sin_t)) in (0u32..).zip(&trig) {
            let rho = x.mul_add(cos_t, y * sin_t);
            let bin = config.rho_bin(rho, d);
            acc.get_pixel_mut(j, bin).0[0] += 1;
        }
    }
    Ok(acc)
}

/// Zero every cell that is not the maximum of its 3x3 neighborhood.
///
/// Cells outside the accumulator count as zero. A cell equal to the
/// neighborhood maximum is kept, so plateaus survive intact.
#[must_use]
pub fn suppress_non_maximum(acc: &Accumulator) -> Accumulator {
    let (w, h) = acc.dimensions();
    Accumulator::from_fn(w, h, |x, y| {
        let v = acc.get_pixel(x, y).0[0];
        if v == 0 {
            return Luma([0]);
        }
        let x0 = x.saturating_sub(1);
        let y0 = y.saturating_sub(1);
        let x1 = (x + 1).min(w - 1);
        let y1 = (y + 1).min(h - 1);
        let neighborhood_max = (y0..=y1)
            .flat_map(|ny| (x0..=x1).map(move |nx| (nx, ny)))
            .map(|(nx, ny)| acc.get_pixel(nx, ny).0[0])
            .max()
            .unwrap_or(0);
        if v < neighborhood_max {
            Luma([0])
        } else {
            Luma([v])
        }
    })
}

/// Clip counts into `0..=255` for compact storage.
#[must_use]
pub fn clip_to_u8(acc: &Accumulator) -> GrayImage {
    let (w, h) = acc.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        Luma([u8::try_from(acc.get_pixel(x, y).0[0]).unwrap_or(u8::MAX)])
    })
}

/// Strongest cell as `(rho_bin, theta_bin, votes)`, or `None` for an
/// all-zero accumulator. Ties resolve to the first cell in row-major
/// order.
#[must_use]
pub fn peak(acc: &Accumulator) -> Option<(u32, u32, u32)> {
    acc.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .fold(None, |best, (theta, rho, p)| match best {
            Some((_, _, v)) if v >= p.0[0] => best,
            _ => Some((rho, theta, p.0[0])),
        })
}
