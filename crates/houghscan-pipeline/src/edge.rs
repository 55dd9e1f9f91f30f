//! Thin binary edge maps from a gradient field.
//!
//! Two stages, in order:
//!
//! 1. [`non_maximum_suppression`] keeps a pixel's magnitude only when it
//!    is at least as large as both neighbors along its quantized gradient
//!    direction. Neighbors outside the image read as zero.
//! 2. [`hysteresis`] marks strong pixels (`>= high`) and grows them
//!    through 8-connected weak pixels (`>= low`) with an explicit stack.
//!
//! Thresholds are fractions of the largest suppressed magnitude, so the
//! same pair works for any kernel scale or image contrast.
//!
//! Output is a binary image: 255 for edge pixels, 0 elsewhere.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;

use crate::gradient::{GradientField, max_value};
use crate::types::Thresholds;

/// Edge pixel value in the binary map.
pub const EDGE: u8 = 255;

/// Quantized gradient direction, folded into `[0, 180)` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Gradient near 0 degrees: compare left and right.
    Horizontal,
    /// Gradient near 45 degrees (down-right in image space).
    Diagonal,
    /// Gradient near 90 degrees: compare up and down.
    Vertical,
    /// Gradient near 135 degrees (down-left in image space).
    AntiDiagonal,
}

impl Direction {
    /// Quantize an orientation in radians using boundaries at 22.5,
    /// 67.5, 112.5 and 157.5 degrees.
    #[must_use]
    pub fn from_orientation(radians: f32) -> Self {
        let degrees = radians.to_degrees().rem_euclid(180.0);
        if (22.5..67.5).contains(&degrees) {
            Self::Diagonal
        } else if (67.5..112.5).contains(&degrees) {
            Self::Vertical
        } else if (112.5..157.5).contains(&degrees) {
            Self::AntiDiagonal
        } else {
            Self::Horizontal
        }
    }

    /// Offsets of the two neighbors compared during suppression.
    #[must_use]
    pub const fn neighbor_offsets(self) -> [(i64, i64); 2] {
        match self {
            Self::Horizontal => [(-1, 0), (1, 0)],
            Self::Diagonal => [(-1, -1), (1, 1)],
            Self::Vertical => [(0, -1), (0, 1)],
            Self::AntiDiagonal => [(1, -1), (-1, 1)],
        }
    }
}

/// Read `image[(x + dx, y + dy)]`, or zero outside the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn value_or_zero(image: &Image<Luma<f32>>, x: u32, y: u32, (dx, dy): (i64, i64)) -> f32 {
    let nx = i64::from(x) + dx;
    let ny = i64::from(y) + dy;
    if nx < 0 || ny < 0 || nx >= i64::from(image.width()) || ny >= i64::from(image.height()) {
        return 0.0;
    }
    image.get_pixel(nx as u32, ny as u32).0[0]
}

/// Suppress every pixel that is not a local maximum along its gradient.
///
/// Ties keep the pixel. The output has the field's dimensions.
#[must_use]
pub fn non_maximum_suppression(field: &GradientField) -> Image<Luma<f32>> {
    let magnitude = field.magnitude();
    let orientation = field.orientation();
    Image::from_fn(field.width(), field.height(), |x, y| {
        let m = magnitude.get_pixel(x, y).0[0];
        if m <= 0.0 {
            return Luma([0.0]);
        }
        let direction = Direction::from_orientation(orientation.get_pixel(x, y).0[0]);
        let [a, b] = direction.neighbor_offsets();
        if m >= value_or_zero(magnitude, x, y, a) && m >= value_or_zero(magnitude, x, y, b) {
            Luma([m])
        } else {
            Luma([0.0])
        }
    })
}

/// Link suppressed magnitudes into a binary edge map.
///
/// `thresholds` are fractions of the largest value in `input` and are
/// clamped into `[0, 1]` with `low <= high`. Zero-valued pixels are never
/// edges, even with a zero low threshold. A raster with no positive value
/// produces an all-zero map.
#[must_use]
pub fn hysteresis(input: &Image<Luma<f32>>, thresholds: Thresholds) -> GrayImage {
    let (w, h) = input.dimensions();
    let peak = max_value(input);
    if peak <= 0.0 {
        return empty_edge_map(w, h);
    }
    let mut out = empty_edge_map(w, h);
    let thresholds = thresholds.clamped();
    let low = thresholds.low * peak;
    let high = thresholds.high * peak;
    let is_weak = |v: f32| v > 0.0 && v >= low;

    let mut stack: Vec<(u32, u32)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = input.get_pixel(x, y).0[0];
            if !(v > 0.0 && v >= high) || out.get_pixel(x, y).0[0] == EDGE {
                continue;
            }
            out.put_pixel(x, y, Luma([EDGE]));
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBORS_8 {
                    let (Some(nx), Some(ny)) =
                        (cx.checked_add_signed(dx), cy.checked_add_signed(dy))
                    else {
                        continue;
                    };
                    if nx >= w || ny >= h || out.get_pixel(nx, ny).0[0] == EDGE {
                        continue;
                    }
                    if is_weak(input.get_pixel(nx, ny).0[0]) {
                        out.put_pixel(nx, ny, Luma([EDGE]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}

const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Run suppression followed by hysteresis.
#[must_use = "returns the binary edge map"]
pub fn detect_edges(field: &GradientField, thresholds: Thresholds) -> GrayImage {
    hysteresis(&non_maximum_suppression(field), thresholds)
}

/// All-zero edge map, the result for a raster with no gradient.
#[must_use]
pub fn empty_edge_map(width: u32, height: u32) -> GrayImage {
    GrayImage::new(width, height)
}

/// Number of edge pixels in a binary map.
#[must_use]
pub fn count_edge_pixels(edges: &GrayImage) -> u64 {
    edges.pixels().map(|p| u64::from(p.0[0] == EDGE)).sum()
}
