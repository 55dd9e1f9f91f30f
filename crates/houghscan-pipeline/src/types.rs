//! Shared types for the houghscan extraction pipeline.

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;
use crate::gradient::GradientKernel;
use crate::hough::HoughConfig;

/// Re-export `GrayImage` so downstream crates can reference
/// persisted rasters without depending on `image` directly.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a grayscale raster.
    #[must_use]
    pub fn of(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Shape in `(rows, cols)` order.
    #[must_use]
    pub const fn shape(self) -> (u32, u32) {
        (self.height, self.width)
    }
}

/// Which set of rasters the pipeline produces for each image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Gradient magnitude/angle, suppressed magnitude and hysteresis edges.
    Gradient,
    /// Edge map, suppressed Hough accumulator and sinusoid trace.
    #[default]
    Hough,
}

impl Variant {
    /// File-name prefix used for persisted partition artifacts.
    #[must_use]
    pub const fn artifact_prefix(self) -> &'static str {
        match self {
            Self::Gradient => "edge_data",
            Self::Hough => "hough_data",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gradient => f.write_str("gradient"),
            Self::Hough => f.write_str("hough"),
        }
    }
}

/// Hysteresis thresholds as fractions of the peak suppressed magnitude.
///
/// Both values must lie in `[0, 1]` with `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Weak-edge fraction.
    pub low: f32,
    /// Strong-edge fraction.
    pub high: f32,
}

impl Thresholds {
    /// Create a threshold pair.
    #[must_use]
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// Clamp both values into `[0, 1]` and force `low <= high`.
    #[must_use]
    pub fn clamped(self) -> Self {
        let high = self.high.clamp(0.0, 1.0);
        let low = self.low.clamp(0.0, 1.0).min(high);
        Self { low, high }
    }
}

/// Configuration for per-image extraction.
///
/// All parameters have defaults matching the batch runs the artifacts
/// were originally produced with. Use [`ExtractConfig::validate`] before
/// handing a user-supplied config to a long batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Which artifact variant to produce.
    pub variant: Variant,

    /// Images with more pixels than this are downscaled (aspect
    /// preserved) before any other processing.
    pub max_pixels: u64,

    /// Resampling filter used for both the pixel cap and the working
    /// scale reduction.
    pub resize_filter: DownsampleFilter,

    /// Integer divisor applied to both axes before edge detection in the
    /// Hough variant. `1` disables the reduction.
    pub working_scale: u32,

    /// Stride used when storing gradient-variant rasters. `1` stores
    /// full resolution.
    pub storage_stride: u32,

    /// Gaussian pre-blur sigma for the Hough variant. Non-positive
    /// values skip the blur.
    pub blur_sigma: f32,

    /// Derivative kernel used for the gradient field.
    pub gradient_kernel: GradientKernel,

    /// Hysteresis thresholds for the gradient variant.
    pub gradient_thresholds: Thresholds,

    /// Hysteresis thresholds for the Hough variant.
    pub hough_thresholds: Thresholds,

    /// Accumulator bin counts.
    pub hough: HoughConfig,
}

impl ExtractConfig {
    /// Default pixel cap (2 megapixels).
    pub const DEFAULT_MAX_PIXELS: u64 = 2_000_000;
    /// Default working-scale divisor for the Hough variant.
    pub const DEFAULT_WORKING_SCALE: u32 = 4;
    /// Default storage stride for the gradient variant.
    pub const DEFAULT_STORAGE_STRIDE: u32 = 2;
    /// Default pre-blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.0;
    /// Default gradient-variant thresholds.
    pub const DEFAULT_GRADIENT_THRESHOLDS: Thresholds = Thresholds::new(0.04, 0.16);
    /// Default Hough-variant thresholds.
    pub const DEFAULT_HOUGH_THRESHOLDS: Thresholds = Thresholds::new(0.2, 0.5);

    /// Thresholds that apply to the configured variant.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        match self.variant {
            Variant::Gradient => self.gradient_thresholds,
            Variant::Hough => self.hough_thresholds,
        }
    }

    /// Check the configuration for values that would make extraction
    /// meaningless or divide by zero.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_pixels == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_pixels must be at least 1".to_string(),
            ));
        }
        if self.working_scale == 0 {
            return Err(PipelineError::InvalidConfig(
                "working_scale must be at least 1".to_string(),
            ));
        }
        if self.storage_stride == 0 {
            return Err(PipelineError::InvalidConfig(
                "storage_stride must be at least 1".to_string(),
            ));
        }
        for (name, t) in [
            ("gradient_thresholds", self.gradient_thresholds),
            ("hough_thresholds", self.hough_thresholds),
        ] {
            if !(0.0..=1.0).contains(&t.low) || !(0.0..=1.0).contains(&t.high) || t.low > t.high {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must satisfy 0 <= low <= high <= 1, got low={} high={}",
                    t.low, t.high,
                )));
            }
        }
        if let GradientKernel::GaussianDerivative { sigma } = self.gradient_kernel
            && !(sigma > 0.0 && sigma.is_finite())
        {
            return Err(PipelineError::InvalidConfig(format!(
                "gaussian derivative sigma must be positive, got {sigma}",
            )));
        }
        self.hough.validate()
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            max_pixels: Self::DEFAULT_MAX_PIXELS,
            resize_filter: DownsampleFilter::default(),
            working_scale: Self::DEFAULT_WORKING_SCALE,
            storage_stride: Self::DEFAULT_STORAGE_STRIDE,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            gradient_kernel: GradientKernel::default(),
            gradient_thresholds: Self::DEFAULT_GRADIENT_THRESHOLDS,
            hough_thresholds: Self::DEFAULT_HOUGH_THRESHOLDS,
            hough: HoughConfig::default(),
        }
    }
}

/// Serde support for `GrayImage` as `{ width, height, pixels }`.
///
/// `image::ImageBuffer` does not implement serde traits.
pub mod raster_serde {
    use image::GrayImage;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct RasterProxy {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    }

    /// Serialize a raster as its dimensions and raw row-major bytes.
    pub fn serialize<S: Serializer>(image: &GrayImage, serializer: S) -> Result<S::Ok, S::Error> {
        RasterProxy {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().clone(),
        }
        .serialize(serializer)
    }

    /// Deserialize a raster, rejecting buffers that do not match the
    /// stored dimensions.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GrayImage, D::Error> {
        let proxy = RasterProxy::deserialize(deserializer)?;
        GrayImage::from_raw(proxy.width, proxy.height, proxy.pixels)
            .ok_or_else(|| serde::de::Error::custom("raster byte length does not match dimensions"))
    }
}

/// Rasters persisted for the gradient variant, all at storage stride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientArtifact {
    /// Dimensions of the working image the rasters were derived from.
    pub shape: Dimensions,
    /// Gradient magnitude normalized by its maximum.
    #[serde(with = "raster_serde")]
    pub magnitude: GrayImage,
    /// Gradient orientation mapped from `(-pi, pi]` onto `0..=255`.
    #[serde(with = "raster_serde")]
    pub angle: GrayImage,
    /// Non-maximum-suppressed magnitude normalized by its maximum.
    #[serde(with = "raster_serde")]
    pub nonmaxima: GrayImage,
    /// Binary hysteresis edge map.
    #[serde(with = "raster_serde")]
    pub hysteresis: GrayImage,
}

/// Rasters persisted for the Hough variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoughArtifact {
    /// Dimensions of the working image the edge map was derived from.
    pub shape: Dimensions,
    /// Binary edge map at working resolution.
    #[serde(with = "raster_serde")]
    pub edges: GrayImage,
    /// Peak-suppressed accumulator, clipped to `0..=255`.
    #[serde(with = "raster_serde")]
    pub accumulator: GrayImage,
    /// Unsuppressed accumulator, clipped to `0..=255`.
    #[serde(with = "raster_serde")]
    pub sinusoids: GrayImage,
}

/// Per-image extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Artifact {
    /// Output of [`Variant::Gradient`].
    Gradient(GradientArtifact),
    /// Output of [`Variant::Hough`].
    Hough(HoughArtifact),
}

impl Artifact {
    /// Working-image dimensions.
    #[must_use]
    pub const fn shape(&self) -> Dimensions {
        match self {
            Self::Gradient(a) => a.shape,
            Self::Hough(a) => a.shape,
        }
    }

    /// Named rasters in a stable order. Names match the keys downstream
    /// consumers look up in transport records.
    #[must_use]
    pub fn rasters(&self) -> Vec<(&'static str, &GrayImage)> {
        match self {
            Self::Gradient(a) => vec![
                ("gradient_magnitude", &a.magnitude),
                ("gradient_angle", &a.angle),
                ("nonmaxima", &a.nonmaxima),
                ("hysteresis", &a.hysteresis),
            ],
            Self::Hough(a) => vec![
                ("edges", &a.edges),
                ("accumulator", &a.accumulator),
                ("hough_sinusoids", &a.sinusoids),
            ],
        }
    }
}

/// Errors that can occur during per-image extraction.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
