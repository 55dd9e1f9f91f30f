//! Extraction diagnostics: timing, counts, and other metrics per stage.
//!
//! Every call to [`extract_with_diagnostics`](crate::extract_with_diagnostics)
//! collects these alongside the artifact. They drive the `inspect`
//! subcommand and are handy when tuning thresholds on a sample of a corpus.
//!
//! Time is read through the [`Clock`] trait so this crate never touches a
//! platform clock itself. Durations are serialized as fractional seconds
//! (`f64`), since `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gradient::GradientKernel;
use crate::types::Variant;

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances. Used when timings are not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single extraction.
///
/// Stages that only one variant runs are `Option` fields that are `None`
/// for the other variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractDiagnostics {
    /// Image decoding and grayscale conversion.
    pub decode: StageDiagnostics,
    /// Pixel-count cap.
    pub pixel_limit: StageDiagnostics,
    /// Working-scale reduction (hough variant only).
    pub working_scale: Option<StageDiagnostics>,
    /// Gaussian pre-blur (hough variant only).
    pub blur: Option<StageDiagnostics>,
    /// Gradient field estimation.
    pub gradient: StageDiagnostics,
    /// Non-maximum suppression and hysteresis.
    pub edge_detection: StageDiagnostics,
    /// Accumulator voting and peak suppression (hough variant only).
    pub accumulation: Option<StageDiagnostics>,
    /// Storage quantization (gradient variant only).
    pub quantization: Option<StageDiagnostics>,
    /// Total wall-clock duration of the extraction (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: ExtractSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Total pixel count.
        pixel_count: u64,
    },
    /// Pixel-cap metrics.
    PixelLimit {
        /// Configured cap.
        max_pixels: u64,
        /// Whether a resize was applied.
        applied: bool,
        /// Width after the cap.
        width: u32,
        /// Height after the cap.
        height: u32,
    },
    /// Working-scale metrics.
    WorkingScale {
        /// Integer divisor applied to both axes.
        divisor: u32,
        /// Width after reduction.
        width: u32,
        /// Height after reduction.
        height: u32,
    },
    /// Gaussian blur metrics.
    Blur {
        /// Sigma value used for the blur kernel.
        sigma: f32,
    },
    /// Gradient metrics.
    Gradient {
        /// Derivative kernel.
        kernel: GradientKernel,
        /// Largest gradient magnitude.
        max_magnitude: f32,
    },
    /// Edge detection metrics.
    EdgeDetection {
        /// Low threshold fraction (after clamping).
        low_threshold: f32,
        /// High threshold fraction (after clamping).
        high_threshold: f32,
        /// Number of edge pixels in the output.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Accumulator metrics.
    Accumulation {
        /// Distance bins.
        num_rho: u32,
        /// Angle bins.
        num_theta: u32,
        /// Largest raw vote count.
        max_votes: u32,
        /// Cells that survived peak suppression with at least one vote.
        surviving_cells: u64,
    },
    /// Storage quantization metrics.
    Quantization {
        /// Stride applied on both axes.
        stride: u32,
        /// Stored raster width.
        width: u32,
        /// Stored raster height.
        height: u32,
    },
}

/// Summary counts for the whole extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSummary {
    /// Variant produced.
    pub variant: Variant,
    /// Decoded width.
    pub source_width: u32,
    /// Decoded height.
    pub source_height: u32,
    /// Width edge detection ran at.
    pub working_width: u32,
    /// Height edge detection ran at.
    pub working_height: u32,
    /// Edge pixels at working resolution.
    pub edge_pixel_count: u64,
    /// Strongest accumulator cell as `(rho_bin, theta_bin, votes)`
    /// (hough variant only).
    pub peak: Option<(u32, u32, u32)>,
}

impl ExtractDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Extraction Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Variant: {}  |  Source: {}x{}  |  Working: {}x{}",
            self.summary.variant,
            self.summary.source_width,
            self.summary.source_height,
            self.summary.working_width,
            self.summary.working_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let stages: Vec<(&str, &StageDiagnostics)> = [
            ("Decode", Some(&self.decode)),
            ("Pixel Limit", Some(&self.pixel_limit)),
            ("Working Scale", self.working_scale.as_ref()),
            ("Blur", self.blur.as_ref()),
            ("Gradient", Some(&self.gradient)),
            ("Edge Detection", Some(&self.edge_detection)),
            ("Accumulation", self.accumulation.as_ref()),
            ("Quantization", self.quantization.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, diag)| diag.map(|d| (name, d)))
        .collect();

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let peak = self.summary.peak.map_or_else(
            || "-".to_string(),
            |(rho, theta, votes)| format!("rho={rho} theta={theta} votes={votes}"),
        );
        lines.push(format!(
            "Edge pixels: {}  |  Peak: {peak}",
            self.summary.edge_pixel_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage-specific metrics as a compact detail string.
#[allow(clippy::cast_precision_loss)]
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::PixelLimit {
            max_pixels,
            applied,
            width,
            height,
        } => {
            if *applied {
                format!("cap={max_pixels} -> {width}x{height}")
            } else {
                format!("cap={max_pixels} (not applied)")
            }
        }
        StageMetrics::WorkingScale {
            divisor,
            width,
            height,
        } => format!("/{divisor} -> {width}x{height}"),
        StageMetrics::Blur { sigma } => format!("sigma={sigma:.2}"),
        StageMetrics::Gradient {
            kernel,
            max_magnitude,
        } => format!("{kernel:?} max={max_magnitude:.1}"),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.2} high={high_threshold:.2} edges={edge_pixel_count} ({density:.1}%)"
            )
        }
        StageMetrics::Accumulation {
            num_rho,
            num_theta,
            max_votes,
            surviving_cells,
        } => format!("{num_rho}x{num_theta} max={max_votes} peaks={surviving_cells}"),
        StageMetrics::Quantization {
            stride,
            width,
            height,
        } => format!("stride={stride} -> {width}x{height}"),
    }
}
