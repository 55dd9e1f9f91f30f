//! houghscan-pipeline: Pure edge-detection and Hough pipeline (sans-IO).
//!
//! Turns one encoded image into a set of `u8` rasters through:
//! decode -> pixel cap -> (working scale -> blur) -> gradient ->
//! non-maximum suppression -> hysteresis -> (Hough voting | quantization).
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. All filesystem interaction
//! lives in `houghscan-io`.

pub mod blur;
pub mod diagnostics;
pub mod downsample;
pub mod edge;
pub mod gradient;
pub mod grayscale;
pub mod hough;
pub mod quantize;
pub mod types;

use std::time::Duration;

pub use diagnostics::{Clock, ExtractDiagnostics, NullClock};
pub use downsample::DownsampleFilter;
pub use gradient::{GradientField, GradientKernel};
pub use hough::HoughConfig;
pub use types::{
    Artifact, Dimensions, ExtractConfig, GradientArtifact, GrayImage, HoughArtifact,
    PipelineError, Thresholds, Variant,
};

use diagnostics::{ExtractSummary, StageDiagnostics, StageMetrics};

/// Run the extraction pipeline for the configured variant.
///
/// Takes raw image bytes (PNG or JPEG) and produces the variant's
/// rasters. A blank image is not an error: it yields all-zero rasters.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn extract(image_bytes: &[u8], config: &ExtractConfig) -> Result<Artifact, PipelineError> {
    extract_with_diagnostics(image_bytes, config, &NullClock).map(|(artifact, _)| artifact)
}

/// Run the extraction pipeline and collect per-stage diagnostics.
///
/// # Errors
///
/// Same as [`extract`].
pub fn extract_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &ExtractConfig,
    clock: &C,
) -> Result<(Artifact, ExtractDiagnostics), PipelineError> {
    config.validate()?;
    let start = clock.now();

    let (gray, decode_time) = timed(clock, || grayscale::decode_and_grayscale(image_bytes));
    let gray = gray?;
    let source = Dimensions::of(&gray);
    let decode = StageDiagnostics {
        duration: decode_time,
        metrics: StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: source.width,
            height: source.height,
            pixel_count: source.pixel_count(),
        },
    };

    let ((capped, applied), limit_time) = timed(clock, || {
        downsample::limit_pixels(&gray, config.max_pixels, config.resize_filter)
    });
    let pixel_limit = StageDiagnostics {
        duration: limit_time,
        metrics: StageMetrics::PixelLimit {
            max_pixels: config.max_pixels,
            applied,
            width: capped.width(),
            height: capped.height(),
        },
    };
    drop(gray);

    let (artifact, stages) = match config.variant {
        Variant::Hough => extract_hough(capped, config, clock)?,
        Variant::Gradient => extract_gradient(&capped, config, clock),
    };

    let diagnostics = ExtractDiagnostics {
        decode,
        pixel_limit,
        working_scale: stages.working_scale,
        blur: stages.blur,
        gradient: stages.gradient,
        edge_detection: stages.edge_detection,
        accumulation: stages.accumulation,
        quantization: stages.quantization,
        total_duration: clock.elapsed(&start),
        summary: ExtractSummary {
            variant: config.variant,
            source_width: source.width,
            source_height: source.height,
            working_width: stages.working.width,
            working_height: stages.working.height,
            edge_pixel_count: stages.edge_pixel_count,
            peak: stages.peak,
        },
    };
    Ok((artifact, diagnostics))
}

/// Stages that run after the pixel cap, which differ per variant.
struct VariantStages {
    working: Dimensions,
    working_scale: Option<StageDiagnostics>,
    blur: Option<StageDiagnostics>,
    gradient: StageDiagnostics,
    edge_detection: StageDiagnostics,
    accumulation: Option<StageDiagnostics>,
    quantization: Option<StageDiagnostics>,
    edge_pixel_count: u64,
    peak: Option<(u32, u32, u32)>,
}

fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let value = f();
    (value, clock.elapsed(&start))
}

fn gradient_stage<C: Clock>(
    image: &GrayImage,
    kernel: GradientKernel,
    clock: &C,
) -> (GradientField, StageDiagnostics) {
    let (field, duration) = timed(clock, || GradientField::compute(image, kernel));
    let stage = StageDiagnostics {
        duration,
        metrics: StageMetrics::Gradient {
            kernel,
            max_magnitude: field.max_magnitude(),
        },
    };
    (field, stage)
}

fn edge_stage(
    edges: &GrayImage,
    thresholds: Thresholds,
    duration: Duration,
) -> (u64, StageDiagnostics) {
    let thresholds = thresholds.clamped();
    let edge_pixel_count = edge::count_edge_pixels(edges);
    let stage = StageDiagnostics {
        duration,
        metrics: StageMetrics::EdgeDetection {
            low_threshold: thresholds.low,
            high_threshold: thresholds.high,
            edge_pixel_count,
            total_pixel_count: Dimensions::of(edges).pixel_count(),
        },
    };
    (edge_pixel_count, stage)
}

/// Working scale, blur, edges, then vote.
fn extract_hough<C: Clock>(
    image: GrayImage,
    config: &ExtractConfig,
    clock: &C,
) -> Result<(Artifact, VariantStages), PipelineError> {
    let (working, scale_time) = timed(clock, || {
        downsample::scale_down(&image, config.working_scale, config.resize_filter)
    });
    drop(image);
    let working_scale = StageDiagnostics {
        duration: scale_time,
        metrics: StageMetrics::WorkingScale {
            divisor: config.working_scale,
            width: working.width(),
            height: working.height(),
        },
    };

    let (blurred, blur_time) = timed(clock, || blur::gaussian_blur(&working, config.blur_sigma));
    let blur = StageDiagnostics {
        duration: blur_time,
        metrics: StageMetrics::Blur {
            sigma: config.blur_sigma,
        },
    };

    let (field, gradient) = gradient_stage(&blurred, config.gradient_kernel, clock);
    let (edges, edge_time) = timed(clock, || {
        edge::detect_edges(&field, config.hough_thresholds)
    });
    let (edge_pixel_count, edge_detection) =
        edge_stage(&edges, config.hough_thresholds, edge_time);

    let (votes, vote_time) = timed(clock, || {
        hough::accumulate(&edges, config.hough).map(|raw| {
            let suppressed = hough::suppress_non_maximum(&raw);
            (raw, suppressed)
        })
    });
    let (raw, suppressed) = votes?;
    let peak = hough::peak(&suppressed);
    let accumulation = StageDiagnostics {
        duration: vote_time,
        metrics: StageMetrics::Accumulation {
            num_rho: config.hough.num_rho,
            num_theta: config.hough.num_theta,
            max_votes: peak.map_or(0, |(_, _, votes)| votes),
            surviving_cells: suppressed.pixels().map(|p| u64::from(p.0[0] > 0)).sum(),
        },
    };

    let shape = Dimensions::of(&working);
    let artifact = Artifact::Hough(HoughArtifact {
        shape,
        edges,
        accumulator: hough::clip_to_u8(&suppressed),
        sinusoids: hough::clip_to_u8(&raw),
    });
    let stages = VariantStages {
        working: shape,
        working_scale: Some(working_scale),
        blur: Some(blur),
        gradient,
        edge_detection,
        accumulation: Some(accumulation),
        quantization: None,
        edge_pixel_count,
        peak,
    };
    Ok((artifact, stages))
}

/// Gradient, edges, then quantize every raster at storage stride.
fn extract_gradient<C: Clock>(
    image: &GrayImage,
    config: &ExtractConfig,
    clock: &C,
) -> (Artifact, VariantStages) {
    let (field, gradient) = gradient_stage(image, config.gradient_kernel, clock);
    let ((suppressed, edges), edge_time) = timed(clock, || {
        let suppressed = edge::non_maximum_suppression(&field);
        let edges = edge::hysteresis(&suppressed, config.gradient_thresholds);
        (suppressed, edges)
    });
    let (edge_pixel_count, edge_detection) =
        edge_stage(&edges, config.gradient_thresholds, edge_time);

    let step = config.storage_stride;
    let (artifact, quantize_time) = timed(clock, || GradientArtifact {
        shape: Dimensions::of(image),
        magnitude: quantize::stride(&quantize::normalize_by_max(field.magnitude()), step),
        angle: quantize::stride(&quantize::quantize_orientation(field.orientation()), step),
        nonmaxima: quantize::stride(&quantize::normalize_by_max(&suppressed), step),
        hysteresis: quantize::stride(&edges, step),
    });
    let quantization = StageDiagnostics {
        duration: quantize_time,
        metrics: StageMetrics::Quantization {
            stride: step,
            width: artifact.magnitude.width(),
            height: artifact.magnitude.height(),
        },
    };

    let stages = VariantStages {
        working: Dimensions::of(image),
        working_scale: None,
        blur: None,
        gradient,
        edge_detection,
        accumulation: None,
        quantization: Some(quantization),
        edge_pixel_count,
        peak: None,
    };
    (Artifact::Gradient(artifact), stages)
}
