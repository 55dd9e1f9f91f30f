//! houghscan: batch edge-map and Hough accumulator extraction.
//!
//! Three subcommands:
//!
//! - `run`: process every partition of a corpus into artifact files,
//!   optionally exporting transport JSON afterwards.
//! - `export`: convert existing artifacts into transport JSON.
//! - `inspect`: run one image and print per-stage diagnostics, useful
//!   when tuning thresholds on a sample before a long batch.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin houghscan -- run <CORPUS> --out <DIR> [OPTIONS]
//! cargo run --release --bin houghscan -- export <ARTIFACTS> --transport <DIR>
//! cargo run --release --bin houghscan -- inspect <IMAGE> [--json]
//! ```
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to change
//! the level (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use houghscan_export::DEFAULT_MAX_CHUNK_BYTES;
use houghscan_io::{ArtifactStore, BatchConfig, BatchOrchestrator, ExportStatus, export_artifacts};
use houghscan_pipeline::{
    Clock, DownsampleFilter, ExtractConfig, ExtractDiagnostics, GradientKernel, HoughConfig, Thresholds,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Batch edge-map and Hough accumulator extraction.
#[derive(Parser)]
#[command(name = "houghscan", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every partition under a corpus root.
    Run {
        /// Corpus root with one subdirectory per partition.
        root: PathBuf,

        /// Directory for partition artifacts.
        #[arg(long)]
        out: PathBuf,

        /// Worker threads (0 = available parallelism).
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Also write transport JSON chunks to this directory.
        #[arg(long)]
        transport: Option<PathBuf>,

        /// Byte cap per transport JSON file.
        #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_BYTES, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_json_bytes: usize,

        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Convert existing partition artifacts into transport JSON.
    Export {
        /// Directory holding partition artifacts.
        artifact_dir: PathBuf,

        /// Output directory for transport JSON chunks.
        #[arg(long)]
        transport: PathBuf,

        /// Which artifacts to convert.
        #[arg(long, value_enum, default_value_t = VariantArg::Hough)]
        variant: VariantArg,

        /// Byte cap per transport JSON file.
        #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_BYTES, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_json_bytes: usize,
    },

    /// Run one image and print per-stage diagnostics.
    Inspect {
        /// Path to the input image (PNG or JPEG).
        image_path: PathBuf,

        /// Number of runs for averaging.
        #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        runs: usize,

        /// Output diagnostics as JSON instead of a human-readable report.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        extract: ExtractArgs,
    },
}

/// Per-image extraction parameters shared by `run` and `inspect`.
#[derive(Args)]
struct ExtractArgs {
    /// Which rasters to produce.
    #[arg(long, value_enum, default_value_t = VariantArg::Hough)]
    variant: VariantArg,

    /// Images with more pixels are downscaled first.
    #[arg(long, default_value_t = ExtractConfig::DEFAULT_MAX_PIXELS, value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..))]
    max_pixels: u64,

    /// Integer downscale before edge detection (hough variant).
    #[arg(long, default_value_t = ExtractConfig::DEFAULT_WORKING_SCALE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_scale: u32,

    /// Storage stride for rasters (gradient variant).
    #[arg(long, default_value_t = ExtractConfig::DEFAULT_STORAGE_STRIDE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    storage_stride: u32,

    /// Gaussian pre-blur sigma (hough variant, 0 disables).
    #[arg(long, default_value_t = ExtractConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Resampling filter for downscaling.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// Use a derivative-of-Gaussian kernel with this sigma instead of Sobel.
    #[arg(long)]
    derivative_sigma: Option<f32>,

    /// Low hysteresis threshold, as a fraction of the peak magnitude.
    #[arg(long)]
    low: Option<f32>,

    /// High hysteresis threshold, as a fraction of the peak magnitude.
    #[arg(long)]
    high: Option<f32>,

    /// Accumulator distance bins.
    #[arg(long, default_value_t = HoughConfig::DEFAULT_NUM_RHO, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    num_rho: u32,

    /// Accumulator angle bins.
    #[arg(long, default_value_t = HoughConfig::DEFAULT_NUM_THETA, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    num_theta: u32,

    /// Full extraction config as a JSON string.
    ///
    /// When provided, all other extraction flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Artifact variant selection.
#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    /// Gradient magnitude/angle, suppressed magnitude, and hysteresis edges.
    Gradient,
    /// Edge map, suppressed accumulator, and sinusoid trace.
    Hough,
}

impl From<VariantArg> for houghscan_pipeline::Variant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Gradient => Self::Gradient,
            VariantArg::Hough => Self::Hough,
        }
    }
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Build an [`ExtractConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_args(args: &ExtractArgs) -> Result<ExtractConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut config = ExtractConfig {
        variant: args.variant.into(),
        max_pixels: args.max_pixels,
        resize_filter: match args.resize_filter {
            Filter::Nearest => DownsampleFilter::Nearest,
            Filter::Triangle => DownsampleFilter::Triangle,
            Filter::CatmullRom => DownsampleFilter::CatmullRom,
            Filter::Gaussian => DownsampleFilter::Gaussian,
            Filter::Lanczos3 => DownsampleFilter::Lanczos3,
        },
        working_scale: args.working_scale,
        storage_stride: args.storage_stride,
        blur_sigma: args.blur_sigma,
        gradient_kernel: args
            .derivative_sigma
            .map_or(GradientKernel::Sobel, |sigma| {
                GradientKernel::GaussianDerivative { sigma }
            }),
        hough: HoughConfig {
            num_rho: args.num_rho,
            num_theta: args.num_theta,
        },
        ..ExtractConfig::default()
    };

    let current = config.thresholds();
    let thresholds = Thresholds::new(
        args.low.unwrap_or(current.low),
        args.high.unwrap_or(current.high),
    );
    match config.variant {
        houghscan_pipeline::Variant::Gradient => config.gradient_thresholds = thresholds,
        houghscan_pipeline::Variant::Hough => config.hough_thresholds = thresholds,
    }
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            root,
            out,
            workers,
            transport,
            max_json_bytes,
            extract,
        } => {
            let extract = match config_from_args(&extract) {
                Ok(c) => c,
                Err(msg) => {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
            };
            let config = BatchConfig {
                workers,
                transport_dir: transport,
                max_json_bytes,
                extract,
                ..BatchConfig::new(root, out)
            };
            run(config)
        }
        Command::Export {
            artifact_dir,
            transport,
            variant,
            max_json_bytes,
        } => export(
            &ArtifactStore::new(artifact_dir, variant.into()),
            &transport,
            max_json_bytes,
        ),
        Command::Inspect {
            image_path,
            runs,
            json,
            extract,
        } => match config_from_args(&extract) {
            Ok(config) => inspect(&image_path, &config, runs, json),
            Err(msg) => {
                eprintln!("{msg}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(config: BatchConfig) -> ExitCode {
    let orchestrator = match BatchOrchestrator::new(config) {
        Ok(o) => o,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    match orchestrator.run() {
        Ok(report) if report.has_failures() => {
            error!("{}", report.summary());
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn export(store: &ArtifactStore, transport: &std::path::Path, max_json_bytes: usize) -> ExitCode {
    match export_artifacts(store, transport, max_json_bytes) {
        Ok(outcomes) => {
            let failed = outcomes
                .iter()
                .filter(|o| matches!(o.status, ExportStatus::Failed { .. }))
                .count();
            info!(partitions = outcomes.len(), failed, "export finished");
            if failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn inspect(image_path: &std::path::Path, config: &ExtractConfig, runs: usize, json: bool) -> ExitCode {
    let image_bytes = match std::fs::read(image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Image: {} ({} bytes)", image_path.display(), image_bytes.len());
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {runs}");
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(runs);
    for run in 0..runs {
        if runs > 1 {
            eprintln!("--- Run {}/{runs} ---", run + 1);
        }

        match houghscan_pipeline::extract_with_diagnostics(&image_bytes, config, &StdClock) {
            Ok((_, diagnostics)) => {
                if json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Extraction error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if runs > 1 && !json {
        print_multi_run_summary(&all_diagnostics);
    }
    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&ExtractDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ExtractDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| Some(d.decode.duration)),
        ("Pixel Limit", |d| Some(d.pixel_limit.duration)),
        ("Working Scale", |d| d.working_scale.as_ref().map(|s| s.duration)),
        ("Blur", |d| d.blur.as_ref().map(|s| s.duration)),
        ("Gradient", |d| Some(d.gradient.duration)),
        ("Edge Detection", |d| Some(d.edge_detection.duration)),
        ("Accumulation", |d| d.accumulation.as_ref().map(|s| s.duration)),
        ("Quantization", |d| d.quantization.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
