//! Corpus-level orchestration.
//!
//! The corpus root holds one subdirectory per partition. Partitions run
//! one after another in sorted order; the images inside a partition fan
//! out over a single worker pool built once per orchestrator. A failing
//! partition is recorded and the rest carry on.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use houghscan_export::DEFAULT_MAX_CHUNK_BYTES;
use houghscan_pipeline::ExtractConfig;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::IoError;
use crate::partition::{PartitionOutcome, PartitionProcessor, PartitionStatus};
use crate::store::ArtifactStore;
use crate::transport::{ExportOutcome, ExportStatus, export_artifacts};

/// Settings for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Corpus root, one subdirectory per partition.
    pub root: PathBuf,
    /// Directory for partition artifacts.
    pub output_dir: PathBuf,
    /// Worker threads. `0` uses the available parallelism.
    pub workers: usize,
    /// Also write transport chunks here after processing.
    pub transport_dir: Option<PathBuf>,
    /// Byte cap per transport file.
    pub max_json_bytes: usize,
    /// Per-image extraction settings.
    pub extract: ExtractConfig,
}

impl BatchConfig {
    /// Defaults for everything but the two directories.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
            workers: 0,
            transport_dir: None,
            max_json_bytes: DEFAULT_MAX_CHUNK_BYTES,
            extract: ExtractConfig::default(),
        }
    }

    /// Worker count after resolving `0`.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        }
    }
}

/// Outcome of a whole batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per partition, in processing order.
    pub partitions: Vec<PartitionOutcome>,
    /// Transport export results, empty when no transport dir was set.
    pub exports: Vec<ExportOutcome>,
}

impl BatchReport {
    /// Number of partitions with the given status kind.
    fn count(&self, pred: impl Fn(&PartitionStatus) -> bool) -> usize {
        self.partitions.iter().filter(|p| pred(&p.status)).count()
    }

    /// Partitions skipped because their artifact existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PartitionStatus::Skipped))
    }

    /// Partitions written, fully or partially.
    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|s| {
            matches!(
                s,
                PartitionStatus::Complete { .. } | PartitionStatus::PartialComplete { .. }
            )
        })
    }

    /// Partitions that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PartitionStatus::Failed { .. }))
    }

    /// Images left out across all written partitions.
    #[must_use]
    pub fn failed_images(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| match p.status {
                PartitionStatus::PartialComplete { failed, .. } => failed,
                _ => 0,
            })
            .sum()
    }

    /// Whether any partition or export failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
            || self
                .exports
                .iter()
                .any(|e| matches!(e.status, ExportStatus::Failed { .. }))
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} partitions: {} written, {} skipped, {} failed; {} images skipped",
            self.partitions.len(),
            self.written(),
            self.skipped(),
            self.failed(),
            self.failed_images(),
        )
    }
}

/// Runs every partition of a corpus.
pub struct BatchOrchestrator {
    config: BatchConfig,
    store: ArtifactStore,
    pool: ThreadPool,
}

impl BatchOrchestrator {
    /// Validate `config` and start the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Config`] for an invalid extraction config and
    /// [`IoError::Pool`] if the pool cannot be built.
    pub fn new(config: BatchConfig) -> Result<Self, IoError> {
        config.extract.validate()?;
        let workers = config.resolved_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("houghscan-worker-{i}"))
            .build()?;
        let store = ArtifactStore::new(&config.output_dir, config.extract.variant);
        info!(
            workers,
            variant = %config.extract.variant,
            root = %config.root.display(),
            "batch orchestrator ready"
        );
        Ok(Self {
            config,
            store,
            pool,
        })
    }

    /// Artifact store used for output.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Process every partition, then export transport chunks if
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::List`] if the corpus root cannot be listed, or
    /// an error listing the store or transport directory during export.
    /// Partition failures are reported in the [`BatchReport`] instead.
    pub fn run(&self) -> Result<BatchReport, IoError> {
        let partitions = list_partitions(&self.config.root)?;
        info!(count = partitions.len(), "found partitions");

        let processor = PartitionProcessor::new(&self.pool, &self.store, &self.config.extract);
        let mut report = BatchReport::default();
        for dir in &partitions {
            let outcome = processor.run(dir);
            if let PartitionStatus::Failed { error } = &outcome.status {
                warn!(partition = %outcome.partition, %error, "partition failed, continuing");
            }
            report.partitions.push(outcome);
        }

        if let Some(transport) = &self.config.transport_dir {
            report.exports = export_artifacts(&self.store, transport, self.config.max_json_bytes)?;
        }

        info!("{}", report.summary());
        Ok(report)
    }
}

/// Partition directories directly under `root`, sorted by name.
///
/// # Errors
///
/// Returns [`IoError::List`] if `root` cannot be read.
pub fn list_partitions(root: &Path) -> Result<Vec<PathBuf>, IoError> {
    let list_err = |source| IoError::List {
        path: root.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
