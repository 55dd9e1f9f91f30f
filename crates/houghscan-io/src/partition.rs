//! One partition: enumerate its images, extract them in parallel, and
//! write the partition artifact once.
//!
//! ```text
//! Pending --artifact exists--> Skipped
//! Pending --> Running --all ok--------> Complete
//!                     --some failed---> PartialComplete
//!                     --write failed--> Failed (no artifact)
//! ```
//!
//! Images that cannot be read, decoded, or that panic during extraction
//! are logged and left out; they never fail the partition.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use houghscan_pipeline::{Artifact, ExtractConfig};
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::error::{ImageError, IoError, truncate_message};
use crate::store::{ArtifactStore, ImageEntry, PartitionArtifact};

/// Extensions treated as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Final state of a partition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStatus {
    /// The artifact already existed; nothing was computed.
    Skipped,
    /// Every image was extracted.
    Complete {
        /// Images stored.
        images: usize,
    },
    /// The artifact was written but some images were left out.
    PartialComplete {
        /// Images stored.
        images: usize,
        /// Images left out.
        failed: usize,
    },
    /// The partition could not be listed or its artifact not written.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Result of running one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Partition directory name.
    pub partition: String,
    /// Final state.
    pub status: PartitionStatus,
}

/// Runs partitions on a shared worker pool.
pub struct PartitionProcessor<'a> {
    pool: &'a ThreadPool,
    store: &'a ArtifactStore,
    config: &'a ExtractConfig,
}

impl<'a> PartitionProcessor<'a> {
    /// Create a processor. `config` must already be validated.
    #[must_use]
    pub const fn new(pool: &'a ThreadPool, store: &'a ArtifactStore, config: &'a ExtractConfig) -> Self {
        Self {
            pool,
            store,
            config,
        }
    }

    /// Process the partition rooted at `dir`.
    pub fn run(&self, dir: &Path) -> PartitionOutcome {
        let partition = partition_name(dir);
        let outcome = |status| PartitionOutcome {
            partition: partition.clone(),
            status,
        };

        if self.store.exists(&partition) {
            info!(%partition, "artifact exists, skipping partition");
            return outcome(PartitionStatus::Skipped);
        }

        let images = match list_images(dir) {
            Ok(images) => images,
            Err(e) => {
                error!(%partition, error = %e, "cannot list partition");
                return outcome(PartitionStatus::Failed {
                    error: e.to_string(),
                });
            }
        };
        info!(%partition, images = images.len(), "processing partition");

        let config = self.config;
        let results: Vec<(&PathBuf, Result<Artifact, ImageError>)> = self.pool.install(|| {
            images
                .par_iter()
                .map(|path| (path, extract_image(path, config)))
                .collect()
        });

        let mut artifact = PartitionArtifact::new(&partition, config.variant);
        let mut failed = 0;
        for (path, result) in results {
            match result {
                Ok(extracted) => {
                    let relative = path.strip_prefix(dir).unwrap_or(path);
                    artifact.images.insert(
                        image_key(relative),
                        ImageEntry {
                            path: corpus_path(&partition, relative),
                            artifact: extracted,
                        },
                    );
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        image = %path.display(),
                        "skipping image: {}",
                        truncate_message(&e.to_string()),
                    );
                }
            }
        }

        let stored = artifact.images.len();
        match self.store.write(&artifact) {
            Ok(path) => {
                info!(%partition, stored, failed, path = %path.display(), "wrote partition artifact");
                if failed == 0 {
                    outcome(PartitionStatus::Complete { images: stored })
                } else {
                    outcome(PartitionStatus::PartialComplete {
                        images: stored,
                        failed,
                    })
                }
            }
            Err(e) => {
                error!(%partition, error = %e, "failed to write partition artifact");
                outcome(PartitionStatus::Failed {
                    error: e.to_string(),
                })
            }
        }
    }
}

/// Read and extract one image, turning panics into errors.
fn extract_image(path: &Path, config: &ExtractConfig) -> Result<Artifact, ImageError> {
    debug!(image = %path.display(), "extracting");
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Artifact, ImageError> {
        let bytes = fs::read(path)?;
        Ok(houghscan_pipeline::extract(&bytes, config)?)
    }));
    attempt.unwrap_or_else(|payload| Err(ImageError::Panic(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Image files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`IoError::List`] if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, IoError> {
    let list_err = |source| IoError::List {
        path: dir.to_path_buf(),
        source,
    };
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Whether `path` has an image extension.
#[must_use]
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Key for an image: its path relative to the partition directory with
/// separators replaced by `_`.
#[must_use]
pub fn image_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("_")
}

/// Directory name of a partition.
#[must_use]
pub fn partition_name(dir: &Path) -> String {
    dir.file_name().map_or_else(
        || dir.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn corpus_path(partition: &str, relative: &Path) -> String {
    let mut path = partition.to_string();
    for component in relative.components() {
        path.push('/');
        path.push_str(&component.as_os_str().to_string_lossy());
    }
    path
}
