//! Partition artifact files.
//!
//! Each partition produces exactly one file,
//! `<dir>/<prefix>_<partition>.bin`, holding a bincode encoding of
//! [`PartitionArtifact`]. The file's existence is the only record that a
//! partition is done, so it is written atomically: the bytes go to a
//! temporary file in the same directory which is then renamed into
//! place.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use houghscan_pipeline::{Artifact, Variant};
use serde::{Deserialize, Serialize};

use crate::error::IoError;

const EXTENSION: &str = "bin";

/// One extracted image inside a partition artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Image path relative to the corpus root, `/`-separated.
    pub path: String,
    /// Extracted rasters.
    pub artifact: Artifact,
}

/// All extracted images of one partition, keyed by image key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionArtifact {
    /// Partition directory name.
    pub partition: String,
    /// Variant every entry was produced with.
    pub variant: Variant,
    /// Entries by image key.
    pub images: BTreeMap<String, ImageEntry>,
}

impl PartitionArtifact {
    /// An artifact with no images yet.
    #[must_use]
    pub fn new(partition: impl Into<String>, variant: Variant) -> Self {
        Self {
            partition: partition.into(),
            variant,
            images: BTreeMap::new(),
        }
    }
}

/// Output directory plus naming scheme for partition artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    variant: Variant,
}

impl ArtifactStore {
    /// Store artifacts of `variant` under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, variant: Variant) -> Self {
        Self {
            dir: dir.into(),
            variant,
        }
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Variant whose artifacts this store names.
    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    /// File stem for a partition, e.g. `hough_data_landscape`.
    #[must_use]
    pub fn base_name(&self, partition: &str) -> String {
        format!("{}_{partition}", self.variant.artifact_prefix())
    }

    /// Artifact path for a partition.
    #[must_use]
    pub fn path_for(&self, partition: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", self.base_name(partition)))
    }

    /// Whether the partition's artifact already exists.
    #[must_use]
    pub fn exists(&self, partition: &str) -> bool {
        self.path_for(partition).is_file()
    }

    /// Write an artifact atomically, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] if serialization fails and
    /// [`IoError::Write`] if any filesystem step fails. On error no
    /// artifact file is left behind.
    pub fn write(&self, artifact: &PartitionArtifact) -> Result<PathBuf, IoError> {
        let bytes = bincode::serde::encode_to_vec(artifact, bincode::config::standard())?;
        let target = self.path_for(&artifact.partition);
        write_atomic(&self.dir, &target, &bytes)?;
        Ok(target)
    }

    /// Read a partition's artifact.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Read`] if the file cannot be read and
    /// [`IoError::Decode`] if it is not a valid artifact.
    pub fn read(&self, partition: &str) -> Result<PartitionArtifact, IoError> {
        read_artifact(&self.path_for(partition))
    }

    /// Partitions that have an artifact in this store, sorted.
    ///
    /// A missing directory has no partitions.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::List`] if the directory exists but cannot be
    /// listed.
    pub fn partitions(&self) -> Result<Vec<String>, IoError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(IoError::List {
                    path: self.dir.clone(),
                    source,
                });
            }
        };
        let prefix = format!("{}_", self.variant.artifact_prefix());
        let suffix = format!(".{EXTENSION}");
        let mut partitions: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let partition = name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
                (!partition.is_empty()).then(|| partition.to_string())
            })
            .collect();
        partitions.sort();
        Ok(partitions)
    }
}

/// Read and decode an artifact file.
///
/// # Errors
///
/// Returns [`IoError::Read`] or [`IoError::Decode`].
pub fn read_artifact(path: &Path) -> Result<PartitionArtifact, IoError> {
    let bytes = fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (artifact, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|source| IoError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(artifact)
}

/// Write `bytes` to `target` through a temporary file in `dir`.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), IoError> {
    let temp = staged_file(dir, target, bytes)?;
    temp.persist(target).map_err(|e| IoError::Write {
        path: target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Write `bytes` to a synced temporary file in `dir`, not yet renamed
/// to `target`. Dropping the returned handle deletes the file.
pub(crate) fn staged_file(
    dir: &Path,
    target: &Path,
    bytes: &[u8],
) -> Result<tempfile::NamedTempFile, IoError> {
    let write_err = |source| IoError::Write {
        path: target.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    Ok(temp)
}
