//! Chunked JSON transport files.
//!
//! A partition artifact `<prefix>_<partition>.bin` becomes one or more
//! files `<prefix>_<partition>_part<N>.json` (`N` from 1), each a JSON
//! object mapping image key to [`TransportRecord`] and each at most the
//! configured byte cap unless a single record is larger.
//!
//! A partition whose chunks already exist is skipped. All chunks of a
//! partition are staged as temporary files before any is renamed into
//! place, so a serialization failure leaves nothing behind. If a rename
//! fails, the chunks already renamed are removed again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use houghscan_export::{JsonChunker, TransportRecord};
use tracing::{error, info};

use crate::error::IoError;
use crate::store::{ArtifactStore, PartitionArtifact, staged_file};

/// Result of exporting one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    /// Chunks already existed.
    Skipped,
    /// Chunks were written.
    Written {
        /// Number of chunk files.
        files: usize,
        /// Number of records across all chunks.
        records: usize,
    },
    /// The artifact could not be read or the chunks not written.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Export result for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Partition name.
    pub partition: String,
    /// Final state.
    pub status: ExportStatus,
}

/// Path of chunk `n` (1-based) for `base`.
#[must_use]
pub fn chunk_path(dir: &Path, base: &str, n: usize) -> PathBuf {
    dir.join(format!("{base}_part{n}.json"))
}

/// Whether any chunk file for `base` exists in `dir`.
///
/// # Errors
///
/// Returns [`IoError::List`] if `dir` exists but cannot be listed.
pub fn has_chunks(dir: &Path, base: &str) -> Result<bool, IoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(IoError::List {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let prefix = format!("{base}_part");
    Ok(entries.filter_map(Result::ok).any(|entry| {
        entry.file_name().to_str().is_some_and(|name| {
            name.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
    }))
}

/// Write `artifact` as chunk files named after `base`.
///
/// Returns the chunk paths in order.
///
/// # Errors
///
/// Returns [`IoError::Codec`] or [`IoError::Json`] if a record cannot be
/// encoded and [`IoError::Write`] if a file cannot be written.
pub fn write_chunks(
    artifact: &PartitionArtifact,
    dir: &Path,
    base: &str,
    max_bytes: usize,
) -> Result<Vec<PathBuf>, IoError> {
    let mut chunker = JsonChunker::new(max_bytes);
    let mut staged = Vec::new();
    let mut stage = |chunk: String| -> Result<(), IoError> {
        let target = chunk_path(dir, base, staged.len() + 1);
        let temp = staged_file(dir, &target, chunk.as_bytes())?;
        staged.push((temp, target));
        Ok(())
    };

    for (key, entry) in &artifact.images {
        let record = TransportRecord::from_artifact(entry.path.clone(), &entry.artifact)?;
        if let Some(chunk) = chunker.push(key, &record)? {
            stage(chunk)?;
        }
    }
    if let Some(chunk) = chunker.finish() {
        stage(chunk)?;
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (temp, target) in staged {
        if let Err(e) = temp.persist(&target) {
            // A partial set would be taken as complete on the next run.
            for path in &written {
                if let Err(remove) = fs::remove_file(path) {
                    error!(path = %path.display(), error = %remove, "cannot remove partial chunk");
                }
            }
            return Err(IoError::Write {
                path: target,
                source: e.error,
            });
        }
        written.push(target);
    }
    Ok(written)
}

/// Export every artifact in `store` to chunk files under `dir`.
///
/// Per-partition failures are logged and reported; they do not stop the
/// remaining partitions.
///
/// # Errors
///
/// Returns an error only if the store or transport directory cannot be
/// listed.
pub fn export_artifacts(
    store: &ArtifactStore,
    dir: &Path,
    max_bytes: usize,
) -> Result<Vec<ExportOutcome>, IoError> {
    let mut outcomes = Vec::new();
    for partition in store.partitions()? {
        let base = store.base_name(&partition);
        let status = if has_chunks(dir, &base)? {
            info!(%partition, "transport chunks exist, skipping");
            ExportStatus::Skipped
        } else {
            match export_partition(store, &partition, dir, &base, max_bytes) {
                Ok(status) => status,
                Err(e) => {
                    error!(%partition, error = %e, "transport export failed");
                    ExportStatus::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };
        outcomes.push(ExportOutcome { partition, status });
    }
    Ok(outcomes)
}

fn export_partition(
    store: &ArtifactStore,
    partition: &str,
    dir: &Path,
    base: &str,
    max_bytes: usize,
) -> Result<ExportStatus, IoError> {
    let artifact = store.read(partition)?;
    let files = write_chunks(&artifact, dir, base, max_bytes)?;
    info!(
        %partition,
        files = files.len(),
        records = artifact.images.len(),
        "wrote transport chunks"
    );
    Ok(ExportStatus::Written {
        files: files.len(),
        records: artifact.images.len(),
    })
}

/// Read one transport file.
///
/// # Errors
///
/// Returns [`IoError::Read`] or [`IoError::TransportParse`].
pub fn read_transport_file(path: &Path) -> Result<BTreeMap<String, TransportRecord>, IoError> {
    let text = fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| IoError::TransportParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every `*.json` transport file in `dir` into one map keyed by
/// [`TransportRecord::path`].
///
/// Image keys are only unique within a partition, so records are
/// re-keyed by their corpus-relative path. Files are read in sorted
/// order; a path repeated across files keeps its last record.
///
/// # Errors
///
/// Returns [`IoError::List`] if `dir` cannot be listed, or the first
/// error from [`read_transport_file`].
pub fn read_transport_dir(dir: &Path) -> Result<BTreeMap<String, TransportRecord>, IoError> {
    let list_err = |source| IoError::List {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    let mut records = BTreeMap::new();
    for file in files {
        records.extend(
            read_transport_file(&file)?
                .into_values()
                .map(|record| (record.path.clone(), record)),
        );
    }
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use houghscan_pipeline::{Artifact, Dimensions, GrayImage, HoughArtifact, Variant};

    use super::*;
    use crate::store::ImageEntry;

    fn artifact(partition: &str, count: usize) -> PartitionArtifact {
        let mut artifact = PartitionArtifact::new(partition, Variant::Hough);
        for i in 0..count {
            let edges = GrayImage::from_fn(8, 8, |x, y| {
                image::Luma([if (x + y) as usize % (i + 2) == 0 { 255 } else { 0 }])
            });
            artifact.images.insert(
                format!("img{i}.png"),
                ImageEntry {
                    path: format!("{partition}/img{i}.png"),
                    artifact: Artifact::Hough(HoughArtifact {
                        shape: Dimensions::of(&edges),
                        edges,
                        accumulator: GrayImage::new(4, 4),
                        sinusoids: GrayImage::from_pixel(4, 4, image::Luma([i as u8])),
                    }),
                },
            );
        }
        artifact
    }

    #[test]
    fn chunk_names_are_one_based() {
        assert_eq!(
            chunk_path(Path::new("/t"), "hough_data_p", 1),
            Path::new("/t/hough_data_p_part1.json")
        );
    }

    #[test]
    fn has_chunks_matches_exact_base() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_chunks(dir.path(), "hough_data_a").unwrap());
        fs::write(dir.path().join("hough_data_ab_part1.json"), "{}").unwrap();
        assert!(!has_chunks(dir.path(), "hough_data_a").unwrap());
        fs::write(dir.path().join("hough_data_a_part2.json"), "{}").unwrap();
        assert!(has_chunks(dir.path(), "hough_data_a").unwrap());
        assert!(!has_chunks(&dir.path().join("absent"), "hough_data_a").unwrap());
    }

    #[test]
    fn small_cap_splits_into_capped_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = artifact("p", 5);
        let one_record = serde_json::to_string(&TransportRecord::from_artifact(
            "p/img0.png",
            &source.images["img0.png"].artifact,
        )
        .unwrap())
        .unwrap()
        .len();
        let cap = one_record * 2 + 40;

        let files = write_chunks(&source, dir.path(), "hough_data_p", cap).unwrap();
        assert!(files.len() >= 2, "expected several chunks, got {}", files.len());
        for (i, file) in files.iter().enumerate() {
            assert_eq!(file, &chunk_path(dir.path(), "hough_data_p", i + 1));
            let len = fs::metadata(file).unwrap().len();
            let records = read_transport_file(file).unwrap();
            assert!(len <= cap as u64 || records.len() == 1);
        }

        let all = read_transport_dir(dir.path()).unwrap();
        assert_eq!(all.len(), 5);
        let Artifact::Hough(original) = &source.images["img3.png"].artifact else {
            unreachable!()
        };
        assert_eq!(all["p/img3.png"].decode("edges").unwrap(), original.edges);
    }

    #[test]
    fn failed_rename_removes_earlier_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let source = artifact("p", 3);
        // One record per chunk.
        let cap = 1;
        // A directory in the way of the second chunk makes its rename fail.
        fs::create_dir(chunk_path(dir.path(), "hough_data_p", 2)).unwrap();

        let result = write_chunks(&source, dir.path(), "hough_data_p", cap);
        assert!(matches!(result, Err(IoError::Write { .. })));
        assert!(!chunk_path(dir.path(), "hough_data_p", 1).exists());
        assert!(!chunk_path(dir.path(), "hough_data_p", 3).exists());
    }

    #[test]
    fn same_key_in_two_partitions_keeps_both_records() {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(&artifact("a", 1), dir.path(), "hough_data_a", 1 << 20).unwrap();
        write_chunks(&artifact("b", 1), dir.path(), "hough_data_b", 1 << 20).unwrap();

        let all = read_transport_dir(dir.path()).unwrap();
        let paths: Vec<_> = all.keys().map(String::as_str).collect();
        assert_eq!(paths, ["a/img0.png", "b/img0.png"]);
    }

    #[test]
    fn empty_artifact_writes_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_chunks(&artifact("p", 0), dir.path(), "hough_data_p", 1024).unwrap();
        assert!(files.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_skips_partitions_with_chunks() {
        let out = tempfile::tempdir().unwrap();
        let transport = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(out.path(), Variant::Hough);
        store.write(&artifact("a", 2)).unwrap();
        store.write(&artifact("b", 1)).unwrap();
        fs::write(transport.path().join("hough_data_b_part1.json"), "{}").unwrap();

        let outcomes = export_artifacts(&store, transport.path(), 1 << 20).unwrap();
        assert_eq!(
            outcomes,
            [
                ExportOutcome {
                    partition: "a".to_string(),
                    status: ExportStatus::Written {
                        files: 1,
                        records: 2
                    },
                },
                ExportOutcome {
                    partition: "b".to_string(),
                    status: ExportStatus::Skipped,
                },
            ]
        );

        let again = export_artifacts(&store, transport.path(), 1 << 20).unwrap();
        assert!(again.iter().all(|o| o.status == ExportStatus::Skipped));
    }

    #[test]
    fn corrupt_artifact_fails_only_its_partition() {
        let out = tempfile::tempdir().unwrap();
        let transport = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(out.path(), Variant::Hough);
        fs::write(store.path_for("bad"), b"garbage").unwrap();
        store.write(&artifact("good", 1)).unwrap();

        let outcomes = export_artifacts(&store, transport.path(), 1 << 20).unwrap();
        assert!(matches!(outcomes[0].status, ExportStatus::Failed { .. }));
        assert!(matches!(outcomes[1].status, ExportStatus::Written { .. }));
        assert!(!has_chunks(transport.path(), "hough_data_bad").unwrap());
    }

    #[test]
    fn malformed_transport_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x_part1.json"), "[1,2]").unwrap();
        assert!(matches!(
            read_transport_dir(dir.path()),
            Err(IoError::TransportParse { .. })
        ));
    }
}
