//! houghscan-io: Filesystem side of houghscan.
//!
//! Walks a corpus laid out as one directory per partition, runs the
//! pure extraction pipeline on a bounded worker pool, stores one
//! artifact file per partition, and converts artifacts into chunked
//! JSON transport files for downstream consumers.
//!
//! All logging happens here, through `tracing`. The binary decides
//! where it goes.

pub mod batch;
pub mod error;
pub mod partition;
pub mod store;
pub mod transport;

pub use batch::{BatchConfig, BatchOrchestrator, BatchReport};
pub use error::{ImageError, IoError};
pub use partition::{PartitionOutcome, PartitionProcessor, PartitionStatus};
pub use store::{ArtifactStore, ImageEntry, PartitionArtifact};
pub use transport::{ExportOutcome, ExportStatus, export_artifacts, read_transport_dir};
