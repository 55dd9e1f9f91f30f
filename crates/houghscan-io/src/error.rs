//! Error types for filesystem operations.

use std::path::PathBuf;

use houghscan_export::CodecError;
use houghscan_pipeline::PipelineError;

/// Errors from batch, store, and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing or renaming a file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Listing a directory failed.
    #[error("failed to list {path}: {source}")]
    List {
        /// Directory that could not be listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing a partition artifact failed.
    #[error("failed to encode partition artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A partition artifact file is corrupt or from an incompatible version.
    #[error("failed to decode partition artifact {path}: {source}")]
    Decode {
        /// Artifact file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: bincode::error::DecodeError,
    },

    /// Serializing transport JSON failed.
    #[error("failed to serialize transport record: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport file is not a JSON object of records.
    #[error("failed to parse transport file {path}: {source}")]
    TransportParse {
        /// Transport file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Encoding a raster for transport failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The extraction configuration is invalid.
    #[error(transparent)]
    Config(#[from] PipelineError),

    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a single image was left out of its partition artifact.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The file could not be read.
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    /// Decoding or extraction failed.
    #[error("extraction failed: {0}")]
    Extract(#[from] PipelineError),

    /// The extraction panicked.
    #[error("extraction panicked: {0}")]
    Panic(String),
}

/// Maximum characters of an error message kept in a warning.
pub const MAX_WARNING_CHARS: usize = 200;

/// Truncate `message` to [`MAX_WARNING_CHARS`] characters.
#[must_use]
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_WARNING_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_message("bad header"), "bad header");
    }

    #[test]
    fn long_messages_are_cut_on_char_boundaries() {
        let message = "é".repeat(300);
        let cut = truncate_message(&message);
        assert_eq!(cut.chars().count(), MAX_WARNING_CHARS);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn image_error_names_its_cause() {
        let err = ImageError::Extract(PipelineError::EmptyInput);
        assert_eq!(err.to_string(), "extraction failed: input image data is empty");
    }
}
