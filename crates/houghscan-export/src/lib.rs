//! houghscan-export: Pure transport encoders (sans-IO)
//!
//! Converts extracted rasters into the JSON transport form consumed by
//! downstream indexing and visualization tools:
//!
//! - [`codec`]: gzip + base64 array encoding with numpy dtype tags.
//! - [`record`]: one image's arrays keyed by raster name.
//! - [`chunk`]: splitting a stream of records into size-capped JSON
//!   objects.

pub mod chunk;
pub mod codec;
pub mod record;

pub use chunk::{ChunkPlanner, DEFAULT_MAX_CHUNK_BYTES, JsonChunker};
pub use codec::{CodecError, Dtype, Element, EncodedArray, decode, decode_gray, encode, encode_gray};
pub use record::TransportRecord;
