//! Compact array encoding for transport.
//!
//! An array is stored as its little-endian element bytes, gzip
//! compressed, then base64 encoded (standard alphabet, padded):
//!
//! ```json
//! { "shape": [rows, cols], "dtype": "uint8", "data": "H4sIAAAA..." }
//! ```
//!
//! The `dtype` tag uses numpy names so consumers can rebuild the array
//! with `np.frombuffer(gzip.decompress(b64decode(data)), dtype).reshape(shape)`.
//! Decoding validates every step and never substitutes zeroed data.

use std::fmt;
use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use houghscan_pipeline::GrayImage;
use serde::{Deserialize, Serialize};

/// Element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// `u8`.
    Uint8,
    /// `u16`, little-endian.
    Uint16,
    /// `u32`, little-endian.
    Uint32,
    /// `f32`, little-endian IEEE 754.
    Float32,
}

impl Dtype {
    /// Numpy dtype name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
        }
    }

    /// Bytes per element.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 | Self::Float32 => 4,
        }
    }

    /// Parse a numpy dtype name.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownDtype`] for any other tag.
    pub fn parse(tag: &str) -> Result<Self, CodecError> {
        match tag {
            "uint8" => Ok(Self::Uint8),
            "uint16" => Ok(Self::Uint16),
            "uint32" => Ok(Self::Uint32),
            "float32" => Ok(Self::Float32),
            other => Err(CodecError::UnknownDtype(other.to_string())),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed-size numeric element that can be stored in an [`EncodedArray`].
pub trait Element: Copy {
    /// Tag written alongside the data.
    const DTYPE: Dtype;

    /// Append the little-endian bytes of `self`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element from exactly [`Dtype::size`] bytes.
    fn read_le(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(<$ty>::from_le_bytes)
            }
        }
    };
}

impl_element!(u8, Dtype::Uint8);
impl_element!(u16, Dtype::Uint16);
impl_element!(u32, Dtype::Uint32);
impl_element!(f32, Dtype::Float32);

/// A 2D array in transport form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedArray {
    /// `[rows, cols]`.
    pub shape: [usize; 2],
    /// Numpy dtype name, see [`Dtype`].
    pub dtype: String,
    /// Base64 of the gzip-compressed little-endian element bytes.
    pub data: String,
}

impl EncodedArray {
    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.shape[1]
    }
}

/// Errors from encoding or decoding an [`EncodedArray`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Element count does not match `rows * cols`.
    #[error("{len} elements do not fill a {rows}x{cols} array")]
    ShapeMismatch {
        /// Declared rows.
        rows: usize,
        /// Declared columns.
        cols: usize,
        /// Actual element count.
        len: usize,
    },

    /// `rows * cols * element size` does not fit in memory.
    #[error("shape {rows}x{cols} is too large")]
    ShapeOverflow {
        /// Declared rows.
        rows: usize,
        /// Declared columns.
        cols: usize,
    },

    /// The `data` field is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Gzip compression or decompression failed.
    #[error("gzip stream is corrupt or truncated: {0}")]
    Gzip(#[source] std::io::Error),

    /// The `dtype` tag is not one this codec understands.
    #[error("unknown dtype {0:?}")]
    UnknownDtype(String),

    /// The stored dtype differs from the requested element type.
    #[error("dtype mismatch: stored {stored}, requested {requested}")]
    DtypeMismatch {
        /// Tag found in the array.
        stored: Dtype,
        /// Tag of the requested element type.
        requested: Dtype,
    },

    /// Decompressed byte count does not match the shape.
    #[error("payload has {actual} bytes, shape needs {expected}")]
    ByteLength {
        /// Bytes required by shape and dtype.
        expected: usize,
        /// Bytes found (may be truncated at `expected + 1`).
        actual: usize,
    },

    /// A record has no array under the requested name.
    #[error("record has no array named {0:?}")]
    MissingArray(String),
}

/// Encode `values` as a `rows` by `cols` array.
///
/// # Errors
///
/// Returns [`CodecError::ShapeMismatch`] if `values.len() != rows * cols`.
pub fn encode<T: Element>(rows: usize, cols: usize, values: &[T]) -> Result<EncodedArray, CodecError> {
    if rows.checked_mul(cols) != Some(values.len()) {
        return Err(CodecError::ShapeMismatch {
            rows,
            cols,
            len: values.len(),
        });
    }

    let mut raw = Vec::with_capacity(values.len() * T::DTYPE.size());
    for &v in values {
        v.write_le(&mut raw);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).map_err(CodecError::Gzip)?;
    let compressed = encoder.finish().map_err(CodecError::Gzip)?;

    Ok(EncodedArray {
        shape: [rows, cols],
        dtype: T::DTYPE.as_str().to_string(),
        data: STANDARD.encode(compressed),
    })
}

/// Decode an array into `(rows, cols, values)`.
///
/// # Errors
///
/// Returns a [`CodecError`] for bad base64, a corrupt or truncated gzip
/// stream, an unknown or mismatched dtype, or a byte count that does not
/// match the shape.
pub fn decode<T: Element>(array: &EncodedArray) -> Result<(usize, usize, Vec<T>), CodecError> {
    let compressed = STANDARD.decode(&array.data)?;

    let stored = Dtype::parse(&array.dtype)?;
    if stored != T::DTYPE {
        return Err(CodecError::DtypeMismatch {
            stored,
            requested: T::DTYPE,
        });
    }

    let [rows, cols] = array.shape;
    let size = stored.size();
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(size))
        .ok_or(CodecError::ShapeOverflow { rows, cols })?;

    // Read at most one byte past the expected length so an oversized
    // payload is detected without inflating all of it.
    let limit = u64::try_from(expected)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or(CodecError::ShapeOverflow { rows, cols })?;
    // Deflate expands at most ~1032:1, so the shape alone never sizes
    // the buffer.
    let mut raw = Vec::with_capacity(expected.min(compressed.len().saturating_mul(1032)));
    GzDecoder::new(compressed.as_slice())
        .take(limit)
        .read_to_end(&mut raw)
        .map_err(CodecError::Gzip)?;
    if raw.len() != expected {
        return Err(CodecError::ByteLength {
            expected,
            actual: raw.len(),
        });
    }

    let values = raw
        .chunks_exact(size)
        .map(T::read_le)
        .collect::<Option<Vec<T>>>()
        .ok_or(CodecError::ByteLength {
            expected,
            actual: raw.len(),
        })?;
    Ok((rows, cols, values))
}

/// Encode an 8-bit raster with shape `[height, width]`.
///
/// # Errors
///
/// Propagates [`encode`] errors.
pub fn encode_gray(image: &GrayImage) -> Result<EncodedArray, CodecError> {
    encode(image.height() as usize, image.width() as usize, image.as_raw())
}

/// Decode an 8-bit raster.
///
/// # Errors
///
/// Propagates [`decode`] errors, and returns
/// [`CodecError::ShapeOverflow`] if a side exceeds `u32::MAX`.
pub fn decode_gray(array: &EncodedArray) -> Result<GrayImage, CodecError> {
    let (rows, cols, values) = decode::<u8>(array)?;
    let overflow = CodecError::ShapeOverflow { rows, cols };
    let (Ok(width), Ok(height)) = (u32::try_from(cols), u32::try_from(rows)) else {
        return Err(overflow);
    };
    GrayImage::from_raw(width, height, values).ok_or(overflow)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nine_values_round_trip_as_uint8() {
        let values: Vec<u8> = (0..9).collect();
        let encoded = encode(3, 3, &values).unwrap();
        assert_eq!(encoded.shape, [3, 3]);
        assert_eq!(encoded.dtype, "uint8");
        let (rows, cols, decoded) = decode::<u8>(&encoded).unwrap();
        assert_eq!((rows, cols), (3, 3));
        assert_eq!(decoded, values);
    }

    #[test]
    fn huge_declared_shape_is_a_length_error() {
        let mut encoded = encode(1, 1, &[7u8]).unwrap();
        encoded.shape = [1 << 30, 1 << 30];
        let err = decode::<u8>(&encoded).unwrap_err();
        assert!(
            matches!(err, CodecError::ByteLength { actual: 1, .. } | CodecError::ShapeOverflow { .. }),
            "{err}",
        );
    }

    #[test]
    fn all_zero_and_single_element_round_trip() {
        let zeros = vec![0u32; 180 * 180];
        let (_, _, decoded) = decode::<u32>(&encode(180, 180, &zeros).unwrap()).unwrap();
        assert_eq!(decoded, zeros);

        let (rows, cols, one) = decode::<u16>(&encode(1, 1, &[65_535u16]).unwrap()).unwrap();
        assert_eq!((rows, cols, one), (1, 1, vec![65_535]));
    }

    #[test]
    fn float_round_trip_is_bit_exact() {
        let values = [0.0f32, -1.5, f32::MIN_POSITIVE, 3.25e7];
        let (_, _, decoded) = decode::<f32>(&encode(2, 2, &values).unwrap()).unwrap();
        assert_eq!(
            decoded.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            values.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn payload_is_gzip_of_little_endian_bytes() {
        let encoded = encode(1, 2, &[0x0102u16, 0x0304]).unwrap();
        let compressed = STANDARD.decode(&encoded.data).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        let mut raw = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut raw).unwrap();
        assert_eq!(raw, [0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn encode_rejects_wrong_length() {
        let err = encode(2, 3, &[1u8; 5]).unwrap_err();
        assert!(matches!(err, CodecError::ShapeMismatch { len: 5, .. }));
    }

    #[test]
    fn bad_base64_is_an_error() {
        let mut encoded = encode(1, 1, &[7u8]).unwrap();
        encoded.data = "not*base64".to_string();
        assert!(matches!(decode::<u8>(&encoded), Err(CodecError::Base64(_))));
    }

    #[test]
    fn truncated_gzip_is_an_error() {
        let mut encoded = encode(4, 4, &[9u8; 16]).unwrap();
        let mut compressed = STANDARD.decode(&encoded.data).unwrap();
        compressed.truncate(compressed.len() / 2);
        encoded.data = STANDARD.encode(compressed);
        assert!(matches!(decode::<u8>(&encoded), Err(CodecError::Gzip(_))));
    }

    #[test]
    fn plain_bytes_are_not_gzip() {
        let mut encoded = encode(1, 3, &[1u8, 2, 3]).unwrap();
        encoded.data = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(decode::<u8>(&encoded), Err(CodecError::Gzip(_))));
    }

    #[test]
    fn dtype_mismatch_is_an_error() {
        let encoded = encode(1, 2, &[1u8, 2]).unwrap();
        assert!(matches!(
            decode::<u16>(&encoded),
            Err(CodecError::DtypeMismatch {
                stored: Dtype::Uint8,
                requested: Dtype::Uint16,
            })
        ));
    }

    #[test]
    fn unknown_dtype_is_an_error() {
        let mut encoded = encode(1, 1, &[1u8]).unwrap();
        encoded.dtype = "complex128".to_string();
        assert!(matches!(
            decode::<u8>(&encoded),
            Err(CodecError::UnknownDtype(tag)) if tag == "complex128"
        ));
    }

    #[test]
    fn shape_disagreeing_with_payload_is_an_error() {
        let mut encoded = encode(2, 2, &[1u8; 4]).unwrap();
        encoded.shape = [2, 3];
        assert!(matches!(
            decode::<u8>(&encoded),
            Err(CodecError::ByteLength {
                expected: 6,
                actual: 4
            })
        ));

        encoded.shape = [1, 2];
        assert!(matches!(
            decode::<u8>(&encoded),
            Err(CodecError::ByteLength {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn gray_raster_shape_is_rows_then_cols() {
        let image = GrayImage::from_fn(5, 2, |x, y| image::Luma([(y * 5 + x) as u8]));
        let encoded = encode_gray(&image).unwrap();
        assert_eq!(encoded.shape, [2, 5]);
        assert_eq!(decode_gray(&encoded).unwrap(), image);
    }

    #[test]
    fn json_form_matches_wire_layout() {
        let encoded = encode(1, 1, &[0u8]).unwrap();
        let json = serde_json::to_value(&encoded).unwrap();
        assert_eq!(json["shape"], serde_json::json!([1, 1]));
        assert_eq!(json["dtype"], "uint8");
        assert!(json["data"].is_string());
    }
}
