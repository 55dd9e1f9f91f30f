//! One image's rasters in transport form.

use std::collections::BTreeMap;

use houghscan_pipeline::{Artifact, GrayImage};
use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, EncodedArray};

/// Transport record for one image.
///
/// Rasters are stored as top-level keys next to `path` and `shape`:
///
/// ```json
/// { "path": "p1/a.jpg", "shape": [30, 40], "hough_sinusoids": { "shape": .., "dtype": .., "data": .. }, .. }
/// ```
///
/// Raster names are `edges`, `accumulator`, `hough_sinusoids`, or
/// `gradient_magnitude`, `gradient_angle`, `nonmaxima`, `hysteresis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRecord {
    /// Source image path, relative to the corpus root.
    pub path: String,
    /// Working image `[rows, cols]`.
    pub shape: [u32; 2],
    /// Encoded rasters by name.
    #[serde(flatten)]
    pub arrays: BTreeMap<String, EncodedArray>,
}

impl TransportRecord {
    /// Encode every raster of `artifact`.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError`] from the encoder.
    pub fn from_artifact(path: impl Into<String>, artifact: &Artifact) -> Result<Self, CodecError> {
        let arrays = artifact
            .rasters()
            .into_iter()
            .map(|(name, raster)| Ok((name.to_string(), codec::encode_gray(raster)?)))
            .collect::<Result<BTreeMap<_, _>, CodecError>>()?;
        let (rows, cols) = artifact.shape().shape();
        Ok(Self {
            path: path.into(),
            shape: [rows, cols],
            arrays,
        })
    }

    /// Decode the raster stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingArray`] if there is no such raster,
    /// or the decoder's error if it is corrupt.
    pub fn decode(&self, name: &str) -> Result<GrayImage, CodecError> {
        let array = self
            .arrays
            .get(name)
            .ok_or_else(|| CodecError::MissingArray(name.to_string()))?;
        codec::decode_gray(array)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use houghscan_pipeline::{Dimensions, HoughArtifact};

    use super::*;

    fn artifact() -> Artifact {
        let edges = GrayImage::from_fn(6, 4, |x, y| image::Luma([if x == y { 255 } else { 0 }]));
        Artifact::Hough(HoughArtifact {
            shape: Dimensions::of(&edges),
            edges,
            accumulator: GrayImage::from_pixel(3, 2, image::Luma([7])),
            sinusoids: GrayImage::from_pixel(3, 2, image::Luma([9])),
        })
    }

    #[test]
    fn record_holds_every_raster() {
        let record = TransportRecord::from_artifact("p1/a.jpg", &artifact()).unwrap();
        assert_eq!(record.path, "p1/a.jpg");
        assert_eq!(record.shape, [4, 6]);
        let names: Vec<_> = record.arrays.keys().map(String::as_str).collect();
        assert_eq!(names, ["accumulator", "edges", "hough_sinusoids"]);
        assert_eq!(record.arrays["accumulator"].shape, [2, 3]);
    }

    #[test]
    fn decode_returns_original_raster() {
        let source = artifact();
        let record = TransportRecord::from_artifact("a.png", &source).unwrap();
        let Artifact::Hough(hough) = source else {
            unreachable!()
        };
        assert_eq!(record.decode("edges").unwrap(), hough.edges);
        assert_eq!(record.decode("hough_sinusoids").unwrap(), hough.sinusoids);
    }

    #[test]
    fn missing_array_is_an_error() {
        let record = TransportRecord::from_artifact("a.png", &artifact()).unwrap();
        assert!(matches!(
            record.decode("gradient_angle"),
            Err(CodecError::MissingArray(name)) if name == "gradient_angle"
        ));
    }

    #[test]
    fn rasters_are_top_level_json_keys() {
        let record = TransportRecord::from_artifact("p1/a.jpg", &artifact()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["hough_sinusoids"]["data"].is_string());
        assert_eq!(value["hough_sinusoids"]["dtype"], "uint8");
        assert_eq!(value["path"], "p1/a.jpg");
        assert!(value.get("arrays").is_none());
    }

    #[test]
    fn record_survives_json() {
        let record = TransportRecord::from_artifact("a.png", &artifact()).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: TransportRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
