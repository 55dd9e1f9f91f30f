//! Image decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG or JPEG) and produces a single-channel
//! grayscale image. Color inputs are reduced with the `image` crate's
//! luminance weights.

use image::GrayImage;

use crate::types::PipelineError;

/// Decode raw image bytes and convert to grayscale.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_and_grayscale(bytes: &[u8]) -> Result<GrayImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_luma8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &image::RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode_and_grayscale(&[]);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_and_grayscale(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn color_png_decodes_to_grayscale() {
        let img = image::RgbImage::from_pixel(17, 31, image::Rgb([255, 255, 255]));
        let gray = decode_and_grayscale(&encode_png(&img)).unwrap();
        assert_eq!(gray.dimensions(), (17, 31));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn green_is_brighter_than_red_is_brighter_than_blue() {
        let luma = |rgb: [u8; 3]| {
            let img = image::RgbImage::from_pixel(1, 1, image::Rgb(rgb));
            decode_and_grayscale(&encode_png(&img)).unwrap().get_pixel(0, 0).0[0]
        };
        let (r, g, b) = (luma([255, 0, 0]), luma([0, 255, 0]), luma([0, 0, 255]));
        assert!(g > r && r > b, "R={r} G={g} B={b}");
    }
}
