//! JPEG re-encoding of rendered pages.

use image::{DynamicImage, RgbImage};
use std::borrow::Cow;

use crate::error::CompressError;
use crate::rasterize::RasterPage;

/// A page encoded as baseline JPEG, ready to embed with `DCTDecode`.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Normalize to 8-bit RGB and encode at `quality` with optimized Huffman
/// tables. `page` is the 1-based page number used in error messages.
pub fn encode_page(img: &RasterPage, quality: u8, page: usize) -> Result<EncodedPage, CompressError> {
    let rgb = to_rgb(img);
    let (width, height) = rgb.dimensions();

    if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(CompressError::EncodingFailure {
            page,
            detail: format!("{}x{} px is outside the JPEG size limits", width, height),
        });
    }

    let mut jpeg = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg, quality);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(
            rgb.as_raw(),
            width as u16,
            height as u16,
            jpeg_encoder::ColorType::Rgb,
        )
        .map_err(|e| CompressError::EncodingFailure {
            page,
            detail: e.to_string(),
        })?;

    Ok(EncodedPage {
        jpeg,
        width,
        height,
    })
}

fn to_rgb(img: &DynamicImage) -> Cow<'_, RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    }
}
