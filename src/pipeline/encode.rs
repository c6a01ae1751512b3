//! Image encoding: `DynamicImage` → base64 JPEG wrapped in a [`PageImage`].
//!
//! Page thumbnails double as the image part of every generation request, so
//! they are kept small: JPEG at quality 80 by default. The alpha channel is
//! dropped before encoding since JPEG cannot carry it.

use crate::document::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode a rasterised page as a base64 JPEG.
pub fn encode_page(img: &DynamicImage, quality: u8) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(&img.to_rgb8())?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(PageImage::jpeg(b64))
}
