//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs take images as base64 inside the JSON request body. PNG keeps
//! small timetable text crisp; JPEG artefacts around thin grid lines and
//! 8-point room numbers measurably hurt reading accuracy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use tracing::debug;

/// Downscale `img` so neither edge exceeds `max_pixels`, then PNG-encode it.
///
/// Images already within the cap are encoded as-is.
pub fn encode_image(img: &DynamicImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let (w, h) = img.dimensions();
    let resized;
    let img = if w > max_pixels || h > max_pixels {
        // `resize` preserves aspect ratio and fits within the bounds.
        resized = img.resize(max_pixels, max_pixels, FilterType::Lanczos3);
        debug!(
            "Downscaled image {}x{} → {}x{}",
            w,
            h,
            resized.width(),
            resized.height()
        );
        &resized
    } else {
        img
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn decode(data: &ImageData) -> DynamicImage {
        let bytes = STANDARD.decode(&data.data).expect("valid base64");
        image::load_from_memory(&bytes).expect("valid png")
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255])));
        let data = encode_image(&img, 3072).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(decode(&data).dimensions(), (10, 10));
    }

    #[test]
    fn downscales_long_edge() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 100, Rgba([0, 0, 0, 255])));
        let data = encode_image(&img, 200).unwrap();
        assert_eq!(decode(&data).dimensions(), (200, 50));
    }
}
