//! Central face crop used to strip pose and context from identity references.

use std::io::Cursor;

use hyperreal_remote::ImagePayload;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// Side of the crop square as a fraction of the shorter image dimension.
pub const CROP_FRACTION: f64 = 0.52;

/// Upward shift of the crop centre as a fraction of image height.
pub const VERTICAL_BIAS: f64 = 0.05;

/// Crop rectangle `(x, y, side)` for an image of `width` x `height`.
pub fn crop_region(width: u32, height: u32) -> (u32, u32, u32) {
    let shorter = width.min(height);
    let side = ((shorter as f64 * CROP_FRACTION).round() as u32).clamp(1, shorter.max(1));

    let x = width.saturating_sub(side) / 2;
    let center_y = height as f64 / 2.0 - height as f64 * VERTICAL_BIAS;
    let top = (center_y - side as f64 / 2.0).round();
    let max_top = height.saturating_sub(side) as f64;
    let y = top.clamp(0.0, max_top) as u32;

    (x, y, side)
}

/// Crop `image` to its upper-central face region and re-encode it as PNG.
///
/// Anything that cannot be decoded or encoded is returned unchanged.
pub fn crop(image: &ImagePayload) -> ImagePayload {
    match try_crop(image) {
        Ok(cropped) => cropped,
        Err(e) => {
            debug!(mime = %image.mime_type(), error = %e, "Crop skipped, keeping original reference");
            image.clone()
        }
    }
}

fn try_crop(image: &ImagePayload) -> Result<ImagePayload, image::ImageError> {
    let decoded = image::load_from_memory(image.bytes())?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Ok(image.clone());
    }
    let (x, y, side) = crop_region(decoded.width(), decoded.height());
    let cropped: DynamicImage = decoded.crop_imm(x, y, side, side);

    let mut out = Cursor::new(Vec::new());
    cropped.write_to(&mut out, ImageFormat::Png)?;
    Ok(ImagePayload::png(out.into_inner()))
}
