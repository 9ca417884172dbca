use std::path::Path;

use image::{ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, StitchError};

/// Load an image file as a 16-bit grayscale plane of shape (height, width).
///
/// 8-bit sources are widened by the decoder to the full 16-bit range.
pub fn load_gray16(path: &Path) -> Result<Array2<u16>> {
    let img = image::open(path)?;
    let gray = img.into_luma16();
    let (w, h) = gray.dimensions();
    let data = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| StitchError::Config(format!("{}: {e}", path.display())))?;
    Ok(data)
}

fn to_buffer(plane: &ArrayView2<u16>) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
    let (h, w) = plane.dim();
    let pixels: Vec<u16> = plane.iter().copied().collect();
    ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels).ok_or_else(|| {
        StitchError::Config(format!("Pixel buffer does not match {w}x{h} dimensions"))
    })
}

/// Save a plane as a single-page 16-bit grayscale TIFF.
pub fn save_gray16_tiff(plane: &ArrayView2<u16>, path: &Path) -> Result<()> {
    let img = to_buffer(plane)?;
    img.save_with_format(path, image::ImageFormat::Tiff)?;
    Ok(())
}

/// Resize a plane with a triangle (bilinear) filter.
pub fn resize_gray16(plane: &ArrayView2<u16>, height: usize, width: usize) -> Result<Array2<u16>> {
    let img = to_buffer(plane)?;
    let resized = image::imageops::resize(
        &img,
        width.max(1) as u32,
        height.max(1) as u32,
        image::imageops::FilterType::Triangle,
    );
    let (w, h) = resized.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), resized.into_raw())
        .map_err(|e| StitchError::Config(format!("Resize produced a bad buffer: {e}")))
}
