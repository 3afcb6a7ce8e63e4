//! Image-file convenience I/O for frames and mosaic previews.

use std::path::Path;

use image::{ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;
use tracing::debug;

use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::mosaic::MosaicResult;

/// Load a grayscale image file as a frame with values normalised to [0, 1].
/// Colour images are reduced to luminance.
pub fn load_frame(path: &Path, id: impl Into<String>) -> Result<ImageFrame> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();

    let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    });

    let frame = ImageFrame::new(id, data);
    debug!(path = %path.display(), frame = frame.id(), width = w, height = h, "Frame loaded");
    Ok(frame)
}

/// Write a 16-bit preview of the mosaic intensity, stretched linearly over
/// the covered min/max. Uncovered pixels are written as 0.
///
/// The format follows the extension: `.png`, or TIFF otherwise.
pub fn save_mosaic(result: &MosaicResult, path: &Path) -> Result<()> {
    let (lo, hi) = covered_range(result).ok_or(MosaicError::EmptyMosaic)?;
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (h, w) = result.intensity.dim();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(w as u32, h as u32, |x, y| {
        let (row, col) = (y as usize, x as usize);
        let v = result.intensity[[row, col]];
        if !result.has_coverage(row, col) || !v.is_finite() {
            return Luma([0]);
        }
        let t = ((v - lo) / span).clamp(0.0, 1.0);
        Luma([(t * 65535.0).round() as u16])
    });

    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => ImageFormat::Png,
        _ => ImageFormat::Tiff,
    };
    img.save_with_format(path, format)?;
    debug!(path = %path.display(), width = w, height = h, "Mosaic preview written");
    Ok(())
}

fn covered_range(result: &MosaicResult) -> Option<(f32, f32)> {
    let mut range: Option<(f32, f32)> = None;
    for ((row, col), &v) in result.intensity.indexed_iter() {
        if !v.is_finite() || !result.has_coverage(row, col) {
            continue;
        }
        range = Some(match range {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    range
}
