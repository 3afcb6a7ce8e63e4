//! Coarse-to-fine location of a single broad PSF and integer recentering of
//! the frame onto a target pixel.
//!
//! The PSF is first found on a block-median rebinned copy of the frame, the
//! search is narrowed to a few blocks around it and repeated at finer block
//! size, and the final position is the centre of mass of the raw pixels in a
//! window around that estimate.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{
    DEFAULT_RECENTER_COL, DEFAULT_RECENTER_REBIN, DEFAULT_RECENTER_ROW,
    DEFAULT_RECENTER_TOLERANCE_PX,
};
use crate::detect::validate_frame;
use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::stats::median;
use crate::transform::{Affine, Mapping};

/// Side of the narrowed search window, in first-pass blocks. The final
/// centre-of-mass pass uses the same window, so it spans the whole PSF
/// and its edges: a box lying inside the flat top of a defocused PSF has
/// its own centre as centre of mass and cannot resolve the PSF position.
const WINDOW_BLOCKS: f64 = 4.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecenterConfig {
    /// Row the PSF centre should end up on.
    #[serde(default = "default_row")]
    pub target_row: f64,
    /// Column the PSF centre should end up on.
    #[serde(default = "default_col")]
    pub target_col: f64,
    /// Blocks per axis in each rebinning pass.
    #[serde(default = "default_rebin")]
    pub rebin_size: usize,
    /// Offsets up to this many pixels leave the frame untouched.
    #[serde(default = "default_tolerance")]
    pub tolerance_px: f64,
}

fn default_row() -> f64 {
    DEFAULT_RECENTER_ROW
}
fn default_col() -> f64 {
    DEFAULT_RECENTER_COL
}
fn default_rebin() -> usize {
    DEFAULT_RECENTER_REBIN
}
fn default_tolerance() -> f64 {
    DEFAULT_RECENTER_TOLERANCE_PX
}

impl Default for RecenterConfig {
    fn default() -> Self {
        Self {
            target_row: DEFAULT_RECENTER_ROW,
            target_col: DEFAULT_RECENTER_COL,
            rebin_size: DEFAULT_RECENTER_REBIN,
            tolerance_px: DEFAULT_RECENTER_TOLERANCE_PX,
        }
    }
}

impl RecenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rebin_size == 0 {
            return Err(MosaicError::InvalidConfig("rebin_size must be positive".into()));
        }
        if !self.tolerance_px.is_finite() || self.tolerance_px < 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "tolerance_px must be non-negative, got {}",
                self.tolerance_px
            )));
        }
        if !self.target_row.is_finite() || !self.target_col.is_finite() {
            return Err(MosaicError::InvalidConfig("recenter target must be finite".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RecenterOutcome {
    /// The rolled frame, or the input frame when no move was needed.
    pub frame: ImageFrame,
    pub located_row: f64,
    pub located_col: f64,
    pub shift_rows: i64,
    pub shift_cols: i64,
    pub moved: bool,
}

/// Half-open pixel region `[row0, row1) x [col0, col1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Region {
    row0: usize,
    row1: usize,
    col0: usize,
    col1: usize,
}

impl Region {
    fn rows(&self) -> usize {
        self.row1 - self.row0
    }

    fn cols(&self) -> usize {
        self.col1 - self.col0
    }

    /// Window of `len_rows x len_cols` starting at the given (possibly
    /// negative) offsets, clipped to `bounds`.
    fn clipped(start_row: f64, start_col: f64, len_rows: f64, len_cols: f64, bounds: &Region) -> Region {
        let clamp = |v: f64, lo: usize, hi: usize| (v.floor().max(lo as f64) as usize).min(hi);
        Region {
            row0: clamp(start_row, bounds.row0, bounds.row1),
            row1: clamp(start_row + len_rows, bounds.row0, bounds.row1),
            col0: clamp(start_col, bounds.col0, bounds.col1),
            col1: clamp(start_col + len_cols, bounds.col0, bounds.col1),
        }
    }
}

/// Locate the PSF centre `(row, col)` in frame pixel coordinates.
pub fn locate_psf(frame: &ImageFrame, rebin_size: usize) -> Result<(f64, f64)> {
    validate_frame(frame)?;
    let no_signal = || MosaicError::invalid_frame(frame.id(), "no PSF signal found");

    let values: Vec<f64> = frame.valid_values().iter().map(|&v| v as f64).collect();
    let background = median(&values).ok_or_else(no_signal)?;

    let full = Region {
        row0: 0,
        row1: frame.height(),
        col0: 0,
        col1: frame.width(),
    };

    // First pass fixes the final window size; the second refines its centre.
    let (block_rows, block_cols, coarse) =
        block_centre(frame, &full, rebin_size, background).ok_or_else(no_signal)?;
    let window_rows = WINDOW_BLOCKS * block_rows;
    let window_cols = WINDOW_BLOCKS * block_cols;
    let search = Region::clipped(
        coarse.0 - window_rows / 2.0,
        coarse.1 - window_cols / 2.0,
        window_rows,
        window_cols,
        &full,
    );
    let (_, _, fine) = block_centre(frame, &search, rebin_size, background).ok_or_else(no_signal)?;

    let last = Region::clipped(
        fine.0 - window_rows / 2.0,
        fine.1 - window_cols / 2.0,
        window_rows,
        window_cols,
        &full,
    );
    let centre = pixel_centre_of_mass(frame, &last, background).ok_or_else(no_signal)?;

    debug!(
        frame = frame.id(),
        coarse_row = coarse.0,
        coarse_col = coarse.1,
        row = centre.0,
        col = centre.1,
        "PSF located"
    );
    Ok(centre)
}

/// Locate the PSF and, if it is further than the tolerance from the target,
/// roll the frame (data and mask, wrapping around) by the integer offset
/// that brings it there. The offset is `target - located` rounded to the
/// nearest pixel, so the PSF lands within half a pixel of the target.
pub fn recenter(frame: ImageFrame, config: &RecenterConfig) -> Result<RecenterOutcome> {
    config.validate()?;
    let (row, col) = locate_psf(&frame, config.rebin_size)?;

    let moved = (config.target_row - row).abs() > config.tolerance_px
        || (config.target_col - col).abs() > config.tolerance_px;
    let shift_rows = (config.target_row - row).round() as i64;
    let shift_cols = (config.target_col - col).round() as i64;

    if !moved {
        return Ok(RecenterOutcome {
            frame,
            located_row: row,
            located_col: col,
            shift_rows: 0,
            shift_cols: 0,
            moved: false,
        });
    }

    info!(frame = frame.id(), shift_rows, shift_cols, "Recentering frame");

    let data = roll(frame.data(), shift_rows, shift_cols);
    let mut rolled = ImageFrame::new(frame.id(), data)
        .with_metadata(frame.metadata().clone())
        .with_pixel_to_reference(shifted_mapping(frame.pixel_to_reference(), shift_rows, shift_cols));
    if let Some(mask) = frame.mask() {
        rolled = rolled.with_mask(roll(mask, shift_rows, shift_cols))?;
    }

    Ok(RecenterOutcome {
        frame: rolled,
        located_row: row,
        located_col: col,
        shift_rows,
        shift_cols,
        moved: true,
    })
}

/// Block-median rebin `region` into at most `rebin x rebin` blocks and
/// return the block size with the centre of mass above `background` in
/// frame pixels.
fn block_centre(
    frame: &ImageFrame,
    region: &Region,
    rebin: usize,
    background: f64,
) -> Option<(f64, f64, (f64, f64))> {
    let nr = rebin.min(region.rows()).max(1);
    let nc = rebin.min(region.cols()).max(1);
    let br = region.rows() / nr;
    let bc = region.cols() / nc;
    if br == 0 || bc == 0 {
        return None;
    }

    let binned = rebin_median(frame, region, nr, nc, br, bc);
    let (r, c) = centre_of_mass(&binned, background)?;

    // Block index -> pixel centre of that block.
    Some((
        br as f64,
        bc as f64,
        (
            region.row0 as f64 + (r + 0.5) * br as f64 - 0.5,
            region.col0 as f64 + (c + 0.5) * bc as f64 - 0.5,
        ),
    ))
}

/// Median of the valid pixels of each block; NaN for fully masked blocks.
fn rebin_median(frame: &ImageFrame, region: &Region, nr: usize, nc: usize, br: usize, bc: usize) -> Array2<f64> {
    let data = frame.data();
    let mut buf = Vec::with_capacity(br * bc);
    Array2::from_shape_fn((nr, nc), |(i, j)| {
        buf.clear();
        for row in region.row0 + i * br..region.row0 + (i + 1) * br {
            for col in region.col0 + j * bc..region.col0 + (j + 1) * bc {
                let v = data[[row, col]];
                if frame.is_valid(row, col) && v.is_finite() {
                    buf.push(v as f64);
                }
            }
        }
        median(&buf).unwrap_or(f64::NAN)
    })
}

/// Centre of mass of `values - level`, negative excess clipped to zero.
fn centre_of_mass(values: &Array2<f64>, level: f64) -> Option<(f64, f64)> {
    let mut sum = 0.0;
    let mut sr = 0.0;
    let mut sc = 0.0;
    for ((r, c), &v) in values.indexed_iter() {
        let w = v - level;
        if w.is_finite() && w > 0.0 {
            sum += w;
            sr += w * r as f64;
            sc += w * c as f64;
        }
    }
    (sum > 0.0).then(|| (sr / sum, sc / sum))
}

fn pixel_centre_of_mass(frame: &ImageFrame, region: &Region, background: f64) -> Option<(f64, f64)> {
    let data = frame.data();
    let mut sum = 0.0;
    let mut sr = 0.0;
    let mut sc = 0.0;
    for row in region.row0..region.row1 {
        for col in region.col0..region.col1 {
            if !frame.is_valid(row, col) {
                continue;
            }
            let w = data[[row, col]] as f64 - background;
            if w > 0.0 {
                sum += w;
                sr += w * row as f64;
                sc += w * col as f64;
            }
        }
    }
    (sum > 0.0).then(|| (sr / sum, sc / sum))
}

/// Cyclic shift: element `(r, c)` moves to `(r + rows, c + cols)` modulo
/// the array shape.
fn roll<T: Clone>(array: &Array2<T>, rows: i64, cols: i64) -> Array2<T> {
    let (h, w) = array.dim();
    let (hi, wi) = (h as i64, w as i64);
    Array2::from_shape_fn((h, w), |(r, c)| {
        let sr = (r as i64 - rows).rem_euclid(hi) as usize;
        let sc = (c as i64 - cols).rem_euclid(wi) as usize;
        array[[sr, sc]].clone()
    })
}

/// `pixel_to_reference` of the rolled frame: undo the roll, then apply the
/// original mapping.
fn shifted_mapping(mapping: &Mapping, rows: i64, cols: i64) -> Mapping {
    match mapping {
        Mapping::Affine(a) => Mapping::Affine(a.compose(&Affine::translation(-(cols as f64), -(rows as f64)))),
        Mapping::Quadratic(q) => {
            let mut q = *q;
            q.src.cx += cols as f64;
            q.src.cy += rows as f64;
            Mapping::Quadratic(q)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Point;

    fn disk_frame(row: f64, col: f64, radius: f64) -> ImageFrame {
        let data = Array2::from_shape_fn((256, 256), |(r, c)| {
            let d = ((r as f64 - row).powi(2) + (c as f64 - col).powi(2)).sqrt();
            if d <= radius {
                110.0
            } else {
                10.0
            }
        });
        ImageFrame::new("psf", data)
    }

    fn config() -> RecenterConfig {
        RecenterConfig {
            target_row: 128.0,
            target_col: 128.0,
            rebin_size: 16,
            tolerance_px: 10.0,
        }
    }

    #[test]
    fn test_locates_broad_psf() {
        let frame = disk_frame(200.3, 60.7, 30.0);
        let (row, col) = locate_psf(&frame, 16).unwrap();
        assert!((row - 200.3).abs() < 0.5, "row={row}");
        assert!((col - 60.7).abs() < 0.5, "col={col}");
    }

    #[test]
    fn test_rolls_psf_onto_target() {
        let outcome = recenter(disk_frame(200.3, 60.7, 30.0), &config()).unwrap();
        assert!(outcome.moved);
        assert_eq!(outcome.shift_rows, -72);
        // 128 - 60.7 rounds to 67, where truncating the located column
        // would give 68.
        assert_eq!(outcome.shift_cols, 67);
        assert_eq!(outcome.frame.data()[[128, 128]], 110.0);
        let (row, col) = locate_psf(&outcome.frame, 16).unwrap();
        assert!((row - 128.0).abs() < 1.0 && (col - 128.0).abs() < 1.0, "({row}, {col})");

        let again = recenter(outcome.frame, &config()).unwrap();
        assert!(!again.moved);
        assert_eq!((again.shift_rows, again.shift_cols), (0, 0));
    }

    #[test]
    fn test_within_tolerance_untouched() {
        let frame = disk_frame(133.0, 122.0, 30.0);
        let original = frame.data().clone();
        let outcome = recenter(frame, &config()).unwrap();
        assert!(!outcome.moved);
        assert_eq!(outcome.frame.data(), &original);
    }

    #[test]
    fn test_roll_wraps_and_mapping_follows() {
        let a = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as i32);
        let rolled = roll(&a, 1, -1);
        assert_eq!(rolled[[1, 0]], a[[0, 1]]);
        assert_eq!(rolled[[0, 3]], a[[2, 0]]);

        let m = shifted_mapping(&Mapping::identity(), 5, -2);
        assert_eq!(m.apply(Point::new(10.0, 10.0)), Point::new(12.0, 5.0));
    }

    #[test]
    fn test_flat_frame_has_no_psf() {
        let frame = ImageFrame::new("flat", Array2::from_elem((64, 64), 3.0));
        assert!(matches!(locate_psf(&frame, 8), Err(MosaicError::InvalidFrame { .. })));
    }
}
