//! Resampling registered frames onto one reference-aligned output grid.
//!
//! Each frame is pulled through the inverse of its transform into a private
//! accumulator covering its footprint; accumulators are then merged into the
//! mosaic and normalised by the summed kernel weight.

pub mod accumulator;
pub mod grid;
pub mod interpolate;

pub use grid::{GridBounds, GridSpec, OutputGrid};
pub use interpolate::{sample, Interpolation, Sample};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::transform::{Mapping, Point, Transform};

use accumulator::{FrameAccumulator, MosaicAccumulator};
use grid::mapped_bbox;

/// Per-frame bookkeeping of a composite.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameContribution {
    pub frame_id: String,
    pub pixels_contributed: usize,
    pub residual_rms: f64,
    pub matched_pairs: usize,
}

/// A composited mosaic on its output grid.
#[derive(Clone, Debug)]
pub struct MosaicResult {
    /// Weighted mean intensity; NaN where nothing contributed.
    pub intensity: Array2<f32>,
    /// Summed kernel weight per output pixel.
    pub weight: Array2<f32>,
    /// Number of frames contributing to each output pixel.
    pub coverage: Array2<u16>,
    pub grid: OutputGrid,
    pub transforms: Vec<Transform>,
    pub contributions: Vec<FrameContribution>,
    /// Frames whose footprint missed the grid.
    pub skipped: Vec<String>,
    /// Reference pixels to world coordinates, from the reference frame.
    /// Identity when the reference frame was not composited.
    pub reference_mapping: Mapping,
}

impl MosaicResult {
    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn has_coverage(&self, row: usize, col: usize) -> bool {
        self.coverage.get([row, col]).is_some_and(|&c| c > 0)
    }

    /// Output pixel (`x` = column, `y` = row) to reference pixels.
    pub fn output_to_reference(&self, p: Point) -> Point {
        self.grid.output_to_reference(p)
    }

    pub fn reference_to_output(&self, p: Point) -> Point {
        self.grid.reference_to_output(p)
    }

    /// Output pixel (`x` = column, `y` = row) to world coordinates.
    pub fn output_to_world(&self, p: Point) -> Point {
        self.reference_mapping.apply(self.grid.output_to_reference(p))
    }

    pub fn covered_pixels(&self) -> usize {
        self.coverage.iter().filter(|&&c| c > 0).count()
    }

    pub fn transform_for(&self, frame_id: &str) -> Option<&Transform> {
        self.transforms.iter().find(|t| t.source_id() == frame_id)
    }
}

/// Composite `frames` onto a common grid using one transform per frame
/// (matched by `Transform::source_id`).
pub fn composite(
    frames: &[ImageFrame],
    transforms: &[Transform],
    spec: &GridSpec,
    interpolation: Interpolation,
) -> Result<MosaicResult> {
    spec.validate()?;
    if frames.is_empty() {
        return Err(MosaicError::EmptyMosaic);
    }
    let paired = pair_transforms(frames, transforms)?;

    let footprints: Vec<(usize, usize, &Mapping)> = paired
        .iter()
        .map(|(f, t)| (f.width(), f.height(), t.mapping()))
        .collect();
    let grid = grid::resolve(spec, &footprints)?;

    info!(
        frames = frames.len(),
        width = grid.width,
        height = grid.height,
        scale = grid.pixel_scale,
        %interpolation,
        "Compositing mosaic"
    );

    let resample = |(frame, transform): &(&ImageFrame, &Transform)| {
        resample_frame(frame, transform, &grid, interpolation)
    };
    let accumulators: Vec<Option<FrameAccumulator>> = if paired.len() >= PARALLEL_FRAME_THRESHOLD {
        paired.par_iter().map(resample).collect()
    } else {
        paired.iter().map(resample).collect()
    };

    let mut mosaic = MosaicAccumulator::new(&grid);
    let mut contributions = Vec::new();
    let mut skipped = Vec::new();
    for ((frame, transform), acc) in paired.iter().zip(accumulators) {
        match acc {
            Some(acc) if acc.pixels_contributed() > 0 => {
                contributions.push(FrameContribution {
                    frame_id: frame.id().to_string(),
                    pixels_contributed: acc.pixels_contributed(),
                    residual_rms: transform.residual_rms(),
                    matched_pairs: transform.matched_pairs(),
                });
                mosaic.merge(acc);
            }
            _ => {
                warn!(frame = frame.id(), "Frame does not overlap the output grid, skipped");
                skipped.push(frame.id().to_string());
            }
        }
    }

    if contributions.is_empty() {
        return Err(MosaicError::EmptyMosaic);
    }

    let reference_mapping = reference_mapping(frames, transforms);
    let (intensity, weight, coverage) = mosaic.finalize();
    let result = MosaicResult {
        intensity,
        weight,
        coverage,
        grid,
        transforms: paired.iter().map(|(_, t)| (*t).clone()).collect(),
        contributions,
        skipped,
        reference_mapping,
    };
    info!(
        covered = result.covered_pixels(),
        contributing = result.contributions.len(),
        skipped = result.skipped.len(),
        "Mosaic complete"
    );
    Ok(result)
}

/// World mapping of the frame the transforms register onto.
fn reference_mapping(frames: &[ImageFrame], transforms: &[Transform]) -> Mapping {
    let Some(target) = transforms.first().map(Transform::target_id) else {
        return Mapping::identity();
    };
    if transforms.iter().any(|t| t.target_id() != target) {
        warn!(reference = target, "Transforms register onto different frames");
    }
    match frames.iter().find(|f| f.id() == target) {
        Some(frame) => *frame.pixel_to_reference(),
        None => {
            debug!(reference = target, "Reference frame not composited, world mapping is identity");
            Mapping::identity()
        }
    }
}

/// Pair every frame with exactly one transform.
fn pair_transforms<'a>(
    frames: &'a [ImageFrame],
    transforms: &'a [Transform],
) -> Result<Vec<(&'a ImageFrame, &'a Transform)>> {
    for t in transforms {
        let owners = frames.iter().filter(|f| f.id() == t.source_id()).count();
        if owners != 1 {
            return Err(MosaicError::GridMismatch {
                frame_id: t.source_id().to_string(),
            });
        }
    }
    frames
        .iter()
        .map(|frame| {
            let mut matching = transforms.iter().filter(|t| t.source_id() == frame.id());
            match (matching.next(), matching.next()) {
                (Some(t), None) => Ok((frame, t)),
                _ => Err(MosaicError::GridMismatch {
                    frame_id: frame.id().to_string(),
                }),
            }
        })
        .collect()
}

/// Pull one frame onto the grid. `None` if its footprint misses the grid.
fn resample_frame(
    frame: &ImageFrame,
    transform: &Transform,
    grid: &OutputGrid,
    interpolation: Interpolation,
) -> Option<FrameAccumulator> {
    let (w, h) = (frame.width() as f64, frame.height() as f64);
    if w == 0.0 || h == 0.0 {
        return None;
    }
    let bbox = mapped_bbox(transform.mapping(), -0.5, -0.5, w - 0.5, h - 0.5);
    let range = grid.clip(&bbox)?;
    let mut acc = FrameAccumulator::new(frame.id(), range);

    for row in range.row0..range.row0 + range.rows {
        for col in range.col0..range.col0 + range.cols {
            let reference = grid.output_to_reference(Point::new(col as f64, row as f64));
            let Some(src) = transform.apply_inverse(reference) else {
                continue;
            };
            if src.x < -0.5 || src.y < -0.5 || src.x >= w - 0.5 || src.y >= h - 0.5 {
                continue;
            }
            if let Some(s) = sample(frame, src.x, src.y, interpolation) {
                acc.add(row, col, s.value, s.weight);
            }
        }
    }

    debug!(
        frame = frame.id(),
        rows = range.rows,
        cols = range.cols,
        pixels = acc.pixels_contributed(),
        "Frame resampled"
    );
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_transform_is_grid_mismatch() {
        let frames = vec![
            ImageFrame::new("a", Array2::zeros((4, 4))),
            ImageFrame::new("b", Array2::zeros((4, 4))),
        ];
        let transforms = vec![Transform::identity("a", "a")];
        let err = composite(&frames, &transforms, &GridSpec::default(), Interpolation::Bilinear).unwrap_err();
        assert!(matches!(err, MosaicError::GridMismatch { frame_id } if frame_id == "b"));
    }

    #[test]
    fn test_unknown_transform_is_grid_mismatch() {
        let frames = vec![ImageFrame::new("a", Array2::zeros((4, 4)))];
        let transforms = vec![Transform::identity("a", "a"), Transform::identity("z", "a")];
        let err = composite(&frames, &transforms, &GridSpec::default(), Interpolation::Nearest).unwrap_err();
        assert!(matches!(err, MosaicError::GridMismatch { frame_id } if frame_id == "z"));
    }
}
