use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_OUTPUT_PIXEL_SCALE, MAX_OUTPUT_PIXELS};
use crate::error::{MosaicError, Result};
use crate::transform::{Mapping, Point};

/// Edge samples per side when bounding a non-affine footprint.
const EDGE_SAMPLES: usize = 16;

/// Extent of the output grid in reference-pixel coordinates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridBounds {
    /// Bounding box of all registered frame footprints.
    #[default]
    Union,
    /// Fixed origin (centre of output pixel 0,0) and size in output pixels.
    Explicit {
        x_min: f64,
        y_min: f64,
        width: usize,
        height: usize,
    },
}

impl std::fmt::Display for GridBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Union => write!(f, "Union"),
            Self::Explicit {
                x_min,
                y_min,
                width,
                height,
            } => write!(f, "{width}x{height} at ({x_min}, {y_min})"),
        }
    }
}

/// Requested output grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Reference pixels per output pixel.
    pub pixel_scale: f64,
    #[serde(default)]
    pub bounds: GridBounds,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            pixel_scale: DEFAULT_OUTPUT_PIXEL_SCALE,
            bounds: GridBounds::Union,
        }
    }
}

impl GridSpec {
    pub fn validate(&self) -> Result<()> {
        if !self.pixel_scale.is_finite() || self.pixel_scale <= 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "pixel_scale must be positive, got {}",
                self.pixel_scale
            )));
        }
        if let GridBounds::Explicit {
            x_min,
            y_min,
            width,
            height,
        } = self.bounds
        {
            if width == 0 || height == 0 {
                return Err(MosaicError::InvalidConfig(format!(
                    "explicit bounds must be non-empty, got {width}x{height}"
                )));
            }
            if !x_min.is_finite() || !y_min.is_finite() {
                return Err(MosaicError::InvalidConfig(
                    "explicit bounds origin must be finite".into(),
                ));
            }
            check_size(width, height)?;
        }
        Ok(())
    }
}

/// Reject grids too large to allocate.
fn check_size(width: usize, height: usize) -> Result<()> {
    match width.checked_mul(height) {
        Some(n) if n <= MAX_OUTPUT_PIXELS => Ok(()),
        _ => Err(MosaicError::InvalidConfig(format!(
            "output grid {width}x{height} exceeds {MAX_OUTPUT_PIXELS} pixels"
        ))),
    }
}

/// Output pixels spanning `extent` reference pixels at `pixel_scale`.
/// Saturates at `usize::MAX`.
fn span(extent: f64, pixel_scale: f64) -> usize {
    ((extent / pixel_scale).floor() as usize).saturating_add(1)
}

/// Resolved output grid. Output pixel `(row, col)` is centred on reference
/// coordinate `(x_min + col * pixel_scale, y_min + row * pixel_scale)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputGrid {
    pub x_min: f64,
    pub y_min: f64,
    pub pixel_scale: f64,
    pub width: usize,
    pub height: usize,
}

impl OutputGrid {
    /// Output grid point (`x` = column, `y` = row) to reference pixels.
    pub fn output_to_reference(&self, p: Point) -> Point {
        Point::new(
            self.x_min + p.x * self.pixel_scale,
            self.y_min + p.y * self.pixel_scale,
        )
    }

    pub fn reference_to_output(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.x_min) / self.pixel_scale,
            (p.y - self.y_min) / self.pixel_scale,
        )
    }

    /// Output pixels whose centres may fall inside `bbox` (reference
    /// coordinates), clipped to the grid. `None` if the box misses entirely.
    pub(crate) fn clip(&self, bbox: &BoundingBox) -> Option<PixelRange> {
        let lo = self.reference_to_output(Point::new(bbox.x_min, bbox.y_min));
        let hi = self.reference_to_output(Point::new(bbox.x_max, bbox.y_max));

        let col0 = lo.x.floor().max(0.0);
        let row0 = lo.y.floor().max(0.0);
        let col1 = hi.x.ceil().min(self.width as f64 - 1.0);
        let row1 = hi.y.ceil().min(self.height as f64 - 1.0);
        if col0 > col1 || row0 > row1 {
            return None;
        }
        Some(PixelRange {
            row0: row0 as usize,
            col0: col0 as usize,
            rows: (row1 - row0) as usize + 1,
            cols: (col1 - col0) as usize + 1,
        })
    }
}

/// Rectangular block of output pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PixelRange {
    pub row0: usize,
    pub col0: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Axis-aligned box in reference coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    fn empty() -> Self {
        Self {
            x_min: f64::INFINITY,
            y_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_max: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, p: Point) {
        self.x_min = self.x_min.min(p.x);
        self.y_min = self.y_min.min(p.y);
        self.x_max = self.x_max.max(p.x);
        self.y_max = self.y_max.max(p.y);
    }

    fn union(&mut self, other: &BoundingBox) {
        self.x_min = self.x_min.min(other.x_min);
        self.y_min = self.y_min.min(other.y_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_max = self.y_max.max(other.y_max);
    }

    fn is_finite(&self) -> bool {
        self.x_min.is_finite() && self.y_min.is_finite() && self.x_max.is_finite() && self.y_max.is_finite()
    }
}

/// Bounding box of the rectangle `[x0, x1] x [y0, y1]` after `mapping`.
pub(crate) fn mapped_bbox(mapping: &Mapping, x0: f64, y0: f64, x1: f64, y1: f64) -> BoundingBox {
    let mut bbox = BoundingBox::empty();
    let samples = match mapping {
        Mapping::Affine(_) => 1,
        Mapping::Quadratic(_) => EDGE_SAMPLES,
    };
    for i in 0..=samples {
        let t = i as f64 / samples as f64;
        let x = x0 + t * (x1 - x0);
        let y = y0 + t * (y1 - y0);
        bbox.include(mapping.apply(Point::new(x, y0)));
        bbox.include(mapping.apply(Point::new(x, y1)));
        bbox.include(mapping.apply(Point::new(x0, y)));
        bbox.include(mapping.apply(Point::new(x1, y)));
    }
    bbox
}

/// Resolve `spec` against the frames' `(width, height, pixel -> reference)`.
pub(crate) fn resolve(spec: &GridSpec, frames: &[(usize, usize, &Mapping)]) -> Result<OutputGrid> {
    spec.validate()?;
    match spec.bounds {
        GridBounds::Explicit {
            x_min,
            y_min,
            width,
            height,
        } => Ok(OutputGrid {
            x_min,
            y_min,
            pixel_scale: spec.pixel_scale,
            width,
            height,
        }),
        GridBounds::Union => {
            let mut bbox = BoundingBox::empty();
            for &(w, h, mapping) in frames {
                if w == 0 || h == 0 {
                    continue;
                }
                let centres = mapped_bbox(mapping, 0.0, 0.0, (w - 1) as f64, (h - 1) as f64);
                if centres.is_finite() {
                    bbox.union(&centres);
                }
            }
            if !bbox.is_finite() {
                return Err(MosaicError::EmptyMosaic);
            }
            let x_min = bbox.x_min.floor();
            let y_min = bbox.y_min.floor();
            let width = span(bbox.x_max - x_min, spec.pixel_scale);
            let height = span(bbox.y_max - y_min, spec.pixel_scale);
            check_size(width, height)?;
            Ok(OutputGrid {
                x_min,
                y_min,
                pixel_scale: spec.pixel_scale,
                width,
                height,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Affine;

    #[test]
    fn test_union_of_identity_frame() {
        let id = Mapping::identity();
        let grid = resolve(&GridSpec::default(), &[(100, 80, &id)]).unwrap();
        assert_eq!((grid.x_min, grid.y_min), (0.0, 0.0));
        assert_eq!((grid.width, grid.height), (100, 80));
    }

    #[test]
    fn test_union_spans_shifted_frames() {
        let a = Mapping::identity();
        let b = Mapping::Affine(Affine::translation(-2.5, 3.0));
        let grid = resolve(&GridSpec::default(), &[(10, 10, &a), (10, 10, &b)]).unwrap();
        assert_eq!((grid.x_min, grid.y_min), (-3.0, 0.0));
        assert_eq!(grid.width, 13);
        assert_eq!(grid.height, 13);
    }

    #[test]
    fn test_zero_scale_rejected() {
        let spec = GridSpec {
            pixel_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(spec.validate(), Err(MosaicError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_union_rejected() {
        let id = Mapping::identity();
        let spec = GridSpec {
            pixel_scale: 1e-6,
            ..Default::default()
        };
        let err = resolve(&spec, &[(100, 100, &id)]).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidConfig(_)));
    }

    #[test]
    fn test_oversized_explicit_rejected() {
        let spec = GridSpec {
            pixel_scale: 1.0,
            bounds: GridBounds::Explicit {
                x_min: 0.0,
                y_min: 0.0,
                width: usize::MAX,
                height: 2,
            },
        };
        assert!(matches!(spec.validate(), Err(MosaicError::InvalidConfig(_))));
    }

    #[test]
    fn test_clip_outside_grid() {
        let grid = OutputGrid {
            x_min: 0.0,
            y_min: 0.0,
            pixel_scale: 1.0,
            width: 10,
            height: 10,
        };
        let bbox = BoundingBox {
            x_min: 20.0,
            y_min: 20.0,
            x_max: 30.0,
            y_max: 30.0,
        };
        assert!(grid.clip(&bbox).is_none());
        let inside = BoundingBox {
            x_min: 2.5,
            y_min: -4.0,
            x_max: 5.5,
            y_max: 3.2,
        };
        let r = grid.clip(&inside).unwrap();
        assert_eq!((r.row0, r.col0, r.rows, r.cols), (0, 2, 5, 5));
    }
}
