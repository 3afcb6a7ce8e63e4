use ndarray::{s, Array2};

use super::grid::{OutputGrid, PixelRange};

/// Contributions of one frame, covering only its clipped output box.
pub(crate) struct FrameAccumulator {
    pub frame_id: String,
    range: PixelRange,
    sum: Array2<f64>,
    weight: Array2<f64>,
    touched: Array2<bool>,
    pixels: usize,
}

impl FrameAccumulator {
    pub fn new(frame_id: &str, range: PixelRange) -> Self {
        let dim = (range.rows, range.cols);
        Self {
            frame_id: frame_id.to_string(),
            range,
            sum: Array2::zeros(dim),
            weight: Array2::zeros(dim),
            touched: Array2::from_elem(dim, false),
            pixels: 0,
        }
    }

    /// Add a weighted sample at output pixel `(row, col)`, given in grid
    /// coordinates. The pixel must lie inside this accumulator's range.
    pub fn add(&mut self, row: usize, col: usize, value: f64, weight: f64) {
        let idx = [row - self.range.row0, col - self.range.col0];
        self.sum[idx] += value;
        self.weight[idx] += weight;
        if !self.touched[idx] {
            self.touched[idx] = true;
            self.pixels += 1;
        }
    }

    /// Number of distinct output pixels this frame contributed to.
    pub fn pixels_contributed(&self) -> usize {
        self.pixels
    }
}

/// Sum of all frame accumulators over the full output grid.
pub(crate) struct MosaicAccumulator {
    sum: Array2<f64>,
    weight: Array2<f64>,
    coverage: Array2<u16>,
}

impl MosaicAccumulator {
    pub fn new(grid: &OutputGrid) -> Self {
        let dim = (grid.height, grid.width);
        Self {
            sum: Array2::zeros(dim),
            weight: Array2::zeros(dim),
            coverage: Array2::zeros(dim),
        }
    }

    /// Fold a frame's contributions in; the frame accumulator is consumed.
    pub fn merge(&mut self, frame: FrameAccumulator) {
        let r = frame.range;
        let window = s![r.row0..r.row0 + r.rows, r.col0..r.col0 + r.cols];

        let mut sum = self.sum.slice_mut(window);
        sum += &frame.sum;
        let mut weight = self.weight.slice_mut(window);
        weight += &frame.weight;
        let mut coverage = self.coverage.slice_mut(window);
        coverage.zip_mut_with(&frame.touched, |c, &t| {
            if t {
                *c = c.saturating_add(1);
            }
        });
    }

    /// `(intensity, weight, coverage)`; intensity is NaN where weight is 0.
    pub fn finalize(self) -> (Array2<f32>, Array2<f32>, Array2<u16>) {
        let mut intensity = Array2::from_elem(self.sum.dim(), f32::NAN);
        ndarray::Zip::from(&mut intensity)
            .and(&self.sum)
            .and(&self.weight)
            .for_each(|out, &s, &w| {
                if w > 0.0 {
                    *out = (s / w) as f32;
                }
            });
        (intensity, self.weight.mapv(|w| w as f32), self.coverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> OutputGrid {
        OutputGrid {
            x_min: 0.0,
            y_min: 0.0,
            pixel_scale: 1.0,
            width: 4,
            height: 3,
        }
    }

    #[test]
    fn test_merge_and_finalize() {
        let range = PixelRange {
            row0: 1,
            col0: 1,
            rows: 2,
            cols: 2,
        };
        let mut a = FrameAccumulator::new("a", range);
        a.add(1, 1, 2.0, 1.0);
        a.add(2, 2, 1.5, 0.5);
        let mut b = FrameAccumulator::new("b", range);
        b.add(1, 1, 4.0, 1.0);
        assert_eq!(a.pixels_contributed(), 2);

        let mut acc = MosaicAccumulator::new(&grid());
        acc.merge(a);
        acc.merge(b);
        let (intensity, weight, coverage) = acc.finalize();

        assert_eq!(intensity[[1, 1]], 3.0);
        assert_eq!(intensity[[2, 2]], 3.0);
        assert!(intensity[[0, 0]].is_nan());
        assert_eq!(weight[[1, 1]], 2.0);
        assert_eq!(coverage[[1, 1]], 2);
        assert_eq!(coverage[[2, 2]], 1);
        assert_eq!(coverage[[0, 3]], 0);
    }
}
