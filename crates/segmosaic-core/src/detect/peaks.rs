use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::ImageFrame;

/// Integer-pixel local maximum above the detection cutoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub row: usize,
    pub col: usize,
    pub value: f32,
}

/// Find valid pixels above `cutoff` that are local maxima of their
/// 8-neighbourhood, brightest first, keeping at most `limit`.
///
/// Plateaus resolve to a single pixel: a candidate must be strictly greater
/// than neighbours that precede it in raster order and at least equal to the
/// ones that follow.
pub fn find_local_maxima(frame: &ImageFrame, cutoff: f64, limit: usize) -> Vec<Peak> {
    let (h, w) = frame.data().dim();

    let mut peaks: Vec<Peak> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h)
            .into_par_iter()
            .flat_map_iter(|row| row_maxima(frame, row, cutoff))
            .collect()
    } else {
        (0..h).flat_map(|row| row_maxima(frame, row, cutoff)).collect()
    };

    peaks.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then(a.row.cmp(&b.row))
            .then(a.col.cmp(&b.col))
    });
    peaks.truncate(limit);
    peaks
}

fn row_maxima(frame: &ImageFrame, row: usize, cutoff: f64) -> Vec<Peak> {
    let data = frame.data();
    let (h, w) = data.dim();
    let mut out = Vec::new();

    for col in 0..w {
        if !frame.is_valid(row, col) {
            continue;
        }
        let v = data[[row, col]];
        if (v as f64) <= cutoff {
            continue;
        }

        let mut is_max = true;
        'scan: for dr in -1..=1_i64 {
            for dc in -1..=1_i64 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let nr = row as i64 + dr;
                let nc = col as i64 + dc;
                if nr < 0 || nr >= h as i64 || nc < 0 || nc >= w as i64 {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if !frame.is_valid(nr, nc) {
                    continue;
                }
                let n = data[[nr, nc]];
                let precedes = dr < 0 || (dr == 0 && dc < 0);
                if (precedes && v <= n) || (!precedes && v < n) {
                    is_max = false;
                    break 'scan;
                }
            }
        }

        if is_max {
            out.push(Peak { row, col, value: v });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_single_peak() {
        let mut data = Array2::<f32>::zeros((9, 9));
        data[[4, 4]] = 10.0;
        data[[4, 5]] = 5.0;
        let frame = ImageFrame::new("f", data);
        let peaks = find_local_maxima(&frame, 1.0, 10);
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].row, peaks[0].col), (4, 4));
    }

    #[test]
    fn test_plateau_yields_one_peak() {
        let mut data = Array2::<f32>::zeros((9, 9));
        data[[4, 4]] = 7.0;
        data[[4, 5]] = 7.0;
        let frame = ImageFrame::new("f", data);
        let peaks = find_local_maxima(&frame, 1.0, 10);
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn test_limit_keeps_brightest() {
        let mut data = Array2::<f32>::zeros((20, 20));
        data[[3, 3]] = 5.0;
        data[[10, 10]] = 9.0;
        data[[16, 4]] = 7.0;
        let frame = ImageFrame::new("f", data);
        let peaks = find_local_maxima(&frame, 1.0, 2);
        let values: Vec<f32> = peaks.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![9.0, 7.0]);
    }

    #[test]
    fn test_masked_pixels_are_ignored() {
        let mut data = Array2::<f32>::zeros((9, 9));
        data[[4, 4]] = 10.0;
        let mut mask = Array2::from_elem((9, 9), false);
        mask[[4, 4]] = true;
        let frame = ImageFrame::new("f", data).with_mask(mask).unwrap();
        assert!(find_local_maxima(&frame, 1.0, 10).is_empty());
    }
}
