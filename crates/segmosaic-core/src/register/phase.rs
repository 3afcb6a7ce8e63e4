//! Whole-frame translation estimate by FFT phase correlation.
//!
//! Used as a registration prior when frames carry no placement metadata.

use ndarray::Array2;
use num_complex::Complex;
use rustfft::{FftDirection, FftPlanner};

use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::stats::median;
use crate::transform::{Affine, Mapping};

/// Estimate `(dx, dy)` such that the content of `target` is the content of
/// `reference` shifted by `(dx, dy)` pixels.
///
/// Masked pixels and the median background are zeroed before correlating.
pub fn estimate_translation(reference: &ImageFrame, target: &ImageFrame) -> Result<(f64, f64)> {
    let (h, w) = reference.data().dim();
    if target.data().dim() != (h, w) {
        return Err(MosaicError::invalid_frame(
            target.id(),
            format!(
                "size {}x{} differs from reference {}x{}",
                target.width(),
                target.height(),
                w,
                h
            ),
        ));
    }
    if h < 3 || w < 3 {
        return Err(MosaicError::invalid_frame(target.id(), "frame too small to correlate"));
    }

    let ref_fft = fft2d(prepare(reference), FftDirection::Forward);
    let tgt_fft = fft2d(prepare(target), FftDirection::Forward);

    // T · conj(R), normalised: the correlation peak sits at +shift.
    let cross = Array2::from_shape_fn((h, w), |idx| {
        let c = tgt_fft[idx] * ref_fft[idx].conj();
        let mag = c.norm();
        if mag > 1e-12 {
            c / mag
        } else {
            Complex::new(0.0, 0.0)
        }
    });
    let correlation = fft2d(cross, FftDirection::Inverse).mapv(|c| c.re);

    let (peak_row, peak_col) = find_peak(&correlation);
    let (sub_row, sub_col) = refine_peak(&correlation, peak_row, peak_col);

    let dy = signed_offset(peak_row, h) + sub_row;
    let dx = signed_offset(peak_col, w) + sub_col;
    Ok((dx, dy))
}

/// Prior mapping `target pixel -> reference pixel` from a phase-correlation
/// estimate.
pub fn translation_prior(reference: &ImageFrame, target: &ImageFrame) -> Result<Mapping> {
    let (dx, dy) = estimate_translation(reference, target)?;
    Ok(Mapping::Affine(Affine::translation(-dx, -dy)))
}

fn signed_offset(index: usize, len: usize) -> f64 {
    if index > len / 2 {
        index as f64 - len as f64
    } else {
        index as f64
    }
}

/// Background-subtracted, masked and Hann-windowed copy of the frame.
fn prepare(frame: &ImageFrame) -> Array2<Complex<f64>> {
    let (h, w) = frame.data().dim();
    let values: Vec<f64> = frame.valid_values().iter().map(|&v| v as f64).collect();
    let background = median(&values).unwrap_or(0.0);

    Array2::from_shape_fn((h, w), |(row, col)| {
        if !frame.is_valid(row, col) {
            return Complex::new(0.0, 0.0);
        }
        let wy = 0.5 * (1.0 - (std::f64::consts::TAU * row as f64 / h as f64).cos());
        let wx = 0.5 * (1.0 - (std::f64::consts::TAU * col as f64 / w as f64).cos());
        Complex::new((frame.data()[[row, col]] as f64 - background) * wy * wx, 0.0)
    })
}

/// Separable 2D FFT. The inverse is normalised by `1 / (h * w)`.
fn fft2d(mut data: Array2<Complex<f64>>, direction: FftDirection) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft(w, direction);
    let fft_col = planner.plan_fft(h, direction);

    let mut buf = vec![Complex::new(0.0, 0.0); w.max(h)];
    for mut row in data.rows_mut() {
        let line = &mut buf[..w];
        for (dst, src) in line.iter_mut().zip(row.iter()) {
            *dst = *src;
        }
        fft_row.process(line);
        for (dst, src) in row.iter_mut().zip(line.iter()) {
            *dst = *src;
        }
    }
    for mut col in data.columns_mut() {
        let line = &mut buf[..h];
        for (dst, src) in line.iter_mut().zip(col.iter()) {
            *dst = *src;
        }
        fft_col.process(line);
        for (dst, src) in col.iter_mut().zip(line.iter()) {
            *dst = *src;
        }
    }

    if direction == FftDirection::Inverse {
        let norm = 1.0 / (h * w) as f64;
        data.mapv_inplace(|c| c * norm);
    }
    data
}

fn find_peak(data: &Array2<f64>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f64::NEG_INFINITY;
    for ((row, col), &v) in data.indexed_iter() {
        if v > best_val {
            best_val = v;
            best = (row, col);
        }
    }
    best
}

/// Parabola fit through the peak and its neighbours along each axis. The
/// surface is periodic, so neighbours wrap around the edges.
fn refine_peak(data: &Array2<f64>, row: usize, col: usize) -> (f64, f64) {
    let (h, w) = data.dim();
    let centre = data[[row, col]];

    let vertex = |prev: f64, next: f64| {
        let denom = prev - 2.0 * centre + next;
        if denom.abs() > 1e-12 {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };

    let d_row = vertex(data[[(row + h - 1) % h, col]], data[[(row + 1) % h, col]]);
    let d_col = vertex(data[[row, (col + w - 1) % w]], data[[row, (col + 1) % w]]);
    (d_row, d_col)
}
