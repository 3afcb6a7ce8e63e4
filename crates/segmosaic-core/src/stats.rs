//! Robust statistics shared by detection and registration.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CLIP_ITERATIONS, DEFAULT_CLIP_SIGMA};

/// Parameters for sigma-clipped background estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigmaClipParams {
    /// Number of rejection iterations (default: 5).
    pub iterations: usize,
    /// Values beyond mean +/- sigma*stddev are rejected (default: 3.0).
    pub sigma: f32,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_CLIP_ITERATIONS,
            sigma: DEFAULT_CLIP_SIGMA,
        }
    }
}

/// Background level and noise of a pixel population after clipping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub median: f64,
    pub mean: f64,
    pub sigma: f64,
    /// Number of values that survived clipping.
    pub count: usize,
}

/// Sigma-clipped statistics over `values`.
///
/// Iteratively rejects values more than `params.sigma` standard deviations
/// from the mean, then reports the median of the survivors as the robust
/// level. Returns `None` for an empty input.
pub fn sigma_clipped_stats(values: &[f32], params: &SigmaClipParams) -> Option<ClippedStats> {
    if values.is_empty() {
        return None;
    }

    let mut kept: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let mut mean = 0.0;
    let mut sigma = 0.0;

    for _ in 0..params.iterations.max(1) {
        let (m, s) = mean_stddev(&kept);
        mean = m;
        sigma = s;
        if sigma < 1e-12 {
            break;
        }
        let lo = mean - params.sigma as f64 * sigma;
        let hi = mean + params.sigma as f64 * sigma;
        let before = kept.len();
        kept.retain(|&v| v >= lo && v <= hi);
        if kept.is_empty() {
            // Everything clipped; fall back to the last full estimate.
            return Some(ClippedStats {
                median: mean,
                mean,
                sigma,
                count: 0,
            });
        }
        if kept.len() == before {
            break;
        }
    }

    let (m, s) = mean_stddev(&kept);
    Some(ClippedStats {
        median: median_in_place(&mut kept),
        mean: m,
        sigma: s,
        count: kept.len(),
    })
}

/// Median of a slice (copied; input order is preserved). `None` if empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut buf = values.to_vec();
    Some(median_in_place(&mut buf))
}

/// Median absolute deviation around `center`.
pub fn median_abs_deviation(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

fn median_in_place(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
