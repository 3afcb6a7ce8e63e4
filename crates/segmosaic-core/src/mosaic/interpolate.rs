use serde::{Deserialize, Serialize};

use crate::frame::ImageFrame;

/// Resampling kernel used when pulling source pixels onto the output grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    /// Keys cubic convolution (a = -0.5).
    Bicubic,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "Nearest"),
            Self::Bilinear => write!(f, "Bilinear"),
            Self::Bicubic => write!(f, "Bicubic"),
        }
    }
}

/// Kernel-weighted sample: `value` is the sum of weight·pixel over valid
/// taps, `weight` the sum of those weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub weight: f64,
}

const KEYS_A: f64 = -0.5;

/// Sample `frame` at source coordinate `(x, y)` (pixel centres on integers).
/// `None` when no valid tap carries positive weight.
pub fn sample(frame: &ImageFrame, x: f64, y: f64, method: Interpolation) -> Option<Sample> {
    let s = match method {
        Interpolation::Nearest => nearest(frame, x, y),
        Interpolation::Bilinear => bilinear(frame, x, y),
        Interpolation::Bicubic => bicubic(frame, x, y).or_else(|| bilinear(frame, x, y)),
    }?;
    (s.weight > 0.0).then_some(s)
}

fn tap(frame: &ImageFrame, col: i64, row: i64) -> Option<f64> {
    if col < 0 || row < 0 {
        return None;
    }
    let (row, col) = (row as usize, col as usize);
    if row >= frame.height() || col >= frame.width() || !frame.is_valid(row, col) {
        return None;
    }
    let v = frame.data()[[row, col]];
    v.is_finite().then_some(v as f64)
}

fn nearest(frame: &ImageFrame, x: f64, y: f64) -> Option<Sample> {
    let col = (x + 0.5).floor() as i64;
    let row = (y + 0.5).floor() as i64;
    tap(frame, col, row).map(|v| Sample { value: v, weight: 1.0 })
}

fn bilinear(frame: &ImageFrame, x: f64, y: f64) -> Option<Sample> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (c0, r0) = (x0 as i64, y0 as i64);

    let mut acc = Sample { value: 0.0, weight: 0.0 };
    for (dc, dr, k) in [
        (0, 0, (1.0 - fx) * (1.0 - fy)),
        (1, 0, fx * (1.0 - fy)),
        (0, 1, (1.0 - fx) * fy),
        (1, 1, fx * fy),
    ] {
        if k <= 0.0 {
            continue;
        }
        if let Some(v) = tap(frame, c0 + dc, r0 + dr) {
            acc.value += k * v;
            acc.weight += k;
        }
    }
    Some(acc)
}

/// Full 4x4 cubic convolution, or `None` if any tap is missing so the
/// caller can fall back to a kernel without negative lobes.
fn bicubic(frame: &ImageFrame, x: f64, y: f64) -> Option<Sample> {
    let x0 = x.floor();
    let y0 = y.floor();
    let wx = keys_weights(x - x0);
    let wy = keys_weights(y - y0);
    let (c0, r0) = (x0 as i64 - 1, y0 as i64 - 1);

    let mut value = 0.0;
    for (j, ky) in wy.iter().enumerate() {
        for (i, kx) in wx.iter().enumerate() {
            let v = tap(frame, c0 + i as i64, r0 + j as i64)?;
            value += kx * ky * v;
        }
    }
    Some(Sample { value, weight: 1.0 })
}

fn keys_weights(t: f64) -> [f64; 4] {
    [keys(1.0 + t), keys(t), keys(1.0 - t), keys(2.0 - t)]
}

fn keys(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        (KEYS_A + 2.0) * t.powi(3) - (KEYS_A + 3.0) * t.powi(2) + 1.0
    } else if t < 2.0 {
        KEYS_A * t.powi(3) - 5.0 * KEYS_A * t.powi(2) + 8.0 * KEYS_A * t - 4.0 * KEYS_A
    } else {
        0.0
    }
}
