use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_DETECTION_SIGMA, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_FIT_RESIDUAL,
    DEFAULT_MIN_SEPARATION_PX, DEFAULT_WINDOW_RADIUS,
};
use crate::error::{MosaicError, Result};
use crate::stats::SigmaClipParams;

/// How the detection cutoff is derived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Cutoff = background + k * noise (sigma-clipped).
    Sigma(f32),
    /// Fixed cutoff in frame intensity units.
    Absolute(f32),
}

impl Default for Threshold {
    fn default() -> Self {
        Self::Sigma(DEFAULT_DETECTION_SIGMA)
    }
}

impl Threshold {
    pub fn cutoff(&self, background: f64, noise: f64) -> f64 {
        match self {
            Self::Sigma(k) => background + *k as f64 * noise,
            Self::Absolute(v) => *v as f64,
        }
    }

    fn value(&self) -> f32 {
        match self {
            Self::Sigma(v) | Self::Absolute(v) => *v,
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sigma(k) => write!(f, "{k} sigma"),
            Self::Absolute(v) => write!(f, "absolute {v}"),
        }
    }
}

/// Configuration for point-source detection in a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub threshold: Threshold,
    /// Two accepted detections are never closer than this (pixels).
    #[serde(default = "default_min_separation")]
    pub min_separation_px: f64,
    /// Maximum number of accepted detections.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Half-width of the square refinement window (pixels).
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
    /// Candidates whose relative fit residual exceeds this are rejected.
    #[serde(default = "default_max_fit_residual")]
    pub max_fit_residual: f64,
    #[serde(default)]
    pub sigma_clip: SigmaClipParams,
}

fn default_min_separation() -> f64 {
    DEFAULT_MIN_SEPARATION_PX
}
fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}
fn default_window_radius() -> usize {
    DEFAULT_WINDOW_RADIUS
}
fn default_max_fit_residual() -> f64 {
    DEFAULT_MAX_FIT_RESIDUAL
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            min_separation_px: DEFAULT_MIN_SEPARATION_PX,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            window_radius: DEFAULT_WINDOW_RADIUS,
            max_fit_residual: DEFAULT_MAX_FIT_RESIDUAL,
            sigma_clip: SigmaClipParams::default(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        let t = self.threshold.value();
        if !t.is_finite() || t <= 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "detection threshold must be positive, got {}",
                self.threshold
            )));
        }
        if self.window_radius == 0 {
            return Err(MosaicError::InvalidConfig(
                "centroid window radius must be positive".into(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_candidates must be positive".into(),
            ));
        }
        if !self.min_separation_px.is_finite() || self.min_separation_px < 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "min_separation_px must be non-negative, got {}",
                self.min_separation_px
            )));
        }
        if self.max_fit_residual.is_nan() || self.max_fit_residual <= 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "max_fit_residual must be positive, got {}",
                self.max_fit_residual
            )));
        }
        if self.sigma_clip.sigma <= 0.0 {
            return Err(MosaicError::InvalidConfig(
                "sigma_clip.sigma must be positive".into(),
            ));
        }
        Ok(())
    }
}
