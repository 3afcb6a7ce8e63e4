use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CONVERGENCE_TOLERANCE_PX, DEFAULT_MATCH_RADIUS_PX, DEFAULT_MAX_REGISTRATION_ITERATIONS,
    DEFAULT_OUTLIER_FLOOR_PX, DEFAULT_OUTLIER_TOLERANCE_MAD, DEFAULT_TRIANGLE_MAX_POINTS,
    DEFAULT_TRIANGLE_RATIO_TOLERANCE,
};
use crate::error::{MosaicError, Result};
use crate::transform::TransformModel;

/// Configuration for triangle-invariant correspondence search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriangleMatchConfig {
    /// Brightest points per side used to form triangles.
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    /// Maximum difference in side-ratio invariants for similar triangles.
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,
    /// Require matching handedness (rejects mirrored solutions).
    #[serde(default = "default_true")]
    pub check_orientation: bool,
    /// Minimum triangle votes for a point correspondence.
    #[serde(default = "default_min_votes")]
    pub min_votes: usize,
}

fn default_max_points() -> usize {
    DEFAULT_TRIANGLE_MAX_POINTS
}
fn default_ratio_tolerance() -> f64 {
    DEFAULT_TRIANGLE_RATIO_TOLERANCE
}
fn default_true() -> bool {
    true
}
fn default_min_votes() -> usize {
    1
}

impl Default for TriangleMatchConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_TRIANGLE_MAX_POINTS,
            ratio_tolerance: DEFAULT_TRIANGLE_RATIO_TOLERANCE,
            check_orientation: true,
            min_votes: 1,
        }
    }
}

/// Configuration for fitting a frame onto the reference frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Transform order to fit.
    #[serde(default)]
    pub model: TransformModel,
    /// Residuals beyond median + k * 1.4826 * MAD are outliers.
    #[serde(default = "default_outlier_tolerance")]
    pub outlier_tolerance_mad: f64,
    /// Residuals below this (pixels) are never outliers.
    #[serde(default = "default_outlier_floor")]
    pub outlier_floor_px: f64,
    /// Refit budget for the outlier-rejection loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// RMS improvement (pixels) below which the loop has converged.
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,
    /// Nearest-neighbour search radius after applying a prior (pixels).
    #[serde(default = "default_match_radius")]
    pub match_radius_px: f64,
    #[serde(default)]
    pub triangle: TriangleMatchConfig,
}

fn default_outlier_tolerance() -> f64 {
    DEFAULT_OUTLIER_TOLERANCE_MAD
}
fn default_outlier_floor() -> f64 {
    DEFAULT_OUTLIER_FLOOR_PX
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_REGISTRATION_ITERATIONS
}
fn default_convergence_tolerance() -> f64 {
    DEFAULT_CONVERGENCE_TOLERANCE_PX
}
fn default_match_radius() -> f64 {
    DEFAULT_MATCH_RADIUS_PX
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            model: TransformModel::default(),
            outlier_tolerance_mad: DEFAULT_OUTLIER_TOLERANCE_MAD,
            outlier_floor_px: DEFAULT_OUTLIER_FLOOR_PX,
            max_iterations: DEFAULT_MAX_REGISTRATION_ITERATIONS,
            convergence_tolerance: DEFAULT_CONVERGENCE_TOLERANCE_PX,
            match_radius_px: DEFAULT_MATCH_RADIUS_PX,
            triangle: TriangleMatchConfig::default(),
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("outlier_tolerance_mad", self.outlier_tolerance_mad),
            ("match_radius_px", self.match_radius_px),
            ("triangle.ratio_tolerance", self.triangle.ratio_tolerance),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MosaicError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !self.outlier_floor_px.is_finite() || self.outlier_floor_px < 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "outlier_floor_px must be non-negative, got {}",
                self.outlier_floor_px
            )));
        }
        if !self.convergence_tolerance.is_finite() || self.convergence_tolerance < 0.0 {
            return Err(MosaicError::InvalidConfig(format!(
                "convergence_tolerance must be non-negative, got {}",
                self.convergence_tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_iterations must be positive".into(),
            ));
        }
        if self.triangle.max_points < 3 {
            return Err(MosaicError::InvalidConfig(
                "triangle.max_points must be at least 3".into(),
            ));
        }
        Ok(())
    }
}
