//! Frame-to-frame registration from matched centroids.
//!
//! Correspondences come either from a prior mapping plus nearest-neighbour
//! search, or from triangle voting when nothing is known about the relative
//! placement. The fit is then refined by iterated MAD-based outlier rejection.

pub mod config;
pub mod matching;
pub mod phase;
pub mod triangle;

pub use config::{RegistrationConfig, TriangleMatchConfig};
pub use matching::{match_nearest, Pair};
pub use phase::{estimate_translation, translation_prior};
pub use triangle::match_triangles;

use tracing::{debug, warn};

use crate::consts::MAD_TO_SIGMA;
use crate::detect::{accepted, Centroid};
use crate::error::{MosaicError, Result};
use crate::stats::{median, median_abs_deviation};
use crate::transform::fit::{fit_mapping, residuals, rms};
use crate::transform::{FitStats, Mapping, Point, Transform, TransformModel};

/// Fit the mapping from `source`'s pixel grid onto `target`'s.
///
/// Only accepted centroids take part. `prior`, when given, is an
/// approximate source-to-target mapping used to seed nearest-neighbour
/// matching; without it, correspondences come from triangle voting.
pub fn register(
    source: &[Centroid],
    target: &[Centroid],
    prior: Option<&Mapping>,
    config: &RegistrationConfig,
) -> Result<Transform> {
    config.validate()?;

    let source_id = source.first().map(|c| c.frame_id.as_str()).unwrap_or("");
    let target_id = target.first().map(|c| c.frame_id.as_str()).unwrap_or("");

    let src: Vec<Point> = accepted(source).map(Centroid::position).collect();
    let dst: Vec<Point> = accepted(target).map(Centroid::position).collect();

    let required = config.model.min_points();
    let insufficient = |found: usize| MosaicError::InsufficientPoints {
        frame_id: source_id.to_string(),
        required,
        found,
    };
    if src.len() < required || dst.len() < required {
        return Err(insufficient(src.len().min(dst.len())));
    }

    let pairs = match prior {
        Some(mapping) => match_nearest(&src, &dst, mapping, config.match_radius_px),
        None => {
            let seeds = match_triangles(&src, &dst, &config.triangle);
            debug!(frame = source_id, seeds = seeds.len(), "Triangle correspondences");

            // Seed with the requested model when there are enough votes,
            // else with a similarity, then rematch everything through it.
            let seed_model = if seeds.len() >= required + 2 {
                config.model
            } else {
                TransformModel::Similarity
            };
            if seeds.len() < seed_model.min_points() {
                return Err(insufficient(seeds.len()));
            }
            let (seed, _) = refine_fit(seed_model, &src, &dst, seeds, config, source_id)?;
            match_nearest(&src, &dst, &seed, config.match_radius_px)
        }
    };

    if pairs.len() < required {
        return Err(insufficient(pairs.len()));
    }

    let (mapping, stats) = refine_fit(config.model, &src, &dst, pairs, config, source_id)?;

    let transform = Transform::fitted(source_id, target_id, config.model, mapping, stats);
    debug!(%transform, rejected = stats.rejected_pairs, iterations = stats.iterations, "Registered");
    Ok(transform)
}

/// Fit `model` to `pairs`, dropping pairs whose residual exceeds
/// `max(median + k·1.4826·MAD, floor)` and refitting until nothing is
/// dropped or the RMS stops improving. The returned mapping is always
/// fitted to exactly the pairs it reports as matched.
fn refine_fit(
    model: TransformModel,
    src: &[Point],
    dst: &[Point],
    pairs: Vec<Pair>,
    config: &RegistrationConfig,
    frame_id: &str,
) -> Result<(Mapping, FitStats)> {
    let mut active = pairs;
    let mut rejected = 0;
    let mut previous_rms = f64::INFINITY;

    for iteration in 1..=config.max_iterations {
        let (mapping, res) = fit_pairs(model, src, dst, &active, frame_id)?;
        let current_rms = rms(&res);
        let center = median(&res).unwrap_or(0.0);
        let mad = median_abs_deviation(&res, center).unwrap_or(0.0);
        let limit = (center + config.outlier_tolerance_mad * MAD_TO_SIGMA * mad)
            .max(config.outlier_floor_px);

        let keep: Vec<Pair> = active
            .iter()
            .zip(res.iter())
            .filter(|(_, &r)| r <= limit)
            .map(|(&p, _)| p)
            .collect();
        let dropped = active.len() - keep.len();

        if dropped == 0 {
            let stats = FitStats {
                residual_rms: current_rms,
                matched_pairs: active.len(),
                rejected_pairs: rejected,
                iterations: iteration,
            };
            return Ok((mapping, stats));
        }

        rejected += dropped;
        active = keep;

        if (previous_rms - current_rms).abs() < config.convergence_tolerance {
            // RMS has settled; refit without the pairs just dropped.
            let (mapping, res) = fit_pairs(model, src, dst, &active, frame_id)?;
            let stats = FitStats {
                residual_rms: rms(&res),
                matched_pairs: active.len(),
                rejected_pairs: rejected,
                iterations: iteration,
            };
            return Ok((mapping, stats));
        }
        previous_rms = current_rms;
    }

    warn!(frame = frame_id, iterations = config.max_iterations, "Outlier rejection did not converge");
    Err(MosaicError::NoConvergence {
        frame_id: frame_id.to_string(),
        iterations: config.max_iterations,
    })
}

/// Least-squares fit over `pairs` and the per-pair residuals.
fn fit_pairs(
    model: TransformModel,
    src: &[Point],
    dst: &[Point],
    pairs: &[Pair],
    frame_id: &str,
) -> Result<(Mapping, Vec<f64>)> {
    let required = model.min_points();
    if pairs.len() < required {
        return Err(MosaicError::InsufficientPoints {
            frame_id: frame_id.to_string(),
            required,
            found: pairs.len(),
        });
    }
    let s: Vec<Point> = pairs.iter().map(|&(i, _)| src[i]).collect();
    let d: Vec<Point> = pairs.iter().map(|&(_, j)| dst[j]).collect();
    let mapping = fit_mapping(model, &s, &d).ok_or_else(|| MosaicError::DegenerateGeometry {
        frame_id: frame_id.to_string(),
    })?;
    let res = residuals(&mapping, &s, &d);
    Ok((mapping, res))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Affine;

    fn centroid(frame: &str, p: Point) -> Centroid {
        Centroid {
            frame_id: frame.to_string(),
            x: p.x,
            y: p.y,
            amplitude: 100.0,
            flux: 1000.0,
            fwhm: 2.5,
            residual: 0.01,
            quality: 0.99,
            rejection: None,
        }
    }

    fn grid_points() -> Vec<Point> {
        (0..12)
            .map(|i| {
                let fi = i as f64;
                Point::new(10.0 + (fi * 37.3) % 80.0, 8.0 + (fi * 23.9 + fi * fi) % 85.0)
            })
            .collect()
    }

    #[test]
    fn test_outlier_pair_is_rejected() {
        let pts = grid_points();
        let t = Affine::translation(2.0, -1.0);
        let src: Vec<Centroid> = pts.iter().map(|p| centroid("s", *p)).collect();
        let mut dst: Vec<Centroid> = pts.iter().map(|p| centroid("r", t.apply(*p))).collect();
        dst[3].x += 1.5;

        let prior = Mapping::Affine(t);
        let transform = register(&src, &dst, Some(&prior), &RegistrationConfig::default()).unwrap();
        assert!(transform.rejected_pairs() >= 1);
        assert_eq!(transform.matched_pairs() + transform.rejected_pairs(), 12);
        assert!(transform.residual_rms() < 1e-6);
        let (dx, dy) = transform.translation();
        assert!((dx - 2.0).abs() < 1e-6 && (dy + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_settled_rms_refits_without_dropped_pairs() {
        let pts = grid_points();
        let t = Affine::translation(2.0, -1.0);
        let src = pts.clone();
        let mut dst: Vec<Point> = pts.iter().map(|p| t.apply(*p)).collect();
        dst[3].x += 30.0;
        dst[7].x += 3.0;
        let pairs: Vec<Pair> = (0..pts.len()).map(|i| (i, i)).collect();

        // Any RMS change counts as settled once one round has been dropped.
        let config = RegistrationConfig {
            convergence_tolerance: 1e6,
            ..Default::default()
        };
        let (mapping, stats) = refine_fit(TransformModel::Similarity, &src, &dst, pairs, &config, "s").unwrap();
        assert_eq!(stats.matched_pairs + stats.rejected_pairs, 12);
        assert!(stats.rejected_pairs >= 2);
        assert!(stats.residual_rms < 1e-6, "rms = {}", stats.residual_rms);
        let p = mapping.apply(Point::new(50.0, 50.0));
        assert!((p.x - 52.0).abs() < 1e-6 && (p.y - 49.0).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_points() {
        let src = vec![centroid("s", Point::new(1.0, 1.0))];
        let dst = vec![centroid("r", Point::new(1.0, 1.0))];
        let err = register(&src, &dst, None, &RegistrationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            MosaicError::InsufficientPoints { required: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_collinear_affine_is_degenerate() {
        let pts: Vec<Point> = (0..5).map(|i| Point::new(i as f64 * 10.0, 20.0)).collect();
        let src: Vec<Centroid> = pts.iter().map(|p| centroid("s", *p)).collect();
        let dst = src.clone();
        let config = RegistrationConfig {
            model: TransformModel::Affine,
            ..Default::default()
        };
        let err = register(&src, &dst, Some(&Mapping::identity()), &config).unwrap_err();
        assert!(matches!(err, MosaicError::DegenerateGeometry { .. }));
    }
}
