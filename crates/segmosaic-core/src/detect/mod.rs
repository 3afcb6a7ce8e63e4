//! Point-source (segment spot / PSF) detection within one frame.
//!
//! Pipeline: sigma-clipped background -> cutoff -> local maxima ->
//! windowed sub-pixel refinement -> separation and count limits.

pub mod centroid;
pub mod config;
pub mod peaks;
pub mod refine;

pub use centroid::{accepted, Centroid, Rejection};
pub use config::{DetectionConfig, Threshold};

use tracing::debug;

use crate::consts::CANDIDATE_OVERSAMPLE;
use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::stats::sigma_clipped_stats;

use peaks::find_local_maxima;
use refine::refine_candidate;

/// Detect point sources in `frame`.
///
/// Returns every refined candidate sorted by descending amplitude, including
/// the ones flagged with a [`Rejection`] so diagnostics can show them. An
/// empty vector means nothing cleared the threshold.
pub fn detect(frame: &ImageFrame, config: &DetectionConfig) -> Result<Vec<Centroid>> {
    config.validate()?;
    validate_frame(frame)?;

    let values = frame.valid_values();
    let stats = sigma_clipped_stats(&values, &config.sigma_clip)
        .ok_or_else(|| MosaicError::invalid_frame(frame.id(), "no valid pixels"))?;
    let cutoff = config.threshold.cutoff(stats.median, stats.sigma);

    let limit = config.max_candidates.saturating_mul(CANDIDATE_OVERSAMPLE);
    let peaks = find_local_maxima(frame, cutoff, limit);

    debug!(
        frame = frame.id(),
        background = stats.median,
        noise = stats.sigma,
        cutoff,
        peaks = peaks.len(),
        "Background estimated"
    );

    let mut centroids: Vec<Centroid> = peaks
        .iter()
        .map(|p| refine_candidate(frame, p, stats.median, config))
        .collect();

    centroids.sort_by(|a, b| {
        b.amplitude
            .total_cmp(&a.amplitude)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });

    apply_separation(&mut centroids, config);

    debug!(
        frame = frame.id(),
        candidates = centroids.len(),
        accepted = centroids.iter().filter(|c| c.is_accepted()).count(),
        "Detection complete"
    );

    Ok(centroids)
}

/// Walk candidates brightest first; flag those too close to an already
/// accepted one, then those beyond the candidate limit.
fn apply_separation(centroids: &mut [Centroid], config: &DetectionConfig) {
    let mut kept: Vec<(f64, f64)> = Vec::new();
    let min_sep = config.min_separation_px;

    for c in centroids.iter_mut() {
        if c.rejection.is_some() {
            continue;
        }
        if let Some(&(nx, ny)) = kept
            .iter()
            .find(|(kx, ky)| ((c.x - kx).powi(2) + (c.y - ky).powi(2)).sqrt() < min_sep)
        {
            c.rejection = Some(Rejection::TooClose {
                neighbour_x: nx,
                neighbour_y: ny,
            });
            continue;
        }
        if kept.len() >= config.max_candidates {
            c.rejection = Some(Rejection::CandidateLimit);
            continue;
        }
        kept.push((c.x, c.y));
    }
}

/// Reject empty or fully masked frames and unmasked non-finite pixels.
pub fn validate_frame(frame: &ImageFrame) -> Result<()> {
    if frame.is_empty() {
        return Err(MosaicError::invalid_frame(frame.id(), "frame is empty"));
    }
    if frame.valid_pixel_count() == 0 {
        return Err(MosaicError::invalid_frame(frame.id(), "frame is fully masked"));
    }
    for ((row, col), &v) in frame.data().indexed_iter() {
        if !v.is_finite() && frame.is_valid(row, col) {
            return Err(MosaicError::invalid_frame(
                frame.id(),
                format!("non-finite value {v} at row {row}, col {col}"),
            ));
        }
    }
    Ok(())
}
