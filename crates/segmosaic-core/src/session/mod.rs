//! End-to-end analysis: detect centroids in every frame, register each frame
//! onto a reference frame, and composite the registered frames.

pub mod config;
pub mod progress;
pub mod report;
pub mod state;

pub use config::{OutputConfig, PriorSource, SessionConfig};
pub use progress::{CancelToken, ProgressReporter, SessionStage};
pub use report::{FrameReport, FrameStatus};
pub use state::SessionState;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::detect::{detect, Centroid};
use crate::error::{MosaicError, Result};
use crate::frame::ImageFrame;
use crate::mosaic::{composite, MosaicResult};
use crate::register::{register, translation_prior};
use crate::transform::fit::fit_mapping;
use crate::transform::{Mapping, Point, Transform, TransformModel};

use progress::NoOpReporter;

/// Sample grid per axis used to linearise non-affine coordinate priors.
const PRIOR_SAMPLES: usize = 5;

/// Result of a completed session.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub mosaic: MosaicResult,
    pub reports: Vec<FrameReport>,
}

/// One analysis run over a set of segment frames.
///
/// A session runs once; create a new one for the next data set.
pub struct AnalysisSession {
    config: SessionConfig,
    state: SessionState,
    reports: Vec<FrameReport>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            reports: Vec::new(),
            reporter: Arc::new(NoOpReporter),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Token the host can use to cancel the run between stages.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Per-frame reports gathered so far, in input order.
    pub fn reports(&self) -> &[FrameReport] {
        &self.reports
    }

    /// Run detection, registration and compositing over `frames`.
    pub fn run(&mut self, frames: Vec<ImageFrame>) -> Result<SessionOutcome> {
        self.transition(SessionState::Detecting)?;

        if let Err(e) = self.config.validate() {
            return Err(self.fail(SessionStage::Detecting, e));
        }
        let reference_idx = match self.check_frames(&frames) {
            Ok(idx) => idx,
            Err(reason) => return Err(self.session_failed(SessionStage::Detecting, reason)),
        };
        self.reports = frames.iter().map(|f| FrameReport::pending(f.id())).collect();

        info!(
            frames = frames.len(),
            reference = frames[reference_idx].id(),
            prior = %self.config.prior,
            model = %self.config.registration.model,
            "Starting analysis session"
        );

        // Detecting
        self.check_cancelled(SessionStage::Detecting)?;
        let detections = self.detect_all(&frames);
        let reference_centroids = match &detections[reference_idx] {
            Ok(c) => c.clone(),
            Err(e) => {
                let reason = format!("reference frame '{}': {e}", frames[reference_idx].id());
                return Err(self.session_failed(SessionStage::Detecting, reason));
            }
        };

        // Registering
        self.check_cancelled(SessionStage::Registering)?;
        self.transition(SessionState::Registering)?;
        let transforms = self.register_all(&frames, &detections, reference_idx, &reference_centroids);

        // Compositing
        self.check_cancelled(SessionStage::Compositing)?;
        self.transition(SessionState::Compositing)?;

        let mut registered = Vec::new();
        let mut accepted_transforms = Vec::new();
        for (frame, transform) in frames.into_iter().zip(transforms) {
            if let Some(t) = transform {
                registered.push(frame);
                accepted_transforms.push(t);
            }
        }
        if registered.is_empty() {
            return Err(self.session_failed(SessionStage::Compositing, "no registered frames".into()));
        }

        let grid_spec = self.config.output.grid_spec();
        let interpolation = self.config.output.interpolation;
        self.reporter.begin_stage(SessionStage::Compositing, Some(registered.len()));
        let mosaic = match composite(&registered, &accepted_transforms, &grid_spec, interpolation) {
            Ok(m) => m,
            Err(e) => return Err(self.fail(SessionStage::Compositing, e)),
        };
        self.reporter.advance(registered.len());
        self.reporter.finish_stage();

        for report in self.reports.iter_mut() {
            if let Some(c) = mosaic.contributions.iter().find(|c| c.frame_id == report.frame_id) {
                report.pixels_contributed = c.pixels_contributed;
                if report.status == FrameStatus::Registered {
                    report.status = FrameStatus::Composited;
                }
            } else if mosaic.skipped.contains(&report.frame_id) {
                report.status = FrameStatus::Skipped;
            }
        }

        self.transition(SessionState::Complete)?;
        info!(
            registered = accepted_transforms.len(),
            failed = self.reports.iter().filter(|r| r.status.is_failure()).count(),
            width = mosaic.width(),
            height = mosaic.height(),
            "Analysis session complete"
        );

        Ok(SessionOutcome {
            mosaic,
            reports: self.reports.clone(),
        })
    }

    /// Index of the reference frame, or why the frame set is unusable.
    fn check_frames(&self, frames: &[ImageFrame]) -> std::result::Result<usize, String> {
        if frames.is_empty() {
            return Err("no frames supplied".into());
        }
        let mut seen = BTreeSet::new();
        for f in frames {
            if !seen.insert(f.id()) {
                return Err(format!("duplicate frame id '{}'", f.id()));
            }
        }
        match &self.config.reference_frame {
            None => Ok(0),
            Some(id) => frames
                .iter()
                .position(|f| f.id() == id.as_str())
                .ok_or_else(|| format!("reference frame '{id}' not found")),
        }
    }

    fn detect_all(&mut self, frames: &[ImageFrame]) -> Vec<Result<Vec<Centroid>>> {
        self.reporter.begin_stage(SessionStage::Detecting, Some(frames.len()));
        let done = AtomicUsize::new(0);
        let reporter = &self.reporter;
        let config = &self.config.detection;

        let detections: Vec<Result<Vec<Centroid>>> = frames
            .par_iter()
            .map(|frame| {
                let result = detect(frame, config);
                reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                result
            })
            .collect();
        self.reporter.finish_stage();

        for (report, result) in self.reports.iter_mut().zip(detections.iter()) {
            match result {
                Ok(centroids) => {
                    report.status = FrameStatus::Detected;
                    report.centroids_found = centroids.len();
                    report.centroids_accepted = centroids.iter().filter(|c| c.is_accepted()).count();
                }
                Err(e) => {
                    warn!(frame = %report.frame_id, error = %e, "Detection failed");
                    report.fail(FrameStatus::DetectionFailed, e);
                }
            }
        }
        detections
    }

    /// One transform per frame; `None` where the frame could not be
    /// registered.
    fn register_all(
        &mut self,
        frames: &[ImageFrame],
        detections: &[Result<Vec<Centroid>>],
        reference_idx: usize,
        reference_centroids: &[Centroid],
    ) -> Vec<Option<Transform>> {
        self.reporter.begin_stage(SessionStage::Registering, Some(frames.len()));
        let done = AtomicUsize::new(0);
        let reporter = &self.reporter;
        let config = &self.config;
        let reference = &frames[reference_idx];

        let results: Vec<Option<Result<Transform>>> = frames
            .par_iter()
            .zip(detections.par_iter())
            .enumerate()
            .map(|(idx, (frame, detected))| {
                let result = if idx == reference_idx {
                    Some(Ok(Transform::identity(frame.id(), frame.id())))
                } else {
                    detected.as_ref().ok().map(|centroids| {
                        let prior = prior_for(config.prior, frame, reference);
                        register(centroids, reference_centroids, prior.as_ref(), &config.registration)
                            .map_err(|e| e.for_frame(frame.id()))
                    })
                };
                reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                result
            })
            .collect();
        self.reporter.finish_stage();

        let mut transforms = Vec::with_capacity(results.len());
        for (idx, (report, result)) in self.reports.iter_mut().zip(results).enumerate() {
            match result {
                Some(Ok(t)) => {
                    report.status = if idx == reference_idx {
                        FrameStatus::Reference
                    } else {
                        FrameStatus::Registered
                    };
                    report.matched_pairs = t.matched_pairs();
                    report.residual_rms = Some(t.residual_rms());
                    debug!(%t, "Frame registered");
                    transforms.push(Some(t));
                }
                Some(Err(e)) => {
                    warn!(frame = %report.frame_id, error = %e, "Registration failed");
                    report.fail(FrameStatus::RegistrationFailed, &e);
                    transforms.push(None);
                }
                None => transforms.push(None),
            }
        }
        transforms
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(MosaicError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }

    fn check_cancelled(&mut self, stage: SessionStage) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(%stage, "Session cancelled");
            return Err(self.fail(
                stage,
                MosaicError::Cancelled {
                    stage: stage.to_string(),
                },
            ));
        }
        Ok(())
    }

    fn session_failed(&mut self, stage: SessionStage, reason: String) -> MosaicError {
        self.fail(
            stage,
            MosaicError::SessionFailed {
                stage: stage.to_string(),
                reason,
            },
        )
    }

    /// Move to `Failed` and hand back `error` for the caller to return.
    fn fail(&mut self, stage: SessionStage, error: MosaicError) -> MosaicError {
        let failed = SessionState::Failed {
            stage,
            reason: error.to_string(),
        };
        if self.state.can_transition_to(&failed) {
            self.state = failed;
        }
        warn!(%stage, %error, "Session failed");
        error
    }
}

/// Approximate `frame pixel -> reference pixel` mapping used to seed
/// matching, if the configured source can provide one.
fn prior_for(source: PriorSource, frame: &ImageFrame, reference: &ImageFrame) -> Option<Mapping> {
    match source {
        PriorSource::None => None,
        PriorSource::FrameCoordinates => coordinate_prior(frame, reference),
        PriorSource::PhaseCorrelation => match translation_prior(reference, frame) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(frame = frame.id(), error = %e, "Phase correlation failed, matching without prior");
                None
            }
        },
    }
}

/// Chain the frame's own `pixel_to_reference` with the inverse of the
/// reference frame's.
fn coordinate_prior(frame: &ImageFrame, reference: &ImageFrame) -> Option<Mapping> {
    if let (Mapping::Affine(f), Mapping::Affine(r)) = (frame.pixel_to_reference(), reference.pixel_to_reference()) {
        return r.inverse().map(|inv| Mapping::Affine(inv.compose(f)));
    }

    let (w, h) = (frame.width().max(2) as f64, frame.height().max(2) as f64);
    let mut src = Vec::new();
    let mut dst = Vec::new();
    for i in 0..PRIOR_SAMPLES {
        for j in 0..PRIOR_SAMPLES {
            let p = Point::new(
                (w - 1.0) * i as f64 / (PRIOR_SAMPLES - 1) as f64,
                (h - 1.0) * j as f64 / (PRIOR_SAMPLES - 1) as f64,
            );
            let sky = frame.pixel_to_reference().apply(p);
            if let Some(q) = reference.pixel_to_reference().apply_inverse(sky) {
                src.push(p);
                dst.push(q);
            }
        }
    }
    fit_mapping(TransformModel::Quadratic, &src, &dst)
}
