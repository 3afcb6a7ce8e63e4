/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 2;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;

/// Gaussian sigma to FWHM conversion factor, 2*sqrt(2*ln 2).
pub const SIGMA_TO_FWHM: f64 = 2.354_820_045_030_949;

/// Scale factor turning a median absolute deviation into a Gaussian sigma.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Default detection threshold in multiples of the background noise.
pub const DEFAULT_DETECTION_SIGMA: f32 = 5.0;

/// Default minimum distance (pixels) between two accepted detections.
pub const DEFAULT_MIN_SEPARATION_PX: f64 = 3.0;

/// Default maximum number of accepted detections per frame.
pub const DEFAULT_MAX_CANDIDATES: usize = 50;

/// Local maxima kept for refinement, as a multiple of `max_candidates`.
pub const CANDIDATE_OVERSAMPLE: usize = 4;

/// Default half-width (pixels) of the centroid refinement window.
pub const DEFAULT_WINDOW_RADIUS: usize = 5;

/// Default upper bound on the relative RMS residual of a centroid fit.
pub const DEFAULT_MAX_FIT_RESIDUAL: f64 = 0.25;

/// Default sigma-clipping iterations for background estimation.
pub const DEFAULT_CLIP_ITERATIONS: usize = 5;

/// Default sigma-clipping rejection threshold for background estimation.
pub const DEFAULT_CLIP_SIGMA: f32 = 3.0;

/// Iteration cap for the windowed centroid refinement.
pub const CENTROID_MAX_ITERATIONS: usize = 20;

/// Windowed centroid refinement stops once a step is below this (pixels).
pub const CENTROID_CONVERGENCE_PX: f64 = 1e-4;

/// Default MAD multiple above the median residual for outlier rejection.
pub const DEFAULT_OUTLIER_TOLERANCE_MAD: f64 = 3.0;

/// Residuals below this (pixels) are never treated as outliers.
pub const DEFAULT_OUTLIER_FLOOR_PX: f64 = 0.1;

/// Default registration refinement iteration budget.
pub const DEFAULT_MAX_REGISTRATION_ITERATIONS: usize = 10;

/// Default RMS improvement (pixels) below which refinement has converged.
pub const DEFAULT_CONVERGENCE_TOLERANCE_PX: f64 = 1e-4;

/// Default nearest-neighbour search radius (pixels) for correspondence.
pub const DEFAULT_MATCH_RADIUS_PX: f64 = 3.0;

/// Default number of brightest points used to form triangles.
pub const DEFAULT_TRIANGLE_MAX_POINTS: usize = 15;

/// Default tolerance on triangle side-ratio invariants.
pub const DEFAULT_TRIANGLE_RATIO_TOLERANCE: f64 = 0.01;

/// Triangles whose longest/shortest side ratio exceeds this are ignored.
pub const TRIANGLE_MAX_ELONGATION: f64 = 10.0;

/// Relative tolerance for `apply_inverse(apply(p)) == p`.
pub const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// Iteration cap for Newton inversion of polynomial mappings.
pub const NEWTON_MAX_ITERATIONS: usize = 50;

/// Smallest acceptable normalised pivot in the least-squares solve.
pub const SINGULAR_PIVOT: f64 = 1e-10;

/// Default output pixel scale (reference pixels per output pixel).
pub const DEFAULT_OUTPUT_PIXEL_SCALE: f64 = 1.0;

/// Largest output grid (width * height) a composite will allocate.
pub const MAX_OUTPUT_PIXELS: usize = 1 << 27;

/// Default block count per axis when rebinning for recentering.
pub const DEFAULT_RECENTER_REBIN: usize = 32;

/// Offsets smaller than this (pixels) leave the frame where it is.
pub const DEFAULT_RECENTER_TOLERANCE_PX: f64 = 10.0;

/// Default row the PSF is recentred onto (2048x2048 short-wave detector).
pub const DEFAULT_RECENTER_ROW: f64 = 1412.0;

/// Default column the PSF is recentred onto (2048x2048 short-wave detector).
pub const DEFAULT_RECENTER_COL: f64 = 464.0;
