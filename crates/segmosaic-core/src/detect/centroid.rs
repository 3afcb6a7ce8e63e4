use crate::transform::Point;

/// Why a candidate was kept out of the accepted set.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    /// Within the minimum separation of a brighter accepted detection.
    TooClose { neighbour_x: f64, neighbour_y: f64 },
    /// Refinement window extends past the frame edge.
    TouchesEdge,
    /// Refinement window contains a masked pixel.
    TouchesMask,
    /// Relative fit residual above the configured bound.
    PoorFit,
    /// Accepted set was already full.
    CandidateLimit,
    /// Windowed centroid wandered away from its peak.
    Diverged,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooClose {
                neighbour_x,
                neighbour_y,
            } => write!(f, "too close to ({neighbour_x:.2}, {neighbour_y:.2})"),
            Self::TouchesEdge => write!(f, "window touches frame edge"),
            Self::TouchesMask => write!(f, "window touches mask"),
            Self::PoorFit => write!(f, "poor profile fit"),
            Self::CandidateLimit => write!(f, "candidate limit reached"),
            Self::Diverged => write!(f, "centroid diverged"),
        }
    }
}

/// Sub-pixel position and shape of one point source.
#[derive(Clone, Debug, PartialEq)]
pub struct Centroid {
    pub frame_id: String,
    /// Column position, in [0, width).
    pub x: f64,
    /// Row position, in [0, height).
    pub y: f64,
    /// Peak height above the local background.
    pub amplitude: f64,
    /// Integrated flux of the fitted Gaussian.
    pub flux: f64,
    /// Full width at half maximum of the fitted Gaussian (pixels).
    pub fwhm: f64,
    /// Relative RMS residual of the profile fit.
    pub residual: f64,
    /// In (0, 1] for fitted candidates, higher is better; 0 when unfitted.
    pub quality: f64,
    pub rejection: Option<Rejection>,
}

impl Centroid {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Accepted centroids only, in their original (amplitude) order.
pub fn accepted(centroids: &[Centroid]) -> impl Iterator<Item = &Centroid> {
    centroids.iter().filter(|c| c.is_accepted())
}
