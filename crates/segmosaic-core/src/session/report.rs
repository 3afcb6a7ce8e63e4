/// Where a frame ended up in the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Pending,
    Detected,
    /// Anchor of the reference-pixel coordinate system.
    Reference,
    Registered,
    Composited,
    /// Registered, but nothing landed on the output grid.
    Skipped,
    DetectionFailed,
    RegistrationFailed,
}

impl FrameStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::DetectionFailed | Self::RegistrationFailed)
    }
}

impl std::fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Detected => write!(f, "detected"),
            Self::Reference => write!(f, "reference"),
            Self::Registered => write!(f, "registered"),
            Self::Composited => write!(f, "composited"),
            Self::Skipped => write!(f, "skipped"),
            Self::DetectionFailed => write!(f, "detection failed"),
            Self::RegistrationFailed => write!(f, "registration failed"),
        }
    }
}

/// Per-frame diagnostics for the host viewer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_id: String,
    pub status: FrameStatus,
    pub centroids_found: usize,
    pub centroids_accepted: usize,
    pub matched_pairs: usize,
    pub residual_rms: Option<f64>,
    pub pixels_contributed: usize,
    pub error: Option<String>,
}

impl FrameReport {
    pub(crate) fn pending(frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            status: FrameStatus::Pending,
            centroids_found: 0,
            centroids_accepted: 0,
            matched_pairs: 0,
            residual_rms: None,
            pixels_contributed: 0,
            error: None,
        }
    }

    pub(crate) fn fail(&mut self, status: FrameStatus, error: &crate::error::MosaicError) {
        self.status = status;
        self.error = Some(error.to_string());
    }
}
