use thiserror::Error;

#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid frame '{frame_id}': {reason}")]
    InvalidFrame { frame_id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame '{frame_id}': {found} usable points, transform needs {required}")]
    InsufficientPoints {
        frame_id: String,
        required: usize,
        found: usize,
    },

    #[error("Frame '{frame_id}': matched points are degenerate for the requested transform")]
    DegenerateGeometry { frame_id: String },

    #[error("Frame '{frame_id}': registration did not converge within {iterations} iterations")]
    NoConvergence { frame_id: String, iterations: usize },

    #[error("Transform/frame mismatch for '{frame_id}'")]
    GridMismatch { frame_id: String },

    #[error("No frame intersects the output grid")]
    EmptyMosaic,

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Session failed while {stage}: {reason}")]
    SessionFailed { stage: String, reason: String },

    #[error("Session cancelled before {stage}")]
    Cancelled { stage: String },

    #[error("Config error: {0}")]
    Config(String),
}

impl MosaicError {
    pub(crate) fn invalid_frame(frame_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            frame_id: frame_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Fill in the frame id when the error was raised without one, as
    /// registration does for a frame with no centroids.
    pub(crate) fn for_frame(mut self, id: &str) -> Self {
        match &mut self {
            Self::InvalidFrame { frame_id, .. }
            | Self::InsufficientPoints { frame_id, .. }
            | Self::DegenerateGeometry { frame_id }
            | Self::NoConvergence { frame_id, .. }
            | Self::GridMismatch { frame_id } => {
                if frame_id.is_empty() {
                    *frame_id = id.to_string();
                }
            }
            _ => {}
        }
        self
    }

    /// Identifier of the frame this error refers to, when there is one.
    pub fn frame_id(&self) -> Option<&str> {
        match self {
            Self::InvalidFrame { frame_id, .. }
            | Self::InsufficientPoints { frame_id, .. }
            | Self::DegenerateGeometry { frame_id }
            | Self::NoConvergence { frame_id, .. }
            | Self::GridMismatch { frame_id } => Some(frame_id),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MosaicError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MosaicError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MosaicError>;
