use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_OUTPUT_PIXEL_SCALE;
use crate::detect::DetectionConfig;
use crate::error::{MosaicError, Result};
use crate::mosaic::{GridBounds, GridSpec, Interpolation};
use crate::register::RegistrationConfig;

/// Where the registration prior for each frame comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorSource {
    /// Triangle matching with no prior.
    #[default]
    None,
    /// Each frame's `pixel_to_reference` metadata.
    FrameCoordinates,
    /// FFT phase correlation against the reference frame.
    PhaseCorrelation,
}

impl std::fmt::Display for PriorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::FrameCoordinates => write!(f, "Frame coordinates"),
            Self::PhaseCorrelation => write!(f, "Phase correlation"),
        }
    }
}

/// Output grid and resampling settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale: f64,
    #[serde(default)]
    pub bounds: GridBounds,
    #[serde(default)]
    pub interpolation: Interpolation,
}

fn default_pixel_scale() -> f64 {
    DEFAULT_OUTPUT_PIXEL_SCALE
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pixel_scale: DEFAULT_OUTPUT_PIXEL_SCALE,
            bounds: GridBounds::Union,
            interpolation: Interpolation::default(),
        }
    }
}

impl OutputConfig {
    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            pixel_scale: self.pixel_scale,
            bounds: self.bounds.clone(),
        }
    }
}

/// Full configuration of an analysis session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Frame whose pixel grid defines reference coordinates. Defaults to
    /// the first frame.
    #[serde(default)]
    pub reference_frame: Option<String>,
    #[serde(default)]
    pub prior: PriorSource,
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.registration.validate()?;
        self.output.grid_spec().validate()?;
        if self.reference_frame.as_deref() == Some("") {
            return Err(MosaicError::InvalidConfig(
                "reference_frame must not be empty".into(),
            ));
        }
        Ok(())
    }
}
