use super::progress::SessionStage;

/// Lifecycle of an [`AnalysisSession`](super::AnalysisSession).
///
/// ```text
/// Idle -> Detecting -> Registering -> Compositing -> Complete
///   \________\______________\______________\-----> Failed
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Detecting,
    Registering,
    Compositing,
    Complete,
    Failed { stage: SessionStage, reason: String },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Detecting)
            | (Self::Detecting, Self::Registering)
            | (Self::Registering, Self::Compositing)
            | (Self::Compositing, Self::Complete) => true,
            (from, Self::Failed { .. }) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Stage that work in this state belongs to.
    pub fn stage(&self) -> Option<SessionStage> {
        match self {
            Self::Detecting => Some(SessionStage::Detecting),
            Self::Registering => Some(SessionStage::Registering),
            Self::Compositing => Some(SessionStage::Compositing),
            Self::Failed { stage, .. } => Some(*stage),
            Self::Idle | Self::Complete => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Detecting => write!(f, "Detecting"),
            Self::Registering => write!(f, "Registering"),
            Self::Compositing => write!(f, "Compositing"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed { stage, reason } => write!(f, "Failed ({stage}: {reason})"),
        }
    }
}
