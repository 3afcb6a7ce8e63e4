use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Session processing stage, used for progress reporting and failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStage {
    Detecting,
    Registering,
    Compositing,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detecting => write!(f, "Detecting centroids"),
            Self::Registering => write!(f, "Registering frames"),
            Self::Compositing => write!(f, "Compositing mosaic"),
        }
    }
}

/// Thread-safe progress reporting for an analysis session.
///
/// The host viewer implements this to drive its progress display. All
/// methods have no-op defaults. `advance` may be called from worker threads.
pub trait ProgressReporter: Send + Sync {
    /// A stage has started; `total_items` is its work-item count if known.
    fn begin_stage(&self, _stage: SessionStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

pub(crate) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative cancellation flag shared between the host and a session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
