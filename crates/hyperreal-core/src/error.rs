//! Error taxonomy for the generation pipeline.

use hyperreal_remote::RemoteCallError;

use crate::state::Phase;

/// Errors that block a run from starting, or reject malformed plan data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the front reference image is required before a run can start")]
    MissingFrontReference,

    #[error("dataset plan already completed ({cursor} of {len} shots)")]
    PlanExhausted { cursor: usize, len: usize },

    #[error("plan item {id} has an empty {field}")]
    InvalidPlanItem { id: u32, field: &'static str },

    #[error("plan item id {0} appears more than once")]
    DuplicatePlanId(u32),

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("plan index {index} is out of range for a plan of {len} shots")]
    CursorOutOfRange { index: usize, len: usize },

    #[error("a run is already active")]
    RunActive,
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("remote call failed during {phase}: {source}")]
    Remote {
        phase: Phase,
        #[source]
        source: RemoteCallError,
    },

    #[error("image error: {0}")]
    Image(String),

    #[error("run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    pub(crate) fn remote(phase: Phase) -> impl FnOnce(RemoteCallError) -> ForgeError {
        move |source| ForgeError::Remote { phase, source }
    }

    /// The phase a remote failure happened in, if this is one.
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            ForgeError::Remote { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
