//! Events published to run observers.

use serde::{Deserialize, Serialize};

use crate::state::Phase;

/// Why a run reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was observed at a checkpoint.
    Cancelled,
    /// Every shot of the plan has been completed.
    PlanExhausted,
    /// A remote call failed; the error is returned from `wait()`.
    Failed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Cancelled => "cancelled",
            StopReason::PlanExhausted => "plan_exhausted",
            StopReason::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle notifications for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    PhaseChanged {
        phase: Phase,
        cursor: usize,
    },
    ArtifactCreated {
        artifact_id: String,
        plan_id: Option<u32>,
    },
    CaptionUpdated {
        artifact_id: String,
        degraded: bool,
    },
    QualityScored {
        plan_id: u32,
        score: u8,
        attempt: u32,
        accepted: bool,
    },
    Stopped {
        reason: StopReason,
    },
    Failed {
        phase: Option<Phase>,
        message: String,
    },
}
