//! HyperReal Core Library
//!
//! The generation pipeline: shot plan, identity reference selection, face
//! crops, the per-shot phase machine, run supervision and dataset export.
//!
//! ## Layer 1 - Pipeline
//!
//! Depends on `hyperreal-remote` for the [`GenerationClient`] boundary.

pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod export;
pub mod freeform;
pub mod obs;
pub mod plan;
pub mod reference;
pub mod selection;
pub mod state;
pub mod supervisor;
pub mod telemetry;
pub mod transform;

pub use artifact::{ArtifactStore, GeneratedArtifact, PLACEHOLDER_CAPTION};
pub use config::{QualityGate, RunConfig, DEFAULT_COOLDOWN};
pub use controller::{validate_start, PipelineController, ShotOutcome};
pub use error::{ForgeError, Result, ValidationError};
pub use events::{RunEvent, StopReason};
pub use export::export_dataset;
pub use freeform::generate_single;
pub use obs::{
    emit_caption_degraded, emit_phase_entered, emit_quality_scored, emit_run_failed,
    emit_run_started, emit_run_stopped, emit_shot_completed, run_span, RunSpan,
};
pub use plan::{PlanCatalog, PlanItem, DEFAULT_SUBJECT};
pub use reference::{ReferenceSet, ReferenceSlot};
pub use selection::{classify, select, SceneCategory, SelectionEntry, SelectionPlan, Transform};
pub use state::{Phase, PipelineRunState, Progress, RunHandle};
pub use supervisor::{RunReport, RunSupervisor, StartOutcome};
pub use telemetry::init_tracing;
pub use transform::crop;

pub use hyperreal_remote::{
    AspectRatio, GenerationClient, GenerationOptions, ImagePayload, ImageSize, RemoteCallError,
    StyleMode,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
