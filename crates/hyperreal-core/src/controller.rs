//! Pipeline Controller: drives one shot through sketch, synthesis, judging
//! and captioning.
//!
//! Cancellation is cooperative. The run's flag is checked immediately before
//! each remote call; a call already in flight completes and its result is
//! discarded. Remote failures are fatal to the run, with the failing phase
//! attached. Captioning failures are recovered locally.

use std::sync::Arc;

use hyperreal_remote::{
    GenerationClient, IdentityReference, ImagePayload, RemoteCallError, RemoteOperation,
    SynthesisRequest,
};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::config::{QualityGate, RunConfig};
use crate::error::{ForgeError, Result, ValidationError};
use crate::events::RunEvent;
use crate::obs;
use crate::plan::{PlanCatalog, PlanItem};
use crate::reference::ReferenceSet;
use crate::selection::{self, SelectionPlan};
use crate::state::{Phase, RunHandle};

/// Result of driving one shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShotOutcome {
    /// Captioning finished and the cursor advanced to `cursor`.
    Completed { artifact_id: String, cursor: usize },
    /// Cancellation was observed at a checkpoint; nothing advanced.
    Cancelled,
}

/// Judge verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accepted(u8),
    /// Below threshold with retry budget left; regenerate from the same sketch.
    QualityRejected(u8),
    /// Below threshold, budget spent; the gate is advisory from here.
    Conceded(u8),
}

/// How the caption for an artifact was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CaptionOutcome {
    Captioned(String),
    /// Captioner failed or returned nothing; `fallback` was used instead.
    DegradedCaption { fallback: String, reason: String },
}

impl CaptionOutcome {
    pub(crate) fn text(&self) -> &str {
        match self {
            CaptionOutcome::Captioned(text) => text,
            CaptionOutcome::DegradedCaption { fallback, .. } => fallback,
        }
    }

    pub(crate) fn is_degraded(&self) -> bool {
        matches!(self, CaptionOutcome::DegradedCaption { .. })
    }
}

/// Preconditions for starting a run at `cursor`.
pub fn validate_start(
    references: &ReferenceSet,
    plan: &PlanCatalog,
    cursor: usize,
) -> std::result::Result<(), ValidationError> {
    if !references.has_front() {
        return Err(ValidationError::MissingFrontReference);
    }
    if cursor >= plan.len() {
        return Err(ValidationError::PlanExhausted {
            cursor,
            len: plan.len(),
        });
    }
    Ok(())
}

/// Select references for `scene_text` and apply transforms off the executor.
pub(crate) async fn resolve_references(
    references: &ReferenceSet,
    scene_text: &str,
) -> Result<(SelectionPlan, Vec<IdentityReference>)> {
    let selection = selection::select(references, scene_text);
    debug!(
        category = %selection.category,
        slots = ?selection.iter().map(|e| e.slot.as_str()).collect::<Vec<_>>(),
        "References selected"
    );
    let plan = selection.clone();
    let references = references.clone();
    let resolved = tokio::task::spawn_blocking(move || plan.materialize(&references)).await?;
    Ok((selection, resolved))
}

/// Synthesize and keep the first candidate.
pub(crate) async fn synthesize_first(
    client: &dyn GenerationClient,
    request: &SynthesisRequest,
) -> Result<ImagePayload> {
    let images = client
        .synthesize(request)
        .await
        .map_err(ForgeError::remote(Phase::Generating))?;
    debug!(candidates = images.len(), "Synthesis returned");
    images.into_iter().next().ok_or(ForgeError::Remote {
        phase: Phase::Generating,
        source: RemoteCallError::EmptyResult {
            operation: RemoteOperation::Synthesize,
        },
    })
}

/// Caption `artifact` and store the result, falling back to `fallback`.
pub(crate) async fn caption_artifact(
    client: &dyn GenerationClient,
    store: &ArtifactStore,
    artifact: &GeneratedArtifact,
    trigger: &str,
    fallback: String,
) -> CaptionOutcome {
    let outcome = match client.caption(&artifact.image, trigger).await {
        Ok(text) if !text.trim().is_empty() => CaptionOutcome::Captioned(text.trim().to_string()),
        Ok(_) => CaptionOutcome::DegradedCaption {
            fallback,
            reason: "empty caption".to_string(),
        },
        Err(e) => CaptionOutcome::DegradedCaption {
            fallback,
            reason: e.to_string(),
        },
    };
    if let CaptionOutcome::DegradedCaption { reason, .. } = &outcome {
        obs::emit_caption_degraded(&artifact.id, reason);
    }
    store.update_caption(&artifact.id, outcome.text());
    outcome
}

/// Sequences shots of one plan against a generation client.
pub struct PipelineController {
    client: Arc<dyn GenerationClient>,
    plan: PlanCatalog,
    references: ReferenceSet,
    trigger: String,
    config: RunConfig,
    store: ArtifactStore,
}

impl PipelineController {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        plan: PlanCatalog,
        references: ReferenceSet,
        trigger: impl Into<String>,
        config: RunConfig,
        store: ArtifactStore,
    ) -> Self {
        Self {
            client,
            plan,
            references,
            trigger: trigger.into(),
            config,
            store,
        }
    }

    pub fn plan(&self) -> &PlanCatalog {
        &self.plan
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Drive the shot at the handle's cursor from `Sketching` through
    /// `Captioning`. The cursor advances only when captioning has resolved.
    pub async fn run_shot(&self, handle: &RunHandle) -> Result<ShotOutcome> {
        let cursor = handle.cursor();
        let item = self
            .plan
            .get(cursor)
            .ok_or(ValidationError::PlanExhausted {
                cursor,
                len: self.plan.len(),
            })?
            .clone();
        handle.reset_retries();

        if handle.should_stop_before(Phase::Sketching) {
            return Ok(ShotOutcome::Cancelled);
        }
        handle.enter(Phase::Sketching);
        let sketch = self
            .client
            .generate_sketch(&item.pose_text(), self.config.generation.aspect_ratio)
            .await
            .map_err(ForgeError::remote(Phase::Sketching))?;
        handle.set_last_sketch(Some(sketch));

        let (selection, references) =
            resolve_references(&self.references, &item.selection_text()).await?;
        let request = SynthesisRequest {
            prompt: item.scene_prompt(&self.config.subject),
            // Retries reuse this sketch; it is never regenerated within a shot.
            sketch: handle.last_sketch(),
            references,
            identity_focus: selection.identity_focus(),
            options: self.config.generation,
        };

        let (image, score) = loop {
            if handle.should_stop_before(Phase::Generating) {
                return Ok(ShotOutcome::Cancelled);
            }
            handle.enter(Phase::Generating);
            let image = synthesize_first(self.client.as_ref(), &request).await?;

            let Some(gate) = self.config.quality_gate else {
                break (image, None);
            };
            if handle.should_stop_before(Phase::Judging) {
                return Ok(ShotOutcome::Cancelled);
            }
            handle.enter(Phase::Judging);
            match self.judge(handle, &item, &gate, &image).await? {
                Verdict::Accepted(score) | Verdict::Conceded(score) => break (image, Some(score)),
                Verdict::QualityRejected(score) => {
                    let attempt = handle.record_retry();
                    info!(
                        plan_id = item.id,
                        score = score,
                        attempt = attempt,
                        "Quality below threshold, regenerating"
                    );
                }
            }
        };

        if handle.should_stop_before(Phase::Captioning) {
            return Ok(ShotOutcome::Cancelled);
        }
        handle.enter(Phase::Captioning);
        let artifact = self
            .store
            .create(image, request.prompt.clone(), score, Some(item.id));
        handle.publish(RunEvent::ArtifactCreated {
            artifact_id: artifact.id.clone(),
            plan_id: Some(item.id),
        });

        let fallback = item.fallback_caption(&self.trigger, &self.config.subject);
        let caption =
            caption_artifact(self.client.as_ref(), &self.store, &artifact, &self.trigger, fallback)
                .await;
        handle.publish(RunEvent::CaptionUpdated {
            artifact_id: artifact.id.clone(),
            degraded: caption.is_degraded(),
        });

        let cursor = handle.advance_cursor();
        obs::emit_shot_completed(handle.run_id(), item.id, &artifact.id, cursor);
        Ok(ShotOutcome::Completed {
            artifact_id: artifact.id,
            cursor,
        })
    }

    async fn judge(
        &self,
        handle: &RunHandle,
        item: &PlanItem,
        gate: &QualityGate,
        image: &ImagePayload,
    ) -> Result<Verdict> {
        let score = self
            .client
            .evaluate_quality(image)
            .await
            .map_err(ForgeError::remote(Phase::Judging))?;
        let attempt = handle.retry_count() + 1;

        let verdict = if gate.accepts(score) {
            Verdict::Accepted(score)
        } else if handle.retry_count() < gate.max_retries {
            Verdict::QualityRejected(score)
        } else {
            if gate.max_retries > 0 {
                warn!(plan_id = item.id, score = score, "Retry budget spent, accepting image");
            }
            Verdict::Conceded(score)
        };

        let accepted = !matches!(verdict, Verdict::QualityRejected(_));
        obs::emit_quality_scored(handle.run_id(), item.id, score, attempt, accepted);
        handle.publish(RunEvent::QualityScored {
            plan_id: item.id,
            score,
            attempt,
            accepted,
        });
        Ok(verdict)
    }
}
