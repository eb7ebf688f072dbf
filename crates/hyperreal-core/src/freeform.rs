//! Free-form single image generation from a user prompt.

use hyperreal_remote::{GenerationClient, GenerationOptions, SynthesisRequest};
use tracing::info;

use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::controller::{caption_artifact, resolve_references, synthesize_first};
use crate::error::{Result, ValidationError};
use crate::reference::ReferenceSet;

/// Generate one captioned artifact for `prompt` without a sketch.
///
/// References are selected with the prompt as scene text. The caption falls
/// back to the prompt itself. The artifact has no plan id and no score.
pub async fn generate_single(
    client: &dyn GenerationClient,
    store: &ArtifactStore,
    references: &ReferenceSet,
    prompt: &str,
    trigger: &str,
    options: GenerationOptions,
) -> Result<GeneratedArtifact> {
    if !references.has_front() {
        return Err(ValidationError::MissingFrontReference.into());
    }
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ValidationError::EmptyPrompt.into());
    }

    let (selection, resolved) = resolve_references(references, prompt).await?;
    let request = SynthesisRequest {
        prompt: prompt.to_string(),
        sketch: None,
        references: resolved,
        identity_focus: selection.identity_focus(),
        options,
    };
    let image = synthesize_first(client, &request).await?;

    let artifact = store.create(image, prompt, None, None);
    let caption = caption_artifact(client, store, &artifact, trigger, prompt.to_string()).await;
    info!(artifact_id = %artifact.id, degraded = caption.is_degraded(), "Single image generated");

    Ok(store.get(&artifact.id).unwrap_or(GeneratedArtifact {
        caption: caption.text().to_string(),
        analyzing: false,
        ..artifact
    }))
}
