//! Generated artifacts and the most-recent-first artifact store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hyperreal_remote::ImagePayload;

/// Caption shown while the captioner is still working.
pub const PLACEHOLDER_CAPTION: &str = "Generating caption...";

/// One generated image with its training caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub id: String,
    pub image: ImagePayload,
    pub prompt: String,
    pub caption: String,
    pub quality_score: Option<u8>,
    pub source_plan_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    /// True until the caption has been resolved.
    pub analyzing: bool,
}

/// Shared artifact collection.
///
/// New artifacts go to the head; captions are updated in place by id.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    items: Arc<RwLock<VecDeque<GeneratedArtifact>>>,
    next_id: Arc<AtomicU64>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an artifact with the placeholder caption and insert it at the head.
    pub fn create(
        &self,
        image: ImagePayload,
        prompt: impl Into<String>,
        quality_score: Option<u8>,
        source_plan_id: Option<u32>,
    ) -> GeneratedArtifact {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let artifact = GeneratedArtifact {
            id: format!("art-{seq:06}"),
            image,
            prompt: prompt.into(),
            caption: PLACEHOLDER_CAPTION.to_string(),
            quality_score,
            source_plan_id,
            created_at: Utc::now(),
            analyzing: true,
        };
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(artifact.clone());
        artifact
    }

    /// Set the final caption of artifact `id`. Returns false if it is gone.
    pub fn update_caption(&self, id: &str, caption: impl Into<String>) -> bool {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        match items.iter_mut().find(|a| a.id == id) {
            Some(artifact) => {
                artifact.caption = caption.into();
                artifact.analyzing = false;
                true
            }
            None => false,
        }
    }

    /// Remove artifact `id`, returning it.
    pub fn remove(&self, id: &str) -> Option<GeneratedArtifact> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let index = items.iter().position(|a| a.id == id)?;
        items.remove(index)
    }

    pub fn get(&self, id: &str) -> Option<GeneratedArtifact> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// All artifacts, newest first.
    pub fn snapshot(&self) -> Vec<GeneratedArtifact> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// All artifacts, oldest first.
    pub fn in_generation_order(&self) -> Vec<GeneratedArtifact> {
        let mut all = self.snapshot();
        all.reverse();
        all
    }

    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
