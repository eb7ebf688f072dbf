//! In-memory generation client (testing only)
//!
//! `ScriptedClient` satisfies the [`GenerationClient`] contract without any
//! network: it records every call, returns scripted scores and captions, and
//! can be told to fail a given operation on its n-th invocation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RemoteCallError, RemoteOperation};
use crate::options::AspectRatio;
use crate::payload::ImagePayload;
use crate::{GenerationClient, Result, SynthesisRequest};

/// Callback run at the start of every call, before latency and failures.
pub type CallHook = Arc<dyn Fn(RemoteOperation, usize) + Send + Sync>;

/// One observed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: RemoteOperation,
    /// Pose text, scene prompt or trigger label, depending on the operation.
    pub text: String,
    /// Reference labels in submission order (synthesize only).
    pub reference_labels: Vec<String>,
    /// Whether a sketch was attached (synthesize only).
    pub had_sketch: bool,
}

#[derive(Default)]
struct ScriptState {
    calls: Vec<RecordedCall>,
    per_operation: HashMap<RemoteOperation, u32>,
    fail_on: HashMap<RemoteOperation, u32>,
    scores: VecDeque<u8>,
    captions: VecDeque<String>,
    empty_synthesis: bool,
}

/// Deterministic generation client backed by a script.
#[derive(Default)]
pub struct ScriptedClient {
    state: Mutex<ScriptState>,
    hook: Mutex<Option<CallHook>>,
    latency: Option<Duration>,
    default_score: u8,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            default_score: 10,
            ..Self::default()
        }
    }

    /// Fail the `nth` (1-based) call of `operation`.
    pub fn fail_on(self, operation: RemoteOperation, nth: u32) -> Self {
        self.lock().fail_on.insert(operation, nth);
        self
    }

    /// Queue judge scores; once drained, every image scores `default_score`.
    pub fn with_scores(self, scores: impl IntoIterator<Item = u8>) -> Self {
        self.lock().scores.extend(scores);
        self
    }

    pub fn with_default_score(mut self, score: u8) -> Self {
        self.default_score = score;
        self
    }

    /// Queue caption replies; once drained, captions are synthesized from the trigger.
    pub fn with_captions<S: Into<String>>(self, captions: impl IntoIterator<Item = S>) -> Self {
        self.lock()
            .captions
            .extend(captions.into_iter().map(Into::into));
        self
    }

    /// Make every synthesize call succeed with zero images.
    pub fn with_empty_synthesis(self) -> Self {
        self.lock().empty_synthesis = true;
        self
    }

    /// Sleep this long inside every call (use with paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Install a hook that runs when a call starts.
    pub fn set_hook(&self, hook: CallHook) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn count_of(&self, operation: RemoteOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, run the hook, apply latency, then decide failure.
    async fn enter(&self, call: RecordedCall) -> Result<u32> {
        let operation = call.operation;
        let (nth, total, should_fail) = {
            let mut state = self.lock();
            state.calls.push(call);
            let counter = state.per_operation.entry(operation).or_insert(0);
            *counter += 1;
            let nth = *counter;
            let should_fail = state.fail_on.get(&operation) == Some(&nth);
            (nth, state.calls.len(), should_fail)
        };

        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(operation, total);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if should_fail {
            return Err(RemoteCallError::Scripted {
                operation,
                call: nth,
            });
        }
        Ok(nth)
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate_sketch(
        &self,
        pose_text: &str,
        _aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload> {
        let nth = self
            .enter(RecordedCall {
                operation: RemoteOperation::Sketch,
                text: pose_text.to_string(),
                reference_labels: Vec::new(),
                had_sketch: false,
            })
            .await?;
        Ok(ImagePayload::png(format!("sketch-{nth}").into_bytes()))
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<ImagePayload>> {
        let nth = self
            .enter(RecordedCall {
                operation: RemoteOperation::Synthesize,
                text: request.prompt.clone(),
                reference_labels: request.references.iter().map(|r| r.label.clone()).collect(),
                had_sketch: request.sketch.is_some(),
            })
            .await?;
        if self.lock().empty_synthesis {
            return Ok(Vec::new());
        }
        Ok(vec![
            ImagePayload::png(format!("image-{nth}").into_bytes()),
            ImagePayload::png(format!("image-{nth}-alt").into_bytes()),
        ])
    }

    async fn evaluate_quality(&self, _image: &ImagePayload) -> Result<u8> {
        self.enter(RecordedCall {
            operation: RemoteOperation::Evaluate,
            text: String::new(),
            reference_labels: Vec::new(),
            had_sketch: false,
        })
        .await?;
        Ok(self.lock().scores.pop_front().unwrap_or(self.default_score))
    }

    async fn caption(&self, _image: &ImagePayload, trigger_label: &str) -> Result<String> {
        let nth = self
            .enter(RecordedCall {
                operation: RemoteOperation::Caption,
                text: trigger_label.to_string(),
                reference_labels: Vec::new(),
                had_sketch: false,
            })
            .await?;
        Ok(self
            .lock()
            .captions
            .pop_front()
            .unwrap_or_else(|| format!("{trigger_label}, scripted caption {nth}")))
    }
}
