//! Live run state shared between the supervisor and the controller.
//!
//! A [`RunHandle`] is the single source of truth for one run: its phase,
//! plan cursor, retry counter, last sketch and cancellation flag. The flag is
//! an atomic so `stop()` takes effect from any thread without awaiting, and a
//! `Notify` wakes a pending cooldown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hyperreal_remote::ImagePayload;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Notify};
use tracing::debug;

use crate::events::RunEvent;
use crate::obs;

/// Pipeline phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Sketching,
    Generating,
    Judging,
    Captioning,
    Waiting,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Sketching => "sketching",
            Phase::Generating => "generating",
            Phase::Judging => "judging",
            Phase::Captioning => "captioning",
            Phase::Waiting => "waiting",
            Phase::Stopped => "stopped",
        }
    }

    /// Phases that are followed by a remote call.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Phase::Sketching | Phase::Generating | Phase::Judging | Phase::Captioning
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable progress snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub cursor: usize,
    pub phase: Phase,
    pub retry_count: u32,
    pub plan_len: usize,
    pub running: bool,
}

/// Point-in-time copy of a run's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRunState {
    pub phase: Phase,
    pub plan_cursor: usize,
    pub retry_count: u32,
    pub cancel_requested: bool,
    pub last_sketch: Option<ImagePayload>,
}

#[derive(Debug)]
struct Fields {
    phase: Phase,
    plan_cursor: usize,
    retry_count: u32,
    last_sketch: Option<ImagePayload>,
}

struct Shared {
    run_id: String,
    plan_len: usize,
    cancel: AtomicBool,
    running: AtomicBool,
    wake: Notify,
    fields: Mutex<Fields>,
    progress: Arc<watch::Sender<Progress>>,
    events: broadcast::Sender<RunEvent>,
}

/// Cheaply cloneable handle on one run's state.
#[derive(Clone)]
pub struct RunHandle {
    shared: Arc<Shared>,
}

impl RunHandle {
    pub fn new(
        run_id: impl Into<String>,
        start_cursor: usize,
        plan_len: usize,
        progress: Arc<watch::Sender<Progress>>,
        events: broadcast::Sender<RunEvent>,
    ) -> Self {
        let handle = Self {
            shared: Arc::new(Shared {
                run_id: run_id.into(),
                plan_len,
                cancel: AtomicBool::new(false),
                running: AtomicBool::new(true),
                wake: Notify::new(),
                fields: Mutex::new(Fields {
                    phase: Phase::Idle,
                    plan_cursor: start_cursor.min(plan_len),
                    retry_count: 0,
                    last_sketch: None,
                }),
                progress,
                events,
            }),
        };
        handle.publish_progress();
        handle
    }

    /// Handle with private channels, for driving a controller directly.
    pub fn detached(run_id: impl Into<String>, start_cursor: usize, plan_len: usize) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        let (events, _) = broadcast::channel(16);
        Self::new(run_id, start_cursor, plan_len, Arc::new(progress), events)
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub fn plan_len(&self) -> usize {
        self.shared.plan_len
    }

    fn fields(&self) -> MutexGuard<'_, Fields> {
        self.shared
            .fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the cancellation flag and wake any pending cooldown.
    pub fn request_stop(&self) {
        if !self.shared.cancel.swap(true, Ordering::SeqCst) {
            debug!(run_id = %self.shared.run_id, "Stop requested");
        }
        self.shared.wake.notify_one();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }

    /// Checkpoint before entering `next`: true when the run must stop instead.
    pub fn should_stop_before(&self, next: Phase) -> bool {
        let stop = self.is_cancel_requested();
        if stop {
            debug!(run_id = %self.shared.run_id, next = %next, "Cancellation observed at checkpoint");
        }
        stop
    }

    /// Resolves once `request_stop` has been called.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancel_requested() {
                return;
            }
            self.shared.wake.notified().await;
        }
    }

    pub fn phase(&self) -> Phase {
        self.fields().phase
    }

    /// Transition to `phase` and notify observers.
    pub fn enter(&self, phase: Phase) {
        let cursor = {
            let mut fields = self.fields();
            fields.phase = phase;
            fields.plan_cursor
        };
        obs::emit_phase_entered(&self.shared.run_id, phase, cursor);
        self.publish_progress();
        self.publish(RunEvent::PhaseChanged { phase, cursor });
    }

    pub fn cursor(&self) -> usize {
        self.fields().plan_cursor
    }

    /// Advance the cursor by one, never past the plan length.
    pub fn advance_cursor(&self) -> usize {
        let cursor = {
            let mut fields = self.fields();
            fields.plan_cursor = (fields.plan_cursor + 1).min(self.shared.plan_len);
            fields.plan_cursor
        };
        self.publish_progress();
        cursor
    }

    pub fn is_plan_exhausted(&self) -> bool {
        self.cursor() >= self.shared.plan_len
    }

    pub fn retry_count(&self) -> u32 {
        self.fields().retry_count
    }

    pub fn record_retry(&self) -> u32 {
        let retries = {
            let mut fields = self.fields();
            fields.retry_count += 1;
            fields.retry_count
        };
        self.publish_progress();
        retries
    }

    pub fn reset_retries(&self) {
        self.fields().retry_count = 0;
        self.publish_progress();
    }

    pub fn set_last_sketch(&self, sketch: Option<ImagePayload>) {
        self.fields().last_sketch = sketch;
    }

    pub fn last_sketch(&self) -> Option<ImagePayload> {
        self.fields().last_sketch.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Mark the run finished; the last sketch is dropped with it.
    pub fn finish(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.fields().last_sketch = None;
        self.publish_progress();
    }

    pub fn snapshot(&self) -> PipelineRunState {
        let fields = self.fields();
        PipelineRunState {
            phase: fields.phase,
            plan_cursor: fields.plan_cursor,
            retry_count: fields.retry_count,
            cancel_requested: self.is_cancel_requested(),
            last_sketch: fields.last_sketch.clone(),
        }
    }

    pub fn progress(&self) -> Progress {
        let fields = self.fields();
        Progress {
            cursor: fields.plan_cursor,
            phase: fields.phase,
            retry_count: fields.retry_count,
            plan_len: self.shared.plan_len,
            running: self.is_running(),
        }
    }

    /// Broadcast to subscribers; having none is fine.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.shared.events.send(event);
    }

    fn publish_progress(&self) {
        let progress = self.progress();
        self.shared.progress.send_replace(progress);
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.shared.run_id)
            .field("progress", &self.progress())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}
