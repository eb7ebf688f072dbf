//! Run Supervisor: start/stop semantics, cooldown, and progress for observers.
//!
//! At most one run is active per supervisor. The plan cursor outlives
//! individual runs, so a stopped or failed run resumes where it left off.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hyperreal_remote::{GenerationClient, GenerationOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::config::RunConfig;
use crate::controller::{self, PipelineController, ShotOutcome};
use crate::error::{Result, ValidationError};
use crate::events::{RunEvent, StopReason};
use crate::freeform;
use crate::obs;
use crate::plan::PlanCatalog;
use crate::reference::ReferenceSet;
use crate::state::{Phase, PipelineRunState, Progress, RunHandle};

const EVENT_CAPACITY: usize = 256;

/// Outcome of [`RunSupervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { run_id: String },
    /// A run is already in progress; nothing was started.
    AlreadyActive,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub stop_reason: StopReason,
    pub cursor: usize,
    pub artifacts_created: usize,
}

#[derive(Default)]
struct Inner {
    current: Option<RunHandle>,
    task: Option<JoinHandle<Result<RunReport>>>,
}

/// Owns the single active run of a plan.
pub struct RunSupervisor {
    client: Arc<dyn GenerationClient>,
    plan: PlanCatalog,
    store: ArtifactStore,
    progress: Arc<watch::Sender<Progress>>,
    events: broadcast::Sender<RunEvent>,
    inner: Mutex<Inner>,
}

impl RunSupervisor {
    pub fn new(client: Arc<dyn GenerationClient>, plan: PlanCatalog) -> Self {
        let (progress, _) = watch::channel(Progress {
            plan_len: plan.len(),
            ..Progress::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            plan,
            store: ArtifactStore::new(),
            progress: Arc::new(progress),
            events,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run at the current cursor.
    ///
    /// Must be called from within a tokio runtime. Validation failures leave
    /// the supervisor untouched.
    pub fn start(
        &self,
        references: ReferenceSet,
        trigger: impl Into<String>,
        config: RunConfig,
    ) -> std::result::Result<StartOutcome, ValidationError> {
        let mut inner = self.inner();
        if inner.current.as_ref().is_some_and(RunHandle::is_running) {
            debug!("Start ignored, a run is already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        let cursor = self.progress.borrow().cursor;
        controller::validate_start(&references, &self.plan, cursor)?;

        let trigger = trigger.into();
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        let handle = RunHandle::new(
            run_id.clone(),
            cursor,
            self.plan.len(),
            self.progress.clone(),
            self.events.clone(),
        );
        obs::emit_run_started(&run_id, cursor, self.plan.len(), &trigger);

        let cooldown = config.cooldown;
        let controller = PipelineController::new(
            self.client.clone(),
            self.plan.clone(),
            references,
            trigger,
            config,
            self.store.clone(),
        );
        let task = tokio::spawn(
            drive(controller, handle.clone(), cooldown).instrument(obs::run_span(&run_id)),
        );

        inner.current = Some(handle);
        inner.task = Some(task);
        Ok(StartOutcome::Started { run_id })
    }

    /// Request cancellation. Synchronous; takes effect at the next checkpoint
    /// and cuts a pending cooldown short.
    pub fn stop(&self) {
        if let Some(handle) = self.inner().current.as_ref() {
            handle.request_stop();
        }
    }

    /// Await the active run. `Ok(None)` when there is nothing to wait for.
    pub async fn wait(&self) -> Result<Option<RunReport>> {
        let task = self.inner().task.take();
        match task {
            Some(task) => Ok(Some(task.await??)),
            None => Ok(None),
        }
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    pub fn watch_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner()
            .current
            .as_ref()
            .is_some_and(RunHandle::is_running)
    }

    /// State of the active run, if one is running.
    pub fn run_state(&self) -> Option<PipelineRunState> {
        self.inner()
            .current
            .as_ref()
            .filter(|h| h.is_running())
            .map(RunHandle::snapshot)
    }

    /// Reposition the cursor while no run is active.
    pub fn seek(&self, index: usize) -> std::result::Result<(), ValidationError> {
        if self.is_running() {
            return Err(ValidationError::RunActive);
        }
        if index > self.plan.len() {
            return Err(ValidationError::CursorOutOfRange {
                index,
                len: self.plan.len(),
            });
        }
        self.progress.send_modify(|p| {
            p.cursor = index;
            p.retry_count = 0;
        });
        Ok(())
    }

    pub fn plan(&self) -> &PlanCatalog {
        &self.plan
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Artifacts generated so far, newest first.
    pub fn artifacts(&self) -> Vec<GeneratedArtifact> {
        self.store.snapshot()
    }

    /// One free-form image into this supervisor's store. Refused while a run
    /// is active.
    pub async fn generate_single(
        &self,
        references: &ReferenceSet,
        prompt: &str,
        trigger: &str,
        options: GenerationOptions,
    ) -> Result<GeneratedArtifact> {
        if self.is_running() {
            return Err(ValidationError::RunActive.into());
        }
        freeform::generate_single(
            self.client.as_ref(),
            &self.store,
            references,
            prompt,
            trigger,
            options,
        )
        .await
    }
}

impl Drop for RunSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run shots until the plan is exhausted, cancellation is observed, or a
/// remote call fails.
async fn drive(
    controller: PipelineController,
    handle: RunHandle,
    cooldown: std::time::Duration,
) -> Result<RunReport> {
    let mut created = 0usize;
    let outcome: Result<StopReason> = async {
        loop {
            match controller.run_shot(&handle).await? {
                ShotOutcome::Cancelled => return Ok(StopReason::Cancelled),
                ShotOutcome::Completed { .. } => created += 1,
            }

            handle.enter(Phase::Waiting);
            if handle.is_plan_exhausted() {
                return Ok(StopReason::PlanExhausted);
            }
            if handle.should_stop_before(Phase::Sketching) {
                return Ok(StopReason::Cancelled);
            }
            debug!(cooldown_ms = cooldown.as_millis() as u64, "Cooling down");
            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {}
                _ = handle.cancelled() => return Ok(StopReason::Cancelled),
            }
        }
    }
    .await;

    handle.enter(Phase::Stopped);
    let cursor = handle.cursor();
    let result = match outcome {
        Ok(reason) => {
            info!(reason = %reason, cursor = cursor, "Run stopped");
            obs::emit_run_stopped(handle.run_id(), reason.to_string().as_str(), cursor, created);
            handle.publish(RunEvent::Stopped { reason });
            Ok(RunReport {
                run_id: handle.run_id().to_string(),
                stop_reason: reason,
                cursor,
                artifacts_created: created,
            })
        }
        Err(e) => {
            obs::emit_run_failed(handle.run_id(), e.failed_phase(), &e);
            handle.publish(RunEvent::Failed {
                phase: e.failed_phase(),
                message: e.to_string(),
            });
            handle.publish(RunEvent::Stopped {
                reason: StopReason::Failed,
            });
            Err(e)
        }
    };
    handle.finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanItem;
    use crate::reference::ReferenceSlot;
    use hyperreal_remote::fakes::ScriptedClient;
    use hyperreal_remote::ImagePayload;

    fn plan(n: u32) -> PlanCatalog {
        PlanCatalog::new(
            (1..=n)
                .map(|id| PlanItem {
                    id,
                    shot_type: "Classic Portrait".to_string(),
                    expression: "Neutral".to_string(),
                    lighting: "Window light".to_string(),
                    outfit: "Denim jacket".to_string(),
                    description: format!("Shot number {id}"),
                })
                .collect(),
        )
        .unwrap()
    }

    fn refs() -> ReferenceSet {
        ReferenceSet::new().with(ReferenceSlot::Front, ImagePayload::png(b"front".to_vec()))
    }

    fn fast() -> RunConfig {
        RunConfig::default()
            .with_quality_gate(None)
            .with_cooldown(std::time::Duration::from_secs(4))
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let sup = RunSupervisor::new(Arc::new(ScriptedClient::new()), plan(2));
        assert!(matches!(
            sup.start(refs(), "lola", fast()).unwrap(),
            StartOutcome::Started { .. }
        ));
        assert_eq!(
            sup.start(refs(), "lola", fast()).unwrap(),
            StartOutcome::AlreadyActive
        );
        let report = sup.wait().await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::PlanExhausted);
        assert_eq!(report.artifacts_created, 2);
    }

    #[tokio::test]
    async fn test_missing_front_creates_no_run() {
        let sup = RunSupervisor::new(Arc::new(ScriptedClient::new()), plan(1));
        let err = sup
            .start(ReferenceSet::new(), "lola", fast())
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingFrontReference);
        assert_eq!(sup.progress().phase, Phase::Idle);
        assert!(sup.wait().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seek_bounds_and_exhausted_start() {
        let sup = RunSupervisor::new(Arc::new(ScriptedClient::new()), plan(3));
        assert_eq!(
            sup.seek(4),
            Err(ValidationError::CursorOutOfRange { index: 4, len: 3 })
        );
        sup.seek(3).unwrap();
        assert_eq!(
            sup.start(refs(), "lola", fast()).unwrap_err(),
            ValidationError::PlanExhausted { cursor: 3, len: 3 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_rejected_while_running() {
        let client = ScriptedClient::new().with_latency(std::time::Duration::from_secs(1));
        let sup = RunSupervisor::new(Arc::new(client), plan(2));
        sup.start(refs(), "lola", fast()).unwrap();
        assert_eq!(sup.seek(0), Err(ValidationError::RunActive));
        sup.stop();
        sup.wait().await.unwrap();
        assert!(sup.seek(0).is_ok());
    }
}
