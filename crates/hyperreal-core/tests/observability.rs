//! Observability tests for run lifecycle tracing.
//!
//! These tests verify that structured tracing events are emitted for the key
//! lifecycle events: run start, phase changes, quality verdicts, completed
//! shots, degraded captions, stop and failure.

use std::sync::Arc;

use hyperreal_core::{
    emit_caption_degraded, emit_phase_entered, emit_quality_scored, emit_run_failed,
    emit_run_started, emit_run_stopped, emit_shot_completed, ImagePayload, Phase, PlanCatalog,
    PlanItem, ReferenceSet, ReferenceSlot, RunConfig, RunSpan, RunSupervisor,
};
use hyperreal_remote::fakes::ScriptedClient;
use hyperreal_remote::RemoteOperation;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_cursor_and_trigger() {
    emit_run_started("run-123", 0, 50, "lola");
    assert!(logs_contain("run.started"));
    assert!(logs_contain("plan_len=50"));
}

#[traced_test]
#[test]
fn test_emit_phase_entered_logs_lowercase_phase() {
    emit_phase_entered("run-456", Phase::Captioning, 3);
    assert!(logs_contain("phase=captioning"));
}

#[traced_test]
#[test]
fn test_emit_quality_scored_logs_verdict() {
    emit_quality_scored("run-789", 12, 5, 1, false);
    assert!(logs_contain("quality.scored"));
    assert!(logs_contain("accepted=false"));
}

#[traced_test]
#[test]
fn test_emit_shot_completed_logs_artifact() {
    emit_shot_completed("run-789", 12, "art-000004", 4);
    assert!(logs_contain("art-000004"));
}

#[traced_test]
#[test]
fn test_emit_caption_degraded_logs_warning() {
    emit_caption_degraded("art-000001", &"empty caption");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("caption.degraded"));
}

#[traced_test]
#[test]
fn test_emit_run_stopped_and_failed() {
    emit_run_stopped("run-1", "cancelled", 2, 2);
    emit_run_failed("run-2", Some(Phase::Judging), &"quota exceeded");
    emit_run_failed("run-3", None, &"join error");
    assert!(logs_contain("run.stopped"));
    assert!(logs_contain("phase=judging"));
    assert!(logs_contain("phase=none"));
}

#[traced_test]
#[test]
fn test_run_span_enter_tags_events() {
    let span = RunSpan::enter("test-span-run");
    tracing::info!("inside run");
    drop(span);
    assert!(logs_contain("test-span-run"));
}

#[traced_test]
#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let client = Arc::new(ScriptedClient::new().fail_on(RemoteOperation::Caption, 1));
    let plan = PlanCatalog::new(vec![PlanItem {
        id: 1,
        shot_type: "Classic Portrait".to_string(),
        expression: "Intense".to_string(),
        lighting: "Rembrandt".to_string(),
        outfit: "Black turtleneck".to_string(),
        description: "Simple textured background".to_string(),
    }])
    .unwrap();
    let sup = RunSupervisor::new(client, plan);
    let refs = ReferenceSet::new().with(ReferenceSlot::Front, ImagePayload::png(b"f".to_vec()));

    sup.start(refs, "lola", RunConfig::default().with_quality_gate(None))
        .unwrap();
    sup.wait().await.unwrap();

    assert!(logs_contain("run.started"));
    assert!(logs_contain("phase=sketching"));
    assert!(logs_contain("caption.degraded"));
    assert!(logs_contain("shot.completed"));
    assert!(logs_contain("reason=plan_exhausted"));
}
