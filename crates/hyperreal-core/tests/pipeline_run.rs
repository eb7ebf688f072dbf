//! End-to-end runs of the supervisor against the scripted generation client.

use std::sync::{Arc, Weak};
use std::time::Duration;

use hyperreal_core::{
    ForgeError, ImagePayload, Phase, PlanCatalog, PlanItem, QualityGate, ReferenceSet,
    ReferenceSlot, RunConfig, RunEvent, RunSupervisor, StopReason, ValidationError,
};
use hyperreal_remote::fakes::ScriptedClient;
use hyperreal_remote::RemoteOperation;

fn shot(id: u32, shot_type: &str, description: &str) -> PlanItem {
    PlanItem {
        id,
        shot_type: shot_type.to_string(),
        expression: "Neutral".to_string(),
        lighting: "Soft window light".to_string(),
        outfit: "White linen shirt".to_string(),
        description: description.to_string(),
    }
}

fn plan(n: u32) -> PlanCatalog {
    PlanCatalog::new(
        (1..=n)
            .map(|id| shot(id, &format!("Lifestyle Shot {id}"), "Walking through a park"))
            .collect(),
    )
    .unwrap()
}

fn front_only() -> ReferenceSet {
    ReferenceSet::new().with(ReferenceSlot::Front, ImagePayload::png(b"img-a".to_vec()))
}

fn no_gate() -> RunConfig {
    RunConfig::default().with_quality_gate(None)
}

/// Stop the supervisor from inside the client when `op` starts.
fn stop_on(client: &ScriptedClient, sup: &Arc<RunSupervisor>, op: RemoteOperation) {
    let weak: Weak<RunSupervisor> = Arc::downgrade(sup);
    client.set_hook(Arc::new(move |called, _total| {
        if called == op {
            if let Some(sup) = weak.upgrade() {
                sup.stop();
            }
        }
    }));
}

#[tokio::test]
async fn single_shot_plan_runs_to_exhaustion() {
    let client = Arc::new(ScriptedClient::new());
    let plan = PlanCatalog::new(vec![shot(1, "Portrait", "front view portrait")]).unwrap();
    let sup = RunSupervisor::new(client.clone(), plan);

    sup.start(front_only(), "lola", no_gate()).unwrap();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.stop_reason, StopReason::PlanExhausted);
    assert_eq!(report.cursor, 1);
    assert_eq!(report.artifacts_created, 1);

    let artifacts = sup.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].source_plan_id, Some(1));

    let progress = sup.progress();
    assert_eq!(progress.cursor, 1);
    assert_eq!(progress.phase, Phase::Stopped);
    assert!(!progress.running);
}

#[tokio::test(start_paused = true)]
async fn synthesis_failure_on_second_shot_halts_run() {
    let client = Arc::new(ScriptedClient::new().fail_on(RemoteOperation::Synthesize, 2));
    let sup = RunSupervisor::new(client.clone(), plan(3));

    sup.start(front_only(), "lola", no_gate()).unwrap();
    let err = sup.wait().await.unwrap_err();

    assert!(matches!(err, ForgeError::Remote { phase: Phase::Generating, .. }));
    assert_eq!(sup.progress().cursor, 1);
    assert_eq!(sup.progress().phase, Phase::Stopped);
    assert_eq!(sup.artifacts().len(), 1);
    // No automatic retry of the failed call.
    assert_eq!(client.count_of(RemoteOperation::Synthesize), 2);
    assert_eq!(client.count_of(RemoteOperation::Caption), 1);
}

#[tokio::test]
async fn empty_caption_uses_local_fallback() {
    let client = Arc::new(ScriptedClient::new().with_captions([""]));
    let plan = PlanCatalog::new(vec![shot(7, "Coffee Shop Candid", "Holding a mug")]).unwrap();
    let sup = RunSupervisor::new(client, plan);

    sup.start(front_only(), "lola", no_gate()).unwrap();
    sup.wait().await.unwrap();

    let artifact = &sup.artifacts()[0];
    assert_eq!(
        artifact.caption,
        "lola, Coffee Shop Candid of a woman, Holding a mug, Neutral, White linen shirt, Soft window light"
    );
    assert!(!artifact.analyzing);
}

#[tokio::test]
async fn missing_front_reference_blocks_start() {
    let client = Arc::new(ScriptedClient::new());
    let sup = RunSupervisor::new(client.clone(), plan(2));
    let refs = ReferenceSet::new().with(ReferenceSlot::Side, ImagePayload::png(b"s".to_vec()));

    let err = sup.start(refs, "lola", no_gate()).unwrap_err();
    assert_eq!(err, ValidationError::MissingFrontReference);
    assert_eq!(sup.progress().phase, Phase::Idle);
    assert!(!sup.is_running());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_during_synthesis_freezes_call_count() {
    let client = Arc::new(ScriptedClient::new().with_latency(Duration::from_millis(500)));
    let sup = Arc::new(RunSupervisor::new(client.clone(), plan(5)));
    stop_on(&client, &sup, RemoteOperation::Synthesize);

    sup.start(front_only(), "lola", RunConfig::default()).unwrap();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.cursor, 0);
    // The in-flight synthesis finished but its image was discarded.
    assert!(sup.artifacts().is_empty());
    assert_eq!(sup.progress().phase, Phase::Stopped);

    let frozen = client.call_count();
    assert_eq!(frozen, 2);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.call_count(), frozen);
}

#[tokio::test(start_paused = true)]
async fn stop_during_sketch_skips_synthesis() {
    let client = Arc::new(ScriptedClient::new().with_latency(Duration::from_millis(500)));
    let sup = Arc::new(RunSupervisor::new(client.clone(), plan(5)));
    stop_on(&client, &sup, RemoteOperation::Sketch);

    sup.start(front_only(), "lola", RunConfig::default()).unwrap();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.cursor, 0);
    assert_eq!(report.artifacts_created, 0);
    assert!(sup.artifacts().is_empty());
    assert_eq!(sup.progress().phase, Phase::Stopped);

    assert_eq!(client.call_count(), 1);
    assert_eq!(client.count_of(RemoteOperation::Synthesize), 0);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_judging_discards_scored_image() {
    let client = Arc::new(ScriptedClient::new().with_latency(Duration::from_millis(500)));
    let sup = Arc::new(RunSupervisor::new(client.clone(), plan(5)));
    stop_on(&client, &sup, RemoteOperation::Evaluate);
    let config = RunConfig::default().with_quality_gate(Some(QualityGate::new(7, 2)));

    sup.start(front_only(), "lola", config).unwrap();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.cursor, 0);
    assert_eq!(report.artifacts_created, 0);
    assert!(sup.artifacts().is_empty());

    // sketch, synthesize, evaluate; no caption
    assert_eq!(client.call_count(), 3);
    assert_eq!(client.count_of(RemoteOperation::Caption), 0);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_during_cooldown_cuts_wait_short() {
    let client = Arc::new(ScriptedClient::new());
    let sup = RunSupervisor::new(client.clone(), plan(3));
    let mut events = sup.subscribe();
    let config = no_gate().with_cooldown(Duration::from_secs(600));

    let started = tokio::time::Instant::now();
    sup.start(front_only(), "lola", config).unwrap();
    loop {
        if let RunEvent::PhaseChanged {
            phase: Phase::Waiting,
            ..
        } = events.recv().await.unwrap()
        {
            break;
        }
    }
    sup.stop();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.cursor, 1);
    assert!(started.elapsed() < Duration::from_secs(600));
    assert_eq!(client.count_of(RemoteOperation::Sketch), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_separates_shots() {
    let client = Arc::new(ScriptedClient::new());
    let sup = RunSupervisor::new(client, plan(3));
    let config = no_gate().with_cooldown(Duration::from_secs(4));

    let started = tokio::time::Instant::now();
    sup.start(front_only(), "lola", config).unwrap();
    let report = sup.wait().await.unwrap().unwrap();

    assert_eq!(report.artifacts_created, 3);
    // Two cooldowns; none after the last shot.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(8), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(12), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn stopped_run_resumes_from_cursor() {
    let client = Arc::new(ScriptedClient::new());
    let sup = Arc::new(RunSupervisor::new(client.clone(), plan(3)));
    stop_on(&client, &sup, RemoteOperation::Caption);

    sup.start(front_only(), "lola", no_gate()).unwrap();
    let first = sup.wait().await.unwrap().unwrap();
    assert_eq!(first.stop_reason, StopReason::Cancelled);
    assert_eq!(first.cursor, 1);

    client.set_hook(Arc::new(|_, _| {}));
    sup.start(front_only(), "lola", no_gate()).unwrap();
    let second = sup.wait().await.unwrap().unwrap();
    assert_eq!(second.stop_reason, StopReason::PlanExhausted);
    assert_eq!(second.cursor, 3);
    assert_eq!(second.artifacts_created, 2);

    let sketches: Vec<String> = client
        .calls()
        .into_iter()
        .filter(|c| c.operation == RemoteOperation::Sketch)
        .map(|c| c.text)
        .collect();
    assert_eq!(sketches.len(), 3);
    assert!(sketches[1].starts_with("Lifestyle Shot 2,"));

    let plan_ids: Vec<_> = sup
        .artifacts()
        .into_iter()
        .map(|a| a.source_plan_id)
        .collect();
    assert_eq!(plan_ids, vec![Some(3), Some(2), Some(1)]);
}

#[tokio::test(start_paused = true)]
async fn quality_retry_regenerates_from_same_sketch() {
    let client = Arc::new(ScriptedClient::new().with_scores([3, 8]));
    let plan = PlanCatalog::new(vec![shot(1, "Portrait", "Studio backdrop")]).unwrap();
    let sup = RunSupervisor::new(client.clone(), plan);
    let config = RunConfig::default().with_quality_gate(Some(QualityGate::new(7, 1)));

    sup.start(front_only(), "lola", config).unwrap();
    sup.wait().await.unwrap();

    assert_eq!(client.count_of(RemoteOperation::Sketch), 1);
    assert_eq!(client.count_of(RemoteOperation::Synthesize), 2);
    let artifact = &sup.artifacts()[0];
    assert_eq!(artifact.quality_score, Some(8));
    assert_eq!(artifact.image.bytes(), b"image-2");
}

#[tokio::test(start_paused = true)]
async fn observed_cursor_is_monotonic_and_bounded() {
    let client = Arc::new(ScriptedClient::new());
    let sup = RunSupervisor::new(client, plan(4));
    let mut events = sup.subscribe();

    sup.start(front_only(), "lola", no_gate()).unwrap();
    sup.wait().await.unwrap();

    let mut last = 0;
    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::PhaseChanged { phase, cursor } = event {
            assert!(cursor >= last);
            assert!(cursor <= 4);
            last = cursor;
            phases.push(phase);
        }
    }
    assert_eq!(last, 4);
    assert_eq!(phases.first(), Some(&Phase::Sketching));
    assert_eq!(phases.last(), Some(&Phase::Stopped));
    assert!(!phases.contains(&Phase::Judging));
}

#[tokio::test]
async fn events_report_failure_with_phase() {
    let client = Arc::new(ScriptedClient::new().fail_on(RemoteOperation::Sketch, 1));
    let sup = RunSupervisor::new(client, plan(2));
    let mut events = sup.subscribe();

    sup.start(front_only(), "lola", no_gate()).unwrap();
    assert!(sup.wait().await.is_err());

    let mut saw_failed = false;
    let mut saw_stopped = false;
    while let Ok(event) = events.try_recv() {
        match event {
            RunEvent::Failed { phase, .. } => {
                assert_eq!(phase, Some(Phase::Sketching));
                saw_failed = true;
            }
            RunEvent::Stopped { reason } => {
                assert_eq!(reason, StopReason::Failed);
                saw_stopped = true;
            }
            _ => {}
        }
    }
    assert!(saw_failed && saw_stopped);
    assert_eq!(sup.progress().cursor, 0);
}
