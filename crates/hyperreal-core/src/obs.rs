//! Structured observability hooks for run lifecycle events.
//!
//! This module provides:
//! - A run-scoped span via [`run_span`], attached to the run task with
//!   `tracing::Instrument`
//! - A [`RunSpan`] RAII guard for synchronous sections
//! - Emission functions for key lifecycle events: start, phase change,
//!   quality verdict, completed shot, degraded caption, stop and failure
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use tracing::{info, warn};

use crate::state::Phase;

/// Span tagging every event of one run with its `run_id`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("hyperreal.run", run_id = %run_id)
}

/// RAII guard that enters a run-scoped span until dropped.
///
/// Not `Send`; use [`run_span`] with `Instrument` across `.await`.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Emit event: run started at `cursor` of a `plan_len`-shot plan.
pub fn emit_run_started(run_id: &str, cursor: usize, plan_len: usize, trigger: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        cursor = cursor,
        plan_len = plan_len,
        trigger = %trigger,
    );
}

/// Emit event: the run moved to `phase`.
pub fn emit_phase_entered(run_id: &str, phase: Phase, cursor: usize) {
    info!(event = "run.phase", run_id = %run_id, phase = %phase, cursor = cursor);
}

/// Emit event: judge verdict for one attempt at a shot.
pub fn emit_quality_scored(run_id: &str, plan_id: u32, score: u8, attempt: u32, accepted: bool) {
    info!(
        event = "quality.scored",
        run_id = %run_id,
        plan_id = plan_id,
        score = score,
        attempt = attempt,
        accepted = accepted,
    );
}

/// Emit event: a shot finished captioning and the cursor advanced.
pub fn emit_shot_completed(run_id: &str, plan_id: u32, artifact_id: &str, cursor: usize) {
    info!(
        event = "shot.completed",
        run_id = %run_id,
        plan_id = plan_id,
        artifact_id = %artifact_id,
        cursor = cursor,
    );
}

/// Emit event: captioning gave nothing usable; the fallback caption was used (warning level).
pub fn emit_caption_degraded(artifact_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "caption.degraded", artifact_id = %artifact_id, reason = %reason);
}

/// Emit event: run stopped.
pub fn emit_run_stopped(run_id: &str, reason: &str, cursor: usize, artifacts: usize) {
    info!(
        event = "run.stopped",
        run_id = %run_id,
        reason = %reason,
        cursor = cursor,
        artifacts = artifacts,
    );
}

/// Emit event: run halted by an error (warning level).
pub fn emit_run_failed(run_id: &str, phase: Option<Phase>, error: &dyn std::fmt::Display) {
    let phase = phase.map(|p| p.as_str()).unwrap_or("none");
    warn!(event = "run.failed", run_id = %run_id, phase = %phase, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
