//! Structured observability hooks for lifecycle and repair-session events.
//!
//! This module provides:
//! - A session-scoped tracing span (`session_span`)
//! - Emission functions for transitions, validations and session progress
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG` and switch to
//! JSON output with `--json` (see [`crate::telemetry::init_tracing`]).

use mmla_state::NodeState;
use tracing::{info, warn};

/// Span carrying `session_id` and `node_id` for one repair session.
/// Attach it with [`tracing::Instrument`] so it follows the session across
/// await points.
pub fn session_span(session_id: &str, node_id: &str) -> tracing::Span {
    tracing::info_span!("mmla.session", session_id = %session_id, node_id = %node_id)
}

/// Emit event: a status change was persisted.
pub fn emit_transition(node_id: &str, from: NodeState, to: NodeState, revision: u64) {
    info!(
        event = "lifecycle.transition",
        node_id = %node_id,
        from = %from,
        to = %to,
        revision = revision,
    );
}

/// Emit event: a transition was refused (illegal pair or unmet dependency).
pub fn emit_blocked(node_id: &str, from: NodeState, to: NodeState, reason: &str) {
    info!(
        event = "lifecycle.blocked",
        node_id = %node_id,
        from = %from,
        to = %to,
        reason = %reason,
    );
}

/// Emit event: a sample finished validation.
pub fn emit_validation_completed(node_id: &str, quality_score: u8, passed_layers: usize) {
    info!(
        event = "validation.completed",
        node_id = %node_id,
        quality_score = quality_score,
        passed_layers = passed_layers,
    );
}

/// Emit event: repair session started.
pub fn emit_session_started(node_id: &str, max_retries: u32) {
    info!(event = "session.started", node_id = %node_id, max_retries = max_retries);
}

/// Emit event: one attempt of a repair session finished validation.
pub fn emit_session_attempt(attempt: u32, quality_score: u8, passed: bool) {
    info!(
        event = "session.attempt",
        attempt = attempt,
        quality_score = quality_score,
        passed = passed,
    );
}

/// Emit event: repair session finished.
pub fn emit_session_finished(outcome: &str, total_attempts: u32, duration_ms: u64) {
    info!(
        event = "session.finished",
        outcome = %outcome,
        total_attempts = total_attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: the code fixer failed or timed out (warning level).
pub fn emit_fixer_failed(attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "session.fixer_failed", attempt = attempt, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_emit_inside_session_span() {
        let span = session_span("s-1", "leaf_login");
        let _guard = span.enter();
        emit_session_attempt(1, 94, false);
        emit_fixer_failed(1, &"timed out");
    }
}
