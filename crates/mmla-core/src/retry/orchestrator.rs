//! The bounded validate -> repair loop for one leaf.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use mmla_state::{AuditEntry, AuditTrail, LeafSpec, NodeState};

use crate::fixer::{CodeFixer, FixerError, RepairRequest};
use crate::lifecycle::StateMachine;
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::session::{
    AttemptRecord, RetrySessionResult, SessionOutcome, SessionProgress, SessionStage,
};
use crate::validator::{SampleValidator, ValidationReport};

/// Used when the caller does not configure a fixer timeout.
pub const DEFAULT_FIXER_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives repair sessions. Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct RetryOrchestrator {
    machine: StateMachine,
    validator: Arc<dyn SampleValidator>,
    fixer: Arc<dyn CodeFixer>,
    fixer_timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
    progress: Option<mpsc::Sender<SessionProgress>>,
    audit: Option<Arc<dyn AuditTrail>>,
}

impl RetryOrchestrator {
    pub fn new(
        machine: StateMachine,
        validator: Arc<dyn SampleValidator>,
        fixer: Arc<dyn CodeFixer>,
    ) -> Self {
        Self {
            machine,
            validator,
            fixer,
            fixer_timeout: DEFAULT_FIXER_TIMEOUT,
            cancel: None,
            progress: None,
            audit: None,
        }
    }

    pub fn with_fixer_timeout(mut self, timeout: Duration) -> Self {
        self.fixer_timeout = timeout;
        self
    }

    /// Stop at the next attempt boundary once `true` is sent.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Progress is sent with `try_send`; a full or closed channel drops
    /// the event rather than stalling the session.
    pub fn with_progress(mut self, progress: mpsc::Sender<SessionProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Record every failed attempt.
    pub fn with_audit_trail(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Validate `code` for `node_id`, repairing up to `max_retries` times.
    ///
    /// The node must be able to enter `VALIDATING`; otherwise the result is
    /// `PreconditionFailed` with no attempts. A pass commits `IMPLEMENTED`.
    /// Exhaustion or cancellation commits `CODING`. Fixer failures never end
    /// the session: the code is kept and the error lands in the attempt's
    /// `fixer_error`.
    pub async fn run_retry_session(
        &self,
        code: impl Into<String>,
        node_id: &str,
        spec: &LeafSpec,
        max_retries: u32,
    ) -> RetrySessionResult {
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            code: code.into(),
            history: Vec::new(),
        };
        let span = obs::session_span(&session.session_id, node_id);
        self.drive(session, spec, max_retries).instrument(span).await
    }

    async fn drive(
        &self,
        mut session: Session,
        spec: &LeafSpec,
        max_retries: u32,
    ) -> RetrySessionResult {
        let node_id = session.node_id.clone();
        let node_id = node_id.as_str();
        let started = Instant::now();
        obs::emit_session_started(node_id, max_retries);

        if let Err(reason) = self.enter_validating(node_id).await {
            warn!(%reason, "repair session precondition failed");
            return self.finish(session, SessionOutcome::PreconditionFailed { reason }, started);
        }

        for attempt in 1..=max_retries {
            if self.is_cancelled() {
                debug!(attempt, "cancellation observed at attempt boundary");
                self.commit(node_id, NodeState::Coding).await;
                return self.finish(session, SessionOutcome::Cancelled, started);
            }

            self.notify(attempt, max_retries, SessionStage::Validating, "validating sample");
            let report = self.validator.validate(&session.code, node_id, spec);
            METRICS.inc_repair_attempts();
            obs::emit_session_attempt(attempt, report.quality_score, report.passed);

            let mut record = AttemptRecord {
                attempt_number: attempt,
                quality_score: report.quality_score,
                passed: report.passed,
                failed_layer_summaries: report.suggestions.clone(),
                fixer_error: None,
            };

            if report.passed {
                session.history.push(record);
                self.commit(node_id, NodeState::Implemented).await;
                return self.finish(session, SessionOutcome::Passed, started);
            }

            self.audit_failure(&session, attempt, &report).await;

            self.notify(
                attempt,
                max_retries,
                SessionStage::Repairing,
                &format!("repairing {} failing layer(s)", report.layers.len() - report.passed_layers),
            );
            let request = RepairRequest::new(
                node_id,
                attempt,
                session.code.clone(),
                report.suggestions.clone(),
                spec.clone(),
            );
            match self.repair(request).await {
                Ok(revised) => session.code = revised,
                Err(e) => {
                    METRICS.inc_fixer_failures();
                    obs::emit_fixer_failed(attempt, &e);
                    record.fixer_error = Some(e.to_string());
                }
            }
            session.history.push(record);
        }

        self.commit(node_id, NodeState::Coding).await;
        self.finish(session, SessionOutcome::Exhausted, started)
    }

    async fn enter_validating(&self, node_id: &str) -> Result<(), String> {
        match self.machine.transition(node_id, NodeState::Validating).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let current = self
                    .machine
                    .get_status(node_id)
                    .await
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "an unknown state".to_string());
                Err(format!(
                    "'{node_id}' cannot move to {} from {current}",
                    NodeState::Validating
                ))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn repair(&self, request: RepairRequest) -> Result<String, FixerError> {
        match tokio::time::timeout(self.fixer_timeout, self.fixer.fix(request)).await {
            Ok(result) => result,
            Err(_) => Err(FixerError::Timeout {
                after: self.fixer_timeout,
            }),
        }
    }

    /// Final transitions are reported, not propagated: the session result
    /// is returned either way.
    async fn commit(&self, node_id: &str, target: NodeState) {
        match self.machine.transition(node_id, target).await {
            Ok(true) => {}
            Ok(false) => warn!(%target, "final transition was refused"),
            Err(e) => warn!(%target, error = %e, "final transition failed"),
        }
    }

    async fn audit_failure(&self, session: &Session, attempt: u32, report: &ValidationReport) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = AuditEntry::new(
            &session.session_id,
            &session.node_id,
            attempt,
            session.code.clone(),
            report.failed_summaries(),
        );
        let digest = entry.code_digest.short().to_string();
        if let Err(e) = audit.record(entry).await {
            warn!(attempt, %digest, error = %e, "failed to record audit entry");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn notify(&self, attempt: u32, total: u32, stage: SessionStage, message: &str) {
        let Some(tx) = &self.progress else {
            return;
        };
        let event = SessionProgress {
            attempt,
            total,
            stage,
            message: message.to_string(),
        };
        if let Err(e) = tx.try_send(event) {
            debug!(error = %e, "progress event dropped");
        }
    }

    fn finish(
        &self,
        session: Session,
        outcome: SessionOutcome,
        started: Instant,
    ) -> RetrySessionResult {
        let total_attempts = session.history.len() as u32;
        obs::emit_session_finished(
            outcome.as_str(),
            total_attempts,
            started.elapsed().as_millis() as u64,
        );
        self.notify(
            total_attempts,
            total_attempts,
            SessionStage::Finished,
            outcome.as_str(),
        );
        RetrySessionResult {
            session_id: session.session_id,
            node_id: session.node_id,
            total_attempts,
            passed: outcome == SessionOutcome::Passed,
            max_retries_reached: outcome == SessionOutcome::Exhausted,
            final_code: session.code,
            history: session.history,
            outcome,
        }
    }
}

/// Mutable state of one running session.
struct Session {
    session_id: String,
    node_id: String,
    code: String,
    history: Vec<AttemptRecord>,
}
