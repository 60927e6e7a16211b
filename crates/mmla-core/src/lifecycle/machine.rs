//! Store-backed lifecycle state machine.
//!
//! Every transition is a whole-document read-modify-write run through
//! [`SpecStore::update`]. The store serializes writers, so concurrent
//! transitions of different nodes all land, and the dependency gate is
//! evaluated against the statuses current at commit time.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use mmla_state::{NodeState, SpecDocument, SpecStore};

use crate::graph::SpecTree;
use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::table::{is_gated, is_legal_transition};
use crate::metrics::METRICS;
use crate::obs;

/// Lifecycle operations over an injected [`SpecStore`].
#[derive(Clone)]
pub struct StateMachine {
    store: Arc<dyn SpecStore>,
}

/// What a transition does to the document it was evaluated against.
enum Step {
    Unchanged,
    Rejected { current: NodeState, reason: String },
    Apply { current: NodeState },
}

impl StateMachine {
    pub fn new(store: Arc<dyn SpecStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SpecStore> {
        &self.store
    }

    /// Persist a freshly compiled tree, replacing whatever was stored.
    /// Returns the new revision.
    pub async fn install(&self, tree: &SpecTree) -> LifecycleResult<u64> {
        let revision = self.store.replace(tree.to_document()).await?;
        debug!(root = %tree.root_id(), revision, "specification installed");
        Ok(revision)
    }

    /// Load and index the current document.
    pub async fn load_tree(&self) -> LifecycleResult<SpecTree> {
        let document = self.store.load().await?;
        Ok(SpecTree::from_document(&document)?)
    }

    pub async fn get_status(&self, node_id: &str) -> LifecycleResult<NodeState> {
        self.load_tree()
            .await?
            .status_of(node_id)
            .ok_or_else(|| LifecycleError::NotFound {
                node_id: node_id.to_string(),
            })
    }

    /// Attempt `node_id -> target`.
    ///
    /// `Ok(false)` when the pair is illegal or a dependency is not yet
    /// `Implemented`; the stored status is untouched. `Ok(true)` when the
    /// new status (with a fresh timestamp) is committed, or when `target`
    /// is already the current status (nothing is written).
    pub async fn transition(&self, node_id: &str, target: NodeState) -> LifecycleResult<bool> {
        // the store may re-run the edit after a lost race; keep the last verdict
        let mut verdict: Option<LifecycleResult<Step>> = None;
        let mut edit = |document: &mut SpecDocument| {
            let step = plan(document, node_id, target);
            let commit = matches!(step, Ok(Step::Apply { .. }));
            verdict = Some(step);
            commit
        };
        let committed = self.store.update(&mut edit).await?;

        let step = verdict.ok_or_else(|| LifecycleError::Unevaluated {
            node_id: node_id.to_string(),
        })??;
        match (step, committed) {
            (Step::Unchanged, _) => Ok(true),
            (Step::Rejected { current, reason }, _) => {
                METRICS.inc_transitions_rejected();
                obs::emit_blocked(node_id, current, target, &reason);
                Ok(false)
            }
            (Step::Apply { current }, Some(revision)) => {
                METRICS.inc_transitions_applied();
                obs::emit_transition(node_id, current, target, revision);
                Ok(true)
            }
            (Step::Apply { .. }, None) => Err(LifecycleError::Unevaluated {
                node_id: node_id.to_string(),
            }),
        }
    }
}

/// Evaluate `node_id -> target` against `document`, writing the new status
/// into it when the transition applies.
fn plan(document: &mut SpecDocument, node_id: &str, target: NodeState) -> LifecycleResult<Step> {
    let mut tree = SpecTree::from_document(document)?;
    let current = tree
        .status_of(node_id)
        .ok_or_else(|| LifecycleError::NotFound {
            node_id: node_id.to_string(),
        })?;

    if current == target {
        return Ok(Step::Unchanged);
    }
    if !is_legal_transition(current, target) {
        return Ok(Step::Rejected {
            current,
            reason: "illegal transition".to_string(),
        });
    }
    if is_gated(current, target) {
        if let Some(blocker) = unmet_dependency(&tree, node_id) {
            return Ok(Step::Rejected {
                current,
                reason: format!("dependency {blocker} is not IMPLEMENTED"),
            });
        }
    }

    tree.set_status(node_id, target, Utc::now());
    *document = tree.to_document();
    Ok(Step::Apply { current })
}

/// First dependency of `node_id` whose status is not `Implemented`.
fn unmet_dependency(tree: &SpecTree, node_id: &str) -> Option<String> {
    let node = tree.get(node_id)?;
    node.dependencies()
        .iter()
        .find(|dep| tree.status_of(dep) != Some(NodeState::Implemented))
        .cloned()
}
