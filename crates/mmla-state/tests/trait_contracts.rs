//! Trait contract tests for SpecStore and AuditTrail.
//!
//! Every backend runs the same checks: the in-memory fakes and the
//! filesystem stores must behave identically.

use std::sync::Arc;

use mmla_state::fakes::{MemoryAuditTrail, MemorySpecStore};
use mmla_state::{
    AuditEntry, AuditTrail, JsonFileSpecStore, JsonlAuditTrail, LeafRecord, LeafSpec,
    ModuleRecord, NodeState, SpecDocument, SpecStore, StorageError,
};
use tempfile::TempDir;

fn document(leaf_status: NodeState) -> SpecDocument {
    SpecDocument {
        id: "root".into(),
        revision: 0,
        name: Some("Shop".into()),
        status: NodeState::Locked,
        last_updated: None,
        meta: serde_json::json!({"project_name": "shop"}),
        config: serde_json::Value::Null,
        modules: vec![ModuleRecord::Leaf(LeafRecord {
            id: "leaf_a".into(),
            name: "A".into(),
            status: leaf_status,
            dependencies: Vec::new(),
            last_updated: None,
            spec: LeafSpec::default(),
        })],
    }
}

fn leaf_status(doc: &SpecDocument) -> NodeState {
    match &doc.modules[0] {
        ModuleRecord::Leaf(leaf) => leaf.status,
        other => panic!("unexpected module {other:?}"),
    }
}

fn spec_stores(dir: &TempDir) -> Vec<(&'static str, Arc<dyn SpecStore>)> {
    vec![
        ("memory", Arc::new(MemorySpecStore::new())),
        ("json-file", Arc::new(JsonFileSpecStore::new(dir.path().join("spec.json")))),
    ]
}

fn audit_trails(dir: &TempDir) -> Vec<(&'static str, Arc<dyn AuditTrail>)> {
    vec![
        ("memory", Arc::new(MemoryAuditTrail::new())),
        ("jsonl", Arc::new(JsonlAuditTrail::new(dir.path().join("audit.jsonl")))),
    ]
}

// ===========================================================================
// SpecStore contract tests
// ===========================================================================

#[tokio::test]
async fn empty_store_reports_missing_document() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        assert!(
            matches!(store.load().await, Err(StorageError::DocumentMissing { .. })),
            "{name}"
        );
        assert!(
            matches!(
                store.compare_and_swap(0, document(NodeState::Idle)).await,
                Err(StorageError::DocumentMissing { .. })
            ),
            "{name}"
        );
    }
}

#[tokio::test]
async fn replace_starts_at_revision_one_and_increments() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        assert_eq!(store.replace(document(NodeState::Locked)).await.unwrap(), 1, "{name}");
        assert_eq!(store.replace(document(NodeState::Idle)).await.unwrap(), 2, "{name}");
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.revision, 2, "{name}");
        assert_eq!(leaf_status(&loaded), NodeState::Idle, "{name}");
    }
}

#[tokio::test]
async fn compare_and_swap_commits_on_matching_revision() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        store.replace(document(NodeState::Locked)).await.unwrap();
        let current = store.load().await.unwrap();

        let revision = store
            .compare_and_swap(current.revision, document(NodeState::Idle))
            .await
            .unwrap();
        assert_eq!(revision, current.revision + 1, "{name}");

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.revision, revision, "{name}");
        assert_eq!(leaf_status(&loaded), NodeState::Idle, "{name}");
    }
}

#[tokio::test]
async fn stale_revision_is_a_conflict_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        store.replace(document(NodeState::Locked)).await.unwrap();
        let stale = store.load().await.unwrap().revision;
        store
            .compare_and_swap(stale, document(NodeState::Idle))
            .await
            .unwrap();

        let err = store
            .compare_and_swap(stale, document(NodeState::Planning))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{name}: {err}");
        match err {
            StorageError::RevisionConflict { expected, actual } => {
                assert_eq!(expected, stale, "{name}");
                assert_eq!(actual, stale + 1, "{name}");
            }
            other => panic!("{name}: unexpected {other}"),
        }
        assert_eq!(leaf_status(&store.load().await.unwrap()), NodeState::Idle, "{name}");
    }
}

#[tokio::test]
async fn racing_writers_on_one_revision_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        store.replace(document(NodeState::Locked)).await.unwrap();
        let revision = store.load().await.unwrap().revision;

        let results = futures::future::join_all(
            [NodeState::Idle, NodeState::Planning, NodeState::Coding]
                .into_iter()
                .map(|status| {
                    let store = store.clone();
                    async move { store.compare_and_swap(revision, document(status)).await }
                }),
        )
        .await;

        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1, "{name}");
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(StorageError::is_conflict),
            "{name}"
        );
    }
}

fn bump_counter(doc: &mut SpecDocument) -> bool {
    let n = doc.meta["count"].as_u64().unwrap_or(0);
    doc.meta["count"] = serde_json::json!(n + 1);
    true
}

#[tokio::test]
async fn update_commits_edit_or_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        assert!(
            matches!(
                store.update(&mut bump_counter).await,
                Err(StorageError::DocumentMissing { .. })
            ),
            "{name}"
        );

        store.replace(document(NodeState::Locked)).await.unwrap();
        assert_eq!(store.update(&mut bump_counter).await.unwrap(), Some(2), "{name}");

        let mut declined = |doc: &mut SpecDocument| {
            doc.name = Some("discarded".into());
            false
        };
        assert_eq!(store.update(&mut declined).await.unwrap(), None, "{name}");

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.revision, 2, "{name}");
        assert_eq!(loaded.meta["count"], 1, "{name}");
        assert_eq!(loaded.name.as_deref(), Some("Shop"), "{name}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_updates_are_all_applied() {
    let dir = TempDir::new().unwrap();
    for (name, store) in spec_stores(&dir) {
        store.replace(document(NodeState::Locked)).await.unwrap();

        let handles: Vec<_> = (0..48)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.update(&mut bump_counter).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some(), "{name}");
        }

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.meta["count"], 48, "{name}");
        assert_eq!(loaded.revision, 49, "{name}");
    }
}

// ===========================================================================
// JsonFileSpecStore across handles
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn separate_file_handles_admit_one_writer_per_revision() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spec.json");
    JsonFileSpecStore::new(&path)
        .replace(document(NodeState::Locked))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = JsonFileSpecStore::new(&path);
            tokio::spawn(async move { store.compare_and_swap(1, document(NodeState::Idle)).await })
        })
        .collect();
    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(revision) => {
                assert_eq!(revision, 2);
                committed += 1;
            }
            Err(e) => assert!(e.is_conflict(), "{e}"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(JsonFileSpecStore::new(&path).load().await.unwrap().revision, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn separate_file_handles_never_lose_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spec.json");
    let seed = JsonFileSpecStore::new(&path);
    seed.replace(document(NodeState::Locked)).await.unwrap();
    assert!(seed.lock_path().ends_with("spec.json.lock"));

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let store = JsonFileSpecStore::new(&path);
            tokio::spawn(async move { store.update(&mut bump_counter).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    let loaded = seed.load().await.unwrap();
    assert_eq!(loaded.meta["count"], 40);
    assert_eq!(loaded.revision, 41);
}

// ===========================================================================
// AuditTrail contract tests
// ===========================================================================

#[tokio::test]
async fn audit_entries_keep_append_order_and_filter_by_node() {
    let dir = TempDir::new().unwrap();
    for (name, trail) in audit_trails(&dir) {
        assert!(trail.entries(None).await.unwrap().is_empty(), "{name}");

        trail
            .record(AuditEntry::new("s1", "leaf_a", 1, "x = 1\n", vec!["L1 (Syntax): bad".into()]))
            .await
            .unwrap();
        trail
            .record(AuditEntry::new("s1", "leaf_b", 1, "y = 2\n", Vec::new()))
            .await
            .unwrap();
        trail
            .record(AuditEntry::new("s1", "leaf_a", 2, "x = 2\n", Vec::new()))
            .await
            .unwrap();

        let all = trail.entries(None).await.unwrap();
        assert_eq!(all.len(), 3, "{name}");

        let leaf_a = trail.entries(Some("leaf_a")).await.unwrap();
        let attempts: Vec<u32> = leaf_a.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, vec![1, 2], "{name}");
        assert_eq!(leaf_a[0].errors, vec!["L1 (Syntax): bad".to_string()], "{name}");
        assert_eq!(leaf_a[0].code_digest.as_str().len(), 64, "{name}");
    }
}
