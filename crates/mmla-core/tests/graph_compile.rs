//! Compiling editor exports into spec trees.

use mmla_core::{
    compile, CompileError, EdgeDescriptor, NodeDescriptor, NodeState, NodeType, RawGraph,
};
use mmla_state::{FieldSpec, LeafSpec, ModuleRecord, OutputSpec};

const EXPORT: &str = r#"{
  "nodes": [
    {"id": "root", "type": "ROOT",
     "data": {"name": "Shop", "meta": {"project_name": "shop", "version": "0.3"},
              "config": {"python": "3.11"}}},
    {"id": "data", "type": "BRANCH", "parentNode": "root",
     "data": {"name": "Data layer", "status": "IMPLEMENTED"}},
    {"id": "api", "type": "BRANCH", "parentNode": "root",
     "data": {"name": "API", "dependencies": ["data"]}},
    {"id": "leaf_load", "type": "LEAF", "parentNode": "data",
     "data": {"name": "Load orders", "status": "IMPLEMENTED",
              "spec": {"inputs": [{"name": "path", "type": "str"}],
                       "outputs": [{"name": "orders", "type": "list"}]}}},
    {"id": "leaf_total", "type": "LEAF", "parentNode": "api",
     "data": {"name": "Order total", "dependencies": ["leaf_load"],
              "spec": {"inputs": [{"name": "orders", "type": "list"}],
                       "outputs": {"type": "float"},
                       "constraints": ["ignore cancelled orders"]}}}
  ],
  "edges": [
    {"id": "e1", "source": "leaf_load", "target": "leaf_total",
     "data": {"mapping": {"source_field": "orders", "target_field": "orders"}}}
  ]
}"#;

#[test]
fn editor_export_compiles_into_indexed_tree() {
    let raw = RawGraph::from_json_str(EXPORT).unwrap();
    let tree = raw.compile().unwrap();

    assert_eq!(tree.root_id(), "root");
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.parent_of("leaf_total").unwrap().id, "api");
    assert_eq!(tree.status_of("leaf_load"), Some(NodeState::Implemented));
    assert_eq!(tree.status_of("leaf_total"), Some(NodeState::Locked));
    assert_eq!(tree.get("leaf_total").unwrap().node_type(), NodeType::Leaf);

    let order = tree.topological_order();
    let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(pos("leaf_load") < pos("leaf_total"));
    assert!(pos("data") < pos("api"));
}

#[test]
fn summary_and_context_views() {
    let tree = RawGraph::from_json_str(EXPORT).unwrap().compile().unwrap();

    let summary = tree.summary();
    assert_eq!(summary.project_name, "shop");
    assert_eq!(summary.version, "0.3");
    let top: Vec<&str> = summary.modules.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(top, vec!["data", "api"]);
    assert_eq!(summary.modules[1].children[0].id, "leaf_total");

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["modules"][0]["type"], "BRANCH");

    let ctx = tree.node_context("leaf_total").unwrap();
    assert_eq!(ctx.upstream_dependencies, vec!["leaf_load", "data"]);
    assert_eq!(ctx.global_config["python"], "3.11");
    match ctx.target_node {
        ModuleRecord::Leaf(leaf) => assert_eq!(leaf.spec.constraints.len(), 1),
        other => panic!("expected a leaf record, got {other:?}"),
    }
    assert!(tree.node_context("root").is_none());
    assert!(tree.node_context("ghost").is_none());
}

#[test]
fn document_round_trip_preserves_structure() {
    let tree = RawGraph::from_json_str(EXPORT).unwrap().compile().unwrap();
    let document = tree.to_document();

    let wire = serde_json::to_string(&document).unwrap();
    let reread: mmla_state::SpecDocument = serde_json::from_str(&wire).unwrap();
    let again = mmla_core::SpecTree::from_document(&reread).unwrap();

    assert_eq!(again.len(), tree.len());
    assert_eq!(again.summary(), tree.summary());
    assert_eq!(again.status_of("leaf_load"), Some(NodeState::Implemented));
    assert_eq!(
        again.get("leaf_total").unwrap().dependencies(),
        &["leaf_load".to_string()]
    );
}

#[test]
fn cycle_is_reported_before_type_errors() {
    let spec = |input: &str, output: &str| LeafSpec {
        inputs: vec![FieldSpec::new("x", input)],
        outputs: OutputSpec::Fields(vec![FieldSpec::new("y", output)]),
        ..LeafSpec::default()
    };
    let nodes = vec![
        NodeDescriptor::root("root"),
        NodeDescriptor::leaf("a", "root", spec("int", "str")),
        NodeDescriptor::leaf("b", "root", spec("int", "str")),
    ];
    let edges = vec![
        EdgeDescriptor::new("e1", "a", "b").with_mapping("y", "x"),
        EdgeDescriptor::new("e2", "b", "a").with_mapping("y", "x"),
    ];
    assert!(matches!(
        compile(&nodes, &edges),
        Err(CompileError::CycleDetected { .. })
    ));

    // acyclic: both mismatches surface in one error
    let nodes = vec![
        NodeDescriptor::root("root"),
        NodeDescriptor::leaf("a", "root", spec("int", "str")),
        NodeDescriptor::leaf("b", "root", spec("int", "str")),
        NodeDescriptor::leaf("c", "root", spec("int", "str")),
    ];
    let edges = vec![
        EdgeDescriptor::new("e1", "a", "b").with_mapping("y", "x"),
        EdgeDescriptor::new("e2", "b", "c").with_mapping("y", "x"),
    ];
    match compile(&nodes, &edges) {
        Err(CompileError::TypeMismatch(mismatches)) => {
            let ids: Vec<&str> = mismatches.iter().map(|m| m.edge_id.as_str()).collect();
            assert_eq!(ids, vec!["e1", "e2"]);
            assert_eq!(mismatches[0].source_type, "str");
            assert_eq!(mismatches[0].target_type, "int");
        }
        other => panic!("expected type mismatches, got {other:?}"),
    }
}

#[test]
fn root_count_is_enforced() {
    let none = vec![NodeDescriptor::branch("a", "b"), NodeDescriptor::branch("b", "a")];
    assert!(compile(&none, &[]).is_err());

    let two = vec![NodeDescriptor::root("r1"), NodeDescriptor::root("r2")];
    assert!(matches!(
        compile(&two, &[]),
        Err(CompileError::MultipleRoots { .. })
    ));

    assert!(matches!(compile(&[], &[]), Err(CompileError::NoRoot)));
}
