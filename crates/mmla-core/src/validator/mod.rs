//! Seventeen-layer static validation of a generated Python sample against
//! a leaf's interface spec.
//!
//! Every layer always runs and always contributes one [`LayerResult`]; a
//! layer that cannot reach a verdict (unparsable sample, internal fault,
//! panic) is recorded as failed. Layers never short-circuit each other.
//!
//! | # | Layer | Group |
//! |---|-------|-------|
//! | 1-4 | syntax, definitions, indentation, naming | [`structural`] |
//! | 5-8 | parameters, return path, annotations, docstring | [`signature`] |
//! | 9-12 | imports, classification, allow-list, circular risk | [`dependency`] |
//! | 13-17 | type hints, control flow, error handling, security, nesting | [`logic`] |

pub mod dependency;
pub mod layer;
pub mod logic;
pub mod report;
pub mod sample;
pub mod signature;
pub mod stdlib;
pub mod structural;

use mmla_state::LeafSpec;

use crate::metrics::METRICS;
use crate::obs;

pub use layer::{LayerCheck, LayerDef, LayerFault, LayerInput, LayerOutcome};
pub use report::{quality_score, LayerResult, ValidationReport, LAYER_COUNT, MAX_SUGGESTIONS};
pub use sample::ParsedSample;

/// The fixed layer table, in evaluation order.
#[rustfmt::skip]
pub static LAYERS: [LayerDef; LAYER_COUNT] = [
    LayerDef { index: 1, name: "Syntax", check: structural::syntax },
    LayerDef { index: 2, name: "Definitions", check: structural::definitions },
    LayerDef { index: 3, name: "Indentation", check: structural::indentation },
    LayerDef { index: 4, name: "Naming", check: structural::naming },
    LayerDef { index: 5, name: "Parameters", check: signature::parameters },
    LayerDef { index: 6, name: "Return Path", check: signature::return_path },
    LayerDef { index: 7, name: "Annotation Coverage", check: signature::annotations },
    LayerDef { index: 8, name: "Docstring", check: signature::docstring },
    LayerDef { index: 9, name: "Imports", check: dependency::imports },
    LayerDef { index: 10, name: "Import Classification", check: dependency::classification },
    LayerDef { index: 11, name: "Allow-List", check: dependency::allow_list },
    LayerDef { index: 12, name: "Circular Risk", check: dependency::circular_risk },
    LayerDef { index: 13, name: "Type-Hint Coverage", check: logic::type_hints },
    LayerDef { index: 14, name: "Control Structures", check: logic::control_structures },
    LayerDef { index: 15, name: "Error Handling", check: logic::error_handling },
    LayerDef { index: 16, name: "Security", check: logic::security },
    LayerDef { index: 17, name: "Nesting Depth", check: logic::nesting_depth },
];

/// Validates code samples. The retry orchestrator holds one of these.
pub trait SampleValidator: Send + Sync {
    fn validate(&self, code: &str, node_id: &str, spec: &LeafSpec) -> ValidationReport;
}

/// Production validator: runs [`LAYERS`] in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredValidator;

impl SampleValidator for LayeredValidator {
    fn validate(&self, code: &str, node_id: &str, spec: &LeafSpec) -> ValidationReport {
        let report = validate(code, node_id, spec);
        METRICS.inc_validations();
        obs::emit_validation_completed(node_id, report.quality_score, report.passed_layers);
        report
    }
}

/// Run all seventeen layers over `code`. Never fails: problems with the
/// sample show up as failed layers.
pub fn validate(code: &str, node_id: &str, spec: &LeafSpec) -> ValidationReport {
    let sample = ParsedSample::parse(code);
    let input = LayerInput {
        sample: &sample,
        spec,
    };
    let layers = LAYERS.iter().map(|def| def.run(&input)).collect();
    ValidationReport::from_layers(node_id, layers)
}
