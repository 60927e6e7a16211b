//! Validation report types and scoring.

use serde::{Deserialize, Serialize};

/// Number of layers in every report.
pub const LAYER_COUNT: usize = 17;

/// Upper bound on `ValidationReport::suggestions`.
pub const MAX_SUGGESTIONS: usize = 5;

/// Outcome of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerResult {
    pub index: u8,
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl LayerResult {
    pub fn pass(index: u8, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(index: u8, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }

    /// `L{index} ({name}): {message}`
    pub fn summary(&self) -> String {
        format!("L{} ({}): {}", self.index, self.name, self.message)
    }
}

/// Result of validating one code sample against one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub node_id: String,
    pub layers: Vec<LayerResult>,
    pub quality_score: u8,
    pub passed: bool,
    pub passed_layers: usize,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// Derive score, verdict and suggestions from per-layer results.
    ///
    /// `passed` requires every layer of a full report to pass; a report
    /// with fewer than [`LAYER_COUNT`] layers never passes.
    pub fn from_layers(node_id: impl Into<String>, layers: Vec<LayerResult>) -> Self {
        let passed_layers = layers.iter().filter(|l| l.passed).count();
        let suggestions = layers
            .iter()
            .filter(|l| !l.passed)
            .take(MAX_SUGGESTIONS)
            .map(LayerResult::summary)
            .collect();
        Self {
            node_id: node_id.into(),
            quality_score: quality_score(passed_layers, LAYER_COUNT),
            passed: passed_layers == LAYER_COUNT && layers.len() == LAYER_COUNT,
            passed_layers,
            layers,
            suggestions,
        }
    }

    /// Summaries of every failing layer (not capped).
    pub fn failed_summaries(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter(|l| !l.passed)
            .map(LayerResult::summary)
            .collect()
    }
}

/// `round(100 * passed / total)`, clamped to 100.
pub fn quality_score(passed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let score = (100.0 * passed as f64 / total as f64).round();
    score.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(passing: usize) -> Vec<LayerResult> {
        (1..=LAYER_COUNT as u8)
            .map(|i| {
                if (i as usize) <= passing {
                    LayerResult::pass(i, format!("layer{i}"), "ok")
                } else {
                    LayerResult::fail(i, format!("layer{i}"), format!("bad {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn score_is_rounded_percentage() {
        for passing in 0..=LAYER_COUNT {
            let expected = (100.0 * passing as f64 / 17.0).round() as u8;
            let report = ValidationReport::from_layers("n", layers(passing));
            assert_eq!(report.quality_score, expected);
            assert_eq!(report.passed_layers, passing);
        }
        assert_eq!(quality_score(16, 17), 94);
        assert_eq!(quality_score(1, 17), 6);
    }

    #[test]
    fn extremes() {
        let none = ValidationReport::from_layers("n", layers(0));
        assert_eq!(none.quality_score, 0);
        assert!(!none.passed);

        let all = ValidationReport::from_layers("n", layers(17));
        assert_eq!(all.quality_score, 100);
        assert!(all.passed);
        assert!(all.suggestions.is_empty());
    }

    #[test]
    fn suggestions_are_first_five_failures_in_order() {
        let report = ValidationReport::from_layers("n", layers(10));
        assert_eq!(report.suggestions.len(), 5);
        assert_eq!(report.suggestions[0], "L11 (layer11): bad 11");
        assert_eq!(report.suggestions[4], "L15 (layer15): bad 15");
        assert_eq!(report.failed_summaries().len(), 7);
    }
}
