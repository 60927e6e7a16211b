//! Layer plumbing: outcomes, faults and the isolated runner.

use std::panic::{self, AssertUnwindSafe};

use mmla_state::LeafSpec;
use thiserror::Error;

use crate::validator::report::LayerResult;
use crate::validator::sample::ParsedSample;

/// What a layer concluded about a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutcome {
    pub passed: bool,
    pub message: String,
}

impl LayerOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    pub fn verdict(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
        }
    }
}

/// A layer could not reach a conclusion. Recorded as a failed layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerFault {
    #[error("sample does not parse ({detail})")]
    Unparsable { detail: String },

    #[error("check failed: {0}")]
    Internal(String),
}

pub type LayerCheckResult = std::result::Result<LayerOutcome, LayerFault>;

/// Everything a layer may look at.
pub struct LayerInput<'a> {
    pub sample: &'a ParsedSample<'a>,
    pub spec: &'a LeafSpec,
}

pub type LayerCheck = fn(&LayerInput<'_>) -> LayerCheckResult;

/// One entry of the fixed layer table.
pub struct LayerDef {
    pub index: u8,
    pub name: &'static str,
    pub check: LayerCheck,
}

impl LayerDef {
    /// Run the check. A fault or a panic inside the check becomes a failed
    /// result for this layer only.
    pub fn run(&self, input: &LayerInput<'_>) -> LayerResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.check)(input)));
        match outcome {
            Ok(Ok(o)) => LayerResult {
                index: self.index,
                name: self.name.to_string(),
                passed: o.passed,
                message: o.message,
            },
            Ok(Err(fault)) => LayerResult::fail(self.index, self.name, fault.to_string()),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(layer = self.index, %reason, "validation layer panicked");
                LayerResult::fail(self.index, self.name, format!("check aborted: {reason}"))
            }
        }
    }
}
