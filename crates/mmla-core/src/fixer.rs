//! Code Fixer collaborators: given a failing sample and its diagnostics,
//! produce a revised sample.
//!
//! The retry orchestrator only sees the [`CodeFixer`] trait. The bundled
//! [`ProcessCodeFixer`] shells out to an external command, which keeps
//! model prompting and transport out of this crate.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mmla_state::LeafSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from a repair attempt. The orchestrator records these as text and
/// keeps going.
#[derive(Debug, Error)]
pub enum FixerError {
    #[error("fixer command is empty")]
    EmptyCommand,

    #[error("no fixer command configured")]
    NotConfigured,

    #[error("failed to run fixer: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode repair request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("fixer exited with status {status}: {stderr}")]
    Exited { status: i32, stderr: String },

    #[error("fixer returned no code")]
    EmptyOutput,

    #[error("fixer timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },
}

pub type FixerResult<T> = std::result::Result<T, FixerError>;

/// Everything a fixer gets to work with for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub node_id: String,
    pub attempt: u32,
    pub code: String,
    pub diagnostics: Vec<String>,
    pub spec: LeafSpec,
    /// Human-readable instruction assembled from the diagnostics.
    pub instruction: String,
}

impl RepairRequest {
    pub fn new(
        node_id: impl Into<String>,
        attempt: u32,
        code: impl Into<String>,
        diagnostics: Vec<String>,
        spec: LeafSpec,
    ) -> Self {
        let node_id = node_id.into();
        let instruction = repair_instruction(&node_id, &diagnostics, &spec);
        Self {
            node_id,
            attempt,
            code: code.into(),
            diagnostics,
            spec,
            instruction,
        }
    }
}

fn repair_instruction(node_id: &str, diagnostics: &[String], spec: &LeafSpec) -> String {
    let mut out = format!("Revise the implementation of '{node_id}' so that it passes validation.\n");
    let inputs: Vec<String> = spec
        .inputs
        .iter()
        .map(|f| format!("{}: {}", f.name, f.ty))
        .collect();
    if !inputs.is_empty() {
        out.push_str(&format!("Parameters must be exactly: {}\n", inputs.join(", ")));
    }
    for constraint in &spec.constraints {
        out.push_str(&format!("Constraint: {constraint}\n"));
    }
    out.push_str("Fix the following issues:\n");
    for (i, diagnostic) in diagnostics.iter().enumerate() {
        out.push_str(&format!("{}. {diagnostic}\n", i + 1));
    }
    out.push_str("Return only the complete revised Python source.");
    out
}

/// Revises code samples.
#[async_trait]
pub trait CodeFixer: Send + Sync {
    async fn fix(&self, request: RepairRequest) -> FixerResult<String>;
}

// ---------------------------------------------------------------------------
// ProcessCodeFixer
// ---------------------------------------------------------------------------

/// Runs an external command per repair: the [`RepairRequest`] goes to stdin
/// as JSON, revised code comes back on stdout. A fenced code block in the
/// output is unwrapped.
#[derive(Debug, Clone)]
pub struct ProcessCodeFixer {
    program: String,
    args: Vec<String>,
}

impl ProcessCodeFixer {
    pub fn new(command: Vec<String>) -> FixerResult<Self> {
        let mut parts = command.into_iter();
        let program = parts.next().ok_or(FixerError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Whitespace-separated command line, no shell quoting.
    pub fn from_command_line(line: &str) -> FixerResult<Self> {
        Self::new(line.split_whitespace().map(str::to_string).collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl CodeFixer for ProcessCodeFixer {
    async fn fix(&self, request: RepairRequest) -> FixerResult<String> {
        let payload = serde_json::to_vec(&request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // stdin is fed concurrently with draining stdout/stderr so neither
        // side can stall on a full pipe
        let feeder = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;
        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // the fixer may answer without reading its input
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(node_id = %request.node_id, "fixer closed stdin early");
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(join) => return Err(std::io::Error::other(join).into()),
            }
        }
        if !output.status.success() {
            return Err(FixerError::Exited {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let code = extract_code(&stdout);
        if code.trim().is_empty() {
            return Err(FixerError::EmptyOutput);
        }
        tracing::debug!(
            node_id = %request.node_id,
            attempt = request.attempt,
            bytes = code.len(),
            "fixer returned revised code"
        );
        Ok(code)
    }
}

/// Contents of the first fenced block (```` ```python ```` or bare
/// ```` ``` ````) if there is one, otherwise the whole output.
pub fn extract_code(output: &str) -> String {
    let Some(open) = output.find("```") else {
        return output.trim().to_string();
    };
    let after_fence = &output[open + 3..];
    // skip the info string (language tag) up to the end of the line
    let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    let mut code = body.trim_end().to_string();
    code.push('\n');
    code
}
