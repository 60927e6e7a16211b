//! MMLA - architecture lifecycle CLI
//!
//! The `mmla` command compiles an architecture graph into a persisted
//! specification, moves nodes through their lifecycle and gates generated
//! code through the seventeen-layer validator.
//!
//! ## Commands
//!
//! - `compile`: Compile an editor export and install it as the spec
//! - `summary` / `context`: Read views over the installed spec
//! - `status` / `transition`: Inspect and change node status
//! - `validate`: Score a code sample against a leaf's interface
//! - `retry`: Run a bounded validate/repair session for a leaf

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use mmla_core::fixer::FixerResult;
use mmla_core::telemetry::level_for;
use mmla_core::{
    CodeFixer, FixerError, LayeredValidator, MmlaConfig, NodeState, ProcessCodeFixer, RawGraph,
    RepairRequest, RetryOrchestrator, SampleValidator, SessionProgress, SpecTree, StateMachine,
    ValidationReport, METRICS,
};
use mmla_state::{JsonFileSpecStore, JsonlAuditTrail, LeafSpec};

#[derive(Parser)]
#[command(name = "mmla")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Architecture lifecycle: dependency-gated work items and validated code", long_about = None)]
struct Cli {
    /// Specification document (overrides config and MMLA_SPEC_PATH)
    #[arg(long, global = true)]
    spec: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "MMLA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON: log lines on stderr and command results on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an editor export (nodes + edges JSON) and install it
    Compile {
        /// Graph export to compile
        graph: PathBuf,

        /// Only check the graph; do not write the spec
        #[arg(long)]
        check: bool,
    },

    /// Print the project outline
    Summary,

    /// Print a node's record, upstream dependencies and global config
    Context {
        node_id: String,
    },

    /// Print a node's lifecycle status
    Status {
        node_id: String,
    },

    /// Move a node to another lifecycle status
    Transition {
        node_id: String,

        /// Target status (e.g. IDLE, CODING, VALIDATING)
        target: NodeState,
    },

    /// Validate a Python sample against a leaf's interface spec
    Validate {
        node_id: String,

        /// Python source file
        #[arg(short, long)]
        code: PathBuf,
    },

    /// Run a validate/repair session for a leaf
    Retry {
        node_id: String,

        /// Initial Python source file
        #[arg(short, long)]
        code: PathBuf,

        /// Maximum attempts (default from config)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Repair command receiving the request JSON on stdin
        #[arg(long)]
        fixer_command: Option<String>,

        /// Seconds allowed per repair call
        #[arg(long)]
        fixer_timeout: Option<u64>,

        /// Write the final code here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    mmla_core::init_tracing(cli.json, level_for(cli.verbose));

    let mut config = MmlaConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(spec) = cli.spec {
        config.spec_path = spec;
    }
    let out = Output { json: cli.json };

    let result = match cli.command {
        Commands::Compile { graph, check } => cmd_compile(&config, &out, &graph, check).await,
        Commands::Summary => cmd_summary(&config, &out).await,
        Commands::Context { node_id } => cmd_context(&config, &out, &node_id).await,
        Commands::Status { node_id } => cmd_status(&config, &out, &node_id).await,
        Commands::Transition { node_id, target } => {
            cmd_transition(&config, &out, &node_id, target).await
        }
        Commands::Validate { node_id, code } => cmd_validate(&config, &out, &node_id, &code).await,
        Commands::Retry {
            node_id,
            code,
            max_retries,
            fixer_command,
            fixer_timeout,
            output,
        } => {
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            if fixer_command.is_some() {
                config.fixer_command = fixer_command;
            }
            if let Some(secs) = fixer_timeout {
                config.fixer_timeout_secs = secs;
            }
            cmd_retry(&config, &out, &node_id, &code, output.as_deref()).await
        }
    };

    METRICS.flush();
    result
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

struct Output {
    json: bool,
}

impl Output {
    /// JSON mode prints `value`; text mode prints whatever `text` renders.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

fn machine(config: &MmlaConfig) -> StateMachine {
    StateMachine::new(Arc::new(JsonFileSpecStore::new(&config.spec_path)))
}

async fn load_tree(config: &MmlaConfig) -> Result<SpecTree> {
    machine(config)
        .load_tree()
        .await
        .with_context(|| format!("Failed to load spec {}", config.spec_path.display()))
}

fn leaf_spec(tree: &SpecTree, node_id: &str) -> Result<LeafSpec> {
    let Some(node) = tree.get(node_id) else {
        bail!("Node not found: {node_id}");
    };
    match node.spec() {
        Some(spec) => Ok(spec.clone()),
        None => bail!("{node_id} is a {} and has no interface spec", node.node_type()),
    }
}

fn read_code(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read code {}", path.display()))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_compile(config: &MmlaConfig, out: &Output, graph: &Path, check: bool) -> Result<()> {
    let raw = RawGraph::from_file(graph)?;
    let tree = raw
        .compile()
        .with_context(|| format!("Failed to compile {}", graph.display()))?;

    if !check {
        let revision = machine(config).install(&tree).await?;
        info!(spec = %config.spec_path.display(), revision, "spec installed");
    }

    let summary = tree.summary();
    out.emit(&summary, || {
        let verb = if check { "Checked" } else { "Compiled" };
        format!(
            "{verb} {} node(s) for {} {} (root {})",
            tree.len(),
            summary.project_name,
            summary.version,
            summary.root_id
        )
    })
}

async fn cmd_summary(config: &MmlaConfig, out: &Output) -> Result<()> {
    let summary = load_tree(config).await?.summary();
    out.emit(&summary, || {
        let mut lines = vec![format!(
            "{} {} (root {})",
            summary.project_name, summary.version, summary.root_id
        )];
        let mut stack: Vec<(usize, &mmla_core::graph::OutlineEntry)> =
            summary.modules.iter().rev().map(|m| (1, m)).collect();
        while let Some((depth, entry)) = stack.pop() {
            lines.push(format!(
                "{}{} {} [{}] {}",
                "  ".repeat(depth),
                entry.kind,
                entry.id,
                entry.status,
                entry.name
            ));
            stack.extend(entry.children.iter().rev().map(|c| (depth + 1, c)));
        }
        lines.join("\n")
    })
}

async fn cmd_context(config: &MmlaConfig, out: &Output, node_id: &str) -> Result<()> {
    let tree = load_tree(config).await?;
    let Some(context) = tree.node_context(node_id) else {
        bail!("No context for {node_id}: unknown node or the root");
    };
    // context is structured data; text mode prints it as JSON too
    let rendered = serde_json::to_string_pretty(&context)?;
    out.emit(&context, || rendered.clone())
}

async fn cmd_status(config: &MmlaConfig, out: &Output, node_id: &str) -> Result<()> {
    let status = machine(config).get_status(node_id).await?;
    out.emit(&serde_json::json!({ "node_id": node_id, "status": status }), || {
        format!("{node_id}: {status}")
    })
}

async fn cmd_transition(
    config: &MmlaConfig,
    out: &Output,
    node_id: &str,
    target: NodeState,
) -> Result<()> {
    let sm = machine(config);
    let before = sm.get_status(node_id).await?;
    let applied = sm.transition(node_id, target).await?;
    out.emit(
        &serde_json::json!({
            "node_id": node_id,
            "from": before,
            "to": target,
            "applied": applied,
        }),
        || {
            if applied {
                format!("{node_id}: {before} -> {target}")
            } else {
                format!("{node_id}: {before} -> {target} refused")
            }
        },
    )?;
    if !applied {
        bail!("Transition refused: illegal pair or unmet dependency");
    }
    Ok(())
}

async fn cmd_validate(config: &MmlaConfig, out: &Output, node_id: &str, code: &Path) -> Result<()> {
    let tree = load_tree(config).await?;
    let spec = leaf_spec(&tree, node_id)?;
    let code = read_code(code)?;

    let report = LayeredValidator.validate(&code, node_id, &spec);
    out.emit(&report, || render_report(&report))
}

fn render_report(report: &ValidationReport) -> String {
    let mut lines = vec![format!(
        "{}: score {} ({}/{} layers) {}",
        report.node_id,
        report.quality_score,
        report.passed_layers,
        report.layers.len(),
        if report.passed { "PASS" } else { "FAIL" }
    )];
    for layer in &report.layers {
        let mark = if layer.passed { "ok  " } else { "FAIL" };
        lines.push(format!("  {mark} {}", layer.summary()));
    }
    lines.join("\n")
}

/// Stands in when no repair command is configured: every repair fails, so
/// the session degrades to repeated validation.
struct UnconfiguredFixer;

#[async_trait]
impl CodeFixer for UnconfiguredFixer {
    async fn fix(&self, _request: RepairRequest) -> FixerResult<String> {
        Err(FixerError::NotConfigured)
    }
}

async fn cmd_retry(
    config: &MmlaConfig,
    out: &Output,
    node_id: &str,
    code: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let sm = machine(config);
    let tree = sm
        .load_tree()
        .await
        .with_context(|| format!("Failed to load spec {}", config.spec_path.display()))?;
    let spec = leaf_spec(&tree, node_id)?;
    let code = read_code(code)?;

    let fixer: Arc<dyn CodeFixer> = match config.fixer_command.as_deref() {
        Some(command) => Arc::new(ProcessCodeFixer::from_command_line(command)?),
        None => {
            warn!("no fixer command configured; failed attempts will not be repaired");
            Arc::new(UnconfiguredFixer)
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current attempt");
            let _ = cancel_tx.send(true);
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::channel::<SessionProgress>(32);
    let progress = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            info!(
                attempt = event.attempt,
                total = event.total,
                stage = ?event.stage,
                "{}",
                event.message
            );
        }
    });

    let orchestrator = RetryOrchestrator::new(sm, Arc::new(LayeredValidator), fixer)
        .with_fixer_timeout(config.fixer_timeout())
        .with_cancellation(cancel_rx)
        .with_progress(progress_tx)
        .with_audit_trail(Arc::new(JsonlAuditTrail::new(&config.audit_path)));

    let result = orchestrator
        .run_retry_session(code, node_id, &spec, config.max_retries)
        .await;
    drop(orchestrator);
    let _ = progress.await;

    if let Some(path) = output {
        std::fs::write(path, &result.final_code)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    out.emit(&result, || {
        let mut lines = vec![format!(
            "{}: {} after {} attempt(s)",
            result.node_id,
            result.outcome.as_str(),
            result.total_attempts
        )];
        for record in &result.history {
            lines.push(format!(
                "  attempt {}: score {}{}",
                record.attempt_number,
                record.quality_score,
                record
                    .fixer_error
                    .as_ref()
                    .map(|e| format!(" (fixer: {e})"))
                    .unwrap_or_default()
            ));
            for summary in &record.failed_layer_summaries {
                lines.push(format!("    {summary}"));
            }
        }
        lines.join("\n")
    })?;

    if !result.passed {
        bail!("Session ended without a passing sample ({})", result.outcome.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_parses_state_case_insensitively() {
        let cli = Cli::try_parse_from(["mmla", "transition", "leaf_a", "coding"]).unwrap();
        match cli.command {
            Commands::Transition { node_id, target } => {
                assert_eq!(node_id, "leaf_a");
                assert_eq!(target, NodeState::Coding);
            }
            _ => panic!("expected transition"),
        }
    }

    #[test]
    fn unknown_state_is_rejected() {
        assert!(Cli::try_parse_from(["mmla", "transition", "leaf_a", "DONE"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "mmla",
            "retry",
            "leaf_a",
            "--code",
            "a.py",
            "--max-retries",
            "3",
            "--spec",
            "other.json",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.spec.as_deref(), Some(Path::new("other.json")));
        match cli.command {
            Commands::Retry { max_retries, fixer_command, .. } => {
                assert_eq!(max_retries, Some(3));
                assert!(fixer_command.is_none());
            }
            _ => panic!("expected retry"),
        }
    }

    #[test]
    fn report_text_lists_every_layer() {
        let report = mmla_core::validate("x = 1\n", "leaf_a", &LeafSpec::default());
        let text = render_report(&report);
        assert!(text.starts_with("leaf_a: score "));
        assert_eq!(text.lines().count(), 1 + mmla_core::LAYER_COUNT);
    }

    #[tokio::test]
    async fn unconfigured_fixer_always_fails() {
        let request = RepairRequest::new("leaf_a", 1, "x = 1\n", Vec::new(), LeafSpec::default());
        let err = UnconfiguredFixer.fix(request).await.unwrap_err();
        assert!(matches!(err, FixerError::NotConfigured));
        assert_eq!(err.to_string(), "no fixer command configured");
    }
}
