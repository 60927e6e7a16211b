//! Runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file, then
//! `MMLA_*` environment variables. The CLI applies its own flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SPEC_PATH: &str = "mmla_spec.json";
pub const DEFAULT_AUDIT_PATH: &str = "data_trap.jsonl";
pub const DEFAULT_MAX_RETRIES: u32 = 16;
pub const DEFAULT_FIXER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MmlaConfig {
    /// Persisted specification document.
    pub spec_path: PathBuf,
    /// JSON Lines file receiving failed repair attempts.
    pub audit_path: PathBuf,
    pub max_retries: u32,
    pub fixer_timeout_secs: u64,
    /// External repair command, whitespace separated. Without one the
    /// session runs validation only and every repair attempt fails.
    pub fixer_command: Option<String>,
}

impl Default for MmlaConfig {
    fn default() -> Self {
        Self {
            spec_path: PathBuf::from(DEFAULT_SPEC_PATH),
            audit_path: PathBuf::from(DEFAULT_AUDIT_PATH),
            max_retries: DEFAULT_MAX_RETRIES,
            fixer_timeout_secs: DEFAULT_FIXER_TIMEOUT_SECS,
            fixer_command: None,
        }
    }
}

impl MmlaConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the process
    /// environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|var| std::env::var(var).ok())
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `MMLA_SPEC_PATH`, `MMLA_AUDIT_PATH`, `MMLA_MAX_RETRIES`,
    /// `MMLA_FIXER_TIMEOUT_SECS` and `MMLA_FIXER_COMMAND` as read by `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MMLA_SPEC_PATH") {
            self.spec_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MMLA_AUDIT_PATH") {
            self.audit_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MMLA_MAX_RETRIES") {
            self.max_retries = parse_env("MMLA_MAX_RETRIES", v)?;
        }
        if let Some(v) = lookup("MMLA_FIXER_TIMEOUT_SECS") {
            self.fixer_timeout_secs = parse_env("MMLA_FIXER_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("MMLA_FIXER_COMMAND") {
            self.fixer_command = Some(v).filter(|c| !c.trim().is_empty());
        }
        Ok(self)
    }

    pub fn fixer_timeout(&self) -> Duration {
        Duration::from_secs(self.fixer_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: String) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value,
        })
}
