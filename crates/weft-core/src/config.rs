//! Configuration loading and parsing
//!
//! A single TOML document configures an Orchestrator instance. Every field
//! has a default, so an empty file is a valid configuration. Durations are
//! written the human way (`"2s"`, `"250ms"`, `"24h"`).
//!
//! ```toml
//! [scheduler]
//! max_concurrency = 4
//! grace_period = "1s"
//!
//! [permissions]
//! workspace_root = "/work/repo"
//! interactive = false
//!
//! [sync]
//! interval = "500ms"
//! max_attempts = 5
//! ```

use crate::error::{Classify, ErrorKind};
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::OperationFailed
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    pub scheduler: SchedulerConfig,
    pub limits: ResourceLimits,
    pub permissions: PermissionsConfig,
    pub threads: ThreadsConfig,
    pub sync: SyncConfig,
    pub runtime: RuntimeConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sliding-window size for read-only batches
    pub max_concurrency: usize,
    /// How long in-flight operations may keep running after cancellation
    #[serde(with = "duration_serde")]
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            grace_period: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Relative paths are resolved against this directory, which also gets an
    /// implicit read grant.
    pub workspace_root: PathBuf,
    /// When false, anything needing a prompt is denied instead.
    pub interactive: bool,
    /// Read-only commands that never need approval
    pub safe_commands: Vec<String>,
    /// Tools that are always denied
    pub deny_tools: Vec<String>,
    /// Path prefixes that are always denied
    pub deny_paths: Vec<PathBuf>,
    /// Where permanent grants are persisted; in-memory when unset
    pub grants_file: Option<PathBuf>,
    /// Pending prompts older than this resolve as denied
    #[serde(with = "option_duration_serde")]
    pub decision_timeout: Option<Duration>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            interactive: true,
            safe_commands: [
                "ls",
                "pwd",
                "git status",
                "git log",
                "git diff",
                "cat",
                "head",
                "tail",
                "wc",
                "echo",
                "which",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            deny_tools: Vec::new(),
            deny_paths: Vec::new(),
            grants_file: None,
            decision_timeout: None,
        }
    }
}

/// How the three-way merge resolves a scalar field changed on both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarConflictPolicy {
    #[default]
    LocalWins,
    RemoteWins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Idle threads older than this are moved to cold storage
    #[serde(with = "duration_serde")]
    pub archive_after: Duration,
    /// Directory for archived snapshots; in-memory when unset
    pub cold_storage_dir: Option<PathBuf>,
    /// Maximum nesting of child threads
    pub max_child_depth: usize,
    pub scalar_conflict: ScalarConflictPolicy,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            archive_after: Duration::from_secs(24 * 60 * 60),
            cold_storage_dir: None,
            max_child_depth: 8,
            scalar_conflict: ScalarConflictPolicy::LocalWins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    pub batch_size: usize,
    #[serde(with = "duration_serde")]
    pub backoff_base: Duration,
    #[serde(with = "duration_serde")]
    pub backoff_max: Duration,
    /// Fractional jitter applied to each backoff delay (0.2 = ±20%)
    pub jitter: f64,
    /// Consecutive failures before a thread's status becomes `Error`
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 16,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on batches in one `run_turns` loop
    pub max_turns: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_turns: 32 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_namespace: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_namespace: "weft".to_string(),
        }
    }
}

impl WeftConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::load_from_toml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn load_from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    /// Apply `WEFT_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = lookup("WEFT_MAX_TOOL_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            self.scheduler.max_concurrency = n;
        }

        if let Some(level) = lookup("WEFT_LOG").filter(|v| !v.trim().is_empty()) {
            self.observability.log_level = level;
        }

        if let Some(interactive) = lookup("WEFT_INTERACTIVE").and_then(|v| parse_bool(&v)) {
            self.permissions.interactive = interactive;
        }
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.scheduler.max_concurrency == 0 {
            return invalid("scheduler.max_concurrency cannot be zero");
        }
        if self.limits.max_concurrent_operations == 0 {
            return invalid("limits.max_concurrent_operations cannot be zero");
        }
        if self.limits.timeout.is_zero() {
            return invalid("limits.timeout cannot be zero");
        }
        if self.limits.max_output_bytes == 0 {
            return invalid("limits.max_output_bytes cannot be zero");
        }
        if self.permissions.workspace_root.as_os_str().is_empty() {
            return invalid("permissions.workspace_root cannot be empty");
        }
        if self.sync.batch_size == 0 {
            return invalid("sync.batch_size cannot be zero");
        }
        if self.sync.max_attempts == 0 {
            return invalid("sync.max_attempts cannot be zero");
        }
        if !(0.0..1.0).contains(&self.sync.jitter) {
            return invalid("sync.jitter must be within [0, 1)");
        }
        if self.threads.max_child_depth == 0 {
            return invalid("threads.max_child_depth cannot be zero");
        }

        if self.scheduler.max_concurrency > self.limits.max_concurrent_operations as usize {
            tracing::warn!(
                window = self.scheduler.max_concurrency,
                ceiling = self.limits.max_concurrent_operations,
                "Scheduler window exceeds the global concurrency ceiling; operations will queue"
            );
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Human-readable duration (de)serialization
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_uses_defaults() {
        let config = WeftConfig::load_from_toml("").unwrap();
        assert_eq!(config.scheduler.max_concurrency, 10);
        assert_eq!(config.scheduler.grace_period, Duration::from_secs(2));
        assert_eq!(config.sync.max_attempts, 8);
        assert_eq!(config.threads.scalar_conflict, ScalarConflictPolicy::LocalWins);
        assert!(config.permissions.interactive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_sections_and_durations() {
        let config = WeftConfig::load_from_toml(
            r#"
            [scheduler]
            max_concurrency = 3
            grace_period = "750ms"

            [limits]
            timeout = "5s"
            max_output_bytes = 4096

            [permissions]
            workspace_root = "/work/repo"
            interactive = false
            deny_tools = ["shell_exec"]
            decision_timeout = "1m"

            [threads]
            archive_after = "2h"
            scalar_conflict = "remote_wins"

            [sync]
            interval = "100ms"
            batch_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.max_concurrency, 3);
        assert_eq!(config.scheduler.grace_period, Duration::from_millis(750));
        assert_eq!(config.limits.timeout, Duration::from_secs(5));
        assert_eq!(config.limits.max_concurrent_operations, 10);
        assert_eq!(config.permissions.workspace_root, PathBuf::from("/work/repo"));
        assert!(!config.permissions.interactive);
        assert_eq!(config.permissions.decision_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.threads.archive_after, Duration::from_secs(7200));
        assert_eq!(config.threads.scalar_conflict, ScalarConflictPolicy::RemoteWins);
        assert_eq!(config.sync.batch_size, 4);
    }

    #[test]
    fn rejects_bad_durations() {
        let err = WeftConfig::load_from_toml("[scheduler]\ngrace_period = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("WEFT_MAX_TOOL_CONCURRENCY", "4"),
            ("WEFT_LOG", "weft=debug"),
            ("WEFT_INTERACTIVE", "off"),
        ]
        .into_iter()
        .collect();

        let mut config = WeftConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.scheduler.max_concurrency, 4);
        assert_eq!(config.observability.log_level, "weft=debug");
        assert!(!config.permissions.interactive);
    }

    #[test]
    fn zero_concurrency_override_is_ignored() {
        let mut config = WeftConfig::default();
        config.apply_overrides(|key| (key == "WEFT_MAX_TOOL_CONCURRENCY").then(|| "0".to_string()));
        assert_eq!(config.scheduler.max_concurrency, 10);
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = WeftConfig::default();
        config.limits.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = WeftConfig::default();
        config.sync.jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "[runtime]\nmax_turns = 5\n").unwrap();

        let config = WeftConfig::load_from_file(&path).unwrap();
        assert_eq!(config.runtime.max_turns, 5);

        let missing = WeftConfig::load_from_file(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
