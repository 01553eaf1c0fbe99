use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bulk::BulkOptions;
use crate::consistency::ConsistencySettings;

/// Configuration for rebound.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (REBOUND_* prefix)
/// 3. Config file (~/.config/rebound/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of per-item actions in flight. Unset means unbounded.
    ///
    /// Can be set via:
    /// - CLI: --max-concurrency 8
    /// - ENV: REBOUND_MAX_CONCURRENCY
    /// - Config: max_concurrency = 8
    pub max_concurrency: Option<usize>,

    /// Deadline for a whole bulk operation, in seconds. Unset means none.
    pub batch_timeout_secs: Option<u64>,

    /// Report complete failure as a warning instead of an error.
    ///
    /// Can be set via:
    /// - CLI: --ignore-partial-failures
    /// - ENV: REBOUND_IGNORE_PARTIAL_FAILURES
    pub ignore_partial_failures: bool,

    /// How long a read-after-write loop keeps trying, in seconds.
    pub read_timeout_secs: u64,

    /// First backoff delay of a consistency loop, in milliseconds.
    pub min_backoff_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let consistency = ConsistencySettings::default();
        Self {
            max_concurrency: None,
            batch_timeout_secs: None,
            ignore_partial_failures: false,
            read_timeout_secs: consistency.timeout.as_secs(),
            min_backoff_ms: duration_millis(consistency.min_backoff),
            max_backoff_ms: duration_millis(consistency.max_backoff),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/rebound/config.toml
    /// Reads environment variables with REBOUND_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from an explicit file plus the environment.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("rebound");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if self.min_backoff_ms > self.max_backoff_ms {
            anyhow::bail!(
                "min_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.min_backoff_ms,
                self.max_backoff_ms
            );
        }
        Ok(())
    }

    /// Orchestrator options described by this configuration.
    pub fn orchestrator(&self) -> BulkOptions {
        let mut options =
            BulkOptions::default().ignoring_partial_failures(self.ignore_partial_failures);
        if let Some(max) = self.max_concurrency {
            options = options.with_max_concurrency(max);
        }
        if let Some(secs) = self.batch_timeout_secs {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        options
    }

    /// Consistency-loop settings described by this configuration.
    pub fn consistency(&self) -> ConsistencySettings {
        ConsistencySettings::new(Duration::from_secs(self.read_timeout_secs)).with_backoff(
            Duration::from_millis(self.min_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/rebound/config.toml
/// - macOS: ~/Library/Application Support/rebound/config.toml
/// - Windows: %APPDATA%\rebound\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rebound")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Rebound Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (REBOUND_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Maximum number of items processed at once by a bulk operation.
# Leave unset to start every item immediately.
#
# Can also be set via:
# - CLI: rebound simulate --max-concurrency 8 ...
# - Environment: REBOUND_MAX_CONCURRENCY=8
#max_concurrency = 8

# Deadline for a whole bulk operation, in seconds.
# Items still running when it passes are recorded as timed out.
#batch_timeout_secs = 300

# Treat a batch where every item failed as a warning rather than an error.
ignore_partial_failures = false

# Read-after-write consistency: total time to wait for a freshly written
# resource to become visible, and the backoff bounds between attempts.
read_timeout_secs = 120
min_backoff_ms = 200
max_backoff_ms = 10000

# Log filter used when RUST_LOG is not set (error, warn, info, debug, trace).
log_level = "info"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    ensure_config_file_at(&config_file_path())
}

/// Create the example config at `config_path` unless something is there.
pub fn ensure_config_file_at(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
