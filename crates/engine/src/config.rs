//! Engine configuration via `upsync.toml`
//!
//! A default `upsync.toml` can be written on first start. To change
//! settings, edit the file and restart; the engine reads its configuration
//! once, at construction.

use serde::{Deserialize, Serialize};
use std::path::Path;
use upsync_concurrency::TieBreak;
use upsync_core::{Isolation, UpsyncError, UpsyncResult};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "upsync.toml";

fn default_max_commit_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

/// Reconciliation engine configuration loaded from `upsync.toml`.
///
/// # Example
///
/// ```toml
/// isolation = "serializable"
/// max_commit_attempts = 3
/// reject_equal_timestamps = true
/// log_outcomes = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Isolation for in-memory stores built from this config:
    /// `"serializable"` or `"read_committed"`.
    #[serde(default)]
    pub isolation: Isolation,
    /// Attempts per batch when commit fails with a conflict (at least 1).
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
    /// Treat `occurred_at == last_changed_on` as stale.
    #[serde(default = "default_true")]
    pub reject_equal_timestamps: bool,
    /// Emit one debug line per record outcome.
    #[serde(default)]
    pub log_outcomes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::default(),
            max_commit_attempts: default_max_commit_attempts(),
            reject_equal_timestamps: true,
            log_outcomes: false,
        }
    }
}

impl EngineConfig {
    /// Tie-break policy for ledger checks
    pub fn tie_break(&self) -> TieBreak {
        TieBreak::from_reject_equal(self.reject_equal_timestamps)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `max_commit_attempts` is zero.
    pub fn validate(&self) -> UpsyncResult<()> {
        if self.max_commit_attempts == 0 {
            return Err(UpsyncError::config(
                "max_commit_attempts must be at least 1 in upsync.toml",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# upsync reconciliation engine configuration
#
# Isolation: "serializable" (default) or "read_committed"
#   "serializable"   = rows and ledger entries read by a batch are validated
#                      at commit; concurrent writers to a column conflict
#   "read_committed" = no validation; concurrent batches can lose updates
isolation = "serializable"

# How many times a batch is re-run from scratch after a commit conflict
max_commit_attempts = 3

# Treat a write whose timestamp equals the ledger's as stale (default: true).
# With true, replaying an applied batch reports OutdatedChange.
reject_equal_timestamps = true

# Log every record outcome at debug level (default: false)
log_outcomes = false
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> UpsyncResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpsyncError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            UpsyncError::Config { message } => {
                UpsyncError::config(format!("{} ({})", message, path.display()))
            }
            other => other,
        })
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Config` on a parse or validation failure.
    pub fn from_toml(content: &str) -> UpsyncResult<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| UpsyncError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> UpsyncResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                UpsyncError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> UpsyncResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| UpsyncError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            UpsyncError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
