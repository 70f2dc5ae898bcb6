//! Typed YAML configuration for agix.
//!
//! The core never parses config files itself — it is handed a [`Config`]
//! value. This crate owns exactly one job: turn `~/.agix/config.yaml` (or an
//! explicit path) into that value, and complain loudly if the file's
//! permissions look wrong.

mod types;

pub use types::{
    AuditConfig, BudgetConfig, CacheConfig, Config, CompressionConfig, ExperimentConfig,
    FailoverConfig, FirewallAction, FirewallConfig, FirewallRule, McpServerConfig, ModelMapEntry,
    PromptPosition, PromptTemplateConfig, ProviderKeys, QualityAction, QualityGateConfig,
    RateLimitConfig, ResponsePolicyConfig, ResponsePolicyOverride, RoutingConfig, RoutingTier,
    SessionOverrideConfig, ToolAcl, ToolsConfig, TracingConfig, WebhookDefinition, WebhooksConfig,
};

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Default config file location: `~/.agix/config.yaml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().map(|h| h.join(".agix").join("config.yaml")).ok_or(ConfigError::NoHomeDir)
}

/// Loads config from `path`. Missing file is not an error — callers get
/// [`Config::default()`], since every field has a workable default.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    warn_if_permissions_unsafe(path);
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Loads config from [`default_path`].
pub fn load_default() -> Result<Config, ConfigError> {
    load(&default_path()?)
}

#[cfg(unix)]
fn warn_if_permissions_unsafe(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode != 0o600 {
            tracing::warn!(path = %path.display(), mode = format!("{mode:o}"), "config file should be mode 0600");
        }
    }
}

#[cfg(not(unix))]
fn warn_if_permissions_unsafe(_path: &Path) {}
