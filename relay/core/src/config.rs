//! TOML Configuration File Support
//!
//! Configuration loading for the relay, from a TOML file at
//! `~/.config/relay/relay.toml`, environment variables, and CLI overrides.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`RELAY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! kind = "delta-stream"
//! endpoint = "https://inference.example.com/responses"
//! api_key_env = "RELAY_API_KEY"
//! agent_name = "support-workflow"
//! connect_timeout_secs = 10
//!
//! [store]
//! path = "/var/lib/relay/chat.db"
//! history_limit = 200
//!
//! [orchestrator]
//! system_prompt = "You are a helpful assistant"
//! final_text_policy = "last-content"
//! default_item_id = "default"
//! wire_dialect = "standard"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendConfig, BackendKind};
use crate::streaming::{FinalTextPolicy, OrchestratorConfig};
use crate::wire::WireDialect;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Which layer last changed the configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[backend]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Transport variant
    pub kind: Option<BackendKind>,

    /// Upstream URL
    pub endpoint: Option<String>,

    /// Environment variable holding the bearer token
    pub api_key_env: Option<String>,

    /// Agent name for delta-stream backends
    pub agent_name: Option<String>,

    /// Connection setup timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Accept-and-forget placeholder text
    pub placeholder_message: Option<String>,
}

/// `[store]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// SQLite database file
    pub path: Option<PathBuf>,

    /// Messages loaded as history per turn
    pub history_limit: Option<usize>,
}

/// `[orchestrator]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorToml {
    /// System prompt prepended to upstream input
    pub system_prompt: Option<String>,

    /// How the final text is chosen
    pub final_text_policy: Option<FinalTextPolicy>,

    /// Item id used for untagged deltas
    pub default_item_id: Option<String>,

    /// Client protocol flavour
    pub wire_dialect: Option<WireDialect>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Backend section
    pub backend: BackendToml,

    /// Store section
    pub store: StoreToml,

    /// Orchestrator section
    pub orchestrator: OrchestratorToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Upstream transport settings
    pub backend: BackendConfig,

    /// SQLite database file
    pub store_path: PathBuf,

    /// Turn orchestration settings
    pub orchestrator: OrchestratorConfig,

    /// Client protocol flavour
    pub wire_dialect: WireDialect,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            store_path: default_store_path(),
            orchestrator: OrchestratorConfig::default(),
            wire_dialect: WireDialect::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RelayConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The layer that last changed this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check the settings needed to run a turn
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when no endpoint is set or
    /// the history limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .backend
            .endpoint
            .as_deref()
            .map_or(true, |e| e.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "backend '{}' requires an endpoint (set [backend].endpoint or RELAY_ENDPOINT)",
                self.backend.kind
            )));
        }
        if self.orchestrator.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "history_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/relay/relay.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("relay").join("relay.toml"))
}

/// Default SQLite database location
///
/// `$XDG_DATA_HOME/relay/chat.db`, or `relay-chat.db` in the working
/// directory when no data directory is known.
#[must_use]
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("relay").join("chat.db"))
        .unwrap_or_else(|| PathBuf::from("relay-chat.db"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    let mut config = RelayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RelayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);

    Ok(config)
}

fn apply_toml_config(config: &mut RelayConfig, toml: &RelayToml) {
    let backend = &toml.backend;
    if let Some(kind) = backend.kind {
        config.backend.kind = kind;
    }
    if backend.endpoint.is_some() {
        config.backend.endpoint = backend.endpoint.clone();
    }
    if backend.api_key_env.is_some() {
        config.backend.api_key_env = backend.api_key_env.clone();
    }
    if backend.agent_name.is_some() {
        config.backend.agent_name = backend.agent_name.clone();
    }
    if let Some(secs) = backend.connect_timeout_secs {
        config.backend.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(ref message) = backend.placeholder_message {
        config.backend.placeholder_message = message.clone();
    }

    if let Some(ref path) = toml.store.path {
        config.store_path = path.clone();
    }
    if let Some(limit) = toml.store.history_limit {
        config.orchestrator.history_limit = limit;
    }

    let orchestrator = &toml.orchestrator;
    if orchestrator.system_prompt.is_some() {
        config.orchestrator.system_prompt = orchestrator.system_prompt.clone();
    }
    if let Some(policy) = orchestrator.final_text_policy {
        config.orchestrator.final_text_policy = policy;
    }
    if let Some(ref id) = orchestrator.default_item_id {
        config.orchestrator.default_item_id = id.clone();
    }
    if let Some(dialect) = orchestrator.wire_dialect {
        config.wire_dialect = dialect;
    }
}

/// Apply `RELAY_*` environment overrides
fn apply_env_config(config: &mut RelayConfig) {
    apply_env_config_with(config, |key| std::env::var(key).ok());
}

/// Apply environment overrides read through `lookup`
pub fn apply_env_config_with(config: &mut RelayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(kind) = lookup("RELAY_BACKEND") {
        match kind.parse::<BackendKind>() {
            Ok(kind) => {
                config.backend.kind = kind;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring RELAY_BACKEND"),
        }
    }
    if let Some(endpoint) = lookup("RELAY_ENDPOINT") {
        config.backend.endpoint = Some(endpoint);
        config.source = ConfigSource::Env;
    }
    if let Some(var) = lookup("RELAY_API_KEY_ENV") {
        config.backend.api_key_env = Some(var);
        config.source = ConfigSource::Env;
    }
    if let Some(agent) = lookup("RELAY_AGENT_NAME") {
        config.backend.agent_name = Some(agent);
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("RELAY_DB_PATH") {
        config.store_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Some(limit) = lookup("RELAY_HISTORY_LIMIT") {
        if let Ok(n) = limit.parse::<usize>() {
            config.orchestrator.history_limit = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(prompt) = lookup("RELAY_SYSTEM_PROMPT") {
        config.orchestrator.system_prompt = Some(prompt);
        config.source = ConfigSource::Env;
    }
    if let Some(policy) = lookup("RELAY_FINAL_TEXT_POLICY") {
        match policy.parse::<FinalTextPolicy>() {
            Ok(policy) => {
                config.orchestrator.final_text_policy = policy;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring RELAY_FINAL_TEXT_POLICY"),
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend kind override
    pub backend_kind: Option<BackendKind>,

    /// Endpoint override
    pub endpoint: Option<String>,

    /// Database path override
    pub store_path: Option<PathBuf>,

    /// Wire dialect override
    pub wire_dialect: Option<WireDialect>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend kind override
    #[must_use]
    pub fn with_backend_kind(mut self, kind: BackendKind) -> Self {
        self.backend_kind = Some(kind);
        self
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set database path override
    #[must_use]
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.store_path = Some(path);
        self
    }

    /// Set wire dialect override
    #[must_use]
    pub fn with_wire_dialect(mut self, dialect: WireDialect) -> Self {
        self.wire_dialect = Some(dialect);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RelayConfig) {
        if self.backend_kind.is_some()
            || self.endpoint.is_some()
            || self.store_path.is_some()
            || self.wire_dialect.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(kind) = self.backend_kind {
            config.backend.kind = kind;
        }
        if let Some(ref endpoint) = self.endpoint {
            config.backend.endpoint = Some(endpoint.clone());
        }
        if let Some(ref path) = self.store_path {
            config.store_path = path.clone();
        }
        if let Some(dialect) = self.wire_dialect {
            config.wire_dialect = dialect;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
