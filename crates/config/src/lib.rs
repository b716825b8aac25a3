//! Configuration loading, validation, and management for statewright.
//!
//! Loads configuration from `~/.statewright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.statewright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Orchestration settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// State store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// HTTP tools connected to the engine
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("engine", &self.engine)
            .field("store", &self.store)
            .field("providers", &self.providers)
            .field("tools", &self.tools)
            .finish()
    }
}

/// How many model calls an interaction spends on state, tools, and response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// State (and response, when no tools are attached) in one combined call.
    #[default]
    Single,
    /// State, post-tool reconciliation, and response in separate calls.
    Double,
}

impl std::str::FromStr for PromptMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            other => Err(ConfigError::ValidationError(format!(
                "unknown prompt mode '{other}' (expected 'single' or 'double')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: PromptMode,

    /// Append every exchange to `conversation_history` in the stored state
    #[serde(default)]
    pub track_history: bool,

    /// Inline state model as a JSON object (field → description)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_model: Option<String>,

    /// State model loaded from a JSON file; ignored when `state_model` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_model_file: Option<PathBuf>,

    /// System prompt for the plain-response path
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Iteration cap for the plain-response tool-calling loop
    #[serde(default = "default_max_agent_iterations")]
    pub max_agent_iterations: u32,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_max_agent_iterations() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::default(),
            track_history: false,
            state_model: None,
            state_model_file: None,
            system_prompt: default_system_prompt(),
            max_agent_iterations: default_max_agent_iterations(),
        }
    }
}

impl EngineConfig {
    /// The raw state model JSON text, if one is configured.
    pub fn state_model_source(&self) -> Result<Option<String>, ConfigError> {
        if let Some(inline) = &self.state_model {
            return Ok(Some(inline.clone()));
        }
        match &self.state_model_file {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| ConfigError::ReadError {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory (file backend) or database file (sqlite backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The configured path, or the backend's default under the config dir.
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, StoreBackend::Sqlite) => AppConfig::config_dir().join("state.db"),
            (None, _) => AppConfig::config_dir().join("sessions"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// An external HTTP endpoint exposed to the model as a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,

    pub description: String,

    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_method() -> String {
    "POST".into()
}
fn default_tool_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from the default path (~/.statewright/config.toml).
    ///
    /// Also checks environment variables:
    /// - `STATEWRIGHT_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `STATEWRIGHT_PROVIDER`, `STATEWRIGHT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("STATEWRIGHT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("STATEWRIGHT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("STATEWRIGHT_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".statewright")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.engine.max_agent_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_agent_iterations must be at least 1".into(),
            ));
        }

        if let Some(inline) = &self.engine.state_model {
            serde_json::from_str::<serde_json::Value>(inline).map_err(|e| {
                ConfigError::ValidationError(format!("engine.state_model is not valid JSON: {e}"))
            })?;
        }

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("tool name must not be empty".into()));
            }
            if !seen.insert(tool.name.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
            if !tool.url.starts_with("http://") && !tool.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' url must start with http:// or https://",
                    tool.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            providers: HashMap::new(),
            tools: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.engine.mode, PromptMode::Single);
        assert_eq!(config.engine.max_agent_iterations, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.store.backend, config.store.backend);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_state_model_json_rejected() {
        let err = AppConfig::from_toml(
            r#"
[engine]
state_model = "{ not json"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("state_model"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn engine_and_tools_parse() {
        let config = AppConfig::from_toml(
            r#"
[engine]
mode = "double"
track_history = true
state_model = '{"destination": "Travel destination"}'

[store]
backend = "sqlite"
path = "/tmp/state.db"

[[tools]]
name = "Weather API"
description = "Current weather for a location"
url = "https://weather.example.com/lookup"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.mode, PromptMode::Double);
        assert!(config.engine.track_history);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.resolved_path(), PathBuf::from("/tmp/state.db"));
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools[0].method, "POST");
        assert_eq!(config.tools[0].timeout_secs, 30);
        assert_eq!(
            config.engine.state_model_source().unwrap().as_deref(),
            Some(r#"{"destination": "Travel destination"}"#)
        );
    }

    #[test]
    fn duplicate_tool_names_rejected_case_insensitively() {
        let err = AppConfig::from_toml(
            r#"
[[tools]]
name = "Search"
description = "a"
url = "https://a.example.com"

[[tools]]
name = "search"
description = "b"
url = "https://b.example.com"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn state_model_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"budget": "Trip budget"}"#).unwrap();
        let engine = EngineConfig {
            state_model_file: Some(file.path().to_path_buf()),
            ..EngineConfig::default()
        };
        assert!(engine.state_model_source().unwrap().unwrap().contains("budget"));
    }

    #[test]
    fn prompt_mode_from_str() {
        assert_eq!("Double".parse::<PromptMode>().unwrap(), PromptMode::Double);
        assert!("triple".parse::<PromptMode>().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
