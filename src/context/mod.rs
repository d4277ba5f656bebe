//! Client contexts: which clusterdeck server the CLI talks to, and as whom.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port `clusterdeck serve` listens on by default
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Name of the built-in context pointing at a server on this machine
pub const LOCAL_CONTEXT: &str = "local";

/// Default config file location: ~/.clusterdeck/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clusterdeck")
        .join("config")
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("Context '{0}' is built in and cannot be changed")]
    BuiltIn(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A clusterdeck server the CLI can target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    /// Base URL of the server (e.g. "https://deck.example.com")
    pub url: String,
    /// Value sent in the Authorization header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Cluster selected when `--cluster` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The complete configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(rename = "current-context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,

    #[serde(default)]
    pub local: LocalConfig,
}

/// Settings behind the built-in `local` context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            token: None,
        }
    }
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add or update a context in the config
pub fn add_context(config: &mut Config, context: Context) -> Result<(), ContextError> {
    if context.name == LOCAL_CONTEXT {
        return Err(ContextError::BuiltIn(context.name));
    }
    config.contexts.insert(context.name.clone(), context);
    Ok(())
}

/// Remove a context, clearing it as current if it was selected
pub fn remove_context(config: &mut Config, name: &str) -> Result<Context, ContextError> {
    let removed = config
        .contexts
        .remove(name)
        .ok_or_else(|| ContextError::ContextNotFound(name.to_string()))?;
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    Ok(removed)
}

pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if !config.contexts.contains_key(name) && name != LOCAL_CONTEXT {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

/// Context names, the built-in `local` first
pub fn list_contexts(config: &Config) -> Vec<&str> {
    std::iter::once(LOCAL_CONTEXT)
        .chain(config.contexts.keys().map(String::as_str))
        .collect()
}

impl Config {
    /// Name of the selected context; `local` when none is set
    pub fn current_name(&self) -> &str {
        self.current_context.as_deref().unwrap_or(LOCAL_CONTEXT)
    }

    /// Resolve the selected context, synthesizing `local` from [`LocalConfig`]
    pub fn current(&self) -> Result<Context, ContextError> {
        match self.current_name() {
            LOCAL_CONTEXT => Ok(Context {
                name: LOCAL_CONTEXT.to_string(),
                url: format!("http://localhost:{}", self.local.port),
                token: self.local.token.clone(),
                cluster: None,
                description: Some("clusterdeck on this machine".to_string()),
            }),
            name => self
                .contexts
                .get(name)
                .cloned()
                .ok_or_else(|| ContextError::ContextNotFound(name.to_string())),
        }
    }
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a path; a missing file is an empty config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

impl Context {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            token: None,
            cluster: None,
            description: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}
