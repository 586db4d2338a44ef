use eislager_core::{
    builtin_rules, AuditPolicy, ResourceClassifier, ResourceRule, RouteEntry, RouteError,
    RouteTable,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "eislager.toml";
pub const CONFIG_PATH_ENV: &str = "EISLAGER_CONFIG";
pub const LISTEN_ENV: &str = "EISLAGER_LISTEN";
pub const UPSTREAM_TIMEOUT_ENV: &str = "EISLAGER_UPSTREAM_TIMEOUT_MS";
pub const AUDIT_PATH_ENV: &str = "EISLAGER_AUDIT_PATH";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub store: AuditStoreConfig,
    #[serde(flatten)]
    pub policy: AuditPolicy,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "builtin_rules")]
    pub resources: Vec<ResourceRule>,
    /// Largest JSON response body captured into `new_values`.
    #[serde(default = "default_capture_limit_bytes")]
    pub capture_limit_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditStoreConfig {
    Memory,
    File { path: PathBuf },
    #[default]
    Tracing,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format for {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),
    #[error("invalid route table: {0}")]
    Route(#[from] RouteError),
    #[error("{0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_capture_limit_bytes() -> usize {
    64 * 1024
}

fn default_tags() -> Vec<String> {
    vec!["gateway".to_string()]
}

pub fn default_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("/api/v1/auth", "http://localhost:3002"),
        RouteEntry::new("/api/v1/admin", "http://localhost:3001"),
        RouteEntry::new("/api/v1/inventory", "http://localhost:3003"),
        RouteEntry::new("/api/v1/sales", "http://localhost:3004"),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: AuditStoreConfig::default(),
            policy: AuditPolicy::default(),
            tags: default_tags(),
            resources: builtin_rules(),
            capture_limit_bytes: default_capture_limit_bytes(),
        }
    }
}

impl AuditConfig {
    pub fn classifier(&self) -> ResourceClassifier {
        ResourceClassifier::new(self.resources.clone())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            routes: default_routes(),
            audit: AuditConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&raw)?,
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Loads `path` when given, otherwise falls back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route_table()?;
        self.listen_addr()?;

        if self.server.upstream_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.upstream_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if let AuditStoreConfig::File { path } = &self.audit.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "audit.store.path must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        Ok(RouteTable::new(self.routes.clone())?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|err| {
            ConfigError::Invalid(format!(
                "server.listen {:?} is not a socket address: {err}",
                self.server.listen
            ))
        })
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup(LISTEN_ENV).filter(|value| !value.trim().is_empty()) {
            self.server.listen = listen.trim().to_string();
        }
        if let Some(timeout) = lookup(UPSTREAM_TIMEOUT_ENV).and_then(|value| value.parse().ok()) {
            self.server.upstream_timeout_ms = timeout;
        }
        if let Some(path) = lookup(AUDIT_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            self.audit.store = AuditStoreConfig::File {
                path: PathBuf::from(path),
            };
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Picks the config file: explicit path, then `EISLAGER_CONFIG`, then
/// `eislager.toml` in the working directory if it exists.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    if let Some(from_env) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(from_env));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}
