use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Runtime settings, read from `cloudquote.toml` and `CLOUDQUOTE_*` variables.
///
/// Every section falls back to its defaults, so a file only needs the keys it changes.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    #[serde(deserialize_with = "secret")]
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub backend: SessionBackend,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// TOML catalog to load instead of the built-in services.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    #[default]
    Ollama,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Values set programmatically; these win over the file and the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub session_backend: Option<SessionBackend>,
    pub catalog_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Explicit config file; otherwise `cloudquote.toml` then `config/cloudquote.toml` are tried.
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://cloudquote.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: None,
            model: "llama3.1".to_string(),
            timeout_secs: 12,
            max_retries: 1,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl LlmProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

impl LlmConfig {
    /// Configured endpoint, or the provider's public default.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for SessionBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session backend `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file, then `CLOUDQUOTE_*` variables, then `options.overrides`.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_file(&path)?,
            None => Self::default(),
        };

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    // Deployment knobs only; tuning values (timeouts, pool size, retries) live in the file.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env("CLOUDQUOTE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(backend) = read_env("CLOUDQUOTE_SESSIONS_BACKEND") {
            self.sessions.backend = backend.parse()?;
        }
        if let Some(path) = read_env("CLOUDQUOTE_CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(path));
        }

        if let Some(provider) = read_env("CLOUDQUOTE_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(api_key) = read_env("CLOUDQUOTE_LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::from(api_key));
        }
        if let Some(base_url) = read_env("CLOUDQUOTE_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(model) = read_env("CLOUDQUOTE_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(port) = read_env("CLOUDQUOTE_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "CLOUDQUOTE_SERVER_PORT".to_string(),
                value: port,
            })?;
        }
        if let Some(level) = read_env("CLOUDQUOTE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("CLOUDQUOTE_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(backend) = overrides.session_backend {
            self.sessions.backend = backend;
        }
        if let Some(path) = overrides.catalog_path {
            self.catalog.path = Some(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_catalog(&self.catalog)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cloudquote.toml"), PathBuf::from("config/cloudquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 60 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=60".to_string()));
    }

    if llm.max_retries > 3 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 3".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let needs_key = matches!(llm.provider, LlmProvider::OpenAi | LlmProvider::Anthropic);
    let has_key = llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
    if needs_key && !has_key {
        return Err(ConfigError::Validation(
            "llm.api_key is required for openai/anthropic providers".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    match &catalog.path {
        Some(path) if !path.exists() => Err(ConfigError::Validation(format!(
            "catalog.path `{}` does not exist",
            path.display()
        ))),
        _ => Ok(()),
    }
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
