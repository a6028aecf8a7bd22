//! Lexicon Configuration Management
//!
//! Configuration is resolved through an explicit precedence chain:
//!
//! 1. explicit call-site overrides (command-line flags)
//! 2. persisted configuration: environment variables, then the TOML file
//! 3. built-in defaults
//!
//! Each layer only replaces the values it actually sets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// API key enforcement
    pub auth: AuthConfig,

    /// Tagging backend configuration
    pub model: ModelConfig,

    /// Cache and batching limits
    pub performance: PerformanceConfig,

    /// Title normalization knobs
    pub normalizer: NormalizerConfig,

    /// Remote language model configuration
    pub llm: LlmConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Resolve the full precedence chain
    ///
    /// `file` is read when given, otherwise the `CONFIG_FILE` environment
    /// variable is consulted. Environment variables are applied on top of the
    /// file and `overrides` on top of everything.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(file, overrides, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::resolve`] with an injectable environment lookup
    pub fn resolve_with<F>(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| lookup("CONFIG_FILE").map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(lookup)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Apply environment variables read through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", &port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Auth
        if let Some(required) = lookup("REQUIRE_API_KEY") {
            self.auth.require_api_key = parse_bool("REQUIRE_API_KEY", &required)?;
        }
        if let Some(key) = lookup("API_KEY") {
            self.auth.api_key = key;
        }

        // Tagging backend
        if let Some(kind) = lookup("NER_BACKEND") {
            self.model.backend = kind.parse()?;
        }
        if let Some(url) = lookup("NER_BACKEND_URL") {
            self.model.backend_url = Some(url);
        }
        if let Some(id) = lookup("MODEL_ID") {
            self.model.model_id = id;
        }

        // Performance
        if let Some(size) = lookup("CACHE_SIZE") {
            self.performance.cache_size = parse_value("CACHE_SIZE", &size)?;
        }
        if let Some(size) = lookup("MAX_BATCH_SIZE") {
            self.performance.max_batch_size = parse_value("MAX_BATCH_SIZE", &size)?;
        }
        if let Some(ms) = lookup("BATCH_WINDOW_MS") {
            self.performance.batch_window_ms = parse_value("BATCH_WINDOW_MS", &ms)?;
        }

        // Normalizer
        if let Some(path) = lookup("TITLE_RULES_PATH") {
            self.normalizer.rules_path = Some(PathBuf::from(path));
        }
        if let Some(window) = lookup("CONTEXT_WINDOW") {
            self.normalizer.context_window = parse_value("CONTEXT_WINDOW", &window)?;
        }

        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json_format = parse_bool("LOG_JSON", &json)?;
        }

        Ok(())
    }

    /// Apply explicit call-site overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(size) = overrides.cache_size {
            self.performance.cache_size = size;
        }
        if let Some(size) = overrides.max_batch_size {
            self.performance.max_batch_size = size;
        }
        if let Some(window) = overrides.context_window {
            self.normalizer.context_window = window;
        }
        if let Some(model) = &overrides.llm_model {
            self.llm.model = model.clone();
        }
        if let Some(required) = overrides.require_api_key {
            self.auth.require_api_key = required;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.performance.cache_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cache_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.performance.max_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.llm.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "llm.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.auth.require_api_key && self.auth.api_key.is_empty() {
            return Err(ConfigError::MissingRequired("API_KEY".to_string()));
        }
        if self.model.backend == TaggerKind::Http && self.model.backend_url.is_none() {
            return Err(ConfigError::MissingRequired("NER_BACKEND_URL".to_string()));
        }
        Ok(())
    }
}

/// Explicit call-site overrides, highest precedence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub cache_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub context_window: Option<usize>,
    pub llm_model: Option<String>,
    pub require_api_key: Option<bool>,
    pub port: Option<u16>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS (empty means any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 30,
            cors_origins: vec![],
        }
    }
}

/// API key enforcement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether compute endpoints require the `X-API-Key` header
    pub require_api_key: bool,

    /// Expected key
    pub api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_api_key: true,
            api_key: "lexicon-ner-default-key".to_string(),
        }
    }
}

/// Which tagging backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaggerKind {
    /// Built-in dictionary tagger
    Gazetteer,
    /// Remote model server speaking JSON over HTTP
    Http,
}

impl std::str::FromStr for TaggerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gazetteer" => Ok(Self::Gazetteer),
            "http" => Ok(Self::Http),
            _ => Err(ConfigError::InvalidValue {
                key: "NER_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Tagging backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Backend implementation
    pub backend: TaggerKind,

    /// Model server URL (http backend)
    pub backend_url: Option<String>,

    /// Model identifier used in fingerprints
    pub model_id: String,

    /// Texts shorter than this (in characters) yield no entities
    pub min_text_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: TaggerKind::Gazetteer,
            backend_url: None,
            model_id: "indonesian-ner".to_string(),
            min_text_length: 3,
        }
    }
}

/// Cache and batching limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum number of cached results
    pub cache_size: usize,

    /// Maximum texts per backend invocation
    pub max_batch_size: usize,

    /// Coalescing window for single requests (milliseconds)
    pub batch_window_ms: u64,

    /// Maximum texts waiting for the tagging backend
    pub queue_limit: usize,

    /// Maximum concurrent cache computations
    pub max_in_flight: usize,

    /// Maximum texts in one NER batch request
    pub max_ner_batch: usize,

    /// Maximum texts in one legal batch request
    pub max_legal_batch: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_size: 1000,
            max_batch_size: 32,
            batch_window_ms: 10,
            queue_limit: 1024,
            max_in_flight: 256,
            max_ner_batch: 100,
            max_legal_batch: 10,
        }
    }
}

/// Title normalization knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Raw tokens scanned before a person entity
    pub context_window: usize,

    /// Confidence penalty when tokens were dropped or split off
    pub title_penalty: f32,

    /// Replacement title rule table (TOML); built-in table when unset
    pub rules_path: Option<PathBuf>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            context_window: 3,
            title_penalty: 0.05,
            rules_path: None,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per extraction, including the first
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound for retry delays in milliseconds
    pub max_backoff_ms: u64,

    /// Concurrent remote calls
    pub max_concurrent_requests: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            max_concurrent_requests: 4,
        }
    }
}

impl LlmConfig {
    /// Whether legal extraction can run at all
    pub fn is_configured(&self) -> bool {
        match self.provider {
            LlmProvider::OpenAI | LlmProvider::Azure => self.openai_api_key.is_some(),
            LlmProvider::Ollama => true,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
