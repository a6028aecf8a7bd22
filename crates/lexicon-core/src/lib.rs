//! Lexicon Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout Lexicon:
//! - Raw tagger output (spans with BIO labels) and normalized entities
//! - Legal role taxonomy
//! - Common error types
//! - Shared traits for the tagging backend and the remote language model
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, AuthConfig, ConfigError, ConfigOverrides, LlmConfig, LlmProvider, LoggingConfig,
    ModelConfig, NormalizerConfig, PerformanceConfig, ServerConfig, TaggerKind,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Lexicon operations
///
/// The enum is `Clone` because a single failed computation is fanned out to
/// every caller waiting on the same fingerprint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexiconError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tagging backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Remote model error: {0}")]
    RemoteModel(String),

    #[error("Remote model failed after {attempts} attempts: {last_error}")]
    RemoteModelExhausted { attempts: u32, last_error: String },

    #[error("Remote model not configured: {0}")]
    RemoteModelUnconfigured(String),

    #[error("Shared computation failed: {0}")]
    CacheCompute(String),

    #[error("Service overloaded: {0}")]
    Overloaded(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LexiconError>;

// ============================================================================
// Entity Types
// ============================================================================

/// Entity types produced by the tagging backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "LOC")]
    Location,
    #[serde(rename = "ORG")]
    Organization,
}

impl EntityType {
    /// Get the short tag used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PER",
            Self::Location => "LOC",
            Self::Organization => "ORG",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = LexiconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => Ok(Self::Person),
            "LOC" | "LOCATION" | "GPE" => Ok(Self::Location),
            "ORG" | "ORGANIZATION" | "ORGANISATION" => Ok(Self::Organization),
            _ => Err(LexiconError::Validation(format!("unknown entity type: {s}"))),
        }
    }
}

// ============================================================================
// Raw Tagger Output
// ============================================================================

/// Position of a token inside an entity, in BIO convention
///
/// `S-` (single) and `E-` (end) labels from BIOES taggers are read as
/// begin and inside tags respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpanLabel {
    Begin(EntityType),
    Inside(EntityType),
    Outside,
}

impl SpanLabel {
    /// Entity type carried by the label, `None` for outside tokens
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Self::Begin(t) | Self::Inside(t) => Some(*t),
            Self::Outside => None,
        }
    }
}

impl std::fmt::Display for SpanLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin(t) => write!(f, "B-{t}"),
            Self::Inside(t) => write!(f, "I-{t}"),
            Self::Outside => write!(f, "O"),
        }
    }
}

impl std::str::FromStr for SpanLabel {
    type Err = LexiconError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "O" {
            return Ok(Self::Outside);
        }
        let (prefix, tag) = s
            .split_once('-')
            .ok_or_else(|| LexiconError::Validation(format!("malformed span label: {s}")))?;
        let entity_type = tag.parse()?;
        match prefix {
            "B" | "S" => Ok(Self::Begin(entity_type)),
            "I" | "E" => Ok(Self::Inside(entity_type)),
            _ => Err(LexiconError::Validation(format!("malformed span label: {s}"))),
        }
    }
}

impl TryFrom<String> for SpanLabel {
    type Error = LexiconError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SpanLabel> for String {
    fn from(label: SpanLabel) -> Self {
        label.to_string()
    }
}

/// One backend-tagged token
///
/// Offsets are UTF-8 byte offsets into the tagged text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// Raw token text
    pub text: String,
    /// BIO label
    pub label: SpanLabel,
    /// Per-token score in [0, 1]
    pub score: f32,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        text: impl Into<String>,
        label: SpanLabel,
        score: f32,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            label,
            score,
        }
    }

    /// Whether the offsets address a valid slice of `source`
    pub fn is_within(&self, source: &str) -> bool {
        self.start < self.end
            && self.end <= source.len()
            && source.is_char_boundary(self.start)
            && source.is_char_boundary(self.end)
    }
}

// ============================================================================
// Normalized Entities
// ============================================================================

/// Role of a person in a legal text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegalRole {
    Defendant,
    Plaintiff,
    Representative,
}

impl LegalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defendant => "defendant",
            Self::Plaintiff => "plaintiff",
            Self::Representative => "representative",
        }
    }

    /// All roles in the fixed taxonomy
    pub fn all() -> [LegalRole; 3] {
        [Self::Defendant, Self::Plaintiff, Self::Representative]
    }
}

impl std::fmt::Display for LegalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A merged, normalized, user-facing recognition result
///
/// Entities are rebuilt rather than patched; offsets are UTF-8 byte offsets
/// into the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity text, always `source[start..end]`
    pub text: String,
    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// Aggregated confidence in [0, 1]
    pub confidence: f32,
    /// Legal role, only set by legal extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<LegalRole>,
}

impl Entity {
    /// Build an entity from a slice of the source text
    pub fn from_source(
        source: &str,
        entity_type: EntityType,
        start: usize,
        end: usize,
        confidence: f32,
    ) -> Self {
        Self {
            text: source[start..end].to_string(),
            entity_type,
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
            role: None,
        }
    }

    /// Set the legal role
    pub fn with_role(mut self, role: Option<LegalRole>) -> Self {
        self.role = role;
        self
    }

    /// Whether two entities share at least one byte
    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Convert a UTF-8 byte offset into a character offset
pub fn char_offset(text: &str, byte_offset: usize) -> usize {
    let byte_offset = byte_offset.min(text.len());
    text.char_indices()
        .take_while(|(idx, _)| *idx < byte_offset)
        .count()
}

// ============================================================================
// Traits
// ============================================================================

/// Sequence tagging backend (the local NER model)
#[async_trait::async_trait]
pub trait TaggingBackend: Send + Sync {
    /// Tag a single text
    async fn tag(&self, text: &str) -> Result<Vec<Span>>;

    /// Tag several texts in one invocation, results aligned with `texts`
    async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<Span>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.tag(text).await?);
        }
        Ok(results)
    }

    /// Model identifier, part of every request fingerprint
    fn model_id(&self) -> &str;

    /// Whether the model is loaded and able to serve
    fn is_ready(&self) -> bool {
        true
    }
}

/// Request sent to a remote generative model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction
    pub system: String,
    /// User prompt
    pub prompt: String,
    /// JSON schema the response must follow, if the provider supports it
    pub schema: Option<serde_json::Value>,
}

/// Failure reported by a remote model adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionFailure {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl CompletionFailure {
    /// Transient failures are worth retrying; rejections are not
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Remote generative model adapter
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion and return the raw message content
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionFailure>;

    /// Model name, part of every legal-role fingerprint
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
