//! Request and response models for the R2R v3 API.
//!
//! Response types are lenient: unknown fields are ignored and most fields default, since the
//! server's payloads grow between releases.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Vanilla,
    Hyde,
    RagFusion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_hybrid_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_semantic_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_fulltext_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_strategy: Option<SearchStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    /// Settings this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_settings: SearchSettings,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            search_settings: SearchSettings {
                limit: Some(limit),
                ..SearchSettings::default()
            },
        }
    }

    #[must_use]
    pub fn with_hybrid(mut self, hybrid: bool) -> Self {
        self.search_settings.use_hybrid_search = Some(hybrid);
        self
    }

    #[must_use]
    pub fn with_semantic(mut self, semantic: bool) -> Self {
        self.search_settings.use_semantic_search = Some(semantic);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.search_settings.search_strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Value) -> Self {
        self.search_settings.filters = Some(filters);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRequest {
    pub query: String,
    pub rag_generation_config: RagGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_settings: Option<SearchSettings>,
}

impl RagRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            query: query.into(),
            rag_generation_config: RagGenerationConfig {
                max_tokens: Some(max_tokens),
                ..RagGenerationConfig::default()
            },
            search_settings: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Rag,
    Research,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub message: AgentMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub mode: AgentMode,
    pub rag_generation_config: RagGenerationConfig,
}

impl AgentRequest {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            message: AgentMessage {
                role: MessageRole::User,
                content: content.into(),
            },
            conversation_id: None,
            mode: AgentMode::default(),
            rag_generation_config: RagGenerationConfig::default(),
        }
    }
}

/// One chunk hit from `/v3/retrieval/search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub metadata: Value,
    /// Chunk fields this crate does not model (`owner_id`, `collection_ids`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate search result. R2R sends unused result lists as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    #[serde(deserialize_with = "null_as_default")]
    pub chunk_search_results: Vec<ChunkResult>,
    #[serde(deserialize_with = "null_as_default")]
    pub graph_search_results: Vec<Value>,
    /// Result kinds this crate does not model (`document_search_results`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `{"results": ...}` envelope used by every v3 endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub results: T,
}

pub type SearchResponse = Envelope<SearchResults>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Citation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagAnswer {
    #[serde(alias = "answer")]
    pub generated_answer: String,
    #[serde(deserialize_with = "null_as_default")]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_results: Option<SearchResults>,
}

pub type RagResponse = Envelope<RagAnswer>;
