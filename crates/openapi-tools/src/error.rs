//! Error types for `r2r-openapi-tools`.

use r2r_http_client::ClientError;
use thiserror::Error;

/// Main error type for spec loading, classification and surface generation.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (malformed rule pattern, bad route map, invalid options).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad tool arguments or an unknown tool at call time.
    #[error("invalid tool call: {0}")]
    Runtime(String),

    /// `OpenAPI` errors (validation, unsupported constructs, hash mismatch).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// The OpenAPI document could not be fetched and no fallback copy was usable.
    #[error("OpenAPI document unavailable at '{url}' and no fallback: {message}")]
    SpecUnavailable { url: String, message: String },

    #[error("cannot read OpenAPI fallback '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed OpenAPI document from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// A parameter and a body property share a name.
    #[error("parameter collision: {0}")]
    ParamCollision(String),

    /// Outbound API call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
