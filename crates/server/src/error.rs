//! Error types for the MCP server.

use r2r_http_client::ClientError;
use r2r_openapi_tools::OpenApiToolsError;
use rmcp::ErrorData as McpError;
use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (bad flags, missing credential in strict mode)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid arguments to a built-in tool, prompt or resource
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The client could not complete a sampling request
    #[error("Sampling error: {0}")]
    Sampling(String),

    /// A pipeline step failed
    #[error("Pipeline step '{step}' failed: {message}")]
    Pipeline { step: String, message: String },

    /// Spec loading and surface generation
    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),

    /// Outbound API call failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ServerError> for McpError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::InvalidArguments(_) | ServerError::OpenApi(OpenApiToolsError::Runtime(_)) => {
                McpError::invalid_params(e.to_string(), None)
            }
            _ => McpError::internal_error(e.to_string(), None),
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
