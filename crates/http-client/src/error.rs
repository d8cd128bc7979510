//! Error types for `r2r-http-client`.

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client configuration (bad base URL, bad path).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-level failure: connect, timeout, TLS, redirect loop.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// The API answered with a non-2xx status. Status and body are passed through unmodified.
    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status for `Status` errors.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            return Self::Config(sanitize_reqwest_error(&e));
        }
        if e.is_decode() {
            return Self::Decode(sanitize_reqwest_error(&e));
        }
        Self::Transport(sanitize_reqwest_error(&e))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Render a URL without userinfo, query or fragment.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// `reqwest` error text with the request URL redacted.
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let msg = e.to_string();
    match e.url() {
        Some(u) => msg.replace(u.as_str(), &redact_url(u)),
        None => msg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_strips_credentials_and_query() {
        let url = Url::parse("https://user:pw@r2r.example.com/v3/search?api_key=secret#frag")
            .expect("url");
        assert_eq!(redact_url(&url), "https://r2r.example.com/v3/search");
    }

    #[test]
    fn status_error_passes_body_through() {
        let err = ClientError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: r#"{"detail":"Invalid token"}"#.to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            err.to_string(),
            r#"API returned 401 Unauthorized: {"detail":"Invalid token"}"#
        );
    }
}
