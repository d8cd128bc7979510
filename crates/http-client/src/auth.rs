//! Request-time bearer credential injection.
//!
//! The token is looked up every time a request is decorated, never at construction. Some hosting
//! platforms start the process before they inject environment variables, so a token captured at
//! startup would stay stale for the life of the process.

use parking_lot::RwLock;
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::fmt;
use std::sync::Arc;

/// Environment variable read by [`EnvCredentialSource::default`].
pub const DEFAULT_API_KEY_ENV: &str = "R2R_API_KEY";

/// Supplies the bearer token for the next outbound request.
pub trait CredentialSource: Send + Sync {
    /// Current token. `None` when absent or empty.
    fn current_token(&self) -> Option<String>;

    /// Human-readable name of the source, used in diagnostics.
    fn describe(&self) -> String {
        "credential".to_string()
    }
}

/// Reads the token from a process environment variable on every call. The value is sent as is;
/// only an empty variable counts as unset.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    var: String,
}

impl EnvCredentialSource {
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvCredentialSource {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_ENV)
    }
}

impl CredentialSource for EnvCredentialSource {
    fn current_token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }

    fn describe(&self) -> String {
        self.var.clone()
    }
}

/// An in-memory token slot. Clones share the slot, so updates are seen by every holder.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl CredentialSource for SharedCredential {
    fn current_token(&self) -> Option<String> {
        self.token.read().clone().filter(|v| !v.is_empty())
    }

    fn describe(&self) -> String {
        "shared credential".to_string()
    }
}

/// Mask a token for logging: first 8 and last 4 characters, or `***` for short tokens.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Attaches `Authorization: Bearer <token>` to outbound requests.
#[derive(Clone)]
pub struct BearerAuth {
    source: Arc<dyn CredentialSource>,
    debug: bool,
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("source", &self.source.describe())
            .field("debug", &self.debug)
            .finish()
    }
}

impl BearerAuth {
    #[must_use]
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            debug: false,
        }
    }

    #[must_use]
    pub fn from_env(var: impl Into<String>) -> Self {
        Self::new(Arc::new(EnvCredentialSource::new(var)))
    }

    /// Emit a masked debug entry for every decorated request.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// Whether a token is available right now.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.source.current_token().is_some()
    }

    /// Masked form of the current token, if any.
    #[must_use]
    pub fn masked_token(&self) -> Option<String> {
        self.source.current_token().as_deref().map(mask_token)
    }

    /// Attach the current token to `request`.
    ///
    /// Without a token the request is returned unchanged and exactly one warning is logged. The
    /// API's 401 is left for the caller to observe.
    #[must_use]
    pub fn decorate(&self, mut request: Request) -> Request {
        let Some(token) = self.source.current_token() else {
            tracing::warn!(
                method = %request.method(),
                path = request.url().path(),
                source = %self.source.describe(),
                "API key not set; sending request without Authorization header"
            );
            return request;
        };

        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                if self.debug {
                    tracing::debug!(
                        method = %request.method(),
                        path = request.url().path(),
                        key = %mask_token(&token),
                        "attached bearer credential"
                    );
                }
            }
            Err(_) => {
                tracing::warn!(
                    method = %request.method(),
                    path = request.url().path(),
                    source = %self.source.describe(),
                    "API key is not a valid header value; sending request without Authorization header"
                );
            }
        }
        request
    }
}
