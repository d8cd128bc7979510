//! `OpenAPI` document loading: remote fetch, local fallback, hash pinning, validation.

use crate::config::{HashPolicy, SpecSource};
use crate::error::{OpenApiToolsError, Result};
use openapiv3::OpenAPI;
use r2r_http_client::error::sanitize_reqwest_error;
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a loaded document actually came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecOrigin {
    Remote(String),
    Fallback(PathBuf),
}

impl fmt::Display for SpecOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "remote {url}"),
            Self::Fallback(path) => write!(f, "fallback file {}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: OpenAPI,
    /// The raw document, kept for `$ref` resolution.
    pub document: Value,
    pub origin: SpecOrigin,
    /// `sha256:<hex>` of the document text.
    pub sha256: String,
}

impl LoadedSpec {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.spec.info.title
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.spec.info.version
    }

    #[must_use]
    pub fn openapi_version(&self) -> &str {
        &self.spec.openapi
    }

    #[must_use]
    pub fn path_count(&self) -> usize {
        self.spec.paths.paths.len()
    }
}

#[derive(Debug, Clone)]
pub struct SpecLoader {
    client: reqwest::Client,
}

impl SpecLoader {
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpenApiToolsError::Config(sanitize_reqwest_error(&e)))?;
        Ok(Self { client })
    }

    /// Fetch the document, falling back to the local copy on transport failure.
    ///
    /// A document that is fetched but invalid is a configuration error; it never falls through
    /// to the fallback file.
    ///
    /// # Errors
    ///
    /// `SpecUnavailable` when neither source is usable, `SpecParse`/`OpenApi` for invalid
    /// documents or a hash mismatch under [`HashPolicy::Fail`].
    pub async fn load(&self, source: &SpecSource) -> Result<LoadedSpec> {
        tracing::info!(url = %source.url, "fetching OpenAPI spec");

        let (text, origin) = match self.fetch(&source.url).await {
            Ok(text) => {
                if source.refresh_fallback
                    && let Some(path) = &source.fallback_path
                {
                    refresh_fallback(path, &text);
                }
                (text, SpecOrigin::Remote(source.url.clone()))
            }
            Err(message) => match &source.fallback_path {
                Some(path) if path.is_file() => {
                    tracing::warn!(
                        url = %source.url,
                        fallback = %path.display(),
                        error = %message,
                        "OpenAPI spec fetch failed; using local fallback"
                    );
                    let text = std::fs::read_to_string(path).map_err(|e| {
                        OpenApiToolsError::SpecReadFile {
                            path: path.display().to_string(),
                            source: e,
                        }
                    })?;
                    (text, SpecOrigin::Fallback(path.clone()))
                }
                Some(path) => {
                    return Err(OpenApiToolsError::SpecUnavailable {
                        url: source.url.clone(),
                        message: format!("{message} (no fallback file at '{}')", path.display()),
                    });
                }
                None => {
                    return Err(OpenApiToolsError::SpecUnavailable {
                        url: source.url.clone(),
                        message: format!("{message} (no fallback configured)"),
                    });
                }
            },
        };

        let sha256 = format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())));
        verify_hash(source, &sha256)?;

        let location = match &origin {
            SpecOrigin::Remote(url) => url.clone(),
            SpecOrigin::Fallback(path) => path.display().to_string(),
        };
        let (document, spec) = parse_document(&text, &location)?;

        tracing::info!(
            title = %spec.info.title,
            version = %spec.info.version,
            openapi = %spec.openapi,
            paths = spec.paths.paths.len(),
            origin = %origin,
            "loaded OpenAPI spec"
        );

        Ok(LoadedSpec {
            spec,
            document,
            origin,
            sha256,
        })
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| sanitize_reqwest_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("server returned {status}"));
        }
        resp.text().await.map_err(|e| sanitize_reqwest_error(&e))
    }
}

fn refresh_fallback(path: &Path, text: &str) {
    match std::fs::write(path, text) {
        Ok(()) => tracing::info!(path = %path.display(), "refreshed local OpenAPI fallback"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to refresh local OpenAPI fallback"
        ),
    }
}

fn verify_hash(source: &SpecSource, actual: &str) -> Result<()> {
    let Some(expected) = &source.spec_hash else {
        return Ok(());
    };
    let expected_hex = expected.trim().trim_start_matches("sha256:").to_ascii_lowercase();
    if actual.trim_start_matches("sha256:") == expected_hex {
        return Ok(());
    }
    match source.spec_hash_policy {
        HashPolicy::Fail => Err(OpenApiToolsError::OpenApi(format!(
            "Spec hash mismatch. Expected: sha256:{expected_hex}, Got: {actual}"
        ))),
        HashPolicy::Warn => {
            tracing::warn!(
                expected = %format!("sha256:{expected_hex}"),
                actual = %actual,
                "OpenAPI spec hash mismatch"
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

/// Parse and validate a JSON or YAML document.
///
/// # Errors
///
/// Returns `SpecParse` if the text is not a mapping with an `openapi: 3.x` field or does not
/// deserialize as `OpenAPI` 3.
pub fn parse_document(text: &str, location: &str) -> Result<(Value, OpenAPI)> {
    let parse_err = |message: String| OpenApiToolsError::SpecParse {
        location: location.to_string(),
        message,
    };

    // JSON is a subset of YAML, so serde_yaml handles both.
    let document: Value = serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?;
    let Some(obj) = document.as_object() else {
        return Err(parse_err("document is not a mapping".to_string()));
    };
    match obj.get("openapi").and_then(Value::as_str) {
        None => return Err(parse_err("missing 'openapi' version field".to_string())),
        Some(v) if !v.starts_with("3.") => {
            return Err(parse_err(format!("unsupported OpenAPI version '{v}'")));
        }
        Some(_) => {}
    }

    let spec: OpenAPI =
        serde_json::from_value(document.clone()).map_err(|e| parse_err(e.to_string()))?;
    Ok((document, spec))
}
