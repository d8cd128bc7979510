use crate::error::{OpenApiToolsError, Result};
use crate::routes::ComponentRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Where the `OpenAPI` document comes from.
#[derive(Debug, Clone)]
pub struct SpecSource {
    /// Remote spec URL, fetched without credentials.
    pub url: String,
    /// Local copy used when the remote fetch fails.
    pub fallback_path: Option<PathBuf>,
    /// Rewrite `fallback_path` with the remote document after a successful fetch.
    pub refresh_fallback: bool,
    /// Expected SHA-256 (hex) of the document text.
    pub spec_hash: Option<String>,
    pub spec_hash_policy: HashPolicy,
}

impl SpecSource {
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fallback_path: None,
            refresh_fallback: false,
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail startup if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

/// One entry of a route map file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteRuleConfig {
    pub methods: Vec<String>,
    pub pattern: String,
    pub role: ComponentRole,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Route map file: an ordered list of rules, first match wins.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RouteMapFile {
    pub rules: Vec<RouteRuleConfig>,
}

/// Load a YAML (or JSON) route map.
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or parsed.
pub fn load_route_map(path: &Path) -> Result<Vec<RouteRuleConfig>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        OpenApiToolsError::Config(format!("failed to read route map '{}': {e}", path.display()))
    })?;
    let file: RouteMapFile = serde_yaml::from_str(&text).map_err(|e| {
        OpenApiToolsError::Config(format!("invalid route map '{}': {e}", path.display()))
    })?;
    if file.rules.is_empty() {
        return Err(OpenApiToolsError::Config(format!(
            "route map '{}' declares no rules",
            path.display()
        )));
    }
    Ok(file.rules)
}

/// Knobs for surface generation.
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    /// Prefix for generated resource URIs (`{prefix}{path}`).
    pub resource_uri_prefix: String,
    /// Glob patterns over `"METHOD /path"`; empty means everything.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Tool names already taken by hand-written tools.
    pub reserved_tool_names: HashSet<String>,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            resource_uri_prefix: "r2r://api".to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
            reserved_tool_names: HashSet::new(),
        }
    }
}
