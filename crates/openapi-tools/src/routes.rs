//! Route classification: which MCP component kind an HTTP endpoint becomes.
//!
//! Rules are evaluated in declared order and the first rule whose method set and path pattern both
//! match decides the role. Endpoints no rule matches are not exposed.

use crate::config::RouteRuleConfig;
use crate::error::{OpenApiToolsError, Result};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The MCP component kind an endpoint is surfaced as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentRole {
    /// Read with path parameters: an MCP resource template.
    ParameterizedResource,
    /// Parameterless read: a plain MCP resource.
    StaticResource,
    /// Mutating operation: an MCP tool.
    Tool,
}

impl ComponentRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParameterizedResource => "parameterized_resource",
            Self::StaticResource => "static_resource",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An endpoint as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub has_path_params: bool,
}

impl Endpoint {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let has_path_params = path.contains('{') && path.contains('}');
        Self {
            method,
            path,
            has_path_params,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A (method set, anchored path pattern, role) triple.
#[derive(Debug, Clone)]
pub struct RouteRule {
    methods: Vec<Method>,
    pattern: String,
    regex: Regex,
    role: ComponentRole,
    tags: BTreeSet<String>,
    description: Option<String>,
}

impl RouteRule {
    /// Build a rule. The pattern must match the whole path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or invalid method set, or a pattern that does
    /// not compile.
    pub fn new<I, M>(methods: I, pattern: &str, role: ComponentRole) -> Result<Self>
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let methods = methods
            .into_iter()
            .map(|m| parse_method(m.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if methods.is_empty() {
            return Err(OpenApiToolsError::Config(format!(
                "route rule '{pattern}' has no methods"
            )));
        }

        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            OpenApiToolsError::Config(format!("invalid route pattern '{pattern}': {e}"))
        })?;

        Ok(Self {
            methods,
            pattern: pattern.to_string(),
            regex,
            role,
            tags: BTreeSet::new(),
            description: None,
        })
    }

    /// # Errors
    ///
    /// As [`RouteRule::new`].
    pub fn from_config(cfg: &RouteRuleConfig) -> Result<Self> {
        let mut rule = Self::new(&cfg.methods, &cfg.pattern, cfg.role)?
            .with_tags(cfg.tags.iter().cloned());
        rule.description.clone_from(&cfg.description);
        Ok(rule)
    }

    #[must_use]
    pub fn with_tags<T: Into<String>>(mut self, tags: impl IntoIterator<Item = T>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        self.methods.contains(&endpoint.method) && self.regex.is_match(&endpoint.path)
    }

    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn role(&self) -> ComponentRole {
        self.role
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(OpenApiToolsError::Config(
            "route rule method must not be empty".to_string(),
        ));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| OpenApiToolsError::Config(format!("invalid HTTP method '{raw}'")))
}

/// Ordered rule list. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<RouteRule>,
}

impl RouteClassifier {
    #[must_use]
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// # Errors
    ///
    /// Returns the first rule construction error.
    pub fn from_configs(configs: &[RouteRuleConfig]) -> Result<Self> {
        configs
            .iter()
            .map(RouteRule::from_config)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// The bundled three-tier policy:
    ///
    /// 1. `GET` with a `{param}` anywhere in the path: parameterized resource
    /// 2. remaining `GET`: static resource
    /// 3. `POST`/`PUT`/`PATCH`/`DELETE`: tool
    ///
    /// Anything else (`HEAD`, `OPTIONS`, ...) is left unexposed.
    ///
    /// # Errors
    ///
    /// Never in practice; the patterns are fixed.
    pub fn bundled() -> Result<Self> {
        Ok(Self::new(vec![
            RouteRule::new(["GET"], r".*\{[^/{}]+\}.*", ComponentRole::ParameterizedResource)?
                .with_tags(["parameterized"])
                .with_description("GET with path parameters becomes a resource template"),
            RouteRule::new(["GET"], ".*", ComponentRole::StaticResource)?
                .with_tags(["static"])
                .with_description("Other GET endpoints become static resources"),
            RouteRule::new(
                ["POST", "PUT", "PATCH", "DELETE"],
                ".*",
                ComponentRole::Tool,
            )?
            .with_tags(["mutation"])
            .with_description("Mutating endpoints become tools"),
        ]))
    }

    /// Role of the first matching rule, or `None` when the endpoint is not exposed.
    #[must_use]
    pub fn classify(&self, endpoint: &Endpoint) -> Option<ComponentRole> {
        self.matching_rule(endpoint).map(|(_, rule)| rule.role())
    }

    /// First matching rule and its position in the list.
    #[must_use]
    pub fn matching_rule(&self, endpoint: &Endpoint) -> Option<(usize, &RouteRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(endpoint))
    }

    #[must_use]
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
