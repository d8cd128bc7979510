//! Command-line and environment configuration.

use clap::{Parser, ValueEnum};
use r2r_http_client::auth::DEFAULT_API_KEY_ENV;
use r2r_openapi_tools::{HashPolicy, SpecSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HashPolicyArg {
    Warn,
    Fail,
    Ignore,
}

impl From<HashPolicyArg> for HashPolicy {
    fn from(p: HashPolicyArg) -> Self {
        match p {
            HashPolicyArg::Warn => Self::Warn,
            HashPolicyArg::Fail => Self::Fail,
            HashPolicyArg::Ignore => Self::Ignore,
        }
    }
}

/// R2R MCP server.
#[derive(Debug, Clone, Parser)]
#[command(name = "r2r-mcp-server", version, about)]
pub struct ServerArgs {
    /// Root URL of the R2R API.
    #[arg(long, env = "R2R_BASE_URL", default_value = "http://localhost:7272")]
    pub base_url: String,

    /// Environment variable holding the bearer token (read on every request).
    #[arg(long, env = "R2R_API_KEY_ENV", default_value = DEFAULT_API_KEY_ENV)]
    pub api_key_env: String,

    /// Outbound request timeout in seconds.
    #[arg(long, env = "R2R_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Verbose diagnostics with masked credentials.
    #[arg(long, env = "DEBUG_LOGGING")]
    pub debug: bool,

    /// `OpenAPI` document URL. Defaults to `{base-url}/openapi.json`.
    #[arg(long, env = "R2R_OPENAPI_URL")]
    pub openapi_url: Option<String>,

    /// Local copy of the document, used when the remote fetch fails.
    #[arg(long, env = "R2R_OPENAPI_FALLBACK", default_value = "openapi.json")]
    pub openapi_fallback: PathBuf,

    /// Rewrite the fallback file after a successful remote fetch.
    #[arg(long, env = "R2R_OPENAPI_CACHE_WRITE")]
    pub write_openapi_cache: bool,

    /// Expected SHA-256 (hex) of the document.
    #[arg(long, env = "R2R_OPENAPI_SHA256")]
    pub openapi_sha256: Option<String>,

    #[arg(long, value_enum, default_value = "warn")]
    pub openapi_sha256_policy: HashPolicyArg,

    /// Refuse to start without a credential.
    #[arg(long, env = "R2R_STRICT_AUTH")]
    pub strict_auth: bool,

    /// YAML/JSON route map replacing the bundled rules.
    #[arg(long, env = "R2R_ROUTE_MAP")]
    pub route_map: Option<PathBuf>,

    /// Only expose endpoints matching these globs over `"METHOD /path"`.
    #[arg(long = "include-endpoint", env = "R2R_INCLUDE_ENDPOINTS", value_delimiter = ',')]
    pub include_endpoints: Vec<String>,

    /// Never expose endpoints matching these globs.
    #[arg(long = "exclude-endpoint", env = "R2R_EXCLUDE_ENDPOINTS", value_delimiter = ',')]
    pub exclude_endpoints: Vec<String>,

    #[arg(long, value_enum, env = "MCP_TRANSPORT", default_value = "stdio")]
    pub transport: TransportKind,

    /// Listener address for the HTTP transport.
    #[arg(long, env = "MCP_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "R2R_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl ServerArgs {
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn openapi_url(&self) -> String {
        self.openapi_url
            .clone()
            .unwrap_or_else(|| format!("{}/openapi.json", self.base_url()))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn spec_source(&self) -> SpecSource {
        let mut source = SpecSource::remote(self.openapi_url()).with_fallback(&self.openapi_fallback);
        source.refresh_fallback = self.write_openapi_cache;
        source.spec_hash.clone_from(&self.openapi_sha256);
        source.spec_hash_policy = self.openapi_sha256_policy.into();
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerArgs {
        let mut argv = vec!["r2r-mcp-server"];
        argv.extend_from_slice(args);
        ServerArgs::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn spec_url_defaults_to_base_url() {
        let args = parse(&["--base-url", "https://r2r.example.com/"]);
        assert_eq!(args.openapi_url(), "https://r2r.example.com/openapi.json");

        let args = parse(&["--openapi-url", "http://spec.local/openapi.yaml"]);
        assert_eq!(args.openapi_url(), "http://spec.local/openapi.yaml");
    }

    #[test]
    fn spec_source_carries_fallback_and_hash_settings() {
        let args = parse(&[
            "--openapi-fallback",
            "/tmp/r2r.json",
            "--write-openapi-cache",
            "--openapi-sha256",
            "abc",
            "--openapi-sha256-policy",
            "fail",
        ]);
        let source = args.spec_source();
        assert_eq!(source.fallback_path.as_deref(), Some(std::path::Path::new("/tmp/r2r.json")));
        assert!(source.refresh_fallback);
        assert_eq!(source.spec_hash.as_deref(), Some("abc"));
        assert_eq!(source.spec_hash_policy, HashPolicy::Fail);
    }

    #[test]
    fn transport_and_filters_parse() {
        let args = parse(&[
            "--transport",
            "http",
            "--bind",
            "0.0.0.0:9000",
            "--exclude-endpoint",
            "DELETE *,PATCH *",
        ]);
        assert_eq!(args.transport, TransportKind::Http);
        assert_eq!(args.bind.port(), 9000);
        assert_eq!(args.exclude_endpoints, vec!["DELETE *", "PATCH *"]);
        assert_eq!(args.timeout(), Duration::from_secs(30));
    }
}
