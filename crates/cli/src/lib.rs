//! Shared plumbing for the `r2r-ingest` and `r2r-search` binaries.

pub mod ingest;
pub mod search;

use anyhow::Context as _;
use clap::Args;
use owo_colors::OwoColorize as _;
use r2r_http_client::auth::DEFAULT_API_KEY_ENV;
use r2r_http_client::{ApiClient, BearerAuth};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Connection flags accepted by every R2R command-line tool.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Root URL of the R2R API.
    #[arg(long, env = "R2R_BASE_URL", default_value = "http://localhost:7272")]
    pub base_url: String,

    /// Environment variable holding the bearer token.
    #[arg(long, env = "R2R_API_KEY_ENV", default_value = DEFAULT_API_KEY_ENV)]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[arg(long, env = "R2R_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl ConnectionArgs {
    /// Build a client, warning on stderr when no credential is set.
    ///
    /// # Errors
    ///
    /// Fails when the base URL is invalid or the HTTP client cannot be built.
    pub fn client(&self) -> anyhow::Result<ApiClient> {
        let auth = BearerAuth::from_env(&self.api_key_env);
        if !auth.is_configured() {
            eprintln!(
                "{}",
                format!("Warning: {} is not set; API requests may fail.", self.api_key_env)
                    .yellow()
            );
        }
        ApiClient::new(
            &self.base_url,
            auth,
            Duration::from_secs(self.timeout_secs),
        )
        .with_context(|| format!("invalid R2R base URL {}", self.base_url))
    }
}

/// Stderr logging for the command-line tools; quiet unless `RUST_LOG` asks otherwise.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        connection: ConnectionArgs,
    }

    #[test]
    fn connection_flags_parse() {
        let cli = Cli::try_parse_from([
            "r2r",
            "--base-url",
            "http://r2r.internal:7272",
            "--api-key-env",
            "MY_KEY",
            "--timeout-secs",
            "5",
        ])
        .expect("parse");
        assert_eq!(cli.connection.base_url, "http://r2r.internal:7272");
        assert_eq!(cli.connection.api_key_env, "MY_KEY");
        assert_eq!(cli.connection.timeout_secs, 5);
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let args = ConnectionArgs {
            base_url: "not a url".to_string(),
            api_key_env: "R2R_CLI_TEST_UNSET_KEY".to_string(),
            timeout_secs: 1,
        };
        let err = args.client().expect_err("invalid url");
        assert!(err.to_string().contains("not a url"));
    }
}
