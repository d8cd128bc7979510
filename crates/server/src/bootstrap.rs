//! Startup: credential check, spec loading, classification and surface generation.

use crate::builtin::tools::TOOL_NAMES;
use crate::config::ServerArgs;
use crate::error::{Result, ServerError};
use crate::pipeline::StepCache;
use crate::server::{R2rMcpServer, ServerSettings, ServerState, SpecSummary};
use r2r_http_client::{ApiClient, BearerAuth};
use r2r_openapi_tools::{
    OpenApiSurface, RouteClassifier, SpecLoader, SurfaceOptions, load_route_map,
};

/// Build a ready-to-serve server from the command line.
///
/// # Errors
///
/// Fails when the OpenAPI document cannot be loaded or parsed, a route rule is malformed, the base
/// URL is invalid, or strict auth is on and no credential is set.
pub async fn build_server(args: &ServerArgs) -> Result<R2rMcpServer> {
    let auth = BearerAuth::from_env(&args.api_key_env).with_debug(args.debug);
    if !auth.is_configured() {
        if args.strict_auth {
            return Err(ServerError::Config(format!(
                "{} is not set and --strict-auth is enabled",
                args.api_key_env
            )));
        }
        tracing::warn!(
            env = %args.api_key_env,
            "no API key configured; requests will be sent without Authorization"
        );
    } else if args.debug {
        tracing::debug!(
            env = %args.api_key_env,
            key = %auth.masked_token().unwrap_or_default(),
            "API key configured"
        );
    }

    let loader = SpecLoader::new(args.timeout())?;
    let loaded = loader.load(&args.spec_source()).await?;

    let classifier = match &args.route_map {
        Some(path) => {
            tracing::info!(path = %path.display(), "using route map");
            RouteClassifier::from_configs(&load_route_map(path)?)?
        }
        None => RouteClassifier::bundled()?,
    };

    let client = ApiClient::new(args.base_url(), auth, args.timeout())?;
    let options = SurfaceOptions {
        include: args.include_endpoints.clone(),
        exclude: args.exclude_endpoints.clone(),
        reserved_tool_names: TOOL_NAMES.iter().map(ToString::to_string).collect(),
        ..SurfaceOptions::default()
    };
    let surface = OpenApiSurface::build(
        &loaded.spec,
        &loaded.document,
        &classifier,
        &options,
        client.clone(),
    )?;
    let summary = surface.summary();
    tracing::info!(
        tools = summary.tools,
        resources = summary.resources,
        resource_templates = summary.resource_templates,
        skipped = summary.skipped,
        "generated MCP surface"
    );

    Ok(R2rMcpServer::new(ServerState {
        settings: ServerSettings::from(args),
        spec: SpecSummary::from(&loaded),
        client,
        classifier,
        surface,
        cache: StepCache::default(),
    }))
}
