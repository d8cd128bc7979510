//! The MCP server: built-in components first, then the surface generated from the API document.

use crate::builtin::{prompts, resources, tools};
use crate::config::ServerArgs;
use crate::error::{Result, ServerError};
use crate::pipeline::StepCache;
use crate::sampling::{PeerSampler, Sampler};
use r2r_http_client::ApiClient;
use r2r_openapi_tools::{LoadedSpec, OpenApiSurface, OpenApiToolsError, RouteClassifier};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, GetPromptRequestParams, GetPromptResult,
        Implementation, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
        ListToolsResult, PaginatedRequestParams, Prompt, ReadResourceRequestParams,
        ReadResourceResult, Resource, ResourceTemplate, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const SERVER_NAME: &str = "R2R MCP Server";

/// Connection settings reported by `r2r://server/info`.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub base_url: String,
    pub openapi_url: String,
    pub timeout: Duration,
    pub debug: bool,
}

impl From<&ServerArgs> for ServerSettings {
    fn from(args: &ServerArgs) -> Self {
        Self {
            base_url: args.base_url().to_string(),
            openapi_url: args.openapi_url(),
            timeout: args.timeout(),
            debug: args.debug,
        }
    }
}

/// What was loaded at startup; the parsed document itself is not kept.
#[derive(Debug, Clone, Serialize)]
pub struct SpecSummary {
    pub title: String,
    pub version: String,
    pub openapi_version: String,
    pub path_count: usize,
    pub origin: String,
    pub sha256: String,
}

impl From<&LoadedSpec> for SpecSummary {
    fn from(spec: &LoadedSpec) -> Self {
        Self {
            title: spec.title().to_string(),
            version: spec.version().to_string(),
            openapi_version: spec.openapi_version().to_string(),
            path_count: spec.path_count(),
            origin: spec.origin.to_string(),
            sha256: spec.sha256.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ServerState {
    pub settings: ServerSettings,
    pub spec: SpecSummary,
    pub client: ApiClient,
    pub classifier: RouteClassifier,
    pub surface: OpenApiSurface,
    pub cache: StepCache,
}

#[derive(Clone, Debug)]
pub struct R2rMcpServer {
    state: Arc<ServerState>,
}

impl R2rMcpServer {
    #[must_use]
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Built-in tools, then generated ones.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        let mut all = tools::tools();
        all.extend(self.state.surface.tools());
        all
    }

    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        let mut all = resources::resources();
        all.extend(self.state.surface.resources());
        all
    }

    #[must_use]
    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        let mut all = resources::resource_templates();
        all.extend(self.state.surface.resource_templates());
        all
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<Prompt> {
        prompts::prompts()
    }

    /// Dispatch a tool call. Sampling goes through `sampler`.
    ///
    /// # Errors
    ///
    /// Invalid-argument errors for unknown tools or bad arguments. API failures are error results.
    pub async fn invoke_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
        sampler: &dyn Sampler,
    ) -> Result<CallToolResult> {
        tracing::debug!(tool = %name, "tool call");
        if tools::is_builtin(name) {
            let ctx = tools::ToolContext {
                client: &self.state.client,
                sampler,
                cache: &self.state.cache,
            };
            return tools::call_tool(name, arguments, &ctx).await;
        }
        if self.state.surface.has_tool(name) {
            return Ok(self.state.surface.call_tool(name, arguments).await?);
        }
        Err(ServerError::InvalidArguments(format!("Tool not found: {name}")))
    }

    /// Read a resource. Returns `Ok(None)` for URIs nothing serves.
    ///
    /// Generated resources that fail upstream return an `{"error", "uri"}` payload.
    ///
    /// # Errors
    ///
    /// Invalid-argument errors for malformed URIs of generated resources.
    pub async fn read_uri(&self, uri: &str) -> Result<Option<ReadResourceResult>> {
        tracing::debug!(uri = %uri, "resource read");
        let payload = match uri {
            resources::SERVER_INFO_URI => Some(resources::server_info(&self.state)),
            resources::SERVER_ROUTES_URI => Some(resources::routes_report(
                &self.state.classifier,
                self.state.surface.skipped(),
            )),
            _ => None,
        };
        if let Some(payload) = payload {
            let text = serde_json::to_string_pretty(&payload)?;
            return Ok(Some(r2r_openapi_tools::json_resource_contents(
                uri,
                "application/json",
                &text,
            )?));
        }

        if let Some(result) = resources::read_template(&self.state.client, uri).await? {
            return Ok(Some(result));
        }

        match self.state.surface.read_resource(uri).await {
            Ok(result) => Ok(result),
            Err(OpenApiToolsError::Client(e)) => {
                tracing::warn!(uri = %uri, error = %e, "resource read failed");
                let text = serde_json::to_string_pretty(&json!({
                    "error": e.to_string(),
                    "uri": uri,
                }))?;
                Ok(Some(r2r_openapi_tools::json_resource_contents(
                    uri,
                    "application/json",
                    &text,
                )?))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// As [`prompts::get_prompt`].
    pub fn render_prompt(
        &self,
        name: &str,
        arguments: Option<&Map<String, Value>>,
    ) -> Result<GetPromptResult> {
        prompts::get_prompt(name, arguments)
    }
}

impl ServerHandler for R2rMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = Implementation::from_build_env();
        implementation.name = SERVER_NAME.to_string();
        implementation.version = env!("CARGO_PKG_VERSION").to_string();
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: implementation,
            instructions: Some(format!(
                "Tools, resources and prompts for the R2R API at {}. Resources under \
                 r2r://api mirror GET endpoints; r2r://server/info describes this server.",
                self.state.settings.base_url
            )),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = std::result::Result<ListToolsResult, McpError>> + Send + '_
    {
        let tools = self.tools();
        async move {
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let sampler = PeerSampler::new(context.peer.clone());
        self.invoke_tool(&request.name, request.arguments, &sampler)
            .await
            .map_err(McpError::from)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: self.resources(),
            ..Default::default()
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult {
            resource_templates: self.resource_templates(),
            ..Default::default()
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, McpError> {
        match self.read_uri(&request.uri).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(McpError::resource_not_found(
                format!("Resource not found: {}", request.uri),
                None,
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            prompts: self.prompts(),
            ..Default::default()
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<GetPromptResult, McpError> {
        self.render_prompt(&request.name, request.arguments.as_ref())
            .map_err(McpError::from)
    }
}
