//! MCP surface generated from an `OpenAPI` document.
//!
//! Every operation is classified by the [`RouteClassifier`] and then registered as a tool, a static
//! resource, or a resource template. Calls and reads are executed through [`ApiClient`], so each
//! outbound request picks up the credential that is current at send time.

use crate::config::SurfaceOptions;
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::RefResolver;
use crate::routes::{ComponentRole, Endpoint, RouteClassifier};
use crate::schema::{parameter_schema, property_to_json, schema_ref_to_json, value_to_string};
use crate::semantics::annotations_for_method;
use base64::Engine as _;
use openapiv3::{
    OpenAPI, Operation, Parameter, PathItem, ReferenceOr, RequestBody, SchemaKind, StringFormat,
    Type, VariantOrUnknownOrEmpty,
};
use r2r_http_client::{ApiClient, ClientError};
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use rmcp::model::{
    Annotated, CallToolResult, Content, JsonObject, RawResource, ReadResourceResult, Resource,
    ResourceTemplate, Tool,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

const MAX_TOOL_NAME_LEN: usize = 64;
const JSON_MIME: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone)]
struct OperationParameter {
    name: String,
    location: ParamLocation,
    required: bool,
    schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEncoding {
    Json,
    Multipart,
    FormUrlEncoded,
}

#[derive(Debug, Clone, Copy)]
struct BodyPlan {
    encoding: BodyEncoding,
    /// The whole body is the single `body` argument instead of flattened properties.
    whole: bool,
    required: bool,
}

/// One exposed API operation.
#[derive(Debug, Clone)]
pub struct ApiOperation {
    name: String,
    endpoint: Endpoint,
    role: ComponentRole,
    description: String,
    title: Option<String>,
    parameters: Vec<OperationParameter>,
    body: Option<BodyPlan>,
}

impl ApiOperation {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn role(&self) -> ComponentRole {
        self.role
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    fn has_query_param(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|p| p.location == ParamLocation::Query && p.name == name)
    }

    fn query_param_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .map(|p| p.name.as_str())
            .collect()
    }

    fn input_schema(&self) -> JsonObject {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(p.name.clone(), p.schema.clone());
            if p.required {
                required.push(p.name.clone());
            }
        }

        let mut schema = JsonObject::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), json!(required));
        }
        schema
    }
}

#[derive(Debug, Clone)]
struct StaticResource {
    uri: String,
    op: ApiOperation,
}

#[derive(Debug, Clone)]
struct TemplateResource {
    uri_template: String,
    matcher: Regex,
    path_params: Vec<String>,
    op: ApiOperation,
}

/// An endpoint that was left out of the surface, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEndpoint {
    pub method: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SurfaceSummary {
    pub tools: usize,
    pub resources: usize,
    pub resource_templates: usize,
    pub skipped: usize,
}

/// A raw API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|m| m.type_() == mime::IMAGE)
    }
}

#[derive(Debug, Clone)]
pub struct OpenApiSurface {
    client: ApiClient,
    tools: Vec<ApiOperation>,
    tool_index: HashMap<String, usize>,
    resources: Vec<StaticResource>,
    templates: Vec<TemplateResource>,
    skipped: Vec<SkippedEndpoint>,
}

impl OpenApiSurface {
    /// Generate the surface for every operation in `spec`.
    ///
    /// Operations that no rule matches, or that cannot be expressed (cookie parameters,
    /// unsupported bodies, name collisions), are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid include/exclude patterns.
    pub fn build(
        spec: &OpenAPI,
        document: &Value,
        classifier: &RouteClassifier,
        options: &SurfaceOptions,
        client: ApiClient,
    ) -> Result<Self> {
        let include = compile_globs(&options.include)?;
        let exclude = compile_globs(&options.exclude)?;
        let resolver = RefResolver::from_value(document.clone());

        let mut surface = Self {
            client,
            tools: Vec::new(),
            tool_index: HashMap::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            skipped: Vec::new(),
        };
        let mut tool_names = options.reserved_tool_names.clone();
        let mut resource_names = HashSet::new();

        for (path, item) in &spec.paths.paths {
            let item = match resolver.path_item(item) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping unresolvable path item");
                    surface.skip(&Endpoint::new(Method::GET, path.clone()), e.to_string());
                    continue;
                }
            };

            for (method, op) in operations(&item) {
                let endpoint = Endpoint::new(method, path.clone());
                let key = format!("{} {}", endpoint.method, endpoint.path);
                if (!include.is_empty() && !include.iter().any(|p| p.matches(&key)))
                    || exclude.iter().any(|p| p.matches(&key))
                {
                    tracing::debug!(endpoint = %key, "filtered out");
                    continue;
                }

                let Some(role) = classifier.classify(&endpoint) else {
                    tracing::warn!(endpoint = %key, "no route rule matches; endpoint not exposed");
                    surface.skip(&endpoint, "no matching route rule".to_string());
                    continue;
                };

                if role == ComponentRole::StaticResource && endpoint.has_path_params {
                    tracing::warn!(
                        endpoint = %key,
                        "static resource rule matched a path with parameters; endpoint not exposed"
                    );
                    surface.skip(&endpoint, "static resource path has parameters".to_string());
                    continue;
                }

                let names = match role {
                    ComponentRole::Tool => &mut tool_names,
                    _ => &mut resource_names,
                };
                match build_operation(&resolver, &item, op, endpoint.clone(), role, names) {
                    Ok(op) => surface.register(op, &options.resource_uri_prefix)?,
                    Err(e) => {
                        tracing::warn!(endpoint = %key, error = %e, "skipping operation");
                        surface.skip(&endpoint, e.to_string());
                    }
                }
            }
        }

        tracing::info!(
            tools = surface.tools.len(),
            resources = surface.resources.len(),
            resource_templates = surface.templates.len(),
            skipped = surface.skipped.len(),
            "generated MCP surface from OpenAPI"
        );
        Ok(surface)
    }

    fn skip(&mut self, endpoint: &Endpoint, reason: String) {
        self.skipped.push(SkippedEndpoint {
            method: endpoint.method.to_string(),
            path: endpoint.path.clone(),
            reason,
        });
    }

    fn register(&mut self, op: ApiOperation, prefix: &str) -> Result<()> {
        match op.role {
            ComponentRole::Tool => {
                self.tool_index.insert(op.name.clone(), self.tools.len());
                self.tools.push(op);
            }
            ComponentRole::StaticResource => {
                let uri = format!("{prefix}{}", op.endpoint.path);
                self.resources.push(StaticResource { uri, op });
            }
            ComponentRole::ParameterizedResource => {
                let (matcher, path_params) = template_matcher(prefix, &op.endpoint.path)?;
                let mut uri_template = format!("{prefix}{}", op.endpoint.path);
                let query = op.query_param_names();
                if !query.is_empty() {
                    let _ = write!(uri_template, "{{?{}}}", query.join(","));
                }
                self.templates.push(TemplateResource {
                    uri_template,
                    matcher,
                    path_params,
                    op,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_index.contains_key(name)
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&ApiOperation> {
        self.tool_index.get(name).map(|&i| &self.tools[i])
    }

    /// MCP tools, in document order.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|op| {
                let mut tool = Tool::new(
                    op.name.clone(),
                    op.description.clone(),
                    Arc::new(op.input_schema()),
                );
                tool.annotations = Some(annotations_for_method(
                    &op.endpoint.method,
                    op.title.as_deref(),
                ));
                tool
            })
            .collect()
    }

    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .map(|r| {
                let mut raw = RawResource::new(r.uri.clone(), r.op.name.clone());
                raw.description = Some(r.op.description.clone());
                raw.mime_type = Some(JSON_MIME.to_string());
                Annotated::new(raw, None)
            })
            .collect()
    }

    #[must_use]
    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.templates
            .iter()
            .filter_map(|t| {
                let value = json!({
                    "uriTemplate": t.uri_template,
                    "name": t.op.name,
                    "description": t.op.description,
                    "mimeType": JSON_MIME,
                });
                match serde_json::from_value(value) {
                    Ok(template) => Some(template),
                    Err(e) => {
                        tracing::warn!(uri_template = %t.uri_template, error = %e, "invalid resource template");
                        None
                    }
                }
            })
            .collect()
    }

    #[must_use]
    pub fn skipped(&self) -> &[SkippedEndpoint] {
        &self.skipped
    }

    #[must_use]
    pub fn summary(&self) -> SurfaceSummary {
        SurfaceSummary {
            tools: self.tools.len(),
            resources: self.resources.len(),
            resource_templates: self.templates.len(),
            skipped: self.skipped.len(),
        }
    }

    /// Invoke a generated tool.
    ///
    /// API failures (transport errors and non-2xx statuses) come back as error results, so the
    /// caller sees the status and body.
    ///
    /// # Errors
    ///
    /// Returns a runtime error for unknown tools or missing required arguments.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let op = self
            .operation(name)
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Tool not found: {name}")))?;
        let args = arguments.unwrap_or_default();

        let response = match self.invoke(op, &args).await {
            Ok(resp) => resp,
            Err(OpenApiToolsError::Client(e)) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
            Err(e) => return Err(e),
        };

        if !response.status.is_success() {
            let err = ClientError::Status {
                status: response.status,
                body: response.text(),
            };
            tracing::warn!(tool = %name, status = %response.status, "API returned an error status");
            return Ok(CallToolResult::error(vec![Content::text(err.to_string())]));
        }

        if response.is_image() {
            let b64 = base64::engine::general_purpose::STANDARD.encode(&response.body);
            let mime = response.content_type.clone().unwrap_or_default();
            return Ok(CallToolResult::success(vec![Content::image(b64, mime)]));
        }
        Ok(CallToolResult::success(vec![Content::text(response.text())]))
    }

    /// Read a generated resource. Returns `Ok(None)` for URIs this surface does not own.
    ///
    /// # Errors
    ///
    /// Returns `Client` errors for transport failures and non-2xx statuses, and a runtime error
    /// when a required query parameter is missing.
    pub async fn read_resource(&self, uri: &str) -> Result<Option<ReadResourceResult>> {
        let (base, query) = match uri.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (uri, None),
        };

        let (op, mut args) = if let Some(r) = self.resources.iter().find(|r| r.uri == base) {
            (&r.op, Map::new())
        } else if let Some((t, caps)) = self
            .templates
            .iter()
            .find_map(|t| t.matcher.captures(base).map(|c| (t, c)))
        {
            let mut args = Map::new();
            for (i, name) in t.path_params.iter().enumerate() {
                if let Some(m) = caps.get(i + 1) {
                    let decoded = urlencoding::decode(m.as_str()).map_err(|e| {
                        OpenApiToolsError::Runtime(format!("invalid escape in '{uri}': {e}"))
                    })?;
                    args.insert(name.clone(), Value::String(decoded.into_owned()));
                }
            }
            (&t.op, args)
        } else {
            return Ok(None);
        };

        if let Some(query) = query {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                if op.has_query_param(&k) {
                    args.insert(k.into_owned(), Value::String(v.into_owned()));
                }
            }
        }

        let response = self.invoke(op, &args).await?;
        if !response.status.is_success() {
            return Err(ClientError::Status {
                status: response.status,
                body: response.text(),
            }
            .into());
        }
        let mime = response
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map_or(JSON_MIME, str::trim);
        json_resource_contents(uri, mime, &response.text()).map(Some)
    }

    async fn invoke(&self, op: &ApiOperation, args: &Map<String, Value>) -> Result<ApiResponse> {
        for p in &op.parameters {
            if p.required && args.get(&p.name).is_none_or(Value::is_null) {
                return Err(OpenApiToolsError::Runtime(format!(
                    "Missing required parameter: {}",
                    p.name
                )));
            }
        }

        let mut path = op.endpoint.path.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body = Map::new();

        for p in &op.parameters {
            let Some(value) = args.get(&p.name).filter(|v| !v.is_null()) else {
                continue;
            };
            match p.location {
                ParamLocation::Path => {
                    let encoded = urlencoding::encode(&value_to_string(value)).into_owned();
                    path = path.replace(&format!("{{{}}}", p.name), &encoded);
                }
                ParamLocation::Query => match value {
                    Value::Array(items) => {
                        query.extend(items.iter().map(|v| (p.name.clone(), value_to_string(v))));
                    }
                    _ => query.push((p.name.clone(), value_to_string(value))),
                },
                ParamLocation::Header => headers.push((p.name.clone(), value_to_string(value))),
                ParamLocation::Body => {
                    body.insert(p.name.clone(), value.clone());
                }
            }
        }

        let mut builder = self.client.request(op.endpoint.method.clone(), &path)?;
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(plan) = op.body {
            builder = match plan.encoding {
                BodyEncoding::Json if plan.whole => match body.get("body") {
                    Some(value) => builder.json(value),
                    None => builder,
                },
                BodyEncoding::Json if !body.is_empty() || plan.required => {
                    builder.json(&Value::Object(body))
                }
                BodyEncoding::Json => builder,
                BodyEncoding::Multipart => {
                    let form = body
                        .iter()
                        .fold(reqwest::multipart::Form::new(), |form, (k, v)| {
                            form.text(k.clone(), value_to_string(v))
                        });
                    builder.multipart(form)
                }
                BodyEncoding::FormUrlEncoded => {
                    let fields: Vec<(String, String)> = body
                        .iter()
                        .map(|(k, v)| (k.clone(), value_to_string(v)))
                        .collect();
                    builder.form(&fields)
                }
            };
        }

        let response = self.client.send(builder).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(ClientError::from)?;
        tracing::debug!(
            operation = %op.name,
            status = %status,
            bytes = bytes.len(),
            "API response"
        );

        Ok(ApiResponse {
            status,
            content_type,
            body: bytes.to_vec(),
        })
    }
}

/// Text resource contents for `uri`.
///
/// # Errors
///
/// Returns a JSON error if the result cannot be assembled.
pub fn json_resource_contents(uri: &str, mime_type: &str, text: &str) -> Result<ReadResourceResult> {
    Ok(serde_json::from_value(json!({
        "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }]
    }))?)
}

fn operations(item: &PathItem) -> Vec<(Method, &Operation)> {
    [
        (Method::GET, item.get.as_ref()),
        (Method::PUT, item.put.as_ref()),
        (Method::POST, item.post.as_ref()),
        (Method::DELETE, item.delete.as_ref()),
        (Method::PATCH, item.patch.as_ref()),
        (Method::HEAD, item.head.as_ref()),
        (Method::OPTIONS, item.options.as_ref()),
        (Method::TRACE, item.trace.as_ref()),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.map(|op| (method, op)))
    .collect()
}

fn compile_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| OpenApiToolsError::Config(format!("invalid filter pattern '{p}': {e}")))
        })
        .collect()
}

fn build_operation(
    resolver: &RefResolver,
    item: &PathItem,
    op: &Operation,
    endpoint: Endpoint,
    role: ComponentRole,
    names: &mut HashSet<String>,
) -> Result<ApiOperation> {
    let mut parameters = merge_parameters(resolver, &item.parameters, &op.parameters)?;

    let mut body = None;
    if role == ComponentRole::Tool
        && let Some(request_body) = &op.request_body
    {
        let request_body = resolver.request_body(request_body)?;
        let (plan, fields) = body_parameters(resolver, &request_body)?;
        for field in fields {
            if parameters.iter().any(|p| p.name == field.name) {
                return Err(OpenApiToolsError::ParamCollision(format!(
                    "'{}' is both a parameter and a body property of {endpoint}",
                    field.name
                )));
            }
            parameters.push(field);
        }
        body = plan;
    }

    let base = op
        .operation_id
        .as_deref()
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| canonical_name(&endpoint.method, &endpoint.path));
    let name = reserve_unique_name(names, &base);

    let description = match (op.summary.as_deref(), op.description.as_deref()) {
        (Some(s), Some(d)) if s != d => format!("{s}\n\n{d}"),
        (Some(s), _) => s.to_string(),
        (None, Some(d)) => d.to_string(),
        (None, None) => format!("{} {}", endpoint.method, endpoint.path),
    };

    Ok(ApiOperation {
        name,
        endpoint,
        role,
        description,
        title: op.summary.clone(),
        parameters,
        body,
    })
}

fn merge_parameters(
    resolver: &RefResolver,
    path_level: &[ReferenceOr<Parameter>],
    op_level: &[ReferenceOr<Parameter>],
) -> Result<Vec<OperationParameter>> {
    let mut merged: Vec<OperationParameter> = Vec::new();
    for param in path_level.iter().chain(op_level) {
        let Some(param) = convert_parameter(resolver, &resolver.parameter(param)?)? else {
            continue;
        };
        match merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param,
            None => merged.push(param),
        }
    }
    Ok(merged)
}

fn convert_parameter(
    resolver: &RefResolver,
    param: &Parameter,
) -> Result<Option<OperationParameter>> {
    let (data, location) = match param {
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path),
        Parameter::Query { parameter_data, .. } => (parameter_data, ParamLocation::Query),
        Parameter::Header { parameter_data, .. } => {
            // Authorization is owned by the credential provider.
            if parameter_data.name.eq_ignore_ascii_case("authorization") {
                return Ok(None);
            }
            (parameter_data, ParamLocation::Header)
        }
        Parameter::Cookie { parameter_data, .. } => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "cookie parameter '{}' is not supported",
                parameter_data.name
            )));
        }
    };

    let mut schema = parameter_schema(&data.format, resolver);
    if let (Some(desc), Some(obj)) = (&data.description, schema.as_object_mut()) {
        obj.insert("description".into(), json!(desc));
    }

    Ok(Some(OperationParameter {
        name: data.name.clone(),
        location,
        // Path parameters are always required.
        required: data.required || location == ParamLocation::Path,
        schema,
    }))
}

fn body_parameters(
    resolver: &RefResolver,
    body: &RequestBody,
) -> Result<(Option<BodyPlan>, Vec<OperationParameter>)> {
    let Some((media_type, media)) = body
        .content
        .iter()
        .find(|(ct, _)| ct.contains("json"))
        .or_else(|| body.content.iter().find(|(ct, _)| ct.starts_with("multipart/form-data")))
        .or_else(|| {
            body.content
                .iter()
                .find(|(ct, _)| ct.starts_with("application/x-www-form-urlencoded"))
        })
    else {
        if body.content.is_empty() {
            return Ok((None, Vec::new()));
        }
        let types: Vec<&str> = body.content.keys().map(String::as_str).collect();
        return Err(OpenApiToolsError::OpenApi(format!(
            "unsupported request body media types: {}",
            types.join(", ")
        )));
    };

    let encoding = if media_type.contains("json") {
        BodyEncoding::Json
    } else if media_type.starts_with("multipart/") {
        BodyEncoding::Multipart
    } else {
        BodyEncoding::FormUrlEncoded
    };

    let schema = match &media.schema {
        Some(schema) => Some(resolver.schema(schema)?),
        None => None,
    };

    if let Some(schema) = &schema
        && let SchemaKind::Type(Type::Object(obj)) = &schema.schema_kind
    {
        let mut fields = Vec::new();
        for (name, prop) in &obj.properties {
            if is_binary(resolver, prop) {
                tracing::debug!(field = %name, "binary body field is not exposed");
                continue;
            }
            fields.push(OperationParameter {
                name: name.clone(),
                location: ParamLocation::Body,
                required: body.required && obj.required.contains(name),
                schema: property_to_json(prop, resolver),
            });
        }
        let plan = BodyPlan {
            encoding,
            whole: false,
            required: body.required,
        };
        return Ok((Some(plan), fields));
    }

    if encoding != BodyEncoding::Json {
        return Err(OpenApiToolsError::OpenApi(format!(
            "{media_type} body must be an object schema"
        )));
    }

    let schema = media.schema.as_ref().map_or_else(
        || json!({}),
        |s| schema_ref_to_json(s, resolver),
    );
    let field = OperationParameter {
        name: "body".to_string(),
        location: ParamLocation::Body,
        required: body.required,
        schema,
    };
    let plan = BodyPlan {
        encoding,
        whole: true,
        required: body.required,
    };
    Ok((Some(plan), vec![field]))
}

fn is_binary(resolver: &RefResolver, prop: &ReferenceOr<Box<openapiv3::Schema>>) -> bool {
    let Ok(schema) = resolver.boxed_schema(prop) else {
        return false;
    };
    match &schema.schema_kind {
        SchemaKind::Type(Type::String(s)) => {
            matches!(s.format, VariantOrUnknownOrEmpty::Item(StringFormat::Binary))
        }
        SchemaKind::Type(Type::Array(a)) => a
            .items
            .as_ref()
            .is_some_and(|items| is_binary(resolver, items)),
        _ => false,
    }
}

/// Regex matching a concrete resource URI against `{prefix}{path}`, capturing path parameters.
fn template_matcher(prefix: &str, path: &str) -> Result<(Regex, Vec<String>)> {
    let mut pattern = String::from("^");
    pattern.push_str(&regex::escape(prefix));
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..start]));
        let Some(len) = rest[start..].find('}') else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "unterminated path parameter in '{path}'"
            )));
        };
        names.push(rest[start + 1..start + len].to_string());
        pattern.push_str("([^/?#]+)");
        rest = &rest[start + len + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let regex = Regex::new(&pattern)
        .map_err(|e| OpenApiToolsError::OpenApi(format!("invalid template for '{path}': {e}")))?;
    Ok((regex, names))
}

fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect()
}

/// `{method}_{path}` with every run of non-alphanumerics collapsed to `_`.
fn canonical_name(method: &Method, path: &str) -> String {
    let raw = format!("{}_{path}", method.as_str().to_ascii_lowercase());
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    let trimmed = name.trim_end_matches('_');
    trimmed.chars().take(MAX_TOOL_NAME_LEN).collect()
}

fn reserve_unique_name(names: &mut HashSet<String>, base: &str) -> String {
    if names.insert(base.to_string()) {
        return base.to_string();
    }
    let mut counter = 1;
    loop {
        let suffix = format!("_{counter}");
        let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len());
        let stem: String = base.chars().take(keep).collect();
        let candidate = format!("{stem}{suffix}");
        if names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_document;
    use r2r_http_client::{BearerAuth, SharedCredential};
    use r2r_test_support::TestHttpServer;
    use std::time::Duration;

    const SPEC: &str = r##"
openapi: 3.0.3
info: {title: R2R, version: "3.5.0"}
paths:
  /v3/documents:
    get:
      operationId: list_documents
      summary: List documents
      parameters:
        - {name: offset, in: query, schema: {type: integer}}
        - {name: limit, in: query, schema: {type: integer}}
    post:
      operationId: create_document
      summary: Create document
      requestBody:
        required: true
        content:
          multipart/form-data:
            schema: {$ref: '#/components/schemas/CreateDocument'}
  /v3/documents/{id}:
    parameters:
      - $ref: '#/components/parameters/DocumentId'
    get:
      operationId: get_document
      summary: Get document
    delete:
      operationId: delete_document
      summary: Delete document
  /v3/collections/{id}/documents:
    get:
      summary: List collection documents
      parameters:
        - {name: id, in: path, required: true, schema: {type: string}}
        - {name: limit, in: query, schema: {type: integer}}
  /v3/retrieval/search:
    post:
      operationId: search
      summary: Search
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [query]
              properties:
                query: {type: string}
                search_settings: {type: object}
  /v3/health:
    get:
      operationId: health
    head:
      operationId: health_head
components:
  parameters:
    DocumentId:
      name: id
      in: path
      required: true
      description: Document ID
      schema: {type: string}
  schemas:
    CreateDocument:
      type: object
      properties:
        file: {type: string, format: binary}
        raw_text: {type: string}
        metadata: {type: string}
"##;

    async fn build_with(options: &SurfaceOptions) -> (TestHttpServer, OpenApiSurface, SharedCredential) {
        let server = TestHttpServer::echo().await.expect("echo server");
        let credential = SharedCredential::new(Some("sk-test-key-0001".to_string()));
        let auth = BearerAuth::new(Arc::new(credential.clone()));
        let client = ApiClient::new(server.base_url(), auth, Duration::from_secs(5)).expect("client");
        let (document, spec) = parse_document(SPEC, "test").expect("spec");
        let classifier = RouteClassifier::bundled().expect("bundled rules");
        let surface =
            OpenApiSurface::build(&spec, &document, &classifier, options, client).expect("surface");
        (server, surface, credential)
    }

    fn reserved_search() -> SurfaceOptions {
        SurfaceOptions {
            reserved_tool_names: HashSet::from(["search".to_string()]),
            ..SurfaceOptions::default()
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).expect("serialize result");
        value["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .expect("text content")
    }

    #[tokio::test]
    async fn classifies_operations_into_tools_resources_and_templates() {
        let (_server, surface, _) = build_with(&reserved_search()).await;

        let tools: Vec<String> = surface.tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(tools, vec!["create_document", "delete_document", "search_1"]);

        let resources: Vec<String> = surface.resources().iter().map(|r| r.raw.uri.clone()).collect();
        assert_eq!(resources, vec!["r2r://api/v3/documents", "r2r://api/v3/health"]);

        let templates: Vec<String> = surface
            .resource_templates()
            .iter()
            .map(|t| t.raw.uri_template.clone())
            .collect();
        assert_eq!(
            templates,
            vec![
                "r2r://api/v3/documents/{id}",
                "r2r://api/v3/collections/{id}/documents{?limit}"
            ]
        );

        let skipped = surface.skipped();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].method, "HEAD");
        assert_eq!(surface.summary().tools, 3);
    }

    #[tokio::test]
    async fn tool_schemas_flatten_bodies_and_skip_binary_fields() {
        let (_server, surface, _) = build_with(&SurfaceOptions::default()).await;
        let tools = surface.tools();

        let search = tools.iter().find(|t| t.name == "search").expect("search");
        assert_eq!(search.input_schema["required"], json!(["query"]));
        assert!(search.input_schema["properties"].get("search_settings").is_some());

        let create = tools.iter().find(|t| t.name == "create_document").expect("create");
        let props = create.input_schema["properties"].as_object().expect("props");
        assert!(props.contains_key("raw_text"));
        assert!(!props.contains_key("file"));

        let delete = tools.iter().find(|t| t.name == "delete_document").expect("delete");
        assert_eq!(delete.input_schema["required"], json!(["id"]));
        assert_eq!(delete.input_schema["properties"]["id"]["description"], "Document ID");
        let hints = delete.annotations.as_ref().expect("annotations");
        assert_eq!(hints.destructive_hint, Some(true));
    }

    #[tokio::test]
    async fn call_tool_sends_json_body_with_current_credential() {
        let (_server, surface, credential) = build_with(&SurfaceOptions::default()).await;

        let args = json!({"query": "what is rag", "search_settings": {"limit": 3}});
        let result = surface
            .call_tool("search", args.as_object().cloned())
            .await
            .expect("call");
        assert_ne!(result.is_error, Some(true));
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/v3/retrieval/search");
        assert_eq!(echoed["authorization"], "Bearer sk-test-key-0001");
        assert_eq!(echoed["body"]["search_settings"]["limit"], 3);

        credential.set(Some("sk-rotated-key-0002".to_string()));
        let result = surface
            .call_tool("search", args.as_object().cloned())
            .await
            .expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert_eq!(echoed["authorization"], "Bearer sk-rotated-key-0002");
    }

    #[tokio::test]
    async fn call_tool_encodes_path_values_and_sends_multipart_text() {
        let (_server, surface, _) = build_with(&SurfaceOptions::default()).await;

        let result = surface
            .call_tool("delete_document", json!({"id": "a b/c"}).as_object().cloned())
            .await
            .expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert_eq!(echoed["method"], "DELETE");
        assert_eq!(echoed["path"], "/v3/documents/a%20b%2Fc");

        let result = surface
            .call_tool("create_document", json!({"raw_text": "hello world"}).as_object().cloned())
            .await
            .expect("call");
        let echoed: Value = serde_json::from_str(&text_of(&result)).expect("json");
        assert!(
            echoed["content_type"]
                .as_str()
                .is_some_and(|ct| ct.starts_with("multipart/form-data"))
        );
        let body = echoed["body"].as_str().expect("multipart body");
        assert!(body.contains("name=\"raw_text\""));
        assert!(body.contains("hello world"));
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_tools_and_missing_arguments() {
        let (_server, surface, _) = build_with(&SurfaceOptions::default()).await;

        let err = surface.call_tool("nope", None).await.expect_err("unknown");
        assert!(err.to_string().contains("Tool not found: nope"));

        let err = surface.call_tool("delete_document", None).await.expect_err("missing");
        assert!(err.to_string().contains("Missing required parameter: id"));
    }

    #[tokio::test]
    async fn api_errors_become_error_results_with_status_and_body() {
        use axum::http::StatusCode as AxumStatus;
        use axum::routing::any;

        let app = axum::Router::new().route(
            "/{*path}",
            any(|| async { (AxumStatus::FORBIDDEN, r#"{"detail":"forbidden"}"#) }),
        );
        let server = TestHttpServer::spawn(app).await.expect("server");
        let client = ApiClient::new(
            server.base_url(),
            BearerAuth::new(Arc::new(SharedCredential::new(None))),
            Duration::from_secs(5),
        )
        .expect("client");
        let (document, spec) = parse_document(SPEC, "test").expect("spec");
        let surface = OpenApiSurface::build(
            &spec,
            &document,
            &RouteClassifier::bundled().expect("rules"),
            &SurfaceOptions::default(),
            client,
        )
        .expect("surface");

        let result = surface
            .call_tool("search", json!({"query": "x"}).as_object().cloned())
            .await
            .expect("call");
        assert_eq!(result.is_error, Some(true));
        let text = text_of(&result);
        assert!(text.contains("API returned 403"), "{text}");
        assert!(text.contains("forbidden"), "{text}");

        let err = surface
            .read_resource("r2r://api/v3/documents")
            .await
            .expect_err("status error");
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn read_resource_handles_static_and_templated_uris() {
        let (_server, surface, _) = build_with(&SurfaceOptions::default()).await;

        let result = surface
            .read_resource("r2r://api/v3/documents?limit=2&bogus=1")
            .await
            .expect("read")
            .expect("owned");
        let text = serde_json::to_value(&result).expect("json")["contents"][0]["text"]
            .as_str()
            .map(str::to_string)
            .expect("text");
        let echoed: Value = serde_json::from_str(&text).expect("echo");
        assert_eq!(echoed["path"], "/v3/documents");
        assert_eq!(echoed["query"], "limit=2");

        let result = surface
            .read_resource("r2r://api/v3/collections/c%201/documents?limit=4")
            .await
            .expect("read")
            .expect("owned");
        let value = serde_json::to_value(&result).expect("json");
        assert_eq!(
            value["contents"][0]["uri"],
            "r2r://api/v3/collections/c%201/documents?limit=4"
        );
        let echoed: Value =
            serde_json::from_str(value["contents"][0]["text"].as_str().expect("text")).expect("echo");
        assert_eq!(echoed["path"], "/v3/collections/c%201/documents");
        assert_eq!(echoed["query"], "limit=4");

        assert!(surface.read_resource("r2r://other/thing").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn include_and_exclude_filters_apply_to_method_and_path() {
        let options = SurfaceOptions {
            include: vec!["* /v3/documents*".to_string()],
            exclude: vec!["DELETE *".to_string()],
            ..SurfaceOptions::default()
        };
        let (_server, surface, _) = build_with(&options).await;
        let tools: Vec<String> = surface.tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(tools, vec!["create_document"]);
        assert_eq!(surface.summary().resources, 1);
        assert_eq!(surface.summary().resource_templates, 1);
    }

    #[test]
    fn canonical_names_collapse_separators() {
        assert_eq!(
            canonical_name(&Method::GET, "/v3/collections/{id}/documents"),
            "get_v3_collections_id_documents"
        );
        assert_eq!(sanitize_name("search app/v3"), "search_app_v3");
        let mut names = HashSet::from(["search".to_string()]);
        assert_eq!(reserve_unique_name(&mut names, "search"), "search_1");
        assert_eq!(reserve_unique_name(&mut names, "search"), "search_2");
    }

    #[test]
    fn suffixed_names_stay_within_the_length_limit() {
        let long = sanitize_name(&"a".repeat(80));
        assert_eq!(long.len(), MAX_TOOL_NAME_LEN);
        let mut names = HashSet::new();
        assert_eq!(reserve_unique_name(&mut names, &long), long);

        let second = reserve_unique_name(&mut names, &long);
        assert_eq!(second.len(), MAX_TOOL_NAME_LEN);
        assert!(second.ends_with("_1"));

        let third = reserve_unique_name(&mut names, &long);
        assert_eq!(third.len(), MAX_TOOL_NAME_LEN);
        assert!(third.ends_with("_2"));
        assert_ne!(second, third);
    }

    #[test]
    fn template_matcher_captures_segments() {
        let (re, names) = template_matcher("r2r://api", "/v3/collections/{id}/documents").expect("matcher");
        assert_eq!(names, vec!["id"]);
        let caps = re.captures("r2r://api/v3/collections/abc/documents").expect("match");
        assert_eq!(&caps[1], "abc");
        assert!(!re.is_match("r2r://api/v3/collections/a/b/documents"));
    }
}
