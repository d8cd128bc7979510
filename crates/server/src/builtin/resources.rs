//! Server-describing resources and convenience resource templates over the R2R API.

use crate::error::Result;
use crate::pipeline::timestamp;
use crate::server::ServerState;
use r2r_http_client::ApiClient;
use r2r_http_client::types::SearchRequest;
use r2r_openapi_tools::{RouteClassifier, SkippedEndpoint, json_resource_contents};
use rmcp::model::{Annotated, RawResource, ReadResourceResult, Resource, ResourceTemplate};
use serde_json::{Value, json};

pub const SERVER_INFO_URI: &str = "r2r://server/info";
pub const SERVER_ROUTES_URI: &str = "r2r://server/routes";

const DOCUMENT_PREFIX: &str = "r2r://documents/";
const COLLECTION_PREFIX: &str = "r2r://collections/";
const SEARCH_PREFIX: &str = "r2r://search/results/";
const DEFAULT_SEARCH_LIMIT: u32 = 10;
const JSON_MIME: &str = "application/json";

#[must_use]
pub fn resources() -> Vec<Resource> {
    [
        (
            SERVER_INFO_URI,
            "server_info",
            "Server configuration, loaded API document and generated surface",
        ),
        (
            SERVER_ROUTES_URI,
            "server_routes",
            "Route classification rules and skipped endpoints",
        ),
    ]
    .into_iter()
    .map(|(uri, name, description)| {
        let mut raw = RawResource::new(uri, name);
        raw.description = Some(description.to_string());
        raw.mime_type = Some(JSON_MIME.to_string());
        Annotated::new(raw, None)
    })
    .collect()
}

#[must_use]
pub fn resource_templates() -> Vec<ResourceTemplate> {
    [
        (
            "r2r://documents/{document_id}",
            "document",
            "Fetch an R2R document by id",
        ),
        (
            "r2r://collections/{collection_id}/summary",
            "collection_summary",
            "Collection details with its documents",
        ),
        (
            "r2r://search/results/{query}{?limit}",
            "search_results",
            "Search the R2R knowledge base (limit defaults to 10)",
        ),
    ]
    .into_iter()
    .filter_map(|(uri_template, name, description)| {
        serde_json::from_value(json!({
            "uriTemplate": uri_template,
            "name": name,
            "description": description,
            "mimeType": JSON_MIME,
        }))
        .map_err(|e| tracing::warn!(uri_template, error = %e, "invalid resource template"))
        .ok()
    })
    .collect()
}

/// `r2r://server/info` payload.
#[must_use]
pub fn server_info(state: &ServerState) -> Value {
    let settings = &state.settings;
    let auth = state.client.auth();
    json!({
        "server": {
            "name": crate::server::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "configuration": {
            "base_url": settings.base_url,
            "openapi_url": settings.openapi_url,
            "api_key_env": auth.source_name(),
            "api_key_configured": auth.is_configured(),
            "api_key": auth.masked_token(),
            "timeout_secs": settings.timeout.as_secs(),
            "debug": settings.debug,
        },
        "openapi": {
            "title": state.spec.title,
            "version": state.spec.version,
            "openapi_version": state.spec.openapi_version,
            "path_count": state.spec.path_count,
            "origin": state.spec.origin,
            "sha256": state.spec.sha256,
        },
        "surface": state.surface.summary(),
    })
}

/// `r2r://server/routes` payload. Rules are listed in evaluation order.
#[must_use]
pub fn routes_report(classifier: &RouteClassifier, skipped: &[SkippedEndpoint]) -> Value {
    let rules: Vec<Value> = classifier
        .rules()
        .iter()
        .enumerate()
        .map(|(priority, rule)| {
            json!({
                "priority": priority,
                "methods": rule.methods().iter().map(ToString::to_string).collect::<Vec<_>>(),
                "pattern": rule.pattern(),
                "role": rule.role().as_str(),
                "tags": rule.tags(),
                "description": rule.description(),
            })
        })
        .collect();

    json!({
        "rules": rules,
        "skipped": skipped,
        "note": "Rules are evaluated in priority order; the first match wins.",
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateUri {
    Document(String),
    CollectionSummary(String),
    Search { query: String, limit: u32 },
}

fn parse_template_uri(uri: &str) -> Option<TemplateUri> {
    let (base, query) = match uri.split_once('?') {
        Some((base, query)) => (base, query),
        None => (uri, ""),
    };

    if let Some(id) = base.strip_prefix(DOCUMENT_PREFIX) {
        return decode_segment(id).map(TemplateUri::Document);
    }
    if let Some(rest) = base.strip_prefix(COLLECTION_PREFIX) {
        return rest
            .strip_suffix("/summary")
            .and_then(decode_segment)
            .map(TemplateUri::CollectionSummary);
    }
    if let Some(q) = base.strip_prefix(SEARCH_PREFIX) {
        let limit = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("limit="))
            .and_then(|v| match v.parse() {
                Ok(limit) => Some(limit),
                Err(_) => {
                    tracing::warn!(limit = %v, "ignoring invalid search limit");
                    None
                }
            })
            .unwrap_or(DEFAULT_SEARCH_LIMIT);
        return decode_segment(q).map(|query| TemplateUri::Search { query, limit });
    }
    None
}

/// A single non-empty, percent-decoded path segment.
fn decode_segment(raw: &str) -> Option<String> {
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

/// Read a built-in template resource. Returns `Ok(None)` for URIs no template matches.
///
/// API failures are reported inside the payload as `{"error": ..., <id>: ...}`.
///
/// # Errors
///
/// Only fails if the result cannot be serialized.
pub async fn read_template(client: &ApiClient, uri: &str) -> Result<Option<ReadResourceResult>> {
    let Some(parsed) = parse_template_uri(uri) else {
        return Ok(None);
    };

    let payload = match parsed {
        TemplateUri::Document(id) => match client.get_document(&id).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "document fetch failed");
                json!({ "error": format!("Failed to fetch document: {e}"), "document_id": id })
            }
        },
        TemplateUri::CollectionSummary(id) => collection_summary(client, &id).await,
        TemplateUri::Search { query, limit } => {
            match client.search(&SearchRequest::new(query.clone(), limit)).await {
                Ok(results) => json!({
                    "query": query,
                    "limit": limit,
                    "results": results,
                    "searched_at": timestamp(),
                }),
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search failed");
                    json!({ "error": format!("Search failed: {e}"), "query": query })
                }
            }
        }
    };

    let text = serde_json::to_string_pretty(&payload)?;
    Ok(Some(json_resource_contents(uri, JSON_MIME, &text)?))
}

async fn collection_summary(client: &ApiClient, id: &str) -> Value {
    let fetched = async {
        let collection = client.get_collection(id).await?;
        let documents = client.list_collection_documents(id).await?;
        Ok::<_, r2r_http_client::ClientError>((collection, documents))
    }
    .await;

    match fetched {
        Ok((collection, documents)) => {
            let documents = documents.get("results").cloned().unwrap_or(documents);
            let document_count = documents.as_array().map_or(0, Vec::len);
            json!({
                "collection_id": id,
                "collection": collection.get("results").cloned().unwrap_or(collection),
                "document_count": document_count,
                "documents": documents,
                "fetched_at": timestamp(),
            })
        }
        Err(e) => {
            tracing::warn!(collection_id = %id, error = %e, "collection fetch failed");
            json!({ "error": format!("Failed to fetch collection: {e}"), "collection_id": id })
        }
    }
}
