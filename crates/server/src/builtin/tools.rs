//! Hand-written tools layered on top of R2R search and client-side sampling.

use crate::error::{Result, ServerError};
use crate::pipeline::{
    AnalyzeStep, CachedStep, Pipeline, SearchStep, StepCache, SummarizeStep, numbered_texts,
    timestamp,
};
use crate::sampling::{Sampler, SamplingRequest, sample_structured_output};
use r2r_http_client::ApiClient;
use r2r_http_client::types::SearchRequest;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const ENHANCED_SEARCH: &str = "enhanced_search";
pub const ANALYZE_SEARCH_RESULTS: &str = "analyze_search_results";
pub const RESEARCH_PIPELINE: &str = "research_pipeline";
pub const COMPARATIVE_ANALYSIS: &str = "comparative_analysis";
pub const EXTRACT_STRUCTURED_DATA: &str = "extract_structured_data";
pub const GENERATE_FOLLOWUP_QUESTIONS: &str = "generate_followup_questions";

pub const TOOL_NAMES: [&str; 6] = [
    ENHANCED_SEARCH,
    ANALYZE_SEARCH_RESULTS,
    RESEARCH_PIPELINE,
    COMPARATIVE_ANALYSIS,
    EXTRACT_STRUCTURED_DATA,
    GENERATE_FOLLOWUP_QUESTIONS,
];

const MAX_FOLLOWUP_QUESTIONS: u32 = 10;
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(300);

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

/// Everything a built-in tool call needs besides its arguments.
pub struct ToolContext<'a> {
    pub client: &'a ApiClient,
    pub sampler: &'a dyn Sampler,
    pub cache: &'a StepCache,
}

#[must_use]
pub fn tools() -> Vec<Tool> {
    vec![
        tool(
            ENHANCED_SEARCH,
            "Search the R2R knowledge base with a chosen search mode",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "limit": {"type": "integer", "default": 10, "minimum": 1},
                    "search_type": {
                        "type": "string",
                        "enum": ["hybrid", "semantic", "fulltext"],
                        "default": "hybrid"
                    }
                },
                "required": ["query"]
            }),
            true,
        ),
        tool(
            ANALYZE_SEARCH_RESULTS,
            "Search R2R and have the client's model analyze the top results",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 5, "minimum": 1}
                },
                "required": ["query"]
            }),
            true,
        ),
        tool(
            RESEARCH_PIPELINE,
            "Multi-step research pipeline: search, analyze, summarize",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Research question or topic"},
                    "analysis_depth": {
                        "type": "string",
                        "enum": ["quick", "standard", "deep"],
                        "default": "standard"
                    }
                },
                "required": ["query"]
            }),
            true,
        ),
        tool(
            COMPARATIVE_ANALYSIS,
            "Compare the search results of 2 to 5 queries",
            json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 2,
                        "maxItems": 5
                    },
                    "comparison_criteria": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["queries"]
            }),
            true,
        ),
        tool(
            EXTRACT_STRUCTURED_DATA,
            "Extract structured JSON from a document according to a schema",
            json!({
                "type": "object",
                "properties": {
                    "document_id": {"type": "string", "description": "R2R document UUID"},
                    "extraction_schema": {
                        "type": "object",
                        "description": "Shape of the desired output, e.g. {\"title\": \"string\"}"
                    }
                },
                "required": ["document_id", "extraction_schema"]
            }),
            true,
        ),
        tool(
            GENERATE_FOLLOWUP_QUESTIONS,
            "Generate follow-up questions for exploring a topic",
            json!({
                "type": "object",
                "properties": {
                    "initial_query": {"type": "string"},
                    "num_questions": {
                        "type": "integer",
                        "default": 5,
                        "minimum": 1,
                        "maximum": MAX_FOLLOWUP_QUESTIONS
                    }
                },
                "required": ["initial_query"]
            }),
            false,
        ),
    ]
}

fn tool(name: &'static str, description: &'static str, schema: Value, searches: bool) -> Tool {
    let schema: JsonObject = match schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    let mut tool = Tool::new(name, description, Arc::new(schema));
    tool.annotations = Some(ToolAnnotations {
        title: None,
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(false),
        open_world_hint: Some(searches),
    });
    tool
}

/// Run a built-in tool.
///
/// API and sampling failures come back as error results.
///
/// # Errors
///
/// Returns [`ServerError::InvalidArguments`] for unknown tools and malformed arguments.
pub async fn call_tool(
    name: &str,
    arguments: Option<Map<String, Value>>,
    ctx: &ToolContext<'_>,
) -> Result<CallToolResult> {
    let args = Value::Object(arguments.unwrap_or_default());
    let outcome = match name {
        ENHANCED_SEARCH => enhanced_search(ctx, parse(args)?).await,
        ANALYZE_SEARCH_RESULTS => analyze_search_results(ctx, parse(args)?).await,
        RESEARCH_PIPELINE => research_pipeline(ctx, parse(args)?).await,
        COMPARATIVE_ANALYSIS => comparative_analysis(ctx, parse(args)?).await,
        EXTRACT_STRUCTURED_DATA => extract_structured_data(ctx, parse(args)?).await,
        GENERATE_FOLLOWUP_QUESTIONS => generate_followup_questions(ctx, parse(args)?).await,
        _ => return Err(ServerError::InvalidArguments(format!("Unknown tool: {name}"))),
    };

    match outcome {
        Ok(payload) => Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&payload)?,
        )])),
        Err(e @ ServerError::InvalidArguments(_)) => Err(e),
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "built-in tool failed");
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| ServerError::InvalidArguments(e.to_string()))
}

fn default_search_limit() -> u32 {
    10
}

fn default_analysis_limit() -> u32 {
    5
}

fn default_search_type() -> String {
    "hybrid".to_string()
}

fn default_depth() -> String {
    "standard".to_string()
}

fn default_num_questions() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
struct EnhancedSearchArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
    #[serde(default = "default_search_type")]
    search_type: String,
}

async fn enhanced_search(ctx: &ToolContext<'_>, args: EnhancedSearchArgs) -> Result<Value> {
    tracing::info!(query = %args.query, search_type = %args.search_type, "enhanced search");
    let request = SearchRequest::new(args.query.clone(), args.limit)
        .with_hybrid(args.search_type == "hybrid")
        .with_semantic(matches!(args.search_type.as_str(), "semantic" | "hybrid"));
    let results = ctx.client.search(&request).await?;
    let result_count = results.chunk_search_results.len();
    tracing::debug!(result_count, "enhanced search complete");

    Ok(json!({
        "query": args.query,
        "search_type": args.search_type,
        "results": results,
        "result_count": result_count,
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    query: String,
    #[serde(default = "default_analysis_limit")]
    limit: u32,
}

async fn analyze_search_results(ctx: &ToolContext<'_>, args: AnalyzeArgs) -> Result<Value> {
    let results = ctx
        .client
        .search(&SearchRequest::new(args.query.clone(), args.limit))
        .await?;
    let chunks = results.chunk_search_results;
    if chunks.is_empty() {
        return Ok(json!({
            "query": args.query,
            "result_count": 0,
            "analysis": "No results found",
        }));
    }

    let results_text = numbered_texts(&serde_json::to_value(&chunks)?, Some(5), Some(200));
    let prompt = format!(
        "Analyze these search results for the query: \"{}\"\n\n\
         Results:\n{results_text}\n\n\
         Provide:\n\
         1. Key themes and patterns\n\
         2. Relevance assessment\n\
         3. Suggested follow-up questions",
        args.query
    );
    let analysis = ctx
        .sampler
        .sample(
            SamplingRequest::new(prompt)
                .with_system_prompt("You are an expert data analyst. Provide concise, structured analysis.")
                .with_temperature(0.3)
                .with_max_tokens(500),
        )
        .await?;

    Ok(json!({
        "query": args.query,
        "result_count": chunks.len(),
        "analysis": analysis,
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ResearchArgs {
    query: String,
    #[serde(default = "default_depth")]
    analysis_depth: String,
}

/// `(search limit, analysis max tokens)` for a depth name.
fn depth_budget(depth: &str) -> (u32, u32) {
    match depth {
        "quick" => (5, 500),
        "standard" => (10, 1000),
        "deep" => (20, 2000),
        other => {
            tracing::warn!(depth = %other, "unknown analysis depth; using standard");
            (10, 1000)
        }
    }
}

async fn research_pipeline(ctx: &ToolContext<'_>, args: ResearchArgs) -> Result<Value> {
    let (limit, max_tokens) = depth_budget(&args.analysis_depth);
    tracing::info!(query = %args.query, depth = %args.analysis_depth, "starting research pipeline");

    let search = CachedStep::new(
        format!("search:{limit}:{}", args.query),
        SEARCH_CACHE_TTL,
        ctx.cache.clone(),
        SearchStep::new(ctx.client.clone(), args.query.clone(), limit),
    );
    let results = Pipeline::new()
        .add_step("search", search)
        .add_step("analyze", AnalyzeStep::new(max_tokens))
        .add_step("summarize", SummarizeStep)
        .execute(ctx.sampler)
        .await?;

    let search_results_count = results
        .get("search")
        .and_then(|s| s["results"].as_array())
        .map_or(0, Vec::len);
    Ok(json!({
        "query": args.query,
        "analysis_depth": args.analysis_depth,
        "summary": results.get("summarize").map(|s| s["summary"].clone()),
        "full_analysis": results.get("analyze").map(|a| a["analysis"].clone()),
        "search_results_count": search_results_count,
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ComparativeArgs {
    queries: Vec<String>,
    #[serde(default)]
    comparison_criteria: Option<Vec<String>>,
}

async fn comparative_analysis(ctx: &ToolContext<'_>, args: ComparativeArgs) -> Result<Value> {
    if args.queries.len() < 2 {
        return Err(ServerError::InvalidArguments(
            "At least 2 queries required for comparison".to_string(),
        ));
    }
    if args.queries.len() > 5 {
        return Err(ServerError::InvalidArguments(
            "Maximum 5 queries allowed".to_string(),
        ));
    }

    let mut sections = Vec::with_capacity(args.queries.len());
    for (i, query) in args.queries.iter().enumerate() {
        tracing::debug!(query = %query, "searching for comparison");
        let results = ctx.client.search(&SearchRequest::new(query.clone(), 5)).await?;
        let texts = numbered_texts(
            &serde_json::to_value(&results.chunk_search_results)?,
            None,
            Some(300),
        );
        let texts = if texts.is_empty() { "No results found".to_string() } else { texts };
        sections.push(format!("Query {}: {query}\nResults:\n{texts}", i + 1));
    }

    let criteria = args
        .comparison_criteria
        .as_ref()
        .filter(|c| !c.is_empty())
        .map(|c| format!("\n\nComparison Criteria: {}", c.join(", ")))
        .unwrap_or_default();
    let prompt = format!(
        "Compare the following search queries and their results:\n\n\
         {}{criteria}\n\n\
         Provide a structured comparison including:\n\
         1. Key similarities and differences\n\
         2. Strengths and limitations of each\n\
         3. Best use cases for each\n\
         4. Overall recommendation",
        sections.join("\n\n")
    );
    let comparison = ctx
        .sampler
        .sample(
            SamplingRequest::new(prompt)
                .with_system_prompt(
                    "You are an expert analyst specializing in comparative analysis and synthesis.",
                )
                .with_temperature(0.4)
                .with_max_tokens(2000),
        )
        .await?;

    Ok(json!({
        "queries": args.queries,
        "comparison": comparison,
        "criteria": args.comparison_criteria,
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    document_id: String,
    extraction_schema: Value,
}

async fn extract_structured_data(ctx: &ToolContext<'_>, args: ExtractArgs) -> Result<Value> {
    tracing::info!(document_id = %args.document_id, "extracting structured data");
    let document = ctx.client.get_document(&args.document_id).await?;
    let content = document.get("results").unwrap_or(&document).clone();

    let extracted = sample_structured_output(
        ctx.sampler,
        &json!({
            "document_id": args.document_id,
            "content": content,
            "schema": args.extraction_schema,
        }),
        "json",
    )
    .await?;

    Ok(json!({
        "document_id": args.document_id,
        "schema": args.extraction_schema,
        "extracted_data": extracted,
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct FollowupArgs {
    initial_query: String,
    #[serde(default = "default_num_questions")]
    num_questions: u32,
}

async fn generate_followup_questions(ctx: &ToolContext<'_>, args: FollowupArgs) -> Result<Value> {
    let count = args.num_questions.min(MAX_FOLLOWUP_QUESTIONS);
    let prompt = format!(
        "Based on the query: \"{}\"\n\n\
         Generate {count} insightful follow-up questions that would help explore this topic more deeply.\n\n\
         Questions should:\n\
         1. Build on the initial query\n\
         2. Cover different aspects (technical, practical, comparative, etc.)\n\
         3. Be specific and answerable\n\
         4. Progress from basic to advanced\n\n\
         Format as a numbered list.",
        args.initial_query
    );
    let text = ctx
        .sampler
        .sample(
            SamplingRequest::new(prompt)
                .with_system_prompt(
                    "You are an expert at generating insightful questions for research and exploration.",
                )
                .with_temperature(0.7)
                .with_max_tokens(800),
        )
        .await?;

    let questions = numbered_lines(&text);
    Ok(json!({
        "initial_query": args.initial_query,
        "follow_up_questions": questions,
        "count": questions.len(),
        "timestamp": timestamp(),
    }))
}

/// Trimmed lines that start with `1.` through `19.`.
fn numbered_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| (1..20).any(|n| line.starts_with(&format!("{n}."))))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::testing::ScriptedSampler;
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::routing::{get, post};
    use r2r_http_client::BearerAuth;
    use r2r_test_support::TestHttpServer;

    async fn r2r_stub() -> TestHttpServer {
        let app = Router::new()
            .route(
                "/v3/retrieval/search",
                post(|Json(body): Json<Value>| async move {
                    let query = body["query"].as_str().unwrap_or_default().to_string();
                    if query == "nothing" {
                        return Json(json!({"results": {"chunk_search_results": []}}));
                    }
                    Json(json!({"results": {
                        "chunk_search_results": [
                            {"id": "c1", "document_id": "d1", "owner_id": "u1", "text": format!("{query} chunk one"), "score": 0.9},
                            {"id": "c2", "document_id": "d2", "text": "x".repeat(400), "score": 0.5}
                        ],
                        "graph_search_results": null,
                        "document_search_results": [{"id": "d1"}],
                        "echo_settings": body["search_settings"]
                    }}))
                }),
            )
            .route(
                "/v3/documents/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({"results": {"id": id, "title": "Attention Is All You Need"}}))
                }),
            );
        TestHttpServer::spawn(app).await.expect("stub server")
    }

    fn client(server: &TestHttpServer) -> ApiClient {
        ApiClient::new(
            server.base_url(),
            BearerAuth::from_env("R2R_TOOLS_TEST_UNSET_KEY"),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn args(v: Value) -> Option<Map<String, Value>> {
        v.as_object().cloned()
    }

    fn payload(result: &CallToolResult) -> Value {
        let value = serde_json::to_value(result).expect("serialize");
        let text = value["content"][0]["text"].as_str().expect("text content");
        serde_json::from_str(text).unwrap_or_else(|_| json!(text))
    }

    fn is_error(result: &CallToolResult) -> bool {
        result.is_error == Some(true)
    }

    #[test]
    fn lists_six_tools_with_object_schemas() {
        let tools = tools();
        assert_eq!(tools.len(), TOOL_NAMES.len());
        for t in &tools {
            assert!(is_builtin(&t.name));
            assert_eq!(t.input_schema["type"], "object");
        }
    }

    #[tokio::test]
    async fn enhanced_search_maps_search_type() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(
            ENHANCED_SEARCH,
            args(json!({"query": "rag", "search_type": "semantic", "limit": 3})),
            &ctx,
        )
        .await
        .expect("call");
        let body = payload(&result);
        assert_eq!(body["result_count"], 2);
        assert_eq!(body["search_type"], "semantic");
        assert!(body["timestamp"].is_string());
        let results = &body["results"];
        assert_eq!(results["echo_settings"]["use_semantic_search"], true);
        assert_eq!(results["echo_settings"]["use_hybrid_search"], false);
        assert_eq!(results["chunk_search_results"][0]["owner_id"], "u1");
        assert_eq!(results["document_search_results"][0]["id"], "d1");
        assert_eq!(results["graph_search_results"], json!([]));
        assert!(sampler.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn analyze_truncates_chunks_and_samples() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::new(["themes: attention"]);
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(ANALYZE_SEARCH_RESULTS, args(json!({"query": "rag"})), &ctx)
            .await
            .expect("call");
        assert_eq!(payload(&result)["analysis"], "themes: attention");

        let requests = sampler.requests.lock();
        assert_eq!(requests[0].temperature, Some(0.3));
        assert_eq!(requests[0].max_tokens, 500);
        let prompt = &requests[0].messages[0].1;
        assert!(prompt.contains("Result 1: rag chunk one"));
        assert!(prompt.contains(&format!("Result 2: {}...", "x".repeat(200))));
    }

    #[tokio::test]
    async fn analyze_without_results_skips_sampling() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(ANALYZE_SEARCH_RESULTS, args(json!({"query": "nothing"})), &ctx)
            .await
            .expect("call");
        assert_eq!(payload(&result)["analysis"], "No results found");
        assert!(sampler.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn research_pipeline_uses_depth_budget_and_caches_search() {
        let server = r2r_stub().await;
        let client = client(&server);
        let cache = StepCache::default();
        let sampler = ScriptedSampler::new(["analysis", "summary", "analysis 2", "summary 2"]);
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &cache };

        let result = call_tool(
            RESEARCH_PIPELINE,
            args(json!({"query": "rag", "analysis_depth": "deep"})),
            &ctx,
        )
        .await
        .expect("call");
        let body = payload(&result);
        assert_eq!(body["summary"], "summary");
        assert_eq!(body["full_analysis"], "analysis");
        assert_eq!(body["search_results_count"], 2);
        assert_eq!(sampler.requests.lock()[0].max_tokens, 2000);

        call_tool(RESEARCH_PIPELINE, args(json!({"query": "rag", "analysis_depth": "deep"})), &ctx)
            .await
            .expect("second call");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_depth_falls_back_to_standard() {
        assert_eq!(depth_budget("quick"), (5, 500));
        assert_eq!(depth_budget("exhaustive"), (10, 1000));
    }

    #[tokio::test]
    async fn comparative_analysis_validates_query_count() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let err = call_tool(COMPARATIVE_ANALYSIS, args(json!({"queries": ["only one"]})), &ctx)
            .await
            .expect_err("too few queries");
        assert!(matches!(err, ServerError::InvalidArguments(_)));

        let six: Vec<String> = (0..6).map(|i| format!("q{i}")).collect();
        let err = call_tool(COMPARATIVE_ANALYSIS, args(json!({"queries": six})), &ctx)
            .await
            .expect_err("too many queries");
        assert!(err.to_string().contains("Maximum 5"));
    }

    #[tokio::test]
    async fn comparative_analysis_includes_real_results_and_criteria() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::new(["comparison"]);
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(
            COMPARATIVE_ANALYSIS,
            args(json!({"queries": ["rag", "fine-tuning"], "comparison_criteria": ["cost"]})),
            &ctx,
        )
        .await
        .expect("call");
        assert_eq!(payload(&result)["comparison"], "comparison");

        let prompt = sampler.prompts().remove(0);
        assert!(prompt.contains("Query 2: fine-tuning"));
        assert!(prompt.contains("fine-tuning chunk one"));
        assert!(prompt.contains("Comparison Criteria: cost"));
    }

    #[tokio::test]
    async fn extract_structured_data_reads_document() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::new([r#"{"title": "Attention Is All You Need"}"#]);
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(
            EXTRACT_STRUCTURED_DATA,
            args(json!({"document_id": "doc-1", "extraction_schema": {"title": "string"}})),
            &ctx,
        )
        .await
        .expect("call");
        let body = payload(&result);
        assert_eq!(body["extracted_data"]["title"], "Attention Is All You Need");
        assert!(sampler.prompts()[0].contains("doc-1"));
    }

    #[tokio::test]
    async fn followup_questions_are_capped_and_parsed() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::new(["Here you go:\n1. What is X?\n  2. Why Y?\nnotes\n10. Z?"]);
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(
            GENERATE_FOLLOWUP_QUESTIONS,
            args(json!({"initial_query": "GraphRAG", "num_questions": 50})),
            &ctx,
        )
        .await
        .expect("call");
        let body = payload(&result);
        assert_eq!(body["count"], 3);
        assert_eq!(body["follow_up_questions"][1], "2. Why Y?");

        let requests = sampler.requests.lock();
        assert!(requests[0].messages[0].1.contains("Generate 10 insightful"));
        assert_eq!(requests[0].temperature, Some(0.7));
        assert_eq!(requests[0].max_tokens, 800);
    }

    #[tokio::test]
    async fn sampling_failure_becomes_error_result() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(GENERATE_FOLLOWUP_QUESTIONS, args(json!({"initial_query": "x"})), &ctx)
            .await
            .expect("call");
        assert!(is_error(&result));
    }

    #[tokio::test]
    async fn api_failure_becomes_error_result() {
        let server = TestHttpServer::spawn(Router::new()).await.expect("stub server");
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let result = call_tool(ENHANCED_SEARCH, args(json!({"query": "rag"})), &ctx)
            .await
            .expect("call");
        assert!(is_error(&result));
        assert!(payload(&result).as_str().is_some_and(|t| t.contains("404")));
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid() {
        let server = r2r_stub().await;
        let client = client(&server);
        let sampler = ScriptedSampler::default();
        let ctx = ToolContext { client: &client, sampler: &sampler, cache: &StepCache::default() };

        let err = call_tool(ENHANCED_SEARCH, None, &ctx).await.expect_err("query is required");
        assert!(matches!(err, ServerError::InvalidArguments(_)));
    }
}
