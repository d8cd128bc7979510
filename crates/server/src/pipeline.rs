//! Multi-step research pipelines built from R2R search and client-side sampling.
//!
//! A [`Pipeline`] runs named steps in order. Each step sees the results of the steps before it,
//! keyed by step name, and may be guarded by a condition over those results.

use crate::error::{Result, ServerError};
use crate::sampling::{Sampler, SamplingRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use r2r_http_client::ApiClient;
use r2r_http_client::format::truncate_chars;
use r2r_http_client::types::SearchRequest;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Results of completed steps, keyed by step name.
pub type StepResults = Map<String, Value>;

pub type Condition = Box<dyn Fn(&StepResults) -> bool + Send + Sync>;

#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn run(&self, sampler: &dyn Sampler, previous: &StepResults) -> Result<Value>;
}

struct NamedStep {
    name: String,
    step: Box<dyn PipelineStep>,
    condition: Option<Condition>,
}

#[derive(Default)]
pub struct Pipeline {
    steps: Vec<NamedStep>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_step(mut self, name: impl Into<String>, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(NamedStep {
            name: name.into(),
            step: Box::new(step),
            condition: None,
        });
        self
    }

    /// Add a step that only runs when `condition` holds for the results so far.
    #[must_use]
    pub fn add_conditional_step(
        mut self,
        name: impl Into<String>,
        step: impl PipelineStep + 'static,
        condition: impl Fn(&StepResults) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(NamedStep {
            name: name.into(),
            step: Box::new(step),
            condition: Some(Box::new(condition)),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order.
    ///
    /// # Errors
    ///
    /// Aborts with [`ServerError::Pipeline`] naming the first step that fails.
    pub async fn execute(&self, sampler: &dyn Sampler) -> Result<StepResults> {
        let mut results = StepResults::new();
        tracing::debug!(steps = self.steps.len(), "starting pipeline");

        for (idx, named) in self.steps.iter().enumerate() {
            if let Some(condition) = &named.condition
                && !condition(&results)
            {
                tracing::info!(step = %named.name, "skipping step (condition not met)");
                continue;
            }

            tracing::debug!(step = %named.name, position = idx + 1, "running step");
            let value = named
                .step
                .run(sampler, &results)
                .await
                .map_err(|e| ServerError::Pipeline {
                    step: named.name.clone(),
                    message: e.to_string(),
                })?;
            results.insert(named.name.clone(), value);
        }

        tracing::debug!(results = results.len(), "pipeline complete");
        Ok(results)
    }
}

/// Runs `primary`, and `fallback` if it fails.
pub struct FallbackStep<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackStep<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: PipelineStep, F: PipelineStep> PipelineStep for FallbackStep<P, F> {
    async fn run(&self, sampler: &dyn Sampler, previous: &StepResults) -> Result<Value> {
        match self.primary.run(sampler, previous).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(error = %e, "primary step failed; using fallback");
                self.fallback.run(sampler, previous).await
            }
        }
    }
}

/// Shared TTL cache for [`CachedStep`] results.
#[derive(Debug, Clone, Default)]
pub struct StepCache {
    entries: Arc<Mutex<HashMap<String, (Instant, Value)>>>,
}

impl StepCache {
    #[must_use]
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(key.into(), (Instant::now(), value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Serves `inner`'s result from the cache while it is younger than `ttl`.
pub struct CachedStep<S> {
    key: String,
    ttl: Duration,
    cache: StepCache,
    inner: S,
}

impl<S> CachedStep<S> {
    pub fn new(key: impl Into<String>, ttl: Duration, cache: StepCache, inner: S) -> Self {
        Self {
            key: key.into(),
            ttl,
            cache,
            inner,
        }
    }
}

#[async_trait]
impl<S: PipelineStep> PipelineStep for CachedStep<S> {
    async fn run(&self, sampler: &dyn Sampler, previous: &StepResults) -> Result<Value> {
        if let Some(hit) = self.cache.get(&self.key, self.ttl) {
            tracing::debug!(key = %self.key, "step cache hit");
            return Ok(hit);
        }
        let value = self.inner.run(sampler, previous).await?;
        self.cache.insert(self.key.clone(), value.clone());
        Ok(value)
    }
}

/// R2R search. Produces `{query, results: [{id, document_id, text, score}]}`.
pub struct SearchStep {
    client: ApiClient,
    query: String,
    limit: u32,
}

impl SearchStep {
    pub fn new(client: ApiClient, query: impl Into<String>, limit: u32) -> Self {
        Self {
            client,
            query: query.into(),
            limit,
        }
    }
}

#[async_trait]
impl PipelineStep for SearchStep {
    async fn run(&self, _sampler: &dyn Sampler, _previous: &StepResults) -> Result<Value> {
        let results = self
            .client
            .search(&SearchRequest::new(self.query.clone(), self.limit))
            .await?;
        Ok(json!({
            "query": self.query,
            "results": results.chunk_search_results,
        }))
    }
}

/// Samples an analysis of the `search` step's results.
pub struct AnalyzeStep {
    max_tokens: u32,
}

impl AnalyzeStep {
    #[must_use]
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }
}

impl Default for AnalyzeStep {
    fn default() -> Self {
        Self::new(1500)
    }
}

#[async_trait]
impl PipelineStep for AnalyzeStep {
    async fn run(&self, sampler: &dyn Sampler, previous: &StepResults) -> Result<Value> {
        let search = previous
            .get("search")
            .ok_or_else(|| ServerError::InvalidArguments("no search results to analyze".into()))?;
        let query = search["query"].as_str().unwrap_or_default();
        let results_text = numbered_texts(&search["results"], None, None);

        let prompt = format!(
            "Analyze the following search results and provide:\n\
             1. Key themes and patterns\n\
             2. Main insights\n\
             3. Recommended follow-up questions\n\n\
             Search Query: {query}\n\n\
             Results:\n{results_text}\n\n\
             Please provide a structured analysis."
        );
        let analysis = sampler
            .sample(
                SamplingRequest::new(prompt)
                    .with_system_prompt(
                        "You are an expert data analyst specializing in information synthesis.",
                    )
                    .with_temperature(0.4)
                    .with_max_tokens(self.max_tokens),
            )
            .await?;
        tracing::debug!(chars = analysis.len(), "analysis complete");

        Ok(json!({ "analysis": analysis, "timestamp": timestamp() }))
    }
}

/// Samples an executive summary of the `analyze` step's output.
#[derive(Default)]
pub struct SummarizeStep;

#[async_trait]
impl PipelineStep for SummarizeStep {
    async fn run(&self, sampler: &dyn Sampler, previous: &StepResults) -> Result<Value> {
        let analysis = previous
            .get("analyze")
            .and_then(|a| a["analysis"].as_str())
            .ok_or_else(|| ServerError::InvalidArguments("no analysis to summarize".into()))?;

        let prompt = format!(
            "Create a concise executive summary (2-3 sentences) of this analysis:\n\n\
             {analysis}\n\n\
             Focus on the most important insights and actionable recommendations."
        );
        let summary = sampler
            .sample(
                SamplingRequest::new(prompt)
                    .with_temperature(0.3)
                    .with_max_tokens(300),
            )
            .await?;

        Ok(json!({
            "summary": summary,
            "full_analysis": analysis,
            "timestamp": timestamp(),
        }))
    }
}

/// Analyze each item concurrently. Items whose sampling fails are dropped.
pub async fn analyze_in_parallel(sampler: &dyn Sampler, items: &[Value], max_tokens: u32) -> Vec<Value> {
    let tasks = items.iter().enumerate().map(|(idx, item)| async move {
        let text = item["text"].as_str().unwrap_or_default();
        let request = SamplingRequest::new(format!(
            "Analyze this content and extract key points:\n\n{text}"
        ))
        .with_temperature(0.3)
        .with_max_tokens(max_tokens);

        match sampler.sample(request).await {
            Ok(analysis) => Some(json!({
                "id": item.get("id").cloned().unwrap_or_else(|| json!(idx)),
                "analysis": analysis,
                "timestamp": timestamp(),
            })),
            Err(e) => {
                tracing::warn!(item = idx, error = %e, "parallel analysis failed for item");
                None
            }
        }
    });

    let results: Vec<Value> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .flatten()
        .collect();
    tracing::debug!(completed = results.len(), total = items.len(), "parallel analysis done");
    results
}

/// `"Result {n}: {text}"` lines separated by blank lines, optionally truncated.
pub(crate) fn numbered_texts(results: &Value, take: Option<usize>, max_chars: Option<usize>) -> String {
    results
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(take.unwrap_or(usize::MAX))
                .enumerate()
                .map(|(i, r)| {
                    let text = r["text"].as_str().unwrap_or_default();
                    let text = max_chars.map_or_else(|| text.to_string(), |m| truncate_chars(text, m));
                    format!("Result {}: {text}", i + 1)
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default()
}

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::testing::ScriptedSampler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Value);

    #[async_trait]
    impl PipelineStep for Fixed {
        async fn run(&self, _: &dyn Sampler, _: &StepResults) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl PipelineStep for Failing {
        async fn run(&self, _: &dyn Sampler, _: &StepResults) -> Result<Value> {
            Err(ServerError::Sampling("model unavailable".into()))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl PipelineStep for Counting {
        async fn run(&self, _: &dyn Sampler, _: &StepResults) -> Result<Value> {
            Ok(json!(self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    fn search_result() -> Value {
        json!({"query": "rag", "results": [{"text": "first chunk"}, {"text": "second chunk"}]})
    }

    #[tokio::test]
    async fn steps_see_previous_results_in_order() {
        let sampler = ScriptedSampler::new(["the analysis", "the summary"]);
        let results = Pipeline::new()
            .add_step("search", Fixed(search_result()))
            .add_step("analyze", AnalyzeStep::new(500))
            .add_step("summarize", SummarizeStep)
            .execute(&sampler)
            .await
            .expect("pipeline");

        assert_eq!(results["analyze"]["analysis"], "the analysis");
        assert_eq!(results["summarize"]["summary"], "the summary");
        assert_eq!(results["summarize"]["full_analysis"], "the analysis");

        let requests = sampler.requests.lock();
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[0].temperature, Some(0.4));
        assert!(requests[0].messages[0].1.contains("Result 2: second chunk"));
        assert_eq!(requests[1].max_tokens, 300);
    }

    #[tokio::test]
    async fn failing_step_aborts_with_its_name() {
        let sampler = ScriptedSampler::new(Vec::<String>::new());
        let err = Pipeline::new()
            .add_step("search", Fixed(search_result()))
            .add_step("analyze", Failing)
            .add_step("summarize", SummarizeStep)
            .execute(&sampler)
            .await
            .expect_err("must fail");
        match err {
            ServerError::Pipeline { step, message } => {
                assert_eq!(step, "analyze");
                assert!(message.contains("model unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn conditional_steps_are_skipped_when_condition_fails() {
        let sampler = ScriptedSampler::new(Vec::<String>::new());
        let results = Pipeline::new()
            .add_step("search", Fixed(json!({"query": "x", "results": []})))
            .add_conditional_step("analyze", AnalyzeStep::default(), |r| {
                r["search"]["results"].as_array().is_some_and(|a| !a.is_empty())
            })
            .execute(&sampler)
            .await
            .expect("pipeline");
        assert!(results.contains_key("search"));
        assert!(!results.contains_key("analyze"));
        assert!(sampler.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn fallback_runs_when_primary_fails() {
        let sampler = ScriptedSampler::new(Vec::<String>::new());
        let step = FallbackStep::new(Failing, Fixed(json!("fallback")));
        let value = step.run(&sampler, &StepResults::new()).await.expect("fallback");
        assert_eq!(value, "fallback");
    }

    #[tokio::test]
    async fn cached_step_reuses_results_until_expiry() {
        let sampler = ScriptedSampler::new(Vec::<String>::new());
        let cache = StepCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let step = CachedStep::new("k", Duration::from_secs(60), cache.clone(), Counting(calls.clone()));
        assert_eq!(step.run(&sampler, &StepResults::new()).await.expect("run"), 0);
        assert_eq!(step.run(&sampler, &StepResults::new()).await.expect("run"), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let expired = CachedStep::new("k", Duration::ZERO, cache.clone(), Counting(calls.clone()));
        assert_eq!(expired.run(&sampler, &StepResults::new()).await.expect("run"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn parallel_analysis_drops_failures() {
        let sampler = ScriptedSampler::new(["a"]);
        let items = vec![json!({"id": "1", "text": "one"}), json!({"text": "two"})];
        let results = analyze_in_parallel(&sampler, &items, 500).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["analysis"], "a");
    }

    #[test]
    fn numbered_texts_truncates() {
        let results = json!([{"text": "abcdef"}, {"text": "xyz"}, {"text": "ignored"}]);
        assert_eq!(
            numbered_texts(&results, Some(2), Some(3)),
            "Result 1: abc...\n\nResult 2: xyz"
        );
    }
}
