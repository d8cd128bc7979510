//! Base-URL-aware HTTP client for the R2R API.
//!
//! Every request goes through [`ApiClient::send`], which decorates it with the current bearer
//! credential immediately before it is executed.

use crate::auth::BearerAuth;
use crate::error::{ClientError, Result, redact_url};
use crate::types::{
    AgentRequest, RagAnswer, RagRequest, RagResponse, SearchRequest, SearchResponse, SearchResults,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:7272";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    auth: BearerAuth,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is not an absolute http(s) URL.
    pub fn new(base_url: &str, auth: BearerAuth, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base URL '{base_url}' must use http or https"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            base_url: parsed,
            http,
            auth,
            timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn auth(&self) -> &BearerAuth {
        &self.auth
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Join an API path (`/v3/...`) onto the base URL, keeping any base path prefix.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).map_err(|e| ClientError::Config(format!("invalid URL '{joined}': {e}")))
    }

    /// Join literal path segments, percent-encoding each one.
    fn url_for_segments(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ClientError::Config("base URL cannot carry a path".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// Start a request against `path`. Authorization is attached later, in [`Self::send`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the path does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    /// Decorate with the current credential and execute.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` on network failures. Non-2xx responses are returned as-is.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = self.auth.decorate(builder.build()?);
        tracing::debug!(
            method = %request.method(),
            url = %redact_url(request.url()),
            "sending R2R request"
        );
        Ok(self.http.execute(request).await?)
    }

    /// Execute and decode a JSON body. Empty bodies decode as `null`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Status` with the untouched body on non-2xx responses.
    pub async fn send_json(&self, builder: RequestBuilder) -> Result<Value> {
        let resp = self.send(builder).await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status { status, body });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_typed<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let value = self.send_json(builder).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_segments(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value> {
        let url = self.url_for_segments(segments)?;
        self.send_json(self.http.get(url).query(query)).await
    }

    // ---- retrieval ----------------------------------------------------------------------------

    /// `POST /v3/retrieval/search`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses, or unexpected bodies.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let builder = self
            .request(Method::POST, "/v3/retrieval/search")?
            .json(request);
        let resp: SearchResponse = self.send_typed(builder).await?;
        Ok(resp.results)
    }

    /// `POST /v3/retrieval/rag`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-2xx responses, or unexpected bodies.
    pub async fn rag(&self, request: &RagRequest) -> Result<RagAnswer> {
        let builder = self.request(Method::POST, "/v3/retrieval/rag")?.json(request);
        let resp: RagResponse = self.send_typed(builder).await?;
        Ok(resp.results)
    }

    /// `POST /v3/retrieval/agent`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or non-2xx responses.
    pub async fn agent(&self, request: &AgentRequest) -> Result<Value> {
        let builder = self.request(Method::POST, "/v3/retrieval/agent")?.json(request);
        self.send_json(builder).await
    }

    // ---- documents ----------------------------------------------------------------------------

    /// Upload a file as a new document (`POST /v3/documents`, multipart).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the file cannot be read, otherwise as [`Self::send_json`].
    pub async fn create_document_from_file(
        &self,
        path: &Path,
        metadata: &Value,
        collection_ids: &[String],
    ) -> Result<Value> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(guess_mime(path).as_ref())?;

        let form = document_form(metadata, collection_ids).part("file", part);
        let builder = self.request(Method::POST, "/v3/documents")?.multipart(form);
        self.send_json(builder).await
    }

    /// Ingest raw text as a new document (`POST /v3/documents`, multipart `raw_text`).
    ///
    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn create_document_from_text(
        &self,
        content: &str,
        metadata: &Value,
        collection_ids: &[String],
    ) -> Result<Value> {
        let form = document_form(metadata, collection_ids).text("raw_text", content.to_string());
        let builder = self.request(Method::POST, "/v3/documents")?.multipart(form);
        self.send_json(builder).await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn get_document(&self, document_id: &str) -> Result<Value> {
        self.get_segments(&["v3", "documents", document_id], &[])
            .await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn delete_document(&self, document_id: &str) -> Result<Value> {
        let url = self.url_for_segments(&["v3", "documents", document_id])?;
        self.send_json(self.http.delete(url)).await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn list_documents(&self, offset: u32, limit: u32) -> Result<Value> {
        self.get_segments(
            &["v3", "documents"],
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    // ---- collections --------------------------------------------------------------------------

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn create_collection(&self, name: &str, description: Option<&str>) -> Result<Value> {
        let mut body = json!({ "name": name });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let builder = self.request(Method::POST, "/v3/collections")?.json(&body);
        self.send_json(builder).await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn list_collections(&self, offset: u32, limit: u32) -> Result<Value> {
        self.get_segments(
            &["v3", "collections"],
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn get_collection(&self, collection_id: &str) -> Result<Value> {
        self.get_segments(&["v3", "collections", collection_id], &[])
            .await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn list_collection_documents(&self, collection_id: &str) -> Result<Value> {
        self.get_segments(&["v3", "collections", collection_id, "documents"], &[])
            .await
    }

    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn add_document_to_collection(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value> {
        let url = self.url_for_segments(&[
            "v3",
            "collections",
            collection_id,
            "documents",
            document_id,
        ])?;
        self.send_json(self.http.post(url)).await
    }

    // ---- misc ---------------------------------------------------------------------------------

    /// `GET /health`
    ///
    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn health(&self) -> Result<Value> {
        self.send_json(self.request(Method::GET, "/health")?).await
    }

    /// Arbitrary call for endpoints without a typed wrapper.
    ///
    /// # Errors
    ///
    /// As [`Self::send_json`].
    pub async fn raw(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut builder = self.request(method, path)?.query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send_json(builder).await
    }
}

fn document_form(metadata: &Value, collection_ids: &[String]) -> Form {
    let mut form = Form::new().text("metadata", metadata.to_string());
    if !collection_ids.is_empty() {
        form = form.text("collection_ids", json!(collection_ids).to_string());
    }
    form
}

fn guess_mime(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => mime::APPLICATION_PDF,
        "txt" => mime::TEXT_PLAIN,
        "md" | "markdown" => "text/markdown".parse().unwrap_or(mime::TEXT_PLAIN),
        "html" | "htm" => mime::TEXT_HTML,
        "csv" => mime::TEXT_CSV,
        "json" => mime::APPLICATION_JSON,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
