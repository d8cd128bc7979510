//! `r2r-ingest`: upload every matching file in a directory.

use crate::ConnectionArgs;
use anyhow::{Context as _, bail};
use clap::Parser;
use owo_colors::OwoColorize as _;
use r2r_http_client::ApiClient;
use serde_json::{Value, json};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Batch upload documents to R2R.
#[derive(Debug, Clone, Parser)]
#[command(name = "r2r-ingest", version, about)]
pub struct IngestArgs {
    /// Directory containing documents.
    pub directory: PathBuf,

    /// File name pattern.
    #[arg(long, default_value = "*.pdf")]
    pub pattern: String,

    /// Collection ID to add each uploaded document to.
    #[arg(long)]
    pub collection: Option<String>,

    /// List matching files without uploading.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Files directly inside `dir` whose names match `pattern`, sorted by name.
///
/// # Errors
///
/// Fails when `dir` is missing or not a directory, the pattern is invalid, or the directory cannot
/// be read.
pub fn collect_files(dir: &Path, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("directory not found: {}", dir.display());
    }
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let pattern =
        glob::Pattern::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))?;

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if pattern.matches(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Metadata attached to every uploaded file.
#[must_use]
pub fn upload_metadata(path: &Path) -> Value {
    json!({
        "filename": file_name(path),
        "source": "batch_ingest",
    })
}

/// `document_id` from a create-document response, enveloped or not.
#[must_use]
pub fn document_id(response: &Value) -> Option<String> {
    response
        .pointer("/results/document_id")
        .or_else(|| response.get("document_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub total: usize,
    /// Document ids of successful uploads.
    pub uploaded: Vec<String>,
    /// File path and error message of each failure.
    pub failed: Vec<(PathBuf, String)>,
}

async fn upload_one(
    client: &ApiClient,
    path: &Path,
    collection: Option<&str>,
) -> anyhow::Result<String> {
    let response = client
        .create_document_from_file(path, &upload_metadata(path), &[])
        .await?;
    let id = document_id(&response).context("response carried no document_id")?;
    if let Some(collection_id) = collection {
        client
            .add_document_to_collection(collection_id, &id)
            .await
            .with_context(|| format!("add to collection {collection_id}"))?;
    }
    Ok(id)
}

/// Upload `files` one by one, printing `[i/n]` progress. Failures are recorded and skipped.
pub async fn upload_all(
    client: &ApiClient,
    files: &[PathBuf],
    collection: Option<&str>,
) -> IngestReport {
    let mut report = IngestReport {
        total: files.len(),
        ..IngestReport::default()
    };
    for (i, path) in files.iter().enumerate() {
        print!("[{}/{}] Uploading {}... ", i + 1, files.len(), file_name(path));
        let _ = std::io::stdout().flush();
        match upload_one(client, path, collection).await {
            Ok(id) => {
                println!("{} {id}", "✓".green());
                report.uploaded.push(id);
            }
            Err(e) => {
                println!("{} {e:#}", "error:".red());
                tracing::debug!(path = %path.display(), error = %e, "upload failed");
                report.failed.push((path.clone(), format!("{e:#}")));
            }
        }
    }
    report
}

/// # Errors
///
/// Fails when the directory is missing, the pattern is invalid or the client cannot be built.
/// Individual upload failures only show up in the summary.
pub async fn run(args: IngestArgs) -> anyhow::Result<()> {
    let files = collect_files(&args.directory, &args.pattern)?;

    if args.dry_run {
        println!("Dry run: found {} files", files.len());
        for path in &files {
            println!("  - {}", file_name(path));
        }
        return Ok(());
    }

    if files.is_empty() {
        println!(
            "{}",
            format!(
                "No files matching '{}' found in {}",
                args.pattern,
                args.directory.display()
            )
            .yellow()
        );
        return Ok(());
    }

    let client = args.connection.client()?;
    println!(
        "Found {} files matching '{}' in {}\n",
        files.len(),
        args.pattern,
        args.directory.display()
    );
    let report = upload_all(&client, &files, args.collection.as_deref()).await;

    println!();
    let summary = format!(
        "Uploaded {}/{} documents",
        report.uploaded.len(),
        report.total
    );
    if report.failed.is_empty() {
        println!("{}", summary.green().bold());
    } else {
        println!("{} ({} failed)", summary.yellow().bold(), report.failed.len());
        for (path, error) in &report.failed {
            println!("  - {}: {error}", file_name(path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, Path as UrlPath};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use r2r_http_client::BearerAuth;
    use r2r_test_support::TestHttpServer;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"content").expect("write file");
    }

    #[test]
    fn collects_matching_files_sorted_and_non_recursive() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "b.pdf");
        touch(dir.path(), "a.pdf");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        touch(&dir.path().join("nested"), "c.pdf");

        let files = collect_files(dir.path(), "*.pdf").expect("collect");
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);

        let all = collect_files(dir.path(), "*").expect("collect");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = collect_files(&dir.path().join("absent"), "*.pdf").expect_err("missing");
        assert!(err.to_string().contains("directory not found"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(collect_files(dir.path(), "[").is_err());
    }

    #[test]
    fn metadata_and_document_id() {
        assert_eq!(
            upload_metadata(Path::new("/tmp/paper.pdf")),
            json!({"filename": "paper.pdf", "source": "batch_ingest"})
        );
        assert_eq!(
            document_id(&json!({"results": {"document_id": "d1"}})).as_deref(),
            Some("d1")
        );
        assert_eq!(document_id(&json!({"document_id": "d2"})).as_deref(), Some("d2"));
        assert_eq!(document_id(&json!({"results": {}})), None);
    }

    #[tokio::test]
    async fn uploads_and_adds_to_collection_recording_failures() {
        let added: Arc<Mutex<Vec<String>>> = Arc::default();
        let added_route = added.clone();
        let app = Router::new()
            .route(
                "/v3/documents",
                post(|mut form: Multipart| async move {
                    let mut name = String::new();
                    let mut metadata = Value::Null;
                    while let Ok(Some(field)) = form.next_field().await {
                        match field.name() {
                            Some("file") => {
                                name = field.file_name().unwrap_or_default().to_string();
                            }
                            Some("metadata") => {
                                let text = field.text().await.unwrap_or_default();
                                metadata = serde_json::from_str(&text).unwrap_or_default();
                            }
                            _ => {}
                        }
                    }
                    if name.starts_with("bad") {
                        return (StatusCode::UNPROCESSABLE_ENTITY, "unsupported").into_response();
                    }
                    assert_eq!(metadata["source"], "batch_ingest");
                    assert_eq!(metadata["filename"], name.as_str());
                    Json(json!({"results": {"document_id": format!("doc-{name}")}}))
                        .into_response()
                }),
            )
            .route(
                "/v3/collections/{collection}/documents/{document}",
                post(
                    move |UrlPath((collection, document)): UrlPath<(String, String)>| {
                        let added = added_route.clone();
                        async move {
                            added
                                .lock()
                                .expect("lock")
                                .push(format!("{collection}/{document}"));
                            Json(json!({"results": {"message": "ok"}}))
                        }
                    },
                ),
            );
        let server = TestHttpServer::spawn(app).await.expect("stub server");

        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "a.pdf");
        touch(dir.path(), "bad.pdf");
        let files = collect_files(dir.path(), "*.pdf").expect("collect");

        let client = ApiClient::new(
            server.base_url(),
            BearerAuth::from_env("R2R_CLI_TEST_UNSET_KEY"),
            Duration::from_secs(5),
        )
        .expect("client");
        let report = upload_all(&client, &files, Some("col-1")).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.uploaded, vec!["doc-a.pdf"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("422"));
        assert_eq!(
            *added.lock().expect("lock"),
            vec!["col-1/doc-a.pdf".to_string()]
        );
    }
}
