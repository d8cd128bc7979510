//! Process-level behaviour of `r2r-ingest` and `r2r-search`.

use axum::routing::post;
use axum::{Json, Router};
use r2r_test_support::TestHttpServer;
use serde_json::{Value, json};
use std::process::{Command, Output, Stdio};

fn command(bin: &str) -> Command {
    let mut cmd = Command::new(bin);
    cmd.env_remove("R2R_BASE_URL")
        .env_remove("RUST_LOG")
        .env("R2R_API_KEY_ENV", "R2R_CLI_BIN_TEST_UNSET_KEY")
        .stdin(Stdio::null());
    cmd
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("run binary")
}

#[test]
fn ingest_missing_directory_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run(command(env!("CARGO_BIN_EXE_r2r-ingest")).arg(dir.path().join("absent")));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("directory not found"));
}

#[test]
fn ingest_dry_run_lists_files_without_uploading() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("one.md"), "# one").expect("write");
    std::fs::write(dir.path().join("two.pdf"), "pdf").expect("write");
    let output = run(command(env!("CARGO_BIN_EXE_r2r-ingest"))
        .arg(dir.path())
        .args(["--pattern", "*.md", "--dry-run", "--base-url", "http://127.0.0.1:9"]));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("found 1 files"));
    assert!(stdout.contains("  - one.md"));
    assert!(!stdout.contains("two.pdf"));
}

#[test]
fn search_without_query_exits_nonzero() {
    let output = run(command(env!("CARGO_BIN_EXE_r2r-search")).args([
        "--base-url",
        "http://127.0.0.1:9",
    ]));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("query is required"));
}

#[tokio::test]
async fn search_prints_json_from_the_api() {
    let api = TestHttpServer::spawn(Router::new().route(
        "/v3/retrieval/search",
        post(|Json(body): Json<Value>| async move {
            Json(json!({"results": {"chunk_search_results": [
                {"id": "c1", "document_id": "d1", "text": body["query"], "score": 0.5}
            ]}}))
        }),
    ))
    .await
    .expect("stub api");

    let bin = env!("CARGO_BIN_EXE_r2r-search");
    let base_url = api.base_url().to_string();
    let output = tokio::task::spawn_blocking(move || {
        run(command(bin).args(["--json", "--base-url", base_url.as_str(), "hybrid search"]))
    })
    .await
    .expect("join");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let printed: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(printed["chunk_search_results"][0]["text"], "hybrid search");
    assert!(String::from_utf8_lossy(&output.stderr).contains("R2R_CLI_BIN_TEST_UNSET_KEY"));
}
