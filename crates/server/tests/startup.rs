//! Process-level startup behaviour of the `r2r-mcp-server` binary.

use r2r_test_support::{KillOnDrop, pick_unused_port, wait_http_ok};
use std::process::{Command, Stdio};
use std::time::Duration;

const SPEC: &str = r#"{
  "openapi": "3.0.3",
  "info": {"title": "R2R API", "version": "3.6.0"},
  "paths": {
    "/v3/documents": {
      "get": {"operationId": "list_documents", "responses": {"200": {"description": "ok"}}}
    }
  }
}"#;

fn server_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_r2r-mcp-server"));
    cmd.env_remove("RUST_LOG")
        .env_remove("R2R_BASE_URL")
        .env_remove("R2R_OPENAPI_URL")
        .env_remove("R2R_OPENAPI_FALLBACK")
        .env_remove("MCP_TRANSPORT")
        .env("R2R_API_KEY_ENV", "R2R_STARTUP_TEST_UNSET_KEY");
    cmd
}

#[test]
fn unreachable_spec_without_fallback_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.json");
    let output = server_command()
        .args([
            "--openapi-url",
            "http://127.0.0.1:9/openapi.json",
            "--timeout-secs",
            "2",
        ])
        .arg("--openapi-fallback")
        .arg(&missing)
        .stdin(Stdio::null())
        .output()
        .expect("run server");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("http://127.0.0.1:9/openapi.json"),
        "stderr should name the document URL: {stderr}"
    );
}

#[test]
fn malformed_spec_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("openapi.json");
    std::fs::write(&path, r#"{"swagger": "2.0", "paths": {}}"#).expect("write");
    let output = server_command()
        .args(["--openapi-url", "http://127.0.0.1:9/openapi.json"])
        .arg("--openapi-fallback")
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .expect("run server");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[tokio::test]
async fn http_transport_serves_health_from_fallback_spec() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("openapi.json");
    std::fs::write(&path, SPEC).expect("write");
    let port = pick_unused_port().expect("port");
    let bind = format!("127.0.0.1:{port}");

    let child = server_command()
        .args([
            "--openapi-url",
            "http://127.0.0.1:9/openapi.json",
            "--transport",
            "http",
            "--bind",
            bind.as_str(),
        ])
        .arg("--openapi-fallback")
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn server");
    let _guard = KillOnDrop(child);

    wait_http_ok(&format!("http://127.0.0.1:{port}/health"), Duration::from_secs(15))
        .await
        .expect("health endpoint");
}
