//! Serving the MCP server over stdio or streamable HTTP.

use crate::server::R2rMcpServer;
use anyhow::{Context as _, anyhow};
use axum::routing::get;
use axum::{Json, Router};
use rmcp::ServiceExt as _;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{StreamableHttpServerConfig, StreamableHttpService};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve on stdin/stdout until the client disconnects.
///
/// # Errors
///
/// Fails if the MCP handshake does not complete.
pub async fn serve_stdio(server: R2rMcpServer) -> anyhow::Result<()> {
    tracing::info!("serving MCP over stdio");
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow!("MCP server init error: {e}"))?;
    let reason = running.waiting().await?;
    tracing::info!(?reason, "stdio session ended");
    Ok(())
}

/// `/health` plus the MCP endpoint at `/mcp`.
pub fn router(server: R2rMcpServer) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    Router::new()
        .route("/health", get(health))
        .nest_service("/mcp", service)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind `addr` and serve until Ctrl-C.
///
/// # Errors
///
/// Fails if the address cannot be bound or the server stops with an IO error.
pub async fn serve_http(server: R2rMcpServer, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        on_signal.cancel();
    });
    serve_http_on(server, listener, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` is cancelled.
///
/// # Errors
///
/// Fails if the server stops with an IO error.
pub async fn serve_http_on(
    server: R2rMcpServer,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving MCP over HTTP at /mcp");
    axum::serve(listener, router(server))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;
    tracing::info!("HTTP server stopped");
    Ok(())
}
