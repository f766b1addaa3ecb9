//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire the
//! orchestrator into the MCP tool handler.

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;

use crate::config::{MnemosConfig, ModelDimensions};
use crate::orchestrator::Orchestrator;
use crate::tools::MnemosTools;

/// Shared setup: open storage and the index, load providers.
fn setup_orchestrator(config: &MnemosConfig) -> Result<Arc<Orchestrator>> {
    let orchestrator = Orchestrator::open(config, &ModelDimensions::default())?;
    tracing::info!(index = %config.index_path().display(), "storage and index ready");
    Ok(Arc::new(orchestrator))
}

/// Start the transport named in `server.transport` (`stdio` or `http`).
pub async fn serve(config: MnemosConfig, transport: Option<&str>) -> Result<()> {
    let transport = transport.unwrap_or(&config.server.transport).to_string();
    match transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "http" => serve_http(config).await,
        other => anyhow::bail!("unknown transport: {other}. Supported: stdio, http"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemosConfig) -> Result<()> {
    tracing::info!("starting mnemos MCP server on stdio");

    let orchestrator = setup_orchestrator(&config)?;
    let tools = MnemosTools::new(Arc::clone(&orchestrator));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    orchestrator.close().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP, mounted at `/mcp`.
pub async fn serve_http(config: MnemosConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting mnemos MCP server on HTTP");

    let orchestrator = setup_orchestrator(&config)?;
    let shared = Arc::clone(&orchestrator);

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MnemosTools::new(Arc::clone(&shared))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    orchestrator.close().await?;
    Ok(())
}
