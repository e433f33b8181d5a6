//! MCP server initialization over stdio.
//!
//! [`serve_stdio`] opens the engine (vector index, graph memory, policies), serves the
//! tool handler until the client disconnects, then shuts the engine down so queued
//! vectors reach disk.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;

use crate::tools::VigilTools;
use vigil::config::VigilConfig;
use vigil::engine::ReliabilityEngine;

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: VigilConfig) -> Result<()> {
    tracing::info!("starting Vigil MCP server on stdio");

    let data_dir = config.resolved_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;

    let engine = Arc::new(ReliabilityEngine::open(&config).context("failed to open engine")?);
    tracing::info!(data_dir = %data_dir.display(), "incident memory ready");

    let tools = VigilTools::new(Arc::clone(&engine));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    let waited = server.waiting().await;
    tracing::info!("MCP server shut down");

    if let Err(e) = engine.shutdown().await {
        tracing::error!(error = %e, "final index save failed");
    }
    waited?;

    Ok(())
}
