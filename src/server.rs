//! Server initialization for the stdio and HTTP transports.
//!
//! Provides [`serve_stdio`] (MCP over stdin/stdout) and [`serve_http`] (REST API
//! plus streamable MCP at `/mcp`). Both share [`setup`], which connects the
//! store, builds the embedding provider and makes sure the memory index exists.

use crate::api::{self, AppState};
use crate::config::XMemoryConfig;
use crate::embedding;
use crate::memory::MemoryRepository;
use crate::store::StoreClient;
use crate::tools::XMemoryTools;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;

/// Connect the configured backend and return a ready memory repository.
pub async fn setup(config: &XMemoryConfig) -> Result<MemoryRepository> {
    let client = StoreClient::connect(&config.store).context("failed to connect document store")?;
    client
        .ping()
        .await
        .context("document store is not reachable")?;

    let embedder = embedding::create_provider(&config.embedding)?;
    tracing::info!(
        model = %embedder.model_name(),
        dims = embedder.dimensions(),
        "embedding provider ready"
    );

    let repo = MemoryRepository::from_config(client, config, embedder)?;
    repo.initialize()
        .await
        .with_context(|| format!("failed to create index {}", repo.index()))?;
    tracing::info!(index = %repo.index(), "memory index ready");
    Ok(repo)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: XMemoryConfig) -> Result<()> {
    tracing::info!("starting xmemory MCP server on stdio");

    let repo = setup(&config).await?;
    let tools = XMemoryTools::new(repo, Arc::new(config));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the REST API and the streamable HTTP MCP endpoint on one listener.
pub async fn serve_http(config: XMemoryConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting xmemory HTTP server");

    let repo = setup(&config).await?;
    let config = Arc::new(config);

    let mcp_repo = repo.clone();
    let mcp_config = config.clone();
    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(XMemoryTools::new(mcp_repo.clone(), mcp_config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = api::router(AppState::new(repo, config)).nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening: REST at http://{bind_addr}/api/v1, MCP at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
