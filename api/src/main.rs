use anyhow::Context;
use chat_api::{create_router, AppState, ServerConfig};
use pdf_rag::{QueryService, RagConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let server_config = ServerConfig::from_env()?;
    let rag_config = RagConfig::from_env()?;
    let query_service =
        QueryService::from_config(&rag_config).context("failed to initialize query service")?;

    let app = create_router(AppState::new(query_service), &server_config);

    let listener = tokio::net::TcpListener::bind(server_config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_address()))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
