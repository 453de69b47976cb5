use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use instructor_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    instructor_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let (services, relay) = instructor_api::app::services::build_services(&config).await?;
    let app = instructor_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Deliver whatever the last requests recorded before exiting.
    relay.shutdown().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
