use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use evento_api::app::{build_app, services::build_services};
use evento_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    evento_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).await?);
    let app = build_app(services, config.port);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        backend = if config.database_url.is_some() { "postgres" } else { "in_memory" },
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
