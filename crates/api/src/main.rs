use anyhow::Context;

use churchos_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    churchos_observability::init();

    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::info!(environment = ?config.environment, "starting churchos-api");

    let services = churchos_api::app::services::build_services(&config).await?;
    let app = churchos_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
