use std::sync::Arc;

use knowledge_repo::repository::Repository;
use knowledge_repo::server::router;
use knowledge_repo::settings::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // an optional settings file may be given as the only argument
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;
    let repository = Arc::new(Repository::from_settings(&settings)?);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    info!(bind = %settings.server.bind, base_url = %settings.server.base_url, "serving knowledge assets");
    axum::serve(listener, router(repository)).await?;
    Ok(())
}
