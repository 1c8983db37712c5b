use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf_catalog_server::{
    build_state,
    config::Config,
    create_app,
    database::Database,
    services::{GoogleBooksClient, OpenAiVisionClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_catalog_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.vision.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; extraction requests will fail");
    }

    let database = Arc::new(Database::new(&config.database_url).await?);
    database.migrate().await?;
    tracing::info!("Database migrations applied");

    let vision = Arc::new(OpenAiVisionClient::new(&config.vision)?);
    let catalog_search = Arc::new(GoogleBooksClient::new(&config.catalog)?);

    let port = config.port;
    let state = build_state(config, database.clone(), database, vision, catalog_search)?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Shelf catalog server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
