use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_bookmarks::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "smart_bookmarks=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Smart Bookmarks service...");

    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::new(config)?);
    let app = smart_bookmarks::app(app_state.clone())?;

    let addr = format!(
        "{}:{}",
        app_state.config.server_host, app_state.config.server_port
    );
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
