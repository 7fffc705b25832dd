use anyhow::Result;
use std::sync::Arc;

use sheet_ingest::{config, logging, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first, so a `.env` file can set the log filter
    let config = config::Config::from_env()?;
    logging::init_logging(&config.log_filter)?;
    let addr = config.addr;

    let state = Arc::new(AppState::new(config));
    let app = routes::router(state);

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
