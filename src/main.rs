use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn, Level};

mod client;
mod models;
mod routes;
mod state;
mod utils;

use sb_stateframe::hardware::SimConnector;
use sb_stateframe::Assembler;

use crate::models::config_model::MonitorConfig;
use crate::state::app_state::AppState;
use crate::utils::conf_helper::{get_cached_config, init_config_and_bind};

fn build_assembler(config: &MonitorConfig) -> Assembler {
    let mut assembler = Assembler::new(config.frame);
    if let Some(path) = &config.schema.path {
        assembler = assembler.with_schema_path(path);
    }
    if let Some(dir) = &config.schema.archive_dir {
        assembler = assembler.with_archive_dir(Some(dir.into()));
    }
    assembler
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    // === CONFIG + LISTENER ===
    let listener = init_config_and_bind()
        .await
        .context("CRITICAL INIT FAILURE")?;

    let config = get_cached_config()?;

    info!(
        "{} initialized on {}:{} ({:?} frame, {} bytes)",
        config.name,
        config.connection.ip,
        config.connection.port,
        config.frame,
        config.frame.size()
    );

    warn!("No LabJack driver linked, polling simulated devices");
    let connector = Arc::new(SimConnector::nominal(&config.devices.identifiers()));
    let state = AppState::new(config, connector);

    tokio::spawn(client::poller::start_polling(
        state.clone(),
        build_assembler(config),
        Duration::from_millis(config.poll_interval_ms),
    ));

    let app = Router::new()
        .merge(routes::info_routes::health_routes(state.clone()))
        .merge(routes::stateframe_routes::stateframe_routes(state));

    axum::serve(listener, app).await.context("server stopped")?;

    Ok(())
}
