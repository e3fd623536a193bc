use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use serde::Serialize;
use tracing::{debug, error};

use crate::state::app_state::AppState;

pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info_check))
        .with_state(state)
}

pub async fn info_check() -> Response {
    match crate::utils::conf_helper::get_cached_config() {
        Ok(config) => {
            debug!("{} requested", config.name);
            Json(config).into_response()
        }
        Err(e) => {
            error!("Info requested before init: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// `ok` once a frame has been published, `degraded` while the hardware
/// is failing and frames carry defaults.
async fn health_check(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot.read().await;

    let status = match (&snapshot.hardware_error, snapshot.sequence) {
        (_, 0) => "starting",
        (Some(_), _) => "degraded",
        (None, _) => "ok",
    };

    Json(HealthStatus {
        status: status.to_owned(),
        frame_size: state.config.frame.size(),
        sequence: snapshot.sequence,
        hardware_error: snapshot.hardware_error.clone(),
    })
    .into_response()
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: String,
    frame_size: usize,
    sequence: u64,
    hardware_error: Option<String>,
}
