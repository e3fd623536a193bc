use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{error, info};

use sb_stateframe::bands::{BandError, BandPreset};
use sb_stateframe::hardware::{AntennaId, HardwareError};
use sb_stateframe::{decode, Value};

use crate::state::app_state::AppState;

#[derive(Serialize)]
pub struct DecodedField {
    pub name: String,
    pub offset: usize,
    pub format: String,
    pub value: Value,
}

#[derive(Serialize)]
pub struct DecodedFrame {
    pub sequence: u64,
    pub timestamp: f64,
    pub version: f64,
    pub size: usize,
    /// Packing format of the whole frame.
    pub format: String,
    pub fields: Vec<DecodedField>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ApplyRequest {
    /// Antennas whose attenuators follow the band; empty means every
    /// configured antenna.
    #[serde(default)]
    pub antennas: Vec<AntennaId>,
}

pub fn stateframe_routes(state: AppState) -> Router {
    Router::new()
        .route("/stateframe", get(raw_frame))
        .route("/stateframe/schema", get(schema_document))
        .route("/stateframe/decoded", get(decoded_frame))
        .route("/bands", get(list_bands))
        .route("/bands/{id}", put(upsert_band).delete(remove_band))
        .route("/bands/{id}/apply", post(apply_band))
        .route("/source/{kind}", post(select_source))
        .with_state(state)
}

async fn raw_frame(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshot.read().await;
    if snapshot.sequence == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        snapshot.buffer.clone(),
    )
        .into_response()
}

async fn schema_document(State(state): State<AppState>) -> Response {
    match state.schema.read().await.as_ref() {
        Some(info) => ([(header::CONTENT_TYPE, "application/xml")], info.xml.clone()).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn decoded_frame(State(state): State<AppState>) -> Response {
    let schema = state.schema.read().await;
    let Some(info) = schema.as_ref() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let snapshot = state.snapshot.read().await;

    let fields: Result<Vec<DecodedField>, _> = info
        .table
        .entries()
        .iter()
        .map(|(name, entry)| {
            decode(&snapshot.buffer, entry).map(|value| DecodedField {
                name: name.clone(),
                offset: entry.offset,
                format: entry.format.clone(),
                value,
            })
        })
        .collect();

    match fields {
        Ok(fields) => Json(DecodedFrame {
            sequence: snapshot.sequence,
            timestamp: snapshot.timestamp,
            version: info.table.version(),
            size: snapshot.buffer.len(),
            format: snapshot.format.clone(),
            fields,
        })
        .into_response(),
        Err(e) => {
            error!("Decoding frame {} failed: {}", snapshot.sequence, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn list_bands(State(state): State<AppState>) -> Response {
    let store = state.bands.clone();
    match run_blocking(move || store.load(), band_status).await {
        Ok(bands) => Json(bands).into_response(),
        Err(resp) => resp,
    }
}

async fn upsert_band(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(preset): Json<BandPreset>,
) -> Response {
    let store = state.bands.clone();
    match run_blocking(move || store.upsert(id, preset), band_status).await {
        Ok(bands) => {
            info!("Band {} saved", id);
            Json(bands).into_response()
        }
        Err(resp) => resp,
    }
}

async fn remove_band(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let store = state.bands.clone();
    match run_blocking(move || store.remove(id), band_status).await {
        Ok(removed) => {
            info!("Band {} removed", id);
            Json(removed).into_response()
        }
        Err(resp) => resp,
    }
}

async fn apply_band(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<ApplyRequest>,
) -> Response {
    let store = state.bands.clone();
    let bands = match run_blocking(move || store.load(), band_status).await {
        Ok(bands) => bands,
        Err(resp) => return resp,
    };

    let system = state.system.clone();
    let result = run_blocking(
        move || {
            let mut guard = system.blocking_lock();
            let sys = guard
                .as_mut()
                .ok_or_else(|| HardwareError::NotConnected("OVRO system".to_string()))?;
            let antennas = if request.antennas.is_empty() {
                sys.antennas()
            } else {
                request.antennas
            };
            sys.apply_band(&bands, id, &antennas)
        },
        hardware_status,
    )
    .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

async fn select_source(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let noise = match kind.as_str() {
        "noise" => true,
        "rf" => false,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    let system = state.system.clone();
    let result = run_blocking(
        move || {
            let mut guard = system.blocking_lock();
            let sys = guard
                .as_mut()
                .ok_or_else(|| HardwareError::NotConnected("OVRO system".to_string()))?;
            if noise {
                sys.select_noise_source()
            } else {
                sys.select_rf_source()
            }
        },
        hardware_status,
    )
    .await;

    match result {
        Ok(()) => {
            info!("Source switched to {}", kind);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}

/// Run blocking file or hardware work off the async workers, turning its
/// error into a response.
async fn run_blocking<T, E, F>(work: F, status_of: fn(&E) -> StatusCode) -> Result<T, Response>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Request failed: {}", e);
            Err((status_of(&e), e.to_string()).into_response())
        }
        Err(e) => {
            error!("Blocking task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

fn band_status(e: &BandError) -> StatusCode {
    match e {
        BandError::NotFound(_) => StatusCode::NOT_FOUND,
        BandError::MissingComponent { .. } | BandError::InvalidAttenuation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        BandError::Io(_) | BandError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn hardware_status(e: &HardwareError) -> StatusCode {
    match e {
        HardwareError::InvalidBand(_) | HardwareError::NoAntenna(_) => StatusCode::NOT_FOUND,
        HardwareError::NotConnected(_) | HardwareError::DeviceNotFound { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        HardwareError::InvalidLoFrequency(_)
        | HardwareError::InvalidName(_)
        | HardwareError::UnknownParameter(_) => StatusCode::BAD_REQUEST,
        HardwareError::Driver { .. } => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(band_status(&BandError::NotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(
            hardware_status(&HardwareError::InvalidBand(3)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            hardware_status(&HardwareError::NotConnected("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_apply_request_defaults() {
        let req: ApplyRequest = serde_json::from_str("{}").unwrap();
        assert!(req.antennas.is_empty());
        let req: ApplyRequest = serde_json::from_str(r#"{"antennas": ["B"]}"#).unwrap();
        assert_eq!(req.antennas, vec![AntennaId::B]);
    }
}
