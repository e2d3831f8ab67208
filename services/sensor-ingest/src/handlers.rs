use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::{
    config::ValidationMode,
    error::ApiError,
    ingest,
    registry::DeviceRegistry,
    sink::PointSink,
    types::{DeviceListResp, HealthResp, ReloadResp, SensorDataResp, now_iso},
};

pub struct AppState<S> {
    pub registry: DeviceRegistry,
    pub sink: S,
    pub validation: ValidationMode,
}

pub type SharedState<S> = Arc<AppState<S>>;

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

pub async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        timestamp: now_iso(),
    })
}

/// Serve the catalog straight from disk. Registry mode wraps it with a count.
pub async fn list_devices<S: PointSink>(
    State(state): State<SharedState<S>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request_id = request_id(&headers);
    let devices = state.registry.list_all().await.map_err(|e| {
        tracing::error!(%request_id, path = %state.registry.path().display(), error = %e, "device list unavailable");
        ApiError::from(e)
    })?;

    tracing::info!(%request_id, count = devices.len(), "returned device list");
    Ok(match state.validation {
        ValidationMode::Inline => Json(devices).into_response(),
        ValidationMode::Registry => Json(DeviceListResp {
            count: devices.len(),
            devices,
            timestamp: now_iso(),
        })
        .into_response(),
    })
}

pub async fn reload_devices<S: PointSink>(
    State(state): State<SharedState<S>>,
    headers: HeaderMap,
) -> Result<Json<ReloadResp>, ApiError> {
    let request_id = request_id(&headers);
    let count = state.registry.reload().await.map_err(|e| {
        tracing::error!(%request_id, error = %e, "device registry reload failed");
        ApiError::from(e)
    })?;
    Ok(Json(ReloadResp {
        reloaded: true,
        count,
        timestamp: now_iso(),
    }))
}

/// Accepts `{"devices": [...]}` and stores each reading independently.
pub async fn sensor_data<S: PointSink>(
    State(state): State<SharedState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SensorDataResp>, ApiError> {
    let request_id = request_id(&headers);
    let entries = ingest::parse_batch(&body).map_err(|e| {
        tracing::warn!(%request_id, error = %e, "sensor data request rejected");
        ApiError::from(e)
    })?;

    let report =
        ingest::ingest_batch(&entries, &state.registry, state.validation, &state.sink).await;
    tracing::info!(%request_id, saved = report.saved(), total = report.total(), "processed {report} devices");
    Ok(Json(SensorDataResp::from_report(&report)))
}
