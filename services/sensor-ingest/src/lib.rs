use std::any::Any;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod point;
pub mod registry;
pub mod sink;
pub mod types;

use crate::{
    handlers::SharedState,
    sink::PointSink,
    types::ErrorResp,
};

pub fn build_router<S: PointSink>(state: SharedState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/devices", get(handlers::list_devices::<S>))
        .route("/api/devices/reload", post(handlers::reload_devices::<S>))
        .route("/api/sensor-data", post(handlers::sensor_data::<S>))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    %request_id,
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Turn a panic inside a handler into a 500 carrying the panic message.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected error while processing request".to_string()
    };
    tracing::error!(error = %message, "request processing error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResp { error: message }),
    )
        .into_response()
}
