#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use sensor_ingest::{
    build_router,
    config::ValidationMode,
    handlers::{AppState, SharedState},
    point::DataPoint,
    registry::DeviceRegistry,
    sink::{PointSink, SinkError},
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

pub const CATALOG: &str = r#"[
    {"deviceName": "11_thermohygrometer", "deviceId": "D0C84D1E2F3A", "deviceType": "WoIOSensor"},
    {"deviceName": "12_thermohygrometer", "deviceId": "D0C84D1E2F3B", "deviceType": "WoIOSensor"},
    {"deviceName": "living_plug", "deviceId": "AABBCCDDEEFF", "deviceType": "Plug Mini (JP)"}
]"#;

/// Keeps every point it is given; fails writes for one device name on request.
#[derive(Default)]
pub struct RecordingSink {
    points: Mutex<Vec<DataPoint>>,
    fail_device: Option<String>,
}

impl RecordingSink {
    pub fn failing_for(device_name: &str) -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            fail_device: Some(device_name.to_string()),
        }
    }

    pub fn points(&self) -> Vec<DataPoint> {
        self.points.lock().unwrap().clone()
    }
}

impl PointSink for RecordingSink {
    async fn write(&self, point: &DataPoint) -> Result<(), SinkError> {
        if let Some(fail) = &self.fail_device {
            if point.tag_value("device_name") == Some(fail.as_str()) {
                return Err(SinkError::Other("connection refused".into()));
            }
        }
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }
}

pub struct TestApp<S> {
    pub router: Router,
    pub state: SharedState<S>,
    pub dir: TempDir,
}

impl<S> TestApp<S> {
    pub fn catalog_path(&self) -> std::path::PathBuf {
        self.dir.path().join("device_list.json")
    }
}

/// Build the router over a temp directory holding `device_list.json` when
/// `catalog` is given.
pub fn app_with<S: PointSink>(sink: S, catalog: Option<&str>, validation: ValidationMode) -> TestApp<S> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device_list.json");
    if let Some(contents) = catalog {
        std::fs::write(&path, contents).unwrap();
    }
    let state = Arc::new(AppState {
        registry: DeviceRegistry::new(path),
        sink,
        validation,
    });
    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        dir,
    }
}

pub fn app(catalog: Option<&str>, validation: ValidationMode) -> TestApp<RecordingSink> {
    app_with(RecordingSink::default(), catalog, validation)
}

pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post(router: &Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap(),
    )
    .await
}

pub async fn post_readings(router: &Router, body: Value) -> (StatusCode, Value) {
    post(router, "/api/sensor-data", body.to_string()).await
}
