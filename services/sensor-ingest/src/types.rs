use serde::Serialize;
use serde_json::Value;

use crate::ingest::IngestReport;

/// Response body for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub status: &'static str,
    pub timestamp: String,
}

/// Response body for GET /api/devices when validating against the registry
#[derive(Debug, Serialize)]
pub struct DeviceListResp {
    pub devices: Vec<Value>,
    pub count: usize,
    pub timestamp: String,
}

/// Response body for POST /api/devices/reload
#[derive(Debug, Serialize)]
pub struct ReloadResp {
    pub reloaded: bool,
    pub count: usize,
    pub timestamp: String,
}

/// Response body for POST /api/sensor-data
#[derive(Debug, Serialize)]
pub struct SensorDataResp {
    pub success: bool,
    pub saved: usize,
    pub total: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl SensorDataResp {
    pub fn from_report(report: &IngestReport) -> Self {
        let errors = report.error_messages();
        Self {
            success: true,
            saved: report.saved(),
            total: report.total(),
            timestamp: now_iso(),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResp {
    pub error: String,
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
