//! Batch ingestion: validate each reading, turn it into a point, write it.
//!
//! Items are handled strictly in order and independently; a rejected item
//! never stops the rest of the batch.

use std::fmt;

use serde_json::{Map, Value};

use crate::{
    config::ValidationMode,
    point::{DataPoint, WO_IO_SENSOR},
    registry::{DeviceIndex, DeviceRegistry, DeviceType},
    sink::PointSink,
};

/// Reasons a whole request is refused before any item is looked at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("No JSON data provided")]
    NoData,
    #[error("devices field is required")]
    MissingDevices,
    #[error("devices must be an array")]
    NotAnArray,
}

/// Why a single reading was not stored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    #[error("device entry must be a JSON object")]
    NotAnObject,
    #[error("deviceName is required")]
    MissingDeviceName,
    #[error("deviceName must be a string")]
    InvalidDeviceName,
    #[error("deviceName must not contain line breaks")]
    MultilineDeviceName,
    #[error("Device not found in {registry}: {device_name}")]
    UnknownDevice {
        device_name: String,
        registry: String,
    },
    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(String),
    #[error("humidity and temperature are required")]
    MissingMeasurements,
    #[error("{0} must be a number")]
    NotNumeric(&'static str),
    #[error("Unexpected error - {0}")]
    Sink(String),
}

/// A validated thermo-hygrometer reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub device_name: String,
    pub temperature: f64,
    pub humidity: f64,
    pub battery: Option<f64>,
}

impl SensorReading {
    /// Build the point for this reading. `device_id` is only known when the
    /// device was resolved through the registry.
    pub fn to_point(&self, device_id: Option<&str>) -> DataPoint {
        let mut point = DataPoint::new(WO_IO_SENSOR).tag("device_name", self.device_name.as_str());
        if let Some(id) = device_id {
            point = point.tag("device_id", id);
        }
        point = point
            .field("humidity", self.humidity)
            .field("temperature", self.temperature);
        if let Some(battery) = self.battery {
            point = point.field("battery", battery);
        }
        point
    }
}

/// Outcome of one batch item, keyed by its position in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub index: usize,
    pub result: Result<(), ReadingError>,
}

impl ItemOutcome {
    pub fn is_saved(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_saved()).count()
    }

    /// Human readable failures in batch order, e.g. `Device 1: deviceName is required`.
    pub fn error_messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| format!("Device {}: {e}", o.index)))
            .collect()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.saved(), self.total())
    }
}

/// Pull the `devices` array out of a raw request body.
pub fn parse_batch(body: &[u8]) -> Result<Vec<Value>, BatchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BatchError::NoData);
    }
    let Ok(Value::Object(mut data)) = serde_json::from_slice::<Value>(body) else {
        return Err(BatchError::NoData);
    };

    match data.remove("devices") {
        None => Err(BatchError::MissingDevices),
        Some(devices) if is_falsy(&devices) => Err(BatchError::MissingDevices),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(BatchError::NotAnArray),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Validate and store every entry of a batch, one sink write per valid entry.
pub async fn ingest_batch<S: PointSink>(
    entries: &[Value],
    registry: &DeviceRegistry,
    mode: ValidationMode,
    sink: &S,
) -> IngestReport {
    // One registry snapshot for the whole batch.
    let known = match mode {
        ValidationMode::Registry => Some(registry.load().await),
        ValidationMode::Inline => None,
    };
    let registry_name = registry.file_name();

    let mut report = IngestReport {
        outcomes: Vec::with_capacity(entries.len()),
    };
    for (index, entry) in entries.iter().enumerate() {
        let result = ingest_entry(entry, known.as_deref(), &registry_name, sink).await;
        if let Err(e) = &result {
            tracing::error!(index, error = %e, "sensor reading rejected");
        }
        report.outcomes.push(ItemOutcome { index, result });
    }
    report
}

async fn ingest_entry<S: PointSink>(
    entry: &Value,
    known: Option<&DeviceIndex>,
    registry_name: &str,
    sink: &S,
) -> Result<(), ReadingError> {
    let entry = entry.as_object().ok_or(ReadingError::NotAnObject)?;
    let device_name = device_name(entry)?;

    let device_id = match known {
        None => None,
        Some(devices) => {
            let device = devices
                .get(device_name)
                .ok_or_else(|| ReadingError::UnknownDevice {
                    device_name: device_name.to_string(),
                    registry: registry_name.to_string(),
                })?;
            if device.device_type != DeviceType::WoIoSensor {
                return Err(ReadingError::UnsupportedDeviceType(
                    device.device_type.to_string(),
                ));
            }
            Some(device.device_id.as_str())
        }
    };

    let reading = measurements(entry, device_name)?;
    sink.write(&reading.to_point(device_id))
        .await
        .map_err(|e| ReadingError::Sink(e.to_string()))?;

    tracing::info!(
        device_name = %reading.device_name,
        temperature = reading.temperature,
        humidity = reading.humidity,
        battery = ?reading.battery,
        "saved sensor data"
    );
    Ok(())
}

fn device_name(entry: &Map<String, Value>) -> Result<&str, ReadingError> {
    match entry.get("deviceName") {
        None | Some(Value::Null) => Err(ReadingError::MissingDeviceName),
        Some(Value::String(name)) if name.is_empty() => Err(ReadingError::MissingDeviceName),
        Some(Value::String(name)) if name.contains(['\n', '\r']) => {
            Err(ReadingError::MultilineDeviceName)
        }
        Some(Value::String(name)) => Ok(name.as_str()),
        Some(_) => Err(ReadingError::InvalidDeviceName),
    }
}

fn measurements(entry: &Map<String, Value>, device_name: &str) -> Result<SensorReading, ReadingError> {
    if !is_present(entry, "temperature") || !is_present(entry, "humidity") {
        return Err(ReadingError::MissingMeasurements);
    }
    Ok(SensorReading {
        device_name: device_name.to_string(),
        temperature: number(&entry["temperature"], "temperature")?,
        humidity: number(&entry["humidity"], "humidity")?,
        battery: match entry.get("battery") {
            Some(v) if !v.is_null() => Some(number(v, "battery")?),
            _ => None,
        },
    })
}

fn is_present(entry: &Map<String, Value>, key: &str) -> bool {
    entry.get(key).is_some_and(|v| !v.is_null())
}

/// JSON numbers, numeric strings and booleans (as 1 or 0) are accepted; the
/// result must be finite.
fn number(value: &Value, field: &'static str) -> Result<f64, ReadingError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or(ReadingError::NotNumeric(field))
}
