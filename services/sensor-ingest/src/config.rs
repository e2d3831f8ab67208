use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr};

use url::Url;

pub const DEFAULT_DEVICE_LIST_PATH: &str = "device_list.json";

/// How readings are checked before they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Only field presence is checked; points carry `device_name` alone.
    Inline,
    /// Readings must name a known `WoIOSensor` in the device registry.
    Registry,
}

impl FromStr for ValidationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(ValidationMode::Inline),
            "registry" => Ok(ValidationMode::Registry),
            other => Err(ConfigError::InvalidValidationMode(other.to_string())),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Inline => f.write_str("inline"),
            ValidationMode::Registry => f.write_str("registry"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("INFLUXDB_TOKEN must be set")]
    MissingToken,
    #[error("INFLUXDB_URL is not a valid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("INGEST_VALIDATION must be 'registry' or 'inline', got '{0}'")]
    InvalidValidationMode(String),
    #[error("invalid listen address '{0}'")]
    InvalidListenAddr(String),
}

/// Connection settings for the InfluxDB v2 write API.
#[derive(Clone)]
pub struct InfluxConfig {
    pub url: Url,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url.as_str())
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub influx: InfluxConfig,
    pub device_list_path: PathBuf,
    pub validation: ValidationMode,
}

impl Config {
    /// Build the service configuration from the process environment.
    ///
    /// `INFLUXDB_TOKEN` is mandatory; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = read_env_optional("INFLUXDB_TOKEN").ok_or(ConfigError::MissingToken)?;
        let url = Url::parse(&read_env("INFLUXDB_URL", "http://influxdb:8086"))?;
        let influx = InfluxConfig {
            url,
            org: read_env("INFLUXDB_ORG", "org"),
            bucket: read_env("INFLUXDB_BUCKET", "switchbot"),
            token,
        };

        let validation = read_env("INGEST_VALIDATION", "registry").parse()?;
        let device_list_path = PathBuf::from(read_env("DEVICE_LIST_PATH", DEFAULT_DEVICE_LIST_PATH));

        // Prefer the service-specific port; PORT is what most hosting platforms provide.
        let host = read_env("SENSOR_INGEST_HOST", "0.0.0.0");
        let port: u16 = read_env_optional("SENSOR_INGEST_PORT")
            .or_else(|| read_env_optional("PORT"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        let raw_addr = format!("{host}:{port}");
        let listen_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(raw_addr))?;

        Ok(Config {
            listen_addr,
            influx,
            device_list_path,
            validation,
        })
    }
}

pub fn read_env(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn read_env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
