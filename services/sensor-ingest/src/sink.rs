use std::{future::Future, time::Duration};

use reqwest::{
    Client, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use url::Url;

use crate::{config::InfluxConfig, point::DataPoint};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("write request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("influxdb rejected write with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("{0}")]
    Other(String),
}

/// Destination for data points. Every call is one independent write.
pub trait PointSink: Send + Sync + 'static {
    fn write(&self, point: &DataPoint) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Writes points to the InfluxDB v2 HTTP write API, one request per point.
#[derive(Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    token: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &InfluxConfig) -> Self {
        let mut write_url = config.url.clone();
        let base_path = config.url.path().trim_end_matches('/').to_string();
        write_url.set_path(&format!("{base_path}/api/v2/write"));
        write_url
            .query_pairs_mut()
            .clear()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket);
        Self {
            client,
            write_url,
            token: config.token.clone(),
        }
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

impl PointSink for InfluxSink {
    async fn write(&self, point: &DataPoint) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(point.to_line_protocol())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "influxdb write rejected");
            return Err(SinkError::Rejected { status, body });
        }

        tracing::debug!(measurement = point.measurement(), "point written");
        Ok(())
    }
}
