use anyhow::{Context, Result};
use sensor_ingest::{
    build_router,
    config::Config,
    handlers::AppState,
    registry::DeviceRegistry,
    sink::InfluxSink,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    eprintln!("[sensor-ingest] booting...");

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        influx = %config.influx.url,
        org = %config.influx.org,
        bucket = %config.influx.bucket,
        validation = %config.validation,
        "sensor-ingest configured"
    );

    let sink = InfluxSink::new(&config.influx).context("failed to build influxdb client")?;
    tracing::info!("influxdb writes -> {}", sink.write_url());

    // Populate the registry before serving so the first request does not pay for it.
    let registry = DeviceRegistry::new(&config.device_list_path);
    let devices = registry.len().await;
    tracing::info!(path = %config.device_list_path.display(), devices, "device registry ready");

    let state = Arc::new(AppState {
        registry,
        sink,
        validation: config.validation,
    });
    let app = build_router(state);

    let addr = config.listen_addr;
    tracing::info!("sensor-ingest listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("sensor-ingest shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
