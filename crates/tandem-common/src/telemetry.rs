//! Telemetry setup for binaries embedding a tandem session.
//!
//! Provides:
//! - Prometheus recorder for the `tandem_*` counters
//! - Tracing with compact console output + optional Loki push
//!
//! # Usage
//!
//! ```ignore
//! use tandem_common::telemetry::{self, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     telemetry::init(TelemetryConfig::from_env("tandem-demo"))?;
//!     tracing::info!("client started");
//!     println!("{}", telemetry::render());
//!     Ok(())
//! }
//! ```

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use miette::Diagnostic;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TelemetryError {
    #[error("failed to install prometheus recorder")]
    #[diagnostic(code(tandem::telemetry::metrics))]
    Metrics(#[source] metrics_exporter_prometheus::BuildError),

    #[error("failed to build loki layer")]
    #[diagnostic(code(tandem::telemetry::loki))]
    Loki(#[source] tracing_loki::Error),

    #[error("a global tracing subscriber is already installed")]
    #[diagnostic(code(tandem::telemetry::subscriber))]
    Subscriber(#[source] tracing_subscriber::util::TryInitError),
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for labeling
    pub service_name: String,
    /// Loki push URL (e.g., "http://localhost:3100"). None disables Loki.
    pub loki_url: Option<String>,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
}

impl TelemetryConfig {
    /// Load config from environment variables.
    ///
    /// - `LOKI_URL`: Loki push endpoint (optional)
    /// - `RUST_LOG`: Standard env filter (optional, overrides console_level)
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            loki_url: std::env::var("LOKI_URL").ok(),
            console_level,
        }
    }
}

/// Initialize telemetry (metrics + tracing).
///
/// Call once at application startup, inside a tokio runtime. If `LOKI_URL` is
/// set, spawns a background task to push logs to Loki.
pub fn init(config: TelemetryConfig) -> Result<(), TelemetryError> {
    init_metrics()?;
    init_tracing(config)
}

/// Initialize just the prometheus metrics recorder.
pub fn init_metrics() -> Result<&'static PrometheusHandle, TelemetryError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(TelemetryError::Metrics)?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

fn init_tracing(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    let Some(loki_url) = config.loki_url else {
        tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .map_err(TelemetryError::Subscriber)?;
        tracing::debug!(
            service = %config.service_name,
            "telemetry initialized (console only, set LOKI_URL to enable loki)"
        );
        return Ok(());
    };

    match tracing_loki::url::Url::parse(&loki_url) {
        Ok(url) => {
            let (loki_layer, loki_task) = tracing_loki::builder()
                .label("service", config.service_name.clone())
                .and_then(|builder| builder.build_url(url))
                .map_err(TelemetryError::Loki)?;

            tracing_subscriber::registry()
                .with(console_layer)
                .with(loki_layer)
                .try_init()
                .map_err(TelemetryError::Subscriber)?;

            tokio::spawn(loki_task);

            tracing::info!(
                service = %config.service_name,
                loki_url = %loki_url,
                "telemetry initialized with loki"
            );
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(console_layer)
                .try_init()
                .map_err(TelemetryError::Subscriber)?;

            tracing::warn!(
                error = %e,
                loki_url = %loki_url,
                "invalid LOKI_URL, falling back to console only"
            );
        }
    }
    Ok(())
}

/// Render metrics in prometheus text format. Empty until [`init_metrics`] has run.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
