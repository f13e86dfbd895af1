//! Optional `tracing_subscriber` installer for embedding applications that
//! don't already have a global subscriber (mirrors `everruns_core::telemetry::init_telemetry`,
//! minus its OTLP exporter, which is outside this framework's scope). Every
//! subsystem in this workspace only ever calls into `tracing` macros
//! directly, never into this installer, so an embedder that already manages
//! its own subscriber is unaffected by its presence.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_filter: Option<String>,
    pub enable_console: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "katalyst".to_string(),
            log_filter: None,
            enable_console: true,
        }
    }
}

impl TelemetryConfig {
    /// Reads `RUST_LOG`/`LOG_LEVEL` the way the rest of the ambient stack
    /// does (`katalyst_contracts::config` substitutes `${VAR}` forms; this
    /// reads the process environment directly since it runs before any
    /// `ConfigProvider` is wired).
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("KATALYST_SERVICE_NAME").unwrap_or_else(|_| "katalyst".to_string()),
            log_filter: std::env::var("RUST_LOG").ok().or_else(|| std::env::var("LOG_LEVEL").ok()),
            enable_console: true,
        }
    }
}

/// Installs a process-global `tracing_subscriber` if one is not already
/// installed. Safe to call more than once; later calls are no-ops.
pub fn init_telemetry(config: TelemetryConfig) {
    let filter = config
        .log_filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let console_layer = config
        .enable_console
        .then(|| tracing_subscriber::fmt::layer().with_target(true).with_filter(filter));

    let _ = tracing_subscriber::registry().with(console_layer).try_init();

    tracing::debug!(service = %config.service_name, "telemetry installed");
}
