use std::sync::OnceLock;

use tracing_subscriber::layer::Layer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_telemetry(cfg: &TelemetryConfig) {
    INIT.get_or_init(|| {
        let fmt_layer = if cfg.json_logs {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&cfg.default_filter));

        // Another subscriber may already be installed (tests, embedding hosts).
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();

        tracing::info!(
            target: "chat.telemetry",
            service = %cfg.service_name,
            version = %cfg.service_version,
            environment = %cfg.environment,
            "telemetry initialised"
        );
    });
}

pub fn telemetry_installed() -> bool {
    INIT.get().is_some()
}
