//! Logging setup shared by Rooom chat binaries.

pub mod config;
mod tracing_init;

pub use config::TelemetryConfig;
pub use tracing_init::{init_telemetry, telemetry_installed};

/// Installs the subscriber configured from `RUST_LOG`, `LOG_LEVEL` and
/// `LOG_FORMAT`.
pub fn install(service_name: &str) {
    init_telemetry(&TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ));
}
