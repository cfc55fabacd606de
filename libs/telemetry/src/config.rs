use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub json_logs: bool,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub fn from_lookup(
        default_service_name: &str,
        default_service_version: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let service_name =
            lookup("SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version =
            lookup("SERVICE_VERSION").unwrap_or_else(|| default_service_version.to_string());
        let environment = lookup("DEPLOYMENT_ENV").unwrap_or_else(|| "dev".into());
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);
        let default_filter = lookup("LOG_LEVEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".into());

        Self {
            service_name,
            service_version,
            environment,
            json_logs,
            default_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_to_json_info() {
        let cfg = TelemetryConfig::from_lookup("rooom-chat", "0.1.0", |_| None);
        assert!(cfg.json_logs);
        assert_eq!(cfg.default_filter, "info");
        assert_eq!(cfg.service_name, "rooom-chat");
        assert_eq!(cfg.environment, "dev");
    }

    #[test]
    fn text_formats_disable_json() {
        for format in ["text", "PRETTY", "plain"] {
            let vars = HashMap::from([("LOG_FORMAT", format)]);
            let cfg = TelemetryConfig::from_lookup("svc", "0", |k| vars.get(k).map(|v| v.to_string()));
            assert!(!cfg.json_logs, "{format}");
        }
    }
}
