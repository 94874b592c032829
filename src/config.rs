use std::env;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Where telemetry goes and whether it is collected at all.
///
/// Read from the environment by [`TelemetryConfig::from_env`]:
/// - `SERVICE_NAME`, defaulting to the cargo package name
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`, defaulting to `http://localhost:4317`
/// - `OTEL_SDK_DISABLED`, `true` turns instrumentation off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub endpoint: String,
    pub disabled: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
            endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or(defaults.endpoint),
            disabled: lookup("OTEL_SDK_DISABLED")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            disabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.endpoint, "http://localhost:4317");
        assert!(!config.disabled);
    }

    #[test]
    fn reads_overrides() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("SERVICE_NAME", "orders"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
            ("OTEL_SDK_DISABLED", "TRUE"),
        ]));
        assert_eq!(config.service_name, "orders");
        assert_eq!(config.endpoint, "http://collector:4317");
        assert!(config.disabled);
    }
}
