use std::{error::Error as StdError, sync::Arc};

use crate::{
    error::ApiError,
    service::InsightsService,
    telemetry::{ExceptionTelemetry, MetricTelemetry, Properties, SeverityLevel},
};

const NO_ADDITIONAL_INFORMATION: &str = "No additional information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsLoggerSettings {
    pub application_name: String,
    /// Prepended to every metric name, `"<prefix>-<name>"`.
    pub application_metric_prefix: String,
}

/// Logs through `tracing` and mirrors errors and metrics to the telemetry
/// client, correlated with the current request.
#[derive(Debug, Clone)]
pub struct InsightsLogger {
    service: Arc<InsightsService>,
    settings: InsightsLoggerSettings,
}

impl InsightsLogger {
    pub fn new(service: Arc<InsightsService>, settings: InsightsLoggerSettings) -> Self {
        Self { service, settings }
    }

    /// Logs and tracks `error`, then hands it back for the caller to
    /// propagate:
    ///
    /// ```ignore
    /// return Err(logger.track_error(error, Properties::new()));
    /// ```
    pub fn track_error<E>(&self, error: E, custom_properties: Properties) -> E
    where
        E: StdError + 'static,
    {
        tracing::error!(%error, "request failed");

        let Some(client) = self.service.client() else {
            return error;
        };

        let mut properties = custom_properties;
        let source: &(dyn StdError + 'static) = &error;
        if let Some(api_error) = source.downcast_ref::<ApiError>() {
            properties.extend(api_error_properties(api_error));
        }
        properties.insert(
            "applicationName".to_owned(),
            self.settings.application_name.clone(),
        );

        client.track_exception(ExceptionTelemetry {
            message: error.to_string(),
            severity: SeverityLevel::Error,
            properties,
            context: self.service.correlation_context().cloned(),
            tag_overrides: self.service.tag_overrides(),
        });

        error
    }

    pub fn track_metric(&self, name: &str, custom_properties: Properties, value: f64) {
        let Some(client) = self.service.client() else {
            return;
        };

        let mut properties = custom_properties;
        properties.insert(
            "applicationName".to_owned(),
            self.settings.application_name.clone(),
        );

        client.track_metric(MetricTelemetry {
            name: format!("{}-{name}", self.settings.application_metric_prefix),
            value,
            properties,
            context: self.service.correlation_context().cloned(),
            tag_overrides: self.service.tag_overrides(),
        });
    }
}

fn api_error_properties(error: &ApiError) -> Properties {
    Properties::from([
        ("isDownstreamError".to_owned(), error.downstream.to_string()),
        ("statusCode".to_owned(), error.status.as_u16().to_string()),
        ("type".to_owned(), error.error_type.clone()),
        ("title".to_owned(), error.title.clone()),
        (
            "additionalInformation".to_owned(),
            error
                .additional_information
                .clone()
                .unwrap_or_else(|| NO_ADDITIONAL_INFORMATION.to_owned()),
        ),
    ])
}
