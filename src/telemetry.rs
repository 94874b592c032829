//! Telemetry records and the client that ships them.
//!
//! The client is a long-lived handle created at startup (see
//! [`crate::setup::create_client`]) and handed to every request. Whether
//! one exists decides whether requests are instrumented at all.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use crate::context::CorrelationContext;

/// Free-form properties attached to a telemetry record.
pub type Properties = BTreeMap<String, String>;

/// Context tags that override the client's defaults for one record.
pub type Tags = BTreeMap<String, String>;

/// Tag correlating a record with the operation it belongs to.
pub const OPERATION_ID_TAG: &str = "ai.operation.id";

/// A call made on behalf of an operation to something outside the process.
#[derive(Debug, Clone)]
pub struct DependencyTelemetry {
    pub name: String,
    pub data: String,
    pub dependency_type_name: String,
    pub duration: Duration,
    pub result_code: u16,
    pub success: bool,
    /// When the call finished.
    pub time: SystemTime,
    pub context: Option<Arc<CorrelationContext>>,
    pub tag_overrides: Option<Tags>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityLevel {
    Verbose,
    Information,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct ExceptionTelemetry {
    pub message: String,
    pub severity: SeverityLevel,
    pub properties: Properties,
    pub context: Option<Arc<CorrelationContext>>,
    pub tag_overrides: Option<Tags>,
}

#[derive(Debug, Clone)]
pub struct MetricTelemetry {
    pub name: String,
    pub value: f64,
    pub properties: Properties,
    pub context: Option<Arc<CorrelationContext>>,
    pub tag_overrides: Option<Tags>,
}

pub trait TelemetryClient: Send + Sync {
    fn track_dependency(&self, telemetry: DependencyTelemetry);

    fn track_exception(&self, telemetry: ExceptionTelemetry);

    fn track_metric(&self, telemetry: MetricTelemetry);
}

/// Emits telemetry as `tracing` events, exported by whatever subscriber
/// [`crate::setup::setup`] installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetryClient;

impl TelemetryClient for TracingTelemetryClient {
    fn track_dependency(&self, telemetry: DependencyTelemetry) {
        let operation_id = operation_id(&telemetry.context, &telemetry.tag_overrides);
        tracing::info!(
            target: "telemetry::dependency",
            name = %telemetry.name,
            data = %telemetry.data,
            dependency_type = %telemetry.dependency_type_name,
            duration_ms = telemetry.duration.as_millis() as u64,
            result_code = telemetry.result_code,
            success = telemetry.success,
            %operation_id,
        );
    }

    fn track_exception(&self, telemetry: ExceptionTelemetry) {
        let operation_id = operation_id(&telemetry.context, &telemetry.tag_overrides);
        tracing::error!(
            target: "telemetry::exception",
            message = %telemetry.message,
            severity = ?telemetry.severity,
            properties = ?telemetry.properties,
            %operation_id,
        );
    }

    fn track_metric(&self, telemetry: MetricTelemetry) {
        let operation_id = operation_id(&telemetry.context, &telemetry.tag_overrides);
        tracing::info!(
            target: "telemetry::metric",
            name = %telemetry.name,
            value = telemetry.value,
            properties = ?telemetry.properties,
            %operation_id,
        );
    }
}

fn operation_id<'a>(context: &'a Option<Arc<CorrelationContext>>, tags: &'a Option<Tags>) -> &'a str {
    tags.as_ref()
        .and_then(|tags| tags.get(OPERATION_ID_TAG))
        .map(String::as_str)
        .or_else(|| context.as_ref().map(|ctx| ctx.operation().id()))
        .unwrap_or_default()
}

/// Keeps every record in memory instead of exporting it, for tests of code
/// that reports telemetry.
#[derive(Debug, Default)]
pub struct RecordingClient {
    dependencies: Mutex<Vec<DependencyTelemetry>>,
    exceptions: Mutex<Vec<ExceptionTelemetry>>,
    metrics: Mutex<Vec<MetricTelemetry>>,
}

impl RecordingClient {
    pub fn dependencies(&self) -> Vec<DependencyTelemetry> {
        recorded(&self.dependencies).clone()
    }

    pub fn exceptions(&self) -> Vec<ExceptionTelemetry> {
        recorded(&self.exceptions).clone()
    }

    pub fn metrics(&self) -> Vec<MetricTelemetry> {
        recorded(&self.metrics).clone()
    }
}

impl TelemetryClient for RecordingClient {
    fn track_dependency(&self, telemetry: DependencyTelemetry) {
        recorded(&self.dependencies).push(telemetry);
    }

    fn track_exception(&self, telemetry: ExceptionTelemetry) {
        recorded(&self.exceptions).push(telemetry);
    }

    fn track_metric(&self, telemetry: MetricTelemetry) {
        recorded(&self.metrics).push(telemetry);
    }
}

fn recorded<T>(records: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_client_keeps_records() {
        let client = RecordingClient::default();
        client.track_metric(MetricTelemetry {
            name: "Orders-Placed".to_owned(),
            value: 2.0,
            properties: Properties::new(),
            context: None,
            tag_overrides: Some(Tags::from([(
                OPERATION_ID_TAG.to_owned(),
                "5ea03e1018974a28b38e042939aa150c".to_owned(),
            )])),
        });

        let metrics = client.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "Orders-Placed");
        assert_eq!(
            operation_id(&metrics[0].context, &metrics[0].tag_overrides),
            "5ea03e1018974a28b38e042939aa150c"
        );
        assert!(client.dependencies().is_empty());
        assert!(client.exceptions().is_empty());
    }
}
