//! W3C `tracestate` carrier.
//!
//! Vendor state is opaque to this crate: the header is kept verbatim and sent
//! on unchanged. See <https://www.w3.org/TR/trace-context/#tracestate-header>.

use std::{fmt, str::FromStr};

use opentelemetry::trace::TraceState as OtelTraceState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceState {
    raw: String,
}

impl TraceState {
    pub fn parse(header: Option<&str>) -> Self {
        Self {
            raw: header.unwrap_or_default().to_owned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Best effort view for OpenTelemetry spans. A list OpenTelemetry
    /// refuses becomes the empty state; the wire value is unaffected.
    pub fn to_otel(&self) -> OtelTraceState {
        OtelTraceState::from_str(&self.raw).unwrap_or_default()
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_verbatim() {
        let header = "rojo=00f067aa0ba902b7,congo=t61rcWkgMzE";
        assert_eq!(TraceState::parse(Some(header)).to_string(), header);
    }

    #[test]
    fn absent_header_is_empty() {
        let state = TraceState::parse(None);
        assert!(state.is_empty());
        assert_eq!(state.to_string(), "");
    }

    #[test]
    fn converts_to_otel_state() {
        let state = TraceState::parse(Some("rojo=00f067aa0ba902b7"));
        assert_eq!(state.to_otel().get("rojo"), Some("00f067aa0ba902b7"));
    }
}
