//! W3C `traceparent` identifiers.
//!
//! A [`TraceParent`] names one position in a distributed trace:
//! `{version}-{trace_id}-{span_id}-{trace_flags}`, e.g.
//! `00-5ea03e1018974a28b38e042939aa150c-0a223745ca844f3a-01`.
//!
//! See <https://www.w3.org/TR/trace-context/#traceparent-header>.

use std::fmt;

use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};

use crate::tracestate::TraceState;

const VERSION: u8 = 0x00;
const INVALID_VERSION: &str = "ff";
const TRACE_ID_LEN: usize = 32;
const SPAN_ID_LEN: usize = 16;
const BYTE_LEN: usize = 2;

/// Position of a span within a trace.
///
/// Values are immutable. Entering a child span produces a new value through
/// [`TraceParent::update_span_id`], so a `TraceParent` held by one reader is
/// never changed underneath it by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    version: u8,
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
}

impl TraceParent {
    /// Parses a `traceparent` header value.
    ///
    /// Returns `None` for anything that is not four lowercase hex fields of
    /// the right lengths, for all-zero ids and for the forbidden `ff`
    /// version.
    pub fn parse(header: &str) -> Option<Self> {
        let mut fields = header.trim().split('-');
        let (Some(version), Some(trace_id), Some(span_id), Some(flags), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return None;
        };

        if !is_lower_hex(version, BYTE_LEN) || version == INVALID_VERSION {
            return None;
        }
        if !Self::is_valid_trace_id(trace_id) || !is_valid_span_id(span_id) {
            return None;
        }
        if !is_lower_hex(flags, BYTE_LEN) {
            return None;
        }

        Some(Self {
            version: u8::from_str_radix(version, 16).ok()?,
            trace_id: TraceId::from_hex(trace_id).ok()?,
            span_id: SpanId::from_hex(span_id).ok()?,
            flags: TraceFlags::new(u8::from_str_radix(flags, 16).ok()?),
        })
    }

    /// Starts a brand new, sampled trace.
    pub fn generate() -> Self {
        Self {
            version: VERSION,
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            flags: TraceFlags::SAMPLED,
        }
    }

    /// Opens a fresh span inside an already known trace.
    ///
    /// Returns `None` if `trace_id` is not a valid trace id.
    pub fn with_trace_id(trace_id: &str) -> Option<Self> {
        if !Self::is_valid_trace_id(trace_id) {
            return None;
        }

        Some(Self {
            trace_id: TraceId::from_hex(trace_id).ok()?,
            ..Self::generate()
        })
    }

    /// Returns a child of this span: same trace, new span id.
    #[must_use]
    pub fn update_span_id(&self) -> Self {
        Self {
            span_id: new_span_id(),
            ..*self
        }
    }

    /// Legacy hierarchical request id, `|<trace_id>.<span_id>.`.
    pub fn back_compat_request_id(&self) -> String {
        format!("|{}.{}.", self.trace_id(), self.span_id())
    }

    /// True for 32 lowercase hex characters that are not all zero.
    pub fn is_valid_trace_id(trace_id: &str) -> bool {
        is_lower_hex(trace_id, TRACE_ID_LEN) && !is_all_zero(trace_id)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Trace id as 32 lowercase hex characters.
    pub fn trace_id(&self) -> String {
        format!("{:032x}", u128::from_be_bytes(self.trace_id.to_bytes()))
    }

    /// Span id as 16 lowercase hex characters.
    pub fn span_id(&self) -> String {
        format!("{:016x}", u64::from_be_bytes(self.span_id.to_bytes()))
    }

    pub fn flags(&self) -> u8 {
        self.flags.to_u8()
    }

    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Describes this position as a remote parent for OpenTelemetry spans.
    pub fn to_span_context(&self, tracestate: Option<&TraceState>) -> SpanContext {
        SpanContext::new(
            self.trace_id,
            self.span_id,
            self.flags,
            true,
            tracestate.map(TraceState::to_otel).unwrap_or_default(),
        )
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            self.trace_id(),
            self.span_id(),
            self.flags()
        )
    }
}

fn is_valid_span_id(span_id: &str) -> bool {
    is_lower_hex(span_id, SPAN_ID_LEN) && !is_all_zero(span_id)
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_all_zero(value: &str) -> bool {
    value.bytes().all(|b| b == b'0')
}

// The generator can in principle hand back an all-zero id, which the
// protocol treats as absent.
fn new_trace_id() -> TraceId {
    let generator = RandomIdGenerator::default();
    loop {
        let id = generator.new_trace_id();
        if id != TraceId::INVALID {
            return id;
        }
    }
}

fn new_span_id() -> SpanId {
    let generator = RandomIdGenerator::default();
    loop {
        let id = generator.new_span_id();
        if id != SpanId::INVALID {
            return id;
        }
    }
}
