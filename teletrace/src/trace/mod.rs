//! The `trace` module includes types for tracking the progression of a
//! single request while it is handled by services that make up an
//! application.
//!
//! A trace is a tree of [`Span`]s which are objects that represent the work
//! being done by individual services or components involved in a request as
//! it flows through a system.
//!
//! ## Overview
//!
//! The tracing API consists of three main traits:
//!
//! * [`TracerProvider`]s are the entry point of the API. They provide access
//!   to `Tracer`s.
//! * [`Tracer`]s are types responsible for creating `Span`s.
//! * [`Span`]s provide the API to trace an operation.
//!
//! ## Managing Active Spans
//!
//! Spans can be marked as "active" for a given [`Context`], and all newly
//! created spans will automatically be children of the currently active
//! span.
//!
//! The active span for a given thread can be managed via
//! [`get_active_span`] and [`mark_span_as_active`].
//!
//! [`Context`]: crate::Context
//!
//! ```
//! use teletrace::{global, trace::{self, Span, Status, Tracer}};
//!
//! fn may_error(rand: f32) {
//!     if rand < 0.5 {
//!         // Get the currently active span to record additional attributes,
//!         // status, etc.
//!         trace::get_active_span(|span| {
//!             span.set_status(Status::error("value too small"));
//!         });
//!     }
//! }
//!
//! // Get a tracer
//! let tracer = global::tracer("my_tracer");
//!
//! // Create a span
//! let span = tracer.start("parent_span");
//!
//! // Mark the span as active
//! let active = trace::mark_span_as_active(span);
//!
//! // Any span created here will be a child of `parent_span`...
//!
//! // Drop the guard and the span will no longer be active
//! drop(active)
//! ```
//!
//! Spans never surface errors to instrumented application code: invalid
//! input is dropped with a report to the global error handler, and
//! operations on ended or non-recording spans are silent no-ops.

use crate::{ExportError, KeyValue};
use std::borrow::Cow;
use std::time;
use std::time::SystemTime;
use thiserror::Error;

pub(crate) mod context;
mod event;
mod ids;
mod link;
pub mod noop;
mod span_context;
mod tracer;
mod tracer_provider;

pub use self::{
    context::{get_active_span, mark_span_as_active, SpanRef, TraceContextExt},
    event::Event,
    ids::{
        decode_hex, encode_hex, u128_from_hex, u64_from_hex, ParseHexError, SpanId, TraceFlags,
        TraceId,
    },
    link::Link,
    span_context::{SpanContext, TraceState, TraceStateError},
    tracer::{SamplingDecision, SamplingResult, SpanBuilder, Tracer},
    tracer_provider::TracerProvider,
};

/// Describe the result of operations in tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the trace API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// Export failed with the error returned by the exporter
    #[error("Exporter {} failed with {0}", .0.exporter_name())]
    ExportFailed(Box<dyn ExportError>),

    /// Export failed to finish after certain period and processor stopped the export.
    #[error("Exporting timed out after {} seconds", .0.as_secs())]
    ExportTimedOut(time::Duration),

    /// Other errors propagated from trace SDK that weren't covered above
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl<T> From<T> for TraceError
where
    T: ExportError,
{
    fn from(err: T) -> Self {
        TraceError::ExportFailed(Box::new(err))
    }
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);

/// The interface for a single operation within a trace.
///
/// Spans are created by [`Tracer`]s and carry their identity in an immutable
/// [`SpanContext`]. Every mutation below is total: once a span has ended, or
/// if it was never recording, calls are silently ignored.
pub trait Span {
    /// Record an event in the context of this span.
    fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, crate::time::now(), attributes)
    }

    /// Record an event with a wall-clock timestamp in the context of this
    /// span.
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>;

    /// The `SpanContext` for this span.
    ///
    /// The returned value may be used even after the span has ended, and is
    /// the same for the entire span lifetime.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` if this span is recording information like events,
    /// attributes, or status. Always `false` after `end`.
    fn is_recording(&self) -> bool;

    /// Set a single attribute of this span.
    ///
    /// Setting an attribute with the same key as an existing attribute
    /// overwrites the existing attribute's value.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Set multiple attributes of this span.
    fn set_attributes<I>(&mut self, attributes: I)
    where
        Self: Sized,
        I: IntoIterator<Item = KeyValue>,
    {
        for attribute in attributes {
            self.set_attribute(attribute)
        }
    }

    /// Sets the status of this span.
    ///
    /// The statuses form a total order `Ok > Error > Unset`: a status update
    /// only takes effect when it is greater than the current status, so `Ok`
    /// is final.
    fn set_status(&mut self, status: Status);

    /// Updates this span's name.
    ///
    /// Sampling has already happened by the time the name changes, so any
    /// name-based sampling decision is unaffected.
    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>;

    /// Adds a [`Link`] to another span's context.
    fn add_link(&mut self, span_context: SpanContext, attributes: Vec<KeyValue>);

    /// Signals that the operation described by this span has now ended.
    ///
    /// Only the first `end` call takes effect; later calls are no-ops and do
    /// not re-publish the span.
    fn end(&mut self) {
        self.end_with_timestamp(crate::time::now());
    }

    /// Signals that the operation described by this span ended at the given
    /// wall-clock time.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

/// The kind of relationship a [`Span`] has to the operation that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The span describes a request to some remote service.
    Client,

    /// The span covers the server-side handling of a synchronous RPC or
    /// other remote request.
    Server,

    /// The span describes the initiator of an asynchronous request.
    Producer,

    /// The span describes a child of an asynchronous producer request.
    Consumer,

    /// Default value. The span represents an internal operation within an
    /// application.
    Internal,
}

/// The status of a [`Span`] and, for errors, a description of why.
#[derive(Clone, Debug, PartialOrd, PartialEq, Eq)]
pub enum Status {
    /// The default status.
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with a given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Returns `true` for [`Status::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Unset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order() {
        // Ok > Error > Unset, which makes Ok final.
        assert!(Status::Ok > Status::error("oops"));
        assert!(Status::error("oops") > Status::Unset);
        assert!(Status::Ok > Status::Unset);
    }
}
