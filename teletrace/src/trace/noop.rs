//! No-op trace implementation.
//!
//! This implementation is returned as the global tracer if no tracer
//! provider has been set. It is also useful for testing purposes as it is
//! intended to have minimal resource utilization and runtime impact.
use crate::trace::{self, SpanBuilder, SpanContext, TraceContextExt};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// A no-op instance of a `TracerProvider`.
#[derive(Clone, Debug, Default)]
pub struct NoopTracerProvider {
    _private: (),
}

impl NoopTracerProvider {
    /// Create a new no-op tracer provider.
    pub fn new() -> Self {
        NoopTracerProvider { _private: () }
    }
}

impl trace::TracerProvider for NoopTracerProvider {
    type Tracer = NoopTracer;

    fn versioned_tracer(
        &self,
        _name: impl Into<Cow<'static, str>>,
        _version: Option<impl Into<Cow<'static, str>>>,
    ) -> Self::Tracer {
        NoopTracer::new()
    }
}

/// A no-op instance of a `Span`.
#[derive(Clone, Debug)]
pub struct NoopSpan {
    span_context: SpanContext,
}

impl Default for NoopSpan {
    fn default() -> Self {
        NoopSpan::new()
    }
}

impl NoopSpan {
    /// Create a new no-op span carrying the invalid span context.
    pub fn new() -> Self {
        NoopSpan {
            span_context: SpanContext::NONE,
        }
    }

    pub(crate) fn with_span_context(span_context: SpanContext) -> Self {
        NoopSpan { span_context }
    }
}

impl trace::Span for NoopSpan {
    /// Ignores all events with timestamps
    fn add_event_with_timestamp<T>(
        &mut self,
        _name: T,
        _timestamp: SystemTime,
        _attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        // Ignored
    }

    /// Returns an invalid `SpanContext` unless a valid parent context was
    /// propagated through this span.
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns false, signifying that this span never records.
    fn is_recording(&self) -> bool {
        false
    }

    /// Ignores all attributes
    fn set_attribute(&mut self, _attribute: KeyValue) {
        // Ignored
    }

    /// Ignores status
    fn set_status(&mut self, _status: trace::Status) {
        // Ignored
    }

    /// Ignores name updates
    fn update_name<T>(&mut self, _new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        // Ignored
    }

    /// Ignores links
    fn add_link(&mut self, _span_context: SpanContext, _attributes: Vec<KeyValue>) {
        // Ignored
    }

    /// Ignores `Span` endings
    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {
        // Ignored
    }
}

/// A no-op instance of a `Tracer`.
#[derive(Clone, Debug, Default)]
pub struct NoopTracer {
    _private: (),
}

impl NoopTracer {
    /// Create a new no-op tracer.
    pub fn new() -> Self {
        NoopTracer { _private: () }
    }
}

impl trace::Tracer for NoopTracer {
    type Span = NoopSpan;

    /// Builds a `NoopSpan` from a `SpanBuilder`.
    ///
    /// If the parent context contains a valid span context, it is propagated
    /// so no-op tracers do not sever traces passing through them.
    fn build_with_context(&self, _builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        if parent_cx.has_active_span() {
            NoopSpan::with_span_context(parent_cx.span().span_context().clone())
        } else {
            NoopSpan::new()
        }
    }
}
