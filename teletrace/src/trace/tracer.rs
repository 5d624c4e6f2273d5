use crate::trace::{Event, Link, SpanId, SpanKind, Status, TraceContextExt, TraceId, TraceState};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// The interface for constructing [`Span`]s.
///
/// ## In Synchronous Code
///
/// Spans can be created and nested manually:
///
/// ```
/// use teletrace::{global, trace::{Span, Tracer, TraceContextExt}, Context};
///
/// let tracer = global::tracer("my-component");
///
/// let parent = tracer.start("foo");
/// let parent_cx = Context::current_with_span(parent);
/// let mut child = tracer.start_with_context("bar", &parent_cx);
///
/// // ...
///
/// child.end(); // explicitly end
/// drop(parent_cx) // or implicitly end on drop
/// ```
///
/// Spans can also use the current thread's [`Context`] to track which span
/// is active:
///
/// ```
/// use teletrace::{global, trace::{SpanKind, Tracer}};
///
/// let tracer = global::tracer("my-component");
///
/// // Create simple spans with `in_span`
/// tracer.in_span("foo", |_foo_cx| {
///     // parent span is active
///     tracer.in_span("bar", |_bar_cx| {
///         // child span is now the active span and associated with the parent span
///     });
///     // child has ended, parent now the active span again
/// });
/// // parent has ended, no active spans
/// ```
///
/// [`Span`]: crate::trace::Span
pub trait Tracer {
    /// The [`Span`] type used by this tracer.
    ///
    /// [`Span`]: crate::trace::Span
    type Span: crate::trace::Span;

    /// Starts a new [`Span`], with the current context as parent.
    ///
    /// Each span has zero or one parent spans and zero or more child spans,
    /// which represent causally related operations. A tree of related spans
    /// comprises a trace. A span is said to be a root span if it does not
    /// have a parent.
    ///
    /// [`Span`]: crate::trace::Span
    fn start<T>(&self, name: T) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Starts a new [`Span`] with a given parent context.
    ///
    /// [`Span`]: crate::trace::Span
    fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Creates a span builder.
    ///
    /// An ergonomic way of specifying optional span attributes, events, and
    /// links before starting.
    fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    /// Create a span from a [`SpanBuilder`], with the current context as
    /// parent.
    fn build(&self, builder: SpanBuilder) -> Self::Span {
        Context::map_current(|cx| self.build_with_context(builder, cx))
    }

    /// Create a span from a [`SpanBuilder`] with a parent context.
    ///
    /// The parent span of the new span is resolved from `parent_cx`: its
    /// active span if one is set (explicit spans and explicit remote span
    /// contexts are installed into a context via [`TraceContextExt`]),
    /// otherwise the new span is a root with a fresh trace id.
    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span;

    /// Start a new span and execute the given closure with reference to the
    /// context in which the span is active.
    ///
    /// The span is ended when the closure returns.
    fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(Context) -> T,
        N: Into<Cow<'static, str>>,
        Self::Span: Send + Sync + 'static,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span);
        let guard = cx.clone().attach();
        let result = f(cx.clone());
        drop(guard);
        cx.span().end();
        result
    }
}

/// `SpanBuilder` allows span attributes to be configured before the span
/// has started.
///
/// ```
/// use teletrace::{global, trace::{Tracer, SpanKind}};
///
/// let tracer = global::tracer("example-component");
///
/// let span = tracer
///     .span_builder("span-name")
///     .with_kind(SpanKind::Server)
///     .start(&tracer);
///
/// // span started! defaults to the current context as parent.
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Trace id, useful for integrations with external tracing systems.
    pub trace_id: Option<TraceId>,

    /// Span id, useful for integrations with external tracing systems.
    pub span_id: Option<SpanId>,

    /// Span kind
    pub span_kind: Option<SpanKind>,

    /// Span name
    pub name: Cow<'static, str>,

    /// Span start time
    pub start_time: Option<SystemTime>,

    /// Span end time
    pub end_time: Option<SystemTime>,

    /// Span attributes that are provided at the span creation time.
    /// More attributes can be added afterwards.
    pub attributes: Option<Vec<KeyValue>>,

    /// Span events
    pub events: Option<Vec<Event>>,

    /// Span links
    pub links: Option<Vec<Link>>,

    /// Span status
    pub status: Status,

    /// Sampling result, if a decision was already made elsewhere.
    pub sampling_result: Option<SamplingResult>,
}

impl SpanBuilder {
    /// Create a new span builder from a span name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Specify trace id to use if no parent context exists.
    pub fn with_trace_id(self, trace_id: TraceId) -> Self {
        SpanBuilder {
            trace_id: Some(trace_id),
            ..self
        }
    }

    /// Assign span id.
    pub fn with_span_id(self, span_id: SpanId) -> Self {
        SpanBuilder {
            span_id: Some(span_id),
            ..self
        }
    }

    /// Assign span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Assign span start time.
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Assign span end time.
    pub fn with_end_time<T: Into<SystemTime>>(self, end_time: T) -> Self {
        SpanBuilder {
            end_time: Some(end_time.into()),
            ..self
        }
    }

    /// Assign span attributes from an iterable.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Assign events.
    pub fn with_events(self, events: Vec<Event>) -> Self {
        SpanBuilder {
            events: Some(events),
            ..self
        }
    }

    /// Assign links.
    pub fn with_links(self, links: Vec<Link>) -> Self {
        SpanBuilder {
            links: Some(links),
            ..self
        }
    }

    /// Assign status code.
    pub fn with_status(self, status: Status) -> Self {
        SpanBuilder { status, ..self }
    }

    /// Assign an externally made sampling result.
    pub fn with_sampling_result(self, sampling_result: SamplingResult) -> Self {
        SpanBuilder {
            sampling_result: Some(sampling_result),
            ..self
        }
    }

    /// Builds a span with the given tracer from this configuration, with the
    /// current context as parent.
    pub fn start<T: Tracer>(self, tracer: &T) -> T::Span {
        Context::map_current(|cx| tracer.build_with_context(self, cx))
    }

    /// Builds a span with the given tracer from this configuration and
    /// parent.
    pub fn start_with_context<T: Tracer>(self, tracer: &T, parent_cx: &Context) -> T::Span {
        tracer.build_with_context(self, parent_cx)
    }
}

/// The diagnosis of a [sampler]'s evaluation of a span at start time.
///
/// [sampler]: crate::sdk::trace::ShouldSample
#[derive(Clone, Debug, PartialEq, Eq, Copy)]
pub enum SamplingDecision {
    /// The span will not be recorded and all events and attributes will be
    /// dropped.
    Drop,

    /// The span is recorded locally but the `sampled` flag stays unset, so
    /// exporters will not receive it.
    RecordOnly,

    /// The span is recorded and the `sampled` flag is set.
    RecordAndSample,
}

/// The result of a sampling decision: the decision itself, any attributes
/// the sampler wants attached to the span, and the trace state the span
/// context should carry.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// The sampling decision for the span in question.
    pub decision: SamplingDecision,

    /// Extra attributes to be attached to the span by the sampler.
    pub attributes: Vec<KeyValue>,

    /// The trace state for the span's context.
    pub trace_state: TraceState,
}
