use crate::trace::noop::NoopTracerProvider;
use crate::trace::{self, SpanBuilder, SpanContext, Status};
use crate::{Context, KeyValue};
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Allows a specific [`Span`] to be used generically by [`BoxedSpan`]
/// instances by mirroring the interface and boxing the return types.
///
/// [`Span`]: crate::trace::Span
pub trait ObjectSafeSpan {
    /// An API to record events at a specific time in the context of a given
    /// `Span`.
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    );

    /// The `SpanContext` for the given `Span`.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` if this `Span` is recording information.
    fn is_recording(&self) -> bool;

    /// Set a single `Attribute` of this span.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Sets the status of this `Span`.
    fn set_status(&mut self, status: Status);

    /// Updates the `Span`'s name.
    fn update_name(&mut self, new_name: Cow<'static, str>);

    /// Adds a link to another span's context.
    fn add_link(&mut self, span_context: SpanContext, attributes: Vec<KeyValue>);

    /// Finishes the `Span` at the given time.
    ///
    /// Implementations MUST ignore all subsequent calls.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

impl<T: trace::Span> ObjectSafeSpan for T {
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        self.add_event_with_timestamp(name, timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        self.span_context()
    }

    fn is_recording(&self) -> bool {
        self.is_recording()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.set_attribute(attribute)
    }

    fn set_status(&mut self, status: Status) {
        self.set_status(status)
    }

    fn update_name(&mut self, new_name: Cow<'static, str>) {
        self.update_name(new_name)
    }

    fn add_link(&mut self, span_context: SpanContext, attributes: Vec<KeyValue>) {
        self.add_link(span_context, attributes)
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.end_with_timestamp(timestamp)
    }
}

/// Wraps the [`BoxedTracer`]'s [`Span`] so it can be used generically by
/// applications without knowing the underlying type.
///
/// [`Span`]: crate::trace::Span
pub struct BoxedSpan(Box<dyn ObjectSafeSpan + Send + Sync>);

impl BoxedSpan {
    pub(crate) fn new<T>(span: T) -> Self
    where
        T: ObjectSafeSpan + Send + Sync + 'static,
    {
        BoxedSpan(Box::new(span))
    }
}

impl fmt::Debug for BoxedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedSpan")
    }
}

impl trace::Span for BoxedSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        self.0
            .add_event_with_timestamp(name.into(), timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        self.0.span_context()
    }

    fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.0.set_attribute(attribute)
    }

    fn set_status(&mut self, status: Status) {
        self.0.set_status(status)
    }

    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.update_name(new_name.into())
    }

    fn add_link(&mut self, span_context: SpanContext, attributes: Vec<KeyValue>) {
        self.0.add_link(span_context, attributes)
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.0.end_with_timestamp(timestamp);
    }
}

/// Allows a specific [`Tracer`] to be used generically by [`BoxedTracer`]
/// instances by mirroring the interface and boxing the returned types.
///
/// [`Tracer`]: crate::trace::Tracer
pub trait ObjectSafeTracer {
    /// Returns a boxed span from a builder and explicit parent context.
    fn build_with_context_boxed(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Box<dyn ObjectSafeSpan + Send + Sync>;
}

impl<S, T> ObjectSafeTracer for T
where
    S: trace::Span + Send + Sync + 'static,
    T: trace::Tracer<Span = S>,
{
    fn build_with_context_boxed(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Box<dyn ObjectSafeSpan + Send + Sync> {
        Box::new(self.build_with_context(builder, parent_cx))
    }
}

/// Wraps the [`GlobalTracerProvider`]'s [`Tracer`] so it can be used
/// generically by applications without knowing the underlying type.
///
/// [`Tracer`]: crate::trace::Tracer
pub struct BoxedTracer(Box<dyn ObjectSafeTracer + Send + Sync>);

impl fmt::Debug for BoxedTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedTracer")
    }
}

impl trace::Tracer for BoxedTracer {
    /// Global tracer uses `BoxedSpan`s so that it can be a global singleton,
    /// which is not possible if it takes generic type parameters.
    type Span = BoxedSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        BoxedSpan(self.0.build_with_context_boxed(builder, parent_cx))
    }
}

/// Allows a specific [`TracerProvider`] to be used generically, by
/// mirroring the interface and boxing the returned types.
pub trait ObjectSafeTracerProvider {
    /// Creates a versioned named tracer instance that is a trait object
    /// through the underlying `TracerProvider`.
    fn boxed_tracer(
        &self,
        name: Cow<'static, str>,
        version: Option<Cow<'static, str>>,
    ) -> Box<dyn ObjectSafeTracer + Send + Sync>;
}

impl<S, T, P> ObjectSafeTracerProvider for P
where
    S: trace::Span + Send + Sync + 'static,
    T: trace::Tracer<Span = S> + Send + Sync + 'static,
    P: trace::TracerProvider<Tracer = T>,
{
    fn boxed_tracer(
        &self,
        name: Cow<'static, str>,
        version: Option<Cow<'static, str>>,
    ) -> Box<dyn ObjectSafeTracer + Send + Sync> {
        Box::new(self.versioned_tracer(name, version))
    }
}

/// Represents the globally configured [`TracerProvider`] instance for this
/// application. This allows generic tracing through the returned
/// [`BoxedTracer`] instances.
#[derive(Clone)]
pub struct GlobalTracerProvider {
    provider: Arc<dyn ObjectSafeTracerProvider + Send + Sync>,
}

impl fmt::Debug for GlobalTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GlobalTracerProvider")
    }
}

impl GlobalTracerProvider {
    /// Create a new `GlobalTracerProvider` instance from a struct that
    /// implements `TracerProvider`.
    fn new<P, T, S>(provider: P) -> Self
    where
        S: trace::Span + Send + Sync + 'static,
        T: trace::Tracer<Span = S> + Send + Sync + 'static,
        P: trace::TracerProvider<Tracer = T> + Send + Sync + 'static,
    {
        GlobalTracerProvider {
            provider: Arc::new(provider),
        }
    }
}

impl trace::TracerProvider for GlobalTracerProvider {
    type Tracer = BoxedTracer;

    /// Create a versioned tracer using the global provider.
    fn versioned_tracer(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: Option<impl Into<Cow<'static, str>>>,
    ) -> Self::Tracer {
        BoxedTracer(self.provider.boxed_tracer(name.into(), version.map(Into::into)))
    }
}

/// The global `Tracer` provider singleton.
static GLOBAL_TRACER_PROVIDER: Lazy<RwLock<GlobalTracerProvider>> =
    Lazy::new(|| RwLock::new(GlobalTracerProvider::new(NoopTracerProvider::new())));

/// Returns an instance of the currently configured global [`TracerProvider`]
/// through [`GlobalTracerProvider`].
pub fn tracer_provider() -> GlobalTracerProvider {
    GLOBAL_TRACER_PROVIDER
        .read()
        .map(|provider| provider.clone())
        .unwrap_or_else(|_| GlobalTracerProvider::new(NoopTracerProvider::new()))
}

/// Creates a named instance of [`Tracer`] via the configured
/// [`GlobalTracerProvider`].
///
/// If the name is an empty string, the provider will use a default name.
///
/// This is a more convenient way of expressing
/// `global::tracer_provider().tracer(name)`.
///
/// [`Tracer`]: crate::trace::Tracer
pub fn tracer(name: impl Into<Cow<'static, str>>) -> BoxedTracer {
    GLOBAL_TRACER_PROVIDER
        .read()
        .map(|provider| BoxedTracer(provider.provider.boxed_tracer(name.into(), None)))
        .unwrap_or_else(|_| BoxedTracer(Box::new(crate::trace::noop::NoopTracer::new())))
}

/// Sets the given [`TracerProvider`] instance as the current global
/// provider, returning the provider it replaced.
///
/// Replacement is allowed but observable: instrumentation that cached
/// tracers from the previous provider keeps feeding the old pipeline until
/// it fetches new ones.
pub fn set_tracer_provider<P, T, S>(new_provider: P) -> GlobalTracerProvider
where
    S: trace::Span + Send + Sync + 'static,
    T: trace::Tracer<Span = S> + Send + Sync + 'static,
    P: trace::TracerProvider<Tracer = T> + Send + Sync + 'static,
{
    let mut tracer_provider = GLOBAL_TRACER_PROVIDER
        .write()
        .expect("GLOBAL_TRACER_PROVIDER RwLock poisoned");
    std::mem::replace(
        &mut *tracer_provider,
        GlobalTracerProvider::new(new_provider),
    )
}

/// Shut down the current tracer provider.
///
/// This will invoke the shutdown method on all span processors owned by the
/// outgoing provider, if the outgoing provider was the last handle to its
/// pipeline. The global provider reverts to a no-op.
pub fn shutdown_tracer_provider() {
    let _ = set_tracer_provider(NoopTracerProvider::new());
}
