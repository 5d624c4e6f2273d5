//! # Trace Provider SDK
//!
//! ## Tracer Creation
//!
//! New [`Tracer`] instances are always created through a [`TracerProvider`].
//!
//! All configuration objects and extension points (span processors) are
//! provided by the [`TracerProvider`]. [`Tracer`] instances do not duplicate
//! this data to avoid that different [`Tracer`] instances of the
//! [`TracerProvider`] have different versions of these data.
use crate::global;
use crate::sdk::export::trace::SpanExporter;
use crate::sdk::trace::{
    BatchSpanProcessor, Config, SimpleSpanProcessor, SpanProcessor, Tracer,
};
use crate::trace::TraceResult;
use crate::InstrumentationLibrary;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default tracer name if empty string is provided.
const DEFAULT_COMPONENT_NAME: &str = "rust.teletrace.io/sdk/tracer";

/// TracerProvider inner state, shared by all tracer handles.
pub(crate) struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    tracers: Mutex<HashMap<InstrumentationLibrary, Tracer>>,
}

impl fmt::Debug for TracerProviderInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerProviderInner")
            .field("processors", &self.processors)
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        for processor in &mut self.processors {
            if let Err(err) = processor.shutdown() {
                global::handle_error(err);
            }
        }
    }
}

/// Creator and registry of named [`Tracer`] instances.
///
/// Dropping the last handle shuts down the registered span processors.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl Default for TracerProvider {
    fn default() -> Self {
        TracerProvider::builder().build()
    }
}

impl TracerProvider {
    pub(crate) fn new(inner: Arc<TracerProviderInner>) -> Self {
        TracerProvider { inner }
    }

    /// Create a new [`TracerProvider`] builder.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Span processors associated with this provider
    pub fn span_processors(&self) -> &Vec<Box<dyn SpanProcessor>> {
        &self.inner.processors
    }

    /// Config associated with this provider
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Force flush all remaining spans in span processors and return
    /// results.
    pub fn force_flush(&self) -> Vec<TraceResult<()>> {
        self.span_processors()
            .iter()
            .map(|processor| processor.force_flush())
            .collect()
    }
}

impl crate::trace::TracerProvider for TracerProvider {
    /// This implementation of `TracerProvider` produces `Tracer` instances.
    type Tracer = Tracer;

    /// Create a new versioned `Tracer` instance.
    ///
    /// Tracers are cached per `(name, version)` pair; requesting the same
    /// pair twice returns the same handle.
    fn versioned_tracer(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: Option<impl Into<Cow<'static, str>>>,
    ) -> Self::Tracer {
        // Use the default value if name is an invalid empty string.
        let name = name.into();
        let component_name = if name.is_empty() {
            Cow::Borrowed(DEFAULT_COMPONENT_NAME)
        } else {
            name
        };
        let instrumentation_lib = InstrumentationLibrary::new(component_name, version);

        if let Ok(mut tracers) = self.inner.tracers.lock() {
            return tracers
                .entry(instrumentation_lib.clone())
                .or_insert_with(|| {
                    Tracer::new(instrumentation_lib, Arc::downgrade(&self.inner))
                })
                .clone();
        }

        Tracer::new(instrumentation_lib, Arc::downgrade(&self.inner))
    }
}

/// Builder for provider attributes.
#[derive(Debug, Default)]
pub struct Builder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
}

impl Builder {
    /// The `SpanExporter` that this provider should use, forwarded to
    /// synchronously by a [`SimpleSpanProcessor`].
    pub fn with_simple_exporter<T: SpanExporter + 'static>(self, exporter: T) -> Self {
        let mut processors = self.processors;
        processors.push(Box::new(SimpleSpanProcessor::new(Box::new(exporter))));

        Builder { processors, ..self }
    }

    /// The [`SpanExporter`] that this provider should use, set up behind a
    /// default [`BatchSpanProcessor`].
    pub fn with_batch_exporter<T: SpanExporter + 'static>(self, exporter: T) -> Self {
        let batch = BatchSpanProcessor::builder(exporter).build();
        self.with_span_processor(batch)
    }

    /// The [`SpanProcessor`] that this provider should use.
    pub fn with_span_processor<T: SpanProcessor + 'static>(self, processor: T) -> Self {
        let mut processors = self.processors;
        processors.push(Box::new(processor));

        Builder { processors, ..self }
    }

    /// The sdk [`Config`] that this provider will use.
    pub fn with_config(self, config: Config) -> Self {
        Builder { config, ..self }
    }

    /// Create a new provider from this configuration.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                config: self.config,
                tracers: Mutex::new(HashMap::new()),
            }),
        }
    }
}
