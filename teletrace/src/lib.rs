//! Implements a core telemetry runtime: distributed tracing, in-process
//! context propagation, and metric aggregation.
//!
//! # Getting Started
//!
//! ```no_run
//! # #[cfg(feature = "trace")]
//! # {
//! use teletrace::{global, trace::{TraceContextExt, Tracer}, Context};
//!
//! fn do_something() {
//!     let tracer = global::tracer("my_component");
//!     let _guard = Context::current_with_span(tracer.start("my_span")).attach();
//!     // do work tracked by the now current span
//! }
//! # }
//! ```
//!
//! # Traces
//!
//! The [`trace`] module includes types for tracking the progression of a
//! single request while it is handled by services that make up an
//! application. A trace is a tree of [`Span`]s which are objects that
//! represent the work being done by individual services or components
//! involved in a request as it flows through a system.
//!
//! ```
//! # #[cfg(feature = "trace")]
//! # {
//! use teletrace::{global, trace::{Span, Tracer}, KeyValue};
//!
//! // get a tracer from a provider
//! let tracer = global::tracer("my_service");
//!
//! // start a new span
//! let mut span = tracer.start("my_span");
//!
//! // set some attributes
//! span.set_attribute(KeyValue::new("http.client_ip", "83.164.160.102"));
//!
//! // end or drop the span to export
//! span.end();
//! # }
//! ```
//!
//! [`Span`]: crate::trace::Span
//!
//! # Metrics
//!
//! The [`metrics`] module includes types for recording measurements about a
//! service at runtime. Instruments are created from a [`Meter`], record into
//! per-label-set aggregators, and are periodically drained to an exporter by
//! the [`sdk::metrics::IntervalMetricReader`].
//!
//! ```
//! # #[cfg(feature = "metrics")]
//! # {
//! use teletrace::metrics::LabelSet;
//! use teletrace::sdk::metrics::MeterProvider;
//!
//! let provider = MeterProvider::builder().build();
//! let meter = provider.meter("my_service");
//!
//! let counter = meter.u64_counter("my_counter").init();
//! let labels = LabelSet::from_labels([("region", "us-east-1")]);
//! let _ = counter.add(1, &labels);
//! # }
//! ```
//!
//! [`Meter`]: crate::metrics::Meter
//!
//! ## Crate Feature Flags
//!
//! * `trace`: Includes the trace API and SDK (enabled by default).
//! * `metrics`: Includes the metrics API and SDK (enabled by default).
//! * `remote-sampler`: Includes the remotely controlled sampler (enabled by
//!   default).
//! * `testing`: Includes in-memory exporters and test spans for use in unit
//!   tests of instrumented code and of satellite crates.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod global;

pub mod baggage;

mod context;

pub use context::{Context, ContextError, ContextGuard, FutureExt, WithContext};

mod common;

pub use common::{Array, ExportError, InstrumentationLibrary, Key, KeyValue, StringValue, Value};

#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub mod trace;

pub mod sdk;

#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

/// Wall-clock time support.
#[cfg(any(feature = "metrics", feature = "trace"))]
pub mod time {
    use std::time::SystemTime;

    /// The current wall-clock time.
    pub fn now() -> SystemTime {
        SystemTime::now()
    }
}
