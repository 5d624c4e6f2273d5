//! Utilities for working with global telemetry primitives.
//!
//! ## Global Trace API
//!
//! The global trace API provides applications access to their configured
//! [`TracerProvider`] instance from anywhere in the codebase. This allows
//! applications to be less coupled to the specific SDK while not manually
//! passing references to each part of the code that needs to create
//! [`Span`]s. Additionally, the SDK and any third party integrations can be
//! configured once per process, avoiding issues from multiple places
//! initializing the telemetry pipeline.
//!
//! ### Usage in Applications
//!
//! ```
//! # #[cfg(feature = "trace")]
//! # {
//! use teletrace::trace::{Tracer, noop::NoopTracerProvider};
//! use teletrace::global;
//!
//! fn init_tracer() {
//!     // Swap this no-op provider for your tracing SDK of choice
//!     let provider = NoopTracerProvider::new();
//!
//!     // Configure the global `TracerProvider` singleton once, at startup
//!     let _ = global::set_tracer_provider(provider);
//! }
//!
//! fn do_something_tracked() {
//!     // Then you can get a named tracer instance anywhere in your codebase.
//!     let tracer = global::tracer("my-component");
//!
//!     tracer.in_span("doing_work", |cx| {
//!         // Traced app logic here...
//!     });
//! }
//!
//! // in main or other app start
//! init_tracer();
//! do_something_tracked();
//! # }
//! ```
//!
//! ## Global error handling
//!
//! Failures on optional instrumentation paths are never surfaced to
//! application code. They are routed to a process-wide error handler
//! instead, which defaults to emitting WARN records through the [`log`]
//! facade and can be replaced with [`set_error_handler`].
//!
//! [`TracerProvider`]: crate::trace::TracerProvider
//! [`Span`]: crate::trace::Span

mod error_handler;
#[cfg(feature = "trace")]
mod trace;

pub use error_handler::{handle_error, set_error_handler, Error};
#[cfg(feature = "trace")]
pub use trace::{
    set_tracer_provider, shutdown_tracer_provider, tracer, tracer_provider, BoxedSpan,
    BoxedTracer, GlobalTracerProvider, ObjectSafeSpan, ObjectSafeTracer, ObjectSafeTracerProvider,
};
