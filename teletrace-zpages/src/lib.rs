//! In-process span diagnostics for the teletrace runtime.
//!
//! This crate provides the [`TracezSpanProcessor`], a span processor that
//! retains recent finished spans in fixed-size ring buckets, grouped by
//! span name and classified by latency class or error status. A diagnostic
//! page (a "zPages" surface) reads the rings through the processor's
//! observer methods; no spans ever leave the process.
//!
//! The processor is cheap to clone: clones share the same buckets, so one
//! clone can be registered with a tracer provider while another serves
//! reads.
//!
//! # Getting Started
//!
//! ```
//! use teletrace::sdk::trace::TracerProvider;
//! use teletrace::trace::{Span, Tracer, TracerProvider as _};
//! use teletrace_zpages::TracezSpanProcessor;
//!
//! let tracez = TracezSpanProcessor::new();
//! let provider = TracerProvider::builder()
//!     .with_span_processor(tracez.clone())
//!     .build();
//!
//! let tracer = provider.tracer("app");
//! tracer.start("operation").end();
//!
//! for counts in tracez.aggregation() {
//!     println!("{}: {:?} latency buckets", counts.span_name, counts.latency);
//! }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod trace;

pub use trace::{latency_bucket_index, TracezCounts, TracezSpanProcessor, LATENCY_BUCKET_COUNT};
