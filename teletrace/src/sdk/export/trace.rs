//! Span exporter contract and the immutable finished-span snapshot.
use crate::sdk::trace::{EvictedHashMap, EvictedQueue};
use crate::trace::{Event, Link, SpanContext, SpanId, SpanKind, Status, TraceResult};
use crate::InstrumentationLibrary;
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt::Debug;
use std::time::SystemTime;

/// Describes the result of an export.
pub type ExportResult = TraceResult<()>;

/// `SpanExporter` defines the interface that protocol-specific exporters
/// must implement so that they can be plugged into a span processor and
/// have their spans exported.
///
/// The goal of the interface is to minimize burden of implementation for
/// protocol-dependent telemetry exporters. The protocol exporter is expected
/// to be primarily a simple telemetry data encoder and transmitter.
#[async_trait]
pub trait SpanExporter: Send + Debug {
    /// Exports a batch of readable spans. Protocol exporters that will
    /// implement this function are typically expected to serialize and
    /// transmit the data to the destination.
    ///
    /// This function will never be called concurrently for the same exporter
    /// instance. It can be called again only after the current call returns.
    ///
    /// Any retry logic that is required by the exporter is the
    /// responsibility of the exporter.
    async fn export(&mut self, batch: Vec<SpanData>) -> ExportResult;

    /// Shuts down the exporter. Called when the SDK is shut down. This is an
    /// opportunity for the exporter to do any cleanup required.
    ///
    /// This function should be called only once for each `SpanExporter`
    /// instance. After the call to `shutdown`, subsequent calls to `export`
    /// are not allowed and should return an error.
    fn shutdown(&mut self) {}
}

/// `SpanData` contains all the information collected by a `Span` and can be
/// used by exporters as a standard input.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, invalid for root spans
    pub parent_span_id: SpanId,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes, bounded with a dropped count
    pub attributes: EvictedHashMap,
    /// Span events, bounded with a dropped count
    pub events: EvictedQueue<Event>,
    /// Span Links, bounded with a dropped count
    pub links: EvictedQueue<Link>,
    /// Span status
    pub status: Status,
    /// Instrumentation library that produced this span
    pub instrumentation_lib: InstrumentationLibrary,
}
