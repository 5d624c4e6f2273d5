//! Trace testing utilities.
use crate::sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use crate::sdk::trace::{EvictedHashMap, EvictedQueue};
use crate::trace::{
    SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState,
};
use crate::KeyValue;
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// A minimal [`Span`] carrying nothing but a span context, for tests that
/// only need parentage.
///
/// [`Span`]: crate::trace::Span
#[derive(Clone, Debug)]
pub struct TestSpan(pub SpanContext);

impl crate::trace::Span for TestSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        _name: T,
        _timestamp: SystemTime,
        _attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
    }

    fn span_context(&self) -> &SpanContext {
        &self.0
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn set_attribute(&mut self, _attribute: KeyValue) {}

    fn set_status(&mut self, _status: Status) {}

    fn update_name<T>(&mut self, _new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
    }

    fn add_link(&mut self, _span_context: SpanContext, _attributes: Vec<KeyValue>) {}

    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {}
}

/// Build a finished-span snapshot suitable for feeding processors directly.
pub fn new_test_export_span_data(sampled: bool) -> SpanData {
    let flags = if sampled {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::default()
    };
    SpanData {
        span_context: SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            flags,
            false,
            TraceState::default(),
        ),
        parent_span_id: SpanId::INVALID,
        span_kind: SpanKind::Internal,
        name: "test-span".into(),
        start_time: crate::time::now(),
        end_time: crate::time::now(),
        attributes: EvictedHashMap::new(128, 0),
        events: EvictedQueue::new(128),
        links: EvictedQueue::new(128),
        status: Status::Unset,
        instrumentation_lib: Default::default(),
    }
}

/// A span exporter that drops everything.
#[derive(Debug, Default)]
pub struct NoopSpanExporter {
    _private: (),
}

impl NoopSpanExporter {
    /// Create a new no-op span exporter.
    pub fn new() -> Self {
        NoopSpanExporter { _private: () }
    }
}

#[async_trait]
impl SpanExporter for NoopSpanExporter {
    async fn export(&mut self, _batch: Vec<SpanData>) -> ExportResult {
        Ok(())
    }
}

/// A span exporter sending each exported batch and shutdown signal over
/// channels, optionally parking in `export` until released.
#[derive(Debug)]
pub struct TestExporter {
    batches: Sender<Vec<SpanData>>,
    shutdown_signal: Sender<()>,
    gate: Option<Gate>,
}

#[derive(Debug)]
struct Gate {
    started: Sender<()>,
    release: Receiver<()>,
}

impl TestExporter {
    /// Create an exporter together with receivers for its exported batches
    /// and shutdown signals.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (TestExporter, Receiver<Vec<SpanData>>, Receiver<()>) {
        let (batches, batches_rx) = unbounded();
        let (shutdown_signal, shutdown_rx) = unbounded();
        (
            TestExporter {
                batches,
                shutdown_signal,
                gate: None,
            },
            batches_rx,
            shutdown_rx,
        )
    }

    /// Create an exporter that signals when an export begins and then parks
    /// until the returned release sender is used (or dropped).
    pub fn gated() -> (
        TestExporter,
        Receiver<Vec<SpanData>>,
        Receiver<()>,
        Sender<()>,
    ) {
        let (batches, batches_rx) = unbounded();
        let (shutdown_signal, _shutdown_rx) = unbounded();
        let (started, started_rx) = unbounded();
        let (release_tx, release) = unbounded();
        (
            TestExporter {
                batches,
                shutdown_signal,
                gate: Some(Gate { started, release }),
            },
            batches_rx,
            started_rx,
            release_tx,
        )
    }
}

#[async_trait]
impl SpanExporter for TestExporter {
    async fn export(&mut self, batch: Vec<SpanData>) -> ExportResult {
        if let Some(gate) = &self.gate {
            let _ = gate.started.send(());
            // Parks until released; a dropped release sender unparks
            // immediately.
            let _ = gate.release.recv();
        }
        let _ = self.batches.send(batch);
        Ok(())
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_signal.send(());
    }
}

/// A span exporter accumulating everything it receives in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanExporter {
    /// Create a new in-memory exporter.
    pub fn new() -> Self {
        InMemorySpanExporter::default()
    }

    /// A snapshot of the spans exported so far.
    pub fn exported_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Discard all recorded spans.
    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

#[async_trait]
impl SpanExporter for InMemorySpanExporter {
    async fn export(&mut self, mut batch: Vec<SpanData>) -> ExportResult {
        if let Ok(mut spans) = self.spans.lock() {
            spans.append(&mut batch);
        }
        Ok(())
    }
}
