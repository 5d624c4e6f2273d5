//! Tracez span buckets.
//!
//! Finished spans are grouped by name. Each name owns nine latency-class
//! ring buckets and one error ring bucket. Ring capacities are powers of
//! two so the write index can be masked instead of taking a modulus.
//! Writers advance an atomic index and overwrite the slot it selects;
//! readers snapshot the index and copy up to `min(written, capacity)`
//! slots. A reader racing a writer may observe a slot from either side of
//! the race, which is acceptable for a diagnostic page.
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use teletrace::sdk::export::trace::SpanData;
use teletrace::sdk::trace::{Span, SpanProcessor};
use teletrace::trace::TraceResult;
use teletrace::Context;

/// The number of latency classes.
pub const LATENCY_BUCKET_COUNT: usize = 9;

/// Lower bounds of the latency classes, excluding the implicit zero bound
/// of the first class.
const LATENCY_BOUNDARIES: [Duration; LATENCY_BUCKET_COUNT - 1] = [
    Duration::from_micros(10),
    Duration::from_micros(100),
    Duration::from_millis(1),
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_secs(1),
    Duration::from_secs(10),
    Duration::from_secs(100),
];

/// Spans retained per latency class, per span name.
const LATENCY_RING_CAPACITY: usize = 16;

/// Error spans retained per span name.
const ERROR_RING_CAPACITY: usize = 8;

/// The latency class index for a span duration.
///
/// Classes are `[0, 10µs)`, `[10µs, 100µs)`, `[100µs, 1ms)`, `[1ms, 10ms)`,
/// `[10ms, 100ms)`, `[100ms, 1s)`, `[1s, 10s)`, `[10s, 100s)`, and
/// `[100s, ∞)`.
pub fn latency_bucket_index(duration: Duration) -> usize {
    LATENCY_BOUNDARIES
        .iter()
        .position(|boundary| duration < *boundary)
        .unwrap_or(LATENCY_BUCKET_COUNT - 1)
}

/// A fixed-capacity overwrite-on-wrap span store.
struct SpanRing {
    slots: Box<[Mutex<Option<SpanData>>]>,
    /// Total number of writes so far; the slot index is `next & mask`.
    next: AtomicUsize,
    mask: usize,
}

impl SpanRing {
    fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let slots = (0..capacity)
            .map(|_| Mutex::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SpanRing {
            slots,
            next: AtomicUsize::new(0),
            mask: capacity - 1,
        }
    }

    fn push(&self, span: SpanData) {
        let index = self.next.fetch_add(1, Ordering::Relaxed) & self.mask;
        if let Ok(mut slot) = self.slots[index].lock() {
            *slot = Some(span);
        }
    }

    /// Total number of spans ever written to this ring.
    fn count(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    /// Copy out the retained spans, at most `min(written, capacity)`.
    fn snapshot(&self) -> Vec<SpanData> {
        let filled = self.count().min(self.slots.len());
        self.slots
            .iter()
            .take(filled)
            .filter_map(|slot| slot.lock().ok().and_then(|slot| slot.clone()))
            .collect()
    }
}

impl fmt::Debug for SpanRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanRing")
            .field("capacity", &self.slots.len())
            .field("written", &self.count())
            .finish()
    }
}

/// The buckets retained for one span name.
#[derive(Debug)]
struct SpanSummary {
    latency: [SpanRing; LATENCY_BUCKET_COUNT],
    error: SpanRing,
}

impl SpanSummary {
    fn new() -> Self {
        SpanSummary {
            latency: std::array::from_fn(|_| SpanRing::new(LATENCY_RING_CAPACITY)),
            error: SpanRing::new(ERROR_RING_CAPACITY),
        }
    }
}

/// Per-span-name counts for the aggregation view of a diagnostic page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracezCounts {
    /// The span name these counts belong to.
    pub span_name: String,
    /// The number of spans observed per latency class.
    pub latency: [u64; LATENCY_BUCKET_COUNT],
    /// The number of spans that finished with an error status.
    pub error: u64,
}

/// A [`SpanProcessor`] retaining samples of recent finished spans per span
/// name for in-process inspection.
///
/// Spans whose status is an error land in the error bucket; all others are
/// classified by latency. Both sampled and unsampled recording spans are
/// retained, since the page inspects local behavior rather than exported
/// data.
#[derive(Clone, Debug, Default)]
pub struct TracezSpanProcessor {
    summaries: Arc<DashMap<String, Arc<SpanSummary>>>,
}

impl TracezSpanProcessor {
    /// Create a new processor with empty buckets.
    pub fn new() -> Self {
        TracezSpanProcessor::default()
    }

    fn summary(&self, span_name: &str) -> Arc<SpanSummary> {
        self.summaries
            .entry(span_name.to_string())
            .or_insert_with(|| Arc::new(SpanSummary::new()))
            .clone()
    }

    /// Per-name counts of everything observed so far.
    pub fn aggregation(&self) -> Vec<TracezCounts> {
        let mut counts: Vec<TracezCounts> = self
            .summaries
            .iter()
            .map(|entry| {
                let summary = entry.value();
                let mut latency = [0u64; LATENCY_BUCKET_COUNT];
                for (bucket, ring) in latency.iter_mut().zip(summary.latency.iter()) {
                    *bucket = ring.count() as u64;
                }
                TracezCounts {
                    span_name: entry.key().clone(),
                    latency,
                    error: summary.error.count() as u64,
                }
            })
            .collect();
        counts.sort_by(|a, b| a.span_name.cmp(&b.span_name));
        counts
    }

    /// The retained spans of one latency class for a span name.
    pub fn latency_spans(&self, span_name: &str, bucket_index: usize) -> Vec<SpanData> {
        if bucket_index >= LATENCY_BUCKET_COUNT {
            return Vec::new();
        }
        self.summaries
            .get(span_name)
            .map(|summary| summary.latency[bucket_index].snapshot())
            .unwrap_or_default()
    }

    /// The retained error spans for a span name.
    pub fn error_spans(&self, span_name: &str) -> Vec<SpanData> {
        self.summaries
            .get(span_name)
            .map(|summary| summary.error.snapshot())
            .unwrap_or_default()
    }
}

impl SpanProcessor for TracezSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        let summary = self.summary(span.name.as_ref());

        if span.status.is_error() {
            summary.error.push(span);
            return;
        }

        let duration = span
            .end_time
            .duration_since(span.start_time)
            .unwrap_or_default();
        summary.latency[latency_bucket_index(duration)].push(span);
    }

    fn is_start_required(&self) -> bool {
        false
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teletrace::testing::trace::new_test_export_span_data;
    use teletrace::trace::Status;

    fn span_with(name: &'static str, duration: Duration, status: Status) -> SpanData {
        let mut span = new_test_export_span_data(true);
        span.name = name.into();
        span.end_time = span.start_time + duration;
        span.status = status;
        span
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(latency_bucket_index(Duration::from_micros(0)), 0);
        assert_eq!(latency_bucket_index(Duration::from_micros(9)), 0);
        assert_eq!(latency_bucket_index(Duration::from_micros(10)), 1);
        assert_eq!(latency_bucket_index(Duration::from_micros(100)), 2);
        assert_eq!(latency_bucket_index(Duration::from_millis(1)), 3);
        assert_eq!(latency_bucket_index(Duration::from_millis(10)), 4);
        assert_eq!(latency_bucket_index(Duration::from_millis(100)), 5);
        assert_eq!(latency_bucket_index(Duration::from_secs(1)), 6);
        assert_eq!(latency_bucket_index(Duration::from_secs(10)), 7);
        assert_eq!(latency_bucket_index(Duration::from_secs(100)), 8);
        assert_eq!(latency_bucket_index(Duration::from_secs(100_000)), 8);
    }

    #[test]
    fn spans_land_in_their_latency_class() {
        let processor = TracezSpanProcessor::new();
        processor.on_end(span_with("op", Duration::from_micros(5), Status::Unset));
        processor.on_end(span_with("op", Duration::from_millis(5), Status::Ok));

        let counts = processor.aggregation();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].span_name, "op");
        assert_eq!(counts[0].latency[0], 1);
        assert_eq!(counts[0].latency[3], 1);
        assert_eq!(counts[0].error, 0);

        assert_eq!(processor.latency_spans("op", 0).len(), 1);
        assert_eq!(processor.latency_spans("op", 3).len(), 1);
        assert!(processor.latency_spans("op", 1).is_empty());
    }

    #[test]
    fn error_spans_only_land_in_the_error_ring() {
        let processor = TracezSpanProcessor::new();
        processor.on_end(span_with(
            "op",
            Duration::from_millis(5),
            Status::error("boom"),
        ));

        let counts = processor.aggregation();
        assert_eq!(counts[0].error, 1);
        assert_eq!(counts[0].latency.iter().sum::<u64>(), 0);
        assert_eq!(processor.error_spans("op").len(), 1);
    }

    #[test]
    fn rings_clamp_retained_spans_but_count_everything() {
        let processor = TracezSpanProcessor::new();
        let total = 100u64;
        for _ in 0..total {
            processor.on_end(span_with("hot", Duration::from_micros(1), Status::Unset));
        }

        let counts = processor.aggregation();
        assert_eq!(counts[0].latency[0], total);
        // retained spans never exceed the ring capacity
        assert_eq!(processor.latency_spans("hot", 0).len(), 16);
    }

    #[test]
    fn names_are_isolated() {
        let processor = TracezSpanProcessor::new();
        processor.on_end(span_with("a", Duration::from_micros(1), Status::Unset));
        processor.on_end(span_with("b", Duration::from_micros(1), Status::Unset));

        let counts = processor.aggregation();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].span_name, "a");
        assert_eq!(counts[1].span_name, "b");
    }
}
