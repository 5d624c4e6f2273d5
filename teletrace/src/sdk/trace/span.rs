//! The recording span implementation.
//!
//! A span is created by the SDK tracer, mutates locally while recording,
//! and publishes an immutable [`SpanData`] snapshot to the registered span
//! processors exactly once, on the first `end`.
//!
//! [`SpanData`]: crate::sdk::export::trace::SpanData
use crate::sdk::trace::{EvictedHashMap, EvictedQueue, SpanLimits, Tracer};
use crate::trace::{Event, Link, SpanContext, SpanId, SpanKind, Status};
use crate::KeyValue;
use std::borrow::Cow;
use std::time::SystemTime;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: Tracer,
    span_limits: SpanLimits,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpanData {
    /// Span parent id
    pub(crate) parent_span_id: SpanId,
    /// Span kind
    pub(crate) span_kind: SpanKind,
    /// Span name
    pub(crate) name: Cow<'static, str>,
    /// Span start time
    pub(crate) start_time: SystemTime,
    /// Span end time
    pub(crate) end_time: SystemTime,
    /// Span attributes
    pub(crate) attributes: EvictedHashMap,
    /// Span events
    pub(crate) events: EvictedQueue<Event>,
    /// Span links
    pub(crate) links: EvictedQueue<Link>,
    /// Span status
    pub(crate) status: Status,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        tracer: Tracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            data,
            tracer,
            span_limits,
        }
    }

    /// Operate on a mutable reference to span data.
    ///
    /// Returns `None` once the span has ended or if it never recorded,
    /// making every mutation below a silent no-op in those states.
    fn with_data<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SpanData) -> T,
    {
        self.data.as_mut().map(f)
    }

    /// Convert information in this span into an exportable
    /// [`crate::sdk::export::trace::SpanData`] snapshot, without ending the
    /// span.
    pub fn exported_data(&self) -> Option<crate::sdk::export::trace::SpanData> {
        let span_context = self.span_context.clone();

        self.data
            .as_ref()
            .map(|data| build_export_data(data.clone(), span_context, &self.tracer))
    }
}

impl crate::trace::Span for Span {
    /// Records an event at a specific time in the context of this span.
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        let event_attributes_limit = self.span_limits.max_attributes_per_event as usize;
        self.with_data(|data| {
            let dropped_attributes_count = attributes.len().saturating_sub(event_attributes_limit);
            attributes.truncate(event_attributes_limit);

            data.events.push_back(Event::new(
                name,
                timestamp,
                attributes,
                dropped_attributes_count as u32,
            ));
        });
    }

    /// Returns the `SpanContext` for the given `Span`.
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` if this span is recording information.
    ///
    /// Always returns false after span `end`.
    fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Sets a single attribute of this span.
    fn set_attribute(&mut self, attribute: KeyValue) {
        self.with_data(|data| {
            data.attributes.insert(attribute);
        });
    }

    /// Sets the status of this span.
    ///
    /// Statuses form the total order `Ok > Error > Unset`; updates that do
    /// not increase the status are ignored so `Ok` is final.
    fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            if status > data.status {
                data.status = status;
            }
        });
    }

    /// Updates the span's name.
    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data(|data| {
            data.name = new_name.into();
        });
    }

    /// Adds a link to this span.
    fn add_link(&mut self, span_context: SpanContext, mut attributes: Vec<KeyValue>) {
        let link_attributes_limit = self.span_limits.max_attributes_per_link as usize;
        self.with_data(|data| {
            let dropped_attributes_count = attributes.len().saturating_sub(link_attributes_limit);
            attributes.truncate(link_attributes_limit);
            data.links.push_back(Link::new(
                span_context,
                attributes,
                dropped_attributes_count as u32,
            ));
        });
    }

    /// Finishes the span with the given timestamp.
    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }
}

impl Span {
    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        // Idempotence: the snapshot is taken at most once, later calls see
        // `None` and only leave a debug trail.
        let mut data = match self.data.take() {
            Some(data) => data,
            None => {
                log::debug!(
                    "end called on already ended span {:?}",
                    self.span_context.span_id()
                );
                return;
            }
        };

        // skip if provider has been shut down
        let provider = match self.tracer.provider() {
            Some(provider) => provider,
            None => return,
        };

        // ensure end time is set via explicit end or implicitly on drop
        if let Some(timestamp) = timestamp {
            data.end_time = timestamp;
        } else if data.end_time == data.start_time {
            data.end_time = crate::time::now();
        }

        let mut processors = provider
            .span_processors()
            .iter()
            .filter(|processor| processor.is_end_required())
            .peekable();

        while let Some(processor) = processors.next() {
            if processors.peek().is_none() {
                // last processor takes ownership of the snapshot
                processor.on_end(build_export_data(
                    data,
                    self.span_context.clone(),
                    &self.tracer,
                ));
                return;
            }
            processor.on_end(build_export_data(
                data.clone(),
                self.span_context.clone(),
                &self.tracer,
            ));
        }
    }
}

impl Drop for Span {
    /// Report span on inner drop
    fn drop(&mut self) {
        self.ensure_ended_and_exported(None);
    }
}

fn build_export_data(
    data: SpanData,
    span_context: SpanContext,
    tracer: &Tracer,
) -> crate::sdk::export::trace::SpanData {
    crate::sdk::export::trace::SpanData {
        span_context,
        parent_span_id: data.parent_span_id,
        span_kind: data.span_kind,
        name: data.name,
        start_time: data.start_time,
        end_time: data.end_time,
        attributes: data.attributes,
        events: data.events,
        links: data.links,
        status: data.status,
        instrumentation_lib: tracer.instrumentation_library().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::trace::span_limit::{
        DEFAULT_MAX_ATTRIBUTES_PER_EVENT, DEFAULT_MAX_ATTRIBUTES_PER_SPAN,
        DEFAULT_MAX_EVENT_PER_SPAN, DEFAULT_MAX_LINKS_PER_SPAN,
    };
    use crate::testing::trace::NoopSpanExporter;
    use crate::trace::{Span as _, SpanBuilder, TraceFlags, TraceId, Tracer as _, TracerProvider as _};
    use crate::KeyValue;
    use std::time::Duration;

    fn init() -> (crate::sdk::trace::Tracer, SpanData) {
        let provider = crate::sdk::trace::TracerProvider::default();
        let tracer = provider.tracer("test");
        let data = SpanData {
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: "test".into(),
            start_time: crate::time::now(),
            end_time: crate::time::now(),
            attributes: EvictedHashMap::new(DEFAULT_MAX_ATTRIBUTES_PER_SPAN, 0),
            events: EvictedQueue::new(DEFAULT_MAX_EVENT_PER_SPAN),
            links: EvictedQueue::new(DEFAULT_MAX_LINKS_PER_SPAN),
            status: Status::Unset,
        };
        (tracer, data)
    }

    fn create_span() -> Span {
        let (tracer, data) = init();
        Span::new(
            SpanContext::empty_context(),
            Some(data),
            tracer,
            Default::default(),
        )
    }

    #[test]
    fn create_span_without_data() {
        let (tracer, _) = init();
        let mut span = Span::new(
            SpanContext::empty_context(),
            None,
            tracer,
            Default::default(),
        );
        span.with_data(|_data| panic!("there are data"));
    }

    #[test]
    fn add_event() {
        let mut span = create_span();
        let name = "some_event";
        let attributes = vec![KeyValue::new("k", "v")];
        span.add_event(name, attributes.clone());
        span.with_data(|data| {
            if let Some(event) = data.events.iter().next() {
                assert_eq!(event.name, name);
                assert_eq!(event.attributes, attributes);
            } else {
                panic!("no event");
            }
        });
    }

    #[test]
    fn set_attribute() {
        let mut span = create_span();
        let attribute = KeyValue::new("k", "v");
        span.set_attribute(attribute.clone());
        span.with_data(|data| {
            assert_eq!(data.attributes.get(&attribute.key), Some(&attribute.value));
        });
    }

    #[test]
    fn set_status_is_ordered() {
        {
            let mut span = create_span();
            span.set_status(Status::Ok);
            span.set_status(Status::error("error"));
            span.with_data(|data| assert_eq!(data.status, Status::Ok));
        }
        {
            let mut span = create_span();
            span.set_status(Status::error("error"));
            span.with_data(|data| assert_eq!(data.status, Status::error("error")));
        }
    }

    #[test]
    fn update_name() {
        let mut span = create_span();
        span.update_name("new_name");
        span.with_data(|data| {
            assert_eq!(data.name, "new_name");
        });
    }

    #[test]
    fn end_only_once() {
        let mut span = create_span();
        let timestamp = crate::time::now();
        span.end_with_timestamp(timestamp);
        span.end_with_timestamp(timestamp.checked_add(Duration::from_secs(10)).unwrap());
        // data is taken on first end; the second call must not re-create it
        assert!(!span.is_recording());
    }

    #[test]
    fn noop_after_end() {
        let mut span = create_span();
        span.end();
        span.add_event("some_event", vec![KeyValue::new("k", "v")]);
        span.set_attribute(KeyValue::new("k", "v"));
        span.set_status(Status::error("ERROR"));
        span.update_name("new_name");
        assert!(span.with_data(|_| ()).is_none());
    }

    #[test]
    fn is_recording_flips_on_end() {
        let mut span = create_span();
        assert!(span.is_recording());
        span.end();
        assert!(!span.is_recording());
    }

    #[test]
    fn exceed_span_attributes_limit() {
        let provider = crate::sdk::trace::TracerProvider::builder()
            .with_simple_exporter(NoopSpanExporter::new())
            .build();
        let tracer = provider.tracer("test");

        let mut initial_attributes = Vec::new();
        for i in 0..(DEFAULT_MAX_ATTRIBUTES_PER_SPAN + 1) {
            initial_attributes.push(KeyValue::new(format!("key {}", i), i.to_string()))
        }
        let span_builder = SpanBuilder::from_name("test_span").with_attributes(initial_attributes);

        let mut span = tracer.build(span_builder);
        span.set_attribute(KeyValue::new("extra", "value"));

        let data = span.data.as_ref().expect("span must be recording");
        assert_eq!(
            data.attributes.len(),
            DEFAULT_MAX_ATTRIBUTES_PER_SPAN as usize
        );
        assert_eq!(data.attributes.dropped_count(), 2);
    }

    #[test]
    fn exceed_span_events_limit() {
        let provider = crate::sdk::trace::TracerProvider::builder()
            .with_simple_exporter(NoopSpanExporter::new())
            .build();
        let tracer = provider.tracer("test");

        let mut events = Vec::new();
        for _i in 0..(DEFAULT_MAX_EVENT_PER_SPAN * 2) {
            events.push(Event::with_name("test event"))
        }

        // add events via span builder
        let span_builder = tracer.span_builder("test").with_events(events);
        let mut span = tracer.build(span_builder);

        // add events using span api after building the span
        span.add_event("test event again, after span builder", Vec::new());
        span.add_event("test event once again, after span builder", Vec::new());

        let data = span.data.as_ref().expect("span must be recording");
        assert_eq!(data.events.len(), DEFAULT_MAX_EVENT_PER_SPAN as usize);
        assert_eq!(
            data.events.dropped_count(),
            DEFAULT_MAX_EVENT_PER_SPAN + 2
        );
    }

    #[test]
    fn exceed_event_attributes_limit() {
        let provider = crate::sdk::trace::TracerProvider::builder()
            .with_simple_exporter(NoopSpanExporter::new())
            .build();
        let tracer = provider.tracer("test");

        let mut event_attributes = Vec::new();
        for i in 0..(DEFAULT_MAX_ATTRIBUTES_PER_EVENT * 2) {
            event_attributes.push(KeyValue::new(format!("key {}", i), i.to_string()))
        }

        let mut span = tracer.start("test");
        span.add_event("overloaded", event_attributes);

        let data = span.data.as_ref().expect("span must be recording");
        let event = data.events.iter().next().expect("event must be recorded");
        assert_eq!(
            event.attributes.len(),
            DEFAULT_MAX_ATTRIBUTES_PER_EVENT as usize
        );
        assert_eq!(
            event.dropped_attributes_count,
            DEFAULT_MAX_ATTRIBUTES_PER_EVENT
        );
    }

    #[test]
    fn exceed_span_links_limit() {
        let provider = crate::sdk::trace::TracerProvider::builder()
            .with_simple_exporter(NoopSpanExporter::new())
            .build();
        let tracer = provider.tracer("test");

        let mut links = Vec::new();
        for _i in 0..(DEFAULT_MAX_LINKS_PER_SPAN * 2) {
            links.push(Link::with_context(SpanContext::new(
                TraceId::from(12u128),
                SpanId::from(12u64),
                TraceFlags::default(),
                false,
                Default::default(),
            )))
        }

        let span_builder = tracer.span_builder("test").with_links(links);
        let mut span = tracer.build(span_builder);

        // add links using span api after building the span
        span.add_link(
            SpanContext::new(
                TraceId::from(12u128),
                SpanId::from(12u64),
                TraceFlags::default(),
                false,
                Default::default(),
            ),
            vec![],
        );

        let data = span.data.as_ref().expect("span must be recording");
        assert_eq!(data.links.len(), DEFAULT_MAX_LINKS_PER_SPAN as usize);
    }

    #[test]
    fn exported_data_without_ending() {
        let provider = crate::sdk::trace::TracerProvider::builder()
            .with_simple_exporter(NoopSpanExporter::new())
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("test_span");
        span.add_event("test_event", vec![]);
        span.set_status(Status::error(""));

        let exported_data = span.exported_data();
        assert!(exported_data.is_some());
        assert!(span.is_recording());
    }
}
