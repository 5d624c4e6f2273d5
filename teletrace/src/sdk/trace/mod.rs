//! # Trace SDK
//!
//! The trace SDK implements the trace API against a configurable pipeline:
//! a [`TracerProvider`] owns the active [`Config`] (sampler, id generation,
//! span limits) and the registered [`SpanProcessor`]s; [`Tracer`] handles
//! build recording [`Span`]s; ended spans are published to the processors,
//! which forward them to exporters.
mod config;
mod evicted_hash_map;
mod evicted_queue;
mod id_generator;
mod provider;
mod sampler;
mod span;
mod span_limit;
mod span_processor;
mod tracer;

pub use config::Config;
pub use evicted_hash_map::EvictedHashMap;
pub use evicted_queue::EvictedQueue;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use provider::{Builder, TracerProvider};
pub use sampler::{RateLimitingSampler, Sampler, ShouldSample};
pub use span::Span;
pub use span_limit::SpanLimits;
pub use span_processor::{
    BatchConfig, BatchSpanProcessor, BatchSpanProcessorBuilder, SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::Tracer;

#[cfg(feature = "remote-sampler")]
#[cfg_attr(docsrs, doc(cfg(feature = "remote-sampler")))]
pub use sampler::{
    RemoteSampler, RemoteSamplerBuilder, SamplingStrategyResponse, StrategyClient, StrategyType,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::InMemorySpanExporter;
    use crate::trace::{
        mark_span_as_active, Span as _, SpanId, Tracer as _, TracerProvider as _,
    };

    fn provider_with_exporter(
        sampler: Sampler,
    ) -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::new();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_config(Config::default().with_sampler(sampler))
            .build();
        (provider, exporter)
    }

    #[test]
    fn root_span_ids() {
        let (provider, exporter) = provider_with_exporter(Sampler::TraceIdRatioBased(1.0));
        let tracer = provider.tracer("test");

        let mut span = tracer.start("op");
        assert!(span.span_context().is_sampled());
        span.end();

        for result in provider.force_flush() {
            result.expect("flush must succeed");
        }

        let spans = exporter.exported_spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "op");
        assert_eq!(span.parent_span_id, SpanId::INVALID);
        assert!(span.span_context.is_valid());
        assert!(span.span_context.is_sampled());
    }

    #[test]
    fn child_span_inherits_trace() {
        let (provider, exporter) = provider_with_exporter(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");

        let span_a = tracer.start("a");
        let a_context = span_a.span_context().clone();

        {
            let _guard = mark_span_as_active(span_a);
            // span B has no explicit parent and picks up A from the current
            // context
            let mut span_b = tracer.start("b");
            let b_context = span_b.span_context().clone();
            assert_eq!(b_context.trace_id(), a_context.trace_id());
            span_b.end();
        }

        for result in provider.force_flush() {
            result.expect("flush must succeed");
        }

        let spans = exporter.exported_spans();
        let span_b = spans
            .iter()
            .find(|span| span.name == "b")
            .expect("span b must be exported");
        assert_eq!(span_b.parent_span_id, a_context.span_id());
        assert_eq!(span_b.span_context.trace_id(), a_context.trace_id());
    }

    #[test]
    fn unsampled_spans_are_not_exported() {
        let (provider, exporter) = provider_with_exporter(Sampler::AlwaysOff);
        let tracer = provider.tracer("test");

        let mut span = tracer.start("invisible");
        assert!(!span.is_recording());
        span.end();

        for result in provider.force_flush() {
            result.expect("flush must succeed");
        }
        assert!(exporter.exported_spans().is_empty());
    }
}
