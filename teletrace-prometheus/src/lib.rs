//! Prometheus exposition for the teletrace runtime.
//!
//! The [`PrometheusExporter`] is a pull exporter: instead of pushing to a
//! remote sink on a schedule, it collects the registered metric producers
//! on demand and converts the result into `prometheus` metric families,
//! which can then be rendered with the `prometheus` crate's encoders.
//!
//! The conversion is fixed:
//!
//! * metric and label names are sanitized to `[A-Za-z0-9_]`, with a `_`
//!   prefix escaping a leading digit;
//! * non-monotonic sums and last values map to `GAUGE`;
//! * monotonic sums map to `COUNTER`;
//! * min/max/sum/count summaries map to `SUMMARY` with one sample per
//!   estimated percentile;
//! * histograms map to `HISTOGRAM` with cumulative bucket counts;
//! * constant labels from the instrument's descriptor precede per-point
//!   labels and share the same sanitization.
//!
//! # Prometheus Exporter Example
//!
//! ```
//! use prometheus::{Encoder, TextEncoder};
//! use teletrace::metrics::LabelSet;
//! use teletrace::sdk::metrics::MeterProvider;
//! use teletrace_prometheus::PrometheusExporter;
//!
//! let provider = MeterProvider::builder().build();
//! let meter = provider.meter("my-app");
//!
//! let counter = meter.u64_counter("a.counter").with_description("Counts things").init();
//! let _ = counter.add(100, &LabelSet::from_labels([("key", "value")]));
//!
//! let exporter = PrometheusExporter::new(provider.producer());
//!
//! // Encode data as text
//! let encoder = TextEncoder::new();
//! let metric_families = exporter.gather();
//! let mut result = Vec::new();
//! encoder.encode(&metric_families, &mut result).unwrap();
//!
//! // result now contains encoded metrics:
//! //
//! // # HELP a_counter Counts things
//! // # TYPE a_counter counter
//! // a_counter{key="value"} 100
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

use prometheus::proto;
use protobuf::RepeatedField;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use teletrace::metrics::{Descriptor, LabelSet};
use teletrace::sdk::export::metrics::{MetricData, MetricProducer, Point};

mod sanitize;

use sanitize::sanitize;

/// A pull exporter rendering collected metrics as Prometheus metric
/// families.
pub struct PrometheusExporter {
    producers: Vec<Arc<dyn MetricProducer>>,
}

impl fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusExporter")
            .field("producers", &self.producers.len())
            .finish()
    }
}

impl PrometheusExporter {
    /// Create an exporter pulling from a single producer.
    pub fn new(producer: Arc<dyn MetricProducer>) -> Self {
        PrometheusExporter {
            producers: vec![producer],
        }
    }

    /// Add another producer to pull from.
    pub fn with_producer(mut self, producer: Arc<dyn MetricProducer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Collect all producers and convert the result into metric families.
    ///
    /// Points of the same instrument are grouped into one family; families
    /// are sorted by name for deterministic output.
    pub fn gather(&self) -> Vec<proto::MetricFamily> {
        let mut families: HashMap<String, proto::MetricFamily> = HashMap::new();

        for producer in &self.producers {
            for data in producer.collect_all_metrics() {
                let (metric, metric_type) = to_metric(&data);
                let name = sanitize(data.descriptor.name());
                let family = families.entry(name.clone()).or_insert_with(|| {
                    let mut family = proto::MetricFamily::default();
                    family.set_name(name);
                    if let Some(description) = data.descriptor.description() {
                        family.set_help(description.clone());
                    }
                    family.set_field_type(metric_type);
                    family
                });
                family.mut_metric().push(metric);
            }
        }

        let mut families: Vec<proto::MetricFamily> = families.into_values().collect();
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }
}

/// Convert one collected point into a Prometheus metric with its family
/// type.
fn to_metric(data: &MetricData) -> (proto::Metric, proto::MetricType) {
    let labels = merged_labels(&data.descriptor, &data.labels);
    let kind = data.descriptor.number_kind();

    let mut metric = proto::Metric::default();
    metric.set_label(RepeatedField::from_vec(labels));

    let metric_type = match &data.point {
        Point::Sum(value) => {
            if data.descriptor.monotonic() {
                let mut counter = proto::Counter::default();
                counter.set_value(value.to_f64(kind));
                metric.set_counter(counter);
                proto::MetricType::COUNTER
            } else {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(value.to_f64(kind));
                metric.set_gauge(gauge);
                proto::MetricType::GAUGE
            }
        }
        Point::LastValue { value, .. } => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(value.to_f64(kind));
            metric.set_gauge(gauge);
            proto::MetricType::GAUGE
        }
        Point::Summary {
            sum,
            count,
            percentiles,
            ..
        } => {
            let mut summary = proto::Summary::default();
            summary.set_sample_count(*count);
            summary.set_sample_sum(sum.to_f64(kind));

            let quantiles = percentiles
                .iter()
                .map(|(percentile, value)| {
                    let mut quantile = proto::Quantile::default();
                    quantile.set_quantile(*percentile);
                    quantile.set_value(value.to_f64(kind));
                    quantile
                })
                .collect();
            summary.set_quantile(RepeatedField::from_vec(quantiles));
            metric.set_summary(summary);
            proto::MetricType::SUMMARY
        }
        Point::Histogram {
            boundaries,
            counts,
            sum,
            count,
        } => {
            let mut histogram = proto::Histogram::default();
            histogram.set_sample_count(*count);
            histogram.set_sample_sum(sum.to_f64(kind));

            let mut cumulative = 0u64;
            let mut buckets = Vec::with_capacity(boundaries.len() + 1);
            for (idx, boundary) in boundaries.iter().enumerate() {
                cumulative += counts.get(idx).copied().unwrap_or(0);
                let mut bucket = proto::Bucket::default();
                bucket.set_cumulative_count(cumulative);
                bucket.set_upper_bound(*boundary);
                buckets.push(bucket);
            }
            cumulative += counts.get(boundaries.len()).copied().unwrap_or(0);
            let mut overflow = proto::Bucket::default();
            overflow.set_cumulative_count(cumulative);
            overflow.set_upper_bound(f64::INFINITY);
            buckets.push(overflow);

            histogram.set_bucket(RepeatedField::from_vec(buckets));
            metric.set_histogram(histogram);
            proto::MetricType::HISTOGRAM
        }
    };

    (metric, metric_type)
}

/// Sanitized label pairs: the descriptor's constant labels first, then the
/// per-point labels.
fn merged_labels(descriptor: &Descriptor, labels: &LabelSet) -> Vec<proto::LabelPair> {
    let mut merged = Vec::with_capacity(descriptor.constant_labels().len() + labels.len());
    for (key, value) in descriptor.constant_labels() {
        merged.push(label_pair(key, value));
    }
    for (key, value) in labels {
        merged.push(label_pair(key, value));
    }
    merged
}

fn label_pair(key: &str, value: &str) -> proto::LabelPair {
    let mut pair = proto::LabelPair::default();
    pair.set_name(sanitize(key));
    pair.set_value(value.to_string());
    pair
}

#[cfg(test)]
mod tests {
    use super::*;
    use teletrace::metrics::LabelSet;
    use teletrace::sdk::metrics::selectors::simple::Selector;
    use teletrace::sdk::metrics::MeterProvider;

    fn family<'a>(
        families: &'a [proto::MetricFamily],
        name: &str,
    ) -> &'a proto::MetricFamily {
        families
            .iter()
            .find(|family| family.get_name() == name)
            .unwrap_or_else(|| panic!("missing family {}", name))
    }

    #[test]
    fn sanitizes_names_and_label_keys() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let recorder = meter.f64_value_recorder("http.server.latency-ms").init();
        recorder
            .record(
                12.0,
                &LabelSet::from_labels([("peer.service", "backend")]),
            )
            .unwrap();

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let family = family(&families, "http_server_latency_ms");
        let labels = family.get_metric()[0].get_label();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].get_name(), "peer_service");
        assert_eq!(labels[0].get_value(), "backend");
    }

    #[test]
    fn monotonic_sums_become_counters() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let counter = meter.u64_counter("requests").init();
        counter.add(3, &LabelSet::empty()).unwrap();

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let family = family(&families, "requests");
        assert_eq!(family.get_field_type(), proto::MetricType::COUNTER);
        assert_eq!(family.get_metric()[0].get_counter().get_value(), 3.0);
    }

    #[test]
    fn non_monotonic_sums_become_gauges() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let up_down = meter.i64_up_down_counter("in.flight").init();
        up_down.add(5, &LabelSet::empty()).unwrap();
        up_down.add(-2, &LabelSet::empty()).unwrap();

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let family = family(&families, "in_flight");
        assert_eq!(family.get_field_type(), proto::MetricType::GAUGE);
        assert_eq!(family.get_metric()[0].get_gauge().get_value(), 3.0);
    }

    #[test]
    fn summaries_carry_count_sum_and_percentiles() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let recorder = meter.f64_value_recorder("latency").init();
        for value in [1.0f64, 2.0, 9.0] {
            recorder.record(value, &LabelSet::empty()).unwrap();
        }

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let family = family(&families, "latency");
        assert_eq!(family.get_field_type(), proto::MetricType::SUMMARY);
        let summary = family.get_metric()[0].get_summary();
        assert_eq!(summary.get_sample_count(), 3);
        assert_eq!(summary.get_sample_sum(), 12.0);

        let quantiles = summary.get_quantile();
        assert_eq!(quantiles.len(), 2);
        assert_eq!(quantiles[0].get_quantile(), 0.0);
        assert_eq!(quantiles[0].get_value(), 1.0);
        assert_eq!(quantiles[1].get_quantile(), 100.0);
        assert_eq!(quantiles[1].get_value(), 9.0);
    }

    #[test]
    fn histograms_accumulate_bucket_counts() {
        let provider = MeterProvider::builder()
            .with_aggregator_selector(Selector::Histogram(vec![1.0, 5.0]))
            .build();
        let meter = provider.meter("test");
        let recorder = meter.f64_value_recorder("latency").init();
        for value in [0.5f64, 3.0, 100.0] {
            recorder.record(value, &LabelSet::empty()).unwrap();
        }

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let family = family(&families, "latency");
        assert_eq!(family.get_field_type(), proto::MetricType::HISTOGRAM);
        let histogram = family.get_metric()[0].get_histogram();
        assert_eq!(histogram.get_sample_count(), 3);
        let buckets = histogram.get_bucket();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].get_cumulative_count(), 1);
        assert_eq!(buckets[1].get_cumulative_count(), 2);
        assert_eq!(buckets[2].get_cumulative_count(), 3);
        assert!(buckets[2].get_upper_bound().is_infinite());
    }

    #[test]
    fn constant_labels_precede_point_labels() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let counter = meter
            .u64_counter("requests")
            .with_constant_labels(LabelSet::from_labels([("service.name", "api")]))
            .init();
        counter
            .add(1, &LabelSet::from_labels([("path", "/index")]))
            .unwrap();

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        let labels = family(&families, "requests").get_metric()[0].get_label();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].get_name(), "service_name");
        assert_eq!(labels[1].get_name(), "path");
    }

    #[test]
    fn label_sets_become_separate_samples_in_one_family() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let counter = meter.u64_counter("requests").init();
        counter
            .add(1, &LabelSet::from_labels([("path", "/a")]))
            .unwrap();
        counter
            .add(2, &LabelSet::from_labels([("path", "/b")]))
            .unwrap();

        let exporter = PrometheusExporter::new(provider.producer());
        let families = exporter.gather();

        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_metric().len(), 2);
    }
}
