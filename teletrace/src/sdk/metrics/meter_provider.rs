//! The SDK meter provider.
use crate::metrics::Meter;
use crate::sdk::export::metrics::MetricProducer;
use crate::sdk::metrics::selectors::simple::Selector;
use crate::sdk::metrics::Accumulator;
use std::borrow::Cow;
use std::sync::Arc;

/// Creator of named [`Meter`] instances, all recording into one shared
/// [`Accumulator`].
#[derive(Clone, Debug, Default)]
pub struct MeterProvider {
    accumulator: Accumulator,
}

impl MeterProvider {
    /// Create a new [`MeterProvider`] builder.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns a named meter recording into this provider's accumulator.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.accumulator.meter(name)
    }

    /// The producer to register with a metric reader so this provider's
    /// measurements get collected and exported.
    pub fn producer(&self) -> Arc<dyn MetricProducer> {
        Arc::new(self.accumulator.clone())
    }
}

/// Builder for [`MeterProvider`] instances.
#[derive(Debug)]
pub struct MeterProviderBuilder {
    selector: Selector,
}

impl Default for MeterProviderBuilder {
    fn default() -> Self {
        MeterProviderBuilder {
            selector: Selector::Inexpensive,
        }
    }
}

impl MeterProviderBuilder {
    /// Choose the aggregator selection strategy, e.g. histogram aggregation
    /// for value recorders.
    pub fn with_aggregator_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Create a new provider from this configuration.
    pub fn build(self) -> MeterProvider {
        MeterProvider {
            accumulator: Accumulator::new(self.selector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LabelSet, NumberKind};
    use crate::sdk::export::metrics::Point;

    #[test]
    fn histogram_selector_changes_recorder_aggregation() {
        let provider = MeterProvider::builder()
            .with_aggregator_selector(Selector::Histogram(vec![1.0, 10.0]))
            .build();
        let meter = provider.meter("test");
        let recorder = meter.f64_value_recorder("latency").init();
        recorder.record(5.0, &LabelSet::empty()).unwrap();

        let batch = provider.producer().collect_all_metrics();
        assert_eq!(batch.len(), 1);
        match &batch[0].point {
            Point::Histogram { counts, count, .. } => {
                assert_eq!(*count, 1);
                assert_eq!(counts, &vec![0, 1, 0]);
            }
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn default_recorder_aggregation_is_summary() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let recorder = meter.i64_value_recorder("latency").init();
        recorder.record(5, &LabelSet::empty()).unwrap();

        let batch = provider.producer().collect_all_metrics();
        match &batch[0].point {
            Point::Summary { sum, count, .. } => {
                assert_eq!(sum.to_i64(&NumberKind::I64), 5);
                assert_eq!(*count, 1);
            }
            other => panic!("unexpected point {:?}", other),
        }
    }
}
