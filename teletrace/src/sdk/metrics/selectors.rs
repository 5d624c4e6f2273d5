//! Aggregator selection policies.

/// Simple selectors choosing an aggregator per instrument kind.
pub mod simple {
    use crate::metrics::{Descriptor, InstrumentKind};
    use crate::sdk::metrics::aggregators::{
        histogram, last_value, min_max_sum_count, sum, Aggregator,
    };
    use std::sync::Arc;

    /// Aggregator selection strategies.
    #[derive(Clone, Debug)]
    pub enum Selector {
        /// A simple selection of the cheapest aggregator per instrument:
        /// sums for adding instruments, min/max/sum/count for recorders,
        /// last-value for observers.
        Inexpensive,

        /// Like [`Selector::Inexpensive`], but value recorders aggregate
        /// into histograms with the given bucket boundaries.
        Histogram(Vec<f64>),
    }

    impl Selector {
        pub(crate) fn aggregator_for(
            &self,
            descriptor: &Descriptor,
        ) -> Arc<dyn Aggregator + Send + Sync> {
            match descriptor.instrument_kind() {
                InstrumentKind::Counter | InstrumentKind::UpDownCounter => Arc::new(sum()),
                InstrumentKind::ValueObserver => Arc::new(last_value()),
                InstrumentKind::ValueRecorder => match self {
                    Selector::Inexpensive => Arc::new(min_max_sum_count(descriptor)),
                    Selector::Histogram(boundaries) => Arc::new(histogram(boundaries)),
                },
            }
        }
    }
}
