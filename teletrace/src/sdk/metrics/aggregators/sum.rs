use crate::metrics::{AtomicNumber, Descriptor, Number, Result};
use crate::sdk::export::metrics::Point;
use crate::sdk::metrics::aggregators::{inconsistent, Aggregator};
use std::any::Any;
use std::sync::Arc;

/// Create a new sum aggregator.
pub fn sum() -> SumAggregator {
    SumAggregator::default()
}

/// An add-only accumulator for counter events, updated lock-free.
///
/// Monotonicity is a property of the instrument, not of this aggregator:
/// negative deltas for monotonic instruments are rejected by `range_test`
/// before ever reaching `update`.
#[derive(Debug, Default)]
pub struct SumAggregator {
    value: AtomicNumber,
}

impl SumAggregator {
    /// The accumulated sum.
    pub fn sum(&self) -> Number {
        self.value.load()
    }
}

impl Aggregator for SumAggregator {
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.value.fetch_add(descriptor.number_kind(), number);
        Ok(())
    }

    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let kind = descriptor.number_kind();
            other.value.store(&self.value.load());
            self.value.store(&kind.zero());
            Ok(())
        } else {
            Err(inconsistent(&self, &destination))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()> {
        if let Some(other_sum) = other.as_any().downcast_ref::<SumAggregator>() {
            self.value
                .fetch_add(descriptor.number_kind(), &other_sum.value.load());
            Ok(())
        } else {
            Err(inconsistent(&self, &other))
        }
    }

    fn to_point(&self, _descriptor: &Descriptor) -> Option<Point> {
        Some(Point::Sum(self.value.load()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InstrumentKind, LabelSet, NumberKind};

    fn counter_descriptor() -> Descriptor {
        Descriptor::new(
            "requests".to_string(),
            InstrumentKind::Counter,
            NumberKind::U64,
            None,
            None,
            LabelSet::empty(),
        )
    }

    #[test]
    fn accumulates_and_resets() {
        let descriptor = counter_descriptor();
        let aggregator = sum();
        aggregator.update(&3u64.into(), &descriptor).unwrap();
        aggregator.update(&4u64.into(), &descriptor).unwrap();
        assert_eq!(aggregator.sum().to_u64(&NumberKind::U64), 7);

        let checkpoint: Arc<dyn Aggregator + Send + Sync> = Arc::new(sum());
        aggregator
            .synchronized_move(&checkpoint, &descriptor)
            .unwrap();

        assert_eq!(aggregator.sum().to_u64(&NumberKind::U64), 0);
        match checkpoint.to_point(&descriptor) {
            Some(Point::Sum(value)) => assert_eq!(value.to_u64(&NumberKind::U64), 7),
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn concurrent_updates() {
        let descriptor = counter_descriptor();
        let aggregator = Arc::new(sum());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = aggregator.clone();
                let descriptor = descriptor.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        aggregator.update(&1u64.into(), &descriptor).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.sum().to_u64(&NumberKind::U64), 4000);
    }
}
