use crate::metrics::{Descriptor, Number, NumberKind, Result};
use crate::sdk::export::metrics::Point;
use crate::sdk::metrics::aggregators::{inconsistent, Aggregator};
use std::any::Any;
use std::mem;
use std::sync::{Arc, Mutex};

/// Create a new min/max/sum/count aggregator for the given descriptor.
pub fn min_max_sum_count(descriptor: &Descriptor) -> MinMaxSumCountAggregator {
    let kind = descriptor.number_kind().clone();
    MinMaxSumCountAggregator {
        inner: Mutex::new(State::empty(&kind)),
        kind,
    }
}

#[derive(Debug)]
struct State {
    min: Number,
    max: Number,
    sum: Number,
    count: u64,
}

impl State {
    fn empty(kind: &NumberKind) -> Self {
        State {
            min: kind.max(),
            max: kind.min(),
            sum: kind.zero(),
            count: 0,
        }
    }
}

/// The default aggregator for `ValueRecorder` instruments.
///
/// Maintains the minimum, maximum, sum, and count of recorded values under
/// one state swap protocol, so collected points are internally consistent.
/// Its point is a summary carrying two estimated percentiles: 0.0 mapping
/// to the minimum and 100.0 to the maximum.
#[derive(Debug)]
pub struct MinMaxSumCountAggregator {
    inner: Mutex<State>,
    kind: NumberKind,
}

impl Aggregator for MinMaxSumCountAggregator {
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner.lock().map_err(From::from).map(|mut state| {
            let kind = descriptor.number_kind();
            if number.partial_cmp(kind, &state.min) == Some(std::cmp::Ordering::Less) {
                state.min = *number;
            }
            if number.partial_cmp(kind, &state.max) == Some(std::cmp::Ordering::Greater) {
                state.max = *number;
            }
            let sum = state.sum.to_atomic();
            sum.fetch_add(kind, number);
            state.sum = sum.load();
            state.count += 1;
        })
    }

    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        _descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let mut state = self.inner.lock()?;
            let mut other_state = other.inner.lock()?;
            *other_state = mem::replace(&mut *state, State::empty(&self.kind));
            Ok(())
        } else {
            Err(inconsistent(&self, &destination))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let kind = descriptor.number_kind();
            let mut state = self.inner.lock()?;
            let other_state = other.inner.lock()?;

            if other_state.count == 0 {
                return Ok(());
            }
            if other_state.min.partial_cmp(kind, &state.min) == Some(std::cmp::Ordering::Less) {
                state.min = other_state.min;
            }
            if other_state.max.partial_cmp(kind, &state.max) == Some(std::cmp::Ordering::Greater) {
                state.max = other_state.max;
            }
            let sum = state.sum.to_atomic();
            sum.fetch_add(kind, &other_state.sum);
            state.sum = sum.load();
            state.count += other_state.count;
            Ok(())
        } else {
            Err(inconsistent(&self, &other))
        }
    }

    fn to_point(&self, _descriptor: &Descriptor) -> Option<Point> {
        self.inner.lock().ok().and_then(|state| {
            if state.count == 0 {
                return None;
            }
            Some(Point::Summary {
                min: state.min,
                max: state.max,
                sum: state.sum,
                count: state.count,
                percentiles: vec![(0.0, state.min), (100.0, state.max)],
            })
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InstrumentKind, LabelSet};

    fn recorder_descriptor() -> Descriptor {
        Descriptor::new(
            "latency".to_string(),
            InstrumentKind::ValueRecorder,
            NumberKind::F64,
            None,
            None,
            LabelSet::empty(),
        )
    }

    #[test]
    fn summary_point() {
        let descriptor = recorder_descriptor();
        let aggregator = min_max_sum_count(&descriptor);
        for value in [4.0f64, 1.0, 9.0, 2.0] {
            aggregator.update(&value.into(), &descriptor).unwrap();
        }

        match aggregator.to_point(&descriptor) {
            Some(Point::Summary {
                min,
                max,
                sum,
                count,
                percentiles,
            }) => {
                assert_eq!(min.to_f64(&NumberKind::F64), 1.0);
                assert_eq!(max.to_f64(&NumberKind::F64), 9.0);
                assert_eq!(sum.to_f64(&NumberKind::F64), 16.0);
                assert_eq!(count, 4);
                assert_eq!(percentiles.len(), 2);
                assert_eq!(percentiles[0].0, 0.0);
                assert_eq!(percentiles[1].0, 100.0);
            }
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn empty_emits_no_point() {
        let descriptor = recorder_descriptor();
        let aggregator = min_max_sum_count(&descriptor);
        assert!(aggregator.to_point(&descriptor).is_none());
    }

    #[test]
    fn move_resets_source() {
        let descriptor = recorder_descriptor();
        let aggregator = min_max_sum_count(&descriptor);
        aggregator.update(&5.0f64.into(), &descriptor).unwrap();

        let checkpoint: Arc<dyn Aggregator + Send + Sync> =
            Arc::new(min_max_sum_count(&descriptor));
        aggregator
            .synchronized_move(&checkpoint, &descriptor)
            .unwrap();

        assert!(aggregator.to_point(&descriptor).is_none());
        assert!(checkpoint.to_point(&descriptor).is_some());
    }
}
