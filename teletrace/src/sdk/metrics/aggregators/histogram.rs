use crate::metrics::{Descriptor, Number, NumberKind, Result};
use crate::sdk::export::metrics::Point;
use crate::sdk::metrics::aggregators::{inconsistent, Aggregator};
use std::any::Any;
use std::mem;
use std::sync::{Arc, Mutex};

/// Create a new histogram aggregator with the given bucket boundaries.
///
/// Boundaries are sorted into strictly increasing order (duplicates are
/// removed). A value `v` falls into the first bucket whose boundary is
/// greater than `v`; values greater than or equal to the last boundary land
/// in the overflow bucket.
pub fn histogram(boundaries: &[f64]) -> HistogramAggregator {
    let mut sorted_boundaries = boundaries.to_owned();
    sorted_boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted_boundaries.dedup();
    let state = State::empty(&sorted_boundaries);

    HistogramAggregator {
        boundaries: sorted_boundaries,
        inner: Mutex::new(state),
    }
}

#[derive(Debug)]
struct State {
    bucket_counts: Vec<u64>,
    count: u64,
    sum: Number,
}

impl State {
    fn empty(boundaries: &[f64]) -> Self {
        State {
            bucket_counts: vec![0; boundaries.len() + 1],
            count: 0,
            sum: NumberKind::U64.zero(),
        }
    }
}

/// This aggregator observes events and counts them in pre-determined
/// buckets. It also calculates the sum and count of all events.
#[derive(Debug)]
pub struct HistogramAggregator {
    boundaries: Vec<f64>,
    inner: Mutex<State>,
}

impl Aggregator for HistogramAggregator {
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner.lock().map_err(From::from).map(|mut state| {
            let kind = descriptor.number_kind();
            let as_float = number.to_f64(kind);

            let mut bucket_id = self.boundaries.len();
            for (idx, boundary) in self.boundaries.iter().enumerate() {
                if as_float < *boundary {
                    bucket_id = idx;
                    break;
                }
            }

            let sum = state.sum.to_atomic();
            sum.fetch_add(kind, number);
            state.sum = sum.load();
            state.count += 1;
            state.bucket_counts[bucket_id] += 1;
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
            *other_state = mem::replace(&mut *state, State::empty(&self.boundaries));
            Ok(())
        } else {
            Err(inconsistent(&self, &destination))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<HistogramAggregator>() {
            let mut state = self.inner.lock()?;
            let other_state = other.inner.lock()?;

            let sum = state.sum.to_atomic();
            sum.fetch_add(descriptor.number_kind(), &other_state.sum);
            state.sum = sum.load();
            state.count += other_state.count;
            for idx in 0..state.bucket_counts.len().min(other_state.bucket_counts.len()) {
                state.bucket_counts[idx] += other_state.bucket_counts[idx];
            }
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
            Some(Point::Histogram {
                boundaries: self.boundaries.clone(),
                counts: state.bucket_counts.clone(),
                sum: state.sum,
                count: state.count,
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
    fn bucket_assignment() {
        let descriptor = recorder_descriptor();
        let aggregator = histogram(&[1.0, 5.0, 10.0]);

        // a value equal to a boundary lands in the following bucket
        for value in [0.5f64, 1.0, 4.9, 5.0, 25.0] {
            aggregator.update(&value.into(), &descriptor).unwrap();
        }

        match aggregator.to_point(&descriptor) {
            Some(Point::Histogram {
                boundaries,
                counts,
                sum,
                count,
            }) => {
                assert_eq!(boundaries, vec![1.0, 5.0, 10.0]);
                assert_eq!(counts, vec![1, 2, 1, 1]);
                assert_eq!(count, 5);
                assert!((sum.to_f64(&NumberKind::F64) - 36.4).abs() < 1e-9);
            }
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn unsorted_boundaries_are_sorted() {
        let aggregator = histogram(&[10.0, 1.0, 5.0, 5.0]);
        assert_eq!(aggregator.boundaries, vec![1.0, 5.0, 10.0]);
    }
}
