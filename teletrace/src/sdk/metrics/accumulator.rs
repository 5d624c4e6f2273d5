//! Concurrent accumulation of measurements.
//!
//! The accumulator is the SDK backend behind every [`Meter`]: it owns the
//! `(instrument, label set) -> aggregator` map, routes each recording into
//! the right aggregator, and acts as the [`MetricProducer`] that collection
//! drains on every tick.
use crate::global;
use crate::metrics::{
    Descriptor, LabelSet, Meter, MeterCore, Number, Result, SyncInstrumentCore,
};
use crate::sdk::export::metrics::{MetricData, MetricProducer};
use crate::sdk::metrics::aggregators::{range_test, Aggregator};
use crate::sdk::metrics::selectors::simple::Selector;
use crate::InstrumentationLibrary;
use dashmap::DashMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// One live `(instrument, label set)` aggregation.
struct Record {
    descriptor: Descriptor,
    labels: LabelSet,
    aggregator: Arc<dyn Aggregator + Send + Sync>,
    /// Start of the current collection window, reset on every collect.
    window_start: Mutex<SystemTime>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("descriptor", &self.descriptor)
            .field("labels", &self.labels)
            .finish()
    }
}

/// Map key combining the descriptor identity hash and the canonical label
/// set.
#[derive(Debug, PartialEq, Eq, Hash)]
struct RecordKey(u64, LabelSet);

#[derive(Debug)]
struct AccumulatorCore {
    records: DashMap<RecordKey, Arc<Record>>,
    selector: Selector,
}

/// The meter backend: accumulates measurements per instrument and label
/// set, and produces collected [`MetricData`] on demand.
///
/// Cloning an accumulator shares its state; a provider and its reader hold
/// clones of the same accumulator.
#[derive(Clone, Debug)]
pub struct Accumulator(Arc<AccumulatorCore>);

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator::new(Selector::Inexpensive)
    }
}

impl Accumulator {
    pub(crate) fn new(selector: Selector) -> Self {
        Accumulator(Arc::new(AccumulatorCore {
            records: DashMap::new(),
            selector,
        }))
    }

    /// Create a [`Meter`] that records into this accumulator.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        Meter::new(
            InstrumentationLibrary::new(name, None::<&'static str>),
            Arc::new(self.clone()),
        )
    }

    fn selector(&self) -> &Selector {
        &self.0.selector
    }

    /// Find or allocate the aggregator for a `(descriptor, labels)` pair.
    ///
    /// The first observation of a label set allocates its aggregator; the
    /// map's entry API makes the allocation race-free, so two threads
    /// recording the same new pair converge on a single aggregator.
    fn record_for(&self, descriptor: &Descriptor, labels: &LabelSet) -> Arc<Record> {
        let key = RecordKey(descriptor.attribute_hash(), labels.clone());
        self.0
            .records
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Record {
                    descriptor: descriptor.clone(),
                    labels: labels.clone(),
                    aggregator: self.selector().aggregator_for(descriptor),
                    window_start: Mutex::new(crate::time::now()),
                })
            })
            .clone()
    }
}

impl MeterCore for Accumulator {
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrumentCore + Send + Sync> {
        Arc::new(SyncInstrument {
            descriptor,
            accumulator: self.clone(),
        })
    }
}

impl MetricProducer for Accumulator {
    fn collect_all_metrics(&self) -> Vec<MetricData> {
        let end_time = crate::time::now();
        let mut batch = Vec::with_capacity(self.0.records.len());

        for entry in self.0.records.iter() {
            let record = entry.value();
            let checkpoint = self.selector().aggregator_for(&record.descriptor);
            if let Err(err) = record
                .aggregator
                .synchronized_move(&checkpoint, &record.descriptor)
            {
                global::handle_error(err);
                continue;
            }

            let start_time = record
                .window_start
                .lock()
                .map(|mut window_start| std::mem::replace(&mut *window_start, end_time))
                .unwrap_or(end_time);

            if let Some(point) = checkpoint.to_point(&record.descriptor) {
                batch.push(MetricData {
                    descriptor: record.descriptor.clone(),
                    labels: record.labels.clone(),
                    start_time,
                    end_time,
                    point,
                });
            }
        }

        batch
    }
}

/// The synchronous instrument implementation handed to the API layer.
#[derive(Debug)]
struct SyncInstrument {
    descriptor: Descriptor,
    accumulator: Accumulator,
}

impl SyncInstrumentCore for SyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn record_one(&self, number: Number, labels: &LabelSet) -> Result<()> {
        range_test(&number, &self.descriptor)?;
        let record = self.accumulator.record_for(&self.descriptor, labels);
        record.aggregator.update(&number, &self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsError, NumberKind};
    use crate::sdk::export::metrics::Point;

    #[test]
    fn monotonic_counter_rejects_negative_deltas() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let counter = meter.f64_counter("requests").init();
        let labels = LabelSet::empty();

        assert!(matches!(
            counter.add(-1.0, &labels),
            Err(MetricsError::NegativeInput)
        ));

        // the failed recording must not have touched the sum
        counter.add(2.0, &labels).unwrap();
        let batch = accumulator.collect_all_metrics();
        assert_eq!(batch.len(), 1);
        match &batch[0].point {
            Point::Sum(value) => assert_eq!(value.to_f64(&NumberKind::F64), 2.0),
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn up_down_counter_accepts_any_delta() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let counter = meter.i64_up_down_counter("in_flight").init();
        let labels = LabelSet::empty();

        counter.add(5, &labels).unwrap();
        counter.add(-3, &labels).unwrap();

        let batch = accumulator.collect_all_metrics();
        match &batch[0].point {
            Point::Sum(value) => assert_eq!(value.to_i64(&NumberKind::I64), 2),
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn nan_recordings_are_rejected() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let recorder = meter.f64_value_recorder("latency").init();

        assert!(matches!(
            recorder.record(f64::NAN, &LabelSet::empty()),
            Err(MetricsError::NaNInput)
        ));
    }

    #[test]
    fn separate_label_sets_get_separate_aggregators() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let counter = meter.u64_counter("requests").init();

        counter
            .add(1, &LabelSet::from_labels([("path", "/a")]))
            .unwrap();
        counter
            .add(2, &LabelSet::from_labels([("path", "/b")]))
            .unwrap();

        let batch = accumulator.collect_all_metrics();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn collection_resets_sums() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let counter = meter.u64_counter("requests").init();
        let labels = LabelSet::empty();

        counter.add(7, &labels).unwrap();
        let first = accumulator.collect_all_metrics();
        match &first[0].point {
            Point::Sum(value) => assert_eq!(value.to_u64(&NumberKind::U64), 7),
            other => panic!("unexpected point {:?}", other),
        }

        counter.add(1, &labels).unwrap();
        let second = accumulator.collect_all_metrics();
        match &second[0].point {
            Point::Sum(value) => assert_eq!(value.to_u64(&NumberKind::U64), 1),
            other => panic!("unexpected point {:?}", other),
        }
    }

    #[test]
    fn concurrent_recording_with_collection() {
        let accumulator = Accumulator::new(Selector::Inexpensive);
        let meter = accumulator.meter("test");
        let counter = meter.u64_counter("requests").init();

        let recorded = 4 * 1000u64;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let labels = LabelSet::empty();
                    for _ in 0..1000 {
                        counter.add(1, &labels).unwrap();
                    }
                })
            })
            .collect();

        // collect while recorders are running; every recording must land in
        // exactly one window
        let mut collected = 0u64;
        for _ in 0..10 {
            for data in accumulator.collect_all_metrics() {
                if let Point::Sum(value) = data.point {
                    collected += value.to_u64(&NumberKind::U64);
                }
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }
        for data in accumulator.collect_all_metrics() {
            if let Point::Sum(value) = data.point {
                collected += value.to_u64(&NumberKind::U64);
            }
        }

        assert_eq!(collected, recorded);
    }
}
