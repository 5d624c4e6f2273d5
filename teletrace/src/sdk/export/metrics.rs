//! Metric exporter contract and the collected-data model.
use crate::metrics::{Descriptor, LabelSet, Number, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::SystemTime;

/// Describes the result of a metrics export.
pub type ExportResult = Result<()>;

/// A snapshot of one `(instrument, label set)` pair over a collection
/// window.
#[derive(Clone, Debug)]
pub struct MetricData {
    /// The instrument this data was collected from.
    pub descriptor: Descriptor,
    /// The labels this point was aggregated under.
    pub labels: LabelSet,
    /// The start of the aggregation window.
    pub start_time: SystemTime,
    /// The end of the aggregation window.
    pub end_time: SystemTime,
    /// The aggregated point itself.
    pub point: Point,
}

/// An aggregated point value.
#[derive(Clone, Debug)]
pub enum Point {
    /// An accumulated sum. Whether the sum is monotonic is carried by the
    /// descriptor's instrument kind.
    Sum(Number),

    /// The last recorded value and the time it was observed.
    LastValue {
        /// The most recent observation.
        value: Number,
        /// When the observation was recorded.
        timestamp: SystemTime,
    },

    /// A min/max/sum/count summary with estimated percentiles.
    Summary {
        /// The smallest recorded value.
        min: Number,
        /// The largest recorded value.
        max: Number,
        /// The sum of all recorded values.
        sum: Number,
        /// The number of recorded values.
        count: u64,
        /// Estimated percentiles as `(percentile, value)` pairs.
        percentiles: Vec<(f64, Number)>,
    },

    /// Bucketed counts with a total sum.
    Histogram {
        /// The upper bucket boundaries; values greater than or equal to a
        /// boundary fall into the next bucket.
        boundaries: Vec<f64>,
        /// Per-bucket counts, one longer than `boundaries`.
        counts: Vec<u64>,
        /// The sum of all recorded values.
        sum: Number,
        /// The number of recorded values.
        count: u64,
    },
}

/// Sources of collected metric data, drained by the collection pipeline on
/// every tick.
pub trait MetricProducer: Send + Sync + Debug {
    /// Snapshot and reset all aggregators, returning their data.
    fn collect_all_metrics(&self) -> Vec<MetricData>;
}

/// Exporter handles the delivery of metric data to external receivers.
///
/// This is the final component in the metric push pipeline.
#[async_trait]
pub trait MetricExporter: Send + Debug {
    /// Exports a batch of collected metrics. Errors are reported to the
    /// collection loop, which logs and continues; they never propagate to
    /// recording call sites.
    async fn export(&mut self, batch: Vec<MetricData>) -> ExportResult;

    /// Shuts down the exporter after the final export has been delivered.
    fn shutdown(&mut self) {}
}
