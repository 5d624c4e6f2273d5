//! # Metrics SDK
//!
//! Instruments created through an SDK [`MeterProvider`] record into a
//! shared [`Accumulator`], which keeps one aggregator per `(instrument,
//! label set)` pair. The [`IntervalMetricReader`] periodically snapshots
//! the accumulated data and hands it to a
//! [`MetricExporter`](crate::sdk::export::metrics::MetricExporter).
mod accumulator;
pub mod aggregators;
mod interval_reader;
mod meter_provider;
pub mod selectors;

pub use accumulator::Accumulator;
pub use interval_reader::{IntervalMetricReader, IntervalMetricReaderBuilder};
pub use meter_provider::{MeterProvider, MeterProviderBuilder};
