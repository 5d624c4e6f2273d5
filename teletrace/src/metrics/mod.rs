//! The metrics API: instruments for recording numeric measurements.
//!
//! Instruments are created from a [`Meter`] and record measurements under a
//! [`LabelSet`]. The SDK aggregates measurements per `(instrument, label
//! set)` pair between collection ticks; see [`crate::sdk::metrics`].
//!
//! Recording operations are fail-fast for programmer errors: a monotonic
//! counter rejects negative deltas and floating-point instruments reject
//! NaN, both synchronously via [`MetricsError`]. Everything else about a
//! recording is infallible and lock-free.
use crate::ExportError;
use std::result;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

mod descriptor;
mod instruments;
mod labels;
mod meter;
pub mod noop;
mod number;

pub use descriptor::{Descriptor, InstrumentKind};
pub use instruments::{
    Counter, InstrumentBuilder, SyncInstrument, UpDownCounter, ValueObserver, ValueRecorder,
};
pub use labels::LabelSet;
pub use meter::{Meter, MeterCore, SyncInstrumentCore};
pub use number::{AtomicNumber, Number, NumberKind};

/// A specialized `Result` type for metric operations.
pub type Result<T> = result::Result<T, MetricsError>;

/// Errors returned by the metrics API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricsError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),

    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),

    /// A measurement was NaN, which cannot be aggregated.
    #[error("NaN value is an invalid input")]
    NaNInput,

    /// A negative delta was recorded against a monotonic instrument.
    #[error("Negative value is out of range for this instrument")]
    NegativeInput,

    /// Two aggregators of incompatible kinds were combined.
    #[error("Inconsistent aggregator types: {0}")]
    InconsistentAggregator(String),

    /// Fail to export metrics
    #[error("Metrics exporter {} failed with {0}", .0.exporter_name())]
    ExportErr(Box<dyn ExportError>),

    /// A graceful shutdown exceeded its budget and was forced.
    #[error("Metrics shutdown timed out after {} seconds", .0.as_secs())]
    ShutdownTimedOut(Duration),
}

impl<T: ExportError> From<T> for MetricsError {
    fn from(err: T) -> Self {
        MetricsError::ExportErr(Box::new(err))
    }
}

impl<T> From<PoisonError<T>> for MetricsError {
    fn from(err: PoisonError<T>) -> Self {
        MetricsError::Other(err.to_string())
    }
}
