//! Metric aggregators.
//!
//! An aggregator tracks a sequence of updates to one instrument under one
//! label set. Adding instruments commonly use the simple [`SumAggregator`];
//! grouping instruments choose between [`MinMaxSumCountAggregator`] (the
//! `ValueRecorder` default), [`HistogramAggregator`], and
//! [`LastValueAggregator`] (observers).
//!
//! All aggregators accept concurrent `update` calls. Collection uses
//! [`Aggregator::synchronized_move`] to swap the accumulating state into a
//! fresh instance, so each emitted point is a consistent snapshot even
//! while records continue.
use crate::metrics::{Descriptor, MetricsError, Number, NumberKind, Result};
use crate::sdk::export::metrics::Point;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

mod histogram;
mod last_value;
mod min_max_sum_count;
mod sum;

pub use histogram::{histogram, HistogramAggregator};
pub use last_value::{last_value, LastValueAggregator};
pub use min_max_sum_count::{min_max_sum_count, MinMaxSumCountAggregator};
pub use sum::{sum, SumAggregator};

/// A common routine testing for valid input values.
///
/// Rejects NaN, and rejects negative values when the instrument is
/// monotonic. The failing recording operation surfaces the error to its
/// caller synchronously.
pub fn range_test(number: &Number, descriptor: &Descriptor) -> Result<()> {
    if descriptor.number_kind() == &NumberKind::F64 && number.is_nan() {
        return Err(MetricsError::NaNInput);
    }

    if descriptor.monotonic() && number.is_negative(descriptor.number_kind()) {
        return Err(MetricsError::NegativeInput);
    }

    Ok(())
}

/// Aggregator implements a specific aggregation behavior, i.e. a behavior
/// to track a sequence of updates to an instrument.
pub trait Aggregator: fmt::Debug {
    /// Update receives a new measured value and incorporates it into the
    /// aggregation. Update calls may arrive concurrently from any thread.
    ///
    /// [`Descriptor::number_kind`] should be consulted to determine whether
    /// the provided number is an `i64`, `u64` or `f64`.
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()>;

    /// Called during collection to finish one period of aggregation by
    /// atomically saving the currently-updating state into `destination`
    /// and resetting this aggregator.
    ///
    /// `synchronized_move` runs concurrently with `update`; implementations
    /// keep the two consistent with respect to each other.
    ///
    /// Returns an `InconsistentAggregator` error if `destination` is of an
    /// incompatible kind.
    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        descriptor: &Descriptor,
    ) -> Result<()>;

    /// Combines the checkpointed state of `other` into this aggregator.
    ///
    /// `merge` is not synchronized with respect to `update` or
    /// `synchronized_move`; the owner of the aggregators is responsible for
    /// synchronizing both states.
    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor)
        -> Result<()>;

    /// Emit the aggregation as an exportable point, or `None` when nothing
    /// was recorded during the period.
    fn to_point(&self, descriptor: &Descriptor) -> Option<Point>;

    /// Returns the implementing aggregator as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn inconsistent(
    expected: &dyn fmt::Debug,
    got: &dyn fmt::Debug,
) -> MetricsError {
    MetricsError::InconsistentAggregator(format!("expected {:?}, got {:?}", expected, got))
}
