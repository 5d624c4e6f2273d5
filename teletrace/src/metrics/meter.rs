use crate::metrics::instruments::{
    Counter, InstrumentBuilder, UpDownCounter, ValueObserver, ValueRecorder,
};
use crate::metrics::{Descriptor, InstrumentKind, LabelSet, Number, NumberKind, Result};
use crate::InstrumentationLibrary;
use std::fmt;
use std::sync::Arc;

/// The interface an SDK must implement to supply a [`Meter`]
/// implementation.
pub trait MeterCore: fmt::Debug {
    /// Create a new synchronous instrument implementation.
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrumentCore + Send + Sync>;
}

/// The implementation-level interface to a generic synchronous instrument
/// (e.g. counters and value recorders).
pub trait SyncInstrumentCore: fmt::Debug + Send + Sync {
    /// Description of the instrument.
    fn descriptor(&self) -> &Descriptor;

    /// Capture a single synchronous metric event.
    fn record_one(&self, number: Number, labels: &LabelSet) -> Result<()>;
}

/// Returns named meter instances, the metric siblings of tracers.
///
/// # Examples
///
/// ```
/// use teletrace::metrics::LabelSet;
/// use teletrace::sdk::metrics::MeterProvider;
///
/// let provider = MeterProvider::builder().build();
/// let meter = provider.meter("my_service");
///
/// let requests = meter
///     .u64_counter("requests")
///     .with_description("Number of requests processed")
///     .init();
///
/// let _ = requests.add(1, &LabelSet::from_labels([("path", "/index")]));
/// ```
#[derive(Clone, Debug)]
pub struct Meter {
    instrumentation: InstrumentationLibrary,
    core: Arc<dyn MeterCore + Send + Sync>,
}

impl Meter {
    /// Create a new meter from a sdk-implemented core.
    pub fn new(
        instrumentation: InstrumentationLibrary,
        core: Arc<dyn MeterCore + Send + Sync>,
    ) -> Self {
        Meter {
            instrumentation,
            core,
        }
    }

    /// Information about the library providing instrumentation through this
    /// meter.
    pub fn instrumentation_library(&self) -> &InstrumentationLibrary {
        &self.instrumentation
    }

    /// Creates a builder for a monotonic `u64` counter.
    pub fn u64_counter<T: Into<String>>(&self, name: T) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into(), InstrumentKind::Counter, NumberKind::U64)
    }

    /// Creates a builder for a monotonic `f64` counter.
    pub fn f64_counter<T: Into<String>>(&self, name: T) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into(), InstrumentKind::Counter, NumberKind::F64)
    }

    /// Creates a builder for an `i64` up-down-counter, which accepts
    /// positive and negative deltas.
    pub fn i64_up_down_counter<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::UpDownCounter,
            NumberKind::I64,
        )
    }

    /// Creates a builder for an `f64` up-down-counter.
    pub fn f64_up_down_counter<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::UpDownCounter,
            NumberKind::F64,
        )
    }

    /// Creates a builder for a `u64` value recorder.
    pub fn u64_value_recorder<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, ValueRecorder<u64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::ValueRecorder,
            NumberKind::U64,
        )
    }

    /// Creates a builder for an `i64` value recorder.
    pub fn i64_value_recorder<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, ValueRecorder<i64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::ValueRecorder,
            NumberKind::I64,
        )
    }

    /// Creates a builder for an `f64` value recorder.
    pub fn f64_value_recorder<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, ValueRecorder<f64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::ValueRecorder,
            NumberKind::F64,
        )
    }

    /// Creates a builder for a `u64` value observer, whose last observation
    /// per label set is kept.
    pub fn u64_value_observer<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, ValueObserver<u64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::ValueObserver,
            NumberKind::U64,
        )
    }

    /// Creates a builder for an `f64` value observer.
    pub fn f64_value_observer<T: Into<String>>(
        &self,
        name: T,
    ) -> InstrumentBuilder<'_, ValueObserver<f64>> {
        InstrumentBuilder::new(
            self,
            name.into(),
            InstrumentKind::ValueObserver,
            NumberKind::F64,
        )
    }

    pub(crate) fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrumentCore + Send + Sync> {
        self.core.new_sync_instrument(descriptor)
    }
}
