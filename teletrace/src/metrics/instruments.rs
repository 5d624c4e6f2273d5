use crate::metrics::{
    Descriptor, InstrumentKind, LabelSet, Meter, Number, NumberKind, Result, SyncInstrumentCore,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Instrument types that wrap an SDK-provided synchronous core.
pub trait SyncInstrument: sealed::FromCore {}

#[doc(hidden)]
pub mod sealed {
    use super::*;

    pub trait FromCore {
        fn from_core(core: Arc<dyn SyncInstrumentCore + Send + Sync>) -> Self;
    }
}

macro_rules! sync_instrument {
    ($name:ident) => {
        impl<T> sealed::FromCore for $name<T> {
            fn from_core(core: Arc<dyn SyncInstrumentCore + Send + Sync>) -> Self {
                $name {
                    core,
                    _marker: PhantomData,
                }
            }
        }

        impl<T> SyncInstrument for $name<T> {}

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                $name {
                    core: self.core.clone(),
                    _marker: PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.core.descriptor().name())
                    .finish()
            }
        }

        impl<T> $name<T> {
            /// The descriptor this instrument was created with.
            pub fn descriptor(&self) -> &Descriptor {
                self.core.descriptor()
            }
        }
    };
}

/// An instrument accumulating a monotonic sum.
///
/// Adding a negative delta is a programmer error and fails the recording
/// operation with [`MetricsError::NegativeInput`].
///
/// [`MetricsError::NegativeInput`]: crate::metrics::MetricsError::NegativeInput
pub struct Counter<T> {
    core: Arc<dyn SyncInstrumentCore + Send + Sync>,
    _marker: PhantomData<T>,
}

sync_instrument!(Counter);

impl<T: Into<Number>> Counter<T> {
    /// Add a delta to this counter's sum for the given labels.
    pub fn add(&self, value: T, labels: &LabelSet) -> Result<()> {
        self.core.record_one(value.into(), labels)
    }
}

/// An instrument accumulating a sum that may go up or down.
pub struct UpDownCounter<T> {
    core: Arc<dyn SyncInstrumentCore + Send + Sync>,
    _marker: PhantomData<T>,
}

sync_instrument!(UpDownCounter);

impl<T: Into<Number>> UpDownCounter<T> {
    /// Add a positive or negative delta to this counter's sum for the given
    /// labels.
    pub fn add(&self, value: T, labels: &LabelSet) -> Result<()> {
        self.core.record_one(value.into(), labels)
    }
}

/// An instrument recording a distribution of values.
///
/// Defaults to min/max/sum/count aggregation.
pub struct ValueRecorder<T> {
    core: Arc<dyn SyncInstrumentCore + Send + Sync>,
    _marker: PhantomData<T>,
}

sync_instrument!(ValueRecorder);

impl<T: Into<Number>> ValueRecorder<T> {
    /// Record a value for the given labels.
    pub fn record(&self, value: T, labels: &LabelSet) -> Result<()> {
        self.core.record_one(value.into(), labels)
    }
}

/// An instrument keeping the last observed value per label set.
pub struct ValueObserver<T> {
    core: Arc<dyn SyncInstrumentCore + Send + Sync>,
    _marker: PhantomData<T>,
}

sync_instrument!(ValueObserver);

impl<T: Into<Number>> ValueObserver<T> {
    /// Observe the current value for the given labels.
    pub fn observe(&self, value: T, labels: &LabelSet) -> Result<()> {
        self.core.record_one(value.into(), labels)
    }
}

/// Configuration for building a metric instrument.
#[derive(Debug)]
pub struct InstrumentBuilder<'a, I> {
    meter: &'a Meter,
    name: String,
    description: Option<String>,
    unit: Option<String>,
    constant_labels: LabelSet,
    instrument_kind: InstrumentKind,
    number_kind: NumberKind,
    _marker: PhantomData<I>,
}

impl<'a, I: SyncInstrument> InstrumentBuilder<'a, I> {
    pub(crate) fn new(
        meter: &'a Meter,
        name: String,
        instrument_kind: InstrumentKind,
        number_kind: NumberKind,
    ) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            constant_labels: LabelSet::empty(),
            instrument_kind,
            number_kind,
            _marker: PhantomData,
        }
    }

    /// Set the description of this instrument.
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit of this instrument.
    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set labels reported with every point of this instrument.
    pub fn with_constant_labels(mut self, constant_labels: LabelSet) -> Self {
        self.constant_labels = constant_labels;
        self
    }

    /// Creates the instrument.
    pub fn init(self) -> I {
        let descriptor = Descriptor::new(
            self.name,
            self.instrument_kind,
            self.number_kind,
            self.description,
            self.unit,
            self.constant_labels,
        );
        sealed::FromCore::from_core(self.meter.new_sync_instrument(descriptor))
    }
}
