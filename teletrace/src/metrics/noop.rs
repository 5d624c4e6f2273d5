//! No-op metrics implementation, used before a meter provider is configured
//! and in tests.
use crate::metrics::{Descriptor, LabelSet, Meter, MeterCore, Number, Result, SyncInstrumentCore};
use crate::InstrumentationLibrary;
use std::sync::Arc;

/// A no-op instance of a [`MeterCore`].
#[derive(Debug, Default)]
pub struct NoopMeterCore {
    _private: (),
}

impl NoopMeterCore {
    /// Create a new no-op meter core.
    pub fn new() -> Self {
        NoopMeterCore { _private: () }
    }

    /// Create a [`Meter`] backed by this no-op core.
    pub fn meter(name: &'static str) -> Meter {
        Meter::new(
            InstrumentationLibrary::new(name, None::<&'static str>),
            Arc::new(NoopMeterCore::new()),
        )
    }
}

impl MeterCore for NoopMeterCore {
    fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrumentCore + Send + Sync> {
        Arc::new(NoopSyncInstrument { descriptor })
    }
}

/// A no-op sync instrument that ignores all recordings.
#[derive(Debug)]
pub struct NoopSyncInstrument {
    descriptor: Descriptor,
}

impl SyncInstrumentCore for NoopSyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn record_one(&self, _number: Number, _labels: &LabelSet) -> Result<()> {
        // Ignored
        Ok(())
    }
}
