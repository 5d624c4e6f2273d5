use crate::metrics::{LabelSet, NumberKind};
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// Kinds of metric instruments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// A synchronous per-request part of a monotonic sum.
    Counter,
    /// A synchronous per-request part of a non-monotonic sum.
    UpDownCounter,
    /// A synchronous instrument for recording a distribution of values.
    ValueRecorder,
    /// An asynchronous instrument reporting the last observed value.
    ValueObserver,
}

impl InstrumentKind {
    /// Whether this kind of instrument adds its inputs (as opposed to
    /// grouping).
    pub fn adding(&self) -> bool {
        matches!(self, InstrumentKind::Counter | InstrumentKind::UpDownCounter)
    }

    /// Whether this kind of instrument groups its inputs (as opposed to
    /// adding).
    pub fn grouping(&self) -> bool {
        !self.adding()
    }

    /// Whether this kind of instrument exposes a non-decreasing sum.
    pub fn monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter)
    }
}

/// Descriptor contains all the settings that describe an instrument,
/// including its name, metric kind, number kind, and configurable options.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    name: String,
    instrument_kind: InstrumentKind,
    number_kind: NumberKind,
    description: Option<String>,
    unit: Option<String>,
    constant_labels: LabelSet,
    attribute_hash: u64,
}

impl Descriptor {
    /// Create a new descriptor.
    pub fn new(
        name: String,
        instrument_kind: InstrumentKind,
        number_kind: NumberKind,
        description: Option<String>,
        unit: Option<String>,
        constant_labels: LabelSet,
    ) -> Self {
        let mut hasher = FnvHasher::default();
        name.hash(&mut hasher);
        instrument_kind.hash(&mut hasher);
        number_kind.hash(&mut hasher);
        if let Some(description) = &description {
            description.hash(&mut hasher);
        }
        if let Some(unit) = &unit {
            unit.hash(&mut hasher);
        }

        Descriptor {
            name,
            instrument_kind,
            number_kind,
            description,
            unit,
            constant_labels,
            attribute_hash: hasher.finish(),
        }
    }

    /// The metric instrument's name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The specific kind of instrument.
    pub fn instrument_kind(&self) -> &InstrumentKind {
        &self.instrument_kind
    }

    /// Whether this instrument's sum may only grow.
    pub fn monotonic(&self) -> bool {
        self.instrument_kind.monotonic()
    }

    /// NumberKind returns whether this instrument is declared over `i64`,
    /// `f64`, or `u64` values.
    pub fn number_kind(&self) -> &NumberKind {
        &self.number_kind
    }

    /// A human-readable description of the metric instrument.
    pub fn description(&self) -> Option<&String> {
        self.description.as_ref()
    }

    /// Unit describes the units of the metric instrument.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Labels reported with every point of this instrument, ahead of
    /// per-point labels.
    pub fn constant_labels(&self) -> &LabelSet {
        &self.constant_labels
    }

    /// The pre-computed hash of the descriptor data.
    pub fn attribute_hash(&self) -> u64 {
        self.attribute_hash
    }
}
