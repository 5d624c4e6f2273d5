//! Events record things that happened during a [`Span`]'s lifetime.
//!
//! [`Span`]: crate::trace::Span
use crate::KeyValue;
use std::borrow::Cow;
use std::time::SystemTime;

/// A timed annotation with a name and an optional set of attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,

    /// The wall clock time at which this event occurred.
    pub timestamp: SystemTime,

    /// The attributes describing this event.
    pub attributes: Vec<KeyValue>,

    /// The number of attributes that were above the limit and thus dropped.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }

    /// Create a new event with a name occurring now, with no attributes.
    pub fn with_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Event {
            name: name.into(),
            timestamp: crate::time::now(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
        }
    }
}
