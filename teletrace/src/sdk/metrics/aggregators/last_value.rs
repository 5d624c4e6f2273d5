use crate::metrics::{Descriptor, Number, Result};
use crate::sdk::export::metrics::Point;
use crate::sdk::metrics::aggregators::{inconsistent, Aggregator};
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Create a new last-value aggregator.
pub fn last_value() -> LastValueAggregator {
    LastValueAggregator::default()
}

#[derive(Clone, Copy, Debug)]
struct LastValueData {
    value: Number,
    timestamp: SystemTime,
}

/// An aggregator retaining the most recent observation.
///
/// Used for asynchronous observers. An aggregator that saw no observation
/// during a period emits no point.
#[derive(Debug, Default)]
pub struct LastValueAggregator {
    inner: Mutex<Option<LastValueData>>,
}

impl Aggregator for LastValueAggregator {
    fn update(&self, number: &Number, _descriptor: &Descriptor) -> Result<()> {
        self.inner.lock().map_err(From::from).map(|mut inner| {
            *inner = Some(LastValueData {
                value: *number,
                timestamp: crate::time::now(),
            });
        })
    }

    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        _descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            let mut inner = self.inner.lock()?;
            let mut other_inner = other.inner.lock()?;
            *other_inner = inner.take();
            Ok(())
        } else {
            Err(inconsistent(&self, &destination))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), _descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let mut inner = self.inner.lock()?;
            let other_inner = other.inner.lock()?;
            // The most recent observation wins.
            match (*inner, *other_inner) {
                (Some(current), Some(incoming)) if incoming.timestamp > current.timestamp => {
                    *inner = Some(incoming);
                }
                (None, Some(incoming)) => *inner = Some(incoming),
                _ => {}
            }
            Ok(())
        } else {
            Err(inconsistent(&self, &other))
        }
    }

    fn to_point(&self, _descriptor: &Descriptor) -> Option<Point> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| *inner)
            .map(|data| Point::LastValue {
                value: data.value,
                timestamp: data.timestamp,
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
