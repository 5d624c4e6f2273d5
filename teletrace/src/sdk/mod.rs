//! The SDK: concrete implementations of the trace and metrics APIs, plus
//! the exporter contracts they drain into.
pub mod export;

#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub mod trace;
