//! Telemetry export contracts.
//!
//! The runtime hands finished telemetry to exporter sinks; concrete wire
//! transports live outside this crate and only implement the traits defined
//! here.

#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub mod trace;
