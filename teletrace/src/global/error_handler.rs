use crate::context::ContextError;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsError;
#[cfg(feature = "trace")]
use crate::trace::TraceError;
use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

static GLOBAL_ERROR_HANDLER: Lazy<RwLock<Option<ErrorHandler>>> = Lazy::new(|| RwLock::new(None));

/// Wrapper for error from both tracing and metrics part of open telemetry.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to export traces.
    #[cfg(feature = "trace")]
    #[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// An issue raised by the metrics module.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[error(transparent)]
    Metric(#[from] MetricsError),

    /// A context stack violation.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Other errors propagated from telemetry components that weren't covered above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Other(err.to_string())
    }
}

struct ErrorHandler(Box<dyn Fn(Error) + Send + Sync>);

/// Handle an error using the globally configured error handler.
///
/// The default handler reports through the [`log`] facade at WARN level.
pub fn handle_error<T: Into<Error>>(err: T) {
    match GLOBAL_ERROR_HANDLER.read() {
        Ok(handler) if handler.is_some() => (handler.as_ref().unwrap().0)(err.into()),
        _ => match err.into() {
            #[cfg(feature = "trace")]
            Error::Trace(err) => log::warn!("trace error: {}", err),
            #[cfg(feature = "metrics")]
            Error::Metric(err) => log::warn!("metrics error: {}", err),
            Error::Context(err) => log::warn!("context error: {}", err),
            Error::Other(err_msg) => log::warn!("telemetry error: {}", err_msg),
        },
    }
}

/// Set a custom global error handler.
pub fn set_error_handler<F>(f: F) -> std::result::Result<(), Error>
where
    F: Fn(Error) + Send + Sync + 'static,
{
    GLOBAL_ERROR_HANDLER
        .write()
        .map(|mut handler| *handler = Some(ErrorHandler(Box::new(f))))
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn custom_handler_receives_errors() {
        let seen = Arc::new(AtomicUsize::new(0));
        let inner = seen.clone();
        set_error_handler(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        handle_error(Error::Other("it broke".into()));
        assert!(seen.load(Ordering::SeqCst) >= 1);

        // Restore default-ish behavior for other tests.
        set_error_handler(|_| {}).unwrap();
    }
}
