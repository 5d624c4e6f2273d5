//! Periodic metric collection.
//!
//! The [`IntervalMetricReader`] owns a single worker thread that ticks on a
//! fixed interval. Every tick drains each registered producer and hands the
//! concatenated batch to the exporter. Exporter failures are caught,
//! reported through the global error handler, and never escape the loop.
use crate::global;
use crate::metrics::MetricsError;
use crate::sdk::export::metrics::{MetricExporter, MetricProducer};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Export interval in milliseconds.
const TELETRACE_IMR_EXPORT_INTERVAL: &str = "TELETRACE_IMR_EXPORT_INTERVAL";
/// Default export interval.
const TELETRACE_IMR_EXPORT_INTERVAL_DEFAULT: u64 = 60_000;

/// The budget a graceful shutdown gets for the final collect and export.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

enum Message {
    Shutdown(Sender<()>),
}

/// Periodically drains metric producers into an exporter.
///
/// `shutdown` stops the schedule, waits up to five seconds while the worker
/// runs one final collect+export and shuts the exporter down, then returns.
/// If the budget elapses, teardown proceeds without the final export and a
/// timeout is reported.
pub struct IntervalMetricReader {
    message_sender: Sender<Message>,
    is_shutdown: bool,
}

impl fmt::Debug for IntervalMetricReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalMetricReader")
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

impl IntervalMetricReader {
    /// Create a new [`IntervalMetricReader`] builder.
    pub fn builder() -> IntervalMetricReaderBuilder {
        IntervalMetricReaderBuilder::default()
    }

    /// Stop the export schedule and shut the exporter down.
    ///
    /// Idempotent: only the first call performs the shutdown.
    pub fn shutdown(&mut self) -> crate::metrics::Result<()> {
        if self.is_shutdown {
            return Ok(());
        }
        self.is_shutdown = true;

        let (ack_sender, ack_receiver) = bounded(0);
        if self.message_sender.send(Message::Shutdown(ack_sender)).is_err() {
            // Worker is already gone; nothing left to wait on.
            return Ok(());
        }

        match ack_receiver.recv_timeout(SHUTDOWN_BUDGET) {
            Ok(()) => Ok(()),
            Err(_) => Err(MetricsError::ShutdownTimedOut(SHUTDOWN_BUDGET)),
        }
    }
}

impl Drop for IntervalMetricReader {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            global::handle_error(err);
        }
    }
}

/// Builder for [`IntervalMetricReader`] instances.
///
/// The export interval is resolved in priority order: explicit setter, then
/// the `TELETRACE_IMR_EXPORT_INTERVAL` environment variable (milliseconds),
/// then the 60 second default.
#[derive(Debug, Default)]
pub struct IntervalMetricReaderBuilder {
    producers: Vec<Arc<dyn MetricProducer>>,
    interval: Option<Duration>,
}

impl IntervalMetricReaderBuilder {
    /// Add a producer to drain on every tick.
    pub fn with_producer(mut self, producer: Arc<dyn MetricProducer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Set the export interval explicitly, overriding the environment.
    pub fn with_export_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Build the reader and start its worker thread.
    pub fn build<E>(self, exporter: E) -> IntervalMetricReader
    where
        E: MetricExporter + 'static,
    {
        let interval = self.interval.unwrap_or_else(interval_from_env);
        let producers = self.producers;
        let (message_sender, message_receiver) = bounded(1);

        let _ = thread::Builder::new()
            .name("teletrace-interval-metric-reader".to_string())
            .spawn(move || run(producers, Box::new(exporter), message_receiver, interval));

        IntervalMetricReader {
            message_sender,
            is_shutdown: false,
        }
    }
}

fn interval_from_env() -> Duration {
    env::var(TELETRACE_IMR_EXPORT_INTERVAL)
        .ok()
        .and_then(|interval| u64::from_str(&interval).ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(TELETRACE_IMR_EXPORT_INTERVAL_DEFAULT))
}

fn run(
    producers: Vec<Arc<dyn MetricProducer>>,
    mut exporter: Box<dyn MetricExporter>,
    receiver: Receiver<Message>,
    interval: Duration,
) {
    loop {
        match receiver.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                collect_and_export(&producers, exporter.as_mut());
            }
            Ok(Message::Shutdown(ack)) => {
                collect_and_export(&producers, exporter.as_mut());
                exporter.shutdown();
                let _ = ack.send(());
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                collect_and_export(&producers, exporter.as_mut());
                exporter.shutdown();
                return;
            }
        }
    }
}

fn collect_and_export(producers: &[Arc<dyn MetricProducer>], exporter: &mut dyn MetricExporter) {
    let batch = producers
        .iter()
        .flat_map(|producer| producer.collect_all_metrics())
        .collect::<Vec<_>>();

    if let Err(err) = futures_executor::block_on(exporter.export(batch)) {
        global::handle_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LabelSet;
    use crate::sdk::metrics::MeterProvider;
    use crate::testing::metrics::InMemoryMetricExporter;

    #[test]
    fn exports_on_every_tick_and_once_on_shutdown() {
        let provider = MeterProvider::builder().build();
        let meter = provider.meter("test");
        let counter = meter.u64_counter("ticks").init();
        counter.add(1, &LabelSet::empty()).unwrap();

        let (exporter, stats) = InMemoryMetricExporter::new();
        let mut reader = IntervalMetricReader::builder()
            .with_producer(provider.producer())
            .with_export_interval(Duration::from_millis(10))
            .build(exporter);

        std::thread::sleep(Duration::from_millis(55));
        let before_shutdown = stats.export_count();
        assert!(
            before_shutdown >= 3,
            "expected at least 3 exports, got {}",
            before_shutdown
        );

        reader.shutdown().unwrap();
        let after_shutdown = stats.export_count();
        assert!(after_shutdown > before_shutdown);
        assert_eq!(stats.shutdown_count(), 1);

        // the schedule must be stopped after shutdown
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(stats.export_count(), after_shutdown);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let provider = MeterProvider::builder().build();
        let (exporter, stats) = InMemoryMetricExporter::new();
        let mut reader = IntervalMetricReader::builder()
            .with_producer(provider.producer())
            .with_export_interval(Duration::from_secs(3600))
            .build(exporter);

        reader.shutdown().unwrap();
        reader.shutdown().unwrap();
        assert_eq!(stats.shutdown_count(), 1);
        assert_eq!(stats.export_count(), 1);
    }

    #[test]
    fn interval_resolution_priority() {
        temp_env::with_var(TELETRACE_IMR_EXPORT_INTERVAL, Some("1234"), || {
            assert_eq!(interval_from_env(), Duration::from_millis(1234));
        });
        temp_env::with_var(TELETRACE_IMR_EXPORT_INTERVAL, None::<&str>, || {
            assert_eq!(
                interval_from_env(),
                Duration::from_millis(TELETRACE_IMR_EXPORT_INTERVAL_DEFAULT)
            );
        });
    }
}
