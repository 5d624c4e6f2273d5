//! Span processor interface and built-in processors.
//!
//! Span processors are hooks invoked when a span starts and when it ends.
//! They are registered on an SDK [`TracerProvider`] and invoked in
//! registration order. Built-in processors forward finished spans to a
//! [`SpanExporter`], either synchronously ([`SimpleSpanProcessor`]) or
//! through a bounded queue drained by a worker thread
//! ([`BatchSpanProcessor`]).
//!
//! ```ascii
//!   +-----+---------------+   +-----------------------+   +-------------------+
//!   |     |               |   |                       |   |                   |
//!   |     |               |   | (Batch)SpanProcessor  |   |    SpanExporter   |
//!   |     |               +---> (Simple)SpanProcessor +--->   (OtlpExporter)  |
//!   |     |               |   |                       |   |                   |
//!   | SDK | Tracer.start()|   +-----------------------+   +-------------------+
//!   |     | Span.end()    |
//!   +-----+---------------+
//! ```
//!
//! [`TracerProvider`]: crate::sdk::trace::TracerProvider
//! [`SpanExporter`]: crate::sdk::export::trace::SpanExporter
use crate::global;
use crate::sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use crate::sdk::trace::Span;
use crate::trace::{TraceError, TraceResult};
use crate::Context;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Delay interval between two consecutive batch exports.
const TELETRACE_BSP_SCHEDULE_DELAY: &str = "TELETRACE_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive batch exports.
const TELETRACE_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum queue size.
const TELETRACE_BSP_MAX_QUEUE_SIZE: &str = "TELETRACE_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
const TELETRACE_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to the maximum queue size.
const TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE: &str = "TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
const TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time for a flush to complete.
const TELETRACE_BSP_EXPORT_TIMEOUT: &str = "TELETRACE_BSP_EXPORT_TIMEOUT";
/// Default maximum allowed time for a flush to complete.
const TELETRACE_BSP_EXPORT_TIMEOUT_DEFAULT: u64 = 30_000;

/// The budget a graceful processor shutdown gets before teardown is forced.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

/// `SpanProcessor` is an interface which allows hooks for span start and end
/// method invocations. Span processors are invoked only for recording
/// spans.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// `on_start` is called when a `Span` is started. This method is called
    /// synchronously on the thread that started the span, therefore it
    /// should not block or throw exceptions.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// `on_end` is called after a `Span` is ended (i.e., the end timestamp
    /// is already set). This method is called synchronously within the
    /// `Span::end` API, therefore it should not block or throw an exception.
    fn on_end(&self, span: SpanData);

    /// Whether this processor needs `on_start` notifications. Processors
    /// that only consume finished spans return `false` so span start stays
    /// cheap.
    fn is_start_required(&self) -> bool {
        true
    }

    /// Whether this processor needs `on_end` notifications.
    fn is_end_required(&self) -> bool {
        true
    }

    /// Force the spans lying in the cache to be exported.
    fn force_flush(&self) -> TraceResult<()>;

    /// Shuts down the processor. Called when the SDK is shut down. This is
    /// an opportunity for the processor to do any cleanup required.
    fn shutdown(&mut self) -> TraceResult<()>;
}

#[derive(Debug)]
enum Message {
    ExportSpan(SpanData),
    Flush(Sender<ExportResult>),
    Shutdown(Sender<ExportResult>),
}

/// A [`SpanProcessor`] that forwards every finished span to the exporter as
/// soon as it ends.
///
/// The export itself runs on a dedicated worker thread, so ending a span
/// never blocks on exporter I/O, but spans are exported one at a time. Use
/// [`BatchSpanProcessor`] when throughput matters.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    message_sender: Sender<Message>,
}

impl SimpleSpanProcessor {
    pub(crate) fn new(mut exporter: Box<dyn SpanExporter>) -> Self {
        let (message_sender, rx): (_, Receiver<Message>) = unbounded();

        let _ = thread::Builder::new()
            .name("teletrace-simple-span-processor".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        Message::ExportSpan(span) => {
                            if let Err(err) =
                                futures_executor::block_on(exporter.export(vec![span]))
                            {
                                global::handle_error(err);
                            }
                        }
                        Message::Flush(sender) => {
                            Self::respond(&sender, "flush");
                        }
                        Message::Shutdown(sender) => {
                            exporter.shutdown();
                            Self::respond(&sender, "shutdown");
                            return;
                        }
                    }
                }

                exporter.shutdown();
            });

        Self { message_sender }
    }

    fn signal(
        &self,
        msg: fn(Sender<ExportResult>) -> Message,
        description: &'static str,
    ) -> TraceResult<()> {
        let (tx, rx) = bounded(0);
        if self.message_sender.send(msg(tx)).is_err() {
            return Err(TraceError::from(format!(
                "{} failed: worker thread is gone",
                description
            )));
        }

        rx.recv_timeout(SHUTDOWN_BUDGET)
            .map_err(|_| TraceError::ExportTimedOut(SHUTDOWN_BUDGET))?
    }

    fn respond(sender: &Sender<ExportResult>, description: &str) {
        if let Err(err) = sender.send(Ok(())) {
            global::handle_error(TraceError::from(format!(
                "could not send {}: {:?}",
                description, err
            )));
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        if let Err(err) = self.message_sender.send(Message::ExportSpan(span)) {
            global::handle_error(TraceError::from(format!("error processing span {:?}", err)));
        }
    }

    fn is_start_required(&self) -> bool {
        false
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.signal(Message::Flush, "flushing")
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.signal(Message::Shutdown, "shutting down")
    }
}

/// A [`SpanProcessor`] that buffers finished spans in a bounded queue and
/// reports them in batches, either when a batch fills up or when the
/// schedule deadline elapses.
///
/// When the queue is full, additional spans are dropped and counted rather
/// than blocking the thread that ended the span.
pub struct BatchSpanProcessor {
    message_sender: Sender<Message>,
    dropped_spans: Arc<AtomicUsize>,
    drops_reported: AtomicBool,
    max_export_timeout: Duration,
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("dropped_spans", &self.dropped_spans.load(Ordering::Relaxed))
            .finish()
    }
}

impl BatchSpanProcessor {
    pub(crate) fn new(exporter: Box<dyn SpanExporter>, config: BatchConfig) -> Self {
        let (message_sender, receiver) = bounded(config.max_queue_size);
        let max_export_timeout = config.max_export_timeout;

        let _ = thread::Builder::new()
            .name("teletrace-batch-span-processor".to_string())
            .spawn(move || {
                BatchWorker {
                    exporter,
                    receiver,
                    spans: Vec::with_capacity(config.max_export_batch_size),
                    config,
                }
                .run()
            });

        BatchSpanProcessor {
            message_sender,
            dropped_spans: Arc::new(AtomicUsize::new(0)),
            drops_reported: AtomicBool::new(false),
            max_export_timeout,
        }
    }

    /// Create a new batch processor builder.
    pub fn builder<E: SpanExporter + 'static>(exporter: E) -> BatchSpanProcessorBuilder<E> {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// The number of spans dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    /// Force the buffered spans to be exported, waiting no longer than
    /// `timeout`.
    pub fn force_flush_timeout(&self, timeout: Duration) -> TraceResult<()> {
        let (tx, rx) = bounded(0);
        self.message_sender
            .try_send(Message::Flush(tx))
            .map_err(|err| TraceError::from(format!("could not request flush: {:?}", err)))?;
        rx.recv_timeout(timeout)
            .map_err(|_| TraceError::ExportTimedOut(timeout))?
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        if let Err(err) = self.message_sender.try_send(Message::ExportSpan(span)) {
            match err {
                TrySendError::Full(_) => {
                    self.dropped_spans.fetch_add(1, Ordering::Relaxed);
                    if !self.drops_reported.swap(true, Ordering::Relaxed) {
                        global::handle_error(TraceError::from(
                            "batch span processor queue is full, spans are being dropped",
                        ));
                    }
                }
                TrySendError::Disconnected(_) => global::handle_error(TraceError::from(
                    "batch span processor worker is gone, span dropped",
                )),
            }
        }
    }

    fn is_start_required(&self) -> bool {
        false
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.force_flush_timeout(self.max_export_timeout)
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        let (tx, rx) = bounded(0);
        self.message_sender
            .try_send(Message::Shutdown(tx))
            .map_err(|err| TraceError::from(format!("could not request shutdown: {:?}", err)))?;
        rx.recv_timeout(SHUTDOWN_BUDGET)
            .map_err(|_| TraceError::ExportTimedOut(SHUTDOWN_BUDGET))?
    }
}

struct BatchWorker {
    exporter: Box<dyn SpanExporter>,
    receiver: Receiver<Message>,
    spans: Vec<SpanData>,
    config: BatchConfig,
}

impl BatchWorker {
    fn run(mut self) {
        let mut next_export = Instant::now() + self.config.scheduled_delay;
        loop {
            let timeout = next_export.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(timeout) {
                Ok(Message::ExportSpan(span)) => {
                    self.spans.push(span);
                    if self.spans.len() >= self.config.max_export_batch_size {
                        self.export();
                        next_export = Instant::now() + self.config.scheduled_delay;
                    }
                }
                Ok(Message::Flush(sender)) => {
                    let result = self.export();
                    let _ = sender.send(result);
                    next_export = Instant::now() + self.config.scheduled_delay;
                }
                Ok(Message::Shutdown(sender)) => {
                    let result = self.export();
                    self.exporter.shutdown();
                    let _ = sender.send(result);
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(err) = self.export() {
                        global::handle_error(err);
                    }
                    next_export = Instant::now() + self.config.scheduled_delay;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if let Err(err) = self.export() {
                        global::handle_error(err);
                    }
                    self.exporter.shutdown();
                    return;
                }
            }
        }
    }

    fn export(&mut self) -> ExportResult {
        if self.spans.is_empty() {
            return Ok(());
        }

        let mut result = Ok(());
        // Batches never exceed max_export_batch_size, but the queue may hold
        // more than one batch worth of spans by the time a deadline fires.
        while !self.spans.is_empty() {
            let batch_size = self.spans.len().min(self.config.max_export_batch_size);
            let remaining = self.spans.split_off(batch_size);
            let batch = std::mem::replace(&mut self.spans, remaining);
            if let Err(err) = futures_executor::block_on(self.exporter.export(batch)) {
                result = Err(err);
            }
        }
        result
    }
}

/// Batch span processor configuration, from explicit setters, the
/// environment, or defaults, in that order of precedence.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// The maximum queue size to buffer spans for delayed processing. If the
    /// queue gets full it drops the spans. The default value is 2048.
    max_queue_size: usize,

    /// The delay interval between two consecutive processing of batches.
    /// The default value is 5 seconds.
    scheduled_delay: Duration,

    /// The maximum number of spans to process in a single batch. If there
    /// are more than one batch worth of spans then it processes multiple
    /// batches of spans one batch after the other without any delay. The
    /// default value is 512.
    max_export_batch_size: usize,

    /// The maximum duration a flush may take.
    max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let mut config = BatchConfig {
            max_queue_size: TELETRACE_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(TELETRACE_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            max_export_timeout: Duration::from_millis(TELETRACE_BSP_EXPORT_TIMEOUT_DEFAULT),
        };

        if let Some(max_queue_size) = env::var(TELETRACE_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            config.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(TELETRACE_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(&delay).ok())
        {
            config.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            config.max_export_batch_size = max_export_batch_size;
        }

        // max export batch size must be less or equal to max queue size
        if config.max_export_batch_size > config.max_queue_size {
            config.max_export_batch_size = config.max_queue_size;
        }

        if let Some(max_export_timeout) = env::var(TELETRACE_BSP_EXPORT_TIMEOUT)
            .ok()
            .and_then(|timeout| u64::from_str(&timeout).ok())
        {
            config.max_export_timeout = Duration::from_millis(max_export_timeout);
        }

        config
    }
}

/// A builder for creating [`BatchSpanProcessor`] instances.
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set max queue size for batches
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        if self.config.max_export_batch_size > size {
            self.config.max_export_batch_size = size;
        }
        self
    }

    /// Set scheduled delay between batches
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.config.scheduled_delay = delay;
        self
    }

    /// Set max timeout for flushing.
    pub fn with_max_export_timeout(mut self, timeout: Duration) -> Self {
        self.config.max_export_timeout = timeout;
        self
    }

    /// Set max export size for batches. Should always be less than or equal
    /// to max queue size; larger values are clamped to the queue size.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.config.max_export_batch_size = size.min(self.config.max_queue_size);
        self
    }

    /// Build a batch processor
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(Box::new(self.exporter), self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trace::{new_test_export_span_data, TestExporter};

    #[test]
    fn simple_span_processor_on_end_calls_export() {
        let (exporter, rx_export, _rx_shutdown) = TestExporter::new();
        let mut processor = SimpleSpanProcessor::new(Box::new(exporter));
        processor.on_end(new_test_export_span_data(true));
        assert!(rx_export.recv_timeout(Duration::from_secs(5)).is_ok());
        let _result = processor.shutdown();
    }

    #[test]
    fn simple_span_processor_on_end_skips_export_if_not_sampled() {
        let (exporter, rx_export, _rx_shutdown) = TestExporter::new();
        let processor = SimpleSpanProcessor::new(Box::new(exporter));
        processor.on_end(new_test_export_span_data(false));
        assert!(rx_export.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn simple_span_processor_shutdown_calls_shutdown() {
        let (exporter, _rx_export, rx_shutdown) = TestExporter::new();
        let mut processor = SimpleSpanProcessor::new(Box::new(exporter));
        let _result = processor.shutdown();
        assert!(rx_shutdown.try_recv().is_ok());
    }

    #[test]
    fn batch_config_from_env() {
        temp_env::with_vars(
            [
                (TELETRACE_BSP_MAX_EXPORT_BATCH_SIZE, Some("500")),
                (TELETRACE_BSP_EXPORT_TIMEOUT, Some("2046")),
                (TELETRACE_BSP_SCHEDULE_DELAY, Some("I am not a number")),
            ],
            || {
                let config = BatchConfig::default();
                assert_eq!(config.max_export_batch_size, 500);
                assert_eq!(config.max_export_timeout, Duration::from_millis(2046));
                assert_eq!(
                    config.scheduled_delay,
                    Duration::from_millis(TELETRACE_BSP_SCHEDULE_DELAY_DEFAULT)
                );
                assert_eq!(config.max_queue_size, TELETRACE_BSP_MAX_QUEUE_SIZE_DEFAULT);
            },
        );

        temp_env::with_var(TELETRACE_BSP_MAX_QUEUE_SIZE, Some("120"), || {
            let config = BatchConfig::default();
            // export batch size cannot exceed max queue size
            assert_eq!(config.max_queue_size, 120);
            assert_eq!(config.max_export_batch_size, 120);
        });
    }

    #[test]
    fn batch_processor_batches_by_size() {
        let (exporter, rx_export, _rx_shutdown) = TestExporter::new();
        let mut processor = BatchSpanProcessor::builder(exporter)
            .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
            .with_max_export_batch_size(2)
            .build();

        for _ in 0..2 {
            processor.on_end(new_test_export_span_data(true));
        }

        let batch = rx_export
            .recv_timeout(Duration::from_secs(5))
            .expect("batch should be exported when it fills up");
        assert_eq!(batch.len(), 2);

        let _result = processor.shutdown();
    }

    #[test]
    fn batch_processor_flush_exports_partial_batch() {
        let (exporter, rx_export, rx_shutdown) = TestExporter::new();
        let mut processor = BatchSpanProcessor::builder(exporter)
            .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
            .build();

        processor.on_end(new_test_export_span_data(true));
        processor.force_flush().expect("flush must succeed");

        let batch = rx_export
            .recv_timeout(Duration::from_secs(5))
            .expect("flush should push the partial batch out");
        assert_eq!(batch.len(), 1);

        processor.shutdown().expect("shutdown must succeed");
        assert!(rx_shutdown.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn batch_processor_counts_dropped_spans() {
        let (exporter, _rx_export, started_rx, release_tx) = TestExporter::gated();
        let queue_size = 4;
        let extra = 3;
        let processor = BatchSpanProcessor::builder(exporter)
            .with_scheduled_delay(Duration::from_secs(60 * 60 * 24))
            .with_max_queue_size(queue_size)
            .with_max_export_batch_size(1)
            .build();

        // The first span fills a batch of one, sending the worker into the
        // exporter where it parks on the gate.
        processor.on_end(new_test_export_span_data(true));
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should begin exporting");

        // With the worker parked, the queue holds exactly `queue_size`
        // spans; everything after that must be dropped and counted.
        for _ in 0..queue_size {
            processor.on_end(new_test_export_span_data(true));
        }
        assert_eq!(processor.dropped_spans(), 0);

        for _ in 0..extra {
            processor.on_end(new_test_export_span_data(true));
        }
        assert_eq!(processor.dropped_spans(), extra);

        // Unblock the worker so it can drain and exit cleanly.
        drop(release_tx);
    }
}
