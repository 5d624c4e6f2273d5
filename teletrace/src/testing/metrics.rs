//! Metrics testing utilities.
use crate::sdk::export::metrics::{ExportResult, MetricData, MetricExporter};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters and batches observed by an [`InMemoryMetricExporter`].
#[derive(Debug, Default)]
pub struct ExporterStats {
    exports: AtomicUsize,
    shutdowns: AtomicUsize,
    batches: Mutex<Vec<Vec<MetricData>>>,
}

impl ExporterStats {
    /// The number of times `export` has been invoked.
    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    /// The number of times `shutdown` has been invoked.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// A snapshot of every exported batch.
    pub fn batches(&self) -> Vec<Vec<MetricData>> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }
}

/// A metric exporter accumulating everything it receives in memory.
#[derive(Debug)]
pub struct InMemoryMetricExporter {
    stats: Arc<ExporterStats>,
}

impl InMemoryMetricExporter {
    /// Create a new in-memory exporter together with its stats handle.
    pub fn new() -> (InMemoryMetricExporter, Arc<ExporterStats>) {
        let stats = Arc::new(ExporterStats::default());
        (
            InMemoryMetricExporter {
                stats: stats.clone(),
            },
            stats,
        )
    }
}

#[async_trait]
impl MetricExporter for InMemoryMetricExporter {
    async fn export(&mut self, batch: Vec<MetricData>) -> ExportResult {
        self.stats.exports.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut batches) = self.stats.batches.lock() {
            batches.push(batch);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
