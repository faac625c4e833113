use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    chunks_indexed: AtomicU64,
    rows_extracted: AtomicU64,
    snapshots_written: AtomicU64,
    processing_failures: AtomicU64,
    last_chunk_count: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record rows returned by table extraction.
    pub fn record_rows(&self, rows: u64) {
        self.rows_extracted.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record snapshot writes (primary and derived).
    pub fn record_snapshots(&self, count: u64) {
        self.snapshots_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a background unit that ended in error.
    pub fn record_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_chunk_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            rows_extracted: self.rows_extracted.load(Ordering::Relaxed),
            snapshots_written: self.snapshots_written.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            last_chunk_count: (self.documents_processed.load(Ordering::Relaxed) > 0)
                .then_some(last),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed the pipeline since startup.
    pub documents_processed: u64,
    /// Chunks sent to the vector index.
    pub chunks_indexed: u64,
    /// Table rows extracted across all table types.
    pub rows_extracted: u64,
    /// Snapshot writes, primary and derived.
    pub snapshots_written: u64,
    /// Background units that ended in error.
    pub processing_failures: u64,
    /// Chunk count of the most recent document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
}
