// Run metrics module
//
// Lightweight counters for one query run, logged when the run ends

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Query run metrics
///
/// Uses atomic operations so the worker task can record while the frontend reads.
/// A fresh instance is created per run and summarized with [`log_summary`](Self::log_summary).
#[derive(Debug)]
pub struct RunMetrics {
    /// Page requests that returned a result (including quota errors)
    pub pages_fetched: AtomicU64,

    /// POI records received from the provider
    pub records_received: AtomicU64,

    /// CSV rows written by real-time export
    pub rows_exported: AtomicU64,

    /// Records skipped by the all-fields-empty rule
    pub rows_skipped: AtomicU64,

    /// Export calls that failed
    pub export_failures: AtomicU64,

    /// Times the active API key was replaced
    pub credential_rotations: AtomicUsize,

    /// Regions fetched to the end and marked queried
    pub regions_completed: AtomicUsize,

    /// Regions skipped because their code was unknown
    pub regions_skipped: AtomicUsize,

    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            records_received: AtomicU64::new(0),
            rows_exported: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            export_failures: AtomicU64::new(0),
            credential_rotations: AtomicUsize::new(0),
            regions_completed: AtomicUsize::new(0),
            regions_skipped: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_page(&self, records: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.records_received
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_export(&self, written: usize, skipped: usize) {
        self.rows_exported
            .fetch_add(written as u64, Ordering::Relaxed);
        self.rows_skipped
            .fetch_add(skipped as u64, Ordering::Relaxed);
    }

    pub fn record_export_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.credential_rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_completed(&self) {
        self.regions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_skipped(&self) {
        self.regions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average records per fetched page
    pub fn avg_records_per_page(&self) -> f64 {
        let pages = self.pages_fetched.load(Ordering::Relaxed);
        if pages > 0 {
            self.records_received.load(Ordering::Relaxed) as f64 / pages as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Elapsed: {:.2}s", self.elapsed().as_secs_f64());
        tracing::info!(
            "Regions: {} completed, {} skipped",
            self.regions_completed.load(Ordering::Relaxed),
            self.regions_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Pages: {} fetched, {} records (avg {:.1} per page)",
            self.pages_fetched.load(Ordering::Relaxed),
            self.records_received.load(Ordering::Relaxed),
            self.avg_records_per_page()
        );
        tracing::info!(
            "Export: {} rows written, {} skipped, {} failures",
            self.rows_exported.load(Ordering::Relaxed),
            self.rows_skipped.load(Ordering::Relaxed),
            self.export_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "API key rotations: {}",
            self.credential_rotations.load(Ordering::Relaxed)
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
