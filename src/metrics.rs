use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters, exposed at `/metrics`.
#[derive(Clone, Debug)]
pub struct Metrics {
    pub walks: Arc<AtomicUsize>,
    pub files_hashed: Arc<AtomicU64>,
    pub bytes_hashed: Arc<AtomicU64>,
    pub statements_executed: Arc<AtomicU64>,
    pub statement_failures: Arc<AtomicU64>,
    pub extensions_loaded: Arc<AtomicUsize>,
    pub extensions_skipped: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            walks: Arc::new(AtomicUsize::new(0)),
            files_hashed: Arc::new(AtomicU64::new(0)),
            bytes_hashed: Arc::new(AtomicU64::new(0)),
            statements_executed: Arc::new(AtomicU64::new(0)),
            statement_failures: Arc::new(AtomicU64::new(0)),
            extensions_loaded: Arc::new(AtomicUsize::new(0)),
            extensions_skipped: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_walks(&self) {
        self.walks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one hashed file of `bytes` length.
    pub fn add_hashed(&self, bytes: u64) {
        self.files_hashed.fetch_add(1, Ordering::Relaxed);
        self.bytes_hashed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_statements_executed(&self) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_statement_failures(&self) {
        self.statement_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_extensions(&self, loaded: usize, skipped: usize) {
        self.extensions_loaded.fetch_add(loaded, Ordering::Relaxed);
        self.extensions_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            walks: self.walks.load(Ordering::Relaxed),
            files_hashed: self.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statement_failures: self.statement_failures.load(Ordering::Relaxed),
            extensions_loaded: self.extensions_loaded.load(Ordering::Relaxed),
            extensions_skipped: self.extensions_skipped.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub walks: usize,
    pub files_hashed: u64,
    pub bytes_hashed: u64,
    pub statements_executed: u64,
    pub statement_failures: u64,
    pub extensions_loaded: usize,
    pub extensions_skipped: usize,
    pub uptime_seconds: u64,
}
