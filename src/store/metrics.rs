//! Store metrics for observability.
//!
//! Tracks page traffic and transaction outcomes for monitoring and tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Store metrics container.
///
/// All counters are atomic for thread-safe access.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Pages appended to the backend.
    pub pages_written: AtomicU64,
    /// Pages read from the backend (cache misses).
    pub pages_read: AtomicU64,
    /// Page loads served by the cache.
    pub cache_hits: AtomicU64,
    /// Committed pages cloned into a write transaction.
    pub cow_clones: AtomicU64,
    /// Pages created from scratch in a write transaction.
    pub pages_created: AtomicU64,
    /// Revisions committed.
    pub revisions_committed: AtomicU64,
    /// Write transactions aborted.
    pub trx_aborted: AtomicU64,
    /// Total bytes written.
    pub bytes_written: AtomicU64,
    /// Total bytes read.
    pub bytes_read: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_pages_written(&self, bytes: u64) {
        self.pages_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_pages_read(&self, bytes: u64) {
        self.pages_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cow_clones(&self) {
        self.cow_clones.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pages_created(&self) {
        self.pages_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_revisions_committed(&self) {
        self.revisions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trx_aborted(&self) {
        self.trx_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_written: self.pages_written.load(Ordering::Relaxed),
            pages_read: self.pages_read.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cow_clones: self.cow_clones.load(Ordering::Relaxed),
            pages_created: self.pages_created.load(Ordering::Relaxed),
            revisions_committed: self.revisions_committed.load(Ordering::Relaxed),
            trx_aborted: self.trx_aborted.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of metrics values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_written: u64,
    pub pages_read: u64,
    pub cache_hits: u64,
    pub cow_clones: u64,
    pub pages_created: u64,
    pub revisions_committed: u64,
    pub trx_aborted: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

impl MetricsSnapshot {
    /// Calculates the difference between two snapshots.
    pub fn diff(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_written: self.pages_written.saturating_sub(other.pages_written),
            pages_read: self.pages_read.saturating_sub(other.pages_read),
            cache_hits: self.cache_hits.saturating_sub(other.cache_hits),
            cow_clones: self.cow_clones.saturating_sub(other.cow_clones),
            pages_created: self.pages_created.saturating_sub(other.pages_created),
            revisions_committed: self.revisions_committed.saturating_sub(other.revisions_committed),
            trx_aborted: self.trx_aborted.saturating_sub(other.trx_aborted),
            bytes_written: self.bytes_written.saturating_sub(other.bytes_written),
            bytes_read: self.bytes_read.saturating_sub(other.bytes_read),
        }
    }

    /// Fraction of page loads served by the cache (0.0 - 1.0).
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.pages_read;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Average pages written per committed revision.
    pub fn pages_per_commit(&self) -> f64 {
        if self.revisions_committed == 0 {
            0.0
        } else {
            self.pages_written as f64 / self.revisions_committed as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Metrics:")?;
        writeln!(f, "  Pages written:    {}", self.pages_written)?;
        writeln!(f, "  Pages read:       {}", self.pages_read)?;
        writeln!(f, "  Cache hits:       {} ({:.1}%)", self.cache_hits, self.cache_hit_rate() * 100.0)?;
        writeln!(f, "  COW clones:       {}", self.cow_clones)?;
        writeln!(f, "  Pages created:    {}", self.pages_created)?;
        writeln!(f, "  Revisions:        {}", self.revisions_committed)?;
        writeln!(f, "  Aborted:          {}", self.trx_aborted)?;
        writeln!(f, "  Bytes written:    {} ({:.2} KB)", self.bytes_written, self.bytes_written as f64 / 1024.0)?;
        writeln!(f, "  Bytes read:       {} ({:.2} KB)", self.bytes_read, self.bytes_read as f64 / 1024.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = StoreMetrics::new();

        metrics.inc_pages_written(100);
        metrics.inc_pages_written(50);
        metrics.inc_cow_clones();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pages_written, 2);
        assert_eq!(snapshot.bytes_written, 150);
        assert_eq!(snapshot.cow_clones, 1);
    }

    #[test]
    fn test_metrics_snapshot_diff() {
        let metrics = StoreMetrics::new();

        metrics.inc_pages_read(10);
        let snap1 = metrics.snapshot();

        metrics.inc_pages_read(10);
        metrics.inc_pages_read(10);
        metrics.inc_cache_hits();
        let snap2 = metrics.snapshot();

        let diff = snap2.diff(&snap1);
        assert_eq!(diff.pages_read, 2);
        assert_eq!(diff.bytes_read, 20);
        assert_eq!(diff.cache_hits, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let snapshot = MetricsSnapshot {
            cache_hits: 75,
            pages_read: 25,
            ..MetricsSnapshot::default()
        };
        assert!((snapshot.cache_hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(MetricsSnapshot::default().pages_per_commit(), 0.0);
    }
}
