use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_read: AtomicU64,
    records_written: AtomicU64,
    records_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    batches: AtomicU64,
    artifacts: AtomicU64,
    retries_attempted: AtomicU64,
    retries_exhausted: AtomicU64,
    skipped_low_volume: AtomicU64,
}

/// In-process counters accumulated per mapping and aggregated per run.
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_written: u64,
    pub records_uploaded: u64,
    pub bytes_uploaded: u64,
    pub batches: u64,
    pub artifacts: u64,
    pub retries_attempted: u64,
    pub retries_exhausted: u64,
    pub skipped_low_volume: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn add_records_read(&self, count: u64) {
        self.inner.records_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_records_written(&self, count: u64) {
        self.inner
            .records_written
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_records_uploaded(&self, count: u64) {
        self.inner
            .records_uploaded
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_bytes_uploaded(&self, count: u64) {
        self.inner.bytes_uploaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_batch(&self) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_artifacts(&self, count: u64) {
        self.inner.artifacts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_retry_attempted(&self) {
        self.inner
            .retries_attempted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_retry_exhausted(&self) {
        self.inner
            .retries_exhausted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped_low_volume(&self) {
        self.inner
            .skipped_low_volume
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Folds another sink into this one; used to aggregate mapping-level
    /// counters into the run total.
    pub fn absorb(&self, snapshot: MetricsSnapshot) {
        self.inner
            .records_read
            .fetch_add(snapshot.records_read, Ordering::Relaxed);
        self.inner
            .records_written
            .fetch_add(snapshot.records_written, Ordering::Relaxed);
        self.inner
            .records_uploaded
            .fetch_add(snapshot.records_uploaded, Ordering::Relaxed);
        self.inner
            .bytes_uploaded
            .fetch_add(snapshot.bytes_uploaded, Ordering::Relaxed);
        self.inner
            .batches
            .fetch_add(snapshot.batches, Ordering::Relaxed);
        self.inner
            .artifacts
            .fetch_add(snapshot.artifacts, Ordering::Relaxed);
        self.inner
            .retries_attempted
            .fetch_add(snapshot.retries_attempted, Ordering::Relaxed);
        self.inner
            .retries_exhausted
            .fetch_add(snapshot.retries_exhausted, Ordering::Relaxed);
        self.inner
            .skipped_low_volume
            .fetch_add(snapshot.skipped_low_volume, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.inner.records_read.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            records_uploaded: self.inner.records_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.inner.bytes_uploaded.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            artifacts: self.inner.artifacts.load(Ordering::Relaxed),
            retries_attempted: self.inner.retries_attempted.load(Ordering::Relaxed),
            retries_exhausted: self.inner.retries_exhausted.load(Ordering::Relaxed),
            skipped_low_volume: self.inner.skipped_low_volume.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_snapshot() {
        let metrics = Metrics::new();
        metrics.add_records_read(10);
        metrics.add_records_uploaded(10);
        metrics.add_bytes_uploaded(2048);
        metrics.add_batch();
        metrics.add_artifacts(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.records_read, 10);
        assert_eq!(snap.records_uploaded, 10);
        assert_eq!(snap.bytes_uploaded, 2048);
        assert_eq!(snap.batches, 1);
        assert_eq!(snap.artifacts, 2);
    }

    #[test]
    fn absorb_merges_mapping_counters_into_the_run() {
        let mapping = Metrics::new();
        mapping.add_records_read(5);
        mapping.add_retry_attempted();

        let run = Metrics::new();
        run.add_records_read(1);
        run.absorb(mapping.snapshot());

        let snap = run.snapshot();
        assert_eq!(snap.records_read, 6);
        assert_eq!(snap.retries_attempted, 1);
    }
}
