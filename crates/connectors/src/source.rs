use crate::error::SourceError;
use async_trait::async_trait;
use engine_core::retry::{RetryDisposition, RetryPolicy};
use model::records::batch::RecordBatch;
use serde_json::Value;
use std::time::Duration;

/// Capability set shared by every source kind.
///
/// A source is a finite, non-restartable producer: `next_batch` yields at most
/// `batch_size` records per call and `None` once the stream is exhausted. The
/// caller drives the pace, so backpressure falls out of not calling
/// `next_batch` until the previous batch has been consumed downstream.
#[async_trait]
pub trait DataSource: Send {
    /// Establishes the connection or opens the file. Called once, before the
    /// first `next_batch`.
    async fn open(&mut self) -> Result<(), SourceError>;

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError>;

    /// Source-side purge used by delete-after-upload. Sources without a
    /// deletion capability return `Unsupported`.
    async fn delete_rows(&mut self, column: &str, keys: &[Value]) -> Result<u64, SourceError>;

    async fn close(&mut self);
}

/// Connect retry: an unreachable source is retried 3 times with 2/4/8 second
/// backoff before it is fatal for the mapping.
pub(crate) fn connect_retry_policy() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_secs(2), Duration::from_secs(8))
}

/// Per-batch retry: transient mid-stream failures are retried 3 times with
/// 1/2/4 second backoff before surfacing.
pub(crate) fn batch_retry_policy() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(4))
}

pub(crate) fn retry_unavailable(err: &SourceError) -> RetryDisposition {
    if matches!(err, SourceError::Unavailable(_)) {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

pub(crate) fn retry_transient(err: &SourceError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}
