use chrono::{DateTime, Utc};
use model::watermark::Watermark;
use serde::{Deserialize, Serialize};

/// Persisted per-mapping sync state. Created on first run, mutated only by
/// the state store, destroyed only by an explicit `--force` reset.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RunState {
    pub watermark: Watermark,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_run_id: u64,
    pub records_uploaded_total: u64,
    /// Set by a forced reset and cleared on the next committed batch. While
    /// set, the first incremental query uses `>=` on the boundary so the
    /// boundary row is re-emitted once instead of being dropped.
    #[serde(default)]
    pub reset_pending: bool,
}

impl RunState {
    /// Transition applied by `--force`: zero the watermark, clear the error.
    pub fn reset(&mut self) {
        self.watermark = Watermark::empty();
        self.last_error = None;
        self.reset_pending = true;
    }

    /// Records a committed batch. The monotonicity invariant is enforced
    /// here: a commit can never move the watermark backwards.
    pub fn commit_batch(&mut self, watermark: Watermark, records: u64) {
        self.watermark = std::mem::take(&mut self.watermark).max(watermark);
        self.records_uploaded_total += records;
        self.reset_pending = false;
    }

    pub fn finish_success(&mut self, now: DateTime<Utc>) {
        self.last_success_at = Some(now);
        self.last_error = None;
    }

    pub fn finish_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_never_regresses_the_watermark() {
        let mut state = RunState::default();
        state.commit_batch(Watermark::new("100"), 10);
        state.commit_batch(Watermark::new("50"), 5);

        assert_eq!(state.watermark.as_str(), "100");
        assert_eq!(state.records_uploaded_total, 15);
    }

    #[test]
    fn reset_zeroes_watermark_and_clears_error() {
        let mut state = RunState::default();
        state.commit_batch(Watermark::new("9"), 9);
        state.finish_error("boom");

        state.reset();
        assert!(state.watermark.is_empty());
        assert!(state.last_error.is_none());
        assert!(state.reset_pending);

        state.commit_batch(Watermark::new("3"), 3);
        assert!(!state.reset_pending);
    }
}
