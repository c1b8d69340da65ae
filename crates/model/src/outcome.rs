use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Error classification shared across the pipeline. These are kinds, not
/// concrete error types: each crate keeps its own `thiserror` enums and maps
/// them onto a kind when an outcome is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigInvalid,
    SourceUnavailable,
    QueryRejected,
    Transient,
    UploadFailed,
    StateCorrupt,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::QueryRejected => "QueryRejected",
            ErrorKind::Transient => "Transient",
            ErrorKind::UploadFailed => "UploadFailed",
            ErrorKind::StateCorrupt => "StateCorrupt",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer records than `min_records_for_upload`; nothing was shipped and
    /// the watermark did not move.
    LowVolume,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::LowVolume => f.write_str("low_volume"),
        }
    }
}

/// Terminal result of one mapping within a run.
#[derive(Debug, Clone)]
pub enum MappingOutcome {
    Succeeded {
        records: u64,
        batches: u64,
        bytes: u64,
        duration: Duration,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        records_uploaded_before_failure: u64,
    },
}

impl MappingOutcome {
    /// Succeeded and cleanly-skipped mappings both count as clean for the
    /// run's exit status.
    pub fn is_clean(&self) -> bool {
        !matches!(self, MappingOutcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MappingOutcome::Failed {
                kind: ErrorKind::Cancelled,
                ..
            }
        )
    }
}

impl fmt::Display for MappingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingOutcome::Succeeded {
                records,
                batches,
                bytes,
                duration,
            } => write!(
                f,
                "ok ({records} records, {batches} batches, {bytes} bytes, {:.2}s)",
                duration.as_secs_f64()
            ),
            MappingOutcome::Skipped { reason } => write!(f, "skipped ({reason})"),
            MappingOutcome::Failed { kind, message, .. } => write!(f, "failed: {kind}: {message}"),
        }
    }
}

/// Aggregated result of one invocation of the runner, keyed by mapping id.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: BTreeMap<String, MappingOutcome>,
}

impl RunReport {
    pub fn record(&mut self, mapping_id: impl Into<String>, outcome: MappingOutcome) {
        self.outcomes.insert(mapping_id.into(), outcome);
    }

    pub fn all_clean(&self) -> bool {
        self.outcomes.values().all(MappingOutcome::is_clean)
    }

    pub fn any_cancelled(&self) -> bool {
        self.outcomes.values().any(MappingOutcome::is_cancelled)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_clean()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_counts_as_clean() {
        let mut report = RunReport::default();
        report.record(
            "a",
            MappingOutcome::Skipped {
                reason: SkipReason::LowVolume,
            },
        );
        assert!(report.all_clean());
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn failure_flips_the_run_status() {
        let mut report = RunReport::default();
        report.record(
            "a",
            MappingOutcome::Succeeded {
                records: 10,
                batches: 1,
                bytes: 100,
                duration: Duration::from_secs(1),
            },
        );
        report.record(
            "b",
            MappingOutcome::Failed {
                kind: ErrorKind::SourceUnavailable,
                message: "connection refused".into(),
                records_uploaded_before_failure: 0,
            },
        );
        assert!(!report.all_clean());
        assert_eq!(report.failed_count(), 1);
        assert!(!report.any_cancelled());
    }
}
