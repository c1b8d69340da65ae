use crate::error::SyncError;
use crate::execution::worker::{self, WorkerContext};
use crate::scratch::clear_scratch;
use engine_core::metrics::Metrics;
use model::mapping::Mapping;
use model::outcome::{ErrorKind, MappingOutcome, RunReport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

/// Worker pool ceiling when the operator does not pick a parallelism.
pub const DEFAULT_MAX_PARALLELISM: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub parallelism: Option<usize>,
    pub sequential: bool,
    pub batch_size_override: Option<usize>,
}

impl RunOptions {
    fn effective_parallelism(&self, mapping_count: usize) -> usize {
        if self.sequential {
            return 1;
        }
        self.parallelism
            .unwrap_or_else(|| mapping_count.min(DEFAULT_MAX_PARALLELISM))
            .max(1)
    }
}

/// Runs every mapping to completion and aggregates the outcomes.
///
/// Mappings are dispatched as independent tasks over a bounded pool; a
/// failing mapping never aborts the others, and the report is returned only
/// after the last task has terminated. Cancellation reaches tasks through
/// the context's token and takes effect at batch boundaries.
pub async fn run(
    mut mappings: Vec<Mapping>,
    options: RunOptions,
    template: WorkerContext,
) -> Result<RunReport, SyncError> {
    clear_scratch(&template.scratch_dir)?;

    if let Some(batch_size) = options.batch_size_override {
        for mapping in &mut mappings {
            mapping.transfer.batch_size = batch_size;
        }
    }

    let parallelism = options.effective_parallelism(mappings.len());
    let ctx = WorkerContext {
        dry_run: options.dry_run,
        force: options.force,
        ..template
    };

    info!(
        mappings = mappings.len(),
        parallelism,
        dry_run = ctx.dry_run,
        "starting sync run"
    );

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let run_metrics = Metrics::new();
    let mut join_set = JoinSet::new();
    let mut task_names: HashMap<tokio::task::Id, String> = HashMap::new();

    for mapping in mappings {
        let semaphore = semaphore.clone();
        let ctx = ctx.clone();
        let run_metrics = run_metrics.clone();
        let mapping_id = mapping.id.clone();

        let handle = join_set.spawn({
            let mapping_id = mapping_id.clone();
            async move {
                let _permit = semaphore.acquire_owned().await;
                let metrics = Metrics::new();
                let outcome = worker::sync_mapping(mapping, ctx, metrics.clone()).await;
                run_metrics.absorb(metrics.snapshot());
                (mapping_id, outcome)
            }
        });
        // keep the name around so a panicked task can still be attributed
        task_names.insert(handle.id(), mapping_id);
    }

    let mut report = RunReport::default();
    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((task_id, (mapping_id, outcome))) => {
                task_names.remove(&task_id);
                report.record(mapping_id, outcome);
            }
            Err(join_err) => {
                let mapping_id = task_names
                    .remove(&join_err.id())
                    .unwrap_or_else(|| "unknown".to_string());
                report.record(
                    mapping_id,
                    MappingOutcome::Failed {
                        kind: ErrorKind::Transient,
                        message: format!("task aborted: {join_err}"),
                        records_uploaded_before_failure: 0,
                    },
                );
            }
        }
    }

    let totals = run_metrics.snapshot();
    info!(
        records_uploaded = totals.records_uploaded,
        bytes = totals.bytes_uploaded,
        retries = totals.retries_attempted,
        failed = report.failed_count(),
        "sync run complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{
        NotifyOutcome, NotifyRequest, TokenRequest, UploadError, UploadToken, UploadTransport,
    };
    use async_trait::async_trait;
    use engine_config::secrets::EnvSecretResolver;
    use engine_core::state::json_store::JsonStateStore;
    use engine_core::state::StateStore;
    use model::mapping::{
        LogFileSource, RelationalSource, SourceConfig, TransferSettings,
    };
    use std::io::Write;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    struct AckTransport;

    #[async_trait]
    impl UploadTransport for AckTransport {
        async fn request_token(
            &self,
            _slug: &str,
            _request: &TokenRequest,
        ) -> Result<UploadToken, UploadError> {
            Ok(UploadToken {
                upload_url: "https://store.example/obj".into(),
                method: "PUT".into(),
                headers: Default::default(),
                expires_at: None,
            })
        }

        async fn put_object(
            &self,
            _token: &UploadToken,
            _artifact: &Path,
            _content_length: u64,
        ) -> Result<(), UploadError> {
            Ok(())
        }

        async fn notify(
            &self,
            _slug: &str,
            _request: &NotifyRequest,
        ) -> Result<NotifyOutcome, UploadError> {
            Ok(NotifyOutcome::Acknowledged)
        }
    }

    fn log_mapping(id: &str, path: &Path) -> Mapping {
        Mapping {
            id: id.into(),
            schema_slug: format!("{id}-v1"),
            source: SourceConfig::LaravelLog(LogFileSource {
                path: path.to_path_buf(),
                max_memory_mb: 1,
            }),
            query: None,
            table: None,
            transfer: TransferSettings::default(),
        }
    }

    fn unreachable_mysql_mapping(id: &str) -> Mapping {
        Mapping {
            id: id.into(),
            schema_slug: format!("{id}-v1"),
            source: SourceConfig::Mysql(RelationalSource {
                host: "127.0.0.1".into(),
                port: Some(1),
                database: "app".into(),
                user: "sync".into(),
                secret_ref: "BRIDGE_TEST_DB_PASSWORD".into(),
            }),
            query: None,
            table: Some("users".into()),
            transfer: TransferSettings::default(),
        }
    }

    struct Harness {
        _root: tempfile::TempDir,
        _log: tempfile::NamedTempFile,
        template: WorkerContext,
        log_path: std::path::PathBuf,
    }

    fn harness() -> Harness {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("uploads");
        std::fs::create_dir_all(&scratch).unwrap();

        let mut log = tempfile::NamedTempFile::new().unwrap();
        log.write_all(
            concat!(
                "[2025-11-19 23:25:20] local.INFO: one  \n",
                "[2025-11-19 23:25:21] local.INFO: two  \n",
                "[2025-11-19 23:25:22] local.INFO: three\n",
            )
            .as_bytes(),
        )
        .unwrap();

        let template = WorkerContext {
            state: std::sync::Arc::new(
                JsonStateStore::open(root.path().join("state").join("sync_state.json")).unwrap(),
            ),
            secrets: std::sync::Arc::new(EnvSecretResolver),
            transport: Some(std::sync::Arc::new(AckTransport)),
            scratch_dir: scratch,
            cancel: CancellationToken::new(),
            dry_run: false,
            force: false,
        };
        let log_path = log.path().to_path_buf();

        Harness {
            _root: root,
            _log: log,
            template,
            log_path,
        }
    }

    #[tokio::test]
    async fn empty_mapping_set_yields_an_empty_report() {
        let harness = harness();
        let report = run(Vec::new(), RunOptions::default(), harness.template)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.all_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_mapping_does_not_poison_the_others() {
        std::env::set_var("BRIDGE_TEST_DB_PASSWORD", "pw");
        let harness = harness();

        let mappings = vec![
            log_mapping("app-log", &harness.log_path),
            unreachable_mysql_mapping("dead-db"),
        ];
        let report = run(mappings, RunOptions::default(), harness.template.clone())
            .await
            .unwrap();

        assert!(matches!(
            report.outcomes.get("app-log"),
            Some(MappingOutcome::Succeeded { records: 3, .. })
        ));
        assert!(matches!(
            report.outcomes.get("dead-db"),
            Some(MappingOutcome::Failed {
                kind: ErrorKind::SourceUnavailable,
                ..
            })
        ));
        assert!(!report.all_clean());
        assert_eq!(report.failed_count(), 1);

        // the failing mapping's state carries the error kind; the healthy
        // one advanced normally
        let failed_state = harness.template.state.load("dead-db").await.unwrap();
        assert_eq!(failed_state.last_error.as_deref(), Some("SourceUnavailable"));
        let ok_state = harness.template.state.load("app-log").await.unwrap();
        assert!(ok_state.last_success_at.is_some());
    }

    #[tokio::test]
    async fn batch_size_override_reshapes_batches() {
        let harness = harness();
        let options = RunOptions {
            batch_size_override: Some(2),
            ..RunOptions::default()
        };

        let report = run(
            vec![log_mapping("app-log", &harness.log_path)],
            options,
            harness.template,
        )
        .await
        .unwrap();

        assert!(matches!(
            report.outcomes.get("app-log"),
            Some(MappingOutcome::Succeeded {
                records: 3,
                batches: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn stale_scratch_files_are_cleared_at_run_start() {
        let harness = harness();
        let stale = harness.template.scratch_dir.join("old.1.0.jsonl.gz");
        std::fs::write(&stale, b"debris").unwrap();

        run(Vec::new(), RunOptions::default(), harness.template)
            .await
            .unwrap();
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancelled_outcomes() {
        let harness = harness();
        harness.template.cancel.cancel();

        let report = run(
            vec![log_mapping("app-log", &harness.log_path)],
            RunOptions::default(),
            harness.template,
        )
        .await
        .unwrap();

        assert!(report.any_cancelled());
    }
}
