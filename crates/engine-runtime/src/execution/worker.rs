use crate::error::SyncError;
use crate::execution::factory;
use crate::scratch::ArtifactGuard;
use crate::upload::uploader::Uploader;
use crate::upload::UploadTransport;
use crate::writer::BatchWriter;
use chrono::Utc;
use connectors::source::DataSource;
use engine_config::error::ConfigError;
use engine_config::secrets::SecretResolver;
use engine_core::metrics::Metrics;
use engine_core::state::models::RunState;
use engine_core::state::StateStore;
use model::mapping::Mapping;
use model::outcome::{ErrorKind, MappingOutcome, SkipReason};
use model::records::row::Record;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared dependencies handed to every mapping task. Tasks never share
/// mutable state; everything here is either immutable or internally
/// synchronized.
#[derive(Clone)]
pub struct WorkerContext {
    pub state: Arc<dyn StateStore>,
    pub secrets: Arc<dyn SecretResolver>,
    /// Absent in dry-run mode; a missing transport outside dry-run is a
    /// configuration error.
    pub transport: Option<Arc<dyn UploadTransport>>,
    pub scratch_dir: PathBuf,
    pub cancel: CancellationToken,
    pub dry_run: bool,
    pub force: bool,
}

#[derive(Debug, Default)]
struct PipelineTally {
    records: u64,
    batches: u64,
    bytes: u64,
    skipped_low_volume: bool,
}

/// Runs the full cycle for one mapping: resume watermark, extract, write,
/// upload, commit. Always returns an outcome; errors never cross the task
/// boundary.
pub async fn sync_mapping(mapping: Mapping, ctx: WorkerContext, metrics: Metrics) -> MappingOutcome {
    let started = Instant::now();
    info!(mapping = %mapping.id, source = mapping.source.kind(), "starting sync");

    let mut tally = PipelineTally::default();
    match run_pipeline(&mapping, &ctx, &metrics, &mut tally).await {
        Ok(()) => {
            if tally.batches == 0 && tally.skipped_low_volume {
                MappingOutcome::Skipped {
                    reason: SkipReason::LowVolume,
                }
            } else {
                info!(
                    mapping = %mapping.id,
                    records = tally.records,
                    batches = tally.batches,
                    "sync finished in {:.2}s",
                    started.elapsed().as_secs_f64()
                );
                MappingOutcome::Succeeded {
                    records: tally.records,
                    batches: tally.batches,
                    bytes: tally.bytes,
                    duration: started.elapsed(),
                }
            }
        }
        Err(err) => {
            let kind = err.kind();
            error!(mapping = %mapping.id, %kind, "sync failed: {err}");
            record_failure(&ctx, &mapping.id, kind).await;
            MappingOutcome::Failed {
                kind,
                message: err.to_string(),
                records_uploaded_before_failure: tally.records,
            }
        }
    }
}

async fn record_failure(ctx: &WorkerContext, mapping_id: &str, kind: ErrorKind) {
    match ctx.state.load(mapping_id).await {
        Ok(mut state) => {
            state.finish_error(kind.to_string());
            if let Err(err) = ctx.state.commit(mapping_id, state).await {
                warn!(mapping = mapping_id, "could not persist failure state: {err}");
            }
        }
        Err(err) => warn!(mapping = mapping_id, "could not load state for failure record: {err}"),
    }
}

async fn run_pipeline(
    mapping: &Mapping,
    ctx: &WorkerContext,
    metrics: &Metrics,
    tally: &mut PipelineTally,
) -> Result<(), SyncError> {
    mapping.validate().map_err(ConfigError::from)?;

    let mut run_state = if ctx.force {
        ctx.state.reset(&mapping.id).await?
    } else {
        ctx.state.load(&mapping.id).await?
    };
    run_state.last_run_id += 1;
    let run_id = run_state.last_run_id;
    ctx.state.commit(&mapping.id, run_state.clone()).await?;

    let uploader = if ctx.dry_run {
        None
    } else {
        match &ctx.transport {
            Some(transport) => Some(Uploader::new(
                transport.clone(),
                mapping.transfer.retry_attempts,
                metrics.clone(),
            )),
            None => {
                return Err(
                    ConfigError::ApiUnconfigured("no upload transport available".into()).into(),
                )
            }
        }
    };

    let mut writer = BatchWriter::new(
        &ctx.scratch_dir,
        &mapping.id,
        run_id,
        mapping.transfer.max_file_size_mb,
    );

    let mut source = factory::create_source(
        mapping,
        &*ctx.secrets,
        run_state.watermark.clone(),
        run_state.reset_pending,
    )
    .await?;
    source.open().await?;

    let result = drive_stream(
        mapping,
        ctx,
        metrics,
        tally,
        source.as_mut(),
        &mut writer,
        uploader.as_ref(),
        &mut run_state,
    )
    .await;
    source.close().await;

    result?;
    run_state.finish_success(Utc::now());
    ctx.state.commit(&mapping.id, run_state).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn drive_stream(
    mapping: &Mapping,
    ctx: &WorkerContext,
    metrics: &Metrics,
    tally: &mut PipelineTally,
    source: &mut dyn DataSource,
    writer: &mut BatchWriter,
    uploader: Option<&Uploader>,
    run_state: &mut RunState,
) -> Result<(), SyncError> {
    let min_records = mapping.transfer.min_records_for_upload;
    let mut run_fields: Option<Vec<String>> = None;
    let mut delete_refused = false;

    loop {
        // stop at batch boundaries, never mid-batch
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            next = source.next_batch() => next?,
        };
        let Some(batch) = next else {
            return Ok(());
        };

        let watermark = batch.tentative_watermark.clone();
        metrics.add_batch();
        metrics.add_records_read(batch.len() as u64);

        // the field set is pinned by the first record of the run; later
        // batches are reconciled by injecting nulls
        let rows: Vec<Record> = match &run_fields {
            None => {
                run_fields = batch.rows.first().map(Record::field_names);
                batch.rows
            }
            Some(names) => batch.rows.iter().map(|row| row.align_to(names)).collect(),
        };

        let artifacts = writer.write_batch(&rows)?;
        metrics.add_records_written(rows.len() as u64);
        metrics.add_artifacts(artifacts.len() as u64);

        if (rows.len() as u64) < min_records {
            let _guards: Vec<ArtifactGuard> = artifacts
                .iter()
                .map(|artifact| ArtifactGuard::new(&artifact.path))
                .collect();
            metrics.add_skipped_low_volume();
            tally.skipped_low_volume = true;
            info!(
                mapping = %mapping.id,
                records = rows.len(),
                min = min_records,
                "below the minimum upload threshold, holding back"
            );
            continue;
        }

        match uploader {
            None => {
                for artifact in &artifacts {
                    info!(
                        mapping = %mapping.id,
                        path = %artifact.path.display(),
                        records = artifact.record_count,
                        bytes = artifact.bytes,
                        "dry-run: artifact produced"
                    );
                    drop(ArtifactGuard::new(&artifact.path));
                }
                tally.records += rows.len() as u64;
                tally.batches += 1;
            }
            Some(uploader) => {
                for artifact in &artifacts {
                    let mut guard = ArtifactGuard::new(&artifact.path);
                    match uploader.put(&mapping.schema_slug, artifact, &watermark).await {
                        Ok(receipt) => {
                            metrics.add_records_uploaded(artifact.record_count);
                            metrics.add_bytes_uploaded(receipt.bytes);
                            tally.bytes += receipt.bytes;
                        }
                        Err(err) => {
                            // keep the artifact on disk for post-mortem
                            guard.retain();
                            return Err(err.into());
                        }
                    }
                }

                // every artifact of this batch is acknowledged: the
                // watermark may move now, and only now
                run_state.commit_batch(watermark, rows.len() as u64);
                ctx.state.commit(&mapping.id, run_state.clone()).await?;
                tally.records += rows.len() as u64;
                tally.batches += 1;

                if mapping.transfer.delete_after_upload {
                    purge_uploaded(mapping, source, &rows, &mut delete_refused).await;
                }
            }
        }
    }
}

/// Source-side purge of a committed batch, gated by the safety clause.
/// Deletion failures are logged, never fatal: the records are already
/// delivered.
async fn purge_uploaded(
    mapping: &Mapping,
    source: &mut dyn DataSource,
    rows: &[Record],
    refused: &mut bool,
) {
    let safety = &mapping.transfer.delete_safety;
    if !safety.enabled {
        if !*refused {
            warn!(
                mapping = %mapping.id,
                "delete_after_upload is set but delete_safety is not enabled; refusing to delete"
            );
            *refused = true;
        }
        return;
    }

    let column = safety
        .where_column
        .as_deref()
        .or(mapping.transfer.primary_key.as_deref());
    let Some(column) = column else {
        if !*refused {
            warn!(mapping = %mapping.id, "delete_after_upload has no key column; refusing to delete");
            *refused = true;
        }
        return;
    };

    let keys: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|value| !value.is_null())
        .cloned()
        .collect();
    if keys.is_empty() {
        return;
    }

    match source.delete_rows(column, &keys).await {
        Ok(count) => info!(mapping = %mapping.id, rows = count, "purged uploaded rows from source"),
        Err(err) => error!(mapping = %mapping.id, "delete after upload failed: {err}"),
    }
}
