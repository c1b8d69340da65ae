pub mod parser;

use crate::error::SourceError;
use crate::source::DataSource;
use async_trait::async_trait;
use model::mapping::LogFileSource;
use model::records::batch::RecordBatch;
use model::watermark::Watermark;
use self::parser::LogRecordBuffer;
use serde_json::Value;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{info, warn};

/// Floor for the chunk size so tiny `max_memory_mb` settings still make
/// forward progress on records longer than the configured budget.
const MIN_CHUNK_BYTES: u64 = 64 * 1024;

/// Streaming extractor for Laravel-style log files.
///
/// The file is read in chunks bounded by `max_memory_mb`; records are split
/// on the `[date] environment.TYPE:` header and a trailing partial record is
/// held back until the next chunk, so no record is ever emitted split. The
/// watermark is the byte offset just past the last fully emitted record; a
/// rotated file (size below the resume offset) restarts from zero.
pub struct LaravelLogSource {
    config: LogFileSource,
    batch_size: usize,
    offset: u64,
    file: Option<File>,
    buffer: LogRecordBuffer,
    eof: bool,
    exhausted: bool,
}

impl LaravelLogSource {
    pub fn new(config: LogFileSource, batch_size: usize, resume: Watermark) -> Self {
        let offset = resume.as_offset().unwrap_or(0);
        LaravelLogSource {
            config,
            batch_size,
            offset,
            file: None,
            buffer: LogRecordBuffer::new(offset),
            eof: false,
            exhausted: false,
        }
    }

    fn chunk_size(&self) -> u64 {
        (self.config.max_memory_mb * 1024 * 1024).max(MIN_CHUNK_BYTES)
    }

    async fn fill_buffer(&mut self) -> Result<(), SourceError> {
        let chunk_size = self.chunk_size();
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("log source is not open".into()))?;

        let mut chunk = vec![0u8; chunk_size as usize];
        let read = file
            .read(&mut chunk)
            .await
            .map_err(|err| SourceError::Transient(format!("log read failed: {err}")))?;

        if read == 0 {
            self.eof = true;
        } else {
            chunk.truncate(read);
            self.buffer.extend(&chunk);
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for LaravelLogSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        let path = &self.config.path;
        let mut file = File::open(path).await.map_err(|err| {
            SourceError::Unavailable(format!("cannot open log file {}: {err}", path.display()))
        })?;

        let metadata = file.metadata().await.map_err(|err| {
            SourceError::Unavailable(format!("cannot stat log file {}: {err}", path.display()))
        })?;

        if metadata.len() < self.offset {
            info!(
                path = %path.display(),
                size = metadata.len(),
                offset = self.offset,
                "log file rotated, restarting from the beginning"
            );
            self.offset = 0;
            self.buffer = LogRecordBuffer::new(0);
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|err| SourceError::Transient(format!("log seek failed: {err}")))?;
        self.file = Some(file);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::new();
        let mut last_end = None;

        while rows.len() < self.batch_size {
            if let Some((record, end_offset)) = self.buffer.take_record() {
                last_end = Some(end_offset);
                rows.push(record);
                continue;
            }
            if self.eof {
                // the trailing block has no following header; at EOF it is a
                // complete record in its own right
                if let Some((record, end_offset)) = self.buffer.take_final_record() {
                    last_end = Some(end_offset);
                    rows.push(record);
                }
                self.exhausted = true;
                break;
            }
            self.fill_buffer().await?;
        }

        match last_end {
            None => Ok(None),
            Some(end) => Ok(Some(RecordBatch::new(rows, Watermark::from_offset(end)))),
        }
    }

    async fn delete_rows(&mut self, _column: &str, _keys: &[Value]) -> Result<u64, SourceError> {
        Err(SourceError::Unsupported(
            "log sources cannot delete uploaded records".into(),
        ))
    }

    async fn close(&mut self) {
        if self.file.take().is_some() && !self.exhausted {
            warn!(path = %self.config.path.display(), "log source closed before exhaustion");
        }
    }
}
