use crate::error::SyncError;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use model::records::row::Record;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One compressed line-delimited JSON file on the scratch directory, named
/// `{mapping_id}.{run_id}.{seq}.jsonl.gz`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub seq: u32,
    pub record_count: u64,
    pub uncompressed_bytes: u64,
    /// Compressed size on disk; this is what goes over the wire.
    pub bytes: u64,
}

struct OpenArtifact {
    encoder: GzEncoder<File>,
    path: PathBuf,
    seq: u32,
    record_count: u64,
    uncompressed_bytes: u64,
}

impl OpenArtifact {
    fn finish(self) -> Result<Artifact, SyncError> {
        let file = self.encoder.finish()?;
        let bytes = file.metadata()?.len();
        Ok(Artifact {
            path: self.path,
            seq: self.seq,
            record_count: self.record_count,
            uncompressed_bytes: self.uncompressed_bytes,
            bytes,
        })
    }
}

/// Serializes record batches into gzip NDJSON artifacts.
///
/// The uncompressed byte counter enforces `max_file_size_mb`: a record that
/// would push the current file past the cap closes it and opens `seq + 1`,
/// so one logical batch may span several artifacts. Output is byte-identical
/// for identical input (the gzip header timestamp is zeroed).
pub struct BatchWriter {
    scratch_dir: PathBuf,
    mapping_id: String,
    run_id: u64,
    max_file_bytes: u64,
    next_seq: u32,
}

impl BatchWriter {
    pub fn new(
        scratch_dir: impl Into<PathBuf>,
        mapping_id: impl Into<String>,
        run_id: u64,
        max_file_size_mb: u64,
    ) -> Self {
        BatchWriter {
            scratch_dir: scratch_dir.into(),
            mapping_id: mapping_id.into(),
            run_id,
            max_file_bytes: max_file_size_mb * 1_048_576,
            next_seq: 0,
        }
    }

    fn open_artifact(&mut self) -> Result<OpenArtifact, SyncError> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let filename = format!("{}.{}.{}.jsonl.gz", self.mapping_id, self.run_id, seq);
        let path = self.scratch_dir.join(filename);
        let file = File::create(&path)?;
        let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());

        debug!(path = %path.display(), "opened artifact");
        Ok(OpenArtifact {
            encoder,
            path,
            seq,
            record_count: 0,
            uncompressed_bytes: 0,
        })
    }

    /// Writes one batch, returning the finished artifacts in sequence order.
    pub fn write_batch(&mut self, rows: &[Record]) -> Result<Vec<Artifact>, SyncError> {
        let mut artifacts = Vec::new();
        let mut current: Option<OpenArtifact> = None;

        for record in rows {
            let mut line = record.to_json_line()?;
            line.push('\n');
            let line_bytes = line.as_bytes();

            let over_cap = current.as_ref().is_some_and(|open| {
                open.record_count > 0
                    && open.uncompressed_bytes + line_bytes.len() as u64 > self.max_file_bytes
            });
            if over_cap {
                if let Some(open) = current.take() {
                    artifacts.push(open.finish()?);
                }
            }

            let open = match &mut current {
                Some(open) => open,
                slot => slot.insert(self.open_artifact()?),
            };

            open.encoder.write_all(line_bytes)?;
            open.record_count += 1;
            open.uncompressed_bytes += line_bytes.len() as u64;
        }

        if let Some(open) = current.take() {
            artifacts.push(open.finish()?);
        }
        Ok(artifacts)
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}
