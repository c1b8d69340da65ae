use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive ownership of one scratch artifact from creation to deletion.
///
/// Dropping the guard removes the file; `retain` keeps it on disk for
/// post-mortem after an upload failure or cancellation. Cleanup never relies
/// on process shutdown hooks.
pub struct ArtifactGuard {
    path: PathBuf,
    retain: bool,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ArtifactGuard {
            path: path.into(),
            retain: false,
        }
    }

    pub fn retain(&mut self) {
        self.retain = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.retain {
            debug!(path = %self.path.display(), "retaining artifact for post-mortem");
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to remove artifact: {err}");
            }
        }
    }
}

/// Clears leftover artifacts at run start. Artifacts are namespaced by
/// mapping and run id, so anything found here is debris from a previous
/// process.
pub fn clear_scratch(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_guard_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl.gz");
        std::fs::write(&path, b"x").unwrap();

        drop(ArtifactGuard::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn retained_guard_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl.gz");
        std::fs::write(&path, b"x").unwrap();

        let mut guard = ArtifactGuard::new(&path);
        guard.retain();
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn clear_scratch_removes_files_and_tolerates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("uploads");

        clear_scratch(&scratch).unwrap();
        std::fs::write(scratch.join("stale.jsonl.gz"), b"x").unwrap();
        clear_scratch(&scratch).unwrap();

        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
