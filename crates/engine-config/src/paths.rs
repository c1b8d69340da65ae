use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Filesystem layout under the agent's configuration root (`.bridge` in the
/// user's home directory unless `BRIDGE_CONFIG_DIR` overrides it).
#[derive(Debug, Clone)]
pub struct BridgePaths {
    root: PathBuf,
}

impl BridgePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BridgePaths { root: root.into() }
    }

    /// Resolves the default root, honoring the environment override.
    pub fn resolve(override_dir: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(dir) = override_dir {
            return Ok(BridgePaths::new(dir));
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoConfigRoot)?;
        Ok(BridgePaths::new(home.join(".bridge")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mappings_dir(&self) -> PathBuf {
        self.root.join("config").join("mappings")
    }

    pub fn api_config_file(&self) -> PathBuf {
        self.root.join("config").join("api.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state").join("sync_state.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("sync.log")
    }

    /// Ephemeral artifacts live here; the directory is cleared at run start.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("tmp").join("uploads")
    }

    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [
            self.mappings_dir(),
            self.state_file().parent().map(Path::to_path_buf).unwrap_or_default(),
            self.logs_dir(),
            self.scratch_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|err| ConfigError::io(dir.display(), err))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_the_root() {
        let paths = BridgePaths::new("/var/lib/bridge");
        assert_eq!(
            paths.mappings_dir(),
            PathBuf::from("/var/lib/bridge/config/mappings")
        );
        assert_eq!(
            paths.state_file(),
            PathBuf::from("/var/lib/bridge/state/sync_state.json")
        );
        assert_eq!(
            paths.scratch_dir(),
            PathBuf::from("/var/lib/bridge/tmp/uploads")
        );
    }

    #[test]
    fn override_wins_over_home() {
        let paths = BridgePaths::resolve(Some("/tmp/bridge-test")).unwrap();
        assert_eq!(paths.root(), Path::new("/tmp/bridge-test"));
    }

    #[test]
    fn ensure_directories_creates_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let paths = BridgePaths::new(dir.path().join("bridge"));
        paths.ensure_directories().unwrap();

        assert!(paths.mappings_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(paths.scratch_dir().is_dir());
    }
}
