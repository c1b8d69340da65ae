use crate::state::models::RunState;
use crate::state::{StateError, StateStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::warn;

/// State store backed by a single JSON file.
///
/// Updates go through write-to-temp + rename so a crash mid-write leaves the
/// previous file intact. An unparseable file is quarantined with a
/// `.corrupt.{timestamp}` suffix and replaced by empty state; losing
/// watermarks costs re-extraction, never correctness, because delivery is
/// at-least-once.
pub struct JsonStateStore {
    path: PathBuf,
    states: Mutex<BTreeMap<String, RunState>>,
}

impl JsonStateStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let states = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(states) => states,
                Err(err) => {
                    let quarantine = format!(
                        "{}.corrupt.{}",
                        path.display(),
                        chrono::Utc::now().timestamp()
                    );
                    warn!(
                        path = %path.display(),
                        quarantine = %quarantine,
                        "state file is corrupt, quarantining and starting empty: {err}"
                    );
                    std::fs::rename(&path, &quarantine)?;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StateError::Io(err)),
        };

        Ok(JsonStateStore {
            path,
            states: Mutex::new(states),
        })
    }

    async fn persist(&self, states: &BTreeMap<String, RunState>) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(states)?;
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self, mapping_id: &str) -> Result<RunState, StateError> {
        let states = self.states.lock().await;
        Ok(states.get(mapping_id).cloned().unwrap_or_default())
    }

    async fn commit(&self, mapping_id: &str, state: RunState) -> Result<(), StateError> {
        let mut states = self.states.lock().await;
        states.insert(mapping_id.to_string(), state);
        self.persist(&states).await
    }

    async fn reset(&self, mapping_id: &str) -> Result<RunState, StateError> {
        let mut states = self.states.lock().await;
        let state = states.entry(mapping_id.to_string()).or_default();
        state.reset();
        let reset = state.clone();
        self.persist(&states).await?;
        Ok(reset)
    }

    async fn all(&self) -> Result<BTreeMap<String, RunState>, StateError> {
        Ok(self.states.lock().await.clone())
    }
}
