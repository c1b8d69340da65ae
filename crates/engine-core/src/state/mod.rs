pub mod json_store;
pub mod models;

use async_trait::async_trait;
use models::RunState;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable per-mapping sync state. Commits are atomic and linearized per
/// mapping: concurrent tasks never share a mapping id, and the backing file
/// is serialized by a single in-process lock.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state for one mapping, empty on first sight.
    async fn load(&self, mapping_id: &str) -> Result<RunState, StateError>;

    /// Atomically replaces the state for one mapping.
    async fn commit(&self, mapping_id: &str, state: RunState) -> Result<(), StateError>;

    /// `--force` semantics: zeroes the watermark and clears the last error,
    /// leaving other mappings untouched. Returns the reset state.
    async fn reset(&self, mapping_id: &str) -> Result<RunState, StateError>;

    async fn all(&self) -> Result<BTreeMap<String, RunState>, StateError>;
}
