use crate::upload::UploadError;
use connectors::error::SourceError;
use engine_config::error::ConfigError;
use engine_core::state::StateError;
use model::outcome::ErrorKind;
use thiserror::Error;

/// Top-level error for one mapping's sync pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Maps the concrete error onto the taxonomy recorded in outcomes and
    /// surfaced to the operator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Source(err) => match err {
                SourceError::Unavailable(_) => ErrorKind::SourceUnavailable,
                SourceError::Transient(_) => ErrorKind::Transient,
                SourceError::QueryRejected(_)
                | SourceError::SchemaDrift(_)
                | SourceError::Unsupported(_) => ErrorKind::QueryRejected,
            },
            SyncError::Config(_) => ErrorKind::ConfigInvalid,
            SyncError::State(_) => ErrorKind::StateCorrupt,
            SyncError::Upload(err) => match err {
                UploadError::Transient(_) => ErrorKind::Transient,
                _ => ErrorKind::UploadFailed,
            },
            SyncError::Io(_) | SyncError::Json(_) => ErrorKind::Transient,
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
