use engine_config::error::ConfigError;
use engine_core::state::StateError;
use engine_runtime::error::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("sync run could not start: {0}")]
    Sync(#[from] SyncError),

    #[error("specify --all or at least one --mapping <id>")]
    NothingSelected,

    #[error("connection test failed: {0}")]
    TestConn(String),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// `3` configuration error, `4` no mappings matched, `1` anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(ConfigError::UnknownMapping(_))
            | CliError::Config(ConfigError::NoMappings) => 4,
            CliError::Config(_) | CliError::State(_) | CliError::NothingSelected => 3,
            CliError::Sync(_) => 3,
            CliError::TestConn(_) | CliError::Json(_) => 1,
        }
    }
}
