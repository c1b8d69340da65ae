use model::mapping::MappingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("no mapping matches '{0}'")]
    UnknownMapping(String),

    #[error("no mappings are configured")]
    NoMappings,

    #[error("could not determine the configuration root directory")]
    NoConfigRoot,

    #[error("secret '{0}' could not be resolved: {1}")]
    SecretUnresolved(String, String),

    #[error("control plane is not configured: {0}")]
    ApiUnconfigured(String),
}

impl ConfigError {
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn parse(path: impl std::fmt::Display, source: serde_json::Error) -> Self {
        ConfigError::Parse {
            path: path.to_string(),
            source,
        }
    }
}
