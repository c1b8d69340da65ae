use thiserror::Error;

/// All errors coming out of a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Cannot reach the source at all: TCP refused, auth failed, file missing.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source rejected the query: SQL error, missing column, permission
    /// denied. Never retried.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// The column set changed between batches of one run.
    #[error("schema drift: {0}")]
    SchemaDrift(String),

    /// Mid-stream disconnects and timeouts. Retried locally before
    /// surfacing.
    #[error("transient source failure: {0}")]
    Transient(String),

    /// The source does not implement the requested capability.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }

    /// Classifies a driver error raised while executing a query.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => SourceError::QueryRejected(db.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                SourceError::QueryRejected(err.to_string())
            }
            sqlx::Error::Configuration(_) | sqlx::Error::Tls(_) => {
                SourceError::Unavailable(err.to_string())
            }
            _ => SourceError::Transient(err.to_string()),
        }
    }

    /// Classifies a driver error raised while establishing the connection.
    pub fn from_connect(err: sqlx::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}
