use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

fn default_batch_size() -> usize {
    5000
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_max_memory_mb() -> u64 {
    50
}

/// Extraction strategy for a mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalMode {
    #[default]
    Full,
    IncrementalPk,
    IncrementalTimestamp,
}

/// Connection parameters for a relational source. The password is never
/// stored in the mapping file; `secret_ref` names an entry in the external
/// secret store, resolved at run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalSource {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    pub secret_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileSource {
    pub path: PathBuf,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
}

/// Closed variant over the supported source kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Mysql(RelationalSource),
    Postgres(RelationalSource),
    LaravelLog(LogFileSource),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Mysql(_) => "mysql",
            SourceConfig::Postgres(_) => "postgres",
            SourceConfig::LaravelLog(_) => "laravel_log",
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            SourceConfig::Mysql(_) => Some(3306),
            SourceConfig::Postgres(_) => Some(5432),
            SourceConfig::LaravelLog(_) => None,
        }
    }
}

/// Guard clause for `delete_after_upload`. Deletion is refused outright when
/// `enabled` is false, whatever the rest of the mapping says.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteSafety {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub where_column: Option<String>,
}

/// Transfer tuning for one mapping. Watermark columns live here rather than
/// next to the table name so that custom-query mappings can still run
/// incrementally, matching the original mapping file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub min_records_for_upload: u64,
    #[serde(default)]
    pub incremental_mode: IncrementalMode,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub timestamp_column: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub delete_after_upload: bool,
    #[serde(default)]
    pub delete_safety: DeleteSafety,
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings {
            batch_size: default_batch_size(),
            max_file_size_mb: default_max_file_size_mb(),
            retry_attempts: default_retry_attempts(),
            min_records_for_upload: 0,
            incremental_mode: IncrementalMode::Full,
            primary_key: None,
            timestamp_column: None,
            order_by: None,
            delete_after_upload: false,
            delete_safety: DeleteSafety::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping '{0}': exactly one of `query` or `table` must be set")]
    QuerySourceAmbiguous(String),

    #[error("mapping '{0}': batch_size must be at least 1")]
    BatchSizeZero(String),

    #[error("mapping '{0}': incremental_pk requires a non-empty `primary_key`")]
    MissingPrimaryKey(String),

    #[error("mapping '{0}': incremental_timestamp requires a non-empty `timestamp_column`")]
    MissingTimestampColumn(String),

    #[error("mapping '{0}': log sources only support full or offset-based extraction")]
    LogSourceMode(String),
}

/// Declarative unit describing one source table/log and one remote schema
/// slug. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub schema_slug: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub transfer: TransferSettings,
}

impl Mapping {
    /// Well-formedness per the data model: exactly one of `query`/`table`,
    /// a positive batch size, and a watermark column matching the mode.
    pub fn validate(&self) -> Result<(), MappingError> {
        let is_log = matches!(self.source, SourceConfig::LaravelLog(_));

        if !is_log && self.query.is_some() == self.table.is_some() {
            return Err(MappingError::QuerySourceAmbiguous(self.id.clone()));
        }
        if self.transfer.batch_size < 1 {
            return Err(MappingError::BatchSizeZero(self.id.clone()));
        }

        match self.transfer.incremental_mode {
            IncrementalMode::Full => {}
            IncrementalMode::IncrementalPk => {
                if is_log {
                    return Err(MappingError::LogSourceMode(self.id.clone()));
                }
                if self
                    .transfer
                    .primary_key
                    .as_deref()
                    .map_or(true, str::is_empty)
                {
                    return Err(MappingError::MissingPrimaryKey(self.id.clone()));
                }
            }
            IncrementalMode::IncrementalTimestamp => {
                if is_log {
                    return Err(MappingError::LogSourceMode(self.id.clone()));
                }
                if self
                    .transfer
                    .timestamp_column
                    .as_deref()
                    .map_or(true, str::is_empty)
                {
                    return Err(MappingError::MissingTimestampColumn(self.id.clone()));
                }
            }
        }

        Ok(())
    }

    /// The column whose maximum drives the tentative watermark, if any.
    pub fn watermark_column(&self) -> Option<&str> {
        match self.transfer.incremental_mode {
            IncrementalMode::Full => None,
            IncrementalMode::IncrementalPk => self.transfer.primary_key.as_deref(),
            IncrementalMode::IncrementalTimestamp => self.transfer.timestamp_column.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_mapping() -> Mapping {
        Mapping {
            id: "users".into(),
            schema_slug: "users-v1".into(),
            source: SourceConfig::Mysql(RelationalSource {
                host: "localhost".into(),
                port: None,
                database: "app".into(),
                user: "sync".into(),
                secret_ref: "app-db".into(),
            }),
            query: None,
            table: Some("users".into()),
            transfer: TransferSettings::default(),
        }
    }

    #[test]
    fn table_mapping_with_defaults_is_valid() {
        let mapping = base_mapping();
        mapping.validate().unwrap();
        assert_eq!(mapping.transfer.batch_size, 5000);
    }

    #[test]
    fn query_and_table_together_are_rejected() {
        let mut mapping = base_mapping();
        mapping.query = Some("SELECT * FROM users".into());
        assert!(matches!(
            mapping.validate(),
            Err(MappingError::QuerySourceAmbiguous(_))
        ));
    }

    #[test]
    fn neither_query_nor_table_is_rejected() {
        let mut mapping = base_mapping();
        mapping.table = None;
        assert!(matches!(
            mapping.validate(),
            Err(MappingError::QuerySourceAmbiguous(_))
        ));
    }

    #[test]
    fn incremental_pk_requires_primary_key() {
        let mut mapping = base_mapping();
        mapping.transfer.incremental_mode = IncrementalMode::IncrementalPk;
        assert!(matches!(
            mapping.validate(),
            Err(MappingError::MissingPrimaryKey(_))
        ));

        mapping.transfer.primary_key = Some("id".into());
        mapping.validate().unwrap();
        assert_eq!(mapping.watermark_column(), Some("id"));
    }

    #[test]
    fn batch_size_zero_is_rejected() {
        let mut mapping = base_mapping();
        mapping.transfer.batch_size = 0;
        assert!(matches!(
            mapping.validate(),
            Err(MappingError::BatchSizeZero(_))
        ));
    }

    #[test]
    fn unknown_fields_in_mapping_json_are_ignored() {
        let raw = r#"{
            "id": "users",
            "schema_slug": "users-v1",
            "source": {"type": "mysql", "host": "h", "database": "d", "user": "u", "secret_ref": "s"},
            "table": "users",
            "legacy_flag": true,
            "transfer": {"batch_size": 10, "unknown_knob": 3}
        }"#;
        let mapping: Mapping = serde_json::from_str(raw).unwrap();
        assert_eq!(mapping.transfer.batch_size, 10);
        mapping.validate().unwrap();
    }
}
