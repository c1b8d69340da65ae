use crate::error::SyncError;
use connectors::logfile::LaravelLogSource;
use connectors::source::DataSource;
use connectors::sql::mysql::MySqlSource;
use connectors::sql::postgres::PostgresSource;
use connectors::sql::query::SqlQueryPlan;
use engine_config::secrets::SecretResolver;
use model::mapping::{Mapping, SourceConfig};
use model::watermark::Watermark;

/// Builds the source for one mapping, resolving its credential reference.
/// The resolved plaintext lives only inside the returned source.
pub async fn create_source(
    mapping: &Mapping,
    secrets: &dyn SecretResolver,
    resume: Watermark,
    inclusive: bool,
) -> Result<Box<dyn DataSource>, SyncError> {
    let watermark_column = mapping.watermark_column().map(str::to_string);

    match &mapping.source {
        SourceConfig::Mysql(config) => {
            let password = secrets.resolve(&config.secret_ref).await?;
            Ok(Box::new(MySqlSource::new(
                config.clone(),
                password,
                SqlQueryPlan::from_mapping(mapping),
                watermark_column,
                resume,
                inclusive,
            )))
        }
        SourceConfig::Postgres(config) => {
            let password = secrets.resolve(&config.secret_ref).await?;
            Ok(Box::new(PostgresSource::new(
                config.clone(),
                password,
                SqlQueryPlan::from_mapping(mapping),
                watermark_column,
                resume,
                inclusive,
            )))
        }
        SourceConfig::LaravelLog(config) => Ok(Box::new(LaravelLogSource::new(
            config.clone(),
            mapping.transfer.batch_size,
            resume,
        ))),
    }
}
