use crate::error::SourceError;
use crate::source::{batch_retry_policy, connect_retry_policy, retry_transient, retry_unavailable, DataSource};
use crate::sql::query::{Dialect, RenderedQuery, SqlParam, SqlQueryPlan};
use crate::sql::{decode, StreamState};
use async_trait::async_trait;
use engine_core::retry::RetryError;
use model::mapping::RelationalSource;
use model::records::batch::RecordBatch;
use model::records::row::Record;
use model::watermark::Watermark;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::{debug, info};

fn bind_params<'q>(
    mut query: Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Float(f) => query.bind(*f),
            SqlParam::Timestamp(ts) => query.bind(*ts),
            SqlParam::Text(s) => query.bind(s),
        };
    }
    query
}

pub struct PostgresSource {
    config: RelationalSource,
    password: String,
    plan: SqlQueryPlan,
    state: StreamState,
    pool: Option<PgPool>,
}

impl PostgresSource {
    pub fn new(
        config: RelationalSource,
        password: String,
        plan: SqlQueryPlan,
        watermark_column: Option<String>,
        resume: Watermark,
        inclusive: bool,
    ) -> Self {
        let state = StreamState::new(plan.batch_size(), watermark_column, resume, inclusive);
        PostgresSource {
            config,
            password,
            plan,
            state,
            pool: None,
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port.unwrap_or(5432))
            .username(&self.config.user)
            .password(&self.password)
            .database(&self.config.database)
    }

    fn pool(&self) -> Result<&PgPool, SourceError> {
        self.pool
            .as_ref()
            .ok_or_else(|| SourceError::Unavailable("source is not open".into()))
    }

    async fn fetch_page(pool: PgPool, rendered: RenderedQuery) -> Result<Vec<Record>, SourceError> {
        debug!(sql = %rendered.sql, "fetching batch");
        let query = bind_params(sqlx::query(&rendered.sql), &rendered.params);
        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(SourceError::from_sqlx)?;
        Ok(rows.iter().map(decode::postgres_record).collect())
    }
}

#[async_trait]
impl DataSource for PostgresSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        let options = self.connect_options();
        let pool = connect_retry_policy()
            .run(
                || {
                    let options = options.clone();
                    async move {
                        PgPoolOptions::new()
                            .max_connections(1)
                            .connect_with(options)
                            .await
                            .map_err(SourceError::from_connect)
                    }
                },
                retry_unavailable,
            )
            .await
            .map_err(RetryError::into_inner)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(SourceError::from_connect)?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            "connected to Postgres source"
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError> {
        if self.state.exhausted() {
            return Ok(None);
        }
        let pool = self.pool()?.clone();
        let rendered = self.plan.render(
            Dialect::Postgres,
            &self.state.watermark,
            self.state.offset,
            self.state.inclusive,
        );
        let rows = batch_retry_policy()
            .run(
                || {
                    let pool = pool.clone();
                    let rendered = rendered.clone();
                    async move { Self::fetch_page(pool, rendered).await }
                },
                retry_transient,
            )
            .await
            .map_err(RetryError::into_inner)?;
        self.state.finish_batch(rows)
    }

    async fn delete_rows(&mut self, column: &str, keys: &[Value]) -> Result<u64, SourceError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let table = self.plan.table().ok_or_else(|| {
            SourceError::Unsupported("delete-after-upload requires a table mapping".into())
        })?;

        let params = keys
            .iter()
            .map(SqlParam::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        let placeholders: Vec<String> = (0..params.len())
            .map(|idx| Dialect::Postgres.placeholder(idx))
            .collect();
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            Dialect::Postgres.quote_ident(table),
            Dialect::Postgres.quote_ident(column),
            placeholders.join(", ")
        );

        let query = bind_params(sqlx::query(&sql), &params);
        let result = query
            .execute(self.pool()?)
            .await
            .map_err(SourceError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }
}
