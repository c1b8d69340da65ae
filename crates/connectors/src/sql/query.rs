use crate::error::SourceError;
use chrono::{DateTime, Utc};
use model::mapping::{IncrementalMode, Mapping};
use model::watermark::Watermark;
use serde_json::Value;

/// SQL flavor differences the plan needs to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Bind placeholder for the parameter at `idx` (zero-based).
    pub fn placeholder(&self, idx: usize) -> String {
        match self {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", idx + 1),
        }
    }
}

/// Typed bind value for a generated query. Watermarks are string-encoded in
/// state but must reach the driver in the column's domain, so the scalar is
/// narrowed back before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl SqlParam {
    pub fn from_watermark(watermark: &Watermark) -> Self {
        let raw = watermark.as_str();
        if let Ok(n) = raw.parse::<i64>() {
            return SqlParam::Int(n);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return SqlParam::Timestamp(ts.with_timezone(&Utc));
        }
        SqlParam::Text(raw.to_string())
    }

    /// Narrows a JSON scalar (a primary-key value from the source's own
    /// rows) into a bindable parameter.
    pub fn from_json(value: &Value) -> Result<Self, SourceError> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlParam::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlParam::Float(f))
                } else {
                    Err(SourceError::Unsupported(format!(
                        "cannot bind {n} as a query parameter"
                    )))
                }
            }
            Value::String(s) => Ok(SqlParam::Text(s.clone())),
            other => Err(SourceError::Unsupported(format!(
                "cannot bind {other} as a query parameter"
            ))),
        }
    }
}

/// One batch query plus its bind values, in placeholder order.
#[derive(Debug, Clone)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Renders a watermark scalar for textual `:w` substitution in a
/// caller-supplied query: bare when numeric, quote-escaped otherwise.
/// Generated queries never use this; they bind the watermark instead.
fn watermark_literal(watermark: &Watermark) -> String {
    let raw = watermark.as_str();
    if raw.parse::<i128>().is_ok() {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "''"))
    }
}

/// Deterministic per-batch query construction for relational sources.
///
/// Incremental modes use keyset pagination on the watermark column, which is
/// restart-safe and O(batch) per query; the watermark value itself is bound,
/// never spliced. Full mode pages with LIMIT/OFFSET; that is quadratic over
/// the table and is only acceptable there because full mode has no ordering
/// column to key on.
#[derive(Debug, Clone)]
pub struct SqlQueryPlan {
    table: Option<String>,
    custom_query: Option<String>,
    mode: IncrementalMode,
    watermark_column: Option<String>,
    order_by: Option<String>,
    batch_size: usize,
}

impl SqlQueryPlan {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        SqlQueryPlan {
            table: mapping.table.clone(),
            custom_query: mapping.query.clone(),
            mode: mapping.transfer.incremental_mode,
            watermark_column: mapping.watermark_column().map(str::to_string),
            order_by: mapping.transfer.order_by.clone(),
            batch_size: mapping.transfer.batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Renders the query for one batch.
    ///
    /// `inclusive` selects `>=` over `>` on the watermark predicate; it is
    /// true only for the first incremental query after a forced reset, so the
    /// boundary row is not silently dropped nor re-emitted forever.
    pub fn render(
        &self,
        dialect: Dialect,
        watermark: &Watermark,
        offset: u64,
        inclusive: bool,
    ) -> RenderedQuery {
        if let Some(custom) = &self.custom_query {
            return RenderedQuery {
                sql: self.render_custom(custom, watermark, offset),
                params: Vec::new(),
            };
        }

        // validate() guarantees the table form here
        let table = self.table.as_deref().unwrap_or_default();
        let table_ident = dialect.quote_ident(table);

        match self.mode {
            IncrementalMode::Full => {
                let mut sql = format!("SELECT * FROM {table_ident}");
                if let Some(order_by) = &self.order_by {
                    sql.push_str(&format!(" ORDER BY {order_by}"));
                }
                sql.push_str(&format!(" LIMIT {} OFFSET {}", self.batch_size, offset));
                RenderedQuery {
                    sql,
                    params: Vec::new(),
                }
            }
            IncrementalMode::IncrementalPk | IncrementalMode::IncrementalTimestamp => {
                let column = self.watermark_column.as_deref().unwrap_or_default();
                let column_ident = dialect.quote_ident(column);

                let mut sql = format!("SELECT * FROM {table_ident}");
                let mut params = Vec::new();
                if !watermark.is_empty() {
                    let op = if inclusive { ">=" } else { ">" };
                    sql.push_str(&format!(
                        " WHERE {column_ident} {op} {}",
                        dialect.placeholder(params.len())
                    ));
                    params.push(SqlParam::from_watermark(watermark));
                }
                match &self.order_by {
                    Some(order_by) => sql.push_str(&format!(" ORDER BY {order_by}")),
                    None => sql.push_str(&format!(" ORDER BY {column_ident} ASC")),
                }
                sql.push_str(&format!(" LIMIT {}", self.batch_size));
                RenderedQuery { sql, params }
            }
        }
    }

    /// Substitutes `:w` and `:n` into a caller-supplied query. Correctness of
    /// the surrounding SQL is the mapping author's responsibility. A query
    /// without `:n` cannot bound its own batches, so offset paging is
    /// appended to keep memory bounded.
    fn render_custom(&self, custom: &str, watermark: &Watermark, offset: u64) -> String {
        let mut sql = custom.replace(":w", &watermark_literal(watermark));
        if sql.contains(":n") {
            sql = sql.replace(":n", &self.batch_size.to_string());
        } else {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", self.batch_size, offset));
        }
        sql
    }

    /// True when paging advances by offset instead of by watermark key.
    pub fn uses_offset_paging(&self) -> bool {
        match &self.custom_query {
            Some(custom) => !custom.contains(":n"),
            None => self.mode == IncrementalMode::Full,
        }
    }
}
