//! SQL execution against MySQL
//!
//! Whatever the server sends back decides the shape of the outcome: a result
//! set (even an empty one) comes back as column names plus JSON cell values,
//! anything else as the number of affected rows.

use crate::agent::classifier::is_single_statement;
use crate::db::connection::DbPool;
use crate::db::schema::SchemaSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySqlColumn, MySqlDatabaseError, MySqlQueryResult, MySqlRow};
use sqlx::{Column, Either, Executor, Row, TypeInfo};
use tracing::debug;

/// "This command is not supported in the prepared statement protocol yet"
const ER_UNSUPPORTED_PS: u16 = 1295;

type ResponseStream<'a> = BoxStream<'a, std::result::Result<Either<MySqlQueryResult, MySqlRow>, sqlx::Error>>;

/// Result of running one SQL string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Set for statements that do not produce a result set.
    pub rows_affected: Option<u64>,
}

impl QueryOutcome {
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        }
    }

    /// Build from a server response. A result set with known columns is kept
    /// even when it has no rows.
    pub fn from_response(columns: Vec<String>, rows: Vec<Vec<Value>>, rows_affected: u64) -> Self {
        if columns.is_empty() && rows.is_empty() {
            Self::affected(rows_affected)
        } else {
            Self::rows(columns, rows)
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// The database as seen by a session.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run SQL text as given. Several statements may be sent at once.
    async fn execute(&self, sql: &str) -> Result<QueryOutcome>;

    /// Run exactly one statement; text holding more than one is rejected.
    async fn execute_statement(&self, sql: &str) -> Result<QueryOutcome>;

    /// Table and column metadata for the current database.
    async fn fetch_schema(&self) -> Result<SchemaSnapshot>;
}

pub struct MySqlExecutor {
    pool: DbPool,
}

impl MySqlExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn collect(
        &self,
        sql: &str,
        mut stream: ResponseStream<'_>,
    ) -> std::result::Result<QueryOutcome, sqlx::Error> {
        let mut rows = Vec::new();
        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => rows.push(row),
            }
        }

        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => self.describe_columns(sql).await,
        };
        let values = rows.iter().map(row_values).collect();
        Ok(QueryOutcome::from_response(columns, values, rows_affected))
    }

    /// Result-set columns learned by preparing the statement. Empty when it
    /// has none or cannot be prepared.
    async fn describe_columns(&self, sql: &str) -> Vec<String> {
        match (&self.pool).describe(sql).await {
            Ok(described) => column_names(described.columns()),
            Err(e) => {
                debug!("Could not describe statement: {}", e);
                Vec::new()
            }
        }
    }
}

const SCHEMA_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR)
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

#[async_trait]
impl SqlExecutor for MySqlExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        debug!("Executing SQL: {}", sql);
        Ok(self.collect(sql, sqlx::raw_sql(sql).fetch_many(&self.pool)).await?)
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryOutcome> {
        debug!("Executing single statement: {}", sql);
        // The prepared protocol refuses multi-statement text outright.
        match self.collect(sql, (&self.pool).fetch_many(sqlx::query(sql))).await {
            Err(e) if unsupported_when_prepared(&e) && is_single_statement(sql) => {
                debug!("Statement cannot be prepared, sending as text");
                Ok(self.collect(sql, sqlx::raw_sql(sql).fetch_many(&self.pool)).await?)
            }
            result => Ok(result?),
        }
    }

    async fn fetch_schema(&self) -> Result<SchemaSnapshot> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as(SCHEMA_QUERY).fetch_all(&self.pool).await?;
        debug!("Fetched {} schema columns", rows.len());
        Ok(SchemaSnapshot::from_columns(rows))
    }
}

fn unsupported_when_prepared(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.try_downcast_ref::<MySqlDatabaseError>())
        .map_or(false, |e| e.number() == ER_UNSUPPORTED_PS)
}

fn column_names(columns: &[MySqlColumn]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn row_values(row: &MySqlRow) -> Vec<Value> {
    (0..row.columns().len()).map(|idx| cell_value(row, idx)).collect()
}

/// Decode one cell into JSON, falling back to its text form.
fn cell_value(row: &MySqlRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_ascii_uppercase();

    let typed = if type_name == "BOOLEAN" {
        decode::<bool>(row, idx).map(|v| v.map(Value::from))
    } else if type_name.contains("INT") || type_name == "YEAR" {
        if type_name.ends_with("UNSIGNED") {
            decode::<u64>(row, idx).map(|v| v.map(Value::from))
        } else {
            decode::<i64>(row, idx).map(|v| v.map(Value::from))
        }
    } else if type_name == "FLOAT" || type_name == "DOUBLE" {
        decode::<f64>(row, idx).map(|v| v.map(Value::from))
    } else if type_name == "DATETIME" || type_name == "TIMESTAMP" {
        decode::<NaiveDateTime>(row, idx).map(|v| v.map(|d| Value::from(d.to_string())))
    } else if type_name == "DATE" {
        decode::<NaiveDate>(row, idx).map(|v| v.map(|d| Value::from(d.to_string())))
    } else {
        None
    };

    match typed {
        Some(Some(value)) => value,
        Some(None) => Value::Null,
        None => text_value(row, idx, &type_name),
    }
}

fn decode<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<Option<T>>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

fn text_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    // DECIMAL, TIME, JSON, ENUM and friends arrive as text
    if let Ok(text) = row.try_get_unchecked::<Option<String>, _>(idx) {
        return match text {
            Some(text) if type_name == "JSON" => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            Some(text) => Value::String(text),
            None => Value::Null,
        };
    }
    match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
        Ok(Some(bytes)) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_result_set_keeps_columns() {
        let outcome = QueryOutcome::from_response(vec!["id".into(), "name".into()], Vec::new(), 0);
        assert_eq!(outcome.columns, vec!["id", "name"]);
        assert_eq!(outcome.rows_affected, None);
        assert_eq!(outcome.row_count(), 0);
    }

    #[test]
    fn test_rows_win_over_affected_count() {
        let outcome = QueryOutcome::from_response(vec!["n".into()], vec![vec![json!(1)]], 0);
        assert_eq!(outcome, QueryOutcome::rows(vec!["n".into()], vec![vec![json!(1)]]));
    }

    #[test]
    fn test_no_result_set_reports_affected_rows() {
        assert_eq!(QueryOutcome::from_response(Vec::new(), Vec::new(), 4), QueryOutcome::affected(4));
    }
}
