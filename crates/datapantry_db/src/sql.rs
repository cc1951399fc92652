//! Statement helpers: identifier quoting, parameter binding, dynamic row
//! decoding, and the instrumented execute/fetch pair every domain file uses.

use crate::error::Result;
use crate::types::{DbRow, DbValue};
use crate::PantryDb;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Instant;
use tracing::{debug_span, Instrument};

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

pub(crate) fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Integer(v) => query.bind(*v),
        DbValue::Real(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.clone()),
        DbValue::Blob(v) => query.bind(v.clone()),
    }
}

/// Decode a row by the storage class of each value, not the declared column type.
pub(crate) fn decode_row(row: &SqliteRow) -> Result<DbRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());

    for index in 0..columns.len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            values.push(DbValue::Null);
            continue;
        }
        let class = raw.type_info().name().to_string();
        let value = match class.as_str() {
            "INTEGER" => DbValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" => DbValue::Real(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => DbValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            _ => DbValue::Text(row.try_get_unchecked::<String, _>(index)?),
        };
        values.push(value);
    }

    Ok(DbRow::new(columns, values))
}

pub(crate) fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

pub(crate) fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

impl PantryDb {
    /// Execute a single statement with positional parameters.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let span = debug_span!(
            "db.exec",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let result = query.execute(&self.pool).instrument(span.clone()).await?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(result.rows_affected())
    }

    /// Execute a batch of statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let span = debug_span!(
            "db.exec_batch",
            op = "BATCH",
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .instrument(span.clone())
            .await?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Query and return all rows, decoded dynamically.
    ///
    /// The statement is not cached: its result shape follows whatever the
    /// table looks like now, and a rebuild can change the column count.
    pub async fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        let span = debug_span!(
            "db.query",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let mut query = sqlx::query(sql).persistent(false);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&self.pool).instrument(span.clone()).await?;
        let decoded = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(decoded)
    }
}
