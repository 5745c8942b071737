//! SQL cell execution against the configured external database.
//!
//! Placeholders are substituted textually with string-coerced globals (SQL
//! escaping is the author's responsibility), then the statement runs over
//! sqlx's SQLite driver and the result set comes back as one dataframe
//! bundle. The kernel loop is synchronous, so queries run on a lazily built
//! current-thread runtime.

use std::sync::OnceLock;

use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Connection, Row, SqliteConnection, TypeInfo};
use tokio::runtime::Runtime;

use ripple_core::analyze::substitute_placeholders;
use ripple_core::notebook::Output;

use crate::interp::RuntimeError;

fn runtime() -> &'static Runtime {
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build SQL runtime")
    })
}

fn operational(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::new("OperationalError", e.to_string())
}

/// Check that a connection string is usable.
pub fn validate_conn(conn_string: &str) -> Result<(), RuntimeError> {
    runtime().block_on(async {
        let mut conn = SqliteConnection::connect(conn_string)
            .await
            .map_err(operational)?;
        conn.close().await.map_err(operational)
    })
}

/// Execute a sql cell and return its tabular output.
pub fn execute_sql(
    conn_string: &str,
    sql: &str,
    lookup: impl FnMut(&str) -> Option<String>,
) -> Result<Output, RuntimeError> {
    let substituted = substitute_placeholders(sql, lookup)
        .map_err(|name| RuntimeError::new("NameError", format!("name '{name}' is not defined")))?;

    runtime().block_on(async {
        let mut conn = SqliteConnection::connect(conn_string)
            .await
            .map_err(operational)?;
        let rows = sqlx::query(&substituted)
            .fetch_all(&mut conn)
            .await
            .map_err(operational)?;
        let output = rows_to_output(&rows);
        let _ = conn.close().await;
        Ok(output)
    })
}

fn rows_to_output(rows: &[SqliteRow]) -> Output {
    let Some(first) = rows.first() else {
        return Output::dataframe(Vec::new(), Vec::new());
    };

    let columns: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let data: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| decode_column(row, i))
                .collect()
        })
        .collect();

    Output::dataframe(columns, data)
}

/// Decode one column by its declared type, falling back through the common
/// SQLite affinities.
fn decode_column(row: &SqliteRow, index: usize) -> serde_json::Value {
    let type_name = row
        .columns()
        .get(index)
        .map(|c| c.type_info().name().to_uppercase())
        .unwrap_or_default();

    match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v).map(serde_json::Value::Number))
            .unwrap_or(serde_json::Value::Null),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(serde_json::Value::Bool)
            .unwrap_or(serde_json::Value::Null),
        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|bytes| serde_json::json!(format!("<{} bytes>", bytes.len())))
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    }
}
