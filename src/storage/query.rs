//! Statement helpers
//!
//! Every statement the storages run goes through these, so a failure is
//! always logged once with its SQL and bound values.

use crate::{Result, StorageError};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::error;

/// Named parameters, as built by `rusqlite::named_params!`
pub(crate) type Params<'a> = &'a [(&'a str, &'a dyn ToSql)];

/// Log a failed statement and wrap the driver error.
pub(crate) fn handle_error(
    context: &'static str,
    sql: &str,
    params: Params<'_>,
    source: rusqlite::Error,
) -> StorageError {
    let bound = describe(params);
    let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    error!(context, %sql, %bound, error = %source, "query failed");
    StorageError::Query {
        context,
        sql,
        bound,
        source,
    }
}

/// Log a broken invariant and build the matching error.
pub(crate) fn invariant(context: &'static str, message: impl Into<String>) -> StorageError {
    let message = message.into();
    error!(context, %message, "invariant violated");
    StorageError::Invariant { context, message }
}

fn describe(params: Params<'_>) -> String {
    params
        .iter()
        .map(|(name, value)| match value.to_sql() {
            Ok(output) => format!("{}={:?}", name, output),
            Err(_) => format!("{}=<unencodable>", name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn execute(
    conn: &Connection,
    context: &'static str,
    sql: &str,
    params: Params<'_>,
) -> Result<usize> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| handle_error(context, sql, params, e))?;
    stmt.execute(params)
        .map_err(|e| handle_error(context, sql, params, e))
}

/// Run an `INSERT` and return the new row id
pub(crate) fn insert(
    conn: &Connection,
    context: &'static str,
    sql: &str,
    params: Params<'_>,
) -> Result<i64> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| handle_error(context, sql, params, e))?;
    stmt.insert(params)
        .map_err(|e| handle_error(context, sql, params, e))
}

/// First row, if any
pub(crate) fn query_row<T, F>(
    conn: &Connection,
    context: &'static str,
    sql: &str,
    params: Params<'_>,
    map: F,
) -> Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| handle_error(context, sql, params, e))?;
    stmt.query_row(params, map)
        .optional()
        .map_err(|e| handle_error(context, sql, params, e))
}

pub(crate) fn query_map<T, F>(
    conn: &Connection,
    context: &'static str,
    sql: &str,
    params: Params<'_>,
    map: F,
) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| handle_error(context, sql, params, e))?;
    let rows = stmt
        .query_map(params, map)
        .map_err(|e| handle_error(context, sql, params, e))?;
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(|e| handle_error(context, sql, params, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::named_params;

    #[test]
    fn test_error_carries_sql_and_params() {
        let conn = Connection::open_in_memory().unwrap();
        let err = execute(
            &conn,
            "test",
            "INSERT INTO missing (n) VALUES (:n)",
            named_params! { ":n": 42 },
        )
        .unwrap_err();

        match err {
            StorageError::Query { context, sql, bound, .. } => {
                assert_eq!(context, "test");
                assert!(sql.contains("INSERT INTO missing"));
                assert!(bound.contains(":n"));
                assert!(bound.contains("42"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_query_helpers() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)")
            .unwrap();

        let id = insert(&conn, "test", "INSERT INTO t (n) VALUES (:n)", named_params! { ":n": 5 })
            .unwrap();
        insert(&conn, "test", "INSERT INTO t (n) VALUES (:n)", named_params! { ":n": 6 }).unwrap();

        let n: Option<i64> = query_row(
            &conn,
            "test",
            "SELECT n FROM t WHERE id = :id",
            named_params! { ":id": id },
            |row| row.get(0),
        )
        .unwrap();
        assert_eq!(n, Some(5));

        let all: Vec<i64> = query_map(&conn, "test", "SELECT n FROM t ORDER BY n", &[], |row| {
            row.get(0)
        })
        .unwrap();
        assert_eq!(all, vec![5, 6]);
    }
}
