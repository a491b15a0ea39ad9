//! Statement execution.
//!
//! [`ExecutionDispatcher`] is the single entry point for running a statement
//! against any descriptor:
//! - document descriptors go to [`crate::db::document`]
//! - relational descriptors resolve a driver, open a connection, run the
//!   (normalized or paginated) statement and close the connection again
//!
//! # Architecture
//!
//! Backend-specific fetch/execute code lives in the `mysql`, `postgres`,
//! `sqlite` and `sqlserver` submodules, each with the same shape:
//! `fetch_rows` returns a header plus at most `fetch_limit` decoded rows,
//! `execute` returns an affected-row count. Both run under the query timeout.

use crate::config::EngineSettings;
use crate::db::document;
use crate::db::driver::{self, DbConnection, DriverEntry};
use crate::db::statement::produces_result_set;
use crate::db::types::RowToValues;
use crate::dialect::{classify, prepare_statement, reconcile};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionDescriptor, DialectTag, ExecutionOutcome, PaginationRequest, TabularResult,
};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Header and decoded rows of one result set, before pagination is applied.
#[derive(Debug, Default)]
struct RowSet {
    header: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

/// Runs statements for any connection descriptor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionDispatcher {
    settings: EngineSettings,
}

impl ExecutionDispatcher {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Execute `sql` and return either a result set or an affected count.
    ///
    /// With a pagination request the statement is rewritten for the requested
    /// page and `page_size + 1` rows are fetched to compute `is_last_page`.
    /// Without one, a trailing `LIMIT n` is translated for dialects that lack
    /// it and every row is returned.
    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
        pagination: Option<PaginationRequest>,
    ) -> DbResult<ExecutionOutcome> {
        if descriptor.is_document() {
            let result =
                document::execute(descriptor, sql, pagination.as_ref(), &self.settings).await?;
            return Ok(ExecutionOutcome::Rows(result));
        }

        let entry = driver::lookup(descriptor)?;
        let returns_rows = produces_result_set(entry.backend, sql)?;

        let mut conn = DbConnection::open(descriptor, entry, &self.settings).await?;
        let outcome = self
            .run(&mut conn, descriptor, entry, sql, returns_rows, pagination.as_ref())
            .await;
        conn.close().await;

        outcome
    }

    async fn run(
        &self,
        conn: &mut DbConnection,
        descriptor: &ConnectionDescriptor,
        entry: &DriverEntry,
        sql: &str,
        returns_rows: bool,
        pagination: Option<&PaginationRequest>,
    ) -> DbResult<ExecutionOutcome> {
        let dialect = resolve_dialect(conn, descriptor, entry).await;
        let statement = prepare_statement(dialect, sql, pagination);
        let query_timeout = self.settings.query_timeout;
        let start = Instant::now();

        debug!(
            dialect = %dialect,
            sql = %statement,
            returns_rows,
            page = ?pagination.map(PaginationRequest::page),
            timeout_secs = query_timeout.as_secs(),
            "Executing statement"
        );

        if !returns_rows {
            let affected_count = match conn {
                DbConnection::MySql(c) => mysql::execute(c, &statement, query_timeout).await?,
                DbConnection::Postgres(c) => postgres::execute(c, &statement, query_timeout).await?,
                DbConnection::SQLite(c) => sqlite::execute(c, &statement, query_timeout).await?,
                DbConnection::SqlServer(c) => {
                    sqlserver::execute(c, &statement, query_timeout).await?
                }
            };
            return Ok(ExecutionOutcome::Affected {
                affected_count,
                execution_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        let fetch_limit = pagination
            .map(|p| p.fetch_size() as usize)
            .unwrap_or(usize::MAX);
        let row_set = match conn {
            DbConnection::MySql(c) => {
                mysql::fetch_rows(c, &statement, fetch_limit, query_timeout).await?
            }
            DbConnection::Postgres(c) => {
                postgres::fetch_rows(c, &statement, fetch_limit, query_timeout).await?
            }
            DbConnection::SQLite(c) => {
                sqlite::fetch_rows(c, &statement, fetch_limit, query_timeout).await?
            }
            DbConnection::SqlServer(c) => {
                sqlserver::fetch_rows(c, &statement, fetch_limit, query_timeout).await?
            }
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        // Statements like `PRAGMA x` may describe no columns at all
        if row_set.header.is_empty() {
            return Ok(ExecutionOutcome::Affected {
                affected_count: 0,
                execution_time_ms,
            });
        }

        let fetched = row_set.rows.len();
        let result = TabularResult::new(row_set.header, row_set.rows)?
            .paged(pagination.map(PaginationRequest::page_size))
            .with_execution_time(execution_time_ms);

        if !result.is_last_page {
            debug!(
                fetched,
                returned = result.row_count(),
                "More rows available beyond this page"
            );
        }

        Ok(ExecutionOutcome::Rows(result))
    }

    /// Open and release a connection (relational) or ping (document).
    ///
    /// Returns the server's product/version banner when it reports one.
    pub async fn test_connection(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<Option<String>> {
        if descriptor.is_document() {
            return document::test_connection(descriptor, &self.settings).await;
        }

        let entry = driver::lookup(descriptor)?;
        let mut conn = DbConnection::open(descriptor, entry, &self.settings).await?;
        let version = conn.server_version().await;
        conn.close().await;

        info!(
            connection = %descriptor.masked(),
            version = ?version,
            "Connection test succeeded"
        );
        Ok(version)
    }
}

/// Dialect used for statement rewriting on an open connection.
///
/// The prefix classification wins; the reported product name fills in when
/// the prefix is unknown, and the driver entry is the last resort.
async fn resolve_dialect(
    conn: &mut DbConnection,
    descriptor: &ConnectionDescriptor,
    entry: &DriverEntry,
) -> DialectTag {
    let dialect = match conn.server_version().await {
        Some(product_name) => reconcile(descriptor, &product_name),
        None => classify(descriptor),
    };
    if dialect == DialectTag::Unknown {
        entry.dialect
    } else {
        dialect
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn decode_rows<R: RowToValues>(rows: &[R], header: Vec<String>) -> RowSet {
    RowSet {
        header,
        rows: rows.iter().map(RowToValues::to_values).collect(),
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

fn statement_column_names<'q, S: sqlx::Statement<'q>>(statement: &S) -> Vec<String> {
    use sqlx::Column;
    statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

fn describe_failed(err: sqlx::Error) -> Vec<String> {
    warn!(error = %err, "Could not describe empty result set");
    Vec::new()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// The sqlx modules are parallel; only the connection type differs.

mod mysql {
    use super::*;
    use sqlx::Executor;
    use sqlx::mysql::MySqlConnection;

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        fetch_limit: usize,
        query_timeout: Duration,
    ) -> DbResult<RowSet> {
        let work = async {
            let results = (&mut *conn)
                .fetch(sql)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await;
            let rows = collect_rows(results)?;
            let header = match rows.first() {
                Some(row) => row.column_names(),
                None => match (&mut *conn).prepare(sql).await {
                    Ok(statement) => statement_column_names(&statement),
                    Err(e) => describe_failed(e),
                },
            };
            Ok::<_, DbError>(decode_rows(&rows, header))
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, (&mut *conn).execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Executor;
    use sqlx::postgres::PgConnection;

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        fetch_limit: usize,
        query_timeout: Duration,
    ) -> DbResult<RowSet> {
        let work = async {
            let results = (&mut *conn)
                .fetch(sql)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await;
            let rows = collect_rows(results)?;
            let header = match rows.first() {
                Some(row) => row.column_names(),
                None => match (&mut *conn).prepare(sql).await {
                    Ok(statement) => statement_column_names(&statement),
                    Err(e) => describe_failed(e),
                },
            };
            Ok::<_, DbError>(decode_rows(&rows, header))
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, (&mut *conn).execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::Executor;
    use sqlx::sqlite::SqliteConnection;

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        fetch_limit: usize,
        query_timeout: Duration,
    ) -> DbResult<RowSet> {
        let work = async {
            let results = (&mut *conn)
                .fetch(sql)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await;
            let rows = collect_rows(results)?;
            let header = match rows.first() {
                Some(row) => row.column_names(),
                None => match (&mut *conn).prepare(sql).await {
                    Ok(statement) => statement_column_names(&statement),
                    Err(e) => describe_failed(e),
                },
            };
            Ok::<_, DbError>(decode_rows(&rows, header))
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, (&mut *conn).execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}

mod sqlserver {
    use super::*;
    use crate::db::driver::TdsClient;
    use crate::db::types::sqlserver as decode;
    use futures_util::TryStreamExt;

    /// Rows of the first result set only.
    pub async fn fetch_rows(
        client: &mut TdsClient,
        sql: &str,
        fetch_limit: usize,
        query_timeout: Duration,
    ) -> DbResult<RowSet> {
        let work = async {
            let mut stream = client.simple_query(sql).await?;
            let header = stream
                .columns()
                .await?
                .map(decode::column_names)
                .unwrap_or_default();

            let mut row_stream = stream.into_row_stream();
            let mut rows = Vec::new();
            while rows.len() < fetch_limit {
                match row_stream.try_next().await? {
                    // A row of a different width belongs to the next result set
                    Some(row) if row.len() == header.len() => rows.push(decode::row_values(&row)),
                    _ => break,
                }
            }
            Ok::<_, DbError>(RowSet { header, rows })
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute(client: &mut TdsClient, sql: &str, query_timeout: Duration) -> DbResult<u64> {
        match timeout(query_timeout, client.execute(sql, &[])).await {
            Ok(Ok(result)) => Ok(result.total()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionFailureKind;

    #[tokio::test]
    async fn test_execute_unknown_prefix_is_unsupported() {
        let dispatcher = ExecutionDispatcher::default();
        let desc = ConnectionDescriptor::new("jdbc:informix-sqli://h:9088/db", "u", "p");
        let err = dispatcher.execute(&desc, "select 1", None).await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDialect { .. }));
    }

    #[tokio::test]
    async fn test_execute_empty_statement_fails_before_connecting() {
        let dispatcher = ExecutionDispatcher::default();
        // Nothing listens here; reaching the connect step would be a connection error
        let desc = ConnectionDescriptor::new("jdbc:postgresql://127.0.0.1:1/db", "u", "p");
        let err = dispatcher.execute(&desc, "   ", None).await.unwrap_err();
        assert!(matches!(err, DbError::MalformedStatement { .. }));
    }

    #[tokio::test]
    async fn test_execute_driverless_dialect() {
        let dispatcher = ExecutionDispatcher::default();
        let desc = ConnectionDescriptor::new("jdbc:oracle:thin:@h:1521:orcl", "u", "p");
        let err = dispatcher.execute(&desc, "select 1 from dual", None).await.unwrap_err();
        match err {
            DbError::Connection { category, .. } => {
                assert_eq!(category, ConnectionFailureKind::Unknown)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_sqlite_memory() {
        let dispatcher = ExecutionDispatcher::default();
        let desc = ConnectionDescriptor::new("jdbc:sqlite::memory:", "", "");

        let outcome = dispatcher
            .execute(&desc, "select 1 as one, 'a' as letter", None)
            .await
            .unwrap();
        let rows = outcome.rows().unwrap();
        assert_eq!(rows.header, vec!["one", "letter"]);
        assert_eq!(rows.rows, vec![vec![serde_json::json!(1), serde_json::json!("a")]]);
        assert!(rows.is_last_page);
    }

    #[tokio::test]
    async fn test_execute_sqlite_update_reports_count() {
        let dispatcher = ExecutionDispatcher::default();
        let desc = ConnectionDescriptor::new("jdbc:sqlite::memory:", "", "");

        let outcome = dispatcher
            .execute(&desc, "create table t (id integer)", None)
            .await
            .unwrap();
        assert_eq!(outcome.affected_count(), Some(0));
    }

    #[tokio::test]
    async fn test_test_connection_sqlite() {
        let dispatcher = ExecutionDispatcher::default();
        let desc = ConnectionDescriptor::new("jdbc:sqlite::memory:", "", "");
        let version = dispatcher.test_connection(&desc).await.unwrap();
        assert!(version.unwrap().starts_with("SQLite "));
    }
}
