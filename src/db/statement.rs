//! Result-set detection for raw SQL.
//!
//! The relational path branches on whether a statement produces rows before
//! sending it. Detection parses the statement with the backend's sqlparser
//! dialect and falls back to the leading keyword when the parser gives up,
//! since vendor SQL is often outside what the parser accepts.

use crate::db::driver::Backend;
use crate::error::{DbError, DbResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use tracing::debug;

/// Leading keywords of statements that return rows.
const ROW_KEYWORDS: &[&str] = &[
    "select", "with", "show", "describe", "desc", "explain", "pragma", "values", "table",
];

fn parser_dialect(backend: Option<Backend>) -> Box<dyn Dialect> {
    match backend {
        Some(Backend::MySql) => Box::new(MySqlDialect {}),
        Some(Backend::Postgres) => Box::new(PostgreSqlDialect {}),
        Some(Backend::SQLite) => Box::new(SQLiteDialect {}),
        Some(Backend::SqlServer) => Box::new(MsSqlDialect {}),
        None => Box::new(GenericDialect {}),
    }
}

/// Whether executing `sql` yields a result set.
///
/// Fails with `MalformedStatement` for blank input. Multi-statement batches
/// are judged by their last statement.
pub fn produces_result_set(backend: Option<Backend>, sql: &str) -> DbResult<bool> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(DbError::malformed_statement("Empty SQL statement"));
    }

    let dialect = parser_dialect(backend);
    let parsed = match Parser::parse_sql(dialect.as_ref(), trimmed) {
        Ok(statements) => statements.last().map(returns_rows),
        Err(e) => {
            debug!(error = %e, "SQL parse failed, using keyword detection");
            None
        }
    };

    Ok(parsed.unwrap_or_else(|| keyword_returns_rows(trimmed)))
}

fn returns_rows(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(_)
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. }
        | Statement::Explain { .. } => true,
        // `PRAGMA name = value` sets, `PRAGMA name(arg)` and `PRAGMA name` read
        Statement::Pragma { is_eq, .. } => !is_eq,
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            has_returning(&stmt.to_string())
        }
        _ => false,
    }
}

fn has_returning(sql: &str) -> bool {
    sql.to_ascii_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word == "returning")
}

fn keyword_returns_rows(sql: &str) -> bool {
    let lower = sql.trim_start_matches('(').to_ascii_lowercase();
    let first = lower
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|word| !word.is_empty())
        .unwrap_or_default();
    if first == "pragma" {
        return !lower.contains('=');
    }
    if ROW_KEYWORDS.contains(&first) {
        return true;
    }
    matches!(first, "insert" | "update" | "delete") && has_returning(&lower)
}
