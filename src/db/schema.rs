//! Schema browsing.
//!
//! [`SchemaInspector`] lists tables, views, procedures, databases and the
//! columns of a table. Names come back as plain strings; a column is rendered
//! `NAME TYPE` with the type upper-cased.
//!
//! # Architecture
//!
//! Catalog queries live in the `queries` submodule, one set per backend. The
//! backend submodules (`mysql`, `postgres`, `sqlite`, `sqlserver`) run them on a
//! per-call connection. MongoDB has no catalog SQL: databases, collections and
//! first-document keys stand in for databases, tables and columns.

use crate::config::EngineSettings;
use crate::db::document;
use crate::db::driver::{self, DbConnection};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DialectTag};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaObject {
    Tables,
    Views,
    Procedures,
    Databases,
    Columns(String),
}

impl SchemaObject {
    fn operation(&self) -> &'static str {
        match self {
            Self::Tables => "list tables",
            Self::Views => "list views",
            Self::Procedures => "list procedures",
            Self::Databases => "list databases",
            Self::Columns(_) => "list columns",
        }
    }
}

/// Schema inspector for database introspection.
#[derive(Debug, Clone, Default)]
pub struct SchemaInspector {
    settings: EngineSettings,
}

impl SchemaInspector {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Tables of the current database. For MongoDB: collections, or databases
    /// when the URI names none.
    pub async fn list_tables(&self, descriptor: &ConnectionDescriptor) -> DbResult<Vec<String>> {
        self.list(descriptor, SchemaObject::Tables).await
    }

    pub async fn list_views(&self, descriptor: &ConnectionDescriptor) -> DbResult<Vec<String>> {
        self.list(descriptor, SchemaObject::Views).await
    }

    pub async fn list_procedures(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<Vec<String>> {
        self.list(descriptor, SchemaObject::Procedures).await
    }

    pub async fn list_databases(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<Vec<String>> {
        self.list(descriptor, SchemaObject::Databases).await
    }

    /// Columns of `table` as `NAME TYPE`. For MongoDB: keys of the first document.
    pub async fn list_columns(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &str,
    ) -> DbResult<Vec<String>> {
        if table.trim().is_empty() {
            return Err(DbError::invalid_input("Table name must not be empty"));
        }
        self.list(descriptor, SchemaObject::Columns(table.trim().to_string()))
            .await
    }

    async fn list(
        &self,
        descriptor: &ConnectionDescriptor,
        object: SchemaObject,
    ) -> DbResult<Vec<String>> {
        if descriptor.is_document() {
            return self.list_document(descriptor, &object).await;
        }

        let entry = driver::lookup(descriptor)?;
        let mut conn = DbConnection::open(descriptor, entry, &self.settings).await?;
        let query_timeout = self.settings.query_timeout;
        let listed = match &mut conn {
            DbConnection::MySql(c) => mysql::list(c, &object, query_timeout).await,
            DbConnection::Postgres(c) => postgres::list(c, &object, query_timeout).await,
            DbConnection::SQLite(c) => sqlite::list(c, &object, query_timeout).await,
            DbConnection::SqlServer(c) => sqlserver::list(c, &object, query_timeout).await,
        };
        conn.close().await;

        let names = listed?;
        debug!(
            dialect = %entry.dialect,
            operation = object.operation(),
            count = names.len(),
            "Listed schema objects"
        );
        Ok(names)
    }

    async fn list_document(
        &self,
        descriptor: &ConnectionDescriptor,
        object: &SchemaObject,
    ) -> DbResult<Vec<String>> {
        match object {
            SchemaObject::Tables => {
                let has_database = crate::dialect::extract_database(
                    DialectTag::MongoDB,
                    descriptor.connection_string(),
                )
                .is_some();
                if has_database {
                    document::list_collections(descriptor, &self.settings).await
                } else {
                    document::list_databases(descriptor, &self.settings).await
                }
            }
            SchemaObject::Databases => document::list_databases(descriptor, &self.settings).await,
            SchemaObject::Columns(collection) => {
                document::collection_fields(descriptor, collection, &self.settings).await
            }
            SchemaObject::Views | SchemaObject::Procedures => Err(DbError::unsupported_operation(
                object.operation(),
                DialectTag::MongoDB.to_string(),
            )),
        }
    }
}

fn column_entry(name: &str, type_name: &str) -> String {
    format!("{} {}", name, type_name.to_uppercase())
}

fn timeout_error(object: &SchemaObject, query_timeout: Duration) -> DbError {
    DbError::timeout(object.operation(), query_timeout.as_secs())
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'VIEW'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_PROCEDURES: &str = r#"
            SELECT CONVERT(ROUTINE_NAME USING utf8) AS ROUTINE_NAME
            FROM information_schema.ROUTINES
            WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = 'PROCEDURE'
            ORDER BY ROUTINE_NAME
            "#;

        pub const LIST_DATABASES: &str = "SHOW DATABASES";

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE
            FROM information_schema.COLUMNS
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_type = 'VIEW'
            ORDER BY table_name
            "#;

        pub const LIST_PROCEDURES: &str = r#"
            SELECT DISTINCT routine_name::text
            FROM information_schema.routines
            WHERE routine_schema = current_schema()
            AND routine_type IN ('PROCEDURE', 'FUNCTION')
            ORDER BY 1
            "#;

        pub const LIST_DATABASES: &str = r#"
            SELECT datname::text FROM pg_database
            WHERE datistemplate = false
            ORDER BY datname
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'view'
            ORDER BY name
            "#;

        pub const LIST_DATABASES: &str = "SELECT name FROM pragma_database_list ORDER BY seq";

        pub const LIST_COLUMNS: &str = "SELECT name, type FROM pragma_table_info(?) ORDER BY cid";
    }

    pub mod sqlserver {
        pub const LIST_TABLES: &str = r#"
            SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT TABLE_NAME FROM INFORMATION_SCHEMA.VIEWS
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_PROCEDURES: &str = r#"
            SELECT ROUTINE_NAME FROM INFORMATION_SCHEMA.ROUTINES
            WHERE ROUTINE_TYPE = 'PROCEDURE'
            ORDER BY ROUTINE_NAME
            "#;

        pub const LIST_DATABASES: &str = "SELECT name FROM sys.databases ORDER BY name";

        pub const LIST_COLUMNS: &str = r#"
            SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_NAME = @P1
            ORDER BY ORDINAL_POSITION
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::Row;
    use sqlx::mysql::MySqlConnection;

    pub async fn list(
        conn: &mut MySqlConnection,
        object: &SchemaObject,
        query_timeout: Duration,
    ) -> DbResult<Vec<String>> {
        let work = async {
            let rows = match object {
                SchemaObject::Tables => {
                    sqlx::query(queries::mysql::LIST_TABLES)
                        .fetch_all(&mut *conn)
                        .await?
                }
                SchemaObject::Views => {
                    sqlx::query(queries::mysql::LIST_VIEWS)
                        .fetch_all(&mut *conn)
                        .await?
                }
                SchemaObject::Procedures => {
                    sqlx::query(queries::mysql::LIST_PROCEDURES)
                        .fetch_all(&mut *conn)
                        .await?
                }
                SchemaObject::Databases => {
                    sqlx::query(queries::mysql::LIST_DATABASES)
                        .fetch_all(&mut *conn)
                        .await?
                }
                SchemaObject::Columns(table) => {
                    let rows = sqlx::query(queries::mysql::LIST_COLUMNS)
                        .bind(table.as_str())
                        .fetch_all(&mut *conn)
                        .await?;
                    return rows
                        .iter()
                        .map(|row| {
                            Ok(column_entry(
                                &row.try_get::<String, _>(0)?,
                                &row.try_get::<String, _>(1)?,
                            ))
                        })
                        .collect::<DbResult<Vec<_>>>();
                }
            };
            rows.iter()
                .map(|row| row.try_get::<String, _>(0).map_err(DbError::from))
                .collect::<DbResult<Vec<_>>>()
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(object, query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Row;
    use sqlx::postgres::PgConnection;

    pub async fn list(
        conn: &mut PgConnection,
        object: &SchemaObject,
        query_timeout: Duration,
    ) -> DbResult<Vec<String>> {
        let work = async {
            let query = match object {
                SchemaObject::Tables => queries::postgres::LIST_TABLES,
                SchemaObject::Views => queries::postgres::LIST_VIEWS,
                SchemaObject::Procedures => queries::postgres::LIST_PROCEDURES,
                SchemaObject::Databases => queries::postgres::LIST_DATABASES,
                SchemaObject::Columns(table) => {
                    let rows = sqlx::query(queries::postgres::LIST_COLUMNS)
                        .bind(table.as_str())
                        .fetch_all(&mut *conn)
                        .await?;
                    return rows
                        .iter()
                        .map(|row| {
                            Ok(column_entry(
                                &row.try_get::<String, _>(0)?,
                                &row.try_get::<String, _>(1)?,
                            ))
                        })
                        .collect::<DbResult<Vec<_>>>();
                }
            };
            let rows = sqlx::query(query).fetch_all(&mut *conn).await?;
            rows.iter()
                .map(|row| row.try_get::<String, _>(0).map_err(DbError::from))
                .collect::<DbResult<Vec<_>>>()
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(object, query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::Row;
    use sqlx::sqlite::SqliteConnection;

    pub async fn list(
        conn: &mut SqliteConnection,
        object: &SchemaObject,
        query_timeout: Duration,
    ) -> DbResult<Vec<String>> {
        let work = async {
            let query = match object {
                SchemaObject::Tables => queries::sqlite::LIST_TABLES,
                SchemaObject::Views => queries::sqlite::LIST_VIEWS,
                SchemaObject::Databases => queries::sqlite::LIST_DATABASES,
                SchemaObject::Procedures => {
                    return Err(DbError::unsupported_operation(
                        object.operation(),
                        DialectTag::SQLite.to_string(),
                    ));
                }
                SchemaObject::Columns(table) => {
                    let rows = sqlx::query(queries::sqlite::LIST_COLUMNS)
                        .bind(table.as_str())
                        .fetch_all(&mut *conn)
                        .await?;
                    return rows
                        .iter()
                        .map(|row| {
                            Ok(column_entry(
                                &row.try_get::<String, _>(0)?,
                                &row.try_get::<String, _>(1)?,
                            ))
                        })
                        .collect::<DbResult<Vec<_>>>();
                }
            };
            let rows = sqlx::query(query).fetch_all(&mut *conn).await?;
            rows.iter()
                .map(|row| row.try_get::<String, _>(0).map_err(DbError::from))
                .collect::<DbResult<Vec<_>>>()
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(object, query_timeout)),
        }
    }
}

mod sqlserver {
    use super::*;
    use crate::db::driver::TdsClient;

    pub async fn list(
        client: &mut TdsClient,
        object: &SchemaObject,
        query_timeout: Duration,
    ) -> DbResult<Vec<String>> {
        let work = async {
            let stream = match object {
                SchemaObject::Tables => client.simple_query(queries::sqlserver::LIST_TABLES).await?,
                SchemaObject::Views => client.simple_query(queries::sqlserver::LIST_VIEWS).await?,
                SchemaObject::Procedures => {
                    client
                        .simple_query(queries::sqlserver::LIST_PROCEDURES)
                        .await?
                }
                SchemaObject::Databases => {
                    client
                        .simple_query(queries::sqlserver::LIST_DATABASES)
                        .await?
                }
                SchemaObject::Columns(table) => {
                    client
                        .query(queries::sqlserver::LIST_COLUMNS, &[&table.as_str()])
                        .await?
                }
            };
            let rows = stream.into_first_result().await?;

            let names = rows
                .iter()
                .map(|row| {
                    let name = row.get::<&str, _>(0).unwrap_or_default();
                    match object {
                        SchemaObject::Columns(_) => {
                            column_entry(name, row.get::<&str, _>(1).unwrap_or_default())
                        }
                        _ => name.to_string(),
                    }
                })
                .collect();
            Ok::<_, DbError>(names)
        };

        match timeout(query_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(object, query_timeout)),
        }
    }
}
