//! Driver lookup and connection opening.
//!
//! The relational path has no uniform driver API: each prefix maps to a
//! conventional driver identifier and, when this build ships one, a native
//! backend. Connections are opened per request and closed by the caller.

use crate::config::EngineSettings;
use crate::dialect::classifier::classify_connection_string;
use crate::error::{ConnectionFailureKind, DbError, DbResult};
use crate::models::{ConnectionDescriptor, DialectTag};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use tiberius::{AuthMethod, Client, Config as TdsConfig};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// SQL Server client over a tokio TCP stream.
pub type TdsClient = Client<Compat<TcpStream>>;

/// Native backend able to serve a driver entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Postgres,
    SQLite,
    SqlServer,
}

/// One row of the prefix -> driver table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverEntry {
    pub dialect: DialectTag,
    /// Conventional driver class name, also accepted as a driver hint
    pub driver_id: &'static str,
    pub backend: Option<Backend>,
}

const DRIVERS: &[DriverEntry] = &[
    DriverEntry {
        dialect: DialectTag::MySQL,
        driver_id: "com.mysql.cj.jdbc.Driver",
        backend: Some(Backend::MySql),
    },
    DriverEntry {
        dialect: DialectTag::MariaDB,
        driver_id: "org.mariadb.jdbc.Driver",
        backend: Some(Backend::MySql),
    },
    DriverEntry {
        dialect: DialectTag::PostgreSQL,
        driver_id: "org.postgresql.Driver",
        backend: Some(Backend::Postgres),
    },
    DriverEntry {
        dialect: DialectTag::SQLServer,
        driver_id: "com.microsoft.sqlserver.jdbc.SQLServerDriver",
        backend: Some(Backend::SqlServer),
    },
    DriverEntry {
        dialect: DialectTag::SQLServer,
        driver_id: "net.sourceforge.jtds.jdbc.Driver",
        backend: Some(Backend::SqlServer),
    },
    DriverEntry {
        dialect: DialectTag::Oracle,
        driver_id: "oracle.jdbc.OracleDriver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::DB2,
        driver_id: "com.ibm.db2.jcc.DB2Driver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::Sybase,
        driver_id: "com.sybase.jdbc4.jdbc.SybDriver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::Sybase,
        driver_id: "com.sap.db.jdbc.Driver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::Derby,
        driver_id: "org.apache.derby.jdbc.EmbeddedDriver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::H2,
        driver_id: "org.h2.Driver",
        backend: None,
    },
    DriverEntry {
        dialect: DialectTag::SQLite,
        driver_id: "org.sqlite.JDBC",
        backend: Some(Backend::SQLite),
    },
];

impl DriverEntry {
    fn for_dialect(dialect: DialectTag, connection_string: &str) -> Option<&'static DriverEntry> {
        // jTDS has its own driver class
        let jtds = connection_string
            .trim()
            .to_ascii_lowercase()
            .starts_with("jdbc:jtds:");
        DRIVERS
            .iter()
            .filter(|entry| entry.dialect == dialect)
            .find(|entry| !jtds || entry.driver_id.contains("jtds"))
    }

    fn for_hint(hint: &str) -> Option<&'static DriverEntry> {
        DRIVERS
            .iter()
            .find(|entry| entry.driver_id.eq_ignore_ascii_case(hint.trim()))
            .or_else(|| {
                DialectTag::from_name(hint)
                    .and_then(|tag| DRIVERS.iter().find(|entry| entry.dialect == tag))
            })
    }
}

/// Resolve the driver entry for a relational descriptor.
///
/// The URL prefix is consulted first, then the driver hint.
pub fn lookup(descriptor: &ConnectionDescriptor) -> DbResult<&'static DriverEntry> {
    let dialect = classify_connection_string(descriptor.connection_string());
    if let Some(entry) = DriverEntry::for_dialect(dialect, descriptor.connection_string()) {
        return Ok(entry);
    }

    match descriptor.driver_hint() {
        Some(hint) => DriverEntry::for_hint(hint).ok_or_else(|| {
            DbError::unsupported_dialect(format!(
                "{} (driver hint '{}')",
                descriptor.masked(),
                hint
            ))
        }),
        None => Err(DbError::unsupported_dialect(descriptor.masked())),
    }
}

/// A live connection to one of the natively supported backends.
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
    SqlServer(Box<TdsClient>),
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MySql(_) => "MySql",
            Self::Postgres(_) => "Postgres",
            Self::SQLite(_) => "SQLite",
            Self::SqlServer(_) => "SqlServer",
        };
        f.debug_tuple("DbConnection").field(&name).finish()
    }
}

impl DbConnection {
    /// Open a connection for the given driver entry.
    pub async fn open(
        descriptor: &ConnectionDescriptor,
        entry: &DriverEntry,
        settings: &EngineSettings,
    ) -> DbResult<Self> {
        let Some(backend) = entry.backend else {
            return Err(DbError::connection(
                format!(
                    "Driver {} for {} is not available in this build",
                    entry.driver_id, entry.dialect
                ),
                ConnectionFailureKind::Unknown,
                "Use a MySQL, MariaDB, PostgreSQL, SQLite or SQL Server connection",
            ));
        };

        info!(
            connection = %descriptor.masked(),
            dialect = %entry.dialect,
            driver = entry.driver_id,
            "Opening connection"
        );

        let connecting = Self::connect_backend(backend, descriptor, entry.dialect);

        match timeout(settings.connect_timeout, connecting).await {
            Ok(result) => result.map_err(DbError::during_connect),
            Err(_) => Err(DbError::connection(
                format!(
                    "Connection attempt timed out after {}s",
                    settings.connect_timeout.as_secs()
                ),
                ConnectionFailureKind::Network,
                "Check that the server is running and reachable",
            )),
        }
    }

    async fn connect_backend(
        backend: Backend,
        descriptor: &ConnectionDescriptor,
        dialect: DialectTag,
    ) -> DbResult<Self> {
        match backend {
            Backend::MySql => {
                let options = with_credentials_mysql(
                    MySqlConnectOptions::from_str(&native_url(descriptor, "mysql"))
                        .map_err(|e| invalid_url(dialect, e))?,
                    descriptor,
                );
                Ok(Self::MySql(options.charset("utf8mb4").connect().await?))
            }
            Backend::Postgres => {
                let mut options = PgConnectOptions::from_str(&native_url(descriptor, "postgres"))
                    .map_err(|e| invalid_url(dialect, e))?;
                if !descriptor.username().is_empty() {
                    options = options.username(descriptor.username());
                }
                if !descriptor.password().is_empty() {
                    options = options.password(descriptor.password());
                }
                Ok(Self::Postgres(options.connect().await?))
            }
            Backend::SQLite => Ok(Self::SQLite(
                sqlite_options(descriptor.connection_string())?
                    .connect()
                    .await?,
            )),
            Backend::SqlServer => Ok(Self::SqlServer(Box::new(
                connect_sql_server(descriptor).await?,
            ))),
        }
    }

    /// Server product/version banner, if the server reports one.
    pub async fn server_version(&mut self) -> Option<String> {
        let version = match self {
            Self::MySql(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(conn)
                    .await
                    .ok()
            }
            Self::Postgres(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(conn)
                    .await
                    .ok()
            }
            Self::SQLite(conn) => {
                sqlx::query_scalar::<_, String>("SELECT 'SQLite ' || sqlite_version()")
                    .fetch_one(conn)
                    .await
                    .ok()
            }
            Self::SqlServer(client) => match client.simple_query("SELECT @@VERSION").await {
                Ok(stream) => stream
                    .into_row()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|row| row.get::<&str, _>(0).map(str::to_string)),
                Err(_) => None,
            },
        };

        match &version {
            Some(v) => debug!(version = %v, "Got server version"),
            None => warn!("Failed to get server version"),
        }
        version
    }

    /// Close the connection. Errors are logged, never returned.
    pub async fn close(self) {
        let result = match self {
            Self::MySql(conn) => conn.close().await.map_err(|e| e.to_string()),
            Self::Postgres(conn) => conn.close().await.map_err(|e| e.to_string()),
            Self::SQLite(conn) => conn.close().await.map_err(|e| e.to_string()),
            Self::SqlServer(client) => client.close().await.map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to close connection cleanly");
        }
    }
}

fn invalid_url(dialect: DialectTag, err: sqlx::Error) -> DbError {
    DbError::connection(
        format!("Invalid {} connection string: {}", dialect, err),
        ConnectionFailureKind::Unknown,
        "Check the connection URL format, e.g. jdbc:mysql://host:3306/database",
    )
}

fn with_credentials_mysql(
    mut options: MySqlConnectOptions,
    descriptor: &ConnectionDescriptor,
) -> MySqlConnectOptions {
    if !descriptor.username().is_empty() {
        options = options.username(descriptor.username());
    }
    if !descriptor.password().is_empty() {
        options = options.password(descriptor.password());
    }
    options
}

/// Turn a JDBC-style URL into a URL sqlx understands: drop `jdbc:` and put
/// `scheme` in front of the authority.
pub fn native_url(descriptor: &ConnectionDescriptor, scheme: &str) -> String {
    let cs = descriptor.connection_string();
    let cs = cs.strip_prefix("jdbc:").unwrap_or(cs);
    match cs.find("://") {
        Some(idx) => format!("{}{}", scheme, &cs[idx..]),
        None => cs.to_string(),
    }
}

/// SQLite takes a file path rather than a URL.
fn sqlite_options(connection_string: &str) -> DbResult<SqliteConnectOptions> {
    let cs = connection_string.strip_prefix("jdbc:").unwrap_or(connection_string);
    let path = cs.strip_prefix("sqlite:").unwrap_or(cs);
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path == ":memory:" {
        return SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            DbError::connection(
                e.to_string(),
                ConnectionFailureKind::Unknown,
                "Check the SQLite path",
            )
        });
    }
    Ok(SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false))
}

/// jTDS writes the database as a path segment; tiberius only knows the
/// Microsoft property form.
pub fn sql_server_jdbc_string(connection_string: &str) -> String {
    let cs = connection_string.trim();
    let Some(rest) = cs
        .get(..19)
        .filter(|head| head.eq_ignore_ascii_case("jdbc:jtds:sqlserver"))
        .map(|_| &cs[19..])
    else {
        return cs.to_string();
    };

    let (address, props) = match rest.find(';') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let address = address.trim_start_matches("://");
    match address.split_once('/') {
        Some((host, database)) if !database.is_empty() => format!(
            "jdbc:sqlserver://{};databaseName={}{}",
            host, database, props
        ),
        Some((host, _)) => format!("jdbc:sqlserver://{}{}", host, props),
        None => format!("jdbc:sqlserver://{}{}", address, props),
    }
}

/// Build the tiberius config for a descriptor.
pub fn sql_server_config(descriptor: &ConnectionDescriptor) -> DbResult<TdsConfig> {
    let jdbc = sql_server_jdbc_string(descriptor.connection_string());
    let mut config = TdsConfig::from_jdbc_string(&jdbc)?;
    if !descriptor.username().is_empty() {
        config.authentication(AuthMethod::sql_server(
            descriptor.username(),
            descriptor.password(),
        ));
    }
    config.trust_cert();
    Ok(config)
}

/// Open a SQL Server client.
pub async fn connect_sql_server(descriptor: &ConnectionDescriptor) -> DbResult<TdsClient> {
    connect_tds(sql_server_config(descriptor)?).await
}

pub async fn connect_tds(config: TdsConfig) -> DbResult<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
        DbError::connection(
            format!("Failed to connect to {}: {}", config.get_addr(), e),
            ConnectionFailureKind::Network,
            "Check that the SQL Server instance is running and TCP/IP is enabled",
        )
    })?;
    tcp.set_nodelay(true).ok();

    Ok(Client::connect(config, tcp.compat_write()).await?)
}
