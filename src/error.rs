//! Error types for the DB Studio engine.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Failures that stem from user input (filters, statements) keep their message
//! verbatim; connection failures are additionally categorized so callers can show
//! a short vendor-agnostic message.

use thiserror::Error;

/// Coarse category of a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionFailureKind {
    /// Bad credentials or missing privileges
    Auth,
    /// Host unreachable, refused, TLS or socket problems
    Network,
    /// Driver missing or anything we could not classify
    Unknown,
}

impl std::fmt::Display for ConnectionFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Network => write!(f, "network"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed ({category}): {message}")]
    Connection {
        message: String,
        category: ConnectionFailureKind,
        suggestion: String,
    },

    #[error("Unsupported dialect: {dialect}")]
    UnsupportedDialect { dialect: String },

    #[error("Unsupported operation: {operation} is not available for {dialect}")]
    UnsupportedOperation { operation: String, dialect: String },

    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },

    #[error("Malformed statement: {message}")]
    MalformedStatement { message: String },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("{tool} exited with code {exit_code:?}: {diagnostic}")]
    ProcessFailure {
        tool: String,
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Copyable discriminant of [`DbError`], used in job outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionFailure,
    UnsupportedDialect,
    UnsupportedOperation,
    InvalidFilter,
    MalformedStatement,
    ExecutionError,
    ProcessFailure,
    TimedOut,
    Cancelled,
    InvalidInput,
    Io,
    Internal,
}

impl DbError {
    /// Create a connection error with a category and a helpful suggestion.
    pub fn connection(
        message: impl Into<String>,
        category: ConnectionFailureKind,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            category,
            suggestion: suggestion.into(),
        }
    }

    /// Create an unsupported dialect error.
    pub fn unsupported_dialect(dialect: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            dialect: dialect.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(operation: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            dialect: dialect.into(),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Create a malformed statement error.
    pub fn malformed_statement(message: impl Into<String>) -> Self {
        Self::MalformedStatement {
            message: message.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a process failure error.
    pub fn process_failure(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::ProcessFailure {
            tool: tool.into(),
            exit_code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::ConnectionFailure,
            Self::UnsupportedDialect { .. } => ErrorKind::UnsupportedDialect,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            Self::MalformedStatement { .. } => ErrorKind::MalformedStatement,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::ProcessFailure { .. } => ErrorKind::ProcessFailure,
            Self::Timeout { .. } => ErrorKind::TimedOut,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Io { .. } => ErrorKind::Io,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Execution { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Message suitable for an end user.
    ///
    /// Connection failures collapse to a short, vendor-agnostic sentence; errors
    /// caused by user input are returned verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection { category, .. } => match category {
                ConnectionFailureKind::Auth => {
                    "Authentication failed. Check the username and password.".to_string()
                }
                ConnectionFailureKind::Network => {
                    "Could not reach the database server. Check host, port and network access."
                        .to_string()
                }
                ConnectionFailureKind::Unknown => {
                    "Could not connect to the database. Check the connection settings.".to_string()
                }
            },
            Self::Execution {
                message, sql_state, ..
            } => match sql_state {
                Some(code) => format!("{} (SQLSTATE: {})", message, code),
                None => message.clone(),
            },
            _ => self.to_string(),
        }
    }

    /// Check if this error is retryable. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                category: ConnectionFailureKind::Network,
                ..
            } | Self::Timeout { .. }
        )
    }
}

impl DbError {
    /// Re-categorize an error raised while establishing a connection.
    ///
    /// Drivers report things like an unknown database or an unopenable file
    /// as statement errors; before the first statement they are connection
    /// failures.
    pub fn during_connect(self) -> Self {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::InvalidInput { .. } => self,
            Self::Execution { message, .. } => {
                let category = classify_connection_message(&message);
                DbError::connection(message, category, suggestion_for(category))
            }
            other => {
                let message = other.to_string();
                let category = classify_connection_message(&message);
                DbError::connection(message, category, suggestion_for(category))
            }
        }
    }
}

/// Categorize a free-form driver message.
pub fn classify_connection_message(message: &str) -> ConnectionFailureKind {
    let lower = message.to_lowercase();
    if lower.contains("authentication")
        || lower.contains("access denied")
        || lower.contains("login failed")
        || lower.contains("password")
        || lower.contains("not authorized")
    {
        ConnectionFailureKind::Auth
    } else if lower.contains("connection refused")
        || lower.contains("timed out")
        || lower.contains("unreachable")
        || lower.contains("no route")
        || lower.contains("dns")
        || lower.contains("failed to lookup")
        || lower.contains("network")
    {
        ConnectionFailureKind::Network
    } else {
        ConnectionFailureKind::Unknown
    }
}

fn suggestion_for(category: ConnectionFailureKind) -> &'static str {
    match category {
        ConnectionFailureKind::Auth => "Verify the username, password and account privileges",
        ConnectionFailureKind::Network => "Check network connectivity and database server status",
        ConnectionFailureKind::Unknown => "Check the connection string format and driver",
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                ConnectionFailureKind::Unknown,
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                // SQLSTATE class 28: invalid authorization specification
                if code.as_deref().is_some_and(|c| c.starts_with("28")) {
                    return DbError::connection(
                        db_err.message(),
                        ConnectionFailureKind::Auth,
                        suggestion_for(ConnectionFailureKind::Auth),
                    );
                }
                DbError::execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::execution(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                ConnectionFailureKind::Network,
                "Reconnect to the database",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                ConnectionFailureKind::Network,
                suggestion_for(ConnectionFailureKind::Network),
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                ConnectionFailureKind::Network,
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => {
                let category = classify_connection_message(&msg);
                DbError::connection(
                    format!("Protocol error: {}", msg),
                    category,
                    suggestion_for(category),
                )
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::execution(
                err.to_string(),
                None,
                "Check the SQL syntax and referenced objects",
            ),
        }
    }
}

/// Convert SQL Server driver errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;
        match err {
            // 18456: login failed for user
            TdsError::Server(token) if token.code() == 18456 => DbError::connection(
                token.message().to_string(),
                ConnectionFailureKind::Auth,
                suggestion_for(ConnectionFailureKind::Auth),
            ),
            TdsError::Server(token) => DbError::execution(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                ConnectionFailureKind::Network,
                suggestion_for(ConnectionFailureKind::Network),
            ),
            TdsError::Tls(message) => DbError::connection(
                format!("TLS error: {}", message),
                ConnectionFailureKind::Network,
                "Verify TLS configuration and certificates",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {}:{}", host, port),
                ConnectionFailureKind::Network,
                "Connect to the routed host directly",
            ),
            other => DbError::execution(other.to_string(), None, "Check the statement"),
        }
    }
}

/// Convert MongoDB driver errors to DbError.
impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind as MongoKind;
        match err.kind.as_ref() {
            MongoKind::Authentication { message, .. } => DbError::connection(
                message.clone(),
                ConnectionFailureKind::Auth,
                suggestion_for(ConnectionFailureKind::Auth),
            ),
            MongoKind::ServerSelection { message, .. } => DbError::connection(
                message.clone(),
                ConnectionFailureKind::Network,
                suggestion_for(ConnectionFailureKind::Network),
            ),
            MongoKind::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                ConnectionFailureKind::Network,
                suggestion_for(ConnectionFailureKind::Network),
            ),
            MongoKind::InvalidArgument { message, .. } => DbError::invalid_input(message.clone()),
            MongoKind::Command(command_err) => DbError::execution(
                command_err.message.clone(),
                Some(command_err.code.to_string()),
                "Check the collection name and filter",
            ),
            _ => DbError::execution(err.to_string(), None, "Check the collection name and filter"),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for engine operations.
pub type DbResult<T> = Result<T, DbError>;
