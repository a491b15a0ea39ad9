//! Configuration handling for DB Studio.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! The library itself only sees [`EngineSettings`] and [`BackupSettings`], so it can be
//! driven without clap.

use crate::models::{ConnectionDescriptor, DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT_SECS};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

/// Timeouts for the query path.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub query_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Program names (or absolute paths) of the external dump/restore tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub mysqldump: String,
    pub mysql: String,
    pub pg_dump: String,
    pub psql: String,
    pub mongodump: String,
    pub mongorestore: String,
    pub docker: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mysqldump: "mysqldump".to_string(),
            mysql: "mysql".to_string(),
            pg_dump: "pg_dump".to_string(),
            psql: "psql".to_string(),
            mongodump: "mongodump".to_string(),
            mongorestore: "mongorestore".to_string(),
            docker: "docker".to_string(),
        }
    }
}

/// Settings for backup and restore jobs.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Where backup artifacts are written
    pub backup_dir: PathBuf,
    pub tools: ToolPaths,
    /// Upper bound on a single external process or admin statement
    pub job_timeout: Duration,
    pub max_concurrent_jobs: usize,
    /// When set, mongodump/mongorestore run through `docker exec` in this container
    pub mongo_container: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            tools: ToolPaths::default(),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            mongo_container: None,
        }
    }
}

/// Output format for tabular results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// JSON document (default)
    #[default]
    Json,
    /// ASCII table (like the MySQL CLI)
    Table,
    /// Markdown table
    Markdown,
    /// RFC 4180 CSV
    Csv,
}

/// Connection given on the command line.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// JDBC-style connection URL or MongoDB URI
    #[arg(short, long, env = "DB_STUDIO_URL")]
    pub url: String,

    /// Username
    #[arg(long, default_value = "", env = "DB_STUDIO_USER")]
    pub user: String,

    /// Password (prefer the environment variable)
    #[arg(long, default_value = "", env = "DB_STUDIO_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Driver class name or dialect name, used when the URL prefix is not recognized
    #[arg(long, env = "DB_STUDIO_DRIVER")]
    pub driver: Option<String>,
}

impl ConnectionArgs {
    pub fn descriptor(&self) -> ConnectionDescriptor {
        let descriptor = ConnectionDescriptor::new(&self.url, &self.user, &self.password);
        match &self.driver {
            Some(hint) => descriptor.with_driver_hint(hint),
            None => descriptor,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the dialect of a connection string
    Classify {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Point a connection string at another database
    Rewrite {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Target database name
        #[arg(long)]
        database: String,
    },
    /// Show the statement that would be sent to the server
    Normalize {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long)]
        sql: String,
        /// Page number (enables pagination)
        #[arg(long)]
        page: Option<u32>,
    },
    /// Open and close a connection
    Test {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Run a statement (or `collection|filter` for MongoDB)
    Query {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long)]
        sql: String,
        /// Page number (enables pagination)
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// List tables (or collections)
    Tables {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// List views
    Views {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// List stored procedures
    Procedures {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// List columns of a table as `name TYPE`
    Columns {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long)]
        table: String,
    },
    /// List databases on the server
    Databases {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Dump the database into the backup directory
    Backup {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Load an artifact into the database
    Restore {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Dump file or dump directory
        #[arg(long)]
        file: PathBuf,
    },
}

/// Configuration for DB Studio.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-studio",
    about = "Vendor-agnostic database console - query, browse, back up and restore",
    version,
    author
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Query timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "DB_STUDIO_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DB_STUDIO_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Rows per page when --page is given
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_PAGE_SIZE,
        env = "DB_STUDIO_PAGE_SIZE"
    )]
    pub page_size: u32,

    /// Directory backup artifacts are written to
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_BACKUP_DIR,
        env = "DB_STUDIO_BACKUP_DIR"
    )]
    pub backup_dir: PathBuf,

    /// Backup/restore timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_JOB_TIMEOUT_SECS,
        env = "DB_STUDIO_JOB_TIMEOUT"
    )]
    pub job_timeout: u64,

    /// Maximum number of backup/restore jobs running at once
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_CONCURRENT_JOBS,
        env = "DB_STUDIO_MAX_CONCURRENT_JOBS"
    )]
    pub max_concurrent_jobs: usize,

    /// Run mongodump/mongorestore inside this container via `docker exec`
    #[arg(long, global = true, env = "DB_STUDIO_MONGO_CONTAINER")]
    pub mongo_container: Option<String>,

    #[arg(long, global = true, default_value = "mysqldump", env = "DB_STUDIO_MYSQLDUMP")]
    pub mysqldump_path: String,

    #[arg(long, global = true, default_value = "mysql", env = "DB_STUDIO_MYSQL")]
    pub mysql_path: String,

    #[arg(long, global = true, default_value = "pg_dump", env = "DB_STUDIO_PG_DUMP")]
    pub pg_dump_path: String,

    #[arg(long, global = true, default_value = "psql", env = "DB_STUDIO_PSQL")]
    pub psql_path: String,

    #[arg(long, global = true, default_value = "mongodump", env = "DB_STUDIO_MONGODUMP")]
    pub mongodump_path: String,

    #[arg(
        long,
        global = true,
        default_value = "mongorestore",
        env = "DB_STUDIO_MONGORESTORE"
    )]
    pub mongorestore_path: String,

    #[arg(long, global = true, default_value = "docker", env = "DB_STUDIO_DOCKER")]
    pub docker_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "DB_STUDIO_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true, env = "DB_STUDIO_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            query_timeout: self.query_timeout_duration(),
            connect_timeout: self.connect_timeout_duration(),
        }
    }

    pub fn backup_settings(&self) -> BackupSettings {
        BackupSettings {
            backup_dir: self.backup_dir.clone(),
            tools: ToolPaths {
                mysqldump: self.mysqldump_path.clone(),
                mysql: self.mysql_path.clone(),
                pg_dump: self.pg_dump_path.clone(),
                psql: self.psql_path.clone(),
                mongodump: self.mongodump_path.clone(),
                mongorestore: self.mongorestore_path.clone(),
                docker: self.docker_path.clone(),
            },
            job_timeout: Duration::from_secs(self.job_timeout),
            max_concurrent_jobs: self.max_concurrent_jobs.max(1),
            mongo_container: self
                .mongo_container
                .clone()
                .filter(|c| !c.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["db-studio", "classify", "--url", "jdbc:h2:mem:x"]);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.backup_dir, PathBuf::from(DEFAULT_BACKUP_DIR));
        assert_eq!(config.backup_settings().tools, ToolPaths::default());
        assert!(!config.json_logs);
    }

    #[test]
    fn test_timeout_durations() {
        let config = parse(&[
            "db-studio",
            "--query-timeout",
            "60",
            "test",
            "--url",
            "jdbc:h2:mem:x",
            "--connect-timeout",
            "5",
        ]);
        let settings = config.engine_settings();
        assert_eq!(settings.query_timeout, Duration::from_secs(60));
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_connection_args_build_descriptor() {
        let config = parse(&[
            "db-studio",
            "query",
            "--url",
            "jdbc:custom://h/db",
            "--user",
            "sa",
            "--password",
            "pw",
            "--driver",
            "org.postgresql.Driver",
            "--sql",
            "select 1",
        ]);
        let Command::Query { connection, .. } = config.command else {
            panic!("expected query command");
        };
        let descriptor = connection.descriptor();
        assert_eq!(descriptor.username(), "sa");
        assert_eq!(descriptor.password(), "pw");
        assert_eq!(descriptor.driver_hint(), Some("org.postgresql.Driver"));
    }

    #[test]
    fn test_backup_settings_ignore_blank_container() {
        let config = parse(&[
            "db-studio",
            "backup",
            "--url",
            "mongodb://h/app",
            "--mongo-container",
            "  ",
            "--max-concurrent-jobs",
            "0",
        ]);
        let settings = config.backup_settings();
        assert_eq!(settings.mongo_container, None);
        assert_eq!(settings.max_concurrent_jobs, 1);
    }
}
