//! Per-dialect backup and restore templates.
//!
//! A [`JobPlan`] is an ordered list of steps, each either an external command
//! or an administrative SQL statement. Planning is pure: nothing is spawned or
//! connected here, so an unsupported dialect fails before any side effect.
//!
//! | Dialect           | Backup                         | Restore                              |
//! |-------------------|--------------------------------|--------------------------------------|
//! | MySQL / MariaDB   | `mysqldump --result-file`      | `mysql < file`                       |
//! | PostgreSQL        | `pg_dump --file`               | `psql --file`                        |
//! | SQL Server        | `BACKUP DATABASE` on `master`  | single-user, `RESTORE`, multi-user   |
//! | MongoDB           | `mongodump --out` (+ `docker`) | `mongorestore --drop` (+ `docker`)   |

use crate::backup::runner::CommandSpec;
use crate::config::BackupSettings;
use crate::db::driver::native_url;
use crate::dialect::{extract_database, extract_host, rewrite};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DialectTag, JobOperation};
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Name used for MongoDB artifacts when the URI names no database.
const MONGO_ALL_DATABASES: &str = "mongodb";

/// Scratch directory inside a MongoDB container.
const CONTAINER_SCRATCH_DIR: &str = "/tmp";

/// When a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Runs only while every earlier step succeeded
    Main,
    /// Runs regardless of earlier failures; its own failure fails the job
    Finally,
    /// Runs regardless of earlier failures; its own failure is only logged
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(CommandSpec),
    AdminSql {
        descriptor: ConnectionDescriptor,
        statement: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub action: Action,
}

impl Step {
    fn main(action: Action) -> Self {
        Self {
            kind: StepKind::Main,
            action,
        }
    }

    fn finally(action: Action) -> Self {
        Self {
            kind: StepKind::Finally,
            action,
        }
    }

    fn cleanup(action: Action) -> Self {
        Self {
            kind: StepKind::Cleanup,
            action,
        }
    }

    /// Short label for logs and diagnostics.
    pub fn label(&self) -> String {
        match &self.action {
            Action::Run(command) => command.program.clone(),
            Action::AdminSql { statement, .. } => statement
                .split_whitespace()
                .take(2)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobPlan {
    pub dialect: DialectTag,
    pub database: Option<String>,
    pub steps: Vec<Step>,
    /// Backup artifact path as the server or tool sees it
    pub artifact: Option<PathBuf>,
    /// Whether `artifact` lives on this host (false for SQL Server, whose
    /// server process writes the file)
    pub local_artifact: bool,
}

/// Fail with `UnsupportedOperation` for dialects without a template.
pub fn ensure_supported(dialect: DialectTag, operation: JobOperation) -> DbResult<()> {
    match dialect {
        DialectTag::MySQL
        | DialectTag::MariaDB
        | DialectTag::PostgreSQL
        | DialectTag::SQLServer
        | DialectTag::MongoDB => Ok(()),
        other => Err(DbError::unsupported_operation(
            operation.to_string(),
            other.to_string(),
        )),
    }
}

/// `<database>_<epoch-millis>` plus the vendor's extension.
pub fn artifact_name(dialect: DialectTag, database: &str, epoch_millis: i64) -> String {
    let stem = format!("{}_{}", sanitize(database), epoch_millis);
    match dialect {
        DialectTag::SQLServer => format!("{}.bak", stem),
        DialectTag::MongoDB => stem,
        _ => format!("{}.sql", stem),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn backup_plan(
    descriptor: &ConnectionDescriptor,
    dialect: DialectTag,
    settings: &BackupSettings,
    epoch_millis: i64,
) -> DbResult<JobPlan> {
    ensure_supported(dialect, JobOperation::Backup)?;

    if dialect == DialectTag::MongoDB {
        return mongo_backup(descriptor, settings, epoch_millis);
    }

    let database = required_database(descriptor, dialect)?;
    let artifact = settings
        .backup_dir
        .join(artifact_name(dialect, &database, epoch_millis));

    let steps = match dialect {
        DialectTag::MySQL | DialectTag::MariaDB => {
            let command = mysql_base(&settings.tools.mysqldump, descriptor, dialect)
                .args(["--single-transaction", "--routines", "--triggers"])
                .arg(format!("--result-file={}", artifact.display()))
                .arg(database.as_str());
            vec![Step::main(Action::Run(command))]
        }
        DialectTag::PostgreSQL => {
            let command = postgres_base(&settings.tools.pg_dump, descriptor)
                .args(["--format=plain", "--no-owner"])
                .arg(format!("--file={}", artifact.display()))
                .arg(database.as_str());
            vec![Step::main(Action::Run(command))]
        }
        DialectTag::SQLServer => {
            let statement = format!(
                "BACKUP DATABASE {} TO DISK = {} WITH INIT",
                quote_ident(&database),
                quote_literal(&artifact.display().to_string())
            );
            vec![Step::main(admin_sql(descriptor, statement))]
        }
        other => {
            return Err(DbError::unsupported_operation(
                JobOperation::Backup.to_string(),
                other.to_string(),
            ));
        }
    };

    Ok(JobPlan {
        dialect,
        database: Some(database),
        steps,
        artifact: Some(artifact),
        local_artifact: dialect != DialectTag::SQLServer,
    })
}

pub fn restore_plan(
    descriptor: &ConnectionDescriptor,
    dialect: DialectTag,
    input: &Path,
    settings: &BackupSettings,
    epoch_millis: i64,
) -> DbResult<JobPlan> {
    ensure_supported(dialect, JobOperation::Restore)?;

    if dialect == DialectTag::MongoDB {
        return mongo_restore(descriptor, input, settings, epoch_millis);
    }

    let database = required_database(descriptor, dialect)?;
    let steps = match dialect {
        DialectTag::MySQL | DialectTag::MariaDB => {
            let command = mysql_base(&settings.tools.mysql, descriptor, dialect)
                .arg(database.as_str())
                .stdin_from(input);
            vec![Step::main(Action::Run(command))]
        }
        DialectTag::PostgreSQL => {
            let command = postgres_base(&settings.tools.psql, descriptor)
                .args(["--set", "ON_ERROR_STOP=1", "--quiet"])
                .arg(format!("--dbname={}", database))
                .arg(format!("--file={}", input.display()));
            vec![Step::main(Action::Run(command))]
        }
        DialectTag::SQLServer => {
            let db = quote_ident(&database);
            vec![
                Step::main(admin_sql(
                    descriptor,
                    format!("ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE", db),
                )),
                Step::main(admin_sql(
                    descriptor,
                    format!(
                        "RESTORE DATABASE {} FROM DISK = {} WITH REPLACE",
                        db,
                        quote_literal(&input.display().to_string())
                    ),
                )),
                Step::finally(admin_sql(
                    descriptor,
                    format!("ALTER DATABASE {} SET MULTI_USER", db),
                )),
            ]
        }
        other => {
            return Err(DbError::unsupported_operation(
                JobOperation::Restore.to_string(),
                other.to_string(),
            ));
        }
    };

    Ok(JobPlan {
        dialect,
        database: Some(database),
        steps,
        artifact: None,
        local_artifact: false,
    })
}

fn mongo_backup(
    descriptor: &ConnectionDescriptor,
    settings: &BackupSettings,
    epoch_millis: i64,
) -> DbResult<JobPlan> {
    let database = extract_database(DialectTag::MongoDB, descriptor.connection_string());
    let name = artifact_name(
        DialectTag::MongoDB,
        database.as_deref().unwrap_or(MONGO_ALL_DATABASES),
        epoch_millis,
    );
    let artifact = settings.backup_dir.join(&name);
    let tools = &settings.tools;

    let steps = match &settings.mongo_container {
        None => {
            let command = mongo_base(&tools.mongodump, descriptor)
                .arg(format!("--out={}", artifact.display()));
            vec![Step::main(Action::Run(command))]
        }
        Some(container) => {
            let scratch = container_scratch(&name);
            let dump = mongo_base(&tools.mongodump, descriptor).arg(format!("--out={}", scratch));
            vec![
                Step::main(Action::Run(docker_exec(&tools.docker, container, dump))),
                Step::main(Action::Run(
                    CommandSpec::new(&tools.docker)
                        .arg("cp")
                        .arg(format!("{}:{}", container, scratch))
                        .arg(artifact.display().to_string()),
                )),
                Step::cleanup(Action::Run(docker_remove(&tools.docker, container, &scratch))),
            ]
        }
    };

    Ok(JobPlan {
        dialect: DialectTag::MongoDB,
        database,
        steps,
        artifact: Some(artifact),
        local_artifact: true,
    })
}

/// A directory is treated as `mongodump --out` output; a file as an
/// `--archive`, gzipped when it ends in `.gz`.
fn mongo_restore(
    descriptor: &ConnectionDescriptor,
    input: &Path,
    settings: &BackupSettings,
    epoch_millis: i64,
) -> DbResult<JobPlan> {
    let tools = &settings.tools;
    let is_dir = input.is_dir();
    let gzip = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

    let source_args = |path: &str| -> Vec<String> {
        match (is_dir, gzip) {
            (true, _) => vec![path.to_string()],
            (false, true) => vec![format!("--archive={}", path), "--gzip".to_string()],
            (false, false) => vec![format!("--archive={}", path)],
        }
    };

    let steps = match &settings.mongo_container {
        None => {
            let command = mongo_base(&tools.mongorestore, descriptor)
                .arg("--drop")
                .args(source_args(&input.display().to_string()));
            vec![Step::main(Action::Run(command))]
        }
        Some(container) => {
            let scratch = container_scratch(&format!("restore_{}", epoch_millis));
            let restore = mongo_base(&tools.mongorestore, descriptor)
                .arg("--drop")
                .args(source_args(&scratch));
            vec![
                Step::main(Action::Run(
                    CommandSpec::new(&tools.docker)
                        .arg("cp")
                        .arg(input.display().to_string())
                        .arg(format!("{}:{}", container, scratch)),
                )),
                Step::main(Action::Run(docker_exec(&tools.docker, container, restore))),
                Step::cleanup(Action::Run(docker_remove(&tools.docker, container, &scratch))),
            ]
        }
    };

    Ok(JobPlan {
        dialect: DialectTag::MongoDB,
        database: extract_database(DialectTag::MongoDB, descriptor.connection_string()),
        steps,
        artifact: None,
        local_artifact: false,
    })
}

fn required_database(descriptor: &ConnectionDescriptor, dialect: DialectTag) -> DbResult<String> {
    extract_database(dialect, descriptor.connection_string()).ok_or_else(|| {
        DbError::invalid_input(format!(
            "The {} connection string names no database",
            dialect
        ))
    })
}

/// Host and port for command-line tools.
fn endpoint(descriptor: &ConnectionDescriptor, dialect: DialectTag) -> (String, Option<u16>) {
    let host = extract_host(dialect, descriptor.connection_string());
    let port = Url::parse(&native_url(descriptor, "tcp"))
        .ok()
        .and_then(|url| url.port())
        .or_else(|| dialect.default_port());
    (host, port)
}

fn mysql_base(program: &str, descriptor: &ConnectionDescriptor, dialect: DialectTag) -> CommandSpec {
    let (host, port) = endpoint(descriptor, dialect);
    let mut command = CommandSpec::new(program).arg(format!("--host={}", host));
    if let Some(port) = port {
        command = command.arg(format!("--port={}", port));
    }
    if !descriptor.username().is_empty() {
        command = command.arg(format!("--user={}", descriptor.username()));
    }
    if !descriptor.password().is_empty() {
        command = command.env("MYSQL_PWD", descriptor.password());
    }
    command
}

fn postgres_base(program: &str, descriptor: &ConnectionDescriptor) -> CommandSpec {
    let (host, port) = endpoint(descriptor, DialectTag::PostgreSQL);
    let mut command = CommandSpec::new(program)
        .arg(format!("--host={}", host))
        .arg("--no-password");
    if let Some(port) = port {
        command = command.arg(format!("--port={}", port));
    }
    if !descriptor.username().is_empty() {
        command = command.arg(format!("--username={}", descriptor.username()));
    }
    if !descriptor.password().is_empty() {
        command = command.env("PGPASSWORD", descriptor.password());
    }
    command
}

/// Credentials in the URI win over the descriptor's.
fn mongo_base(program: &str, descriptor: &ConnectionDescriptor) -> CommandSpec {
    let uri = descriptor.connection_string();
    let mut command = CommandSpec::new(program).arg(format!("--uri={}", uri));
    if !uri_has_credentials(uri) && !descriptor.username().is_empty() {
        command = command
            .arg(format!("--username={}", descriptor.username()))
            .arg(format!("--password={}", descriptor.password()))
            .arg("--authenticationDatabase=admin");
    }
    command
}

fn uri_has_credentials(uri: &str) -> bool {
    let authority = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(uri)
        .split(['/', '?'])
        .next()
        .unwrap_or_default();
    authority.contains('@')
}

/// Per-job path inside the container; jobs started in the same millisecond
/// must not share it.
fn container_scratch(stem: &str) -> String {
    format!("{}/{}_{}", CONTAINER_SCRATCH_DIR, stem, Uuid::new_v4().simple())
}

fn docker_exec(docker: &str, container: &str, inner: CommandSpec) -> CommandSpec {
    CommandSpec::new(docker)
        .args(["exec", container])
        .arg(inner.program)
        .args(inner.args)
}

fn docker_remove(docker: &str, container: &str, path: &str) -> CommandSpec {
    CommandSpec::new(docker).args(["exec", container, "rm", "-rf", path])
}

/// Administrative statements run against `master`.
fn admin_sql(descriptor: &ConnectionDescriptor, statement: String) -> Action {
    let master = descriptor.with_connection_string(rewrite(
        DialectTag::SQLServer,
        descriptor.connection_string(),
        "master",
    ));
    Action::AdminSql {
        descriptor: master,
        statement,
    }
}

fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BackupSettings {
        BackupSettings {
            backup_dir: PathBuf::from("/var/backups"),
            ..BackupSettings::default()
        }
    }

    fn commands(plan: &JobPlan) -> Vec<&CommandSpec> {
        plan.steps
            .iter()
            .filter_map(|step| match &step.action {
                Action::Run(command) => Some(command),
                Action::AdminSql { .. } => None,
            })
            .collect()
    }

    fn statements(plan: &JobPlan) -> Vec<(StepKind, &str)> {
        plan.steps
            .iter()
            .filter_map(|step| match &step.action {
                Action::AdminSql { statement, .. } => Some((step.kind, statement.as_str())),
                Action::Run(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(DialectTag::MySQL, "shop", 1700000000000), "shop_1700000000000.sql");
        assert_eq!(artifact_name(DialectTag::SQLServer, "shop", 1), "shop_1.bak");
        assert_eq!(artifact_name(DialectTag::MongoDB, "shop", 1), "shop_1");
        assert_eq!(artifact_name(DialectTag::PostgreSQL, "a/b c", 1), "a_b_c_1.sql");
    }

    #[test]
    fn test_mysql_backup_passes_password_through_env() {
        let desc = ConnectionDescriptor::new("jdbc:mysql://db.local:3307/shop?useSSL=false", "root", "s3cret");
        let plan = backup_plan(&desc, DialectTag::MySQL, &settings(), 42).unwrap();
        let command = commands(&plan)[0];

        assert_eq!(command.program, "mysqldump");
        assert!(command.args.contains(&"--host=db.local".to_string()));
        assert!(command.args.contains(&"--port=3307".to_string()));
        assert!(command.args.contains(&"--user=root".to_string()));
        assert!(command.args.contains(&"--result-file=/var/backups/shop_42.sql".to_string()));
        assert_eq!(command.args.last().map(String::as_str), Some("shop"));
        assert!(command.args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(command.env, vec![("MYSQL_PWD".to_string(), "s3cret".to_string())]);
        assert_eq!(plan.artifact, Some(PathBuf::from("/var/backups/shop_42.sql")));
        assert!(plan.local_artifact);
    }

    #[test]
    fn test_mysql_restore_reads_stdin() {
        let desc = ConnectionDescriptor::new("jdbc:mariadb://db.local/shop", "root", "");
        let plan = restore_plan(&desc, DialectTag::MariaDB, Path::new("/tmp/in.sql"), &settings(), 1)
            .unwrap();
        let command = commands(&plan)[0];
        assert_eq!(command.program, "mysql");
        assert_eq!(command.stdin, Some(PathBuf::from("/tmp/in.sql")));
        assert!(command.args.contains(&"--port=3306".to_string()));
        assert!(command.env.is_empty());
    }

    #[test]
    fn test_postgres_templates() {
        let desc = ConnectionDescriptor::new("jdbc:postgresql://pg:5433/app", "postgres", "pw");
        let plan = backup_plan(&desc, DialectTag::PostgreSQL, &settings(), 7).unwrap();
        let dump = commands(&plan)[0];
        assert_eq!(dump.program, "pg_dump");
        assert!(dump.args.contains(&"--file=/var/backups/app_7.sql".to_string()));
        assert!(dump.args.contains(&"--port=5433".to_string()));
        assert!(dump.args.contains(&"--username=postgres".to_string()));
        assert_eq!(dump.env, vec![("PGPASSWORD".to_string(), "pw".to_string())]);

        let plan = restore_plan(&desc, DialectTag::PostgreSQL, Path::new("/in.sql"), &settings(), 7)
            .unwrap();
        let psql = commands(&plan)[0];
        assert_eq!(psql.program, "psql");
        assert!(psql.args.contains(&"--dbname=app".to_string()));
        assert!(psql.args.contains(&"--file=/in.sql".to_string()));
        assert!(psql.args.contains(&"ON_ERROR_STOP=1".to_string()));
    }

    #[test]
    fn test_sql_server_backup_targets_master() {
        let desc = ConnectionDescriptor::new(
            "jdbc:sqlserver://mssql:1433;databaseName=Sales;encrypt=false",
            "sa",
            "pw",
        );
        let plan = backup_plan(&desc, DialectTag::SQLServer, &settings(), 5).unwrap();
        assert!(!plan.local_artifact);
        assert_eq!(
            statements(&plan),
            vec![(
                StepKind::Main,
                "BACKUP DATABASE [Sales] TO DISK = N'/var/backups/Sales_5.bak' WITH INIT"
            )]
        );
        let Action::AdminSql { descriptor, .. } = &plan.steps[0].action else {
            panic!("expected admin SQL");
        };
        assert!(descriptor.connection_string().contains("databaseName=master"));
        assert_eq!(descriptor.username(), "sa");
    }

    #[test]
    fn test_sql_server_restore_always_returns_to_multi_user() {
        let desc = ConnectionDescriptor::new("jdbc:sqlserver://mssql;databaseName=Sales", "sa", "pw");
        let plan = restore_plan(
            &desc,
            DialectTag::SQLServer,
            Path::new("C:\\backups\\it's.bak"),
            &settings(),
            5,
        )
        .unwrap();
        assert_eq!(
            statements(&plan),
            vec![
                (
                    StepKind::Main,
                    "ALTER DATABASE [Sales] SET SINGLE_USER WITH ROLLBACK IMMEDIATE"
                ),
                (
                    StepKind::Main,
                    "RESTORE DATABASE [Sales] FROM DISK = N'C:\\backups\\it''s.bak' WITH REPLACE"
                ),
                (StepKind::Finally, "ALTER DATABASE [Sales] SET MULTI_USER"),
            ]
        );
    }

    #[test]
    fn test_mongo_backup_direct() {
        let desc = ConnectionDescriptor::new("mongodb://mongo:27017/app?authSource=admin", "u", "p");
        let plan = backup_plan(&desc, DialectTag::MongoDB, &settings(), 9).unwrap();
        let dump = commands(&plan)[0];
        assert_eq!(dump.program, "mongodump");
        assert!(dump.args.contains(&"--out=/var/backups/app_9".to_string()));
        assert!(dump.args.contains(&"--username=u".to_string()));
        assert_eq!(plan.artifact, Some(PathBuf::from("/var/backups/app_9")));
    }

    #[test]
    fn test_mongo_backup_through_container() {
        let desc = ConnectionDescriptor::new("mongodb://admin:pw@mongo:27017", "", "");
        let settings = BackupSettings {
            mongo_container: Some("mongo1".to_string()),
            ..settings()
        };
        let plan = backup_plan(&desc, DialectTag::MongoDB, &settings, 9).unwrap();
        let kinds: Vec<StepKind> = plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StepKind::Main, StepKind::Main, StepKind::Cleanup]);

        let cmds = commands(&plan);
        assert_eq!(cmds[0].args[..3], ["exec", "mongo1", "mongodump"]);
        assert!(!cmds[0].args.iter().any(|a| a.starts_with("--username")));
        let scratch = cmds[0]
            .args
            .iter()
            .find_map(|a| a.strip_prefix("--out="))
            .unwrap()
            .to_string();
        assert!(scratch.starts_with("/tmp/mongodb_9_"), "{}", scratch);
        assert_eq!(
            cmds[1].args,
            vec!["cp".to_string(), format!("mongo1:{}", scratch), "/var/backups/mongodb_9".to_string()]
        );
        assert_eq!(cmds[2].args, vec!["exec", "mongo1", "rm", "-rf", scratch.as_str()]);
    }

    #[test]
    fn test_container_scratch_is_unique_per_job() {
        let desc = ConnectionDescriptor::new("mongodb://mongo/app", "", "");
        let settings = BackupSettings {
            mongo_container: Some("mongo1".to_string()),
            ..settings()
        };
        let scratch = |plan: &JobPlan| commands(plan)[2].args[4].clone();

        let first = backup_plan(&desc, DialectTag::MongoDB, &settings, 7).unwrap();
        let second = backup_plan(&desc, DialectTag::MongoDB, &settings, 7).unwrap();
        assert_eq!(first.artifact, second.artifact);
        assert_ne!(scratch(&first), scratch(&second));

        let input = Path::new("/x/app.archive");
        let first = restore_plan(&desc, DialectTag::MongoDB, input, &settings, 7).unwrap();
        let second = restore_plan(&desc, DialectTag::MongoDB, input, &settings, 7).unwrap();
        assert!(scratch(&first).starts_with("/tmp/restore_7_"));
        assert_ne!(scratch(&first), scratch(&second));
    }

    #[test]
    fn test_mongo_restore_archive_forms() {
        let desc = ConnectionDescriptor::new("mongodb://mongo/app", "", "");
        let plan =
            restore_plan(&desc, DialectTag::MongoDB, Path::new("/x/app.archive.gz"), &settings(), 1)
                .unwrap();
        let restore = commands(&plan)[0];
        assert!(restore.args.contains(&"--drop".to_string()));
        assert!(restore.args.contains(&"--archive=/x/app.archive.gz".to_string()));
        assert!(restore.args.contains(&"--gzip".to_string()));

        let plan =
            restore_plan(&desc, DialectTag::MongoDB, Path::new("/x/app.archive"), &settings(), 1)
                .unwrap();
        let restore = commands(&plan)[0];
        assert!(!restore.args.contains(&"--gzip".to_string()));
    }

    #[test]
    fn test_unsupported_dialects() {
        let desc = ConnectionDescriptor::new("jdbc:derby:memory:test", "", "");
        for dialect in [
            DialectTag::Derby,
            DialectTag::Oracle,
            DialectTag::DB2,
            DialectTag::Sybase,
            DialectTag::H2,
            DialectTag::SQLite,
            DialectTag::Unknown,
        ] {
            let err = backup_plan(&desc, dialect, &settings(), 1).unwrap_err();
            assert!(matches!(err, DbError::UnsupportedOperation { .. }), "{}", dialect);
            let err = restore_plan(&desc, dialect, Path::new("/x"), &settings(), 1).unwrap_err();
            assert!(matches!(err, DbError::UnsupportedOperation { .. }), "{}", dialect);
        }
    }

    #[test]
    fn test_missing_database_is_invalid_input() {
        let desc = ConnectionDescriptor::new("jdbc:postgresql://pg:5432", "", "");
        let err = backup_plan(&desc, DialectTag::PostgreSQL, &settings(), 1).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("we]ird"), "[we]]ird]");
        assert_eq!(quote_literal("o'brien"), "N'o''brien'");
        assert!(uri_has_credentials("mongodb://a:b@h/db"));
        assert!(!uri_has_credentials("mongodb://h/db?x=a@b"));
    }
}
