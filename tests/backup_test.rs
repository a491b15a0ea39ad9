//! Backup/restore orchestration with a fake process runner and a fake admin
//! SQL executor. No database server or dump tool is needed.
//!
//! Tests verify that:
//! - Unsupported dialects fail without spawning anything
//! - Tool exit codes and stderr become the job outcome
//! - A failed backup leaves no artifact behind
//! - SQL Server restore always attempts to return to multi-user mode
//! - Uploaded artifacts are removed whatever the outcome
//! - Running jobs can be cancelled and are bounded by the job limit

use async_trait::async_trait;
use db_studio::backup::{
    AdminExecutor, BackupOrchestrator, CommandOutput, CommandRunner, CommandSpec, RunControl,
};
use db_studio::config::BackupSettings;
use db_studio::error::{DbError, DbResult, ErrorKind};
use db_studio::models::{
    BackupJob, ConnectionDescriptor, JobStatus, RestoreJob, RestoreSource,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    /// Whether the stdin file existed when the command ran
    stdin_seen: Mutex<Vec<bool>>,
    /// Program -> output; anything else exits 0
    outputs: HashMap<String, CommandOutput>,
    /// Block until cancelled instead of returning
    block: bool,
    /// Write the `--result-file=` target before returning
    writes_result_file: bool,
}

impl FakeRunner {
    fn failing(program: &str, exit_code: i32, stderr: &str) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(
            program.to_string(),
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
        Self {
            outputs,
            ..Self::default()
        }
    }

    fn blocking() -> Self {
        Self {
            block: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec, control: &RunControl) -> DbResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        if let Some(path) = &command.stdin {
            self.stdin_seen.lock().unwrap().push(path.exists());
        }
        if self.writes_result_file {
            if let Some(path) = command.args.iter().find_map(|a| a.strip_prefix("--result-file=")) {
                std::fs::write(path, b"-- MySQL dump (incomplete)\n").unwrap();
            }
        }
        if self.block {
            control.cancel.cancelled().await;
            return Err(DbError::cancelled(command.program.clone()));
        }
        let key = match command.program.as_str() {
            "docker" => format!("docker {}", command.args.first().cloned().unwrap_or_default()),
            other => other.to_string(),
        };
        Ok(self.outputs.get(&key).cloned().unwrap_or(CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }))
    }
}

#[derive(Default)]
struct FakeAdmin {
    statements: Mutex<Vec<(String, String)>>,
    /// Statements starting with this prefix fail
    fail_on: Option<String>,
}

impl FakeAdmin {
    fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdminExecutor for FakeAdmin {
    async fn execute(&self, descriptor: &ConnectionDescriptor, statement: &str) -> DbResult<()> {
        self.statements.lock().unwrap().push((
            descriptor.connection_string().to_string(),
            statement.to_string(),
        ));
        match &self.fail_on {
            Some(prefix) if statement.starts_with(prefix.as_str()) => Err(DbError::execution(
                "Exclusive access could not be obtained because the database is in use",
                Some("42000".to_string()),
                "Close other sessions",
            )),
            _ => Ok(()),
        }
    }
}

fn orchestrator(
    runner: Arc<FakeRunner>,
    admin: Arc<FakeAdmin>,
    backup_dir: PathBuf,
) -> BackupOrchestrator {
    let settings = BackupSettings {
        backup_dir,
        job_timeout: Duration::from_secs(30),
        ..BackupSettings::default()
    };
    BackupOrchestrator::with_components(settings, runner, admin)
}

fn mysql() -> ConnectionDescriptor {
    ConnectionDescriptor::new("jdbc:mysql://db.local:3306/shop", "root", "s3cret")
}

async fn wait_for_running(orchestrator: &BackupOrchestrator, count: usize) {
    for _ in 0..200 {
        if orchestrator.registry().len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} running jobs", count);
}

#[tokio::test]
async fn test_unsupported_dialect_never_spawns() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let admin = Arc::new(FakeAdmin::default());
    let orch = orchestrator(runner.clone(), admin.clone(), dir.path().to_path_buf());

    let derby = ConnectionDescriptor::new("jdbc:derby://localhost:1527/demo", "", "");
    let outcome = orch.backup(BackupJob::new(derby.clone(), dir.path())).await;
    assert!(!outcome.success);
    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::UnsupportedOperation));
    assert!(outcome.diagnostic.contains("Derby"), "{}", outcome.diagnostic);

    let upload = RestoreSource::Upload {
        filename: "demo.sql".into(),
        bytes: b"create table t (id int);".to_vec(),
    };
    let outcome = orch.restore(RestoreJob::new(derby, upload)).await;
    assert_eq!(outcome.error_kind, Some(ErrorKind::UnsupportedOperation));

    assert!(runner.calls().is_empty());
    assert!(admin.statements().is_empty());
}

#[tokio::test]
async fn test_mysql_backup_success() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested/backups");
    let runner = Arc::new(FakeRunner::default());
    let orch = orchestrator(runner.clone(), Arc::new(FakeAdmin::default()), target.clone());

    let outcome = orch.backup(BackupJob::new(mysql(), &target)).await;

    assert!(outcome.success, "{}", outcome.diagnostic);
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert!(target.is_dir());

    let artifact = outcome.artifact.unwrap();
    assert_eq!(artifact.parent(), Some(target.as_path()));
    let name = artifact.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("shop_") && name.ends_with(".sql"), "{}", name);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "mysqldump");
    assert!(calls[0].args.iter().all(|a| !a.contains("s3cret")));
    assert!(orch.registry().is_empty().await);
}

#[tokio::test]
async fn test_tool_failure_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::failing(
        "pg_dump",
        1,
        "pg_dump: error: connection to server failed\nFATAL: password authentication failed",
    ));
    let orch = orchestrator(runner, Arc::new(FakeAdmin::default()), dir.path().to_path_buf());

    let desc = ConnectionDescriptor::new("jdbc:postgresql://pg/app", "postgres", "bad");
    let outcome = orch.backup(BackupJob::new(desc, dir.path())).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ProcessFailure));
    assert!(outcome.diagnostic.contains("password authentication failed"));
    assert!(outcome.artifact.is_none());
}

#[tokio::test]
async fn test_failed_backup_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner {
        writes_result_file: true,
        ..FakeRunner::failing("mysqldump", 2, "mysqldump: Error 2013: Lost connection to server")
    });
    let orch = orchestrator(runner.clone(), Arc::new(FakeAdmin::default()), dir.path().to_path_buf());

    let outcome = orch.backup(BackupJob::new(mysql(), dir.path())).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ProcessFailure));
    assert_eq!(runner.calls().len(), 1);
    let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(left.is_empty(), "{:?}", left);
}

#[tokio::test]
async fn test_sql_server_restore_failure_still_returns_to_multi_user() {
    let dir = TempDir::new().unwrap();
    let bak = dir.path().join("Sales_1.bak");
    std::fs::write(&bak, b"backup").unwrap();

    let runner = Arc::new(FakeRunner::default());
    let admin = Arc::new(FakeAdmin {
        fail_on: Some("RESTORE".into()),
        ..FakeAdmin::default()
    });
    let orch = orchestrator(runner.clone(), admin.clone(), dir.path().to_path_buf());

    let desc = ConnectionDescriptor::new("jdbc:sqlserver://mssql:1433;databaseName=Sales", "sa", "pw");
    let outcome = orch
        .restore(RestoreJob::new(desc, RestoreSource::Path(bak.clone())))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ExecutionError));

    let statements = admin.statements();
    let sql: Vec<&str> = statements.iter().map(|(_, s)| s.as_str()).collect();
    assert_eq!(sql.len(), 3);
    assert!(sql[0].contains("SINGLE_USER"));
    assert!(sql[1].starts_with("RESTORE DATABASE [Sales]"));
    assert_eq!(sql[2], "ALTER DATABASE [Sales] SET MULTI_USER");
    assert!(statements.iter().all(|(cs, _)| cs.contains("databaseName=master")));
    assert!(runner.calls().is_empty());
    assert!(bak.exists());
}

#[tokio::test]
async fn test_uploaded_artifact_removed_after_success_and_failure() {
    let dir = TempDir::new().unwrap();

    for runner in [
        FakeRunner::default(),
        FakeRunner::failing("mysql", 1, "ERROR 1064 (42000): You have an error in your SQL syntax"),
    ] {
        let runner = Arc::new(runner);
        let orch = orchestrator(runner.clone(), Arc::new(FakeAdmin::default()), dir.path().to_path_buf());
        let upload = RestoreSource::Upload {
            filename: "shop.sql".into(),
            bytes: b"insert into t values (1);".to_vec(),
        };
        let outcome = orch.restore(RestoreJob::new(mysql(), upload)).await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let staged = calls[0].stdin.clone().expect("restore reads stdin");
        assert_eq!(*runner.stdin_seen.lock().unwrap(), vec![true]);
        assert!(!staged.exists(), "{} was not removed", staged.display());

        if outcome.success {
            assert!(outcome.diagnostic.contains("shop.sql"), "{}", outcome.diagnostic);
        } else {
            assert!(outcome.diagnostic.contains("1064"));
        }
    }
}

#[tokio::test]
async fn test_mongo_container_cleanup_runs_after_failure() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::failing("docker cp", 1, "Error: No such container:path"));
    let settings = BackupSettings {
        backup_dir: dir.path().to_path_buf(),
        mongo_container: Some("mongo1".into()),
        ..BackupSettings::default()
    };
    let orch = BackupOrchestrator::with_components(settings, runner.clone(), Arc::new(FakeAdmin::default()));

    let desc = ConnectionDescriptor::new("mongodb://mongo:27017/app", "", "");
    let outcome = orch.backup(BackupJob::new(desc, dir.path())).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ProcessFailure));
    let steps: Vec<String> = runner
        .calls()
        .iter()
        .map(|c| c.args.iter().take(3).cloned().collect::<Vec<_>>().join(" "))
        .collect();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0], "exec mongo1 mongodump");
    assert!(steps[1].starts_with("cp mongo1:/tmp/app_"));
    assert_eq!(steps[2], "exec mongo1 rm");
}

#[tokio::test]
async fn test_cancel_running_backup() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FakeRunner::blocking());
    let orch = orchestrator(runner, Arc::new(FakeAdmin::default()), dir.path().to_path_buf());

    let job = BackupJob::new(mysql(), dir.path());
    let job_id = job.id;
    let handle = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.backup(job).await })
    };

    wait_for_running(&orch, 1).await;
    assert_eq!(orch.registry().list().await[0].job_id, job_id);
    assert!(orch.cancel(job_id).await);

    let outcome = handle.await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
    assert!(orch.registry().is_empty().await);
}

#[tokio::test]
async fn test_concurrent_jobs_are_bounded() {
    let dir = TempDir::new().unwrap();
    let settings = BackupSettings {
        backup_dir: dir.path().to_path_buf(),
        max_concurrent_jobs: 1,
        ..BackupSettings::default()
    };
    let orch = BackupOrchestrator::with_components(
        settings,
        Arc::new(FakeRunner::blocking()),
        Arc::new(FakeAdmin::default()),
    );

    let spawn = |orch: BackupOrchestrator, path: PathBuf| {
        tokio::spawn(async move { orch.backup(BackupJob::new(mysql(), path)).await })
    };
    let first = spawn(orch.clone(), dir.path().to_path_buf());
    let second = spawn(orch.clone(), dir.path().to_path_buf());

    wait_for_running(&orch, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orch.registry().len().await, 1);

    orch.registry().cancel_all().await;
    for _ in 0..200 {
        if (first.is_finished() || second.is_finished()) && orch.registry().len().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    orch.registry().cancel_all().await;

    for handle in [first, second] {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
    }
}
