//! Backup and restore jobs.
//!
//! A job moves `Requested -> Running -> {Succeeded, Failed}` and is never
//! retried. Planning happens while the job is still `Requested`, so a dialect
//! without a template fails without spawning anything. Running jobs hold a
//! semaphore permit and are registered in the [`JobRegistry`] for cancellation.
//!
//! Uploaded restore artifacts are written to a temporary file that is removed
//! once the job ends, whatever the outcome.

use crate::backup::plan::{self, Action, JobPlan, Step, StepKind};
use crate::backup::registry::JobRegistry;
use crate::backup::runner::{CommandRunner, RunControl, TokioCommandRunner};
use crate::config::{BackupSettings, EngineSettings};
use crate::db::ExecutionDispatcher;
use crate::dialect::classify;
use crate::error::{DbError, DbResult};
use crate::models::{
    BackupJob, ConnectionDescriptor, JobOperation, JobOutcome, RestoreJob, RestoreSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Runs administrative SQL (SQL Server backup and restore).
#[async_trait]
pub trait AdminExecutor: Send + Sync {
    async fn execute(&self, descriptor: &ConnectionDescriptor, statement: &str) -> DbResult<()>;
}

/// [`AdminExecutor`] backed by the regular execution path.
#[derive(Debug, Clone)]
pub struct DispatcherAdminExecutor {
    dispatcher: ExecutionDispatcher,
}

impl DispatcherAdminExecutor {
    pub fn new(dispatcher: ExecutionDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl AdminExecutor for DispatcherAdminExecutor {
    async fn execute(&self, descriptor: &ConnectionDescriptor, statement: &str) -> DbResult<()> {
        self.dispatcher.execute(descriptor, statement, None).await?;
        Ok(())
    }
}

/// Restore input as handed to the tool.
enum StagedInput {
    Existing(PathBuf),
    Uploaded(NamedTempFile),
}

impl StagedInput {
    fn path(&self) -> &Path {
        match self {
            Self::Existing(path) => path,
            Self::Uploaded(file) => file.path(),
        }
    }

    fn remove(self) {
        if let Self::Uploaded(file) = self {
            let path = file.path().to_path_buf();
            match file.close() {
                Ok(()) => debug!(path = %path.display(), "Removed uploaded artifact"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove uploaded artifact"),
            }
        }
    }
}

#[derive(Clone)]
pub struct BackupOrchestrator {
    settings: BackupSettings,
    runner: Arc<dyn CommandRunner>,
    admin: Arc<dyn AdminExecutor>,
    permits: Arc<Semaphore>,
    registry: JobRegistry,
}

impl BackupOrchestrator {
    /// Orchestrator that spawns real processes. Admin statements get the job
    /// timeout instead of the query timeout.
    pub fn new(settings: BackupSettings, engine: &EngineSettings) -> Self {
        let admin_settings = EngineSettings {
            query_timeout: settings.job_timeout,
            connect_timeout: engine.connect_timeout,
        };
        Self::with_components(
            settings,
            Arc::new(TokioCommandRunner),
            Arc::new(DispatcherAdminExecutor::new(ExecutionDispatcher::new(
                admin_settings,
            ))),
        )
    }

    pub fn with_components(
        settings: BackupSettings,
        runner: Arc<dyn CommandRunner>,
        admin: Arc<dyn AdminExecutor>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Self {
            settings,
            runner,
            admin,
            permits,
            registry: JobRegistry::new(),
        }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Cancel a running job; its child process is killed.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        self.registry.cancel(job_id).await
    }

    /// Dump the database the descriptor points at into `job.target_dir`.
    pub async fn backup(&self, job: BackupJob) -> JobOutcome {
        let started_at = Utc::now();
        let dialect = classify(&job.descriptor);
        info!(
            job_id = %job.id,
            %dialect,
            connection = %job.descriptor.masked(),
            target = %job.target_dir.display(),
            "Backup requested"
        );

        let settings = BackupSettings {
            backup_dir: job.target_dir.clone(),
            ..self.settings.clone()
        };
        let plan = match plan::backup_plan(
            &job.descriptor,
            dialect,
            &settings,
            started_at.timestamp_millis(),
        ) {
            Ok(plan) => plan,
            Err(e) => return reject(job.id, JobOperation::Backup, started_at, e),
        };

        if plan.local_artifact {
            if let Err(e) = tokio::fs::create_dir_all(&job.target_dir).await {
                return reject(job.id, JobOperation::Backup, started_at, e.into());
            }
        }

        if let Err(e) = self.run_plan(job.id, JobOperation::Backup, &plan).await {
            if let Some(artifact) = plan.artifact.as_deref().filter(|_| plan.local_artifact) {
                discard_artifact(artifact).await;
            }
            return fail(job.id, JobOperation::Backup, started_at, e);
        }

        let artifact = plan.artifact.clone();
        let diagnostic = backup_summary(&plan).await;
        info!(job_id = %job.id, %diagnostic, "Backup succeeded");
        JobOutcome::succeeded(job.id, JobOperation::Backup, started_at, diagnostic, artifact)
    }

    /// Load an artifact into the database the descriptor points at.
    pub async fn restore(&self, job: RestoreJob) -> JobOutcome {
        let started_at = Utc::now();
        let dialect = classify(&job.descriptor);
        info!(
            job_id = %job.id,
            %dialect,
            connection = %job.descriptor.masked(),
            "Restore requested"
        );

        if let Err(e) = plan::ensure_supported(dialect, JobOperation::Restore) {
            return reject(job.id, JobOperation::Restore, started_at, e);
        }

        let staged = match stage_input(&job.source).await {
            Ok(staged) => staged,
            Err(e) => return reject(job.id, JobOperation::Restore, started_at, e),
        };

        let result = match plan::restore_plan(
            &job.descriptor,
            dialect,
            staged.path(),
            &self.settings,
            started_at.timestamp_millis(),
        ) {
            Ok(plan) => self
                .run_plan(job.id, JobOperation::Restore, &plan)
                .await
                .map(|()| plan),
            Err(e) => Err(e),
        };
        let source = staged.path().display().to_string();
        staged.remove();

        match result {
            Ok(plan) => {
                let diagnostic = match &plan.database {
                    Some(database) => format!("Restored {} from {}", database, source_name(&job.source, &source)),
                    None => format!("Restored from {}", source_name(&job.source, &source)),
                };
                info!(job_id = %job.id, %diagnostic, "Restore succeeded");
                JobOutcome::succeeded(job.id, JobOperation::Restore, started_at, diagnostic, None)
            }
            Err(e) => fail(job.id, JobOperation::Restore, started_at, e),
        }
    }

    async fn run_plan(&self, job_id: Uuid, operation: JobOperation, plan: &JobPlan) -> DbResult<()> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::internal("Job queue is closed"))?;

        let cancel = self.registry.register(job_id, operation, plan.dialect).await;
        info!(
            job_id = %job_id,
            %operation,
            steps = plan.steps.len(),
            "Job running"
        );

        let result = self.run_steps(job_id, plan, &cancel).await;
        self.registry.finish(job_id).await;
        result
    }

    /// Main steps stop at the first failure; finally and cleanup steps always
    /// run, and are not interrupted by cancellation.
    async fn run_steps(
        &self,
        job_id: Uuid,
        plan: &JobPlan,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        let mut failure: Option<DbError> = None;

        for step in &plan.steps {
            if step.kind == StepKind::Main && failure.is_some() {
                debug!(job_id = %job_id, step = %step.label(), "Skipping step after failure");
                continue;
            }

            let result = if step.kind == StepKind::Main {
                if cancel.is_cancelled() {
                    Err(DbError::cancelled(step.label()))
                } else {
                    self.run_step(step, cancel).await
                }
            } else {
                self.run_step(step, &CancellationToken::new()).await
            };

            match result {
                Ok(()) => debug!(job_id = %job_id, step = %step.label(), "Step completed"),
                Err(e) if step.kind == StepKind::Cleanup => {
                    warn!(job_id = %job_id, step = %step.label(), error = %e, "Cleanup step failed");
                }
                Err(e) => {
                    error!(job_id = %job_id, step = %step.label(), error = %e, "Step failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_step(&self, step: &Step, cancel: &CancellationToken) -> DbResult<()> {
        let job_timeout = self.settings.job_timeout;
        match &step.action {
            Action::Run(command) => {
                info!(command = %command.display(), "Running external tool");
                let control = RunControl::new(job_timeout, cancel.clone());
                let output = self.runner.run(command, &control).await?;
                if output.success() {
                    Ok(())
                } else {
                    Err(DbError::process_failure(
                        &command.program,
                        output.exit_code,
                        output.diagnostic(),
                    ))
                }
            }
            Action::AdminSql {
                descriptor,
                statement,
            } => {
                info!(statement = %statement, "Running admin statement");
                tokio::select! {
                    result = timeout(job_timeout, self.admin.execute(descriptor, statement)) => {
                        match result {
                            Ok(result) => result,
                            Err(_) => Err(DbError::timeout(step.label(), job_timeout.as_secs())),
                        }
                    }
                    _ = cancel.cancelled() => Err(DbError::cancelled(step.label())),
                }
            }
        }
    }
}

async fn stage_input(source: &RestoreSource) -> DbResult<StagedInput> {
    match source {
        RestoreSource::Path(path) => {
            if !tokio::fs::try_exists(path).await? {
                return Err(DbError::invalid_input(format!(
                    "Restore source {} does not exist",
                    path.display()
                )));
            }
            Ok(StagedInput::Existing(path.clone()))
        }
        RestoreSource::Upload { filename, bytes } => {
            if bytes.is_empty() {
                return Err(DbError::invalid_input(format!(
                    "Uploaded file {} is empty",
                    filename
                )));
            }
            let suffix = Path::new(filename)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext))
                .unwrap_or_default();
            let file = tempfile::Builder::new()
                .prefix("db-studio-restore-")
                .suffix(&suffix)
                .tempfile()?;
            tokio::fs::write(file.path(), bytes).await?;
            debug!(
                filename = %filename,
                path = %file.path().display(),
                size = %humansize::format_size(bytes.len() as u64, humansize::DECIMAL),
                "Staged uploaded artifact"
            );
            Ok(StagedInput::Uploaded(file))
        }
    }
}

fn source_name<'a>(source: &'a RestoreSource, staged: &'a str) -> &'a str {
    match source {
        RestoreSource::Upload { filename, .. } => filename,
        RestoreSource::Path(_) => staged,
    }
}

async fn backup_summary(plan: &JobPlan) -> String {
    let database = plan.database.as_deref().unwrap_or("all databases");
    let Some(artifact) = &plan.artifact else {
        return format!("Backed up {}", database);
    };
    if !plan.local_artifact {
        return format!(
            "Backed up {} to {} on the database server",
            database,
            artifact.display()
        );
    }
    match artifact_size(artifact).await {
        Some(size) => format!(
            "Backed up {} to {} ({})",
            database,
            artifact.display(),
            humansize::format_size(size, humansize::DECIMAL)
        ),
        None => format!("Backed up {} to {}", database, artifact.display()),
    }
}

/// Remove whatever a failed backup left behind.
async fn discard_artifact(path: &Path) {
    let removed = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    match removed {
        Ok(()) => info!(path = %path.display(), "Removed partial backup artifact"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial backup artifact"),
    }
}

/// Total size of a file or directory tree.
async fn artifact_size(path: &Path) -> Option<u64> {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(next) = pending.pop() {
        let metadata = tokio::fs::metadata(&next).await.ok()?;
        if metadata.is_dir() {
            let mut entries = tokio::fs::read_dir(&next).await.ok()?;
            while let Some(entry) = entries.next_entry().await.ok()? {
                pending.push(entry.path());
            }
        } else {
            total += metadata.len();
        }
    }
    Some(total)
}

/// `Requested -> Failed`: nothing was started.
fn reject(
    job_id: Uuid,
    operation: JobOperation,
    started_at: DateTime<Utc>,
    err: DbError,
) -> JobOutcome {
    error!(job_id = %job_id, %operation, error = %err, "Job rejected");
    JobOutcome::failed(job_id, operation, started_at, &err)
}

/// `Running -> Failed`.
fn fail(
    job_id: Uuid,
    operation: JobOperation,
    started_at: DateTime<Utc>,
    err: DbError,
) -> JobOutcome {
    error!(job_id = %job_id, %operation, error = %err, "Job failed");
    JobOutcome::failed(job_id, operation, started_at, &err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_artifact_size_of_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bson"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.json"), vec![0u8; 20]).unwrap();

        assert_eq!(artifact_size(dir.path()).await, Some(120));
        assert_eq!(artifact_size(&dir.path().join("a.bson")).await, Some(100));
        assert_eq!(artifact_size(&dir.path().join("missing")).await, None);
    }

    #[tokio::test]
    async fn test_discard_artifact_file_and_tree() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("shop_1.sql");
        std::fs::write(&file, b"-- partial").unwrap();
        discard_artifact(&file).await;
        assert!(!file.exists());

        let tree = dir.path().join("app_1");
        std::fs::create_dir_all(tree.join("app")).unwrap();
        std::fs::write(tree.join("app/users.bson"), b"x").unwrap();
        discard_artifact(&tree).await;
        assert!(!tree.exists());

        discard_artifact(&dir.path().join("missing")).await;
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_staged_upload_is_removed() {
        let source = RestoreSource::Upload {
            filename: "shop.sql".into(),
            bytes: b"select 1;".to_vec(),
        };
        let staged = stage_input(&source).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("sql"));
        assert_eq!(std::fs::read(&path).unwrap(), b"select 1;");

        staged.remove();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_rejects_missing_path_and_empty_upload() {
        let err = stage_input(&RestoreSource::Path("/no/such/dump.sql".into()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let err = stage_input(&RestoreSource::Upload {
            filename: "x.sql".into(),
            bytes: Vec::new(),
        })
        .await
        .err()
        .unwrap();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }
}
