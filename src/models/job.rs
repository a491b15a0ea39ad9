//! Backup and restore job models.

use crate::error::{DbError, ErrorKind};
use crate::models::ConnectionDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Which way data flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOperation {
    Backup,
    Restore,
}

impl std::fmt::Display for JobOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backup => write!(f, "backup"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Job lifecycle: `Requested -> Running -> {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Requested,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Check if the job has ended (succeeded or failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Running)
                | (Self::Requested, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Request to dump the database a descriptor points at.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub id: Uuid,
    pub descriptor: ConnectionDescriptor,
    /// Directory the artifact is written into
    pub target_dir: PathBuf,
}

impl BackupJob {
    pub fn new(descriptor: ConnectionDescriptor, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor,
            target_dir: target_dir.into(),
        }
    }
}

/// Where restore input comes from.
#[derive(Debug, Clone)]
pub enum RestoreSource {
    /// An artifact already on disk (file or dump directory)
    Path(PathBuf),
    /// Bytes handed over by an upload receiver
    Upload { filename: String, bytes: Vec<u8> },
}

/// Request to load an artifact into the database a descriptor points at.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub id: Uuid,
    pub descriptor: ConnectionDescriptor,
    pub source: RestoreSource,
}

impl RestoreJob {
    pub fn new(descriptor: ConnectionDescriptor, source: RestoreSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor,
            source,
        }
    }
}

/// Final report of a job. Jobs are never retried.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub operation: JobOperation,
    pub status: JobStatus,
    pub success: bool,
    pub diagnostic: String,
    /// Set on failure
    pub error_kind: Option<ErrorKind>,
    /// Backup artifact location on success
    pub artifact: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn succeeded(
        job_id: Uuid,
        operation: JobOperation,
        started_at: DateTime<Utc>,
        diagnostic: impl Into<String>,
        artifact: Option<PathBuf>,
    ) -> Self {
        Self {
            job_id,
            operation,
            status: JobStatus::Succeeded,
            success: true,
            diagnostic: diagnostic.into(),
            error_kind: None,
            artifact,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        job_id: Uuid,
        operation: JobOperation,
        started_at: DateTime<Utc>,
        error: &DbError,
    ) -> Self {
        Self {
            job_id,
            operation,
            status: JobStatus::Failed,
            success: false,
            diagnostic: error.to_string(),
            error_kind: Some(error.kind()),
            artifact: None,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Requested.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Requested.can_transition_to(JobStatus::Succeeded));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_failed_outcome_carries_kind() {
        let err = DbError::unsupported_operation("backup", "Derby");
        let outcome = JobOutcome::failed(Uuid::new_v4(), JobOperation::Backup, Utc::now(), &err);
        assert!(!outcome.success);
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.error_kind, Some(ErrorKind::UnsupportedOperation));
        assert!(outcome.diagnostic.contains("Derby"));
    }
}
