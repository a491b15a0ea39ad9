//! Data models for the DB Studio engine.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod job;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, ConnectionKind, DialectTag, mask_connection_string};
pub use job::{BackupJob, JobOperation, JobOutcome, JobStatus, RestoreJob, RestoreSource};
pub use query::{
    DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT_SECS, ExecutionOutcome, MAX_PAGE_SIZE,
    PaginationRequest, TabularResult,
};
