//! Backup and restore orchestration.
//!
//! - `plan`: per-dialect command templates
//! - `runner`: external process execution behind [`CommandRunner`]
//! - `registry`: running jobs and their cancellation tokens
//! - `orchestrator`: job lifecycle, concurrency limit, upload staging

pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod runner;

pub use orchestrator::{AdminExecutor, BackupOrchestrator, DispatcherAdminExecutor};
pub use plan::{JobPlan, Step, StepKind};
pub use registry::{JobRegistry, JobSummary};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, RunControl, TokioCommandRunner};
