//! DB Studio engine.
//!
//! Vendor-agnostic database console core: classifies connection strings into
//! dialects, rewrites them to target another database, normalizes and pages
//! SQL, executes statements against relational servers and MongoDB, browses
//! schemas, and orchestrates backup and restore through external tools.

pub mod backup;
pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;
pub mod tools;

pub use backup::BackupOrchestrator;
pub use config::{BackupSettings, Config, EngineSettings};
pub use db::{ExecutionDispatcher, SchemaInspector};
pub use error::{DbError, DbResult};
