//! Database access layer.
//!
//! - Driver registry and connection opening
//! - Result-set detection
//! - Statement execution (relational and document)
//! - Schema browsing
//! - Type mappings

pub mod document;
pub mod driver;
pub mod executor;
pub mod schema;
pub mod statement;
pub mod types;

pub use driver::{Backend, DbConnection, DriverEntry};
pub use executor::ExecutionDispatcher;
pub use schema::{SchemaInspector, SchemaObject};
pub use statement::produces_result_set;
