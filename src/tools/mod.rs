//! Presentation helpers for results.
//!
//! - `format`: ASCII table, Markdown and JSON rendering
//! - `export`: CSV encoding

pub mod export;
pub mod format;

pub use export::{to_csv, write_csv};
pub use format::{format_as_markdown, format_as_table, format_list, outcome_to_json};
