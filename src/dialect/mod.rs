//! Dialect handling.
//!
//! Pure string-level knowledge about each vendor family:
//! - Classification of a connection descriptor into a [`DialectTag`]
//! - Connection string rewriting when the target database changes
//! - Host and database extraction from connection strings
//! - Trailing `LIMIT` translation and page-based statement wrapping
//!
//! Nothing in this module performs I/O.
//!
//! [`DialectTag`]: crate::models::DialectTag

pub mod classifier;
pub mod sql;
pub mod url;

pub use classifier::{classify, classify_product_name, reconcile};
pub use sql::{is_select, normalize_limit, paginate, paginate_window, prepare_statement};
pub use url::{extract_database, extract_host, rewrite};
