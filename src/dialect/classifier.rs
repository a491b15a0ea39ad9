//! Dialect classification.
//!
//! Two paths map onto the same tag set in the same priority order: the
//! connection-string prefix (cheap, always available) and the product name a
//! live connection reports.

use crate::models::{ConnectionDescriptor, DialectTag};
use tracing::warn;

/// Literal prefixes checked after an optional `jdbc:` marker. First match wins.
const PREFIX_TABLE: &[(&str, DialectTag)] = &[
    ("mysql", DialectTag::MySQL),
    ("mariadb", DialectTag::MariaDB),
    ("postgresql", DialectTag::PostgreSQL),
    ("postgres", DialectTag::PostgreSQL),
    ("sqlserver", DialectTag::SQLServer),
    ("jtds:sqlserver", DialectTag::SQLServer),
    ("oracle", DialectTag::Oracle),
    ("db2", DialectTag::DB2),
    ("sybase", DialectTag::Sybase),
    ("sap", DialectTag::Sybase),
    ("derby", DialectTag::Derby),
    ("h2", DialectTag::H2),
    ("sqlite", DialectTag::SQLite),
];

/// Substrings searched in a lower-cased product name, same order as the prefixes.
const PRODUCT_TABLE: &[(&str, DialectTag)] = &[
    ("mysql", DialectTag::MySQL),
    ("mariadb", DialectTag::MariaDB),
    ("postgres", DialectTag::PostgreSQL),
    ("sql server", DialectTag::SQLServer),
    ("sqlserver", DialectTag::SQLServer),
    ("oracle", DialectTag::Oracle),
    ("db2", DialectTag::DB2),
    ("sybase", DialectTag::Sybase),
    ("adaptive server", DialectTag::Sybase),
    ("derby", DialectTag::Derby),
    ("h2", DialectTag::H2),
    ("sqlite", DialectTag::SQLite),
    ("mongo", DialectTag::MongoDB),
];

/// Classify a descriptor by its connection string. Total: never fails.
pub fn classify(descriptor: &ConnectionDescriptor) -> DialectTag {
    if descriptor.is_document() {
        return DialectTag::MongoDB;
    }
    classify_connection_string(descriptor.connection_string())
}

/// Prefix lookup on a relational connection string.
pub fn classify_connection_string(connection_string: &str) -> DialectTag {
    let lower = connection_string.trim().to_ascii_lowercase();
    let body = lower.strip_prefix("jdbc:").unwrap_or(&lower);

    PREFIX_TABLE
        .iter()
        .find(|(prefix, _)| {
            body.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
        })
        .map(|(_, tag)| *tag)
        .unwrap_or(DialectTag::Unknown)
}

/// Classify from a product name reported by a live connection.
pub fn classify_product_name(product_name: &str) -> DialectTag {
    let lower = product_name.to_lowercase();
    PRODUCT_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, tag)| *tag)
        .unwrap_or(DialectTag::Unknown)
}

/// Combine both classification paths.
///
/// The prefix result wins whenever it is known. A disagreement between two
/// known tags is logged and otherwise ignored.
pub fn reconcile(descriptor: &ConnectionDescriptor, product_name: &str) -> DialectTag {
    let from_prefix = classify(descriptor);
    let from_product = classify_product_name(product_name);

    match (from_prefix, from_product) {
        (DialectTag::Unknown, product) => product,
        (prefix, DialectTag::Unknown) => prefix,
        (prefix, product) => {
            if prefix != product {
                warn!(
                    connection = %descriptor.masked(),
                    product_name = %product_name,
                    prefix_dialect = %prefix,
                    product_dialect = %product,
                    "Dialect classification mismatch, keeping prefix result"
                );
            }
            prefix
        }
    }
}
