//! Query-related data models.
//!
//! This module defines the page request accepted by the engine and the single
//! tabular result shape shared by the relational and document paths.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default page size when the caller asks for pagination without a size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Page-based pagination request. Both fields are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PageFields")]
pub struct PaginationRequest {
    page: u32,
    page_size: u32,
}

#[derive(Deserialize)]
struct PageFields {
    page: u32,
    page_size: u32,
}

impl TryFrom<PageFields> for PaginationRequest {
    type Error = DbError;

    fn try_from(fields: PageFields) -> DbResult<Self> {
        Self::new(fields.page, fields.page_size)
    }
}

impl PaginationRequest {
    /// Create a validated pagination request.
    pub fn new(page: u32, page_size: u32) -> DbResult<Self> {
        if page == 0 {
            return Err(DbError::invalid_input("page must be at least 1"));
        }
        if page_size == 0 {
            return Err(DbError::invalid_input("page size must be at least 1"));
        }
        if page_size > MAX_PAGE_SIZE {
            return Err(DbError::invalid_input(format!(
                "page size cannot exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { page, page_size })
    }

    /// First page with the given size.
    pub fn first(page_size: u32) -> DbResult<Self> {
        Self::new(1, page_size)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// Rows fetched internally: one extra row reveals whether another page exists.
    pub fn fetch_size(&self) -> u64 {
        self.page_size as u64 + 1
    }
}

/// Uniform tabular result.
///
/// Every row has the same arity as `header`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    pub header: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub is_last_page: bool,
    pub execution_time_ms: u64,
}

impl TabularResult {
    /// Build a result, enforcing the header/row arity invariant.
    pub fn new(header: Vec<String>, rows: Vec<Vec<JsonValue>>) -> DbResult<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(DbError::internal(format!(
                "row {} has {} values but the header has {} columns",
                idx,
                row.len(),
                header.len()
            )));
        }
        Ok(Self {
            header,
            rows,
            is_last_page: true,
            execution_time_ms: 0,
        })
    }

    /// Apply the fetch-size-plus-one rule: when more than `page_size` rows were
    /// fetched, drop the surplus and mark that another page exists.
    pub fn paged(mut self, page_size: Option<u32>) -> Self {
        match page_size {
            Some(size) if self.rows.len() > size as usize => {
                self.rows.truncate(size as usize);
                self.is_last_page = false;
            }
            _ => self.is_last_page = true,
        }
        self
    }

    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The statement produced a result set
    Rows(TabularResult),
    /// Pure update: no result set, only an affected-row count
    Affected {
        affected_count: u64,
        execution_time_ms: u64,
    },
}

impl ExecutionOutcome {
    /// Get the tabular result, if the statement produced one.
    pub fn rows(&self) -> Option<&TabularResult> {
        match self {
            Self::Rows(result) => Some(result),
            Self::Affected { .. } => None,
        }
    }

    pub fn into_rows(self) -> Option<TabularResult> {
        match self {
            Self::Rows(result) => Some(result),
            Self::Affected { .. } => None,
        }
    }

    pub fn affected_count(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected { affected_count, .. } => Some(*affected_count),
        }
    }
}
