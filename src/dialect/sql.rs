//! Statement rewriting for dialects with incompatible row-limiting syntax.
//!
//! Both transforms are plain string rewrites. They never fail: input they do
//! not understand is returned as-is.

use crate::models::{DialectTag, PaginationRequest};
use tracing::debug;

/// Translate a trailing `LIMIT n` into native top-N syntax.
///
/// Only SQL Server (`SELECT TOP n`) and Oracle (`FETCH FIRST n ROWS ONLY`)
/// are affected. A `LIMIT` without a digit run after it is left alone.
pub fn normalize_limit(tag: DialectTag, sql: &str) -> String {
    if tag.supports_limit() {
        return sql.to_string();
    }

    let trimmed = sql.trim();
    let Some((limit_idx, count)) = find_trailing_limit(trimmed) else {
        return sql.to_string();
    };
    let base = trimmed[..limit_idx].trim_end();

    let rewritten = match tag {
        DialectTag::SQLServer => {
            let lower = base.to_ascii_lowercase();
            match find_keyword(&lower, "select") {
                Some(idx) => format!(
                    "{}SELECT TOP {}{}",
                    &base[..idx],
                    count,
                    &base[idx + "select".len()..]
                ),
                None => return sql.to_string(),
            }
        }
        DialectTag::Oracle => format!("{} FETCH FIRST {} ROWS ONLY", base, count),
        _ => return sql.to_string(),
    };

    debug!(dialect = %tag, original = %sql, rewritten = %rewritten, "Translated LIMIT clause");
    rewritten
}

/// Last `LIMIT` token and the digits immediately following it.
fn find_trailing_limit(sql: &str) -> Option<(usize, &str)> {
    let lower = sql.to_ascii_lowercase();
    let idx = lower.rfind("limit")?;

    let before_ok = lower[..idx]
        .chars()
        .next_back()
        .is_none_or(|c| !is_ident_char(c));
    if !before_ok {
        return None;
    }

    let rest = sql[idx + "limit".len()..].trim_start();
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    Some((idx, &rest[..digits_len]))
}

/// First occurrence of `keyword` as a whole word in lower-cased text.
fn find_keyword(lower: &str, keyword: &str) -> Option<usize> {
    lower.match_indices(keyword).map(|(idx, _)| idx).find(|&idx| {
        let before = lower[..idx].chars().next_back();
        let after = lower[idx + keyword.len()..].chars().next();
        before.is_none_or(|c| !is_ident_char(c)) && after.is_none_or(|c| !is_ident_char(c))
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `ORDER BY` appears outside parentheses, quotes and `[identifiers]`.
fn has_top_level_order_by(sql: &str) -> bool {
    let lower = sql.to_ascii_lowercase();
    let mut depth = 0usize;
    let mut closing: Option<char> = None;
    let mut prev: Option<char> = None;

    for (idx, c) in lower.char_indices() {
        match closing {
            Some(end) => {
                if c == end {
                    closing = None;
                }
            }
            None => match c {
                '\'' | '"' => closing = Some(c),
                '[' => closing = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                'o' if depth == 0 && !prev.is_some_and(is_ident_char) => {
                    if let Some(rest) = lower[idx..].strip_prefix("order") {
                        let by = rest.trim_start();
                        if rest.len() > by.len()
                            && by.starts_with("by")
                            && by[2..].chars().next().is_none_or(|c| !is_ident_char(c))
                        {
                            return true;
                        }
                    }
                }
                _ => {}
            },
        }
        prev = Some(c);
    }
    false
}

/// Whether the statement is a `SELECT` (trimmed, case-insensitive prefix).
pub fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

/// Wrap a `SELECT` for page-based pagination, `offset = (page - 1) * size`.
///
/// Statements that are not `SELECT`s and dialects without a pagination rule
/// pass through unchanged.
pub fn paginate(tag: DialectTag, sql: &str, page: u32, size: u32) -> String {
    let offset = (page.max(1) as u64 - 1) * size as u64;
    paginate_window(tag, sql, offset, size as u64)
}

/// Like [`paginate`], with an explicit row window.
pub fn paginate_window(tag: DialectTag, sql: &str, offset: u64, limit: u64) -> String {
    if !is_select(sql) {
        return sql.to_string();
    }
    let body = sql.trim().trim_end_matches(';').trim_end();

    match tag {
        DialectTag::MySQL | DialectTag::MariaDB | DialectTag::PostgreSQL | DialectTag::SQLite => {
            format!("{} LIMIT {} OFFSET {}", body, limit, offset)
        }
        DialectTag::SQLServer => {
            let order = if has_top_level_order_by(body) {
                ""
            } else {
                " ORDER BY (SELECT NULL)"
            };
            format!(
                "{}{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                body, order, offset, limit
            )
        }
        DialectTag::Oracle => format!(
            "SELECT * FROM ({}) OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            body, offset, limit
        ),
        _ => sql.to_string(),
    }
}

/// Produce the statement actually sent to the server.
///
/// A page request wins over `LIMIT` translation: the two are never combined.
/// The window requests one row more than the page size so the caller can
/// tell whether another page exists.
pub fn prepare_statement(
    tag: DialectTag,
    sql: &str,
    pagination: Option<&PaginationRequest>,
) -> String {
    match pagination {
        Some(req) => paginate_window(tag, sql, req.offset(), req.fetch_size()),
        None => normalize_limit(tag, sql),
    }
}
