//! CSV export of tabular results.
//!
//! RFC 4180 output: header first, fields quoted only when they contain a
//! comma, quote or line break, embedded quotes doubled. `NULL` is an empty
//! field.

use crate::error::{DbError, DbResult};
use crate::models::TabularResult;
use serde_json::Value as JsonValue;
use std::io::Write;

fn csv_error(err: csv::Error) -> DbError {
    DbError::internal(format!("CSV encoding failed: {}", err))
}

fn csv_field(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => crate::tools::format::format_value(other),
    }
}

/// Write `result` as CSV into `writer`.
pub fn write_csv<W: Write>(result: &TabularResult, writer: W) -> DbResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    csv_writer
        .write_record(&result.header)
        .map_err(csv_error)?;
    for row in &result.rows {
        csv_writer
            .write_record(row.iter().map(csv_field))
            .map_err(csv_error)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// CSV document as a string.
pub fn to_csv(result: &TabularResult) -> DbResult<String> {
    let mut buf = Vec::new();
    write_csv(result, &mut buf)?;
    String::from_utf8(buf).map_err(|e| DbError::internal(format!("CSV is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoting_rules() {
        let result = TabularResult::new(
            vec!["id".into(), "note".into()],
            vec![
                vec![json!(1), json!("plain")],
                vec![json!(2), json!("a,b")],
                vec![json!(3), json!("say \"hi\"")],
                vec![json!(4), json!("two\nlines")],
                vec![json!(5), JsonValue::Null],
            ],
        )
        .unwrap();

        assert_eq!(
            to_csv(&result).unwrap(),
            "id,note\r\n\
             1,plain\r\n\
             2,\"a,b\"\r\n\
             3,\"say \"\"hi\"\"\"\r\n\
             4,\"two\nlines\"\r\n\
             5,\r\n"
        );
    }

    #[test]
    fn test_non_string_values() {
        let result = TabularResult::new(
            vec!["flag".into(), "doc".into(), "ratio".into()],
            vec![vec![json!(true), json!({"a": 1}), json!(0.5)]],
        )
        .unwrap();
        assert_eq!(
            to_csv(&result).unwrap(),
            "flag,doc,ratio\r\ntrue,\"{\"\"a\"\":1}\",0.5\r\n"
        );
    }

    #[test]
    fn test_header_only() {
        let result = TabularResult::new(vec!["a".into(), "b".into()], Vec::new()).unwrap();
        assert_eq!(to_csv(&result).unwrap(), "a,b\r\n");
    }
}
