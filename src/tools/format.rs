//! Text rendering of query results.
//!
//! Tables are rendered like the MySQL CLI; Markdown output is meant for
//! pasting into documents. Both report when more pages are available.

use crate::models::{ExecutionOutcome, TabularResult};
use serde_json::{Value as JsonValue, json};
use unicode_width::UnicodeWidthStr;

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_table(result: &TabularResult) -> String {
    if result.header.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = result.header.iter().map(|name| name.width()).collect();
    for row in &result.rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(format_value(value).width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = result
        .header
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad(name, *w, Align::Center)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in &result.rows {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|(value, w)| {
                let align = if matches!(value, JsonValue::Number(_)) {
                    Align::Right
                } else {
                    Align::Left
                };
                format!("| {} ", pad(&format_value(value), *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);

    let row_count = result.row_count();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        row_text,
        result.execution_time_ms as f64 / 1000.0
    ));
    if !result.is_last_page {
        output.push_str("More rows available on the next page\n");
    }

    output
}

pub fn format_as_markdown(result: &TabularResult) -> String {
    if result.header.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = result
        .header
        .iter()
        .map(|name| format!("| {} ", escape_markdown(name)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = result.header.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in &result.rows {
        let line: String = row
            .iter()
            .map(|value| format!("| {} ", escape_markdown(&format_value(value))))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} rows*", result.row_count()));
    if !result.is_last_page {
        output.push_str(" *(more on the next page)*");
    }

    output
}

/// JSON document for either kind of outcome.
pub fn outcome_to_json(outcome: &ExecutionOutcome) -> JsonValue {
    match outcome {
        ExecutionOutcome::Rows(result) => json!({
            "header": result.header,
            "rows": result.rows,
            "row_count": result.row_count(),
            "is_last_page": result.is_last_page,
            "execution_time_ms": result.execution_time_ms,
        }),
        ExecutionOutcome::Affected {
            affected_count,
            execution_time_ms,
        } => json!({
            "affected_count": affected_count,
            "execution_time_ms": execution_time_ms,
        }),
    }
}

/// One name per line, or a placeholder when there are none.
pub fn format_list(names: &[String]) -> String {
    if names.is_empty() {
        return "(none)".to_string();
    }
    names.join("\n")
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

/// Pad by display width; `format!` width counts chars, not columns.
fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), text),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
