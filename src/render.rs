//! Plain-text rendering of query results for the terminal.

use crate::db::executor::QueryOutcome;
use serde_json::Value;

const MAX_CELL_CHARS: usize = 40;

/// Display text of one cell, on a single line and at most `MAX_CELL_CHARS` wide.
pub fn format_value(value: &Value) -> String {
    let text = match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() > MAX_CELL_CHARS {
        let cut: String = single_line.chars().take(MAX_CELL_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        single_line
    }
}

/// Render a result as a grid, or as an affected-rows line for writes.
pub fn format_outcome(outcome: &QueryOutcome) -> String {
    if let Some(affected) = outcome.rows_affected {
        return format!("Query OK, {} row(s) affected\n", affected);
    }
    if outcome.columns.is_empty() {
        return "(no rows)\n".to_string();
    }

    let cells: Vec<Vec<String>> = outcome
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = outcome.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let separator = format!(
        "+{}+\n",
        widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("+")
    );
    let line = |values: &[String]| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let value = values.get(i).map(String::as_str).unwrap_or("");
                format!(" {}{} ", value, " ".repeat(w - value.chars().count()))
            })
            .collect();
        format!("|{}|\n", padded.join("|"))
    };

    let mut out = String::new();
    out.push_str(&separator);
    out.push_str(&line(&outcome.columns));
    out.push_str(&separator);
    for row in &cells {
        out.push_str(&line(row));
    }
    out.push_str(&separator);
    out.push_str(&format!("{} row(s)\n", cells.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grid() {
        let outcome = QueryOutcome::rows(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("ada")], vec![json!(22), Value::Null]],
        );
        let expected = "\
+----+------+
| id | name |
+----+------+
| 1  | ada  |
| 22 | NULL |
+----+------+
2 row(s)
";
        assert_eq!(format_outcome(&outcome), expected);
    }

    #[test]
    fn test_empty_result_keeps_header() {
        let outcome = QueryOutcome::rows(vec!["id".into(), "email".into()], Vec::new());
        let expected = "\
+----+-------+
| id | email |
+----+-------+
+----+-------+
0 row(s)
";
        assert_eq!(format_outcome(&outcome), expected);
    }

    #[test]
    fn test_affected_rows() {
        assert_eq!(format_outcome(&QueryOutcome::affected(3)), "Query OK, 3 row(s) affected\n");
    }

    #[test]
    fn test_long_values_are_truncated_to_one_line() {
        let value = json!(format!("line one\n{}", "x".repeat(60)));
        let text = format_value(&value);
        assert_eq!(text.chars().count(), MAX_CELL_CHARS);
        assert!(text.starts_with("line one x"));
        assert!(text.ends_with("..."));
    }
}
