//! Plain-text rendering of query results for the terminal.
//!
//! Output is bounded: long cells are compacted and only the first rows of a
//! large result are printed.

use crate::core::engine::ExecutionResult;

pub const MAX_CELL_CHARS: usize = 40;
pub const MAX_ROWS: usize = 50;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// ASCII table of a result set, or a change count for statements without
/// columns.
pub fn render_table(result: &ExecutionResult) -> String {
    if result.columns.is_empty() {
        return match result.changes {
            1 => "1 row affected".to_string(),
            n => format!("{n} rows affected"),
        };
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(MAX_ROWS)
        .map(|row| {
            row.iter()
                .map(|cell| compact_line(&cell.to_string(), MAX_CELL_CHARS))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |values: &[String]| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };
    let rule = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = vec![rule.clone(), line(&result.columns), rule.clone()];
    out.extend(cells.iter().map(|row| line(row)));
    out.push(rule);

    let total = result.rows.len();
    if total > MAX_ROWS {
        out.push(format!("({} of {} rows shown)", MAX_ROWS, total));
    } else if total == 1 {
        out.push("(1 row)".to_string());
    } else {
        out.push(format!("({total} rows)"));
    }
    out.join("\n")
}
