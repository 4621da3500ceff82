//! Output formatting helpers.

use treelike::{Update, clock::format_millis};

/// Print a table with aligned columns.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", format_row(headers.to_vec()));
    for row in rows {
        println!(
            "{}",
            format_row(row.iter().take(col_count).map(String::as_str).collect())
        );
    }
}

/// The value column for an update; `-` when absent.
pub fn value_cell(update: &Update) -> String {
    update
        .value
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

/// The timestamp column for an update; `-` when unstamped.
pub fn stamp_cell(update: &Update) -> String {
    update
        .updated_at
        .map_or_else(|| "-".to_string(), format_millis)
}

/// One table row: path, value, timestamp.
pub fn update_row(update: &Update) -> Vec<String> {
    vec![update.path.clone(), value_cell(update), stamp_cell(update)]
}
