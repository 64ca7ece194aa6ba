use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

use crate::parser::RecordBatch;

/// Byte order mark so spreadsheet tools read the file as UTF-8, not cp1252.
const UTF8_BOM: char = '\u{feff}';

/// Spreadsheet-compatible CSV: header row, one row per record, empty cells
/// for keys a record does not have.
pub fn to_csv(batch: &RecordBatch) -> Vec<u8> {
    let mut out = String::from(UTF8_BOM);
    push_row(&mut out, &batch.columns());
    for row in batch.rows() {
        push_row(&mut out, &row);
    }
    out.into_bytes()
}

pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    std::fs::write(path, to_csv(batch))
        .with_context(|| format!("Failed to write report {:?}", path))
}

fn push_row(out: &mut String, cells: &[&str]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(cell));
    }
    out.push_str("\r\n");
}

fn escape(cell: &str) -> Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}

/// Fixed-width console table of the first `limit` rows.
pub fn print_preview(batch: &RecordBatch, limit: usize) {
    const WIDTH: usize = 18;

    if batch.is_empty() {
        println!("No rows.");
        return;
    }

    let columns = batch.columns();
    let header: Vec<String> = columns.iter().map(|c| pad(c, WIDTH)).collect();
    println!("{}", header.join(" | "));
    println!("{}", "-".repeat(columns.len() * (WIDTH + 3)));

    for row in batch.rows().iter().take(limit) {
        let cells: Vec<String> = row.iter().map(|c| pad(c, WIDTH)).collect();
        println!("{}", cells.join(" | "));
    }
    if batch.len() > limit {
        println!("... {} more rows", batch.len() - limit);
    }
}

fn pad(s: &str, width: usize) -> String {
    format!("{:<width$}", truncate(s, width), width = width)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

// ── Tests ──
