use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::error::Result;
use crate::util::format_int;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown table of the first `max_rows` rows, or `None` when empty.
pub fn render_preview<T>(rows: &[T], max_rows: usize) -> Option<String>
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return None;
    }
    Some(Table::new(slice).with(Style::markdown()).to_string())
}

pub fn preview_table<T>(title: &str, file: Option<&Path>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{} ({} righe)", title, format_int(rows.len()));
    if let Some(f) = file {
        println!("({})", f.display());
    }
    println!();
    match render_preview(rows, max_rows) {
        Some(table) => println!("{}\n", table),
        None => println!("(nessuna riga)\n"),
    }
}
