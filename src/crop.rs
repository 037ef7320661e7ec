//! Locates the cost table inside a sheet and crops it.

use crate::error::SheetError;
use crate::logging::Diagnostics;
use crate::sheet_specs::{SheetLayout, COSTI_START, VOCE};
use crate::types::{CellValue, RawSheet};

/// Rectangular cost region. `rows[0]` is the header row itself, still
/// holding its raw cells (its second cell is a category label).
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedSheet {
    pub headers: Vec<CellValue>,
    pub rows: Vec<Vec<CellValue>>,
}

impl CroppedSheet {
    /// Index of the column whose header is `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.as_text() == Some(name))
    }
}

/// Crop the cost region of an already translated sheet.
///
/// `Ok(None)` when the sheet has no cost table (empty, only numbers, or no
/// "COSTI" cell). A missing drop column is an error the caller may choose
/// to treat as a skip.
pub fn crop_costi(
    sheet: &RawSheet,
    layout: &SheetLayout,
    diagnostics: &mut Diagnostics,
) -> Result<Option<CroppedSheet>, SheetError> {
    if sheet.n_rows() == 0 {
        diagnostics.info(format!("Foglio '{}' vuoto", sheet.name));
        return Ok(None);
    }

    let has_text = sheet
        .cells
        .iter()
        .flatten()
        .any(|c| matches!(c, CellValue::Text(_)));
    if !has_text {
        diagnostics.info(format!("Foglio '{}' senza voci valide", sheet.name));
        return Ok(None);
    }

    let marker_rows: Vec<usize> = sheet
        .cells
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .filter(|c| c.as_text() == Some(COSTI_START))
                .map(move |_| i)
        })
        .collect();

    let Some(&marker_row) = marker_rows.last() else {
        diagnostics.info(format!("Nessuna casella {} nel foglio '{}'", COSTI_START, sheet.name));
        return Ok(None);
    };
    if marker_rows.len() > 1 {
        diagnostics.warn(format!(
            "Casella {} duplicata ({} volte) nel foglio '{}', uso l'ultima",
            COSTI_START,
            marker_rows.len(),
            sheet.name
        ));
    }

    let start = marker_row + layout.skip_rows;
    if start >= sheet.n_rows() {
        diagnostics.info(format!("Nessuna riga sotto {} nel foglio '{}'", COSTI_START, sheet.name));
        return Ok(None);
    }

    let width = layout.n_columns.min(sheet.n_cols());
    let mut rows: Vec<Vec<CellValue>> = sheet.cells[start..]
        .iter()
        .map(|row| row[..width].to_vec())
        .collect();

    let mut headers = rows[0].clone();
    if let Some(label) = headers.get_mut(layout.label_col) {
        *label = CellValue::text(VOCE);
    }

    for name in &layout.drop_columns {
        let idx = headers
            .iter()
            .position(|h| h.as_text() == Some(name.as_str()))
            .ok_or_else(|| SheetError::MissingColumn(name.clone()))?;
        headers.remove(idx);
        for row in &mut rows {
            row.remove(idx);
        }
    }

    Ok(Some(CroppedSheet { headers, rows }))
}
