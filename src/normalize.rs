//! Header normalization: replaces locale/revision-specific spellings of key
//! cells with their canonical names. Pure value substitution.

use std::collections::HashMap;

use crate::sheet_specs::TRANSLATIONS_MAP;
use crate::types::{CellValue, RawSheet};

/// Translate every cell equal to a known synonym, using `translations`
/// (synonym -> canonical). Consumes the sheet and returns the new one.
pub fn translate_with(sheet: RawSheet, translations: &HashMap<&str, &str>) -> RawSheet {
    let cells = sheet
        .cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    CellValue::Text(s) => match translations.get(s.as_str()) {
                        Some(canonical) => CellValue::text(canonical),
                        None => CellValue::Text(s),
                    },
                    other => other,
                })
                .collect()
        })
        .collect();
    RawSheet {
        name: sheet.name,
        cells,
    }
}

/// Translate with the built-in table (French files, renamed headers).
pub fn translate_sheet(sheet: RawSheet) -> RawSheet {
    translate_with(sheet, &TRANSLATIONS_MAP)
}
