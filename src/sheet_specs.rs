// Reading parameters for the "Analisi" sheets: anchor strings, layout
// constants, header translations and expected columns.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cell that opens the cost section of a sheet.
pub const COSTI_START: &str = "COSTI";
/// Rows to skip below the "COSTI" cell to reach the header row.
pub const SKIP_COSTI_HEAD: usize = 4;
/// Columns kept when cropping.
pub const N_COLONNE: usize = 8;
/// Column holding the cost code.
pub const CODICE_COSTO_COL: usize = 0;
/// Column holding descriptions, and category labels on header rows.
pub const TIPOLOGIA_IDX: usize = 1;
/// Column holding the unit of measure.
pub const UNITS_IDX: usize = 2;
/// Content of the units cell on the table header row.
pub const UNITS_MARKER: &str = "u.m.";
/// Labels bounding the cost rows from below.
pub const STOP_MARKERS: [&str; 2] = ["Totale costi", "Total dépenses"];

pub const CODICE: &str = "codice";
pub const VOCE: &str = "voce";
pub const UM: &str = "u.m.";
pub const QUANTITA: &str = "quantita";
pub const COSTO_U: &str = "costo u.";
pub const IMP_UNIT: &str = "imp. unit.";
pub const IMP_COMP: &str = "imp.comp.";
pub const INC_PERC: &str = "inc.%";

/// Canonical columns of a cropped sheet, in file order.
pub const SHEET_COLUMNS: [&str; 8] = [CODICE, VOCE, UM, QUANTITA, COSTO_U, IMP_UNIT, INC_PERC, IMP_COMP];

/// Sheets that hold administrative or template content.
pub const EXCLUDED_SHEETS: [&str; 2] = ["0-SIT&PROG(2022-24)_", "0-SIT&PROG(2022-24)_prova"];

/// Canonical name -> spellings found across file revisions and languages.
pub static HEADER_TRANSLATIONS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (COSTI_START, vec!["DÉPENSES"]),
        (CODICE, vec!["Codice", "Code"]),
        (UM, vec![]),
        (COSTO_U, vec!["coût u.", "coît u.", "Costo unit."]),
        (QUANTITA, vec!["Quantità", "Quantité", "Quantita"]),
        (IMP_UNIT, vec!["mont. unit.", "Prezzo unit."]),
        (INC_PERC, vec![]),
        (IMP_COMP, vec!["mont. comp.", "mont. tot.", "Costo totale", "imp.comp.c."]),
    ]
});

/// Flattened synonym -> canonical lookup.
pub static TRANSLATIONS_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HEADER_TRANSLATIONS
        .iter()
        .flat_map(|(canonical, synonyms)| synonyms.iter().map(move |s| (*s, *canonical)))
        .collect()
});

/// Layout knobs for cropping and validation. Part of the extraction
/// arguments, so changing any of them invalidates cached results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub skip_rows: usize,
    pub n_columns: usize,
    pub drop_columns: Vec<String>,
    pub code_col: usize,
    pub label_col: usize,
    pub units_col: usize,
    pub excluded_sheets: Vec<String>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout {
            skip_rows: SKIP_COSTI_HEAD,
            n_columns: N_COLONNE,
            drop_columns: vec![INC_PERC.to_string()],
            code_col: CODICE_COSTO_COL,
            label_col: TIPOLOGIA_IDX,
            units_col: UNITS_IDX,
            excluded_sheets: EXCLUDED_SHEETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SheetLayout {
    /// Canonical columns expected after the drop list is applied.
    pub fn expected_columns(&self) -> Vec<&'static str> {
        SHEET_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.drop_columns.iter().any(|d| d == c))
            .collect()
    }

    pub fn keeps_imp_unit(&self) -> bool {
        !self.drop_columns.iter().any(|d| d == IMP_UNIT)
    }

    pub fn is_excluded_sheet(&self, name: &str) -> bool {
        self.excluded_sheets.iter().any(|s| s == name)
    }
}
