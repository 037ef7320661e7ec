//! Category ("tipologia") propagation.
//!
//! Category header rows ("MANODOPERA", "NOLI", ...) introduce the rows
//! below them. A single forward pass stamps every row with the most recent
//! header label seen at or above it.

use serde::{Deserialize, Serialize};

use crate::crop::CroppedSheet;
use crate::sheet_specs::{SheetLayout, UNITS_MARKER};
use crate::types::CellValue;

/// A (site, phase, label) combination that must not be read as a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSkipRule {
    pub commessa: String,
    pub fase: String,
    pub tipologia: String,
}

/// Hand-curated exclusions for sheets where a string sits in the label
/// column for unrelated reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSkipRules {
    rules: Vec<HeaderSkipRule>,
}

impl HeaderSkipRules {
    pub fn new(rules: Vec<HeaderSkipRule>) -> Self {
        HeaderSkipRules { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn skips(&self, commessa: &str, fase: &str, label: &str) -> bool {
        self.rules
            .iter()
            .any(|r| r.commessa == commessa && r.fase == fase && r.tipologia == label)
    }
}

/// Where a sheet comes from, for skip-rule lookups.
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    pub commessa: &'a str,
    pub fase: &'a str,
    pub skip_rules: &'a HeaderSkipRules,
    pub layout: &'a SheetLayout,
}

/// Label of the row if it is a category header.
///
/// The label cell must be text and not excluded for this site/phase; the
/// units cell must be blank or hold the units marker.
pub fn header_label<'r>(row: &'r [CellValue], ctx: &SheetContext<'_>) -> Option<&'r str> {
    let label = row.get(ctx.layout.label_col)?.as_text()?;
    if ctx.skip_rules.skips(ctx.commessa, ctx.fase, label) {
        return None;
    }
    match row.get(ctx.layout.units_col)? {
        CellValue::Text(units) if units == UNITS_MARKER => Some(label),
        CellValue::Text(_) => None,
        other if other.is_blank() => Some(label),
        _ => None,
    }
}

/// Category of every row of the cropped sheet, aligned with `rows`.
/// Empty string before the first header.
pub fn propagate_tipologia(cropped: &CroppedSheet, ctx: &SheetContext<'_>) -> Vec<String> {
    cropped
        .rows
        .iter()
        .scan(String::new(), |current, row| {
            if let Some(label) = header_label(row, ctx) {
                *current = label.to_string();
            }
            Some(current.clone())
        })
        .collect()
}
