//! Selection of genuine cost rows and conversion to typed [`CostRow`]s.
//!
//! This is the boundary after which nothing looks columns up by name.

use std::collections::HashSet;

use crate::crop::CroppedSheet;
use crate::error::SheetError;
use crate::logging::Diagnostics;
use crate::sheet_specs::{SheetLayout, CODICE, COSTO_U, IMP_COMP, IMP_UNIT, QUANTITA, STOP_MARKERS, UM, VOCE};
use crate::tipologia::SheetContext;
use crate::types::{CellValue, CostRow};
use crate::util::{codice_from_cell, number_from_cell};

/// Column positions of the canonical fields in a cropped sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub codice: usize,
    pub voce: usize,
    pub um: usize,
    pub quantita: usize,
    pub costo_u: usize,
    pub imp_unit: Option<usize>,
    pub imp_comp: usize,
}

/// Index of the first stop-marker row ("Totale costi", then the French
/// variant), or the number of rows when neither is present.
pub fn stop_row(cropped: &CroppedSheet, code_col: usize) -> usize {
    STOP_MARKERS
        .iter()
        .find_map(|marker| {
            cropped
                .rows
                .iter()
                .position(|row| row.get(code_col).and_then(|c| c.as_text()) == Some(*marker))
        })
        .unwrap_or(cropped.rows.len())
}

/// Indices of rows carrying a valid cost code, below the header row and
/// above the stop marker.
pub fn valid_cost_rows(cropped: &CroppedSheet, code_col: usize) -> Vec<usize> {
    let stop = stop_row(cropped, code_col);
    cropped
        .rows
        .iter()
        .enumerate()
        .filter(|(i, row)| {
            *i > 0 && *i < stop && row.get(code_col).and_then(codice_from_cell).is_some()
        })
        .map(|(i, _)| i)
        .collect()
}

/// Resolve canonical columns, repairing a single unlabeled header.
///
/// `None` when the header row cannot be mapped (logged).
pub fn resolve_columns(
    headers: &[CellValue],
    layout: &SheetLayout,
    ctx: &SheetContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<ColumnMap> {
    let expected = layout.expected_columns();
    let mut headers = headers.to_vec();

    let present: HashSet<&str> = headers.iter().filter_map(|h| h.as_text()).collect();
    let missing: Vec<&str> = expected.iter().copied().filter(|c| !present.contains(c)).collect();

    if !missing.is_empty() {
        let unlabeled: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_text().is_none())
            .map(|(i, _)| i)
            .collect();

        if unlabeled.len() > 1 {
            diagnostics.info(format!(
                "Non trovo gli header attesi {:?} in {}/{}",
                missing, ctx.commessa, ctx.fase
            ));
            return None;
        }
        if unlabeled.len() == 1 && missing.len() == 1 {
            diagnostics.info(format!(
                "Correggo header mancante in {} di {}; assumo {}",
                ctx.fase, ctx.commessa, missing[0]
            ));
            headers[unlabeled[0]] = CellValue::text(missing[0]);
        }
    }

    let find = |name: &str| headers.iter().position(|h| h.as_text() == Some(name));
    let map = (|| {
        Some(ColumnMap {
            codice: find(CODICE)?,
            voce: find(VOCE)?,
            um: find(UM)?,
            quantita: find(QUANTITA)?,
            costo_u: find(COSTO_U)?,
            imp_unit: if layout.keeps_imp_unit() { Some(find(IMP_UNIT)?) } else { None },
            imp_comp: find(IMP_COMP)?,
        })
    })();

    if map.is_none() {
        diagnostics.info(format!(
            "Header inattesi in {}/{}: {:?}",
            ctx.commessa,
            ctx.fase,
            headers.iter().map(|h| h.render()).collect::<Vec<_>>()
        ));
    }
    map
}

fn number(row: &[CellValue], col: usize, column: &str, row_idx: usize) -> Result<Option<f64>, SheetError> {
    let cell = row.get(col).unwrap_or(&CellValue::Empty);
    number_from_cell(cell).map_err(|_| SheetError::InvalidNumber {
        column: column.to_string(),
        row: row_idx,
        value: cell.render(),
    })
}

/// Typed cost rows of a cropped sheet, with `tipologia` taken from the
/// propagated categories. Rows with non-positive or blank quantity are
/// dropped. `Ok(None)` when nothing valid remains.
pub fn read_cost_rows(
    cropped: &CroppedSheet,
    tipologie: &[String],
    ctx: &SheetContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Vec<CostRow>>, SheetError> {
    let selection = valid_cost_rows(cropped, ctx.layout.code_col);
    let Some(cols) = resolve_columns(&cropped.headers, ctx.layout, ctx, diagnostics) else {
        return Ok(None);
    };

    let mut out = Vec::with_capacity(selection.len());
    for i in selection {
        let row = &cropped.rows[i];
        let code_cell = row.get(cols.codice).unwrap_or(&CellValue::Empty);
        let codice = codice_from_cell(code_cell).ok_or_else(|| SheetError::InvalidCode {
            row: i,
            value: code_cell.render(),
        })?;
        let quantita = number(row, cols.quantita, QUANTITA, i)?;
        let costo_u = number(row, cols.costo_u, COSTO_U, i)?;
        let imp_unit = match cols.imp_unit {
            Some(c) => number(row, c, IMP_UNIT, i)?,
            None => None,
        };
        let imp_comp = number(row, cols.imp_comp, IMP_COMP, i)?;

        let Some(quantita) = quantita.filter(|q| *q > 0.0) else {
            continue;
        };

        out.push(CostRow {
            codice,
            voce: row.get(cols.voce).map(|c| c.render()).unwrap_or_default(),
            tipologia: tipologie.get(i).cloned().unwrap_or_default(),
            um: row.get(cols.um).map(|c| c.render()).unwrap_or_default(),
            quantita,
            costo_u,
            imp_unit,
            imp_comp,
            fase: None,
        });
    }

    if out.is_empty() {
        diagnostics.info(format!("Nessuna voce costo valida in {}/{}", ctx.commessa, ctx.fase));
        return Ok(None);
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tipologia::HeaderSkipRules;

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn headers() -> Vec<CellValue> {
        ["codice", "voce", "u.m.", "quantita", "costo u.", "imp. unit.", "imp.comp."]
            .iter()
            .map(|s| t(s))
            .collect()
    }

    fn sheet(rows: Vec<Vec<CellValue>>) -> CroppedSheet {
        let mut all = vec![headers()];
        all[0][1] = t("MANODOPERA");
        all.extend(rows);
        CroppedSheet {
            headers: headers(),
            rows: all,
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&SheetContext<'_>) -> R) -> R {
        let layout = SheetLayout::default();
        let skip = HeaderSkipRules::default();
        let ctx = SheetContext {
            commessa: "1434",
            fase: "F1",
            skip_rules: &skip,
            layout: &layout,
        };
        f(&ctx)
    }

    fn line(code: CellValue, voce: &str, qty: CellValue) -> Vec<CellValue> {
        vec![code, t(voce), t("mc"), qty, t("1 000,5"), n(2.0), n(10.0)]
    }

    #[test]
    fn selects_codes_until_stop_marker() {
        let s = sheet(vec![
            line(n(101.0), "Scavo", n(5.0)),
            line(t("102a"), "Rinforzo", n(1.0)),
            line(t("nota"), "x", n(1.0)),
            vec![t("Totale costi"); 7],
            line(n(103.0), "Oltre il totale", n(1.0)),
        ]);
        assert_eq!(stop_row(&s, 0), 4);
        assert_eq!(valid_cost_rows(&s, 0), vec![1, 2]);
    }

    #[test]
    fn french_stop_marker_is_a_fallback() {
        let s = sheet(vec![
            line(n(101.0), "Scavo", n(5.0)),
            vec![t("Total dépenses"); 7],
            line(n(103.0), "x", n(1.0)),
        ]);
        assert_eq!(valid_cost_rows(&s, 0), vec![1]);
    }

    #[test]
    fn coerces_and_drops_non_positive_quantities() {
        let s = sheet(vec![
            line(n(101.0), "Scavo", n(5.0)),
            line(t("102b"), "Rinforzo", n(0.0)),
            line(n(103.0), "Getto", t("2,5")),
            line(n(104.0), "Vuoto", CellValue::Empty),
        ]);
        let tip = vec!["MANODOPERA".to_string(); 5];
        let mut d = Diagnostics::new();
        let rows = with_ctx(|ctx| read_cost_rows(&s, &tip, ctx, &mut d)).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].codice, 101);
        assert_eq!(rows[0].costo_u, Some(1000.5));
        assert_eq!(rows[1].codice, 103);
        assert_eq!(rows[1].quantita, 2.5);
        assert!(rows.iter().all(|r| r.quantita > 0.0));
        assert!(rows.iter().all(|r| r.tipologia == "MANODOPERA"));
    }

    #[test]
    fn unparseable_number_is_an_error() {
        let s = sheet(vec![line(n(101.0), "Scavo", t("cinque"))]);
        let tip = vec![String::new(); 2];
        let mut d = Diagnostics::new();
        let err = with_ctx(|ctx| read_cost_rows(&s, &tip, ctx, &mut d)).unwrap_err();
        assert!(matches!(err, SheetError::InvalidNumber { ref column, .. } if column == "quantita"));
    }

    #[test]
    fn infers_single_missing_header() {
        let mut h = headers();
        h[4] = CellValue::Empty;
        let mut d = Diagnostics::new();
        let cols = with_ctx(|ctx| resolve_columns(&h, ctx.layout, ctx, &mut d)).unwrap();
        assert_eq!(cols.costo_u, 4);
        assert_eq!(d.lines().len(), 1);
    }

    #[test]
    fn two_missing_headers_skip_the_sheet() {
        let mut h = headers();
        h[4] = CellValue::Empty;
        h[6] = n(3.0);
        let mut d = Diagnostics::new();
        assert!(with_ctx(|ctx| resolve_columns(&h, ctx.layout, ctx, &mut d)).is_none());
    }
}
