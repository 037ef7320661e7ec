use calamine::{open_workbook_auto, Data, Range, Reader};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ExtractionOptions;
use crate::consistency::fix_voice_consistency;
use crate::crop::crop_costi;
use crate::error::{ConsolidaError, Result, SheetError};
use crate::logging::Diagnostics;
use crate::normalize::translate_sheet;
use crate::tipologia::{propagate_tipologia, SheetContext};
use crate::types::{CellValue, ConsistencyReportEntry, CostRow, RawSheet};
use crate::validate::read_cost_rows;

/// Everything one source file yields: rows, voce conflicts, and the log
/// lines produced while reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetExtraction {
    pub rows: Vec<CostRow>,
    pub report: Vec<ConsistencyReportEntry>,
    pub log: Diagnostics,
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    }
}

/// Grid of a worksheet range, placed at its absolute position (ranges do
/// not always start at A1).
pub fn sheet_from_range(name: &str, range: &Range<Data>) -> RawSheet {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); row0 as usize];
    for row in range.rows() {
        let mut out = vec![CellValue::Empty; col0 as usize];
        out.extend(row.iter().map(cell_from_data));
        cells.push(out);
    }
    RawSheet::new(name, cells)
}

/// Read every worksheet of an xls/xlsx file, in workbook order.
pub fn read_workbook(path: &Path) -> Result<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ConsolidaError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ConsolidaError::Workbook {
                path: path.to_path_buf(),
                message: format!("failed to read sheet '{}': {}", name, e),
            })?;
        sheets.push(sheet_from_range(name, &range));
    }
    Ok(sheets)
}

/// Costs of a single phase sheet: translate, crop, propagate categories,
/// validate.
pub fn read_budget_sheet(
    sheet: RawSheet,
    ctx: &SheetContext<'_>,
    diagnostics: &mut Diagnostics,
) -> std::result::Result<Option<Vec<CostRow>>, SheetError> {
    let sheet = translate_sheet(sheet);
    let Some(cropped) = crop_costi(&sheet, ctx.layout, diagnostics)? else {
        return Ok(None);
    };
    let tipologie = propagate_tipologia(&cropped, ctx);
    read_cost_rows(&cropped, &tipologie, ctx, diagnostics)
}

/// Aggregate the phase sheets of one file.
///
/// Excluded and empty sheets are skipped. Phase names are kept on each row
/// unless `sum_fasi`, in which case rows are summed per cost code after the
/// voce reconciliation.
pub fn extract_sheets(
    path: &Path,
    commessa: &str,
    sheets: Vec<RawSheet>,
    options: &ExtractionOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(Vec<CostRow>, Vec<ConsistencyReportEntry>)> {
    let mut all_fasi: Vec<CostRow> = Vec::new();

    for sheet in sheets {
        let fase = sheet.name.clone();
        if options.layout.is_excluded_sheet(&fase) {
            diagnostics.debug(format!("Salto foglio escluso '{}'", fase));
            continue;
        }
        let ctx = SheetContext {
            commessa,
            fase: &fase,
            skip_rules: &options.skip_rules,
            layout: &options.layout,
        };
        match read_budget_sheet(sheet, &ctx, diagnostics) {
            Ok(Some(mut rows)) => {
                if !options.sum_fasi {
                    for r in &mut rows {
                        r.fase = Some(fase.clone());
                    }
                }
                all_fasi.extend(rows);
            }
            Ok(None) => {}
            Err(e) if e.is_missing_inc_column() => {
                diagnostics.info(format!(
                    "Skipping fase '{}' in '{}': no costi validi",
                    fase,
                    path.display()
                ));
            }
            Err(source) => {
                return Err(ConsolidaError::Sheet {
                    path: path.to_path_buf(),
                    sheet: fase,
                    source,
                })
            }
        }
    }

    if all_fasi.is_empty() {
        diagnostics.warn(format!("Nessuna voce costo valida in file {}", path.display()));
    }

    let (rows, report) = fix_voice_consistency(all_fasi);
    if !report.is_empty() {
        diagnostics.info(format!(
            "{} codici con voci incoerenti in {}",
            report.len(),
            path.display()
        ));
    }

    let rows = if options.sum_fasi { sum_fasi(rows) } else { rows };
    Ok((rows, report))
}

/// Read and extract one source file, without caching.
pub fn read_full_budget(path: &Path, options: &ExtractionOptions) -> Result<BudgetExtraction> {
    let mut log = Diagnostics::new();
    log.info(format!("Re-importo {}, no cache per questa versione di script e dati", path.display()));

    let commessa = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let sheets = read_workbook(path)?;
    let (rows, report) = extract_sheets(path, &commessa, sheets, options, &mut log)?;
    Ok(BudgetExtraction { rows, report, log })
}

fn add_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Sum quantity and total amount per cost code; every other field comes
/// from the first row of the code. Output is ordered by code.
pub fn sum_fasi(rows: Vec<CostRow>) -> Vec<CostRow> {
    let mut grouped: BTreeMap<i64, CostRow> = BTreeMap::new();
    for r in rows {
        match grouped.entry(r.codice) {
            Entry::Vacant(e) => {
                e.insert(CostRow { fase: None, ..r });
            }
            Entry::Occupied(mut e) => {
                let acc = e.get_mut();
                acc.quantita += r.quantita;
                acc.imp_comp = add_opt(acc.imp_comp, r.imp_comp);
            }
        }
    }
    grouped.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_specs::SheetLayout;

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    /// Sheet with "COSTI" at row 10 and the header four rows below.
    fn phase_sheet(name: &str, lines: &[(f64, &str, f64)]) -> RawSheet {
        let mut cells = vec![vec![CellValue::Empty; 8]; 14];
        cells[0][0] = t("Commessa 1434");
        cells[10][0] = t("COSTI");
        cells.push(vec![
            t("codice"),
            t("MANODOPERA"),
            t("u.m."),
            t("quantita"),
            t("costo u."),
            t("imp. unit."),
            t("inc.%"),
            t("imp.comp."),
        ]);
        for (code, voce, qty) in lines {
            cells.push(vec![n(*code), t(voce), t("mc"), n(*qty), n(10.0), n(10.0), n(0.1), n(qty * 10.0)]);
        }
        cells.push(vec![t("Totale costi"), CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty, n(0.0)]);
        RawSheet::new(name, cells)
    }

    #[test]
    fn reconciles_and_drops_zero_quantities() {
        let sheet = phase_sheet("F1", &[(101.0, "Scavo", 5.0), (102.0, "Rinforzo", 0.0), (101.0, "Scavo terreno", 3.0)]);
        let mut log = Diagnostics::new();
        let (rows, report) = extract_sheets(
            Path::new("1434/Analisi.xlsx"),
            "1434",
            vec![sheet],
            &ExtractionOptions::default(),
            &mut log,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.codice == 101 && r.voce == "Scavo"));
        assert!(rows.iter().all(|r| r.fase.as_deref() == Some("F1")));
        assert!(rows.iter().all(|r| r.tipologia == "MANODOPERA"));
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].codice, 101);
        assert_eq!(report[0].voci, vec!["Scavo", "Scavo terreno"]);
    }

    #[test]
    fn sums_phases_by_code() {
        let f1 = phase_sheet("F1", &[(101.0, "Scavo", 5.0), (103.0, "Getto", 1.0)]);
        let f2 = phase_sheet("F2", &[(101.0, "Scavo", 2.0)]);
        let excluded = phase_sheet("0-SIT&PROG(2022-24)_", &[(101.0, "Scavo", 100.0)]);
        let options = ExtractionOptions {
            sum_fasi: true,
            ..Default::default()
        };
        let mut log = Diagnostics::new();
        let (rows, _) = extract_sheets(Path::new("x.xlsx"), "1434", vec![f1, excluded, f2], &options, &mut log).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].codice, 101);
        assert_eq!(rows[0].quantita, 7.0);
        assert_eq!(rows[0].imp_comp, Some(70.0));
        assert_eq!(rows[0].fase, None);
        assert_eq!(rows[1].codice, 103);
    }

    #[test]
    fn sheet_without_percentage_column_is_skipped() {
        let mut bad = phase_sheet("F2", &[(101.0, "Scavo", 5.0)]);
        bad.cells[14][6] = t("altro");
        let good = phase_sheet("F1", &[(102.0, "Getto", 1.0)]);
        let mut log = Diagnostics::new();
        let (rows, _) = extract_sheets(Path::new("x.xlsx"), "1", vec![good, bad], &ExtractionOptions::default(), &mut log).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(log.lines().iter().any(|l| l.message.contains("Skipping fase 'F2'")));
    }

    #[test]
    fn other_sheet_errors_carry_context() {
        let mut bad = phase_sheet("F3", &[(101.0, "Scavo", 5.0)]);
        bad.cells[15][3] = t("molti");
        let mut log = Diagnostics::new();
        let err = extract_sheets(Path::new("x.xlsx"), "1", vec![bad], &ExtractionOptions::default(), &mut log).unwrap_err();
        match err {
            ConsolidaError::Sheet { sheet, .. } => assert_eq!(sheet, "F3"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn french_sheet_is_translated() {
        let mut sheet = phase_sheet("F1", &[(101.0, "Fouille", 5.0)]);
        sheet.cells[10][0] = t("DÉPENSES");
        sheet.cells[14][0] = t("Code");
        sheet.cells[14][3] = t("Quantité");
        sheet.cells[16][0] = t("Total dépenses");
        let mut log = Diagnostics::new();
        let (rows, _) = extract_sheets(Path::new("x.xlsx"), "1", vec![sheet], &ExtractionOptions::default(), &mut log).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantita, 5.0);
    }

    #[test]
    fn drop_list_controls_imp_unit() {
        let layout = SheetLayout {
            drop_columns: vec!["inc.%".into(), "imp. unit.".into()],
            ..Default::default()
        };
        let options = ExtractionOptions {
            layout,
            ..Default::default()
        };
        let mut log = Diagnostics::new();
        let (rows, _) = extract_sheets(Path::new("x.xlsx"), "1", vec![phase_sheet("F1", &[(1.0, "a", 1.0)])], &options, &mut log).unwrap();
        assert_eq!(rows[0].imp_unit, None);
    }
}
