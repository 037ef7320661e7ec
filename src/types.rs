use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::util::display_opt;

/// One cell as read from a worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Blank cells and NaN numbers.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(_) => false,
        }
    }

    /// Plain rendering used for string columns and error messages.
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => format!("{}", n),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// A worksheet grid with no fixed schema. Rows are padded to equal width.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub cells: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(name: &str, mut cells: Vec<Vec<CellValue>>) -> Self {
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(0);
        for row in &mut cells {
            row.resize(width, CellValue::Empty);
        }
        RawSheet {
            name: name.to_string(),
            cells,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.cells.len()
    }

    pub fn n_cols(&self) -> usize {
        self.cells.first().map(|r| r.len()).unwrap_or(0)
    }
}

/// A validated cost line read from one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRow {
    pub codice: i64,
    pub voce: String,
    pub tipologia: String,
    #[serde(rename = "u.m.")]
    pub um: String,
    pub quantita: f64,
    #[serde(rename = "costo u.")]
    pub costo_u: Option<f64>,
    #[serde(rename = "imp. unit.")]
    pub imp_unit: Option<f64>,
    #[serde(rename = "imp.comp.")]
    pub imp_comp: Option<f64>,
    pub fase: Option<String>,
}

/// Site and month stamp applied to every row of a folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderStamp {
    pub commessa: String,
    pub mese: u32,
    pub anno: i32,
    pub mesi_da_inizio: i32,
    pub file_hash: String,
}

impl FolderStamp {
    /// `YYYY-MM` label of the folder month.
    pub fn data(&self) -> String {
        format!("{}-{:02}", self.anno, self.mese)
    }
}

/// A row of the tabellone. Field order is the column order of the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct ConsolidatedRecord {
    #[tabled(rename = "commessa")]
    pub commessa: String,
    #[serde(default)]
    #[tabled(rename = "fase", display_with = "display_opt_str")]
    pub fase: Option<String>,
    #[tabled(rename = "anno")]
    pub anno: i32,
    #[tabled(rename = "mese")]
    pub mese: u32,
    #[tabled(rename = "data")]
    pub data: String,
    #[serde(rename = "mesi-da-inizio")]
    #[tabled(rename = "mesi-da-inizio")]
    pub mesi_da_inizio: i32,
    #[tabled(rename = "codice")]
    pub codice: i64,
    #[tabled(rename = "tipologia")]
    pub tipologia: String,
    #[tabled(rename = "voce")]
    pub voce: String,
    #[serde(rename = "costo u.")]
    #[tabled(rename = "costo u.", display_with = "display_opt")]
    pub costo_u: Option<f64>,
    #[serde(rename = "u.m.")]
    #[tabled(rename = "u.m.")]
    pub um: String,
    #[tabled(rename = "quantita")]
    pub quantita: f64,
    #[serde(rename = "imp. unit.")]
    #[tabled(skip)]
    pub imp_unit: Option<f64>,
    #[serde(rename = "imp.comp.")]
    #[tabled(rename = "imp.comp.", display_with = "display_opt")]
    pub imp_comp: Option<f64>,
    #[serde(rename = "file-hash")]
    #[tabled(skip)]
    pub file_hash: String,
}

impl ConsolidatedRecord {
    pub fn from_row(row: CostRow, stamp: &FolderStamp) -> Self {
        ConsolidatedRecord {
            commessa: stamp.commessa.clone(),
            fase: row.fase,
            anno: stamp.anno,
            mese: stamp.mese,
            data: stamp.data(),
            mesi_da_inizio: stamp.mesi_da_inizio,
            codice: row.codice,
            tipologia: row.tipologia,
            voce: row.voce,
            costo_u: row.costo_u,
            um: row.um,
            quantita: row.quantita,
            imp_unit: row.imp_unit,
            imp_comp: row.imp_comp,
            file_hash: stamp.file_hash.clone(),
        }
    }
}

/// Divergent descriptions found for one cost code, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReportEntry {
    pub codice: i64,
    pub voci: Vec<String>,
}

/// Consistency report entry tagged with the folder it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct SiteReportRow {
    #[tabled(rename = "commessa")]
    pub commessa: String,
    #[tabled(rename = "data")]
    pub data: String,
    #[tabled(rename = "codice")]
    pub codice: i64,
    #[tabled(rename = "voci")]
    pub voci: String,
}

impl SiteReportRow {
    pub fn new(entry: &ConsistencyReportEntry, stamp: &FolderStamp) -> Self {
        SiteReportRow {
            commessa: stamp.commessa.clone(),
            data: stamp.data(),
            codice: entry.codice,
            voci: entry.voci.join(" | "),
        }
    }
}

/// Category rewrite rule as found in the rules table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
pub struct RewriteRule {
    #[serde(rename = "se contiene")]
    #[tabled(rename = "se contiene", display_with = "display_opt_str")]
    pub contains: Option<String>,
    #[serde(rename = "e non contiene", default)]
    #[tabled(rename = "e non contiene", display_with = "display_opt_str")]
    pub excludes: Option<String>,
    #[serde(rename = "da")]
    #[tabled(rename = "da", display_with = "display_opt_str")]
    pub from: Option<String>,
    #[serde(rename = "a")]
    #[tabled(rename = "a")]
    pub to: String,
}

impl RewriteRule {
    pub fn new(contains: &str, from: &str, excludes: &str, to: &str) -> Self {
        let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        RewriteRule {
            contains: opt(contains),
            excludes: opt(excludes),
            from: opt(from),
            to: to.to_string(),
        }
    }
}

/// One category change applied by the rewrite engine.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct RewriteReportRow {
    #[tabled(rename = "riga")]
    pub row: usize,
    #[serde(rename = "fix_match_n")]
    #[tabled(rename = "fix_match_n")]
    pub rule: usize,
    #[tabled(rename = "voce")]
    pub voce: String,
    #[tabled(rename = "da")]
    pub da: String,
    #[tabled(rename = "a")]
    pub a: String,
}

/// A row of the delta table between two dates.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct DeltaRow {
    #[tabled(rename = "commessa")]
    pub commessa: String,
    #[tabled(rename = "codice")]
    pub codice: i64,
    #[tabled(rename = "fase")]
    pub fase: String,
    #[tabled(rename = "tipologia")]
    pub tipologia: String,
    #[tabled(rename = "voce")]
    pub voce: String,
    #[serde(rename = "u.m.")]
    #[tabled(skip)]
    pub um: String,
    #[serde(rename = "costo u.")]
    #[tabled(skip)]
    pub costo_u: Option<f64>,
    #[serde(rename = "DA: data")]
    #[tabled(rename = "DA: data", display_with = "display_opt_str")]
    pub da_data: Option<String>,
    #[serde(rename = "DA: quantita")]
    #[tabled(skip)]
    pub da_quantita: Option<f64>,
    #[serde(rename = "DA: imp.comp.")]
    #[tabled(rename = "DA: imp.comp.", display_with = "display_opt")]
    pub da_imp_comp: Option<f64>,
    #[serde(rename = "A: data")]
    #[tabled(rename = "A: data", display_with = "display_opt_str")]
    pub a_data: Option<String>,
    #[serde(rename = "A: quantita")]
    #[tabled(skip)]
    pub a_quantita: Option<f64>,
    #[serde(rename = "A: imp.comp.")]
    #[tabled(rename = "A: imp.comp.", display_with = "display_opt")]
    pub a_imp_comp: Option<f64>,
    #[serde(rename = "DELTA: quantita")]
    #[tabled(skip)]
    pub delta_quantita: f64,
    #[serde(rename = "DELTA: imp.comp.")]
    #[tabled(rename = "DELTA: imp.comp.", display_with = "crate::util::display_f64")]
    pub delta_imp_comp: f64,
    #[serde(rename = "DA: file-hash")]
    #[tabled(skip)]
    pub da_file_hash: Option<String>,
    #[serde(rename = "A: file-hash")]
    #[tabled(skip)]
    pub a_file_hash: Option<String>,
}

fn display_opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}
