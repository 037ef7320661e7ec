//! Folder-level and run-level consolidation.
//!
//! Data lives under a root directory as `YYYY/<month folder>/<site>`, one
//! site-month per folder, with one or more "Analisi" workbooks inside.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cache::{folder_hash, read_full_budget_cached, Cache, CACHE_DIRNAME};
use crate::config::ExtractionOptions;
use crate::error::{ConsolidaError, Result};
use crate::rewrite::apply_rewrites;
use crate::types::{ConsolidatedRecord, FolderStamp, RewriteReportRow, RewriteRule, SiteReportRow};
use crate::util::{format_int, months_between};

/// Substrings identifying budget workbooks (case-sensitive).
pub const PATTERNS: [&str; 6] = ["nalis", "RO-RO", "ACC.QUADRO", "SPE_GENE", "SPE_BRANCH", "NALIS"];
/// Spreadsheet extensions read.
pub const SUFFIXES: [&str; 2] = [".xls", ".xlsx"];

static YEAR_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^20(2[1-9]|[3-9][0-9])$").unwrap());
// 2023 onwards: "12_Dicembre/<site>"
static MONTH_FIRST_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-1][0-9]_").unwrap());
// 2021-2022: "Dicembre_12.../<4 digit site>"
static MONTH_LAST_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"_[0-1][0-9]").unwrap());
static SITE_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}").unwrap());

static MESI: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    [
        "gennaio",
        "febbraio",
        "marzo",
        "aprile",
        "maggio",
        "giugno",
        "luglio",
        "agosto",
        "settembre",
        "ottobre",
        "novembre",
        "dicembre",
    ]
    .into_iter()
    .zip(1..=12)
    .collect()
});

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True for file names like `Analisi_1434.xlsx`.
pub fn is_budget_file(name: &str) -> bool {
    if name.starts_with("~$") {
        return false;
    }
    SUFFIXES.iter().any(|suffix| {
        name.strip_suffix(suffix)
            .map(|stem| PATTERNS.iter().any(|p| stem.contains(p)))
            .unwrap_or(false)
    })
}

/// Budget workbooks directly inside `folder`, sorted by name.
pub fn find_all_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_budget_file(&entry.file_name().to_string_lossy()) {
            files.insert(entry.path());
        }
    }
    Ok(files.into_iter().collect())
}

fn is_site_folder(year: &str, month: &str, site: &str) -> bool {
    if !YEAR_DIR.is_match(year) || site == CACHE_DIRNAME {
        return false;
    }
    MONTH_FIRST_DIR.is_match(month) || (MONTH_LAST_DIR.is_match(month) && SITE_DIR.is_match(site))
}

/// Site-month folders under `root`, sorted, without the `excluded` sites.
pub fn find_site_folders(root: &Path, excluded: &[String]) -> Result<Vec<PathBuf>> {
    let mut folders = BTreeSet::new();
    for entry in WalkDir::new(root).min_depth(3).max_depth(3) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let [year, month, site] = parts.as_slice() {
            if is_site_folder(year, month, site) && !excluded.contains(site) {
                folders.insert(path.to_path_buf());
            }
        }
    }
    if !excluded.is_empty() {
        info!("Escludo commesse specificate: {:?}", excluded);
    }
    Ok(folders.into_iter().collect())
}

fn month_from_folder_name(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase().replace(' ', "_");
    let tokens: Vec<&str> = lowered.split('_').filter(|t| !t.is_empty()).collect();
    if let Some(m) = tokens.last().and_then(|t| MESI.get(*t)) {
        return Some(*m);
    }
    if let Some(m) = tokens.iter().find_map(|t| MESI.get(*t)) {
        return Some(*m);
    }
    tokens.iter().find_map(|t| {
        t.get(..2)
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m))
    })
}

/// First day of the month a site folder refers to: year from the
/// grandparent folder, month from the parent folder.
pub fn date_from_folder(folder: &Path) -> Result<NaiveDate> {
    let err = |reason: &str| ConsolidaError::FolderDate {
        path: folder.to_path_buf(),
        reason: reason.to_string(),
    };
    let month_dir = folder.parent().ok_or_else(|| err("no month folder"))?;
    let year_dir = month_dir.parent().ok_or_else(|| err("no year folder"))?;

    let anno: i32 = name_of(year_dir).parse().map_err(|_| err("year folder is not a number"))?;
    let mese = month_from_folder_name(&name_of(month_dir)).ok_or_else(|| err("unknown month"))?;
    NaiveDate::from_ymd_opt(anno, mese, 1).ok_or_else(|| err("invalid date"))
}

/// Calendar months between `folder` and the earliest folder of the same
/// site in `all_folders`.
pub fn months_from_start(folder: &Path, all_folders: &[PathBuf]) -> Result<i32> {
    let commessa = name_of(folder);
    let date = date_from_folder(folder)?;
    let mut first = date;
    for other in all_folders.iter().filter(|f| name_of(f) == commessa) {
        first = first.min(date_from_folder(other)?);
    }
    Ok(months_between(date, first))
}

/// Rows and voce conflicts of one site-month folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderBudget {
    pub records: Vec<ConsolidatedRecord>,
    pub report: Vec<SiteReportRow>,
}

/// Read every budget workbook of a site-month folder and stamp the rows
/// with site, month and folder hash. `None` when no file yields rows.
pub fn read_all_valid_budgets(
    folder: &Path,
    all_folders: &[PathBuf],
    options: &ExtractionOptions,
    cache: &Cache,
) -> Result<Option<FolderBudget>> {
    let files = find_all_files(folder)?;
    let date = date_from_folder(folder)?;
    let hash = folder_hash(folder)?;
    let stamp = FolderStamp {
        commessa: name_of(folder),
        mese: date.month(),
        anno: date.year(),
        mesi_da_inizio: months_from_start(folder, all_folders)?,
        file_hash: hash.clone(),
    };

    let mut records = Vec::new();
    let mut report = Vec::new();
    for file in &files {
        let (extraction, outcome) = read_full_budget_cached(file, &hash, options, cache)?;
        debug!("{} ({:?})", file.display(), outcome);
        report.extend(extraction.report.iter().map(|e| SiteReportRow::new(e, &stamp)));
        records.extend(extraction.rows.into_iter().map(|r| ConsolidatedRecord::from_row(r, &stamp)));
    }

    if records.is_empty() {
        info!("No file validi in {}", folder.display());
        return Ok(None);
    }
    Ok(Some(FolderBudget { records, report }))
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    pub records: Vec<ConsolidatedRecord>,
    pub report: Vec<SiteReportRow>,
    pub rewrites: Vec<RewriteReportRow>,
}

/// Consolidate `folders` in order, then apply the category rewrite rules.
pub fn load_loop_and_concat(
    folders: &[PathBuf],
    options: &ExtractionOptions,
    cache: &Cache,
    rewrite_rules: Option<&[RewriteRule]>,
) -> Result<Consolidation> {
    let mut out = Consolidation::default();
    for (i, folder) in folders.iter().enumerate() {
        info!("[{}/{}] Loading {}", i + 1, folders.len(), folder.display());
        if let Some(budget) = read_all_valid_budgets(folder, folders, options, cache)? {
            out.records.extend(budget.records);
            out.report.extend(budget.report);
        }
    }
    info!("File consolidato: {} entrate", format_int(out.records.len()));
    if !out.report.is_empty() {
        info!("Report sul file consolidato: {} entrate", format_int(out.report.len()));
    }

    if let Some(rules) = rewrite_rules {
        info!("Correggo le tipologie...");
        out.rewrites = apply_rewrites(&mut out.records, rules)?;
        info!("Tipologie corrette: {}", format_int(out.rewrites.len()));
    }
    Ok(out)
}
