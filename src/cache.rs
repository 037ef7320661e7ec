//! Content-addressed cache of single-file extractions.
//!
//! An extraction is stored as three files in a `cached` folder:
//!
//! - `<name>_<file>_<args>_<folder>_<version>.data.json` - the cost rows
//! - `<name>_<file>_<args>_<folder>_<version>.report.json` - voce conflicts
//! - `<name>_<file>_<args>_<folder>_<version>.log` - log lines of the extraction
//!
//! `name` is the source file name with its extension, `file` hashes its
//! bytes, `args` the [`ExtractionOptions`], `folder` the content of the
//! source file's folder (cache folder excluded) and `version` the code
//! version. A lookup hits only when all three files for the current key
//! exist and parse; anything else is recomputed.
//!
//! Callers must serialize access to a given cache folder: there is no
//! locking, only atomic (temp file + rename) writes.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{CacheConfig, ExtractionOptions};
use crate::error::Result;
use crate::loader::{read_full_budget, BudgetExtraction};
use crate::logging::Diagnostics;
use crate::types::{ConsistencyReportEntry, CostRow};

/// Name of cache folders, next to source files or under a cache root.
pub const CACHE_DIRNAME: &str = "cached";
/// Hex characters kept from each hash.
pub const HASH_LEN: usize = 8;

const DATA_SUFFIX: &str = ".data.json";
const REPORT_SUFFIX: &str = ".report.json";
const LOG_SUFFIX: &str = ".log";
const TMP_EXTENSION: &str = "tmp";

/// Truncated SHA-256 of `bytes`, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for b in digest.iter() {
        hex.push_str(&format!("{:02x}", b));
    }
    hex.truncate(HASH_LEN);
    hex
}

/// Hash of a file's bytes; independent of the file's name and location.
pub fn file_hash(path: &Path) -> Result<String> {
    Ok(hash_bytes(&fs::read(path)?))
}

/// Hash of every file under `folder` (recursive, `cached` folders skipped).
/// Relative paths and contents contribute; the folder's own location does
/// not.
pub fn folder_hash(folder: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == CACHE_DIRNAME));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        hasher.update(rel.join("/").as_bytes());
        hasher.update([0u8]);
        hasher.update(Sha256::digest(fs::read(entry.path())?));
    }
    Ok(hash_bytes(&hasher.finalize()))
}

/// Hash of the extraction arguments.
pub fn args_hash(options: &ExtractionOptions) -> Result<String> {
    Ok(hash_bytes(&serde_json::to_vec(options)?))
}

/// Identifier of the extraction code. Any change invalidates the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeVersion(pub String);

impl CodeVersion {
    pub fn current() -> Self {
        CodeVersion(format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }

    pub fn hash(&self) -> String {
        hash_bytes(self.0.as_bytes())
    }
}

/// How a cached read was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Disabled,
}

/// Cache settings plus the code version, threaded through a run.
#[derive(Debug, Clone)]
pub struct Cache {
    pub config: CacheConfig,
    pub version: CodeVersion,
}

impl Cache {
    pub fn new(config: CacheConfig, version: CodeVersion) -> Self {
        Cache { config, version }
    }

    pub fn disabled() -> Self {
        Cache::new(CacheConfig::disabled(), CodeVersion::current())
    }

    /// Folder holding the cache files of `source`.
    pub fn dir_for(&self, source: &Path) -> PathBuf {
        let parent = source.parent().unwrap_or(Path::new("."));
        match &self.config.root {
            None => parent.join(CACHE_DIRNAME),
            Some(root) => root
                .join(CACHE_DIRNAME)
                .join(hash_bytes(parent.to_string_lossy().as_bytes())),
        }
    }
}

/// Parsed name of a cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub source: String,
    pub file: String,
    pub args: String,
    pub folder: String,
    pub version: String,
}

impl CacheKey {
    fn base(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.source, self.file, self.args, self.folder, self.version
        )
    }

    /// Parse a cache file name back into its key.
    pub fn parse(file_name: &str) -> Option<Self> {
        let base = [DATA_SUFFIX, REPORT_SUFFIX, LOG_SUFFIX]
            .iter()
            .find_map(|s| file_name.strip_suffix(s))?;
        let mut parts = base.rsplitn(5, '_');
        let version = parts.next()?.to_string();
        let folder = parts.next()?.to_string();
        let args = parts.next()?.to_string();
        let file = parts.next()?.to_string();
        let source = parts.next()?.to_string();
        if [&version, &folder, &args, &file].iter().any(|h| h.len() != HASH_LEN) {
            return None;
        }
        Some(CacheKey {
            source,
            file,
            args,
            folder,
            version,
        })
    }
}

struct CacheFiles {
    data: PathBuf,
    report: PathBuf,
    log: PathBuf,
}

impl CacheFiles {
    fn new(dir: &Path, key: &CacheKey) -> Self {
        let base = key.base();
        CacheFiles {
            data: dir.join(format!("{base}{DATA_SUFFIX}")),
            report: dir.join(format!("{base}{REPORT_SUFFIX}")),
            log: dir.join(format!("{base}{LOG_SUFFIX}")),
        }
    }

    fn all_exist(&self) -> bool {
        self.data.is_file() && self.report.is_file() && self.log.is_file()
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(TMP_EXTENSION);
    let written = fs::write(&tmp_path, content).and_then(|_| fs::rename(&tmp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read(path).ok()?;
    serde_json::from_slice(&content).ok()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_vec(value)?)
}

fn load(files: &CacheFiles) -> Option<BudgetExtraction> {
    let rows: Vec<CostRow> = read_json(&files.data)?;
    let report: Vec<ConsistencyReportEntry> = read_json(&files.report)?;
    let log = Diagnostics::from_text(&fs::read_to_string(&files.log).ok()?)?;
    Some(BudgetExtraction { rows, report, log })
}

fn store(files: &CacheFiles, extraction: &BudgetExtraction) -> Result<()> {
    write_json(&files.data, &extraction.rows)?;
    write_json(&files.report, &extraction.report)?;
    write_atomic(&files.log, extraction.log.to_text().as_bytes())
}

/// Delete cache files of the same source file built with other arguments,
/// plus temp files left behind by interrupted writes.
fn remove_stale_args(dir: &Path, key: &CacheKey) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let stale = match CacheKey::parse(&entry.file_name().to_string_lossy()) {
            Some(other) => other.source == key.source && other.args != key.args,
            None => path.extension().is_some_and(|e| e == TMP_EXTENSION),
        };
        if stale {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Extract `path`, going through the cache.
///
/// `folder_hash` is the [`folder_hash`] of the file's folder, computed once
/// by the caller.
pub fn read_full_budget_cached(
    path: &Path,
    folder_hash: &str,
    options: &ExtractionOptions,
    cache: &Cache,
) -> Result<(BudgetExtraction, CacheOutcome)> {
    if !cache.config.enabled {
        let extraction = read_full_budget(path, options)?;
        extraction.log.replay();
        return Ok((extraction, CacheOutcome::Disabled));
    }

    let key = CacheKey {
        source: path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file: file_hash(path)?,
        args: args_hash(options)?,
        folder: folder_hash.to_string(),
        version: cache.version.hash(),
    };
    let dir = cache.dir_for(path);
    let files = CacheFiles::new(&dir, &key);

    if files.all_exist() {
        if let Some(extraction) = load(&files) {
            debug!("Cache valida per {}", path.display());
            let removed = remove_stale_args(&dir, &key)?;
            if removed > 0 {
                debug!("Rimossi {} file di cache obsoleti per {}", removed, path.display());
            }
            return Ok((extraction, CacheOutcome::Hit));
        }
        debug!("Cache illeggibile per {}, ricalcolo", path.display());
    }

    let extraction = read_full_budget(path, options)?;
    fs::create_dir_all(&dir)?;
    store(&files, &extraction)?;
    extraction.log.replay();
    Ok((extraction, CacheOutcome::Miss))
}

/// Remove every `cached` folder under `root`. Returns how many were removed.
pub fn flush_all_cache(root: &Path) -> Result<usize> {
    let mut targets = Vec::new();
    let mut walker = WalkDir::new(root).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if entry.file_type().is_dir() && entry.file_name() == CACHE_DIRNAME {
            targets.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    for dir in &targets {
        fs::remove_dir_all(dir)?;
    }
    info!("Rimosse {} cartelle di cache sotto {}", targets.len(), root.display());
    Ok(targets.len())
}
