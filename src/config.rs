//! Run configuration.
//!
//! [`ExtractionOptions`] are the per-file extraction arguments; they are
//! hashed into cache keys. [`RunConfig`] describes a whole consolidation run
//! and can be loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::sheet_specs::SheetLayout;
use crate::tipologia::HeaderSkipRules;

/// Arguments of a single-file extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOptions {
    /// Sum rows of the same cost code across phases instead of keeping
    /// one row per phase.
    pub sum_fasi: bool,
    pub skip_rules: HeaderSkipRules,
    pub layout: SheetLayout,
}

/// Where and whether extraction results are cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache under this folder instead of next to each source file.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            root: None,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        CacheConfig {
            enabled: false,
            root: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Settings of a consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Root holding the `YYYY/<month>/<site>` folders.
    pub directory: PathBuf,
    /// Output folder; defaults to `<directory>/exports`.
    pub output_dir: Option<PathBuf>,
    /// Site ids left out of the run.
    pub excluded_commesse: Vec<String>,
    /// CSV with `se contiene`, `e non contiene`, `da`, `a` columns.
    pub tipologie_fix: Option<PathBuf>,
    /// CSV with `commessa`, `fase`, `tipologia` columns.
    pub tipologie_skip: Option<PathBuf>,
    pub cache: CacheConfig,
    pub sum_fasi: bool,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.directory.join("exports"))
    }

    /// Rule paths given relative to the data directory are resolved
    /// against it.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml() {
        let cfg: RunConfig = toml::from_str(
            r#"
directory = "/data/cantieri"
excluded_commesse = ["4004", "9981"]
tipologie_fix = "tipologie_fix.csv"

[cache]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.directory, PathBuf::from("/data/cantieri"));
        assert_eq!(cfg.excluded_commesse, vec!["4004", "9981"]);
        assert!(!cfg.cache.enabled);
        assert!(!cfg.sum_fasi);
        assert_eq!(cfg.exports_dir(), PathBuf::from("/data/cantieri/exports"));
        assert_eq!(
            cfg.resolve(cfg.tipologie_fix.as_deref().unwrap()),
            PathBuf::from("/data/cantieri/tipologie_fix.csv")
        );
    }

    #[test]
    fn cache_enabled_by_default() {
        let cfg: RunConfig = toml::from_str("directory = \"x\"").unwrap();
        assert!(cfg.cache.enabled);
        assert!(cfg.cache.root.is_none());
    }
}
