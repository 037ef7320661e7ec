//! Loading of the hand-maintained rule tables.
//!
//! Both tables are CSV files with a header row. Blank cells are read as
//! missing values.

use csv::{ReaderBuilder, Trim};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::tipologia::{HeaderSkipRule, HeaderSkipRules};
use crate::types::RewriteRule;

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Category rewrite rules: `se contiene`, `e non contiene`, `da`, `a`.
pub fn load_rewrite_rules(path: &Path) -> Result<Vec<RewriteRule>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).flexible(true).from_path(path)?;
    let mut rules = Vec::new();
    for result in rdr.deserialize::<RewriteRule>() {
        let mut rule = result?;
        rule.contains = blank_to_none(rule.contains);
        rule.excludes = blank_to_none(rule.excludes);
        rule.from = blank_to_none(rule.from);
        rules.push(rule);
    }
    info!("File di correzione tipologie: {} ({} regole)", path.display(), rules.len());
    Ok(rules)
}

/// Header rows not to be read as categories: `commessa`, `fase`,
/// `tipologia`.
pub fn load_header_skip_rules(path: &Path) -> Result<HeaderSkipRules> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).flexible(true).from_path(path)?;
    let mut rules = Vec::new();
    for result in rdr.deserialize::<HeaderSkipRule>() {
        rules.push(result?);
    }
    info!("File di tipologie da saltare: {} ({} righe)", path.display(), rules.len());
    Ok(HeaderSkipRules::new(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_rewrite_rules_with_blank_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tipologie_fix.csv");
        fs::write(
            &path,
            "se contiene,e non contiene,da,a\n\
             scavo,,MANODOPERA,MOVIMENTO TERRA\n\
             ferro,\"rete; staffe\",MATERIALI,ACCIAIO\n\
             , ,NOLI,ALTRO\n",
        )
        .unwrap();
        let rules = load_rewrite_rules(&path).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0], RewriteRule::new("scavo", "MANODOPERA", "", "MOVIMENTO TERRA"));
        assert_eq!(rules[1].excludes.as_deref(), Some("rete; staffe"));
        assert_eq!(rules[2].contains, None);
        assert_eq!(rules[2].excludes, None);
    }

    #[test]
    fn excludes_column_is_optional() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fix.csv");
        fs::write(&path, "se contiene,da,a\nscavo,MANODOPERA,MOVIMENTO TERRA\n").unwrap();
        let rules = load_rewrite_rules(&path).unwrap();
        assert_eq!(rules[0].excludes, None);
    }

    #[test]
    fn reads_header_skip_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tipologie_skip.csv");
        fs::write(&path, "commessa,fase,tipologia\n1434,F1,NOTE\n4004,Generale,VARIE\n").unwrap();
        let rules = load_header_skip_rules(&path).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.skips("1434", "F1", "NOTE"));
        assert!(!rules.skips("1434", "F2", "NOTE"));
    }
}
