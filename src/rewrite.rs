//! Category ("tipologia") rewrite engine.
//!
//! A rule rewrites the category of every row whose description contains
//! `se contiene`, contains none of the `;`-separated `e non contiene`
//! fragments, and whose current category equals `da`. Comparisons are
//! lowercase; a missing rule field never matches.

use rayon::prelude::*;
use std::collections::BTreeSet;
use tabled::Table;

use crate::error::{ConsolidaError, Result};
use crate::types::{ConsolidatedRecord, CostRow, RewriteReportRow, RewriteRule};

/// Stand-in for missing values, chosen so it never occurs in real text.
pub const NAN_SENTINEL: &str = "!@#$#$^";
const EXCLUDE_SEPARATOR: char = ';';

/// Rows the engine can read and rewrite.
pub trait Categorized {
    fn voce(&self) -> &str;
    fn tipologia(&self) -> &str;
    fn set_tipologia(&mut self, tipologia: String);
}

impl Categorized for ConsolidatedRecord {
    fn voce(&self) -> &str {
        &self.voce
    }

    fn tipologia(&self) -> &str {
        &self.tipologia
    }

    fn set_tipologia(&mut self, tipologia: String) {
        self.tipologia = tipologia;
    }
}

impl Categorized for CostRow {
    fn voce(&self) -> &str {
        &self.voce
    }

    fn tipologia(&self) -> &str {
        &self.tipologia
    }

    fn set_tipologia(&mut self, tipologia: String) {
        self.tipologia = tipologia;
    }
}

fn normalize(value: Option<&str>) -> String {
    match value {
        Some(s) => s.to_lowercase(),
        None => NAN_SENTINEL.to_string(),
    }
}

/// Lowercased rule fields, ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatcher {
    contains: String,
    excludes: Vec<String>,
    from: String,
}

impl RuleMatcher {
    pub fn new(rule: &RewriteRule) -> Self {
        let excludes = match &rule.excludes {
            Some(s) => s
                .to_lowercase()
                .split(EXCLUDE_SEPARATOR)
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            None => Vec::new(),
        };
        RuleMatcher {
            contains: normalize(rule.contains.as_deref()),
            excludes,
            from: normalize(rule.from.as_deref()),
        }
    }

    /// `voce` and `tipologia` must already be lowercase.
    pub fn matches(&self, voce: &str, tipologia: &str) -> bool {
        voce.contains(&self.contains)
            && tipologia == self.from
            && !self.excludes.iter().any(|f| voce.contains(f.as_str()))
    }
}

/// Indices of the matching rules, one list per row.
///
/// Pure function of the two tables; rows are matched in parallel.
pub fn match_rules(voci: &[String], tipologie: &[String], matchers: &[RuleMatcher]) -> Vec<Vec<usize>> {
    voci.par_iter()
        .zip(tipologie.par_iter())
        .map(|(voce, tipologia)| {
            matchers
                .iter()
                .enumerate()
                .filter(|(_, m)| m.matches(voce, tipologia))
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Fail on the first row matched by rules with different targets.
pub fn check_ambiguity<T: Categorized>(
    rows: &[T],
    matches: &[Vec<usize>],
    rules: &[RewriteRule],
) -> Result<()> {
    for (i, matched) in matches.iter().enumerate() {
        if matched.len() < 2 {
            continue;
        }
        let targets: BTreeSet<&str> = matched.iter().map(|&j| rules[j].to.as_str()).collect();
        if targets.len() > 1 {
            let conflicting: Vec<&RewriteRule> = matched.iter().map(|&j| &rules[j]).collect();
            return Err(ConsolidaError::AmbiguousRewrite {
                voce: rows[i].voce().to_string(),
                rules: Table::new(conflicting).to_string(),
            });
        }
    }
    Ok(())
}

/// Rewrite the categories of `rows` in place.
///
/// Returns one report row per (row, rule) match. On an ambiguous rule set
/// nothing is modified.
pub fn apply_rewrites<T: Categorized>(rows: &mut [T], rules: &[RewriteRule]) -> Result<Vec<RewriteReportRow>> {
    let matchers: Vec<RuleMatcher> = rules.iter().map(RuleMatcher::new).collect();
    let voci: Vec<String> = rows.iter().map(|r| normalize(Some(r.voce()))).collect();
    let tipologie: Vec<String> = rows.iter().map(|r| normalize(Some(r.tipologia()))).collect();

    let matches = match_rules(&voci, &tipologie, &matchers);
    check_ambiguity(rows, &matches, rules)?;

    check_stale(rows, &matches, rules)?;

    let mut report = Vec::new();
    for (i, matched) in matches.iter().enumerate() {
        let Some(&first) = matched.first() else {
            continue;
        };
        for &j in matched {
            report.push(RewriteReportRow {
                row: i,
                rule: j,
                voce: rows[i].voce().to_string(),
                da: rules[j].from.clone().unwrap_or_default(),
                a: rules[j].to.clone(),
            });
        }
        // All matched rules share the target, so the first one decides.
        rows[i].set_tipologia(rules[first].to.clone());
    }
    Ok(report)
}

/// Fail if a matched row's category no longer equals its rule's `da`.
pub fn check_stale<T: Categorized>(rows: &[T], matches: &[Vec<usize>], rules: &[RewriteRule]) -> Result<()> {
    for (i, matched) in matches.iter().enumerate() {
        let Some(&first) = matched.first() else {
            continue;
        };
        let expected = rules[first].from.as_deref().unwrap_or_default();
        let found = rows[i].tipologia();
        if found.to_lowercase() != expected.to_lowercase() {
            return Err(ConsolidaError::StaleRewrite {
                row: i,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(voce: &str, tipologia: &str) -> CostRow {
        CostRow {
            codice: 1,
            voce: voce.to_string(),
            tipologia: tipologia.to_string(),
            um: "mc".to_string(),
            quantita: 1.0,
            costo_u: None,
            imp_unit: None,
            imp_comp: None,
            fase: None,
        }
    }

    #[test]
    fn rewrites_only_rows_in_source_category() {
        let rules = vec![RewriteRule::new("scavo", "manodopera", "", "movimento terra")];
        let mut rows = vec![row("scavo a mano", "manodopera"), row("scavo a mano", "noli")];
        let report = apply_rewrites(&mut rows, &rules).unwrap();
        assert_eq!(rows[0].tipologia, "movimento terra");
        assert_eq!(rows[1].tipologia, "noli");
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].row, 0);
        assert_eq!(report[0].rule, 0);
    }

    #[test]
    fn matching_ignores_case() {
        let rules = vec![RewriteRule::new("SCAVO", "Manodopera", "", "MOVIMENTO TERRA")];
        let mut rows = vec![row("Scavo a mano", "MANODOPERA")];
        apply_rewrites(&mut rows, &rules).unwrap();
        assert_eq!(rows[0].tipologia, "MOVIMENTO TERRA");
    }

    #[test]
    fn exclusion_fragments_block_a_match() {
        let rules = vec![RewriteRule::new("scavo", "manodopera", "roccia; trincea", "movimento terra")];
        let mut rows = vec![
            row("scavo in roccia", "manodopera"),
            row("scavo in trincea", "manodopera"),
            row("scavo a sezione", "manodopera"),
        ];
        let report = apply_rewrites(&mut rows, &rules).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(rows[0].tipologia, "manodopera");
        assert_eq!(rows[1].tipologia, "manodopera");
        assert_eq!(rows[2].tipologia, "movimento terra");
    }

    #[test]
    fn missing_rule_fields_never_match() {
        let rules = vec![RewriteRule::new("", "manodopera", "", "x"), RewriteRule::new("scavo", "", "", "y")];
        let mut rows = vec![row("scavo", "manodopera"), row("scavo", "")];
        assert!(apply_rewrites(&mut rows, &rules).unwrap().is_empty());
        assert_eq!(rows[1].tipologia, "");
    }

    #[test]
    fn ambiguous_rules_fail_without_mutation() {
        let rules = vec![
            RewriteRule::new("scavo", "manodopera", "", "movimento terra"),
            RewriteRule::new("a mano", "manodopera", "", "noli"),
        ];
        let mut rows = vec![row("getto", "manodopera"), row("scavo", "manodopera"), row("scavo a mano", "manodopera")];
        let before = rows.clone();
        let err = apply_rewrites(&mut rows, &rules).unwrap_err();
        match err {
            ConsolidaError::AmbiguousRewrite { voce, rules } => {
                assert_eq!(voce, "scavo a mano");
                assert!(rules.contains("movimento terra"));
                assert!(rules.contains("noli"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(rows, before);
    }

    #[test]
    fn overlapping_rules_with_one_target_are_fine() {
        let rules = vec![
            RewriteRule::new("scavo", "manodopera", "", "movimento terra"),
            RewriteRule::new("a mano", "manodopera", "", "movimento terra"),
        ];
        let mut rows = vec![row("scavo a mano", "manodopera")];
        let report = apply_rewrites(&mut rows, &rules).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(rows[0].tipologia, "movimento terra");
    }

    #[test]
    fn stale_category_is_caught_before_any_rewrite() {
        let rules = vec![RewriteRule::new("scavo", "MANODOPERA", "", "SCAVI")];
        let rows = vec![row("Scavo a mano", "MANODOPERA"), row("Scavo a macchina", "NOLI")];
        let matches = vec![vec![0], vec![0]];
        let err = check_stale(&rows, &matches, &rules).unwrap_err();
        assert!(matches!(err, ConsolidaError::StaleRewrite { row: 1, .. }));
        assert!(check_stale(&rows[..1], &matches[..1], &rules).is_ok());
    }

    #[test]
    fn match_matrix_lists_rule_indices_per_row() {
        let matchers: Vec<RuleMatcher> = [
            RewriteRule::new("ferro", "materiali", "", "acciaio"),
            RewriteRule::new("tondo", "materiali", "", "acciaio"),
        ]
        .iter()
        .map(RuleMatcher::new)
        .collect();
        let voci = vec!["tondo di ferro".to_string(), "cls".to_string()];
        let tipologie = vec!["materiali".to_string(), "materiali".to_string()];
        assert_eq!(match_rules(&voci, &tipologie, &matchers), vec![vec![0, 1], vec![]]);
    }
}
