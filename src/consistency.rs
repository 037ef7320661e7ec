//! Forces one description ("voce") per cost code.
//!
//! The first description met in row order wins. Codes that carried more
//! than one description are reported.

use std::collections::HashMap;

use crate::types::{ConsistencyReportEntry, CostRow};

/// Returns the corrected rows and one report entry per conflicting code,
/// ordered by first appearance of the code.
pub fn fix_voice_consistency(rows: Vec<CostRow>) -> (Vec<CostRow>, Vec<ConsistencyReportEntry>) {
    let mut order: Vec<i64> = Vec::new();
    let mut seen: HashMap<i64, Vec<String>> = HashMap::new();
    for r in &rows {
        let voci = seen.entry(r.codice).or_insert_with(|| {
            order.push(r.codice);
            Vec::new()
        });
        if !voci.contains(&r.voce) {
            voci.push(r.voce.clone());
        }
    }

    let report: Vec<ConsistencyReportEntry> = order
        .iter()
        .filter_map(|codice| {
            let voci = &seen[codice];
            (voci.len() > 1).then(|| ConsistencyReportEntry {
                codice: *codice,
                voci: voci.clone(),
            })
        })
        .collect();

    let fixed = rows
        .into_iter()
        .map(|mut r| {
            if let Some(first) = seen.get(&r.codice).and_then(|v| v.first()) {
                if *first != r.voce {
                    r.voce = first.clone();
                }
            }
            r
        })
        .collect();

    (fixed, report)
}
