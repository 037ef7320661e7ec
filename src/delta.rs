//! Cost deltas of the tabellone between two months.

use chrono::{Datelike, Local, NaiveDate};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ConsolidaError, Result};
use crate::types::{ConsolidatedRecord, DeltaRow};

/// Months before this one are outside the data set.
pub const FIRST_MONTH: (i32, u32) = (2021, 1);

/// Parse a `MM.YYYY` month into its first day.
pub fn parse_month(s: &str) -> Result<NaiveDate> {
    let err = || ConsolidaError::Interval(format!("'{}' non è nel formato MM.AAAA", s));
    let (month, year) = s.trim().split_once('.').ok_or_else(err)?;
    let month: u32 = month.trim().parse().map_err(|_| err())?;
    let year: i32 = year.trim().parse().map_err(|_| err())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(err)
}

/// Parse a `YYYY-MM` label, as stored in the `data` column.
pub fn parse_data_label(s: &str) -> Option<NaiveDate> {
    let (year, month) = s.split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// A validated (start, end) month pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    /// Both months must fall between January 2021 and `today`, and start
    /// must come before end.
    pub fn new(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(ConsolidaError::Interval(
                "La data di inizio deve essere precedente a quella di fine.".to_string(),
            ));
        }
        let first = NaiveDate::from_ymd_opt(FIRST_MONTH.0, FIRST_MONTH.1, 1)
            .ok_or_else(|| ConsolidaError::Interval("invalid first month".to_string()))?;
        for (name, date) in [("inizio", start), ("fine", end)] {
            if date < first || date > today {
                return Err(ConsolidaError::Interval(format!(
                    "La data di {} deve essere compresa tra {:02}.{} e ora",
                    name, FIRST_MONTH.1, FIRST_MONTH.0
                )));
            }
        }
        Ok(DateInterval { start, end })
    }

    /// Parse from two `MM.YYYY` strings, validating against the current date.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        DateInterval::new(parse_month(start)?, parse_month(end)?, Local::now().date_naive())
    }

    /// Parse `MM.YYYY-MM.YYYY`.
    pub fn parse_pair(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ConsolidaError::Interval(format!("'{}' non è nel formato MM.AAAA-MM.AAAA", s)))?;
        DateInterval::parse(start, end)
    }

    /// Label used in export folder and file names.
    pub fn label(&self) -> String {
        format!(
            "da{}-{:02}-a-{}-{:02}",
            self.start.year(),
            self.start.month(),
            self.end.year(),
            self.end.month()
        )
    }
}

type DeltaKey = (String, i64, String);

/// Summed snapshot line: quantities and amounts summed, the rest from the
/// first row of the group.
#[derive(Debug, Clone)]
struct SnapshotLine<'a> {
    first: &'a ConsolidatedRecord,
    quantita: f64,
    imp_comp: f64,
}

/// Sum rows sharing (commessa, codice, fase).
fn sum_repetitive_rows<'a>(rows: &[&'a ConsolidatedRecord]) -> BTreeMap<DeltaKey, SnapshotLine<'a>> {
    let mut out: BTreeMap<DeltaKey, SnapshotLine<'a>> = BTreeMap::new();
    for r in rows {
        let key = (r.commessa.clone(), r.codice, r.fase.clone().unwrap_or_default());
        let e = out.entry(key).or_insert_with(|| SnapshotLine {
            first: *r,
            quantita: 0.0,
            imp_comp: 0.0,
        });
        e.quantita += r.quantita;
        e.imp_comp += r.imp_comp.unwrap_or(0.0);
    }
    out
}

/// Cost delta per (commessa, codice, fase) between the two ends of
/// `interval`.
///
/// Each site contributes its latest month within the interval as the end
/// snapshot. Its earliest month counts as the start snapshot only when it
/// is the interval start; otherwise the site starts from zero.
pub fn get_tabellone_delta(records: &[ConsolidatedRecord], interval: &DateInterval) -> Vec<DeltaRow> {
    let dated: Vec<(NaiveDate, &ConsolidatedRecord)> = records
        .iter()
        .filter_map(|r| parse_data_label(&r.data).map(|d| (d, r)))
        .filter(|(d, _)| *d >= interval.start && *d <= interval.end)
        .collect();

    let mut bounds: HashMap<&str, (NaiveDate, NaiveDate)> = HashMap::new();
    for (d, r) in &dated {
        let e = bounds.entry(r.commessa.as_str()).or_insert((*d, *d));
        e.0 = e.0.min(*d);
        e.1 = e.1.max(*d);
    }

    let start_rows: Vec<&ConsolidatedRecord> = dated
        .iter()
        .filter(|(d, r)| *d == bounds[r.commessa.as_str()].0 && *d == interval.start)
        .map(|(_, r)| *r)
        .collect();
    let end_rows: Vec<&ConsolidatedRecord> = dated
        .iter()
        .filter(|(d, r)| *d == bounds[r.commessa.as_str()].1)
        .map(|(_, r)| *r)
        .collect();

    let start = sum_repetitive_rows(&start_rows);
    let end = sum_repetitive_rows(&end_rows);

    let mut keys: Vec<&DeltaKey> = start.keys().chain(end.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let da = start.get(key);
            let a = end.get(key);
            let info = a.or(da)?.first;
            let da_q = da.map(|l| l.quantita);
            let a_q = a.map(|l| l.quantita);
            let da_imp = da.map(|l| l.imp_comp);
            let a_imp = a.map(|l| l.imp_comp);
            Some(DeltaRow {
                commessa: key.0.clone(),
                codice: key.1,
                fase: key.2.clone(),
                tipologia: info.tipologia.clone(),
                voce: info.voce.clone(),
                um: info.um.clone(),
                costo_u: info.costo_u,
                da_data: da.map(|l| l.first.data.clone()),
                da_quantita: da_q,
                da_imp_comp: da_imp,
                a_data: a.map(|l| l.first.data.clone()),
                a_quantita: a_q,
                a_imp_comp: a_imp,
                delta_quantita: a_q.unwrap_or(0.0) - da_q.unwrap_or(0.0),
                delta_imp_comp: a_imp.unwrap_or(0.0) - da_imp.unwrap_or(0.0),
                da_file_hash: da.map(|l| l.first.file_hash.clone()),
                a_file_hash: a.map(|l| l.first.file_hash.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn rec(commessa: &str, data: &str, codice: i64, fase: &str, voce: &str, q: f64, imp: f64) -> ConsolidatedRecord {
        let d = parse_data_label(data).unwrap();
        ConsolidatedRecord {
            commessa: commessa.to_string(),
            fase: Some(fase.to_string()),
            anno: d.year(),
            mese: d.month(),
            data: data.to_string(),
            mesi_da_inizio: 0,
            codice,
            tipologia: "MANODOPERA".to_string(),
            voce: voce.to_string(),
            costo_u: Some(10.0),
            um: "mc".to_string(),
            quantita: q,
            imp_unit: None,
            imp_comp: Some(imp),
            file_hash: format!("h{}", data),
        }
    }

    fn interval() -> DateInterval {
        DateInterval::new(date(2023, 12), date(2024, 2), date(2024, 6)).unwrap()
    }

    #[test]
    fn validates_intervals() {
        let today = date(2024, 6);
        assert!(DateInterval::new(date(2024, 2), date(2023, 12), today).is_err());
        assert!(DateInterval::new(date(2023, 12), date(2023, 12), today).is_err());
        assert!(DateInterval::new(date(2020, 12), date(2023, 12), today).is_err());
        assert!(DateInterval::new(date(2023, 12), date(2024, 7), today).is_err());
        assert_eq!(parse_month("03.2024").unwrap(), date(2024, 3));
        assert!(parse_month("2024-03").is_err());
        assert!(parse_month("13.2024").is_err());
        assert_eq!(interval().label(), "da2023-12-a-2024-02");
    }

    #[test]
    fn delta_between_first_and_last_month() {
        let records = vec![
            rec("1434", "2023-11", 101, "F1", "Scavo", 1.0, 10.0),
            rec("1434", "2023-12", 101, "F1", "Scavo", 5.0, 50.0),
            rec("1434", "2023-12", 101, "F1", "Scavo", 1.0, 10.0),
            rec("1434", "2023-12", 102, "F1", "Getto", 2.0, 20.0),
            rec("1434", "2024-01", 101, "F1", "Scavo", 7.0, 70.0),
            rec("1434", "2024-02", 101, "F1", "Scavo", 8.0, 80.0),
            rec("1434", "2024-02", 103, "F2", "Ferro", 3.0, 30.0),
            rec("1434", "2024-03", 101, "F1", "Scavo", 100.0, 1000.0),
        ];
        let delta = get_tabellone_delta(&records, &interval());
        assert_eq!(delta.len(), 3);

        let scavo = &delta[0];
        assert_eq!((scavo.codice, scavo.fase.as_str()), (101, "F1"));
        assert_eq!(scavo.da_data.as_deref(), Some("2023-12"));
        assert_eq!(scavo.da_quantita, Some(6.0));
        assert_eq!(scavo.a_quantita, Some(8.0));
        assert_eq!(scavo.delta_quantita, 2.0);
        assert_eq!(scavo.delta_imp_comp, 20.0);
        assert_eq!(scavo.a_file_hash.as_deref(), Some("h2024-02"));

        let getto = &delta[1];
        assert_eq!(getto.codice, 102);
        assert_eq!(getto.a_data, None);
        assert_eq!(getto.voce, "Getto");
        assert_eq!(getto.delta_imp_comp, -20.0);

        let ferro = &delta[2];
        assert_eq!(ferro.da_data, None);
        assert_eq!(ferro.delta_quantita, 3.0);
    }

    #[test]
    fn site_starting_after_interval_start_counts_from_zero() {
        let records = vec![
            rec("2001", "2024-01", 5, "F1", "Scavo", 4.0, 40.0),
            rec("2001", "2024-02", 5, "F1", "Scavo", 6.0, 60.0),
        ];
        let delta = get_tabellone_delta(&records, &interval());
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].da_quantita, None);
        assert_eq!(delta[0].delta_quantita, 6.0);
        assert_eq!(delta[0].delta_imp_comp, 60.0);
    }
}
