// Utility helpers for parsing and formatting.
//
// This module centralizes the "dirty" cell handling (locale numbers, cost
// codes with stray suffixes, month arithmetic) so the rest of the code can
// assume clean, typed values.
use chrono::{Datelike, NaiveDate};
use num_format::{Locale, ToFormattedString};

use crate::types::CellValue;

/// Parse a locale-formatted number such as `"1 234,50"`.
///
/// - Trims whitespace.
/// - Removes spaces (including non-breaking ones) used as thousands separators.
/// - Treats `","` as the decimal separator.
/// - Returns `None` for anything that cannot be parsed.
pub fn parse_locale_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Parse a cost code written as text: the whole string, or the string minus
/// one trailing character (codes sometimes carry a letter suffix).
pub fn parse_codice_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let mut chars = s.chars();
    chars.next_back()?;
    chars.as_str().trim().parse::<i64>().ok()
}

/// Cost code held by a cell, if any. Numbers must be integral.
pub fn codice_from_cell(cell: &CellValue) -> Option<i64> {
    match cell {
        CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        CellValue::Text(s) => parse_codice_str(s),
        _ => None,
    }
}

/// Numeric value of a cell. `Ok(None)` for blanks, `Err(())` when the cell
/// holds text that is not a number.
pub fn number_from_cell(cell: &CellValue) -> Result<Option<f64>, ()> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Number(n) if n.is_nan() => Ok(None),
        CellValue::Number(n) => Ok(Some(*n)),
        CellValue::Text(s) if s.trim().is_empty() => Ok(None),
        CellValue::Text(s) => parse_locale_f64(s).map(Some).ok_or(()),
    }
}

/// Calendar-month difference `later - earlier`, ignoring days.
pub fn months_between(later: NaiveDate, earlier: NaiveDate) -> i32 {
    (later.year() - earlier.year()) * 12 + later.month() as i32 - earlier.month() as i32
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Used for counts in console messages (e.g., `9,855 righe`).
    n.to_formatted_string(&Locale::en)
}

pub fn display_f64(v: &f64) -> String {
    format_number(*v, 2)
}

pub fn display_opt(v: &Option<f64>) -> String {
    v.map(|n| format_number(n, 2)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_numbers() {
        assert_eq!(parse_locale_f64("1 234,50"), Some(1234.5));
        assert_eq!(parse_locale_f64("1\u{a0}000"), Some(1000.0));
        assert_eq!(parse_locale_f64("  12 "), Some(12.0));
        assert_eq!(parse_locale_f64("abc"), None);
        assert_eq!(parse_locale_f64(""), None);
    }

    #[test]
    fn parses_codes_with_suffix() {
        assert_eq!(parse_codice_str("101"), Some(101));
        assert_eq!(parse_codice_str("101a"), Some(101));
        assert_eq!(parse_codice_str("101ab"), None);
        assert_eq!(parse_codice_str("Totale costi"), None);
        assert_eq!(parse_codice_str(""), None);
        assert_eq!(codice_from_cell(&CellValue::Number(7.0)), Some(7));
        assert_eq!(codice_from_cell(&CellValue::Number(7.5)), None);
        assert_eq!(codice_from_cell(&CellValue::Empty), None);
    }

    #[test]
    fn number_cells() {
        assert_eq!(number_from_cell(&CellValue::Empty), Ok(None));
        assert_eq!(number_from_cell(&CellValue::text("2,5")), Ok(Some(2.5)));
        assert_eq!(number_from_cell(&CellValue::text("n.d.")), Err(()));
    }

    #[test]
    fn months_use_calendar_arithmetic() {
        let a = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(months_between(b, a), 2);
        assert_eq!(months_between(a, a), 0);
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-5.0, 1), "-5.0");
        assert_eq!(format_int(9855), "9,855");
    }
}
