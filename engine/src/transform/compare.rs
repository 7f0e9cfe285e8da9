//! Coercing comparisons shared by column filters and expressions.
//!
//! Both operands are tried as numbers first, then as dates, and the
//! comparison falls back to plain text. The first coercion that succeeds on
//! both sides decides. Null never compares.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;

use crate::models::CellValue;

/// Accepted date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Numeric reading of a cell. Booleans count as 1/0, text must parse fully.
pub fn coerce_number(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => n.as_f64(),
        CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        CellValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Date reading of a cell.
pub fn coerce_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::String(s) => parse_date(s),
        _ => None,
    }
}

/// Parse the date layouts the engine understands, RFC 3339 included.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Order two cells, or `None` when either is null.
pub fn compare(left: &CellValue, right: &CellValue) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    if let (Some(a), Some(b)) = (coerce_number(left), coerce_number(right)) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (coerce_date(left), coerce_date(right)) {
        return Some(a.cmp(&b));
    }
    let a = left.to_text()?;
    let b = right.to_text()?;
    Some(a.cmp(&b))
}

/// Coercing equality; null equals nothing.
pub fn equals(left: &CellValue, right: &CellValue) -> bool {
    compare(left, right) == Some(Ordering::Equal)
}

/// Case-insensitive substring test on the text forms.
pub fn contains(haystack: &CellValue, needle: &CellValue) -> bool {
    match (haystack.to_text(), needle.to_text()) {
        (Some(h), Some(n)) => h.to_lowercase().contains(&n.to_lowercase()),
        _ => false,
    }
}

/// Inclusive range test.
pub fn between(value: &CellValue, low: &CellValue, high: &CellValue) -> bool {
    matches!(compare(value, low), Some(Ordering::Greater | Ordering::Equal))
        && matches!(compare(value, high), Some(Ordering::Less | Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_wins_over_text() {
        // "9" < "10" numerically, but not lexicographically
        assert_eq!(compare(&"9".into(), &"10".into()), Some(Ordering::Less));
        assert_eq!(compare(&CellValue::from(30), &"25".into()), Some(Ordering::Greater));
        assert!(equals(&CellValue::from(2.0), &"2".into()));
    }

    #[test]
    fn test_dates_compare_across_layouts() {
        let a = CellValue::from("2024-03-15");
        let b = CellValue::from("16/03/2024");
        assert_eq!(compare(&a, &b), Some(Ordering::Less));
        assert!(parse_date("2024-03-15T10:00:00Z").is_some());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_text_fallback() {
        assert_eq!(compare(&"apple".into(), &"banana".into()), Some(Ordering::Less));
        assert!(contains(&"Hello World".into(), &"world".into()));
    }

    #[test]
    fn test_null_never_matches() {
        assert_eq!(compare(&CellValue::Null, &CellValue::Null), None);
        assert!(!equals(&CellValue::Null, &"".into()));
        assert!(!contains(&CellValue::Null, &"x".into()));
        assert!(!between(&CellValue::Null, &1.into(), &2.into()));
    }

    #[test]
    fn test_between_inclusive() {
        assert!(between(&10.into(), &10.into(), &20.into()));
        assert!(between(&20.into(), &10.into(), &20.into()));
        assert!(!between(&21.into(), &10.into(), &20.into()));
    }
}
