//! Best-effort per-column statistics.
//!
//! Used by `tabconv inspect`. Nothing here is enforced; a column whose
//! values disagree on type simply reports the most frequent one.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::{CellValue, RecordSet};

/// Summary of one column.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStats {
    pub name: String,
    /// Rows with a non-null value.
    pub present: usize,
    /// Rows where the value is null or the key is absent.
    pub nulls: usize,
    pub distinct: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Most frequent non-null type, `"null"` for an all-null column.
    pub dominant_type: String,
}

/// Compute statistics for every effective column of `set`.
pub fn column_stats(set: &RecordSet) -> Vec<ColumnStats> {
    set.columns()
        .into_iter()
        .map(|name| stats_for(set, name))
        .collect()
}

fn stats_for(set: &RecordSet, name: String) -> ColumnStats {
    let mut present = 0;
    let mut nulls = 0;
    let mut distinct = HashSet::new();
    let mut types: HashMap<&'static str, usize> = HashMap::new();
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for row in &set.rows {
        match row.get(&name) {
            None | Some(CellValue::Null) => nulls += 1,
            Some(value) => {
                present += 1;
                distinct.insert(value.to_string());
                *types.entry(value.type_name()).or_default() += 1;
                if let Some(n) = value.as_f64() {
                    min = Some(min.map_or(n, |m| m.min(n)));
                    max = Some(max.map_or(n, |m| m.max(n)));
                }
            }
        }
    }

    // Ties resolve alphabetically so the output is stable
    let dominant_type = types
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(t, _)| t)
        .unwrap_or("null")
        .to_string();

    ColumnStats {
        name,
        present,
        nulls,
        distinct: distinct.len(),
        min,
        max,
        dominant_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Format, Row};

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_absent_keys_count_as_null() {
        let set = RecordSet::from_rows(
            vec![
                row(&[("age", 30.into()), ("name", "John".into())]),
                row(&[("name", "Jane".into())]),
                row(&[("age", 25.into()), ("name", CellValue::Null)]),
            ],
            Format::Json,
        );
        let stats = column_stats(&set);
        let age = stats.iter().find(|s| s.name == "age").unwrap();
        assert_eq!(age.present, 2);
        assert_eq!(age.nulls, 1);
        assert_eq!(age.min, Some(25.0));
        assert_eq!(age.max, Some(30.0));
        assert_eq!(age.dominant_type, "number");

        let name = stats.iter().find(|s| s.name == "name").unwrap();
        assert_eq!(name.nulls, 1);
        assert_eq!(name.distinct, 2);
        assert_eq!(name.dominant_type, "string");
    }

    #[test]
    fn test_all_null_column() {
        let set = RecordSet::new(vec![row(&[])], Some(vec!["x".into()]), Format::Csv);
        let stats = column_stats(&set);
        assert_eq!(stats[0].dominant_type, "null");
        assert_eq!(stats[0].min, None);
    }
}
