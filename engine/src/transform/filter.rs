//! Row filtering.
//!
//! A row is kept only when it passes every active layer of the
//! [`FilterCriteria`]: all column predicates, the date range and all
//! free-form expressions. Order is preserved and columns never change.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::compare::{self, parse_date};
use super::expression::Expression;
use crate::api::logs::log_warning;
use crate::error::{TransformError, TransformResult};
use crate::models::{CellValue, RecordSet, Row};

// =============================================================================
// Criteria
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    /// Inclusive on both ends; the value is a two-item list.
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: CellValue,
}

/// Inclusive date window. A bound without a time of day covers that whole day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub column: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    pub column_filters: Vec<ColumnFilter>,
    pub date_range: Option<DateRange>,
    pub custom_conditions: Vec<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.column_filters.is_empty()
            && self.date_range.is_none()
            && self.custom_conditions.is_empty()
    }
}

/// What to do with an expression that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpressionPolicy {
    /// Treat it as always true, with a logged warning.
    #[default]
    FailOpen,
    /// Reject the whole filter.
    Strict,
}

// =============================================================================
// Compiled form
// =============================================================================

enum Predicate<'a> {
    Column {
        column: &'a str,
        operator: FilterOperator,
        value: &'a CellValue,
        upper: Option<&'a CellValue>,
    },
    Dates {
        column: &'a str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    Expression(Expression),
}

impl Predicate<'_> {
    fn matches(&self, row: &Row) -> bool {
        static NULL: CellValue = CellValue::Null;
        match self {
            Predicate::Column {
                column,
                operator,
                value,
                upper,
            } => {
                let cell = row.get(*column).unwrap_or(&NULL);
                match operator {
                    FilterOperator::Equals => compare::equals(cell, value),
                    FilterOperator::Contains => compare::contains(cell, value),
                    FilterOperator::GreaterThan => {
                        compare::compare(cell, value) == Some(std::cmp::Ordering::Greater)
                    }
                    FilterOperator::LessThan => {
                        compare::compare(cell, value) == Some(std::cmp::Ordering::Less)
                    }
                    FilterOperator::Between => {
                        upper.is_some_and(|high| compare::between(cell, value, high))
                    }
                }
            }
            Predicate::Dates { column, start, end } => {
                let Some(date) = row.get(*column).and_then(compare::coerce_date) else {
                    return false;
                };
                start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
            }
            Predicate::Expression(expr) => expr.evaluate(row),
        }
    }
}

fn parse_bound(text: &str, end_of_day: bool) -> TransformResult<NaiveDateTime> {
    let parsed = parse_date(text).ok_or_else(|| {
        TransformError::InvalidFilter(format!("'{}' is not a recognised date", text))
    })?;
    let has_time = text.contains('T') || text.contains(':');
    if end_of_day && !has_time {
        // Last second of the day; stays in range on chrono's final date
        return Ok(parsed.date().and_hms_opt(23, 59, 59).unwrap_or(parsed));
    }
    Ok(parsed)
}

fn compile(criteria: &FilterCriteria, policy: ExpressionPolicy) -> TransformResult<Vec<Predicate<'_>>> {
    let mut predicates = Vec::new();

    for f in &criteria.column_filters {
        let (value, upper) = match (f.operator, &f.value) {
            (FilterOperator::Between, CellValue::List(bounds)) if bounds.len() == 2 => {
                (&bounds[0], Some(&bounds[1]))
            }
            (FilterOperator::Between, _) => {
                return Err(TransformError::InvalidFilter(format!(
                    "'between' on '{}' needs exactly two bounds",
                    f.column
                )))
            }
            (_, value) => (value, None),
        };
        predicates.push(Predicate::Column {
            column: &f.column,
            operator: f.operator,
            value,
            upper,
        });
    }

    if let Some(range) = &criteria.date_range {
        let start = range.start.as_deref().map(|s| parse_bound(s, false)).transpose()?;
        let end = range.end.as_deref().map(|s| parse_bound(s, true)).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(TransformError::InvalidFilter(format!(
                    "date range on '{}' starts after it ends",
                    range.column
                )));
            }
        }
        predicates.push(Predicate::Dates {
            column: &range.column,
            start,
            end,
        });
    }

    for source in &criteria.custom_conditions {
        match Expression::parse(source) {
            Ok(expr) => predicates.push(Predicate::Expression(expr)),
            Err(e) if policy == ExpressionPolicy::Strict => return Err(e),
            Err(e) => log_warning(format!("{}; condition ignored", e)),
        }
    }

    Ok(predicates)
}

// =============================================================================
// Entry points
// =============================================================================

/// Keep the rows matching `criteria`. Malformed expressions fail open.
pub fn filter(set: &RecordSet, criteria: &FilterCriteria) -> TransformResult<RecordSet> {
    filter_with(set, criteria, ExpressionPolicy::FailOpen)
}

/// [`filter`] with an explicit policy for malformed expressions.
pub fn filter_with(
    set: &RecordSet,
    criteria: &FilterCriteria,
    policy: ExpressionPolicy,
) -> TransformResult<RecordSet> {
    let predicates = compile(criteria, policy)?;

    let rows: Vec<Row> = set
        .rows
        .iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .cloned()
        .collect();

    let mut out = RecordSet {
        rows,
        headers: set.headers.clone(),
        metadata: set.metadata.clone(),
    };
    out.refresh_counts();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Format;
    use serde_json::json;

    fn people() -> RecordSet {
        let rows: Vec<Row> = serde_json::from_value(json!([
            {"name": "John", "age": 30, "email": "john@x.com", "joined": "2024-01-15"},
            {"name": "Jane", "age": 25, "email": "jane@x.com", "joined": "2024-03-02T09:30:00"},
            {"name": "Bob", "email": "bob@y.org", "joined": "not yet"}
        ]))
        .unwrap();
        RecordSet::from_rows(rows, Format::Json)
    }

    fn criteria(value: serde_json::Value) -> FilterCriteria {
        serde_json::from_value(value).unwrap()
    }

    fn names(set: &RecordSet) -> Vec<String> {
        set.rows.iter().map(|r| r["name"].to_string()).collect()
    }

    #[test]
    fn test_greater_than() {
        let c = criteria(json!({"columnFilters": [
            {"column": "age", "operator": "greaterThan", "value": 25}
        ]}));
        let out = filter(&people(), &c).unwrap();
        assert_eq!(names(&out), vec!["John"]);
        assert_eq!(out.metadata.total_rows, 1);
    }

    #[test]
    fn test_between_is_inclusive() {
        let c = criteria(json!({"columnFilters": [
            {"column": "age", "operator": "between", "value": [25, 30]}
        ]}));
        assert_eq!(names(&filter(&people(), &c).unwrap()), vec!["John", "Jane"]);

        let bad = criteria(json!({"columnFilters": [
            {"column": "age", "operator": "between", "value": [25]}
        ]}));
        assert!(matches!(filter(&people(), &bad), Err(TransformError::InvalidFilter(_))));
    }

    #[test]
    fn test_missing_value_never_matches() {
        let c = criteria(json!({"columnFilters": [
            {"column": "age", "operator": "lessThan", "value": 100}
        ]}));
        assert_eq!(names(&filter(&people(), &c).unwrap()), vec!["John", "Jane"]);
    }

    #[test]
    fn test_contains_and_date_range() {
        let c = criteria(json!({
            "columnFilters": [{"column": "email", "operator": "contains", "value": "X.COM"}],
            "dateRange": {"column": "joined", "start": "2024-03-01", "end": "2024-03-02"}
        }));
        assert_eq!(names(&filter(&people(), &c).unwrap()), vec!["Jane"]);

        let bad = criteria(json!({"dateRange": {"column": "joined", "start": "soon"}}));
        assert!(filter(&people(), &bad).is_err());
    }

    #[test]
    fn test_end_bound_on_last_representable_day() {
        let c = criteria(json!({
            "dateRange": {"column": "joined", "start": "2024-03-01", "end": "+262142-12-31"}
        }));
        assert_eq!(names(&filter(&people(), &c).unwrap()), vec!["Jane"]);

        let bound = parse_bound("+262142-12-31", true).unwrap();
        assert_eq!(bound.date(), parse_date("+262142-12-31").unwrap().date());
        assert_eq!(bound.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[test]
    fn test_custom_conditions() {
        let c = criteria(json!({"customConditions": ["row.age >= 30", "name !== 'Bob'"]}));
        assert_eq!(names(&filter(&people(), &c).unwrap()), vec!["John"]);
    }

    #[test]
    fn test_malformed_expression_policy() {
        let c = criteria(json!({"customConditions": ["age >"]}));
        assert_eq!(filter(&people(), &c).unwrap().len(), 3);
        assert!(filter_with(&people(), &c, ExpressionPolicy::Strict).is_err());
    }

    #[test]
    fn test_filter_never_grows_and_keeps_columns() {
        let set = people();
        let out = filter(&set, &FilterCriteria::default()).unwrap();
        assert_eq!(out, set);
        assert!(FilterCriteria::default().is_empty());
    }
}
