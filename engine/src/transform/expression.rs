//! Free-form filter expressions.
//!
//! A tiny single-operator grammar:
//!
//! ```text
//! expression := operand op operand
//! op         := === | !== | == | != | >= | <= | > | <
//! operand    := "text" | 'text' | number | true | false | null
//!             | row.column | row["column"] | column
//! ```
//!
//! `===`/`!==` compare without coercion (type and value), `==`/`!=` and the
//! ordering operators go through [`super::compare`]. A bare identifier that
//! names no column is read as text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

use super::compare;
use crate::error::{TransformError, TransformResult};
use crate::models::{CellValue, Row};

/// Longest first, so `===` is never read as `==` followed by `=`.
const OPERATORS: [&str; 8] = ["===", "!==", "==", "!=", ">=", "<=", ">", "<"];
static ROW_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^row\.([A-Za-z_][A-Za-z0-9_]*)$").expect("valid regex"));
static ROW_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^row\[\s*["'](.*)["']\s*\]$"#).expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Split at the first operator outside a quoted literal.
fn split_operator(source: &str) -> Option<(&str, &str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in source.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                let rest = &source[i..];
                if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                    return Some((&source[..i], *op, &rest[op.len()..]));
                }
            }
        }
    }
    None
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "===" => Operator::StrictEq,
            "!==" => Operator::StrictNe,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(CellValue),
    Column(String),
    /// Bare identifier: a column when the row has it, otherwise text.
    Name(String),
}

impl Operand {
    fn parse(token: &str) -> Option<Self> {
        let t = token.trim();
        if t.is_empty() {
            return None;
        }
        for quote in ['"', '\''] {
            if t.len() >= 2 && t.starts_with(quote) && t.ends_with(quote) {
                return Some(Operand::Literal(CellValue::String(t[1..t.len() - 1].to_string())));
            }
        }
        match t {
            "true" => return Some(Operand::Literal(CellValue::Bool(true))),
            "false" => return Some(Operand::Literal(CellValue::Bool(false))),
            "null" => return Some(Operand::Literal(CellValue::Null)),
            _ => {}
        }
        if let Ok(n) = t.parse::<f64>() {
            return Some(Operand::Literal(CellValue::number(n)));
        }
        if let Some(c) = ROW_DOT.captures(t).or_else(|| ROW_INDEX.captures(t)) {
            return Some(Operand::Column(c[1].to_string()));
        }
        if t.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Some(Operand::Name(t.to_string()));
        }
        None
    }

    fn resolve<'a>(&'a self, row: &'a Row) -> &'a CellValue {
        static NULL: CellValue = CellValue::Null;
        match self {
            Operand::Literal(v) => v,
            Operand::Column(c) => row.get(c).unwrap_or(&NULL),
            Operand::Name(n) => row.get(n).unwrap_or(&NULL),
        }
    }

    fn resolve_name(&self, row: &Row) -> CellValue {
        match self {
            Operand::Name(n) if !row.contains_key(n) => CellValue::String(n.clone()),
            other => other.resolve(row).clone(),
        }
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
}

impl Expression {
    pub fn parse(source: &str) -> TransformResult<Self> {
        let invalid = || TransformError::InvalidFilter(format!("malformed expression '{}'", source));
        let (left, operator, right) = split_operator(source).ok_or_else(invalid)?;
        let left = Operand::parse(left).ok_or_else(invalid)?;
        let operator = Operator::parse(operator).ok_or_else(invalid)?;
        let right = Operand::parse(right).ok_or_else(invalid)?;
        Ok(Self {
            left,
            operator,
            right,
        })
    }

    /// Evaluate against one row.
    pub fn evaluate(&self, row: &Row) -> bool {
        let left = self.left.resolve_name(row);
        let right = self.right.resolve_name(row);

        match self.operator {
            Operator::StrictEq => left == right,
            Operator::StrictNe => left != right,
            Operator::Eq => loose_eq(&left, &right),
            Operator::Ne => !loose_eq(&left, &right),
            Operator::Gt => compare::compare(&left, &right) == Some(Ordering::Greater),
            Operator::Lt => compare::compare(&left, &right) == Some(Ordering::Less),
            Operator::Ge => matches!(
                compare::compare(&left, &right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Le => matches!(
                compare::compare(&left, &right),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

/// `null == null` holds here, unlike column predicates.
fn loose_eq(left: &CellValue, right: &CellValue) -> bool {
    match (left.is_null(), right.is_null()) {
        (true, true) => true,
        (false, false) => compare::equals(left, right),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let mut r = Row::new();
        r.insert("name".into(), "John".into());
        r.insert("age".into(), 30.into());
        r.insert("first name".into(), "J".into());
        r.insert("score".into(), "12".into());
        r
    }

    fn eval(src: &str) -> bool {
        Expression::parse(src).unwrap().evaluate(&row())
    }

    #[test]
    fn test_operand_forms() {
        assert!(eval("row.age > 25"));
        assert!(eval("age >= 30"));
        assert!(eval(r#"row["first name"] == "J""#));
        assert!(eval("name == 'John'"));
        assert!(eval("row.missing == null"));
        assert!(eval("name != missing"));
    }

    #[test]
    fn test_strict_vs_loose() {
        assert!(eval("score == 12"));
        assert!(!eval("score === 12"));
        assert!(eval("score !== 12"));
        assert!(eval("age === 30"));
    }

    #[test]
    fn test_ordering_with_null_is_false() {
        assert!(!eval("row.missing > 1"));
        assert!(!eval("row.missing < 1"));
    }

    #[test]
    fn test_operator_inside_quotes() {
        let mut r = row();
        r.insert("x".into(), "a<b".into());
        r.insert("a>b".into(), 1.into());

        let expr = Expression::parse("'a<b' == row.x").unwrap();
        assert_eq!(expr.left, Operand::Literal(CellValue::from("a<b")));
        assert_eq!(expr.operator, Operator::Eq);
        assert!(expr.evaluate(&r));

        assert!(Expression::parse(r#"row["a>b"] == 1"#).unwrap().evaluate(&r));
        assert!(Expression::parse(r#"row.x === "a<b""#).unwrap().evaluate(&r));
        assert!(Expression::parse("'a == b' != row.missing").unwrap().evaluate(&r));
    }

    #[test]
    fn test_malformed() {
        assert!(Expression::parse("age").is_err());
        assert!(Expression::parse("age >").is_err());
        assert!(Expression::parse("a b c == 1").is_err());
    }
}
