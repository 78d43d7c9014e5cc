//! Search criteria
//!
//! A small boolean expression language over field identifiers. Stores
//! receive the typed expression; its `Display` form is the wire syntax:
//!
//! ```text
//! '400129200' = "X123" AND '7' != 1
//! '179' = $NULL$
//! ```

use std::fmt;

use crate::core_types::{Attributes, FieldId};

use super::record::Value;

/// Literal operand of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Real(f64),
    Null,
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<&Value> for Literal {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Literal::Null,
            Value::Integer(i) => Literal::Int(*i),
            Value::Real(r) => Literal::Real(*r),
            Value::Char(s) => Literal::Str(s.clone()),
            Value::Timestamp(t) => Literal::Int(t.timestamp()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Embedded quotes are doubled
            Literal::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Real(r) => write!(f, "{}", r),
            Literal::Null => f.write_str("$NULL$"),
        }
    }
}

/// Boolean search expression
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Eq(FieldId, Literal),
    Ne(FieldId, Literal),
    And(Box<Criteria>, Box<Criteria>),
    Or(Box<Criteria>, Box<Criteria>),
}

impl Criteria {
    pub fn eq(field: FieldId, literal: impl Into<Literal>) -> Self {
        Criteria::Eq(field, literal.into())
    }

    pub fn ne(field: FieldId, literal: impl Into<Literal>) -> Self {
        Criteria::Ne(field, literal.into())
    }

    pub fn is_null(field: FieldId) -> Self {
        Criteria::Eq(field, Literal::Null)
    }

    pub fn and(self, other: Criteria) -> Self {
        Criteria::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Criteria) -> Self {
        Criteria::Or(Box::new(self), Box::new(other))
    }

    /// Conjunction of all terms, `None` when there are none
    pub fn all_of(terms: impl IntoIterator<Item = Criteria>) -> Option<Self> {
        terms.into_iter().reduce(Criteria::and)
    }

    /// Disjunction of all terms, `None` when there are none
    pub fn any_of(terms: impl IntoIterator<Item = Criteria>) -> Option<Self> {
        terms.into_iter().reduce(Criteria::or)
    }

    /// Evaluate against an attribute bag. Absent fields compare as null.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Criteria::Eq(field, literal) => field_equals(attributes, *field, literal),
            Criteria::Ne(field, literal) => !field_equals(attributes, *field, literal),
            Criteria::And(l, r) => l.matches(attributes) && r.matches(attributes),
            Criteria::Or(l, r) => l.matches(attributes) || r.matches(attributes),
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, parent_is_and: bool) -> fmt::Result {
        let needs_parens = match self {
            Criteria::And(..) => !parent_is_and,
            Criteria::Or(..) => parent_is_and,
            _ => false,
        };
        if needs_parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn field_equals(attributes: &Attributes, field: FieldId, literal: &Literal) -> bool {
    match attributes.get(&field) {
        None | Some(Value::Null) => matches!(literal, Literal::Null),
        Some(value) => value.matches_literal(literal),
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Eq(field, literal) => write!(f, "'{}' = {}", field, literal),
            Criteria::Ne(field, literal) => write!(f, "'{}' != {}", field, literal),
            Criteria::And(l, r) => {
                l.write_operand(f, true)?;
                f.write_str(" AND ")?;
                r.write_operand(f, true)
            }
            Criteria::Or(l, r) => {
                l.write_operand(f, false)?;
                f.write_str(" OR ")?;
                r.write_operand(f, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(FieldId, Value)]) -> Attributes {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_display_wire_syntax() {
        let c = Criteria::eq(400129200, "X123").and(Criteria::ne(7, 1i64));
        assert_eq!(c.to_string(), "'400129200' = \"X123\" AND '7' != 1");
        assert_eq!(Criteria::is_null(179).to_string(), "'179' = $NULL$");
    }

    #[test]
    fn test_display_nested_or_is_parenthesized() {
        let c = Criteria::eq(1, "a")
            .or(Criteria::eq(2, "b"))
            .and(Criteria::eq(3, 4i64));
        assert_eq!(c.to_string(), "('1' = \"a\" OR '2' = \"b\") AND '3' = 4");
    }

    #[test]
    fn test_display_escapes_quotes() {
        let c = Criteria::eq(8, "say \"hi\"");
        assert_eq!(c.to_string(), "'8' = \"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_matches() {
        let a = attrs(&[(179, Value::from("CI-1")), (7, Value::Integer(1))]);
        assert!(Criteria::eq(179, "CI-1").matches(&a));
        assert!(!Criteria::eq(179, "CI-2").matches(&a));
        assert!(Criteria::ne(7, 0i64).matches(&a));
        assert!(Criteria::is_null(400129200).matches(&a));
        assert!(!Criteria::is_null(179).matches(&a));
        assert!(
            Criteria::eq(179, "nope")
                .or(Criteria::eq(7, 1i64))
                .matches(&a)
        );
    }

    #[test]
    fn test_all_of_empty() {
        assert!(Criteria::all_of(Vec::new()).is_none());
        let c = Criteria::all_of(vec![Criteria::eq(1, "a"), Criteria::eq(2, "b")]).unwrap();
        assert_eq!(c.to_string(), "'1' = \"a\" AND '2' = \"b\"");
    }
}
