// src/datatypes/values.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Absolute difference below which two numbers are considered equal.
/// Absorbs floating round-off introduced by repeated aggregation.
pub const NUMERIC_TOLERANCE: f64 = 1e-4;

/// Dynamic property value. Closed union: every comparison rule lives in an
/// exhaustive match rather than runtime type checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value: native numerics plus parseable numeric
    /// strings. Booleans and dates are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Calendar date of the value, parsing strings when necessary.
    /// Time-of-day is discarded; date comparisons ignore it.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::DateTime(dt) => Some(dt.date()),
            Value::String(s) => parse_date_string(s),
            _ => None,
        }
    }

    /// "Empty" in the sense used by `exists`-style subquery checks:
    /// null, empty string, numeric zero, or an empty list.
    pub fn is_empty_like(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Int64(i) => *i == 0,
            Value::Float64(f) => f.abs() <= NUMERIC_TOLERANCE,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Null => write!(f, "null"),
        }
    }
}

/// Type-aware equality: numeric pairs coerce to f64 and compare within
/// tolerance, strings compare case-insensitively, dates compare by calendar
/// date only, lists compare element-wise. Mismatched types fall back to a
/// case-insensitive comparison of their canonical string forms.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::String(x), Value::String(y)) => {
            if x.eq_ignore_ascii_case(y) {
                return true;
            }
            // "5" and "5.0" name the same number.
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= NUMERIC_TOLERANCE,
                _ => false,
            }
        }
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::DateTime(_), _) | (_, Value::DateTime(_)) => match (a.as_date(), b.as_date()) {
            (Some(da), Some(db)) => da == db,
            _ => fallback_string_equal(a, b),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= NUMERIC_TOLERANCE,
            _ => fallback_string_equal(a, b),
        },
    }
}

/// Type-aware ordering with the same coercion rules as `values_equal`.
/// Returns `None` only when neither the typed rules nor the string fallback
/// produce a meaningful ordering (lists, in practice).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::List(_), _) | (_, Value::List(_)) => None,
        (Value::DateTime(_), _) | (_, Value::DateTime(_)) => {
            let (da, db) = (a.as_date()?, b.as_date()?);
            Some(da.cmp(&db))
        }
        (Value::String(x), Value::String(y)) => match (a.as_f64(), b.as_f64()) {
            (Some(nx), Some(ny)) => Some(numeric_ordering(nx, ny)),
            _ => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Some(numeric_ordering(x, y)),
            _ => Some(
                a.to_string()
                    .to_lowercase()
                    .cmp(&b.to_string().to_lowercase()),
            ),
        },
    }
}

fn numeric_ordering(x: f64, y: f64) -> Ordering {
    if (x - y).abs() <= NUMERIC_TOLERANCE {
        Ordering::Equal
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

fn fallback_string_equal(a: &Value, b: &Value) -> bool {
    a.to_string().eq_ignore_ascii_case(&b.to_string())
}

/// Parse a date string in common formats (ISO YYYY-MM-DD preferred),
/// accepting an optional time-of-day component.
pub fn parse_date_string(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::DateTime(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    // ========================================================================
    // values_equal: numeric tolerance and coercion
    // ========================================================================

    #[test]
    fn test_equal_within_tolerance() {
        assert!(values_equal(&Value::Float64(3.00005), &Value::Float64(3.0)));
        assert!(!values_equal(&Value::Float64(3.1), &Value::Float64(3.0)));
    }

    #[test]
    fn test_equal_cross_type_numeric() {
        assert!(values_equal(&Value::Int64(5), &Value::Float64(5.0)));
        assert!(values_equal(&Value::Float64(5.0), &Value::Int64(5)));
        assert!(!values_equal(&Value::Int64(5), &Value::Float64(5.1)));
    }

    #[test]
    fn test_equal_numeric_string() {
        assert!(values_equal(&Value::String("5".into()), &Value::Int64(5)));
        assert!(values_equal(&Value::Float64(2.5), &Value::String("2.5".into())));
        assert!(values_equal(&Value::String("5".into()), &Value::String("5.0".into())));
    }

    // ========================================================================
    // values_equal: strings, dates, lists
    // ========================================================================

    #[test]
    fn test_equal_strings_case_insensitive() {
        assert!(values_equal(
            &Value::String("Alice".into()),
            &Value::String("ALICE".into())
        ));
        assert!(!values_equal(
            &Value::String("Alice".into()),
            &Value::String("Bob".into())
        ));
    }

    #[test]
    fn test_equal_dates_ignore_time() {
        let morning = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 6, 15)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        );
        let evening = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 6, 15)
                .unwrap()
                .and_hms_opt(22, 0, 0)
                .unwrap(),
        );
        assert!(values_equal(&morning, &evening));
        assert!(!values_equal(&morning, &date(2024, 6, 16)));
    }

    #[test]
    fn test_equal_date_vs_string() {
        assert!(values_equal(&date(2024, 6, 15), &Value::String("2024-06-15".into())));
    }

    #[test]
    fn test_equal_lists_elementwise() {
        let a = Value::List(vec![Value::Int64(1), Value::String("x".into())]);
        let b = Value::List(vec![Value::Float64(1.0), Value::String("X".into())]);
        assert!(values_equal(&a, &b));
        let c = Value::List(vec![Value::Int64(1)]);
        assert!(!values_equal(&a, &c));
    }

    #[test]
    fn test_equal_null_rules() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &Value::Int64(0)));
        assert!(!values_equal(&Value::String(String::new()), &Value::Null));
    }

    // ========================================================================
    // compare_values
    // ========================================================================

    #[test]
    fn test_compare_numeric_ordering() {
        assert_eq!(
            compare_values(&Value::Int64(1), &Value::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::Float64(3.0), &Value::Int64(2)),
            Some(Ordering::Greater)
        );
        // Within tolerance counts as equal, not greater.
        assert_eq!(
            compare_values(&Value::Float64(2.00001), &Value::Int64(2)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_strings_case_insensitive() {
        assert_eq!(
            compare_values(&Value::String("apple".into()), &Value::String("BANANA".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::String("Same".into()), &Value::String("same".into())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_numeric_strings_numerically() {
        // "10" > "9" numerically even though it sorts lower lexically.
        assert_eq!(
            compare_values(&Value::String("10".into()), &Value::String("9".into())),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_compare_dates_by_calendar_date() {
        let d1 = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
        );
        assert_eq!(compare_values(&d1, &date(2024, 1, 1)), Some(Ordering::Equal));
        assert_eq!(
            compare_values(&d1, &Value::String("2024-02-01".into())),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_compare_null_ordering() {
        assert_eq!(compare_values(&Value::Null, &Value::Int64(0)), Some(Ordering::Less));
        assert_eq!(compare_values(&Value::Int64(0), &Value::Null), Some(Ordering::Greater));
        assert_eq!(compare_values(&Value::Null, &Value::Null), Some(Ordering::Equal));
    }

    #[test]
    fn test_compare_lists_have_no_ordering() {
        assert_eq!(compare_values(&Value::List(vec![]), &Value::Int64(1)), None);
    }

    // ========================================================================
    // coercion helpers
    // ========================================================================

    #[test]
    fn test_as_f64() {
        assert_eq!(Value::Int64(7).as_f64(), Some(7.0));
        assert_eq!(Value::String(" 3.5 ".into()).as_f64(), Some(3.5));
        assert_eq!(Value::String("abc".into()).as_f64(), None);
        assert_eq!(Value::Boolean(true).as_f64(), None);
    }

    #[test]
    fn test_is_empty_like() {
        assert!(Value::Null.is_empty_like());
        assert!(Value::String(String::new()).is_empty_like());
        assert!(Value::Int64(0).is_empty_like());
        assert!(Value::Float64(0.0).is_empty_like());
        assert!(Value::List(vec![]).is_empty_like());
        assert!(!Value::Int64(1).is_empty_like());
        assert!(!Value::String("x".into()).is_empty_like());
        assert!(!Value::Boolean(false).is_empty_like());
    }

    #[test]
    fn test_parse_date_string_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(parse_date_string("2024-06-15"), Some(expected));
        assert_eq!(parse_date_string("2024/06/15"), Some(expected));
        assert_eq!(parse_date_string("2024-06-15 10:30:00"), Some(expected));
        assert_eq!(parse_date_string("not-a-date"), None);
    }
}
