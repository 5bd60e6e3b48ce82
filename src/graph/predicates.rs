// src/graph/predicates.rs
//! Condition algebra applied to one entity's properties. Conditions are
//! partitioned into an AND group and an OR group; both are evaluated
//! (concurrently when both are present) and combined. A condition that
//! cannot be evaluated (wrong type, malformed pattern, failed subquery)
//! is `false` for that entity, never an error for the whole query.

use crate::datatypes::values::{compare_values, values_equal, Value, NUMERIC_TOLERANCE};
use crate::graph::query::{Condition, ConditionSet, ConditionTest, SimpleOp};
use crate::graph::subqueries::{self, EvalContext};
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Evaluate a condition set against one entity.
/// AND terms must all hold; OR terms need one. Both groups present → both
/// verdicts must hold; no conditions at all is a vacuous pass.
pub fn evaluate(
    properties: &HashMap<String, Value>,
    set: &ConditionSet,
    ctx: &EvalContext<'_>,
) -> bool {
    match (set.and_terms.is_empty(), set.or_terms.is_empty()) {
        (true, true) => true,
        (false, true) => and_verdict(properties, &set.and_terms, ctx),
        (true, false) => or_verdict(properties, &set.or_terms, ctx),
        (false, false) => {
            let (and_ok, or_ok) = rayon::join(
                || and_verdict(properties, &set.and_terms, ctx),
                || or_verdict(properties, &set.or_terms, ctx),
            );
            and_ok && or_ok
        }
    }
}

fn and_verdict(
    properties: &HashMap<String, Value>,
    terms: &[Condition],
    ctx: &EvalContext<'_>,
) -> bool {
    terms.iter().all(|c| evaluate_condition(properties, c, ctx))
}

fn or_verdict(
    properties: &HashMap<String, Value>,
    terms: &[Condition],
    ctx: &EvalContext<'_>,
) -> bool {
    terms.iter().any(|c| evaluate_condition(properties, c, ctx))
}

pub fn evaluate_condition(
    properties: &HashMap<String, Value>,
    condition: &Condition,
    ctx: &EvalContext<'_>,
) -> bool {
    let candidate = properties.get(&condition.property);
    match &condition.test {
        ConditionTest::Simple { op, expected } => match candidate {
            Some(value) => apply_simple(value, op, expected),
            None => missing_property_rule(op, expected),
        },
        ConditionTest::Nested { op, query } => subqueries::resolve(query, op, candidate, ctx),
        ConditionTest::NestedRaw { op, text } => subqueries::resolve_raw(text, op, candidate, ctx),
    }
}

/// A property that is not present at all: `eq null` holds, `ne <non-null>`
/// holds, everything else fails closed.
fn missing_property_rule(op: &SimpleOp, expected: &Value) -> bool {
    match op {
        SimpleOp::Eq => expected.is_null(),
        SimpleOp::Ne => !expected.is_null(),
        _ => false,
    }
}

fn apply_simple(value: &Value, op: &SimpleOp, expected: &Value) -> bool {
    match op {
        SimpleOp::Eq => values_equal(value, expected),
        SimpleOp::Ne => !values_equal(value, expected),
        SimpleOp::Gt => matches!(compare_values(value, expected), Some(Ordering::Greater)),
        SimpleOp::Lt => matches!(compare_values(value, expected), Some(Ordering::Less)),
        SimpleOp::Ge => matches!(
            compare_values(value, expected),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        SimpleOp::Le => matches!(
            compare_values(value, expected),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        SimpleOp::Contains => with_strings(value, expected, |v, e| {
            v.to_lowercase().contains(&e.to_lowercase())
        }),
        SimpleOp::StartsWith => with_strings(value, expected, |v, e| {
            v.to_lowercase().starts_with(&e.to_lowercase())
        }),
        SimpleOp::EndsWith => with_strings(value, expected, |v, e| {
            v.to_lowercase().ends_with(&e.to_lowercase())
        }),
        SimpleOp::Like => with_strings(value, expected, like_match),
        // The derived-string family compares case-sensitively; a
        // case-folding comparison would make upper/lower vacuous.
        SimpleOp::Upper => derived_equals(value, expected, |s| s.to_uppercase()),
        SimpleOp::Lower => derived_equals(value, expected, |s| s.to_lowercase()),
        SimpleOp::Trim => derived_equals(value, expected, |s| s.trim().to_string()),
        SimpleOp::Length => {
            let length = match value {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                _ => return false,
            };
            match expected.as_f64() {
                Some(want) => (length as f64 - want).abs() <= NUMERIC_TOLERANCE,
                None => false,
            }
        }
        SimpleOp::Substring { start, end } => {
            derived_equals(value, expected, |s| substring_of(s, *start, *end))
        }
        SimpleOp::Replace { old, new, count } => derived_equals(value, expected, |s| match count {
            Some(n) => s.replacen(old.as_str(), new, *n),
            None => s.replace(old.as_str(), new),
        }),
    }
}

fn with_strings(value: &Value, expected: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (value, expected) {
        (Value::String(v), Value::String(e)) => test(v, e),
        _ => false,
    }
}

fn derived_equals(value: &Value, expected: &Value, derive: impl Fn(&str) -> String) -> bool {
    match (value, expected) {
        (Value::String(v), Value::String(e)) => derive(v) == *e,
        _ => false,
    }
}

/// Character-based slice: `start` inclusive, `end` exclusive, both clamped.
fn substring_of(s: &str, start: usize, end: Option<usize>) -> String {
    let taken = match end {
        Some(end) if end > start => end - start,
        Some(_) => 0,
        None => usize::MAX,
    };
    s.chars().skip(start).take(taken).collect()
}

/// SQL-style pattern match: `%` is any run of characters, `_` exactly one;
/// everything else is literal. Fully anchored, case-insensitive.
fn like_match(value: &str, pattern: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 2);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    RegexBuilder::new(&translated)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}
