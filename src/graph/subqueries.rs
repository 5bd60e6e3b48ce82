// src/graph/subqueries.rs
//! Nested-query resolution. A subquery re-enters the engine through the
//! `QueryExecutor` trait; its extracted value list feeds the relational
//! operator (`in`, `exists`, `any`, `all`, `count`, aggregate comparisons).
//! Results are memoized per top-level evaluation so an identical subquery
//! runs once, not once per outer row.

use crate::datatypes::values::{compare_values, values_equal, Value, NUMERIC_TOLERANCE};
use crate::graph::query::{
    CmpOp, QueryData, QueryDescriptor, QueryParser, QueryResult, SubqueryOp,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Re-entry point into the whole query-execution surface. The engine
/// implements this for itself; holding it as a trait reference keeps the
/// recursion explicit instead of hiding it behind global state.
pub trait QueryExecutor: Send + Sync {
    fn run_query(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult;
}

/// Per-top-level-evaluation context: the executor to re-enter, the optional
/// parser collaborator, and the subquery memo. Created fresh for every
/// top-level query, so memoized results never outlive one evaluation.
pub struct EvalContext<'a> {
    executor: &'a dyn QueryExecutor,
    parser: Option<&'a dyn QueryParser>,
    memo: Mutex<HashMap<String, Vec<Value>>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(executor: &'a dyn QueryExecutor, parser: Option<&'a dyn QueryParser>) -> Self {
        EvalContext {
            executor,
            parser,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> &'a dyn QueryExecutor {
        self.executor
    }
}

/// Evaluate a subquery-driven operator against a candidate value.
/// Every failure mode (nested-query error, absent property, malformed raw
/// query) resolves to `false`; a bad condition never aborts the outer query.
pub fn resolve(
    query: &QueryDescriptor,
    op: &SubqueryOp,
    candidate: Option<&Value>,
    ctx: &EvalContext<'_>,
) -> bool {
    match extract_values(query, ctx) {
        Some(values) => apply_operator(op, candidate, &values),
        None => false,
    }
}

/// Raw-string variant: hand the text to the parser collaborator first.
pub fn resolve_raw(
    text: &str,
    op: &SubqueryOp,
    candidate: Option<&Value>,
    ctx: &EvalContext<'_>,
) -> bool {
    let Some(parser) = ctx.parser else {
        debug!(text, "raw subquery ignored: no parser installed");
        return false;
    };
    match parser.parse(text) {
        Ok(query) => resolve(&query, op, candidate, ctx),
        Err(_) => false,
    }
}

/// Run the nested query (or reuse the memoized run) and flatten its result
/// into comparison-ready values: a scalar becomes a singleton; a node list
/// yields the projected property when one was requested, otherwise every
/// property value of every node.
fn extract_values(query: &QueryDescriptor, ctx: &EvalContext<'_>) -> Option<Vec<Value>> {
    let key = signature(query);
    if let Some(hit) = ctx
        .memo
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
    {
        return Some(hit.clone());
    }

    let result = ctx.executor.run_query(query, ctx);
    if !result.success {
        return None;
    }
    let values = flatten_result(query, &result);
    ctx.memo
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(key, values.clone());
    Some(values)
}

fn flatten_result(query: &QueryDescriptor, result: &QueryResult) -> Vec<Value> {
    match &result.data {
        Some(QueryData::Scalar(v)) => vec![v.clone()],
        Some(QueryData::Nodes(nodes)) => match query.projection.as_deref() {
            Some(projected) => nodes
                .iter()
                .filter_map(|n| n.properties.get(projected).cloned())
                .collect(),
            None => nodes
                .iter()
                .flat_map(|n| n.properties.values().cloned())
                .collect(),
        },
        Some(QueryData::Edges(edges)) => match query.projection.as_deref() {
            Some(projected) => edges
                .iter()
                .filter_map(|e| e.properties.get(projected).cloned())
                .collect(),
            None => edges
                .iter()
                .flat_map(|e| e.properties.values().cloned())
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// Normalized signature of the parts of a descriptor that determine its
/// result set. serde_json keeps object keys sorted, so two descriptors that
/// differ only in map iteration order share a signature.
fn signature(query: &QueryDescriptor) -> String {
    #[derive(Serialize)]
    struct Signature<'a> {
        query_type: &'a crate::graph::query::QueryType,
        label: &'a Option<String>,
        conditions: &'a HashMap<String, crate::graph::query::ConditionValue>,
        properties: &'a HashMap<String, Value>,
        limit: &'a Option<usize>,
        offset: &'a Option<usize>,
        projection: &'a Option<String>,
        aggregate: &'a Option<crate::graph::query::AggregateSpec>,
    }
    let sig = Signature {
        query_type: &query.query_type,
        label: &query.label,
        conditions: &query.conditions,
        properties: &query.properties,
        limit: &query.limit,
        offset: &query.offset,
        projection: &query.projection,
        aggregate: &query.aggregate,
    };
    serde_json::to_string(&sig).unwrap_or_else(|_| format!("{:?}", query))
}

fn apply_operator(op: &SubqueryOp, candidate: Option<&Value>, values: &[Value]) -> bool {
    match op {
        SubqueryOp::In => candidate
            .map_or(false, |c| values.iter().any(|v| values_equal(c, v))),
        SubqueryOp::NotIn => candidate
            .map_or(false, |c| !values.iter().any(|v| values_equal(c, v))),
        SubqueryOp::Exists => has_substance(values),
        SubqueryOp::NotExists => !has_substance(values),
        SubqueryOp::Any => {
            let Some(candidate) = candidate else {
                return false;
            };
            candidate_elements(candidate)
                .iter()
                .any(|c| values.iter().any(|v| values_equal(c, v)))
        }
        SubqueryOp::All => {
            let Some(candidate) = candidate else {
                return false;
            };
            let elements = candidate_elements(candidate);
            !elements.is_empty()
                && elements
                    .iter()
                    .all(|c| values.iter().any(|v| values_equal(c, v)))
        }
        SubqueryOp::Count(cmp, literal) => cmp_numbers(values.len() as f64, *literal, *cmp),
        SubqueryOp::AggregateCmp(cmp) => {
            let (Some(candidate), Some(aggregate)) = (candidate, values.first()) else {
                return false;
            };
            match compare_values(candidate, aggregate) {
                Some(ordering) => cmp_matches(ordering, *cmp),
                None => false,
            }
        }
    }
}

/// Non-empty and not composed solely of null/empty/zero values.
fn has_substance(values: &[Value]) -> bool {
    values.iter().any(|v| !v.is_empty_like())
}

/// A candidate that is itself a collection (a list value or a delimited
/// string) is expanded into elements for `any`/`all`.
fn candidate_elements(candidate: &Value) -> Vec<Value> {
    match candidate {
        Value::List(items) => items.clone(),
        Value::String(s) if s.contains(',') || s.contains(';') => s
            .split(|c| c == ',' || c == ';')
            .map(|part| Value::String(part.trim().to_string()))
            .filter(|v| !matches!(v, Value::String(s) if s.is_empty()))
            .collect(),
        other => vec![other.clone()],
    }
}

fn cmp_matches(ordering: Ordering, cmp: CmpOp) -> bool {
    match cmp {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
    }
}

fn cmp_numbers(a: f64, b: f64, cmp: CmpOp) -> bool {
    let ordering = if (a - b).abs() <= NUMERIC_TOLERANCE {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else {
        Ordering::Greater
    };
    cmp_matches(ordering, cmp)
}
