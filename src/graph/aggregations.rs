// src/graph/aggregations.rs
//! Aggregation pipeline: filter a node or edge set, project one property as
//! a number, reduce. Elements that lack the property or carry a non-numeric
//! value are counted and reported, never silently dropped.

use crate::datatypes::values::Value;
use crate::graph::predicates;
use crate::graph::query::{AggregateFunction, ConditionSet, EdgeFilter};
use crate::graph::schema::GraphStore;
use crate::graph::subqueries::EvalContext;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    /// `None` only for avg/min/max over zero values; "no value" is not 0.
    pub value: Option<Value>,
    pub considered: usize,
    pub skipped: usize,
    pub message: String,
}

pub fn aggregate_nodes<S: GraphStore>(
    store: &S,
    label: Option<&str>,
    conditions: &ConditionSet,
    function: AggregateFunction,
    property: &str,
    ctx: &EvalContext<'_>,
) -> AggregationOutcome {
    let candidates = match label {
        Some(label) => store.nodes_by_label(label),
        None => store.all_nodes(),
    };
    let surviving: Vec<&HashMap<String, Value>> = candidates
        .iter()
        .filter(|node| predicates::evaluate(&node.properties, conditions, ctx))
        .map(|node| &node.properties)
        .collect();
    reduce(&surviving, function, property)
}

pub fn aggregate_edges<S: GraphStore>(
    store: &S,
    filter: &EdgeFilter,
    conditions: &ConditionSet,
    function: AggregateFunction,
    property: &str,
    ctx: &EvalContext<'_>,
) -> AggregationOutcome {
    let edges = store.all_edges();
    let selected: Vec<&HashMap<String, Value>> = edges
        .iter()
        .filter(|edge| {
            if let Some(wanted) = &filter.connection_type {
                if !edge.connection_type.eq_ignore_ascii_case(wanted) {
                    return false;
                }
            }
            if let Some(excluded) = &filter.exclude_connection_type {
                if edge.connection_type.eq_ignore_ascii_case(excluded) {
                    return false;
                }
            }
            if let Some(from_label) = &filter.from_label {
                match store.node(edge.from_node) {
                    Some(node) if node.label.eq_ignore_ascii_case(from_label) => {}
                    _ => return false,
                }
            }
            if let Some(to_label) = &filter.to_label {
                match store.node(edge.to_node) {
                    Some(node) if node.label.eq_ignore_ascii_case(to_label) => {}
                    _ => return false,
                }
            }
            predicates::evaluate(&edge.properties, conditions, ctx)
        })
        .map(|edge| &edge.properties)
        .collect();
    reduce(&selected, function, property)
}

fn reduce(
    property_maps: &[&HashMap<String, Value>],
    function: AggregateFunction,
    property: &str,
) -> AggregationOutcome {
    let mut values: Vec<f64> = Vec::with_capacity(property_maps.len());
    let mut skipped = 0usize;
    for props in property_maps {
        match props.get(property).and_then(|v| v.as_f64()) {
            Some(n) => values.push(n),
            None => skipped += 1,
        }
    }

    let value = match function {
        AggregateFunction::Count => Some(Value::Int64(values.len() as i64)),
        AggregateFunction::Sum => Some(Value::Float64(values.iter().sum())),
        AggregateFunction::Avg => {
            if values.is_empty() {
                None
            } else {
                Some(Value::Float64(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
        AggregateFunction::Min => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.min(n))))
            .map(Value::Float64),
        AggregateFunction::Max => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))))
            .map(Value::Float64),
    };

    let message = match &value {
        Some(v) => format!(
            "{}({}) = {} over {} value(s), {} skipped (missing or non-numeric)",
            function.name(),
            property,
            v,
            values.len(),
            skipped
        ),
        None => format!(
            "{}({}) has no value: 0 numeric values, {} skipped (missing or non-numeric)",
            function.name(),
            property,
            skipped
        ),
    };

    AggregationOutcome {
        value,
        considered: values.len(),
        skipped,
        message,
    }
}
