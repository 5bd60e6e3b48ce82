// src/graph/batch_operations.rs
//! Batch transaction engine. A batch moves through
//! Validating → Estimating → Executing → IntegrityChecking and ends
//! Committed or RolledBack. Rollback replays an inverse command log
//! recorded during execution, so only the entities the batch touched are
//! restored, never the whole graph.

use crate::datatypes::values::Value;
use crate::error::EngineError;
use crate::graph::predicates;
use crate::graph::query::{
    BatchKind, BatchMetrics, BatchOperationResult, BatchPhase, BatchSpec, BatchSummary,
    ConditionSet, ConditionTest, QueryData, QueryDescriptor, QueryResult, QueryType, SimpleOp,
};
use crate::graph::schema::{EdgeData, GraphStore, NodeData, NodeId};
use crate::graph::subqueries::EvalContext;
use crate::graph::EngineConfig;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Undo log
// ============================================================================

enum UndoEntry {
    CreatedNode(NodeId),
    /// Full pre-image of a node whose properties were changed.
    UpdatedNode(NodeData),
    DeletedNode(NodeData),
    DeletedEdge(EdgeData),
}

/// Inverse command log. Entries are replayed in reverse on rollback, so a
/// node deleted after its edges comes back before they do.
#[derive(Default)]
struct UndoLog {
    entries: Mutex<Vec<UndoEntry>>,
}

impl UndoLog {
    fn record(&self, entry: UndoEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn rollback<S: GraphStore>(self, store: &S) {
        let entries = self.entries.into_inner().unwrap_or_else(|e| e.into_inner());
        warn!(entries = entries.len(), "rolling back batch");
        for entry in entries.into_iter().rev() {
            match entry {
                UndoEntry::CreatedNode(id) => {
                    store.remove_node(id);
                }
                UndoEntry::UpdatedNode(pre) => {
                    store.replace_node_properties(pre.id, pre.properties);
                }
                UndoEntry::DeletedNode(pre) => {
                    store.add_node(pre);
                }
                UndoEntry::DeletedEdge(pre) => {
                    store.add_edge(pre);
                }
            }
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

pub fn run_batch<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    ctx: &EvalContext<'_>,
    config: &EngineConfig,
) -> QueryResult {
    // Validating
    let spec = match validate(descriptor) {
        Ok(spec) => spec,
        Err(err) => return QueryResult::failure(&err),
    };
    debug!(kind = ?spec.kind, "batch validated");

    // Estimating
    let conditions = match ConditionSet::decode(&descriptor.conditions) {
        Ok(set) => set,
        Err(err) => return QueryResult::failure(&err),
    };
    let estimated = estimate(store, descriptor, spec, &conditions, ctx, config);
    if estimated > config.batch_ceiling {
        return QueryResult::failure(&EngineError::BatchTooLarge {
            estimated,
            ceiling: config.batch_ceiling,
        });
    }
    debug!(estimated, "batch estimated");

    // Executing
    let log = UndoLog::default();
    let results = match spec.kind {
        BatchKind::Create => create_nodes(store, descriptor, &conditions, &log, config),
        BatchKind::Update => update_matching(store, descriptor, &conditions, &log, ctx),
        BatchKind::Delete => delete_matching(store, descriptor, &conditions, &log, ctx),
        BatchKind::Upsert => upsert_matching(store, descriptor, &conditions, &log, ctx),
        BatchKind::Mixed | BatchKind::Atomic => spec
            .operations
            .iter()
            .flat_map(|op| run_sub_operation(store, op, &log, ctx, config))
            .collect::<Vec<_>>(),
        BatchKind::Parallel => {
            // Results preserve submission order even though units complete
            // out of order.
            let nested: Vec<Vec<BatchOperationResult>> = spec
                .operations
                .par_iter()
                .map(|op| run_sub_operation(store, op, &log, ctx, config))
                .collect();
            nested.into_iter().flatten().collect()
        }
    };

    let any_failed = results.iter().any(|r| !r.success);
    if spec.kind == BatchKind::Atomic && any_failed {
        log.rollback(store);
        let metrics = BatchMetrics::from_results(&results);
        return QueryResult::failure_with_data(
            &EngineError::Validation("atomic batch rolled back after sub-operation failure".into()),
            QueryData::Batch(BatchSummary {
                results,
                metrics,
                phase: BatchPhase::RolledBack,
            }),
        );
    }

    // IntegrityChecking
    if let Err(err) = integrity_check(store) {
        log.rollback(store);
        let metrics = BatchMetrics::from_results(&results);
        return QueryResult::failure_with_data(
            &err,
            QueryData::Batch(BatchSummary {
                results,
                metrics,
                phase: BatchPhase::RolledBack,
            }),
        );
    }

    // Committed
    let metrics = BatchMetrics::from_results(&results);
    let message = format!(
        "batch committed: {} succeeded, {} failed of {} operation(s)",
        metrics.succeeded, metrics.failed, metrics.total
    );
    QueryResult::ok(
        message,
        QueryData::Batch(BatchSummary {
            results,
            metrics,
            phase: BatchPhase::Committed,
        }),
    )
}

// ============================================================================
// Validation and estimation
// ============================================================================

fn validate(descriptor: &QueryDescriptor) -> Result<&BatchSpec, EngineError> {
    let spec = descriptor
        .batch
        .as_ref()
        .ok_or_else(|| EngineError::Validation("batch query carries no batch kind".into()))?;
    if descriptor.label.is_none() && spec.operations.is_empty() {
        return Err(EngineError::Validation(
            "batch requires a target label or a sub-operation list".into(),
        ));
    }
    if spec.kind == BatchKind::Update && descriptor.properties.is_empty() {
        return Err(EngineError::Validation(
            "batch update requires at least one property to set".into(),
        ));
    }
    Ok(spec)
}

fn estimate<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    spec: &BatchSpec,
    conditions: &ConditionSet,
    ctx: &EvalContext<'_>,
    config: &EngineConfig,
) -> usize {
    if !spec.operations.is_empty() {
        return spec.operations.len();
    }
    match spec.kind {
        BatchKind::Create => create_count(descriptor, conditions, config),
        // Upsert creates one node when nothing matches.
        BatchKind::Upsert => matching_nodes(store, descriptor, conditions, ctx).len().max(1),
        _ => matching_nodes(store, descriptor, conditions, ctx).len(),
    }
}

/// Node count for a batch create: an explicit `count` write-property, a
/// `count` equality condition, or the configured default (3).
fn create_count(
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    config: &EngineConfig,
) -> usize {
    if let Some(n) = descriptor.properties.get("count").and_then(|v| v.as_f64()) {
        return (n.round().max(0.0)) as usize;
    }
    let from_condition = conditions.and_terms.iter().find_map(|c| match &c.test {
        ConditionTest::Simple {
            op: SimpleOp::Eq,
            expected,
        } if c.property == "count" => expected.as_f64(),
        _ => None,
    });
    match from_condition {
        Some(n) => (n.round().max(0.0)) as usize,
        None => config.default_create_count,
    }
}

fn matching_nodes<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    ctx: &EvalContext<'_>,
) -> Vec<NodeData> {
    let candidates = match descriptor.label.as_deref() {
        Some(label) => store.nodes_by_label(label),
        None => store.all_nodes(),
    };
    let mut matched: Vec<NodeData> = candidates
        .into_iter()
        .filter(|node| predicates::evaluate(&node.properties, conditions, ctx))
        .collect();
    matched.sort_by_key(|n| n.id);
    matched
}

// ============================================================================
// Typed batch kinds
// ============================================================================

fn create_nodes<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    log: &UndoLog,
    config: &EngineConfig,
) -> Vec<BatchOperationResult> {
    let Some(label) = descriptor.label.as_deref() else {
        return vec![BatchOperationResult::failed(
            "batch create requires a target label",
            0.0,
            None,
        )];
    };
    let count = create_count(descriptor, conditions, config);
    let mut template = descriptor.properties.clone();
    template.remove("count");

    (0..count)
        .map(|index| {
            let started = Instant::now();
            let mut properties = template.clone();
            if count > 1 {
                properties.insert("batch_index".to_string(), Value::Int64(index as i64));
            }
            let id = store.add_node(NodeData::new(label, properties));
            log.record(UndoEntry::CreatedNode(id));
            BatchOperationResult::ok(
                format!("created {} node {}", label, id),
                elapsed_ms(started),
                Some(id),
            )
        })
        .collect()
}

fn update_matching<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    log: &UndoLog,
    ctx: &EvalContext<'_>,
) -> Vec<BatchOperationResult> {
    let matched = matching_nodes(store, descriptor, conditions, ctx);
    // Bounded fan-out: rayon's pool is sized to the host's available
    // parallelism; collect keeps submission order.
    matched
        .par_iter()
        .map(|node| update_one(store, node, &descriptor.properties, log))
        .collect()
}

fn update_one<S: GraphStore>(
    store: &S,
    pre: &NodeData,
    properties: &HashMap<String, Value>,
    log: &UndoLog,
) -> BatchOperationResult {
    let started = Instant::now();
    log.record(UndoEntry::UpdatedNode(pre.clone()));
    if store.update_node_properties(pre.id, properties.clone()) {
        BatchOperationResult::ok(
            format!("updated node {}", pre.id),
            elapsed_ms(started),
            Some(pre.id),
        )
    } else {
        BatchOperationResult::failed(
            format!("node {} disappeared before update", pre.id),
            elapsed_ms(started),
            Some(pre.id),
        )
    }
}

fn delete_matching<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    log: &UndoLog,
    ctx: &EvalContext<'_>,
) -> Vec<BatchOperationResult> {
    let matched = matching_nodes(store, descriptor, conditions, ctx);
    matched
        .par_iter()
        .map(|node| delete_one(store, node, log))
        .collect()
}

/// Edges touching the node go first, then the node itself. A failure stays
/// confined to this one sub-operation.
fn delete_one<S: GraphStore>(store: &S, pre: &NodeData, log: &UndoLog) -> BatchOperationResult {
    let started = Instant::now();
    for edge in store.edges_for_node(pre.id) {
        // A concurrent delete of the neighbor may have won the race; only
        // log edges this call actually removed.
        if store.remove_edge(edge.id) {
            log.record(UndoEntry::DeletedEdge(edge));
        }
    }
    if store.remove_node(pre.id) {
        log.record(UndoEntry::DeletedNode(pre.clone()));
        BatchOperationResult::ok(
            format!("deleted node {}", pre.id),
            elapsed_ms(started),
            Some(pre.id),
        )
    } else {
        BatchOperationResult::failed(
            format!("node {} was already gone", pre.id),
            elapsed_ms(started),
            Some(pre.id),
        )
    }
}

/// Update-in-place for every matching node; create exactly one when nothing
/// matches.
fn upsert_matching<S: GraphStore>(
    store: &S,
    descriptor: &QueryDescriptor,
    conditions: &ConditionSet,
    log: &UndoLog,
    ctx: &EvalContext<'_>,
) -> Vec<BatchOperationResult> {
    let matched = matching_nodes(store, descriptor, conditions, ctx);
    if matched.is_empty() {
        let started = Instant::now();
        let Some(label) = descriptor.label.as_deref() else {
            return vec![BatchOperationResult::failed(
                "upsert insert requires a target label",
                0.0,
                None,
            )];
        };
        let id = store.add_node(NodeData::new(label, descriptor.properties.clone()));
        log.record(UndoEntry::CreatedNode(id));
        return vec![BatchOperationResult::ok(
            format!("upsert created {} node {}", label, id),
            elapsed_ms(started),
            Some(id),
        )];
    }
    matched
        .par_iter()
        .map(|node| update_one(store, node, &descriptor.properties, log))
        .collect()
}

// ============================================================================
// Mixed / predefined sub-operations
// ============================================================================

/// Execute one sub-descriptor. Mutating kinds go through the logged helpers
/// so an atomic batch can undo them; read kinds re-enter the dispatcher.
fn run_sub_operation<S: GraphStore>(
    store: &S,
    op: &QueryDescriptor,
    log: &UndoLog,
    ctx: &EvalContext<'_>,
    config: &EngineConfig,
) -> Vec<BatchOperationResult> {
    let conditions = match ConditionSet::decode(&op.conditions) {
        Ok(set) => set,
        Err(err) => return vec![BatchOperationResult::failed(err.to_string(), 0.0, None)],
    };
    match op.query_type {
        QueryType::Create => {
            if op.label.is_none() {
                return vec![BatchOperationResult::failed(
                    "create sub-operation requires a label",
                    0.0,
                    None,
                )];
            }
            // A bare create sub-operation materializes one node unless it
            // asks for more.
            let asks_for_count = op.properties.contains_key("count")
                || conditions.and_terms.iter().any(|c| c.property == "count");
            let mut op = op.clone();
            if !asks_for_count {
                op.properties
                    .insert("count".to_string(), Value::Int64(1));
            }
            create_nodes(store, &op, &conditions, log, config)
        }
        QueryType::Update => {
            if op.properties.is_empty() {
                return vec![BatchOperationResult::failed(
                    "update sub-operation requires at least one property",
                    0.0,
                    None,
                )];
            }
            let results = update_matching(store, op, &conditions, log, ctx);
            if results.is_empty() {
                return vec![BatchOperationResult::failed(
                    "update matched no nodes",
                    0.0,
                    None,
                )];
            }
            results
        }
        QueryType::Delete => {
            let results = delete_matching(store, op, &conditions, log, ctx);
            if results.is_empty() {
                return vec![BatchOperationResult::failed(
                    "delete matched no nodes",
                    0.0,
                    None,
                )];
            }
            results
        }
        QueryType::Batch => vec![BatchOperationResult::failed(
            "nested batches are not supported",
            0.0,
            None,
        )],
        // Read kinds re-enter the general dispatcher.
        _ => {
            let started = Instant::now();
            let result = ctx.executor().run_query(op, ctx);
            vec![if result.success {
                BatchOperationResult::ok(result.message, elapsed_ms(started), None)
            } else {
                BatchOperationResult::failed(
                    result.error.unwrap_or(result.message),
                    elapsed_ms(started),
                    None,
                )
            }]
        }
    }
}

// ============================================================================
// Integrity check
// ============================================================================

/// Post-execution invariants: every edge endpoint exists, no duplicate
/// entity identifiers.
pub fn integrity_check<S: GraphStore>(store: &S) -> Result<(), EngineError> {
    let mut node_ids = HashSet::new();
    for node in store.all_nodes() {
        if !node_ids.insert(node.id) {
            return Err(EngineError::Integrity(format!(
                "duplicate node id {}",
                node.id
            )));
        }
    }
    let mut edge_ids = HashSet::new();
    for edge in store.all_edges() {
        if !edge_ids.insert(edge.id) {
            return Err(EngineError::Integrity(format!(
                "duplicate edge id {}",
                edge.id
            )));
        }
        if !node_ids.contains(&edge.from_node) || !node_ids.contains(&edge.to_node) {
            return Err(EngineError::Integrity(format!(
                "edge {} references a missing endpoint",
                edge.id
            )));
        }
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
