// src/lib.rs
//! Query-execution core for an in-memory property graph: a predicate
//! algebra with subquery operators, an aggregation pipeline, a transactional
//! batch engine, and a cached graph-algorithm library. Parsing, persistence
//! and process wiring live in collaborators behind the [`QueryParser`] and
//! [`GraphStore`] traits.

mod datatypes;
mod error;
mod graph;

pub use datatypes::values::{
    compare_values, parse_date_string, values_equal, Value, NUMERIC_TOLERANCE,
};
pub use error::{EngineError, Result};
pub use graph::aggregations::AggregationOutcome;
pub use graph::query::{
    looks_like_query, AggregateFunction, AggregateSpec, AnalysisData, AnalysisKind, BatchKind,
    BatchMetrics, BatchOperationResult, BatchPhase, BatchSpec, BatchSummary, CmpOp, Condition,
    ConditionGroup, ConditionSet, ConditionTest, ConditionValue, EdgeFilter, PathAlgorithm,
    PathData, PathParams, QueryData, QueryDescriptor, QueryParser, QueryResult, QueryType,
    SimpleOp, SubqueryOp,
};
pub use graph::reporting::{AlgorithmLatency, MetricsSnapshot};
pub use graph::schema::{EdgeData, EdgeId, GraphStore, MemoryGraph, NodeData, NodeId};
pub use graph::subqueries::{EvalContext, QueryExecutor};
pub use graph::{EngineConfig, QueryEngine};
