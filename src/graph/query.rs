// src/graph/query.rs
//! Query descriptors and result types. The external condition-key encoding
//! (`[And_|Or_]<property>_<operator>[_<suffix>][_<N>]`) is decoded exactly
//! once, at the descriptor boundary, into structured `Condition` values;
//! evaluation never re-parses strings.

use crate::datatypes::values::Value;
use crate::error::EngineError;
use crate::graph::schema::{EdgeData, EdgeId, NodeData, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Query descriptor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Create,
    Find,
    Update,
    Delete,
    Count,
    Aggregate,
    Batch,
    Path,
    Analysis,
}

/// A condition value is either a literal to compare against or a nested
/// query whose result set feeds a relational operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionValue {
    Literal(Value),
    Subquery(Box<QueryDescriptor>),
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        ConditionValue::Literal(value)
    }
}

impl From<QueryDescriptor> for ConditionValue {
    fn from(query: QueryDescriptor) -> Self {
        ConditionValue::Subquery(Box::new(query))
    }
}

/// Structured query intent, produced by the parser collaborator. Unused
/// sections stay empty; the dispatcher validates what each kind requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub query_type: QueryType,
    pub label: Option<String>,
    pub conditions: HashMap<String, ConditionValue>,
    pub properties: HashMap<String, Value>,
    /// `(property, ascending)` pairs applied before pagination.
    pub sort: Vec<(String, bool)>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    /// Single projected property; subquery value extraction honors this.
    pub projection: Option<String>,
    pub aggregate: Option<AggregateSpec>,
    /// Present when an aggregate targets edges instead of a node label.
    pub edge_filter: Option<EdgeFilter>,
    pub batch: Option<BatchSpec>,
    pub path: Option<PathParams>,
    pub analysis: Option<AnalysisKind>,
}

impl QueryDescriptor {
    pub fn new(query_type: QueryType) -> Self {
        QueryDescriptor {
            query_type,
            label: None,
            conditions: HashMap::new(),
            properties: HashMap::new(),
            sort: Vec::new(),
            offset: None,
            limit: None,
            projection: None,
            aggregate: None,
            edge_filter: None,
            batch: None,
            path: None,
            analysis: None,
        }
    }

    pub fn find(label: impl Into<String>) -> Self {
        Self::new(QueryType::Find).with_label(label)
    }

    pub fn count(label: impl Into<String>) -> Self {
        Self::new(QueryType::Count).with_label(label)
    }

    pub fn create(label: impl Into<String>) -> Self {
        Self::new(QueryType::Create).with_label(label)
    }

    pub fn update(label: impl Into<String>) -> Self {
        Self::new(QueryType::Update).with_label(label)
    }

    pub fn delete(label: impl Into<String>) -> Self {
        Self::new(QueryType::Delete).with_label(label)
    }

    pub fn aggregate(
        label: impl Into<String>,
        function: AggregateFunction,
        property: impl Into<String>,
    ) -> Self {
        let mut q = Self::new(QueryType::Aggregate).with_label(label);
        q.aggregate = Some(AggregateSpec {
            function,
            property: property.into(),
        });
        q
    }

    pub fn path(params: PathParams) -> Self {
        let mut q = Self::new(QueryType::Path);
        q.path = Some(params);
        q
    }

    pub fn analysis(kind: AnalysisKind) -> Self {
        let mut q = Self::new(QueryType::Analysis);
        q.analysis = Some(kind);
        q
    }

    pub fn batch(kind: BatchKind) -> Self {
        let mut q = Self::new(QueryType::Batch);
        q.batch = Some(BatchSpec {
            kind,
            operations: Vec::new(),
        });
        q
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_sort(mut self, property: impl Into<String>, ascending: bool) -> Self {
        self.sort.push((property.into(), ascending));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_projection(mut self, property: impl Into<String>) -> Self {
        self.projection = Some(property.into());
        self
    }

    pub fn with_operation(mut self, op: QueryDescriptor) -> Self {
        self.batch
            .get_or_insert_with(|| BatchSpec {
                kind: BatchKind::Mixed,
                operations: Vec::new(),
            })
            .operations
            .push(op);
        self
    }
}

/// Parser collaborator: turns a raw query string into a descriptor. Only the
/// subquery resolver consults it, and only for string condition values that
/// look like nested queries.
pub trait QueryParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<QueryDescriptor, EngineError>;
}

/// Cheap screen for "is this string a nested query rather than a literal".
pub fn looks_like_query(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    ["find ", "count ", "aggregate ", "match "]
        .iter()
        .any(|kw| lowered.starts_with(kw))
}

// ============================================================================
// Conditions: structured form of the condition-key encoding
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionGroup {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn from_token(token: &str) -> Option<CmpOp> {
        match token {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "gt" => Some(CmpOp::Gt),
            "lt" => Some(CmpOp::Lt),
            "ge" | "gte" => Some(CmpOp::Ge),
            "le" | "lte" => Some(CmpOp::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimpleOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    Like,
    StartsWith,
    EndsWith,
    Upper,
    Lower,
    Trim,
    Length,
    Substring { start: usize, end: Option<usize> },
    Replace { old: String, new: String, count: Option<usize> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubqueryOp {
    In,
    NotIn,
    Exists,
    NotExists,
    Any,
    All,
    /// Compare the *size* of the extracted value list against the literal.
    Count(CmpOp, f64),
    /// Compare the candidate against the single extracted aggregate value.
    AggregateCmp(CmpOp),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTest {
    Simple { op: SimpleOp, expected: Value },
    Nested { op: SubqueryOp, query: Box<QueryDescriptor> },
    /// A raw string that looks like a query; resolved through the parser
    /// collaborator at evaluation time.
    NestedRaw { op: SubqueryOp, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub property: String,
    pub test: ConditionTest,
}

/// Conditions partitioned into the conjunctive and disjunctive groups the
/// evaluation algebra combines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    pub and_terms: Vec<Condition>,
    pub or_terms: Vec<Condition>,
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        self.and_terms.is_empty() && self.or_terms.is_empty()
    }

    /// Decode a raw condition map. Key grammar:
    /// `[And_|Or_]<property>_<operator>[_<suffix>][_<N>]`. A trailing
    /// numeric token disambiguates repeated operators on one property.
    /// Property names may contain underscores; the longest operator match
    /// (scanning splits left to right) wins.
    pub fn decode(map: &HashMap<String, ConditionValue>) -> Result<ConditionSet, EngineError> {
        let mut set = ConditionSet::default();
        for (key, value) in map {
            let (group, property, opcode) = decode_key(key)?;
            let condition = build_condition(key, property, opcode, value)?;
            match group {
                ConditionGroup::And => set.and_terms.push(condition),
                ConditionGroup::Or => set.or_terms.push(condition),
            }
        }
        // Decode order follows map iteration; keep the output deterministic.
        set.and_terms.sort_by(|a, b| a.property.cmp(&b.property));
        set.or_terms.sort_by(|a, b| a.property.cmp(&b.property));
        Ok(set)
    }
}

/// Operator as named in the key, before condition values are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OpCode {
    Simple(&'static str),
    Count(CmpOp, f64),
    AggregateCmp(CmpOp),
    Subquery(&'static str),
}

fn decode_key(key: &str) -> Result<(ConditionGroup, String, OpCode), EngineError> {
    let (group, rest) = if let Some(r) = key.strip_prefix("Or_") {
        (ConditionGroup::Or, r)
    } else if let Some(r) = key.strip_prefix("And_") {
        (ConditionGroup::And, r)
    } else {
        (ConditionGroup::And, key)
    };

    let tokens: Vec<&str> = rest.split('_').collect();
    for split in 1..tokens.len() {
        let op_tokens = &tokens[split..];
        let parsed = parse_operator(op_tokens).or_else(|| {
            // Retry with a trailing numeric disambiguator stripped.
            match op_tokens.split_last() {
                Some((last, head)) if !head.is_empty() && is_numeric_token(last) => {
                    parse_operator(head)
                }
                _ => None,
            }
        });
        if let Some(opcode) = parsed {
            return Ok((group, tokens[..split].join("_"), opcode));
        }
    }
    Err(EngineError::Validation(format!(
        "condition key '{}' has no recognizable operator",
        key
    )))
}

fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

fn parse_operator(tokens: &[&str]) -> Option<OpCode> {
    let joined = tokens.join("_");
    let simple = [
        "eq", "ne", "gt", "lt", "ge", "le", "contains", "like", "starts_with", "ends_with",
        "upper", "lower", "trim", "length", "substring", "replace",
    ];
    if simple.contains(&joined.as_str()) {
        let canonical: &'static str = simple[simple.iter().position(|s| *s == joined).unwrap()];
        return Some(OpCode::Simple(canonical));
    }
    let subquery = ["in", "not_in", "exists", "not_exists", "any", "all"];
    if subquery.contains(&joined.as_str()) {
        let canonical: &'static str =
            subquery[subquery.iter().position(|s| *s == joined).unwrap()];
        return Some(OpCode::Subquery(canonical));
    }
    // count_<cmp>_<literal>
    if tokens.len() == 3 && tokens[0] == "count" {
        let cmp = CmpOp::from_token(tokens[1])?;
        let literal = tokens[2].parse::<f64>().ok()?;
        return Some(OpCode::Count(cmp, literal));
    }
    // <cmp>_aggregate
    if tokens.len() == 2 && tokens[1] == "aggregate" {
        return Some(OpCode::AggregateCmp(CmpOp::from_token(tokens[0])?));
    }
    None
}

fn build_condition(
    key: &str,
    property: String,
    opcode: OpCode,
    value: &ConditionValue,
) -> Result<Condition, EngineError> {
    let test = match (&opcode, value) {
        (OpCode::Simple(name), ConditionValue::Literal(literal)) => {
            let (op, expected) = simple_op(name, literal)?;
            ConditionTest::Simple { op, expected }
        }
        // A literal-operator key with a nested-query value still routes to
        // the resolver: comparisons read against the subquery's result.
        (OpCode::Simple(name), ConditionValue::Subquery(q)) => {
            let op = match *name {
                "eq" => SubqueryOp::AggregateCmp(CmpOp::Eq),
                "ne" => SubqueryOp::NotIn,
                "gt" => SubqueryOp::AggregateCmp(CmpOp::Gt),
                "lt" => SubqueryOp::AggregateCmp(CmpOp::Lt),
                "ge" => SubqueryOp::AggregateCmp(CmpOp::Ge),
                "le" => SubqueryOp::AggregateCmp(CmpOp::Le),
                _ => {
                    return Err(EngineError::Validation(format!(
                        "operator '{}' in key '{}' cannot take a nested query",
                        name, key
                    )))
                }
            };
            ConditionTest::Nested {
                op,
                query: q.clone(),
            }
        }
        (OpCode::Subquery(_) | OpCode::Count(..) | OpCode::AggregateCmp(_), value) => {
            let op = match opcode {
                OpCode::Subquery("in") => SubqueryOp::In,
                OpCode::Subquery("not_in") => SubqueryOp::NotIn,
                OpCode::Subquery("exists") => SubqueryOp::Exists,
                OpCode::Subquery("not_exists") => SubqueryOp::NotExists,
                OpCode::Subquery("any") => SubqueryOp::Any,
                OpCode::Subquery("all") => SubqueryOp::All,
                OpCode::Count(cmp, lit) => SubqueryOp::Count(cmp, lit),
                OpCode::AggregateCmp(cmp) => SubqueryOp::AggregateCmp(cmp),
                _ => unreachable!(),
            };
            match value {
                ConditionValue::Subquery(q) => ConditionTest::Nested {
                    op,
                    query: q.clone(),
                },
                ConditionValue::Literal(Value::String(s)) if looks_like_query(s) => {
                    ConditionTest::NestedRaw {
                        op,
                        text: s.clone(),
                    }
                }
                ConditionValue::Literal(_) => {
                    return Err(EngineError::Validation(format!(
                        "key '{}' requires a nested query value",
                        key
                    )))
                }
            }
        }
    };
    Ok(Condition { property, test })
}

fn simple_op(name: &str, literal: &Value) -> Result<(SimpleOp, Value), EngineError> {
    let op = match name {
        "eq" => SimpleOp::Eq,
        "ne" => SimpleOp::Ne,
        "gt" => SimpleOp::Gt,
        "lt" => SimpleOp::Lt,
        "ge" => SimpleOp::Ge,
        "le" => SimpleOp::Le,
        "contains" => SimpleOp::Contains,
        "like" => SimpleOp::Like,
        "starts_with" => SimpleOp::StartsWith,
        "ends_with" => SimpleOp::EndsWith,
        "upper" => SimpleOp::Upper,
        "lower" => SimpleOp::Lower,
        "trim" => SimpleOp::Trim,
        "length" => SimpleOp::Length,
        "substring" => {
            let (args, expected) = parse_call("substring", literal)?;
            if args.is_empty() || args.len() > 2 {
                return Err(EngineError::Validation(
                    "substring expects (start[,end])".into(),
                ));
            }
            let start = parse_call_index(&args[0])?;
            let end = args.get(1).map(|a| parse_call_index(a)).transpose()?;
            return Ok((
                SimpleOp::Substring { start, end },
                Value::String(expected),
            ));
        }
        "replace" => {
            let (args, expected) = parse_call("replace", literal)?;
            if args.len() < 2 || args.len() > 3 {
                return Err(EngineError::Validation(
                    "replace expects (old,new[,count])".into(),
                ));
            }
            let count = args.get(2).map(|a| parse_call_index(a)).transpose()?;
            return Ok((
                SimpleOp::Replace {
                    old: args[0].clone(),
                    new: args[1].clone(),
                    count,
                },
                Value::String(expected),
            ));
        }
        other => {
            return Err(EngineError::Validation(format!(
                "unknown operator '{}'",
                other
            )))
        }
    };
    Ok((op, literal.clone()))
}

/// Parse the embedded call syntax `name(arg[,arg...])"expected"` out of a
/// string literal.
fn parse_call(name: &str, literal: &Value) -> Result<(Vec<String>, String), EngineError> {
    let text = literal.as_str().ok_or_else(|| {
        EngineError::Validation(format!("{} operator expects a string value", name))
    })?;
    let text = text.trim();
    let rest = text.strip_prefix(name).and_then(|r| r.strip_prefix('(')).ok_or_else(|| {
        EngineError::Validation(format!("malformed {} call: '{}'", name, text))
    })?;
    let close = rest.find(')').ok_or_else(|| {
        EngineError::Validation(format!("malformed {} call: missing ')'", name))
    })?;
    let args: Vec<String> = if rest[..close].trim().is_empty() {
        Vec::new()
    } else {
        rest[..close].split(',').map(|a| a.trim().to_string()).collect()
    };
    let expected = rest[close + 1..].trim();
    let expected = expected
        .strip_prefix('"')
        .and_then(|e| e.strip_suffix('"'))
        .ok_or_else(|| {
            EngineError::Validation(format!(
                "malformed {} call: expected literal must be quoted",
                name
            ))
        })?;
    Ok((args, expected.to_string()))
}

fn parse_call_index(arg: &str) -> Result<usize, EngineError> {
    arg.parse::<usize>()
        .map_err(|_| EngineError::Validation(format!("'{}' is not a valid index", arg)))
}

// ============================================================================
// Aggregates and edge filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    pub property: String,
}

/// Edge-set selection for edge aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeFilter {
    pub connection_type: Option<String>,
    pub exclude_connection_type: Option<String>,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
}

// ============================================================================
// Batch operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchKind {
    Create,
    Update,
    Delete,
    Upsert,
    Mixed,
    /// Mixed semantics plus all-or-nothing rollback.
    Atomic,
    /// Mixed semantics with concurrent sub-operation execution.
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub kind: BatchKind,
    pub operations: Vec<QueryDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPhase {
    Validating,
    Estimating,
    Executing,
    IntegrityChecking,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub duration_ms: f64,
    pub entity_id: Option<NodeId>,
}

impl BatchOperationResult {
    pub fn ok(message: impl Into<String>, duration_ms: f64, entity_id: Option<NodeId>) -> Self {
        BatchOperationResult {
            success: true,
            message: message.into(),
            error: None,
            duration_ms,
            entity_id,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: f64, entity_id: Option<NodeId>) -> Self {
        let error = error.into();
        BatchOperationResult {
            success: false,
            message: format!("operation failed: {}", error),
            error: Some(error),
            duration_ms,
            entity_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_ms: f64,
    pub average_ms: f64,
}

impl BatchMetrics {
    pub fn from_results(results: &[BatchOperationResult]) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        let total_ms: f64 = results.iter().map(|r| r.duration_ms).sum();
        BatchMetrics {
            total,
            succeeded,
            failed: total - succeeded,
            total_ms,
            average_ms: if total > 0 { total_ms / total as f64 } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub results: Vec<BatchOperationResult>,
    pub metrics: BatchMetrics,
    pub phase: BatchPhase,
}

// ============================================================================
// Path and analysis queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathAlgorithm {
    /// Let the heuristic selector choose.
    Auto,
    Dijkstra,
    AStar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathParams {
    /// Endpoint reference: a numeric node id or a `name` property value.
    pub from: String,
    pub to: String,
    pub max_steps: Option<usize>,
    pub connection_type: Option<String>,
    pub avoid_connection_type: Option<String>,
    /// When false, only the stored from→to orientation is traversed.
    pub bidirectional: bool,
    pub weight_property: Option<String>,
    pub algorithm: PathAlgorithm,
}

impl PathParams {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        PathParams {
            from: from.into(),
            to: to.into(),
            max_steps: None,
            connection_type: None,
            avoid_connection_type: None,
            bidirectional: true,
            weight_property: None,
            algorithm: PathAlgorithm::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathData {
    pub nodes: Vec<NodeId>,
    pub cost: f64,
    pub algorithm: String,
    /// Present when the heuristic selector made the choice.
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisKind {
    ConnectedComponents,
    CycleDetection,
    DiameterRadius,
    ClosenessCentrality,
    Bridges,
    ArticulationPoints,
    BetweennessCentrality,
    PageRank,
}

impl AnalysisKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisKind::ConnectedComponents => "connected_components",
            AnalysisKind::CycleDetection => "cycle_detection",
            AnalysisKind::DiameterRadius => "diameter_radius",
            AnalysisKind::ClosenessCentrality => "closeness_centrality",
            AnalysisKind::Bridges => "bridges",
            AnalysisKind::ArticulationPoints => "articulation_points",
            AnalysisKind::BetweennessCentrality => "betweenness_centrality",
            AnalysisKind::PageRank => "pagerank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisData {
    Components(Vec<Vec<NodeId>>),
    Cycles {
        has_cycle: bool,
        witnesses: Vec<Vec<NodeId>>,
    },
    DiameterRadius {
        diameter: Option<f64>,
        radius: Option<f64>,
    },
    /// `(node, score)` sorted by descending score.
    Centrality(Vec<(NodeId, f64)>),
    Bridges(Vec<EdgeId>),
    ArticulationPoints(Vec<NodeId>),
}

// ============================================================================
// Query results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryData {
    Nodes(Vec<NodeData>),
    Edges(Vec<EdgeData>),
    Scalar(Value),
    Batch(BatchSummary),
    Path(PathData),
    Analysis(AnalysisData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub data: Option<QueryData>,
}

impl QueryResult {
    pub fn ok(message: impl Into<String>, data: QueryData) -> Self {
        QueryResult {
            success: true,
            message: message.into(),
            error: None,
            data: Some(data),
        }
    }

    pub fn ok_empty(message: impl Into<String>) -> Self {
        QueryResult {
            success: true,
            message: message.into(),
            error: None,
            data: None,
        }
    }

    pub fn failure(error: &EngineError) -> Self {
        QueryResult {
            success: false,
            message: format!("query failed: {}", error),
            error: Some(error.to_string()),
            data: None,
        }
    }

    /// Failure that still carries a payload (e.g. partial batch outcomes).
    pub fn failure_with_data(error: &EngineError, data: QueryData) -> Self {
        QueryResult {
            success: false,
            message: format!("query failed: {}", error),
            error: Some(error.to_string()),
            data: Some(data),
        }
    }

    pub fn nodes(&self) -> Option<&[NodeData]> {
        match &self.data {
            Some(QueryData::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<&Value> {
        match &self.data {
            Some(QueryData::Scalar(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_single(key: &str, value: ConditionValue) -> (ConditionGroup, Condition) {
        let mut map = HashMap::new();
        map.insert(key.to_string(), value);
        let set = ConditionSet::decode(&map).unwrap();
        if let Some(c) = set.and_terms.into_iter().next() {
            (ConditionGroup::And, c)
        } else {
            (ConditionGroup::Or, set.or_terms.into_iter().next().unwrap())
        }
    }

    // ========================================================================
    // key decoding: groups, operators, disambiguators
    // ========================================================================

    #[test]
    fn test_decode_default_group_is_and() {
        let (group, cond) = decode_single("age_gt", Value::Int64(30).into());
        assert_eq!(group, ConditionGroup::And);
        assert_eq!(cond.property, "age");
        assert_eq!(
            cond.test,
            ConditionTest::Simple {
                op: SimpleOp::Gt,
                expected: Value::Int64(30)
            }
        );
    }

    #[test]
    fn test_decode_or_prefix() {
        let (group, cond) = decode_single("Or_status_eq", Value::String("open".into()).into());
        assert_eq!(group, ConditionGroup::Or);
        assert_eq!(cond.property, "status");
    }

    #[test]
    fn test_decode_property_with_underscores() {
        let (_, cond) = decode_single("first_name_starts_with", Value::String("Al".into()).into());
        assert_eq!(cond.property, "first_name");
        assert!(matches!(
            cond.test,
            ConditionTest::Simple {
                op: SimpleOp::StartsWith,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_trailing_disambiguator() {
        let (group, cond) = decode_single("Or_b_eq_2", Value::Int64(2).into());
        assert_eq!(group, ConditionGroup::Or);
        assert_eq!(cond.property, "b");
        assert_eq!(
            cond.test,
            ConditionTest::Simple {
                op: SimpleOp::Eq,
                expected: Value::Int64(2)
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_operator() {
        let mut map = HashMap::new();
        map.insert("age_wobble".to_string(), Value::Int64(1).into());
        assert!(ConditionSet::decode(&map).is_err());
    }

    // ========================================================================
    // key decoding: subquery operators
    // ========================================================================

    #[test]
    fn test_decode_in_with_subquery_value() {
        let nested = QueryDescriptor::find("Department");
        let (_, cond) = decode_single("department_in", nested.clone().into());
        assert_eq!(
            cond.test,
            ConditionTest::Nested {
                op: SubqueryOp::In,
                query: Box::new(nested)
            }
        );
    }

    #[test]
    fn test_decode_count_operator_embeds_literal() {
        let nested = QueryDescriptor::find("Order");
        let (_, cond) = decode_single("orders_count_gt_5", nested.into());
        assert!(matches!(
            cond.test,
            ConditionTest::Nested {
                op: SubqueryOp::Count(CmpOp::Gt, lit),
                ..
            } if (lit - 5.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_decode_aggregate_comparison() {
        let nested = QueryDescriptor::aggregate("Person", AggregateFunction::Avg, "age");
        let (_, cond) = decode_single("age_gt_aggregate", nested.into());
        assert!(matches!(
            cond.test,
            ConditionTest::Nested {
                op: SubqueryOp::AggregateCmp(CmpOp::Gt),
                ..
            }
        ));
    }

    #[test]
    fn test_decode_subquery_operator_rejects_plain_literal() {
        let mut map = HashMap::new();
        map.insert("dept_in".to_string(), Value::Int64(3).into());
        assert!(ConditionSet::decode(&map).is_err());
    }

    #[test]
    fn test_decode_raw_query_string_value() {
        let (_, cond) = decode_single(
            "department_in",
            Value::String("find Department where budget_gt 1000".into()).into(),
        );
        assert!(matches!(cond.test, ConditionTest::NestedRaw { op: SubqueryOp::In, .. }));
    }

    #[test]
    fn test_decode_eq_with_subquery_becomes_aggregate_compare() {
        let nested = QueryDescriptor::aggregate("Person", AggregateFunction::Max, "age");
        let (_, cond) = decode_single("age_eq", nested.into());
        assert!(matches!(
            cond.test,
            ConditionTest::Nested {
                op: SubqueryOp::AggregateCmp(CmpOp::Eq),
                ..
            }
        ));
    }

    // ========================================================================
    // embedded call syntax
    // ========================================================================

    #[test]
    fn test_decode_substring_call() {
        let (_, cond) = decode_single(
            "name_substring",
            Value::String("substring(0,3)\"Ali\"".into()).into(),
        );
        assert_eq!(
            cond.test,
            ConditionTest::Simple {
                op: SimpleOp::Substring {
                    start: 0,
                    end: Some(3)
                },
                expected: Value::String("Ali".into())
            }
        );
    }

    #[test]
    fn test_decode_replace_call() {
        let (_, cond) = decode_single(
            "code_replace",
            Value::String("replace(-, ,1)\"A B-C\"".into()).into(),
        );
        assert_eq!(
            cond.test,
            ConditionTest::Simple {
                op: SimpleOp::Replace {
                    old: "-".into(),
                    new: String::new(),
                    count: Some(1)
                },
                expected: Value::String("A B-C".into())
            }
        );
    }

    #[test]
    fn test_decode_malformed_call_is_rejected() {
        let mut map = HashMap::new();
        map.insert(
            "name_substring".to_string(),
            ConditionValue::Literal(Value::String("substring(0,3".into())),
        );
        assert!(ConditionSet::decode(&map).is_err());
    }

    // ========================================================================
    // misc
    // ========================================================================

    #[test]
    fn test_looks_like_query() {
        assert!(looks_like_query("find Person where age_gt 30"));
        assert!(looks_like_query("  COUNT Department"));
        assert!(!looks_like_query("engineering"));
    }

    #[test]
    fn test_batch_metrics_rollup() {
        let results = vec![
            BatchOperationResult::ok("created", 2.0, Some(1)),
            BatchOperationResult::failed("boom", 4.0, None),
        ];
        let metrics = BatchMetrics::from_results(&results);
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.failed, 1);
        assert!((metrics.total_ms - 6.0).abs() < 1e-9);
        assert!((metrics.average_ms - 3.0).abs() < 1e-9);
    }
}
