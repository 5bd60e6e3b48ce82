// src/graph/mod.rs
use crate::datatypes::values::{compare_values, Value};
use crate::error::EngineError;
use crate::graph::graph_algorithms::AlgorithmCache;
use crate::graph::query::{
    ConditionSet, QueryData, QueryDescriptor, QueryParser, QueryResult, QueryType,
};
use crate::graph::reporting::{MetricsSnapshot, PerformanceMetrics};
use crate::graph::schema::{GraphStore, MemoryGraph, NodeData};
use crate::graph::subqueries::{EvalContext, QueryExecutor};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub mod aggregations;
pub mod batch_operations;
pub mod graph_algorithms;
pub mod predicates;
pub mod query;
pub mod reporting;
pub mod schema;
pub mod subqueries;

/// Engine tunables. Plain defaulted fields: this core is a library, so
/// configuration arrives through the constructor, not files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard ceiling on the estimated size of one batch.
    pub batch_ceiling: usize,
    /// Node count for an unqualified batch-create.
    pub default_create_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_ceiling: 10_000,
            default_create_count: 3,
        }
    }
}

/// Query-execution engine over a `GraphStore` collaborator.
///
/// One entry point per query kind, all funneled through [`execute`].
/// The engine owns its algorithm cache and performance counters; nothing is
/// global, so independent engines never share state. It is also its own
/// [`QueryExecutor`]: subqueries re-enter through that trait.
///
/// [`execute`]: QueryEngine::execute
pub struct QueryEngine<S: GraphStore = MemoryGraph> {
    store: Arc<S>,
    parser: Option<Arc<dyn QueryParser>>,
    config: EngineConfig,
    algorithm_cache: AlgorithmCache,
    metrics: PerformanceMetrics,
}

impl QueryEngine<MemoryGraph> {
    /// Engine over a fresh in-memory graph.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryGraph::new()))
    }
}

impl Default for QueryEngine<MemoryGraph> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphStore> QueryEngine<S> {
    pub fn with_store(store: Arc<S>) -> Self {
        QueryEngine {
            store,
            parser: None,
            config: EngineConfig::default(),
            algorithm_cache: AlgorithmCache::new(),
            metrics: PerformanceMetrics::new(),
        }
    }

    /// Install the parser collaborator used for raw-string subqueries.
    pub fn with_parser(mut self, parser: Arc<dyn QueryParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Execute one top-level query. Builds a fresh evaluation context, so
    /// subquery memoization never leaks between independent queries.
    pub fn execute(&self, query: &QueryDescriptor) -> QueryResult {
        let started = Instant::now();
        let ctx = EvalContext::new(self, self.parser.as_deref());
        let result = self.dispatch(query, &ctx);
        self.metrics.record_operation(started.elapsed());
        debug!(kind = ?query.query_type, success = result.success, "query executed");
        result
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop every cached algorithm result.
    pub fn clear_cache(&self) {
        self.algorithm_cache.clear();
    }

    fn dispatch(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        match query.query_type {
            QueryType::Find => self.execute_find(query, ctx),
            QueryType::Count => self.execute_count(query, ctx),
            QueryType::Create => self.execute_create(query),
            QueryType::Update => self.execute_update(query, ctx),
            QueryType::Delete => self.execute_delete(query, ctx),
            QueryType::Aggregate => self.execute_aggregate(query, ctx),
            QueryType::Batch => {
                batch_operations::run_batch(self.store.as_ref(), query, ctx, &self.config)
            }
            QueryType::Path => self.execute_path(query),
            QueryType::Analysis => self.execute_analysis(query),
        }
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    fn matching_nodes(
        &self,
        query: &QueryDescriptor,
        ctx: &EvalContext<'_>,
    ) -> Result<Vec<NodeData>, EngineError> {
        let conditions = ConditionSet::decode(&query.conditions)?;
        let candidates = match query.label.as_deref() {
            Some(label) => self.store.nodes_by_label(label),
            None => self.store.all_nodes(),
        };
        let mut matched: Vec<NodeData> = candidates
            .into_iter()
            .filter(|node| predicates::evaluate(&node.properties, &conditions, ctx))
            .collect();
        matched.sort_by_key(|n| n.id);
        Ok(matched)
    }

    fn execute_find(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        let mut matched = match self.matching_nodes(query, ctx) {
            Ok(nodes) => nodes,
            Err(err) => return QueryResult::failure(&err),
        };
        if !query.sort.is_empty() {
            sort_nodes(&mut matched, &query.sort);
        }
        if let Some(offset) = query.offset {
            matched.drain(..offset.min(matched.len()));
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        QueryResult::ok(
            format!("found {} node(s)", matched.len()),
            QueryData::Nodes(matched),
        )
    }

    fn execute_count(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        match self.matching_nodes(query, ctx) {
            Ok(nodes) => QueryResult::ok(
                format!("counted {} node(s)", nodes.len()),
                QueryData::Scalar(Value::Int64(nodes.len() as i64)),
            ),
            Err(err) => QueryResult::failure(&err),
        }
    }

    fn execute_aggregate(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        let Some(spec) = &query.aggregate else {
            return QueryResult::failure(&EngineError::Validation(
                "aggregate query carries no function/property".into(),
            ));
        };
        let conditions = match ConditionSet::decode(&query.conditions) {
            Ok(set) => set,
            Err(err) => return QueryResult::failure(&err),
        };
        let outcome = match &query.edge_filter {
            Some(filter) => aggregations::aggregate_edges(
                self.store.as_ref(),
                filter,
                &conditions,
                spec.function,
                &spec.property,
                ctx,
            ),
            None => aggregations::aggregate_nodes(
                self.store.as_ref(),
                query.label.as_deref(),
                &conditions,
                spec.function,
                &spec.property,
                ctx,
            ),
        };
        match outcome.value {
            // "No value" (avg/min/max over nothing) is an absent payload,
            // deliberately distinguishable from a zero scalar.
            Some(value) => QueryResult::ok(outcome.message, QueryData::Scalar(value)),
            None => QueryResult::ok_empty(outcome.message),
        }
    }

    // ========================================================================
    // Mutation paths
    // ========================================================================

    fn execute_create(&self, query: &QueryDescriptor) -> QueryResult {
        let Some(label) = query.label.as_deref() else {
            return QueryResult::failure(&EngineError::Validation(
                "create query requires a label".into(),
            ));
        };
        let id = self
            .store
            .add_node(NodeData::new(label, query.properties.clone()));
        match self.store.node(id) {
            Some(node) => QueryResult::ok(
                format!("created {} node {}", label, id),
                QueryData::Nodes(vec![node]),
            ),
            None => QueryResult::failure(&EngineError::NotFound(format!("created node {}", id))),
        }
    }

    fn execute_update(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        if query.properties.is_empty() {
            return QueryResult::failure(&EngineError::Validation(
                "update query requires at least one property to set".into(),
            ));
        }
        let matched = match self.matching_nodes(query, ctx) {
            Ok(nodes) => nodes,
            Err(err) => return QueryResult::failure(&err),
        };
        let mut updated = Vec::with_capacity(matched.len());
        for node in &matched {
            if self
                .store
                .update_node_properties(node.id, query.properties.clone())
            {
                if let Some(fresh) = self.store.node(node.id) {
                    updated.push(fresh);
                }
            }
        }
        QueryResult::ok(
            format!("updated {} node(s)", updated.len()),
            QueryData::Nodes(updated),
        )
    }

    fn execute_delete(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        let matched = match self.matching_nodes(query, ctx) {
            Ok(nodes) => nodes,
            Err(err) => return QueryResult::failure(&err),
        };
        let mut deleted = 0i64;
        for node in &matched {
            // Touching edges go first, then the node.
            for edge in self.store.edges_for_node(node.id) {
                self.store.remove_edge(edge.id);
            }
            if self.store.remove_node(node.id) {
                deleted += 1;
            }
        }
        QueryResult::ok(
            format!("deleted {} node(s)", deleted),
            QueryData::Scalar(Value::Int64(deleted)),
        )
    }

    // ========================================================================
    // Structural queries
    // ========================================================================

    fn execute_path(&self, query: &QueryDescriptor) -> QueryResult {
        let Some(params) = &query.path else {
            return QueryResult::failure(&EngineError::Unsupported(
                "path query carries no path parameters".into(),
            ));
        };
        match graph_algorithms::run_path(
            self.store.as_ref(),
            params,
            &self.algorithm_cache,
            &self.metrics,
        ) {
            Ok(path) => {
                let message = if path.nodes.is_empty() {
                    format!("no path between '{}' and '{}'", params.from, params.to)
                } else {
                    format!(
                        "path with {} node(s), cost {} ({})",
                        path.nodes.len(),
                        path.cost,
                        path.algorithm
                    )
                };
                QueryResult::ok(message, QueryData::Path(path))
            }
            Err(err) => QueryResult::failure(&err),
        }
    }

    /// An analysis descriptor may name the edge property to use as weight in
    /// its `weight_property` write-property.
    fn execute_analysis(&self, query: &QueryDescriptor) -> QueryResult {
        let Some(kind) = query.analysis else {
            return QueryResult::failure(&EngineError::Unsupported(
                "analysis query carries no analysis kind".into(),
            ));
        };
        let weight = query
            .properties
            .get("weight_property")
            .and_then(|v| v.as_str());
        match graph_algorithms::run_analysis(
            self.store.as_ref(),
            kind,
            weight,
            &self.algorithm_cache,
            &self.metrics,
        ) {
            Ok(data) => QueryResult::ok(format!("{} computed", kind.name()), QueryData::Analysis(data)),
            Err(err) => QueryResult::failure(&err),
        }
    }
}

impl<S: GraphStore> QueryExecutor for QueryEngine<S> {
    fn run_query(&self, query: &QueryDescriptor, ctx: &EvalContext<'_>) -> QueryResult {
        self.dispatch(query, ctx)
    }
}

/// Stable multi-key sort; a missing property sorts before any present value.
fn sort_nodes(nodes: &mut [NodeData], sort: &[(String, bool)]) {
    nodes.sort_by(|a, b| {
        for (field, ascending) in sort {
            let ordering = match (a.property(field), b.property(field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::query::{
        AggregateFunction, AnalysisKind, BatchKind, PathParams, QueryParser,
    };
    use std::collections::HashMap;

    fn props(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn seeded_engine() -> QueryEngine {
        let engine = QueryEngine::new();
        let store = engine.store();
        for (name, dept, age) in [
            ("Alice", "Engineering", 35),
            ("Bob", "Engineering", 28),
            ("Carol", "Sales", 41),
            ("Dave", "Support", 23),
        ] {
            store.add_node(NodeData::new(
                "Person",
                props(&[
                    ("name", Value::String(name.into())),
                    ("department", Value::String(dept.into())),
                    ("age", Value::Int64(age)),
                ]),
            ));
        }
        for (name, budget) in [("Engineering", 5000), ("Sales", 800), ("Support", 1200)] {
            store.add_node(NodeData::new(
                "Department",
                props(&[
                    ("name", Value::String(name.into())),
                    ("budget", Value::Int64(budget)),
                ]),
            ));
        }
        engine
    }

    fn names_of(result: &QueryResult) -> Vec<String> {
        result
            .nodes()
            .unwrap()
            .iter()
            .map(|n| match n.property("name") {
                Some(Value::String(s)) => s.clone(),
                other => panic!("node without name: {:?}", other),
            })
            .collect()
    }

    // ========================================================================
    // find / count / pagination
    // ========================================================================

    #[test]
    fn test_find_with_conditions_and_sort() {
        let engine = seeded_engine();
        let query = QueryDescriptor::find("Person")
            .with_condition("age_gt", Value::Int64(25))
            .with_sort("age", false);
        let result = engine.execute(&query);
        assert!(result.success);
        assert_eq!(names_of(&result), vec!["Carol", "Alice", "Bob"]);
    }

    #[test]
    fn test_find_pagination() {
        let engine = seeded_engine();
        let query = QueryDescriptor::find("Person")
            .with_sort("age", true)
            .with_offset(1)
            .with_limit(2);
        let result = engine.execute(&query);
        assert_eq!(names_of(&result), vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_find_unknown_label_is_empty_success() {
        let engine = seeded_engine();
        let result = engine.execute(&QueryDescriptor::find("Robot"));
        assert!(result.success);
        assert!(result.nodes().unwrap().is_empty());
    }

    #[test]
    fn test_count_matches_find() {
        let engine = seeded_engine();
        let query = QueryDescriptor::count("Person").with_condition(
            "department_eq",
            Value::String("engineering".into()),
        );
        let result = engine.execute(&query);
        assert_eq!(result.scalar(), Some(&Value::Int64(2)));
    }

    // ========================================================================
    // mutations
    // ========================================================================

    #[test]
    fn test_create_update_delete_lifecycle() {
        let engine = QueryEngine::new();
        let created = engine.execute(
            &QueryDescriptor::create("Task").with_property("status", Value::String("open".into())),
        );
        assert!(created.success);
        let id = created.nodes().unwrap()[0].id;

        let updated = engine.execute(
            &QueryDescriptor::update("Task")
                .with_condition("status_eq", Value::String("open".into()))
                .with_property("status", Value::String("done".into())),
        );
        assert!(updated.success);
        assert_eq!(
            updated.nodes().unwrap()[0].property("status"),
            Some(&Value::String("done".into()))
        );

        let deleted = engine.execute(
            &QueryDescriptor::delete("Task")
                .with_condition("status_eq", Value::String("done".into())),
        );
        assert_eq!(deleted.scalar(), Some(&Value::Int64(1)));
        assert!(engine.store().node(id).is_none());
    }

    #[test]
    fn test_update_without_properties_is_validation_error() {
        let engine = seeded_engine();
        let result = engine.execute(&QueryDescriptor::update("Person"));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("validation"));
    }

    // ========================================================================
    // aggregation
    // ========================================================================

    #[test]
    fn test_aggregate_through_dispatcher() {
        let engine = seeded_engine();
        let result = engine.execute(&QueryDescriptor::aggregate(
            "Person",
            AggregateFunction::Avg,
            "age",
        ));
        assert!(result.success);
        assert_eq!(result.scalar(), Some(&Value::Float64(31.75)));
    }

    #[test]
    fn test_aggregate_no_value_has_absent_payload() {
        let engine = seeded_engine();
        let result = engine.execute(&QueryDescriptor::aggregate(
            "Robot",
            AggregateFunction::Min,
            "age",
        ));
        assert!(result.success);
        assert!(result.data.is_none(), "no value is not the same as zero");

        let result = engine.execute(&QueryDescriptor::aggregate(
            "Robot",
            AggregateFunction::Sum,
            "age",
        ));
        assert_eq!(result.scalar(), Some(&Value::Float64(0.0)));
    }

    // ========================================================================
    // subqueries through the full engine
    // ========================================================================

    #[test]
    fn test_subquery_in_selects_by_nested_result() {
        let engine = seeded_engine();
        // People whose department appears among departments with budget > 1000.
        let nested = QueryDescriptor::find("Department")
            .with_condition("budget_gt", Value::Int64(1000))
            .with_projection("name");
        let query = QueryDescriptor::find("Person")
            .with_condition("department_in", nested)
            .with_sort("name", true);
        let result = engine.execute(&query);
        assert_eq!(names_of(&result), vec!["Alice", "Bob", "Dave"]);
    }

    #[test]
    fn test_subquery_aggregate_comparison() {
        let engine = seeded_engine();
        // People older than the average age.
        let nested = QueryDescriptor::aggregate("Person", AggregateFunction::Avg, "age");
        let query = QueryDescriptor::find("Person")
            .with_condition("age_gt_aggregate", nested)
            .with_sort("name", true);
        let result = engine.execute(&query);
        assert_eq!(names_of(&result), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_subquery_not_exists() {
        let engine = seeded_engine();
        let nested = QueryDescriptor::find("Department")
            .with_condition("budget_gt", Value::Int64(999_999))
            .with_projection("name");
        let query = QueryDescriptor::find("Person").with_condition("name_not_exists", nested);
        let result = engine.execute(&query);
        assert_eq!(result.nodes().unwrap().len(), 4, "no rich departments exist");
    }

    #[test]
    fn test_raw_string_subquery_uses_parser() {
        struct CannedParser;
        impl QueryParser for CannedParser {
            fn parse(&self, text: &str) -> Result<QueryDescriptor, EngineError> {
                assert!(text.starts_with("find Department"));
                Ok(QueryDescriptor::find("Department")
                    .with_condition("budget_gt", Value::Int64(1000))
                    .with_projection("name"))
            }
        }
        let engine = seeded_engine().with_parser(Arc::new(CannedParser));
        let query = QueryDescriptor::find("Person").with_condition(
            "department_in",
            Value::String("find Department where budget_gt 1000".into()),
        );
        let result = engine.execute(&query);
        assert_eq!(result.nodes().unwrap().len(), 3);
    }

    // ========================================================================
    // batch, path, analysis smoke through the dispatcher
    // ========================================================================

    #[test]
    fn test_batch_through_dispatcher() {
        let engine = QueryEngine::new();
        let query = QueryDescriptor::batch(BatchKind::Create)
            .with_label("Widget")
            .with_property("count", Value::Int64(2));
        let result = engine.execute(&query);
        assert!(result.success);
        assert_eq!(engine.store().node_count(), 2);
    }

    #[test]
    fn test_path_and_metrics_through_dispatcher() {
        let engine = QueryEngine::new();
        let store = engine.store();
        let a = store.add_node(NodeData::new("City", props(&[("name", Value::String("A".into()))])));
        let b = store.add_node(NodeData::new("City", props(&[("name", Value::String("B".into()))])));
        store
            .add_edge(crate::graph::schema::EdgeData::new("road", a, b, HashMap::new()))
            .unwrap();

        let query = QueryDescriptor::path(PathParams::new("A", "B"));
        let result = engine.execute(&query);
        assert!(result.success);
        let Some(QueryData::Path(path)) = &result.data else {
            panic!("expected path payload")
        };
        assert_eq!(path.nodes, vec![a, b]);

        // Second run hits the cache; the snapshot reflects both lookups.
        engine.execute(&query);
        let snapshot = engine.metrics_snapshot();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.cache_lookups, 2);
        assert!(snapshot.cache_hit_rate > 0.0);
        assert!(snapshot.algorithms.iter().any(|a| a.algorithm == "dijkstra"));

        engine.clear_cache();
    }

    #[test]
    fn test_analysis_through_dispatcher() {
        let engine = seeded_engine();
        let result = engine.execute(&QueryDescriptor::analysis(AnalysisKind::ConnectedComponents));
        assert!(result.success);
        let Some(QueryData::Analysis(crate::graph::query::AnalysisData::Components(components))) =
            &result.data
        else {
            panic!("expected components payload")
        };
        // Seven isolated nodes, seven singleton components.
        assert_eq!(components.len(), 7);
    }

    #[test]
    fn test_missing_sections_are_structured_errors() {
        let engine = QueryEngine::new();
        let result = engine.execute(&QueryDescriptor::new(QueryType::Path));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unsupported"));

        let result = engine.execute(&QueryDescriptor::new(QueryType::Aggregate));
        assert!(!result.success);
    }
}
