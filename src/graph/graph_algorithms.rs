// src/graph/graph_algorithms.rs
//! Graph algorithms module providing path finding and connectivity analysis.
//!
//! Every operation runs against a point-in-time view of the store and is
//! memoized in a version-stamped cache: an entry computed at store version V
//! is served only while the store still reports V, so mutations invalidate
//! results without a full cache sweep.

use crate::datatypes::values::{values_equal, Value};
use crate::error::EngineError;
use crate::graph::query::{AnalysisData, AnalysisKind, PathAlgorithm, PathData, PathParams};
use crate::graph::reporting::PerformanceMetrics;
use crate::graph::schema::{EdgeData, GraphStore, NodeData, NodeId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Instant;
use tracing::debug;

// ============================================================================
// Graph view
// ============================================================================

/// Dense snapshot of the store used by one algorithm run: nodes and edges by
/// position, adjacency as `(neighbor, edge)` index pairs.
struct GraphView {
    nodes: Vec<NodeData>,
    index_of: HashMap<NodeId, usize>,
    edges: Vec<EdgeData>,
    adj: Vec<Vec<(usize, usize)>>,
}

impl GraphView {
    fn build<S: GraphStore>(store: &S) -> Self {
        Self::build_filtered(store, None, None, true)
    }

    fn build_filtered<S: GraphStore>(
        store: &S,
        connection_type: Option<&str>,
        avoid_connection_type: Option<&str>,
        bidirectional: bool,
    ) -> Self {
        let nodes = store.all_nodes();
        let index_of: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let edges: Vec<EdgeData> = store
            .all_edges()
            .into_iter()
            .filter(|e| {
                connection_type.map_or(true, |t| e.connection_type.eq_ignore_ascii_case(t))
                    && avoid_connection_type
                        .map_or(true, |t| !e.connection_type.eq_ignore_ascii_case(t))
            })
            .collect();

        let mut adj = vec![Vec::new(); nodes.len()];
        for (edge_ix, edge) in edges.iter().enumerate() {
            let (Some(&from), Some(&to)) =
                (index_of.get(&edge.from_node), index_of.get(&edge.to_node))
            else {
                // Endpoint vanished mid-batch; skip rather than panic.
                continue;
            };
            adj[from].push((to, edge_ix));
            if bidirectional && from != to {
                adj[to].push((from, edge_ix));
            }
        }

        GraphView {
            nodes,
            index_of,
            edges,
            adj,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn weight(&self, edge_ix: usize, weight_property: Option<&str>) -> f64 {
        weight_property
            .and_then(|p| self.edges[edge_ix].property(p))
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
    }

    fn node_ids(&self, indices: &[usize]) -> Vec<NodeId> {
        indices.iter().map(|&i| self.nodes[i].id).collect()
    }
}

// ============================================================================
// Path finding
// ============================================================================

/// Classic array-scan Dijkstra: pick the unvisited minimum each round, stop
/// early on reaching the target, reconstruct through predecessor links.
/// `max_steps` bounds the path length in edges.
fn dijkstra(
    view: &GraphView,
    source: usize,
    target: usize,
    weight_property: Option<&str>,
    max_steps: Option<usize>,
) -> Option<(Vec<usize>, f64)> {
    let n = view.len();
    let mut dist = vec![f64::INFINITY; n];
    let mut steps = vec![0usize; n];
    let mut prev = vec![usize::MAX; n];
    let mut visited = vec![false; n];
    dist[source] = 0.0;

    loop {
        let mut current = None;
        let mut best = f64::INFINITY;
        for i in 0..n {
            if !visited[i] && dist[i] < best {
                best = dist[i];
                current = Some(i);
            }
        }
        let Some(u) = current else { break };
        if u == target {
            break;
        }
        visited[u] = true;

        for &(v, edge_ix) in &view.adj[u] {
            if visited[v] {
                continue;
            }
            if let Some(max) = max_steps {
                if steps[u] + 1 > max {
                    continue;
                }
            }
            let candidate = dist[u] + view.weight(edge_ix, weight_property);
            if candidate < dist[v] {
                dist[v] = candidate;
                prev[v] = u;
                steps[v] = steps[u] + 1;
            }
        }
    }

    if dist[target].is_finite() {
        Some((reconstruct(&prev, source, target), dist[target]))
    } else {
        None
    }
}

fn reconstruct(prev: &[usize], source: usize, target: usize) -> Vec<usize> {
    let mut path = vec![target];
    let mut current = target;
    while current != source {
        current = prev[current];
        path.push(current);
    }
    path.reverse();
    path
}

/// Min-heap entry ordered by `f = g + h`.
struct HeapEntry {
    f: f64,
    node: usize,
    steps: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest f on top.
        other.f.partial_cmp(&self.f).unwrap_or(Ordering::Equal)
    }
}

/// Mean of a node's numeric property values; the A* heuristic is the
/// absolute difference of the two endpoint means, or 1 when either side has
/// no numeric properties.
fn numeric_mean(node: &NodeData) -> Option<f64> {
    let numerics: Vec<f64> = node.properties.values().filter_map(|v| v.as_f64()).collect();
    if numerics.is_empty() {
        None
    } else {
        Some(numerics.iter().sum::<f64>() / numerics.len() as f64)
    }
}

fn astar(
    view: &GraphView,
    source: usize,
    target: usize,
    weight_property: Option<&str>,
    max_steps: Option<usize>,
) -> Option<(Vec<usize>, f64)> {
    let n = view.len();
    let target_mean = numeric_mean(&view.nodes[target]);
    let heuristic = |ix: usize| -> f64 {
        match (numeric_mean(&view.nodes[ix]), target_mean) {
            (Some(a), Some(b)) => (a - b).abs(),
            _ => 1.0,
        }
    };

    let mut g = vec![f64::INFINITY; n];
    let mut prev = vec![usize::MAX; n];
    let mut heap = BinaryHeap::new();
    g[source] = 0.0;
    heap.push(HeapEntry {
        f: heuristic(source),
        node: source,
        steps: 0,
    });

    while let Some(HeapEntry { node: u, steps, .. }) = heap.pop() {
        if u == target {
            return Some((reconstruct(&prev, source, target), g[target]));
        }
        if let Some(max) = max_steps {
            if steps >= max {
                continue;
            }
        }
        for &(v, edge_ix) in &view.adj[u] {
            let candidate = g[u] + view.weight(edge_ix, weight_property);
            if candidate < g[v] {
                g[v] = candidate;
                prev[v] = u;
                heap.push(HeapEntry {
                    f: candidate + heuristic(v),
                    node: v,
                    steps: steps + 1,
                });
            }
        }
    }
    None
}

// ============================================================================
// All-pairs distances and derived measures
// ============================================================================

/// Standard triple-loop Floyd–Warshall over the undirected weight
/// interpretation: an edge sets both directions.
fn floyd_warshall(view: &GraphView, weight_property: Option<&str>) -> Vec<Vec<f64>> {
    let n = view.len();
    let mut dist = vec![vec![f64::INFINITY; n]; n];
    for (i, row) in dist.iter_mut().enumerate() {
        row[i] = 0.0;
    }
    for (edge_ix, edge) in view.edges.iter().enumerate() {
        let (Some(&u), Some(&v)) = (
            view.index_of.get(&edge.from_node),
            view.index_of.get(&edge.to_node),
        ) else {
            continue;
        };
        let w = view.weight(edge_ix, weight_property);
        if w < dist[u][v] {
            dist[u][v] = w;
            dist[v][u] = w;
        }
    }
    for k in 0..n {
        for i in 0..n {
            if dist[i][k].is_infinite() {
                continue;
            }
            for j in 0..n {
                let through_k = dist[i][k] + dist[k][j];
                if through_k < dist[i][j] {
                    dist[i][j] = through_k;
                }
            }
        }
    }
    dist
}

fn diameter_radius(matrix: &[Vec<f64>]) -> (Option<f64>, Option<f64>) {
    let n = matrix.len();
    let mut diameter: Option<f64> = None;
    let mut radius: Option<f64> = None;
    for i in 0..n {
        let mut eccentricity: Option<f64> = None;
        for j in 0..n {
            if i == j || matrix[i][j].is_infinite() {
                continue;
            }
            let d = matrix[i][j];
            eccentricity = Some(eccentricity.map_or(d, |e| e.max(d)));
            diameter = Some(diameter.map_or(d, |cur| cur.max(d)));
        }
        if let Some(e) = eccentricity {
            radius = Some(radius.map_or(e, |cur| cur.min(e)));
        }
    }
    (diameter, radius)
}

/// Closeness per node: `peers / Σ finite distances`, zero for nodes with at
/// most one reachable peer. Sorted by descending score.
fn closeness_centrality(view: &GraphView, matrix: &[Vec<f64>]) -> Vec<(NodeId, f64)> {
    let n = matrix.len();
    let mut scores: Vec<(NodeId, f64)> = (0..n)
        .map(|i| {
            let mut peers = 0usize;
            let mut total = 0.0;
            for j in 0..n {
                if i != j && matrix[i][j].is_finite() {
                    peers += 1;
                    total += matrix[i][j];
                }
            }
            let score = if peers <= 1 || total <= 0.0 {
                0.0
            } else {
                peers as f64 / total
            };
            (view.nodes[i].id, score)
        })
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scores
}

// ============================================================================
// Connectivity
// ============================================================================

/// Undirected BFS partition of all nodes, largest component first.
fn connected_components(view: &GraphView) -> Vec<Vec<usize>> {
    let n = view.len();
    let mut visited = vec![false; n];
    let mut components = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;
        while let Some(u) = queue.pop_front() {
            component.push(u);
            for &(v, _) in &view.adj[u] {
                if !visited[v] {
                    visited[v] = true;
                    queue.push_back(v);
                }
            }
        }
        components.push(component);
    }

    components.sort_by_key(|c| std::cmp::Reverse(c.len()));
    components
}

/// Component count with one edge or one node (and its incident edges)
/// removed. The remove → recount → restore cut tests run on top of this.
fn component_count_excluding(
    view: &GraphView,
    skip_edge: Option<usize>,
    skip_node: Option<usize>,
) -> usize {
    let n = view.len();
    let mut visited = vec![false; n];
    if let Some(skip) = skip_node {
        visited[skip] = true; // never enter it
    }
    let mut count = 0;

    for start in 0..n {
        if visited[start] {
            continue;
        }
        count += 1;
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;
        while let Some(u) = queue.pop_front() {
            for &(v, edge_ix) in &view.adj[u] {
                if Some(edge_ix) == skip_edge || visited[v] {
                    continue;
                }
                visited[v] = true;
                queue.push_back(v);
            }
        }
    }
    count
}

/// An edge is a bridge iff removing it increases the component count.
/// Intentionally the O(E) recount per edge, not Tarjan's linear pass.
fn bridges(view: &GraphView) -> Vec<usize> {
    let base = connected_components(view).len();
    (0..view.edges.len())
        .filter(|&edge_ix| component_count_excluding(view, Some(edge_ix), None) > base)
        .collect()
}

/// Same remove/recount/restore pattern applied to nodes.
fn articulation_points(view: &GraphView) -> Vec<usize> {
    let base = connected_components(view).len();
    (0..view.len())
        .filter(|&node_ix| component_count_excluding(view, None, Some(node_ix)) > base)
        .collect()
}

/// Per-component DFS with a recursion-stack set; reports one witness cycle
/// for each component that contains one. The tree edge back to the parent is
/// skipped by edge index, so parallel edges do register as cycles.
fn detect_cycles(view: &GraphView) -> Vec<Vec<usize>> {
    let n = view.len();
    let mut visited = vec![false; n];
    let mut witnesses = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut on_stack = vec![false; n];
        let mut path = Vec::new();
        if let Some(witness) =
            dfs_cycle(view, start, usize::MAX, &mut visited, &mut on_stack, &mut path)
        {
            witnesses.push(witness);
            // One witness per component: mark the rest of it visited.
            flood_mark(view, start, &mut visited);
        }
    }
    witnesses
}

fn dfs_cycle(
    view: &GraphView,
    u: usize,
    via_edge: usize,
    visited: &mut Vec<bool>,
    on_stack: &mut Vec<bool>,
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    visited[u] = true;
    on_stack[u] = true;
    path.push(u);

    for &(v, edge_ix) in &view.adj[u] {
        if edge_ix == via_edge {
            continue;
        }
        if on_stack[v] {
            let pos = path.iter().position(|&x| x == v).unwrap_or(0);
            return Some(path[pos..].to_vec());
        }
        if !visited[v] {
            if let Some(witness) = dfs_cycle(view, v, edge_ix, visited, on_stack, path) {
                return Some(witness);
            }
        }
    }

    on_stack[u] = false;
    path.pop();
    None
}

fn flood_mark(view: &GraphView, start: usize, visited: &mut [bool]) {
    let mut queue = VecDeque::new();
    queue.push_back(start);
    while let Some(u) = queue.pop_front() {
        for &(v, _) in &view.adj[u] {
            if !visited[v] {
                visited[v] = true;
                queue.push_back(v);
            }
        }
    }
}

// ============================================================================
// Centrality supplements
// ============================================================================

/// Brandes' betweenness over the undirected view, unnormalized, sorted by
/// descending score.
fn betweenness_centrality(view: &GraphView) -> Vec<(NodeId, f64)> {
    let n = view.len();
    if n <= 2 {
        return view.nodes.iter().map(|node| (node.id, 0.0)).collect();
    }

    let mut betweenness = vec![0.0f64; n];
    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut pred: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut queue: VecDeque<usize> = VecDeque::with_capacity(n);

    for s in 0..n {
        stack.clear();
        queue.clear();
        for i in 0..n {
            pred[i].clear();
            sigma[i] = 0.0;
            dist[i] = -1;
            delta[i] = 0.0;
        }

        sigma[s] = 1.0;
        dist[s] = 0;
        queue.push_back(s);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let v_dist = dist[v];
            for &(w, _) in &view.adj[v] {
                if dist[w] < 0 {
                    dist[w] = v_dist + 1;
                    queue.push_back(w);
                }
                if dist[w] == v_dist + 1 {
                    sigma[w] += sigma[v];
                    pred[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &pred[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                betweenness[w] += delta[w];
            }
        }
    }

    // Each undirected shortest path was counted from both endpoints.
    let mut results: Vec<(NodeId, f64)> = view
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, betweenness[i] / 2.0))
        .collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    results
}

const PAGERANK_DAMPING: f64 = 0.85;
const PAGERANK_MAX_ITERATIONS: usize = 100;
const PAGERANK_TOLERANCE: f64 = 1e-6;

fn pagerank(view: &GraphView) -> Vec<(NodeId, f64)> {
    let n = view.len();
    if n == 0 {
        return Vec::new();
    }
    let mut rank = vec![1.0 / n as f64; n];
    let mut next = vec![0.0f64; n];

    for _ in 0..PAGERANK_MAX_ITERATIONS {
        let dangling: f64 = (0..n)
            .filter(|&i| view.adj[i].is_empty())
            .map(|i| rank[i])
            .sum();
        let base = (1.0 - PAGERANK_DAMPING) / n as f64 + PAGERANK_DAMPING * dangling / n as f64;
        for slot in next.iter_mut() {
            *slot = base;
        }
        for u in 0..n {
            let degree = view.adj[u].len();
            if degree == 0 {
                continue;
            }
            let share = PAGERANK_DAMPING * rank[u] / degree as f64;
            for &(v, _) in &view.adj[u] {
                next[v] += share;
            }
        }
        let drift: f64 = rank.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut rank, &mut next);
        if drift < PAGERANK_TOLERANCE {
            break;
        }
    }

    let mut results: Vec<(NodeId, f64)> = view
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, rank[i]))
        .collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    results
}

// ============================================================================
// Heuristic algorithm selection
// ============================================================================

/// Density/size-based choice between Dijkstra and A*. The rationale string
/// travels with the result for observability.
fn choose_algorithm(node_count: usize, edge_count: usize) -> (PathAlgorithm, String) {
    if node_count < 100 {
        return (
            PathAlgorithm::Dijkstra,
            format!("dijkstra: small graph ({} nodes)", node_count),
        );
    }
    let possible_pairs = (node_count * (node_count - 1)) / 2;
    let density = if possible_pairs > 0 {
        edge_count as f64 / possible_pairs as f64
    } else {
        0.0
    };
    let avg_degree = if node_count > 0 {
        2.0 * edge_count as f64 / node_count as f64
    } else {
        0.0
    };
    if density > 0.3 {
        (
            PathAlgorithm::AStar,
            format!("a_star: dense graph (density {:.2})", density),
        )
    } else if avg_degree > 10.0 {
        (
            PathAlgorithm::AStar,
            format!("a_star: high connectivity (average degree {:.1})", avg_degree),
        )
    } else {
        // Both endpoints are always known in a path query, so the guided
        // search applies once the graph is this large.
        (PathAlgorithm::AStar, "a_star: both endpoints known".to_string())
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone)]
enum CachedPayload {
    Path(PathData),
    Analysis(AnalysisData),
}

struct CacheEntry {
    version: u64,
    payload: CachedPayload,
}

/// Result cache keyed by algorithm name + arguments. Entries carry the store
/// version they were computed at; a lookup at a newer version is a miss, so
/// stale results are never served. `clear` remains for explicit resets.
#[derive(Default)]
pub struct AlgorithmCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl AlgorithmCache {
    pub fn new() -> Self {
        AlgorithmCache::default()
    }

    fn get(&self, key: &str, version: u64) -> Option<CachedPayload> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.version == version)
            .map(|entry| entry.payload.clone())
    }

    fn put(&self, key: String, version: u64, payload: CachedPayload) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CacheEntry { version, payload });
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Resolve an endpoint reference: a numeric node id, or a value matched
/// against the `name` property across all nodes (first match by id order).
fn resolve_endpoint<S: GraphStore>(store: &S, reference: &str) -> Option<NodeId> {
    if let Ok(id) = reference.trim().parse::<u64>() {
        if store.node(id).is_some() {
            return Some(id);
        }
    }
    let wanted = Value::String(reference.to_string());
    let mut nodes = store.all_nodes();
    nodes.sort_by_key(|n| n.id);
    nodes
        .iter()
        .find(|n| {
            n.property("name")
                .map_or(false, |name| values_equal(name, &wanted))
        })
        .map(|n| n.id)
}

pub fn run_path<S: GraphStore>(
    store: &S,
    params: &PathParams,
    cache: &AlgorithmCache,
    metrics: &PerformanceMetrics,
) -> Result<PathData, EngineError> {
    let source_id = resolve_endpoint(store, &params.from)
        .ok_or_else(|| EngineError::NotFound(format!("path endpoint '{}'", params.from)))?;
    let target_id = resolve_endpoint(store, &params.to)
        .ok_or_else(|| EngineError::NotFound(format!("path endpoint '{}'", params.to)))?;

    let (algorithm, rationale) = match params.algorithm {
        PathAlgorithm::Dijkstra => (PathAlgorithm::Dijkstra, None),
        PathAlgorithm::AStar => (PathAlgorithm::AStar, None),
        PathAlgorithm::Auto => {
            let (chosen, why) = choose_algorithm(store.node_count(), store.edge_count());
            (chosen, Some(why))
        }
    };
    let algorithm_name = match algorithm {
        PathAlgorithm::AStar => "a_star",
        _ => "dijkstra",
    };

    let key = format!(
        "{}:{}:{}:{}:{}:{}:{}:{}",
        algorithm_name,
        source_id,
        target_id,
        params.weight_property.as_deref().unwrap_or(""),
        params.connection_type.as_deref().unwrap_or(""),
        params.avoid_connection_type.as_deref().unwrap_or(""),
        params.max_steps.map_or(-1i64, |m| m as i64),
        params.bidirectional,
    );
    let version = store.version();
    if let Some(CachedPayload::Path(mut hit)) = cache.get(&key, version) {
        metrics.record_cache_lookup(true);
        debug!(%key, "path cache hit");
        hit.rationale = rationale.or(hit.rationale);
        return Ok(hit);
    }
    metrics.record_cache_lookup(false);

    let view = GraphView::build_filtered(
        store,
        params.connection_type.as_deref(),
        params.avoid_connection_type.as_deref(),
        params.bidirectional,
    );
    // The endpoints were resolved from a separate store read; a concurrent
    // removal in between is a lookup error, not a panic.
    let (Some(&source), Some(&target)) = (
        view.index_of.get(&source_id),
        view.index_of.get(&target_id),
    ) else {
        return Err(EngineError::NotFound("path endpoint".into()));
    };

    let started = Instant::now();
    let weight = params.weight_property.as_deref();
    let found = match algorithm {
        PathAlgorithm::AStar => astar(&view, source, target, weight, params.max_steps),
        _ => dijkstra(&view, source, target, weight, params.max_steps),
    };
    metrics.record_algorithm(algorithm_name, started.elapsed());

    let data = match found {
        Some((path, cost)) => PathData {
            nodes: view.node_ids(&path),
            cost,
            algorithm: algorithm_name.to_string(),
            rationale,
        },
        // Unreachable (or over the step ceiling): an empty path, not an error.
        None => PathData {
            nodes: Vec::new(),
            cost: 0.0,
            algorithm: algorithm_name.to_string(),
            rationale,
        },
    };
    cache.put(key, version, CachedPayload::Path(data.clone()));
    Ok(data)
}

pub fn run_analysis<S: GraphStore>(
    store: &S,
    kind: AnalysisKind,
    weight_property: Option<&str>,
    cache: &AlgorithmCache,
    metrics: &PerformanceMetrics,
) -> Result<AnalysisData, EngineError> {
    let key = format!("{}:{}", kind.name(), weight_property.unwrap_or(""));
    let version = store.version();
    if let Some(CachedPayload::Analysis(hit)) = cache.get(&key, version) {
        metrics.record_cache_lookup(true);
        debug!(%key, "analysis cache hit");
        return Ok(hit);
    }
    metrics.record_cache_lookup(false);

    let view = GraphView::build(store);
    let started = Instant::now();
    let data = match kind {
        AnalysisKind::ConnectedComponents => AnalysisData::Components(
            connected_components(&view)
                .iter()
                .map(|c| view.node_ids(c))
                .collect(),
        ),
        AnalysisKind::CycleDetection => {
            let witnesses: Vec<Vec<NodeId>> = detect_cycles(&view)
                .iter()
                .map(|c| view.node_ids(c))
                .collect();
            AnalysisData::Cycles {
                has_cycle: !witnesses.is_empty(),
                witnesses,
            }
        }
        AnalysisKind::DiameterRadius => {
            let matrix = floyd_warshall(&view, weight_property);
            let (diameter, radius) = diameter_radius(&matrix);
            AnalysisData::DiameterRadius { diameter, radius }
        }
        AnalysisKind::ClosenessCentrality => {
            let matrix = floyd_warshall(&view, weight_property);
            AnalysisData::Centrality(closeness_centrality(&view, &matrix))
        }
        AnalysisKind::Bridges => AnalysisData::Bridges(
            bridges(&view)
                .into_iter()
                .map(|edge_ix| view.edges[edge_ix].id)
                .collect(),
        ),
        AnalysisKind::ArticulationPoints => AnalysisData::ArticulationPoints(
            articulation_points(&view)
                .into_iter()
                .map(|node_ix| view.nodes[node_ix].id)
                .collect(),
        ),
        AnalysisKind::BetweennessCentrality => {
            AnalysisData::Centrality(betweenness_centrality(&view))
        }
        AnalysisKind::PageRank => AnalysisData::Centrality(pagerank(&view)),
    };
    metrics.record_algorithm(kind.name(), started.elapsed());

    cache.put(key, version, CachedPayload::Analysis(data.clone()));
    Ok(data)
}
