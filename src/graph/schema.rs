// src/graph/schema.rs
use crate::datatypes::values::Value;
use chrono::{DateTime, Utc};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub type NodeId = u64;
pub type EdgeId = u64;

/// A labelled node with dynamic properties. The id is assigned by the store
/// (`0` means "not yet stored"); `add_node` honors a pre-set id so rollback
/// can restore a deleted node verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
    pub id: NodeId,
    pub label: String,
    pub properties: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeData {
    pub fn new(label: impl Into<String>, properties: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        NodeData {
            id: 0,
            label: label.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A typed connection between two nodes. Stored directed, matched
/// undirected: every adjacency consumer checks both orientations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeData {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub connection_type: String,
    pub properties: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EdgeData {
    pub fn new(
        connection_type: impl Into<String>,
        from_node: NodeId,
        to_node: NodeId,
        properties: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        EdgeData {
            id: 0,
            from_node,
            to_node,
            connection_type: connection_type.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Storage collaborator surface. The engine only ever talks to this trait;
/// reads return owned snapshots so callers never hold a lock across an
/// evaluation.
///
/// `version()` must increase on every successful mutation; the algorithm
/// cache compares it at lookup time to decide whether an entry is current.
pub trait GraphStore: Send + Sync {
    fn all_nodes(&self) -> Vec<NodeData>;
    fn nodes_by_label(&self, label: &str) -> Vec<NodeData>;
    fn node(&self, id: NodeId) -> Option<NodeData>;
    fn all_edges(&self) -> Vec<EdgeData>;
    fn edges_for_node(&self, id: NodeId) -> Vec<EdgeData>;

    /// Insert a node, assigning a fresh id when `node.id == 0`.
    /// Returns the id under which the node is stored.
    fn add_node(&self, node: NodeData) -> NodeId;
    /// Merge the given properties into an existing node and bump its
    /// `updated_at`. Returns false when the node does not exist.
    fn update_node_properties(&self, id: NodeId, properties: HashMap<String, Value>) -> bool;
    /// Replace a node's property map wholesale. Rollback restores pre-batch
    /// images through this, so merged-in keys disappear again.
    fn replace_node_properties(&self, id: NodeId, properties: HashMap<String, Value>) -> bool;
    fn remove_node(&self, id: NodeId) -> bool;

    /// Insert an edge, assigning a fresh id when `edge.id == 0`.
    /// Returns `None` when either endpoint does not exist.
    fn add_edge(&self, edge: EdgeData) -> Option<EdgeId>;
    fn remove_edge(&self, id: EdgeId) -> bool;

    fn node_count(&self) -> usize {
        self.all_nodes().len()
    }
    fn edge_count(&self) -> usize {
        self.all_edges().len()
    }
    fn version(&self) -> u64;
}

#[derive(Default)]
struct GraphInner {
    graph: StableDiGraph<NodeData, EdgeData>,
    node_ids: HashMap<NodeId, NodeIndex>,
    edge_ids: HashMap<EdgeId, EdgeIndex>,
    /// Lowercased label -> node indices. Labels match case-insensitively.
    label_index: HashMap<String, Vec<NodeIndex>>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
}

/// In-memory `GraphStore` on a petgraph `StableDiGraph`, with id and label
/// side-indices. Safe for concurrent reads and for the bounded mutation
/// fan-out used by batch operations.
pub struct MemoryGraph {
    inner: RwLock<GraphInner>,
    version: AtomicU64,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        MemoryGraph {
            inner: RwLock::new(GraphInner {
                next_node_id: 1,
                next_edge_id: 1,
                ..GraphInner::default()
            }),
            version: AtomicU64::new(0),
        }
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl GraphStore for MemoryGraph {
    fn all_nodes(&self) -> Vec<NodeData> {
        let inner = self.read();
        inner.graph.node_weights().cloned().collect()
    }

    fn nodes_by_label(&self, label: &str) -> Vec<NodeData> {
        let inner = self.read();
        inner
            .label_index
            .get(&label.to_lowercase())
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| inner.graph.node_weight(idx).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn node(&self, id: NodeId) -> Option<NodeData> {
        let inner = self.read();
        let idx = *inner.node_ids.get(&id)?;
        inner.graph.node_weight(idx).cloned()
    }

    fn all_edges(&self) -> Vec<EdgeData> {
        let inner = self.read();
        inner.graph.edge_weights().cloned().collect()
    }

    fn edges_for_node(&self, id: NodeId) -> Vec<EdgeData> {
        let inner = self.read();
        let Some(&idx) = inner.node_ids.get(&id) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        inner
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(inner.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().clone())
            // A self-loop shows up in both directions.
            .filter(|e| seen.insert(e.id))
            .collect()
    }

    fn add_node(&self, mut node: NodeData) -> NodeId {
        let mut inner = self.write();
        if node.id == 0 {
            node.id = inner.next_node_id;
            inner.next_node_id += 1;
        } else {
            inner.next_node_id = inner.next_node_id.max(node.id + 1);
        }
        let id = node.id;
        let label_key = node.label.to_lowercase();
        let idx = inner.graph.add_node(node);
        inner.node_ids.insert(id, idx);
        inner.label_index.entry(label_key).or_default().push(idx);
        drop(inner);
        self.bump_version();
        id
    }

    fn update_node_properties(&self, id: NodeId, properties: HashMap<String, Value>) -> bool {
        let mut inner = self.write();
        let Some(&idx) = inner.node_ids.get(&id) else {
            return false;
        };
        let Some(node) = inner.graph.node_weight_mut(idx) else {
            return false;
        };
        for (key, value) in properties {
            node.properties.insert(key, value);
        }
        node.updated_at = Utc::now();
        drop(inner);
        self.bump_version();
        true
    }

    fn replace_node_properties(&self, id: NodeId, properties: HashMap<String, Value>) -> bool {
        let mut inner = self.write();
        let Some(&idx) = inner.node_ids.get(&id) else {
            return false;
        };
        let Some(node) = inner.graph.node_weight_mut(idx) else {
            return false;
        };
        node.properties = properties;
        node.updated_at = Utc::now();
        drop(inner);
        self.bump_version();
        true
    }

    fn remove_node(&self, id: NodeId) -> bool {
        let mut inner = self.write();
        let Some(&idx) = inner.node_ids.get(&id) else {
            return false;
        };
        // Incident edges go away with the node; drop them from the id map
        // first so the map never points at a freed index.
        let incident: Vec<EdgeId> = inner
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(inner.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().id)
            .collect();
        for edge_id in incident {
            inner.edge_ids.remove(&edge_id);
        }
        let removed = inner.graph.remove_node(idx);
        inner.node_ids.remove(&id);
        if let Some(node) = &removed {
            if let Some(indices) = inner.label_index.get_mut(&node.label.to_lowercase()) {
                indices.retain(|&i| i != idx);
            }
        }
        drop(inner);
        self.bump_version();
        true
    }

    fn add_edge(&self, mut edge: EdgeData) -> Option<EdgeId> {
        let mut inner = self.write();
        let from = *inner.node_ids.get(&edge.from_node)?;
        let to = *inner.node_ids.get(&edge.to_node)?;
        if edge.id == 0 {
            edge.id = inner.next_edge_id;
            inner.next_edge_id += 1;
        } else {
            inner.next_edge_id = inner.next_edge_id.max(edge.id + 1);
        }
        let id = edge.id;
        let eidx = inner.graph.add_edge(from, to, edge);
        inner.edge_ids.insert(id, eidx);
        drop(inner);
        self.bump_version();
        Some(id)
    }

    fn remove_edge(&self, id: EdgeId) -> bool {
        let mut inner = self.write();
        let Some(&eidx) = inner.edge_ids.get(&id) else {
            return false;
        };
        inner.graph.remove_edge(eidx);
        inner.edge_ids.remove(&id);
        drop(inner);
        self.bump_version();
        true
    }

    fn node_count(&self) -> usize {
        self.read().graph.node_count()
    }

    fn edge_count(&self) -> usize {
        self.read().graph.edge_count()
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
