//! Per-tenant graph partition
//!
//! Nodes and edges live in insertion-ordered arenas keyed by id; every
//! relationship is resolved by lookup. Adjacency lists hold edge ids sorted
//! by edge `seq`, which is what makes traversal order insertion-stable.

use super::edge::IntelligenceEdge;
use super::embedding::{edge_text, node_text, EmbeddingRecord, EmbeddingTarget};
use super::node::{ExternalKey, IntelligenceNode};
use super::types::{Direction, EdgeId, EdgeType, NodeId, NodeType, TenantId};
use crate::search::index::VectorIndex;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Node and edge counts of one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub embedding_count: usize,
    pub node_type_histogram: BTreeMap<NodeType, usize>,
    pub edge_type_histogram: BTreeMap<EdgeType, usize>,
}

#[derive(Debug)]
pub struct TenantGraph {
    tenant: TenantId,
    nodes: IndexMap<NodeId, IntelligenceNode>,
    edges: IndexMap<EdgeId, IntelligenceEdge>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    external_nodes: HashMap<ExternalKey, NodeId>,
    external_edges: HashMap<(EdgeType, String), EdgeId>,
    embeddings: HashMap<EmbeddingTarget, EmbeddingRecord>,
    ann: Option<VectorIndex>,
    next_seq: u64,
}

impl TenantGraph {
    pub fn new(tenant: TenantId) -> Self {
        TenantGraph {
            tenant,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            external_nodes: HashMap::new(),
            external_edges: HashMap::new(),
            embeddings: HashMap::new(),
            ann: None,
            next_seq: 1,
        }
    }

    /// Rebuild a partition from persisted records
    pub fn from_records(
        tenant: TenantId,
        mut nodes: Vec<IntelligenceNode>,
        mut edges: Vec<IntelligenceEdge>,
        embeddings: Vec<EmbeddingRecord>,
    ) -> Self {
        let mut graph = TenantGraph::new(tenant);
        nodes.sort_by_key(|n| n.seq);
        edges.sort_by_key(|e| e.seq);

        for node in nodes {
            graph.next_seq = graph.next_seq.max(node.seq + 1);
            graph.insert_node(node);
        }
        for edge in edges {
            if !graph.nodes.contains_key(&edge.source) || !graph.nodes.contains_key(&edge.target) {
                continue;
            }
            graph.next_seq = graph.next_seq.max(edge.seq + 1);
            graph.insert_edge(edge);
        }
        for record in embeddings {
            graph.put_embedding(record);
        }
        graph
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Allocate the next insertion sequence number
    pub(crate) fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ---- nodes ----

    pub fn node(&self, id: NodeId) -> Option<&IntelligenceNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut IntelligenceNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &IntelligenceNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_external(&self, node_type: NodeType, external_source_id: &str) -> Option<NodeId> {
        let key = ExternalKey {
            node_type,
            external_source_id: external_source_id.to_string(),
        };
        self.external_nodes.get(&key).copied()
    }

    /// Insert a new node, or replace the stored copy of an existing one
    pub(crate) fn insert_node(&mut self, node: IntelligenceNode) {
        if let Some(key) = node.external_key() {
            self.external_nodes.insert(key, node.id);
        }
        for alias in &node.aliases {
            self.external_nodes.insert(alias.clone(), node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Remove a node and its external keys. Incident edges must already be gone.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<IntelligenceNode> {
        let node = self.nodes.shift_remove(&id)?;
        self.external_nodes.retain(|_, owner| *owner != id);
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        self.remove_embedding(EmbeddingTarget::Node(id));
        Some(node)
    }

    // ---- edges ----

    pub fn edge(&self, id: EdgeId) -> Option<&IntelligenceEdge> {
        self.edges.get(&id)
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &IntelligenceEdge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_by_external(&self, edge_type: EdgeType, external_source_id: &str) -> Option<EdgeId> {
        self.external_edges
            .get(&(edge_type, external_source_id.to_string()))
            .copied()
    }

    /// First edge of `edge_type` from `source` to `target`, in insertion order
    pub fn edge_between(&self, edge_type: EdgeType, source: NodeId, target: NodeId) -> Option<EdgeId> {
        self.outgoing.get(&source)?.iter().copied().find(|id| {
            self.edges
                .get(id)
                .map_or(false, |e| e.edge_type == edge_type && e.target == target)
        })
    }

    /// Insert a new edge, or replace an existing one (endpoints may change)
    pub(crate) fn insert_edge(&mut self, edge: IntelligenceEdge) {
        if let Some(previous) = self.edges.get(&edge.id) {
            let (old_source, old_target) = (previous.source, previous.target);
            detach(&mut self.outgoing, old_source, edge.id);
            detach(&mut self.incoming, old_target, edge.id);
        }
        if let Some(ext) = &edge.external_source_id {
            self.external_edges.insert((edge.edge_type, ext.clone()), edge.id);
        }
        let (id, seq, source, target) = (edge.id, edge.seq, edge.source, edge.target);
        self.edges.insert(id, edge);
        attach_sorted(&mut self.outgoing, &self.edges, source, id, seq);
        attach_sorted(&mut self.incoming, &self.edges, target, id, seq);
    }

    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<IntelligenceEdge> {
        let edge = self.edges.shift_remove(&id)?;
        detach(&mut self.outgoing, edge.source, id);
        detach(&mut self.incoming, edge.target, id);
        if let Some(ext) = &edge.external_source_id {
            self.external_edges.remove(&(edge.edge_type, ext.clone()));
        }
        self.remove_embedding(EmbeddingTarget::Edge(id));
        Some(edge)
    }

    /// Edges leaving (`Outbound`), entering (`Inbound`) or touching (`Both`)
    /// `node`, ordered by insertion sequence. A self-loop appears once.
    pub fn neighbors(
        &self,
        node: NodeId,
        direction: Direction,
        filter: Option<&[EdgeType]>,
    ) -> Vec<&IntelligenceEdge> {
        let empty = Vec::new();
        let out = self.outgoing.get(&node).unwrap_or(&empty);
        let inc = self.incoming.get(&node).unwrap_or(&empty);

        let ids: Vec<EdgeId> = match direction {
            Direction::Outbound => out.clone(),
            Direction::Inbound => inc.clone(),
            Direction::Both => merge_by_seq(out, inc, &self.edges),
        };

        ids.iter()
            .filter_map(|id| self.edges.get(id))
            .filter(|e| filter.map_or(true, |types| types.contains(&e.edge_type)))
            .collect()
    }

    /// Ids of every edge touching `node`, in insertion order
    pub fn incident_edges(&self, node: NodeId) -> Vec<EdgeId> {
        self.neighbors(node, Direction::Both, None)
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(&node).map_or(0, Vec::len)
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(&node).map_or(0, Vec::len)
    }

    // ---- embeddings ----

    pub fn embedding(&self, target: EmbeddingTarget) -> Option<&EmbeddingRecord> {
        self.embeddings.get(&target)
    }

    pub fn embeddings(&self) -> impl Iterator<Item = &EmbeddingRecord> {
        self.embeddings.values()
    }

    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }

    pub(crate) fn put_embedding(&mut self, record: EmbeddingRecord) {
        let dims = record.vector.len();
        let ann = self.ann.get_or_insert_with(|| VectorIndex::new(dims));
        ann.upsert(record.target, &record.vector);
        let rebuild = ann.needs_rebuild();
        self.embeddings.insert(record.target, record);
        if rebuild {
            self.rebuild_ann();
        }
    }

    pub(crate) fn remove_embedding(&mut self, target: EmbeddingTarget) -> Option<EmbeddingRecord> {
        let removed = self.embeddings.remove(&target)?;
        if let Some(ann) = self.ann.as_mut() {
            ann.remove(target);
            if ann.needs_rebuild() {
                self.rebuild_ann();
            }
        }
        Some(removed)
    }

    /// Canonical embedding text of a node or edge, if it still exists
    pub fn canonical_text(&self, target: EmbeddingTarget) -> Option<String> {
        match target {
            EmbeddingTarget::Node(id) => self.node(id).map(node_text),
            EmbeddingTarget::Edge(id) => {
                let edge = self.edge(id)?;
                let source = self.node(edge.source)?;
                let target = self.node(edge.target)?;
                Some(edge_text(edge, &source.label, &target.label))
            }
        }
    }

    pub fn ann_index(&self) -> Option<&VectorIndex> {
        self.ann.as_ref()
    }

    fn rebuild_ann(&mut self) {
        let dims = match self.ann.as_ref() {
            Some(ann) => ann.dimensions(),
            None => return,
        };
        let mut ann = VectorIndex::new(dims);
        for record in self.embeddings.values() {
            ann.upsert(record.target, &record.vector);
        }
        self.ann = Some(ann);
    }

    pub fn stats(&self) -> TenantStats {
        let mut stats = TenantStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            embedding_count: self.embeddings.len(),
            ..Default::default()
        };
        for node in self.nodes.values() {
            *stats.node_type_histogram.entry(node.node_type).or_insert(0) += 1;
        }
        for edge in self.edges.values() {
            *stats.edge_type_histogram.entry(edge.edge_type).or_insert(0) += 1;
        }
        stats
    }
}

fn detach(adjacency: &mut HashMap<NodeId, Vec<EdgeId>>, node: NodeId, edge: EdgeId) {
    if let Some(list) = adjacency.get_mut(&node) {
        list.retain(|id| *id != edge);
    }
}

fn attach_sorted(
    adjacency: &mut HashMap<NodeId, Vec<EdgeId>>,
    edges: &IndexMap<EdgeId, IntelligenceEdge>,
    node: NodeId,
    edge: EdgeId,
    seq: u64,
) {
    let list = adjacency.entry(node).or_default();
    let pos = list.partition_point(|id| edges.get(id).map_or(0, |e| e.seq) < seq);
    list.insert(pos, edge);
}

/// Merge two seq-sorted id lists, dropping the second copy of a self-loop
fn merge_by_seq(a: &[EdgeId], b: &[EdgeId], edges: &IndexMap<EdgeId, IntelligenceEdge>) -> Vec<EdgeId> {
    let seq = |id: &EdgeId| edges.get(id).map_or(0, |e| e.seq);
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let take_a = j >= b.len() || (i < a.len() && seq(&a[i]) <= seq(&b[j]));
        let next = if take_a {
            i += 1;
            a[i - 1]
        } else {
            j += 1;
            b[j - 1]
        };
        if merged.last() != Some(&next) {
            merged.push(next);
        }
    }
    merged
}
