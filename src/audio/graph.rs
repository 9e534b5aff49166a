//! Patch Graph - nodes and directed edges, versioned on every mutation

use super::edge::{Edge, EdgeId};
use super::node::{Node, NodeId, NodeKind};
use std::collections::BTreeMap;

/// Version token of a graph. Bumped on every successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GraphVersion(pub u64);

/// Patch graph
///
/// Holds nodes and edges and answers the lookups the chain walk needs.
/// No topology validation happens here: a missing sink, a missing incoming
/// edge or a cycle are all representable states.
#[derive(Debug, Clone)]
pub struct AudioGraph {
    /// Nodes by id
    nodes: BTreeMap<NodeId, Node>,
    /// Edges in creation order
    edges: Vec<Edge>,
    /// Next node id
    next_node_id: u32,
    /// Next edge id
    next_edge_id: u32,
    /// Mutation counter
    version: GraphVersion,
}

impl AudioGraph {
    /// Create a graph seeded with one Source and one Sink
    pub fn new() -> Self {
        let mut graph = Self::empty();
        graph.insert_node(NodeKind::Source);
        graph.insert_node(NodeKind::Sink);
        graph
    }

    /// Create a graph with no nodes at all
    pub fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_node_id: 1, // Start from 1 (0 is reserved)
            next_edge_id: 1,
            version: GraphVersion::default(),
        }
    }

    /// Rebuild a graph from raw parts without validation.
    ///
    /// Edges may reference nodes that are not present. Id counters continue
    /// after the largest id seen, including ids only referenced by edges.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let next_node_id = nodes
            .iter()
            .map(|n| n.id.raw())
            .chain(edges.iter().flat_map(|e| [e.source.raw(), e.target.raw()]))
            .max()
            .unwrap_or(0)
            + 1;
        let next_edge_id = edges.iter().map(|e| e.id.raw()).max().unwrap_or(0) + 1;
        let mut edges = edges;
        edges.sort_by_key(|e| e.id);
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            edges,
            next_node_id,
            next_edge_id,
            version: GraphVersion::default(),
        }
    }

    fn bump(&mut self) {
        self.version.0 += 1;
    }

    /// Move the version strictly past `floor`, keeping tokens monotonic
    /// across a restore
    pub fn advance_past(&mut self, floor: GraphVersion) {
        self.version = GraphVersion(self.version.0.max(floor.0) + 1);
    }

    fn insert_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, kind));
        self.bump();
        id
    }

    /// Current version token
    pub fn version(&self) -> GraphVersion {
        self.version
    }

    /// Add an effect node
    pub fn add_effect_node(&mut self, kind: super::effect::EffectKind) -> NodeId {
        self.insert_node(NodeKind::Effect(kind))
    }

    /// Remove a node together with every edge touching it.
    ///
    /// The Source and Sink are permanent; removing either returns false.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) if matches!(node.kind, NodeKind::Effect(_)) => {}
            _ => return false,
        }
        self.nodes.remove(&id);
        self.edges.retain(|e| !e.touches(id));
        self.bump();
        true
    }

    /// Get a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// All nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add an edge.
    ///
    /// Returns None when an endpoint is missing, the ordered pair is already
    /// connected, the target is the Source or the origin is the Sink.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        let source_kind = self.nodes.get(&source)?.kind;
        let target_kind = self.nodes.get(&target)?.kind;
        if source_kind.is_sink() || target_kind.is_source() {
            return None;
        }

        // Check for duplicate
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target)
        {
            return None;
        }

        let id = EdgeId::new(self.next_edge_id);
        self.next_edge_id += 1;
        self.edges.push(Edge::new(id, source, target));
        self.bump();
        Some(id)
    }

    /// Remove an edge
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let len_before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        let removed = self.edges.len() < len_before;
        if removed {
            self.bump();
        }
        removed
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// All edges in creation order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges pointing at the target node
    pub fn edges_to(&self, target: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == target)
    }

    /// The incoming edge of a node.
    ///
    /// With several inbound edges the most recently created one wins.
    pub fn incoming_edge(&self, target: NodeId) -> Option<&Edge> {
        self.edges_to(target).max_by_key(|e| e.id)
    }

    /// First node with the Sink role
    pub fn find_sink(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.kind.is_sink())
            .map(|n| n.id)
    }

    /// First node with the Source role
    pub fn find_source(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.kind.is_source())
            .map(|n| n.id)
    }

    /// Whether any edge terminates at the sink
    pub fn is_connected(&self) -> bool {
        self.find_sink()
            .map(|sink| self.edges_to(sink).next().is_some())
            .unwrap_or(false)
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effect::EffectKind;

    #[test]
    fn test_seeded_source_and_sink() {
        let graph = AudioGraph::new();
        assert_eq!(graph.node_count(), 2);
        let source = graph.find_source().unwrap();
        let sink = graph.find_sink().unwrap();
        assert_ne!(source, sink);
        assert!(!graph.is_connected());
    }

    #[test]
    fn test_source_and_sink_are_permanent() {
        let mut graph = AudioGraph::new();
        let source = graph.find_source().unwrap();
        let sink = graph.find_sink().unwrap();
        assert!(!graph.remove_node(source));
        assert!(!graph.remove_node(sink));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_add_remove_node() {
        let mut graph = AudioGraph::new();
        let source = graph.find_source().unwrap();
        let sink = graph.find_sink().unwrap();
        let fx = graph.add_effect_node(EffectKind::Delay);

        graph.add_edge(source, fx).unwrap();
        graph.add_edge(fx, sink).unwrap();
        assert_eq!(graph.edge_count(), 2);

        assert!(graph.remove_node(fx));
        assert!(graph.node(fx).is_none());
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.is_connected());
    }

    #[test]
    fn test_ids_never_reused() {
        let mut graph = AudioGraph::new();
        let first = graph.add_effect_node(EffectKind::Reverb);
        graph.remove_node(first);
        let second = graph.add_effect_node(EffectKind::Reverb);
        assert!(second > first);
    }

    #[test]
    fn test_add_edge_rejections() {
        let mut graph = AudioGraph::new();
        let source = graph.find_source().unwrap();
        let sink = graph.find_sink().unwrap();

        assert!(graph.add_edge(source, NodeId::from_raw(99)).is_none());
        assert!(graph.add_edge(sink, source).is_none());
        assert!(graph.add_edge(source, sink).is_some());
        // duplicate pair
        assert!(graph.add_edge(source, sink).is_none());
    }

    #[test]
    fn test_version_bumps_on_mutation_only() {
        let mut graph = AudioGraph::new();
        let v0 = graph.version();
        let fx = graph.add_effect_node(EffectKind::LowPass);
        let v1 = graph.version();
        assert!(v1 > v0);

        assert!(!graph.remove_edge(EdgeId::from_raw(42)));
        assert_eq!(graph.version(), v1);

        let sink = graph.find_sink().unwrap();
        graph.add_edge(fx, sink).unwrap();
        assert!(graph.version() > v1);
    }

    #[test]
    fn test_incoming_edge_prefers_most_recent() {
        let mut graph = AudioGraph::new();
        let source = graph.find_source().unwrap();
        let sink = graph.find_sink().unwrap();
        let a = graph.add_effect_node(EffectKind::HighPass);
        let b = graph.add_effect_node(EffectKind::LowPass);

        graph.add_edge(a, sink).unwrap();
        let newer = graph.add_edge(b, sink).unwrap();
        graph.add_edge(source, a).unwrap();

        let incoming = graph.incoming_edge(sink).unwrap();
        assert_eq!(incoming.id, newer);
        assert_eq!(incoming.source, b);
    }

    #[test]
    fn test_from_parts_keeps_dangling_edges() {
        let sink = Node::new(NodeId::from_raw(2), NodeKind::Sink);
        let dangling = Edge::new(EdgeId::from_raw(7), NodeId::from_raw(40), sink.id);
        let mut graph = AudioGraph::from_parts(vec![sink], vec![dangling]);

        assert!(graph.is_connected());
        assert_eq!(graph.incoming_edge(NodeId::from_raw(2)).unwrap().id.raw(), 7);

        let fx = graph.add_effect_node(EffectKind::Delay);
        assert_eq!(fx.raw(), 41);
        let edge = graph.add_edge(fx, NodeId::from_raw(2)).unwrap();
        assert!(edge.raw() > 7);
    }

    #[test]
    fn test_advance_past_is_strictly_newer() {
        let mut graph = AudioGraph::from_parts(Vec::new(), Vec::new());
        graph.advance_past(GraphVersion(12));
        assert_eq!(graph.version(), GraphVersion(13));

        // Never moves backwards
        graph.advance_past(GraphVersion(3));
        assert_eq!(graph.version(), GraphVersion(14));
    }
}
