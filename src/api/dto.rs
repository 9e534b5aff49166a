//! Data Transfer Objects for API

use crate::audio::lifecycle::LifecycleState;
use crate::audio::{
    AudioGraph, Edge, EdgeId, EffectDescriptor, GraphVersion, Node, NodeId, NodeKind,
    ParamStore, SourceDescriptor,
};
use serde::{Deserialize, Serialize};

/// Patch file format version
pub const PATCH_VERSION: u32 = 1;

// =============================================================================
// Graph DTOs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfoDto {
    pub id: u32,
    pub kind: NodeKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfoDto {
    pub id: u32,
    pub source: u32,
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDto {
    /// Mutation counter at capture time
    #[serde(default)]
    pub version: u64,
    pub nodes: Vec<NodeInfoDto>,
    pub edges: Vec<EdgeInfoDto>,
}

impl GraphDto {
    pub fn from_graph(graph: &AudioGraph) -> Self {
        Self {
            version: graph.version().0,
            nodes: graph.nodes().cloned().map(NodeInfoDto::from).collect(),
            edges: graph.edges().iter().copied().map(EdgeInfoDto::from).collect(),
        }
    }

    /// Rebuild the graph as saved, dangling edges included. The version
    /// continues after the captured one.
    pub fn to_graph(&self) -> AudioGraph {
        let mut graph = AudioGraph::from_parts(
            self.nodes.iter().cloned().map(Node::from).collect(),
            self.edges.iter().cloned().map(Edge::from).collect(),
        );
        graph.advance_past(GraphVersion(self.version));
        graph
    }
}

// =============================================================================
// Patch DTOs (永続化用)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeParamsDto {
    pub node: NodeId,
    pub params: EffectDescriptor,
}

/// Saved patch: graph, parameters, selected source and tempo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchDto {
    pub version: u32,
    pub graph: GraphDto,
    #[serde(default)]
    pub params: Vec<NodeParamsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDescriptor>,
    pub bpm: f64,
}

impl PatchDto {
    pub fn capture(
        graph: &AudioGraph,
        params: &ParamStore,
        source: Option<SourceDescriptor>,
        bpm: f64,
    ) -> Self {
        let mut params: Vec<NodeParamsDto> = params
            .iter()
            .map(|(node, params)| NodeParamsDto {
                node: *node,
                params: *params,
            })
            .collect();
        params.sort_by_key(|p| p.node);
        Self {
            version: PATCH_VERSION,
            graph: GraphDto::from_graph(graph),
            params,
            source,
            bpm,
        }
    }
}

// =============================================================================
// Status DTOs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStateDto {
    Stopped,
    Loading,
    Armed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDto {
    /// Output node status line
    pub text: String,
    pub state: PlaybackStateDto,
    pub connected: bool,
    pub has_source: bool,
    pub bpm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// Effects in the current chain
    pub effects: usize,
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Node> for NodeInfoDto {
    fn from(node: Node) -> Self {
        NodeInfoDto {
            id: node.id.raw(),
            kind: node.kind,
            label: node.label,
        }
    }
}

impl From<NodeInfoDto> for Node {
    fn from(dto: NodeInfoDto) -> Self {
        Node {
            id: NodeId::from_raw(dto.id),
            kind: dto.kind,
            label: dto.label,
        }
    }
}

impl From<Edge> for EdgeInfoDto {
    fn from(edge: Edge) -> Self {
        EdgeInfoDto {
            id: edge.id.raw(),
            source: edge.source.raw(),
            target: edge.target.raw(),
        }
    }
}

impl From<EdgeInfoDto> for Edge {
    fn from(dto: EdgeInfoDto) -> Self {
        Edge::new(
            EdgeId::from_raw(dto.id),
            NodeId::from_raw(dto.source),
            NodeId::from_raw(dto.target),
        )
    }
}

impl From<LifecycleState> for PlaybackStateDto {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Stopped => PlaybackStateDto::Stopped,
            LifecycleState::Loading => PlaybackStateDto::Loading,
            LifecycleState::Armed => PlaybackStateDto::Armed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{EffectKind, FilterParams};

    #[test]
    fn test_graph_dto_keeps_dangling_edges() {
        let dto = GraphDto {
            version: 0,
            nodes: vec![NodeInfoDto {
                id: 2,
                kind: NodeKind::Sink,
                label: "Audio Output".into(),
            }],
            edges: vec![EdgeInfoDto {
                id: 5,
                source: 9,
                target: 2,
            }],
        };
        let graph = dto.to_graph();
        assert!(graph.is_connected());
        assert!(graph.node(NodeId::from_raw(9)).is_none());
    }

    #[test]
    fn test_restored_version_follows_capture() {
        let mut graph = AudioGraph::new();
        graph.add_effect_node(EffectKind::Reverb);
        let dto = GraphDto::from_graph(&graph);
        assert!(dto.to_graph().version() > graph.version());
    }

    #[test]
    fn test_patch_json_shape() {
        let mut graph = AudioGraph::new();
        let fx = graph.add_effect_node(EffectKind::HighPass);
        let mut params = ParamStore::new();
        params.insert(fx, EffectDescriptor::HighPass(FilterParams { frequency_hz: 250.0 }));

        let patch = PatchDto::capture(&graph, &params, None, 120.0);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["params"][0]["params"]["type"], "highpass");
        assert_eq!(json["params"][0]["params"]["frequency"], 250.0);
        assert_eq!(json["graph"]["nodes"][2]["kind"]["role"], "effect");
        assert!(json.get("source").is_none());

        let back: PatchDto = serde_json::from_value(json).unwrap();
        assert_eq!(back, patch);
    }
}
