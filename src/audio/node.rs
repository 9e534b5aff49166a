//! Node identifiers and roles

use super::effect::EffectKind;
use serde::{Deserialize, Serialize};

/// Unique node identifier.
///
/// NodeId is opaque: it says nothing about the node's role. The role lives
/// on the node itself, so callers handle every node through the same id type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value (for serialization)
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Create from raw ID value (for deserialization)
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Role of a node in the patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "effect", rename_all = "lowercase")]
pub enum NodeKind {
    /// The sound source. Exactly one per graph.
    Source,
    /// An effect stage of the given kind.
    Effect(EffectKind),
    /// The audio output. Exactly one per graph.
    Sink,
}

impl NodeKind {
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Source)
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, NodeKind::Sink)
    }

    /// Effect kind, if this is an effect node
    pub fn effect_kind(&self) -> Option<EffectKind> {
        match self {
            NodeKind::Effect(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Default display label
    pub fn default_label(&self) -> &'static str {
        match self {
            NodeKind::Source => "Song Select",
            NodeKind::Sink => "Audio Output",
            NodeKind::Effect(kind) => kind.label(),
        }
    }
}

/// A node in the patch graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            label: kind.default_label().to_string(),
        }
    }
}
