//! Chain Resolver - walks the graph backward from the sink
//!
//! The walk follows one incoming edge per step, so it yields a linear chain
//! even for graphs that branch. Cycles stop the walk at the point of re-entry
//! and dangling edges end it like a missing edge would.

use super::effect::EffectDescriptor;
use super::graph::AudioGraph;
use super::node::NodeId;
use std::collections::{HashMap, HashSet};

/// Current parameter record per node. Only effect nodes carry one.
pub type ParamStore = HashMap<NodeId, EffectDescriptor>;

/// Nodes upstream of the sink, ordered source-to-sink.
///
/// The sink itself is not included. Terminates in at most |nodes| steps.
pub fn walk_upstream(graph: &AudioGraph) -> Vec<NodeId> {
    let Some(sink) = graph.find_sink() else {
        return Vec::new();
    };

    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut current = sink;

    while visited.insert(current) {
        let Some(edge) = graph.incoming_edge(current) else {
            break;
        };
        let Some(upstream) = graph.node(edge.source) else {
            // Dangling edge: treated as no incoming edge
            break;
        };
        path.push(upstream.id);
        current = upstream.id;
    }

    path.reverse();
    path
}

/// Ordered effect chain, nearest-source first.
///
/// Effect nodes without a parameter record are skipped.
pub fn resolve_chain(graph: &AudioGraph, params: &ParamStore) -> Vec<EffectDescriptor> {
    walk_upstream(graph)
        .into_iter()
        .filter_map(|id| {
            let node = graph.node(id)?;
            node.kind.effect_kind()?;
            params.get(&id).copied()
        })
        .collect()
}
