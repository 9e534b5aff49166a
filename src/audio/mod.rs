//! Audio Graph Module - node graph, chain resolution and loop playback
//!
//! The graph only describes the patch. Nothing is processed here: a resolved
//! chain is compiled into units of an external [`AudioEngine`] and looped by
//! the shared transport.

mod edge;
mod graph;
mod node;

pub mod chain;
pub mod effect;
pub mod engine;
pub mod lifecycle;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod transport;
pub mod virtual_engine;

pub use chain::{resolve_chain, walk_upstream, ParamStore};
pub use edge::{Edge, EdgeId};
pub use effect::{
    DelayParams, EffectDescriptor, EffectKind, FilterParams, PitchShiftParams, ReverbParams,
};
pub use engine::{AudioEngine, ContextState, FilterMode, UnitId, UnitSpec};
pub use graph::{AudioGraph, GraphVersion};
pub use lifecycle::{LifecycleEvent, LifecycleManager, LifecycleState, StopReason};
pub use node::{Node, NodeId, NodeKind};
pub use pipeline::{CompileRequest, Pipeline};
pub use scheduler::{LoopTiming, REFERENCE_BPM};
pub use source::SourceDescriptor;
pub use transport::{shared_transport, SharedTransport, Transport};
pub use virtual_engine::VirtualEngine;
