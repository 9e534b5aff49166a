//! Loopgraph - node-graph effect chains looped in time with a tempo
//!
//! The patch (a source, effect stages and an output joined by edges) is
//! resolved into an ordered chain, compiled into units of an external audio
//! engine and retriggered once per bar from a shared transport.

pub mod api;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;

pub use audio::{AudioEngine, AudioGraph, EffectDescriptor, EffectKind, NodeId, VirtualEngine};
pub use catalog::Catalog;
pub use config::AppConfig;
pub use controller::{PatchController, PlayOutcome};
pub use error::{PatchError, PlaybackError};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the configured filter.
/// Safe to call more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::get_config().log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}
