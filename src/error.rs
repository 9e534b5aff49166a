//! Error types

use crate::audio::{EffectKind, NodeId, UnitId};
use thiserror::Error;

/// Failures reported by the audio engine collaborator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("audio engine is not available")]
    Unavailable,
    #[error("failed to load media: {0}")]
    Load(String),
    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),
}

/// Failures of a Play request
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    /// Engine not loaded or its context could not be started
    #[error("audio engine unavailable")]
    EngineUnavailable,
    /// Source media failed to fetch or decode
    #[error("failed to load source: {0}")]
    LoadFailure(String),
    /// No source selected or the sink has no input
    #[error("play requires a selected source and a connected output")]
    InvalidPreconditions,
}

impl From<EngineError> for PlaybackError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable => PlaybackError::EngineUnavailable,
            EngineError::Load(msg) => PlaybackError::LoadFailure(msg),
            // Unit vanished mid-compile
            EngineError::UnknownUnit(_) => PlaybackError::EngineUnavailable,
        }
    }
}

/// Rejected parameter edits
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an effect")]
    NotAnEffect(NodeId),
    #[error("expected {expected:?} parameters, got {actual:?}")]
    KindMismatch {
        expected: EffectKind,
        actual: EffectKind,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
