//! Audio engine collaborator interface
//!
//! The DSP itself (players, filters, delay lines, reverb, pitch shifting)
//! belongs to an external engine. The compiler only asks it to create, wire,
//! load, start, stop and dispose units through this trait.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Handle to a live unit inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u64);

impl UnitId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    HighPass,
    LowPass,
}

/// What the engine should instantiate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "lowercase")]
pub enum UnitSpec {
    /// Buffer player bound to a media locator
    Player {
        url: String,
        playback_rate: f64,
        looping: bool,
        autostart: bool,
    },
    Filter {
        frequency_hz: f64,
        mode: FilterMode,
    },
    Delay {
        delay_time: f64,
        feedback: f64,
    },
    Reverb {
        room_size: f64,
        decay: f64,
    },
    PitchShift {
        semitones: i32,
    },
}

impl UnitSpec {
    pub fn is_player(&self) -> bool {
        matches!(self, UnitSpec::Player { .. })
    }
}

/// Audio context state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

/// Engine operations used by the compiler, scheduler and lifecycle manager.
///
/// Unit-level calls are synchronous and must not block the render thread.
/// Only context start-up and buffer loading are awaited.
pub trait AudioEngine: Send + Sync + 'static {
    /// Whether the engine is loaded at all
    fn is_available(&self) -> bool;

    fn context_state(&self) -> ContextState;

    /// Resume a suspended audio context
    fn resume(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Current audio clock time in seconds
    fn now(&self) -> f64;

    fn create_unit(&self, spec: &UnitSpec) -> Result<UnitId, EngineError>;

    fn connect(&self, from: UnitId, to: UnitId) -> Result<(), EngineError>;

    /// Wire a unit to the final output destination
    fn connect_to_destination(&self, unit: UnitId) -> Result<(), EngineError>;

    /// Wait until the player's buffer is fetched and decoded
    fn load(&self, player: UnitId) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// (Re)start a player from its beginning at the given clock time
    fn start_player(&self, player: UnitId, at: f64);

    fn stop_player(&self, player: UnitId);

    /// Release a unit and every connection it holds
    fn dispose(&self, unit: UnitId);
}
