//! Pipeline Compiler - turns a source, an effect chain and a tempo into
//! live, wired engine units
//!
//! A `Pipeline` exclusively owns its units. Dropping it stops the player if
//! it was started and disposes every unit, so every exit path (explicit
//! teardown, replacement, or an error halfway through compilation) releases
//! the same way.

use super::effect::EffectDescriptor;
use super::engine::{AudioEngine, FilterMode, UnitId, UnitSpec};
use super::scheduler::LoopTiming;
use super::source::SourceDescriptor;
use crate::error::PlaybackError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Everything the compiler needs
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a SourceDescriptor,
    pub chain: &'a [EffectDescriptor],
    pub bpm: f64,
}

/// Check Play preconditions: a selected source and a connected sink
pub fn check_preconditions(
    source: Option<&SourceDescriptor>,
    connected: bool,
) -> Result<&SourceDescriptor, PlaybackError> {
    match source {
        Some(source) if connected => Ok(source),
        _ => Err(PlaybackError::InvalidPreconditions),
    }
}

/// Engine unit spec for one effect stage
pub fn unit_spec_for(descriptor: &EffectDescriptor) -> UnitSpec {
    match *descriptor {
        EffectDescriptor::HighPass(p) => UnitSpec::Filter {
            frequency_hz: p.frequency_hz,
            mode: FilterMode::HighPass,
        },
        EffectDescriptor::LowPass(p) => UnitSpec::Filter {
            frequency_hz: p.frequency_hz,
            mode: FilterMode::LowPass,
        },
        EffectDescriptor::Delay(p) => UnitSpec::Delay {
            delay_time: p.delay_time,
            feedback: p.feedback,
        },
        EffectDescriptor::Reverb(p) => UnitSpec::Reverb {
            room_size: p.room_size,
            decay: p.decay,
        },
        EffectDescriptor::PitchShift(p) => UnitSpec::PitchShift {
            semitones: p.semitones,
        },
    }
}

/// A compiled, wired processing pipeline
pub struct Pipeline<E: AudioEngine> {
    id: Uuid,
    engine: Arc<E>,
    /// Player unit
    player: UnitId,
    /// Player first, then effects in chain order
    units: Vec<UnitId>,
    timing: LoopTiming,
    effect_count: usize,
    /// Raised by the scheduler on the first retrigger
    started: Arc<AtomicBool>,
    released: bool,
}

impl<E: AudioEngine> std::fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("player", &self.player)
            .field("units", &self.units)
            .field("timing", &self.timing)
            .field("released", &self.released)
            .finish()
    }
}

impl<E: AudioEngine> Pipeline<E> {
    fn new(engine: Arc<E>, player: UnitId, timing: LoopTiming) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            player,
            units: vec![player],
            timing,
            effect_count: 0,
            started: Arc::new(AtomicBool::new(false)),
            released: false,
        }
    }

    /// Compile a pipeline: player -> effect1 -> ... -> effectN -> destination.
    ///
    /// Fails with `EngineUnavailable` before creating anything when the engine
    /// is not loaded. A failure after that drops the partial pipeline, which
    /// disposes whatever was already created.
    pub fn compile(engine: &Arc<E>, request: &CompileRequest<'_>) -> Result<Self, PlaybackError> {
        if !engine.is_available() {
            return Err(PlaybackError::EngineUnavailable);
        }

        let timing = LoopTiming::for_tempo(request.bpm);
        let player = engine.create_unit(&UnitSpec::Player {
            url: request.source.url.clone(),
            playback_rate: timing.playback_rate,
            looping: false,
            autostart: false,
        })?;
        let mut pipeline = Self::new(engine.clone(), player, timing);

        for descriptor in request.chain {
            let unit = engine.create_unit(&unit_spec_for(descriptor))?;
            pipeline.units.push(unit);
            pipeline.effect_count += 1;
        }

        for pair in pipeline.units.windows(2) {
            engine.connect(pair[0], pair[1])?;
        }
        if let Some(&last) = pipeline.units.last() {
            engine.connect_to_destination(last)?;
        }

        Ok(pipeline)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player(&self) -> UnitId {
        self.player
    }

    /// Every unit, player first
    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    pub fn effect_count(&self) -> usize {
        self.effect_count
    }

    pub fn timing(&self) -> &LoopTiming {
        &self.timing
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Flag shared with the scheduler's retrigger callback
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        self.started.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop the player if started and dispose every unit. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.is_started() {
            self.engine.stop_player(self.player);
        }
        for &unit in &self.units {
            self.engine.dispose(unit);
        }
        tracing::debug!(
            "[Pipeline] released {} ({} units)",
            self.id,
            self.units.len()
        );
    }
}

impl<E: AudioEngine> Drop for Pipeline<E> {
    fn drop(&mut self) {
        self.release();
    }
}
