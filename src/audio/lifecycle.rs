//! Lifecycle Manager - owns the single live pipeline
//!
//! At most one pipeline exists at a time. Every rebuild and every teardown
//! bumps a generation counter; a buffer load that finishes after its
//! generation was superseded is discarded instead of armed.
//!
//! Lock order: slot, then transport.

use super::engine::{AudioEngine, UnitId};
use super::pipeline::{CompileRequest, Pipeline};
use super::scheduler;
use super::transport::{RepeatId, SharedTransport};
use crate::error::PlaybackError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    /// Pipeline built, waiting for the source buffer
    Loading,
    /// Transport started with the retrigger registered
    Armed,
}

/// Why a pipeline was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop requested
    Explicit,
    /// The sink lost its input
    Disconnected,
    /// Graph, parameter or source change
    Invalidated,
    /// Replaced by a newer Play
    Superseded,
}

/// Lifecycle hook delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Loading {
        pipeline_id: Uuid,
    },
    Armed {
        pipeline_id: Uuid,
        bpm: f64,
        effects: usize,
    },
    Stopped {
        reason: StopReason,
    },
    Failed {
        error: PlaybackError,
    },
}

/// Result of a successful rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebuilt {
    pub generation: u64,
    pub pipeline_id: Uuid,
    pub player: UnitId,
}

/// Result of arming
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmedPipeline {
    pub pipeline_id: Uuid,
    pub effects: usize,
    pub bpm: f64,
}

enum Slot<E: AudioEngine> {
    Stopped,
    Loading {
        generation: u64,
        pipeline: Pipeline<E>,
        /// Transport tempo to arm with; follows tempo changes during the load
        bpm: f64,
    },
    Armed {
        generation: u64,
        pipeline: Pipeline<E>,
        repeat: RepeatId,
    },
}

impl<E: AudioEngine> Slot<E> {
    fn state(&self) -> LifecycleState {
        match self {
            Slot::Stopped => LifecycleState::Stopped,
            Slot::Loading { .. } => LifecycleState::Loading,
            Slot::Armed { .. } => LifecycleState::Armed,
        }
    }

    fn pipeline(&self) -> Option<&Pipeline<E>> {
        match self {
            Slot::Stopped => None,
            Slot::Loading { pipeline, .. } | Slot::Armed { pipeline, .. } => Some(pipeline),
        }
    }
}

pub struct LifecycleManager<E: AudioEngine> {
    engine: Arc<E>,
    transport: SharedTransport,
    slot: Mutex<Slot<E>>,
    generation: AtomicU64,
}

impl<E: AudioEngine> LifecycleManager<E> {
    pub fn new(engine: Arc<E>, transport: SharedTransport) -> Self {
        Self {
            engine,
            transport,
            slot: Mutex::new(Slot::Stopped),
            generation: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LifecycleState {
        self.slot.lock().state()
    }

    /// Loading or Armed
    pub fn is_active(&self) -> bool {
        self.state() != LifecycleState::Stopped
    }

    pub fn is_armed(&self) -> bool {
        self.state() == LifecycleState::Armed
    }

    pub fn is_loading(&self) -> bool {
        self.state() == LifecycleState::Loading
    }

    pub fn pipeline_id(&self) -> Option<Uuid> {
        self.slot.lock().pipeline().map(Pipeline::id)
    }

    /// Release the live pipeline and stop the transport. Idempotent.
    /// Returns whether a pipeline was released.
    pub fn teardown(&self) -> bool {
        let mut slot = self.slot.lock();
        self.teardown_locked(&mut slot)
    }

    fn teardown_locked(&self, slot: &mut Slot<E>) -> bool {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let previous = std::mem::replace(slot, Slot::Stopped);
        let released = previous.pipeline().is_some();
        if let Slot::Armed { repeat, .. } = &previous {
            let mut transport = self.transport.lock();
            transport.clear(*repeat);
            scheduler::disarm(&mut transport);
        }
        // Dropping the pipeline stops its player and disposes its units
        drop(previous);
        if released {
            tracing::debug!("[Lifecycle] torn down");
        }
        released
    }

    /// Tear down whatever is live and compile a fresh pipeline in its place.
    ///
    /// The new pipeline is left `Loading`; the caller awaits the buffer load
    /// and then calls [`arm`](Self::arm) with the returned generation.
    pub fn rebuild(&self, request: &CompileRequest<'_>) -> Result<Rebuilt, PlaybackError> {
        let mut slot = self.slot.lock();
        self.teardown_locked(&mut slot);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let pipeline = Pipeline::compile(&self.engine, request)?;
        let rebuilt = Rebuilt {
            generation,
            pipeline_id: pipeline.id(),
            player: pipeline.player(),
        };
        tracing::debug!(
            "[Lifecycle] compiled {} with {} effect(s), generation {}",
            rebuilt.pipeline_id,
            pipeline.effect_count(),
            generation
        );
        *slot = Slot::Loading {
            generation,
            pipeline,
            bpm: request.bpm,
        };
        Ok(rebuilt)
    }

    /// Arm the pipeline of `generation` if it is still the loading one.
    /// Returns `None` when it was superseded or stopped meanwhile.
    pub fn arm(&self, generation: u64, now: f64) -> Option<ArmedPipeline> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Loading { generation: g, .. } if *g == generation => {}
            _ => return None,
        }
        let Slot::Loading { pipeline, bpm, .. } = std::mem::replace(&mut *slot, Slot::Stopped)
        else {
            return None;
        };

        let timing = *pipeline.timing();
        let repeat = {
            let mut transport = self.transport.lock();
            scheduler::arm(
                &mut transport,
                self.engine.clone(),
                pipeline.player(),
                &timing,
                bpm,
                pipeline.started_flag(),
                now,
            )
        };
        let armed = ArmedPipeline {
            pipeline_id: pipeline.id(),
            effects: pipeline.effect_count(),
            bpm,
        };
        tracing::info!(
            "[Lifecycle] armed {} at {} BPM (bar {:.3}s)",
            armed.pipeline_id,
            bpm,
            timing.adjusted_bar_duration
        );
        *slot = Slot::Armed {
            generation,
            pipeline,
            repeat,
        };
        Some(armed)
    }

    /// Tear down the pipeline of `generation` if it is still live
    pub fn discard(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        let current = match &*slot {
            Slot::Loading { generation: g, .. } | Slot::Armed { generation: g, .. } => *g,
            Slot::Stopped => return false,
        };
        if current != generation {
            return false;
        }
        self.teardown_locked(&mut slot)
    }

    /// Push a tempo to the transport while a pipeline is live.
    ///
    /// A loading pipeline also remembers it, so arming does not fall back to
    /// the tempo it was compiled at. Returns false when stopped.
    pub fn set_tempo(&self, bpm: f64) -> bool {
        let mut slot = self.slot.lock();
        match &mut *slot {
            Slot::Stopped => return false,
            Slot::Loading { bpm: pending, .. } => *pending = bpm,
            Slot::Armed { .. } => {}
        }
        self.transport.lock().set_bpm(bpm);
        true
    }

    /// Drive the transport clock to `now`
    pub fn tick(&self, now: f64) -> usize {
        self.transport.lock().advance_to(now)
    }
}

impl<E: AudioEngine> Drop for LifecycleManager<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effect::{EffectDescriptor, FilterParams};
    use crate::audio::source::SourceDescriptor;
    use crate::audio::transport::Transport;
    use crate::audio::virtual_engine::VirtualEngine;

    fn manager() -> (Arc<VirtualEngine>, LifecycleManager<VirtualEngine>) {
        let engine = Arc::new(VirtualEngine::new());
        let transport = Arc::new(Mutex::new(Transport::new()));
        let manager = LifecycleManager::new(engine.clone(), transport);
        (engine, manager)
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::from_url("mem://beat.mp3")
    }

    #[test]
    fn test_rebuild_arm_teardown() {
        let (engine, manager) = manager();
        let source = source();
        let chain = [EffectDescriptor::HighPass(FilterParams::default())];
        let request = CompileRequest {
            source: &source,
            chain: &chain,
            bpm: 120.0,
        };

        let rebuilt = manager.rebuild(&request).unwrap();
        assert!(manager.is_loading());
        assert_eq!(engine.live_units().len(), 2);

        let armed = manager.arm(rebuilt.generation, 0.0).unwrap();
        assert_eq!(armed.effects, 1);
        assert!(manager.is_armed());
        assert!(manager.transport().lock().is_started());

        manager.tick(4.0);
        assert_eq!(engine.player_starts(rebuilt.player), vec![0.0, 2.0, 4.0]);

        assert!(manager.teardown());
        assert!(!manager.teardown());
        assert!(engine.live_units().is_empty());
        assert_eq!(engine.stop_count(rebuilt.player), 1);
        assert!(!manager.transport().lock().is_started());
        assert_eq!(manager.transport().lock().repeat_count(), 0);
    }

    #[test]
    fn test_stale_generation_is_not_armed() {
        let (engine, manager) = manager();
        let source = source();
        let request = CompileRequest {
            source: &source,
            chain: &[],
            bpm: 120.0,
        };

        let first = manager.rebuild(&request).unwrap();
        let second = manager.rebuild(&request).unwrap();
        assert!(second.generation > first.generation);
        assert!(manager.arm(first.generation, 0.0).is_none());
        assert_eq!(engine.live_players(), vec![second.player]);

        manager.teardown();
        assert!(manager.arm(second.generation, 0.0).is_none());
        assert_eq!(engine.total_starts(), 0);
    }

    #[test]
    fn test_failed_compile_leaves_stopped() {
        let (engine, manager) = manager();
        engine.set_available(false);
        let source = source();
        let request = CompileRequest {
            source: &source,
            chain: &[],
            bpm: 120.0,
        };
        assert_eq!(
            manager.rebuild(&request).unwrap_err(),
            PlaybackError::EngineUnavailable
        );
        assert_eq!(manager.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_discard_only_matching_generation() {
        let (engine, manager) = manager();
        let source = source();
        let request = CompileRequest {
            source: &source,
            chain: &[],
            bpm: 90.0,
        };
        let rebuilt = manager.rebuild(&request).unwrap();
        assert!(!manager.discard(rebuilt.generation + 7));
        assert!(manager.is_loading());
        assert!(manager.discard(rebuilt.generation));
        assert!(engine.live_units().is_empty());
    }

    #[test]
    fn test_tempo_reaches_live_transport() {
        let (_engine, manager) = manager();
        assert!(!manager.set_tempo(150.0));

        let source = source();
        let request = CompileRequest {
            source: &source,
            chain: &[],
            bpm: 120.0,
        };
        let rebuilt = manager.rebuild(&request).unwrap();
        manager.arm(rebuilt.generation, 0.0).unwrap();
        assert!(manager.set_tempo(150.0));
        assert_eq!(manager.transport().lock().bpm(), 150.0);
    }

    #[test]
    fn test_tempo_set_while_loading_survives_arm() {
        let (engine, manager) = manager();
        let source = source();
        let request = CompileRequest {
            source: &source,
            chain: &[],
            bpm: 120.0,
        };
        let rebuilt = manager.rebuild(&request).unwrap();
        assert!(manager.set_tempo(180.0));

        let armed = manager.arm(rebuilt.generation, 0.0).unwrap();
        assert_eq!(armed.bpm, 180.0);
        assert_eq!(manager.transport().lock().bpm(), 180.0);

        // Rate stays at the compiled tempo; the retrigger period is one
        // compiled bar in seconds
        manager.tick(4.0);
        assert_eq!(engine.player_starts(rebuilt.player), vec![0.0, 2.0, 4.0]);
    }
}
