//! Patch Controller - single owner of the patch and its playback
//!
//! Holds the versioned graph, the parameter store, the selected source and
//! the tempo. Every edit that can change what would be heard tears down the
//! live pipeline; Play rebuilds it from the memoized chain.

use crate::api::dto::{PatchDto, StatusDto};
use crate::audio::chain::{resolve_chain, walk_upstream, ParamStore};
use crate::audio::lifecycle::{LifecycleEvent, LifecycleManager, LifecycleState, StopReason};
use crate::audio::pipeline::{check_preconditions, CompileRequest};
use crate::audio::{
    shared_transport, AudioEngine, AudioGraph, ContextState, EdgeId, EffectDescriptor, EffectKind,
    GraphVersion, NodeId, SharedTransport, SourceDescriptor,
};
use crate::catalog::Catalog;
use crate::config::{get_config, AppConfig};
use crate::error::{PatchError, PlaybackError};
use arc_swap::ArcSwap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_SELECT_SONG: &str = "Connected - Select a song";
pub const STATUS_READY: &str = "Connected - Ready to play";
pub const STATUS_ERROR: &str = "Error playing audio";

/// How a Play request ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Looping playback is running
    Armed,
    /// A pipeline was already loading or armed; nothing changed
    AlreadyPlaying,
    /// A Stop, an edit or a newer Play replaced this request before it armed
    Superseded,
}

/// Editable patch state
struct PatchState {
    graph: AudioGraph,
    params: ParamStore,
    params_version: u64,
    source: Option<SourceDescriptor>,
    bpm: f64,
}

impl PatchState {
    fn chain_key(&self) -> (GraphVersion, u64) {
        (self.graph.version(), self.params_version)
    }

    fn idle_status(&self) -> &'static str {
        if !self.graph.is_connected() {
            STATUS_DISCONNECTED
        } else if self.source.is_none() {
            STATUS_SELECT_SONG
        } else {
            STATUS_READY
        }
    }
}

/// Memoized chain
struct ChainCache {
    key: (GraphVersion, u64),
    chain: Vec<EffectDescriptor>,
}

pub struct PatchController<E: AudioEngine> {
    state: RwLock<PatchState>,
    chain_cache: Mutex<Option<ChainCache>>,
    lifecycle: LifecycleManager<E>,
    config: AppConfig,
    status: ArcSwap<String>,
    subscribers: Mutex<Vec<Sender<LifecycleEvent>>>,
}

impl<E: AudioEngine> PatchController<E> {
    /// Controller on the process-wide transport and the saved config
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_transport(engine, shared_transport(), get_config())
    }

    pub fn with_transport(engine: Arc<E>, transport: SharedTransport, config: AppConfig) -> Self {
        let state = PatchState {
            graph: AudioGraph::new(),
            params: ParamStore::new(),
            params_version: 0,
            source: None,
            bpm: config.clamp_bpm(config.default_bpm),
        };
        let status = ArcSwap::from_pointee(state.idle_status().to_string());
        Self {
            state: RwLock::new(state),
            chain_cache: Mutex::new(None),
            lifecycle: LifecycleManager::new(engine, transport),
            config,
            status,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        self.lifecycle.engine()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_playing(&self) -> bool {
        self.lifecycle.is_armed()
    }

    /// Read access to the graph
    pub fn with_graph<R>(&self, f: impl FnOnce(&AudioGraph) -> R) -> R {
        f(&self.state.read().graph)
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().graph.is_connected()
    }

    pub fn bpm(&self) -> f64 {
        self.state.read().bpm
    }

    pub fn source(&self) -> Option<SourceDescriptor> {
        self.state.read().source.clone()
    }

    pub fn effect_params(&self, id: NodeId) -> Option<EffectDescriptor> {
        self.state.read().params.get(&id).copied()
    }

    // --- Lifecycle hooks ---

    /// Receive every lifecycle event from now on
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, event: LifecycleEvent) {
        // Drop subscribers whose receiver is gone
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    // --- Status ---

    pub fn status(&self) -> String {
        (**self.status.load()).clone()
    }

    fn set_status(&self, status: String) {
        self.status.store(Arc::new(status));
    }

    fn refresh_idle_status(&self) {
        if !self.lifecycle.is_armed() {
            let status = self.state.read().idle_status();
            self.set_status(status.to_string());
        }
    }

    // --- Chain ---

    /// Current ordered chain, recomputed only when the graph or a parameter changed
    pub fn chain(&self) -> Vec<EffectDescriptor> {
        let state = self.state.read();
        self.chain_for(&state)
    }

    fn chain_for(&self, state: &PatchState) -> Vec<EffectDescriptor> {
        let key = state.chain_key();
        let mut cache = self.chain_cache.lock();
        if let Some(cached) = cache.as_ref().filter(|c| c.key == key) {
            return cached.chain.clone();
        }
        let chain = resolve_chain(&state.graph, &state.params);
        tracing::debug!(
            "[Controller] chain recomputed: {} effect(s) at graph {:?}",
            chain.len(),
            key.0
        );
        *cache = Some(ChainCache {
            key,
            chain: chain.clone(),
        });
        chain
    }

    // --- Invalidation ---

    fn invalidate(&self, reason: StopReason) {
        if self.lifecycle.teardown() {
            tracing::info!("[Controller] playback stopped ({:?})", reason);
            self.emit(LifecycleEvent::Stopped { reason });
        }
        self.refresh_idle_status();
    }

    fn invalidate_after_edit(&self) {
        let reason = if self.is_connected() {
            StopReason::Invalidated
        } else {
            StopReason::Disconnected
        };
        self.invalidate(reason);
    }

    // --- Graph edit surface ---

    pub fn add_effect_node(&self, kind: EffectKind) -> NodeId {
        let id = self.state.write().graph.add_effect_node(kind);
        self.invalidate_after_edit();
        id
    }

    /// Remove an effect node, its edges and its parameters
    pub fn remove_node(&self, id: NodeId) -> bool {
        let removed = {
            let mut state = self.state.write();
            let removed = state.graph.remove_node(id);
            if removed && state.params.remove(&id).is_some() {
                state.params_version += 1;
            }
            removed
        };
        if removed {
            self.invalidate_after_edit();
        }
        removed
    }

    pub fn connect(&self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        let edge = self.state.write().graph.add_edge(source, target);
        if edge.is_some() {
            self.invalidate_after_edit();
        }
        edge
    }

    pub fn disconnect(&self, edge: EdgeId) -> bool {
        let removed = self.state.write().graph.remove_edge(edge);
        if removed {
            self.invalidate_after_edit();
        }
        removed
    }

    /// Restore a saved patch. The live pipeline is torn down.
    ///
    /// Parameter records that do not belong to an effect node of the same
    /// kind are dropped.
    pub fn restore(&self, patch: &PatchDto) {
        {
            let mut state = self.state.write();
            let mut graph = patch.graph.to_graph();
            graph.advance_past(state.graph.version());
            state.params = patch
                .params
                .iter()
                .filter_map(|p| {
                    let expected = graph.node(p.node).and_then(|n| n.kind.effect_kind());
                    if expected == Some(p.params.kind()) {
                        Some((p.node, p.params.clamped()))
                    } else {
                        tracing::warn!(
                            "[Controller] dropping {:?} params saved for node {:?}",
                            p.params.kind(),
                            p.node
                        );
                        None
                    }
                })
                .collect();
            state.graph = graph;
            state.params_version += 1;
            state.source = patch.source.clone();
            state.bpm = self.config.clamp_bpm(patch.bpm);
        }
        self.invalidate_after_edit();
    }

    // --- Parameter surface ---

    /// Store parameters for an effect node. Values are clamped to their
    /// ranges. The live pipeline is only torn down when the node feeds it.
    pub fn set_effect_params(&self, id: NodeId, params: EffectDescriptor) -> Result<(), PatchError> {
        let on_path = {
            let mut state = self.state.write();
            let node = state.graph.node(id).ok_or(PatchError::UnknownNode(id))?;
            let expected = node.kind.effect_kind().ok_or(PatchError::NotAnEffect(id))?;
            if expected != params.kind() {
                return Err(PatchError::KindMismatch {
                    expected,
                    actual: params.kind(),
                });
            }
            state.params.insert(id, params.clamped());
            state.params_version += 1;
            walk_upstream(&state.graph).contains(&id)
        };
        if on_path {
            self.invalidate(StopReason::Invalidated);
        }
        Ok(())
    }

    // --- Source catalog surface ---

    pub fn select_source(&self, source: Option<SourceDescriptor>) {
        {
            let mut state = self.state.write();
            if state.source == source {
                return;
            }
            state.source = source;
        }
        self.invalidate(StopReason::Invalidated);
    }

    /// Resolve and select a catalog entry. An out-of-range selection clears
    /// the source.
    pub fn select_sound(&self, catalog: &Catalog, pack: usize, sound: usize) -> Option<SourceDescriptor> {
        let source = catalog.resolve(pack, sound, &self.config.media_base_url);
        if source.is_none() {
            tracing::warn!("[Controller] no sound at pack {} / sound {}", pack, sound);
        }
        self.select_source(source.clone());
        source
    }

    // --- Transport control surface ---

    /// Set the tempo, clamped to the configured range. Pushed to the
    /// transport at once while a pipeline is loading or armed; a live
    /// pipeline keeps its playback rate.
    pub fn set_tempo(&self, bpm: f64) -> f64 {
        let bpm = self.config.clamp_bpm(bpm);
        // Held across the push so a concurrent Play compiles either the old
        // tempo and then receives this one, or compiles this one
        let mut state = self.state.write();
        state.bpm = bpm;
        if self.lifecycle.set_tempo(bpm) {
            tracing::debug!("[Controller] transport tempo now {} BPM", bpm);
        }
        bpm
    }

    /// Drive the transport clock to `now`
    pub fn tick(&self, now: f64) -> usize {
        self.lifecycle.tick(now)
    }

    /// Drive the transport clock to the engine's current time
    pub fn tick_engine(&self) -> usize {
        self.tick(self.engine().now())
    }

    // --- Play / Stop ---

    /// Build the pipeline for the current patch and start looping it.
    ///
    /// Declines with `InvalidPreconditions` (status untouched) when no source
    /// is selected or the sink has no input. Does nothing while a pipeline is
    /// already loading or armed.
    ///
    /// Arming starts the transport but nothing advances it: the caller must
    /// keep calling [`tick_engine`](Self::tick_engine) (or [`tick`](Self::tick))
    /// for the loop to retrigger.
    pub async fn play(&self) -> Result<PlayOutcome, PlaybackError> {
        if let Err(e) = self.check_play() {
            tracing::debug!("[Controller] play declined: {}", e);
            return Err(e);
        }
        if self.lifecycle.is_active() {
            return Ok(PlayOutcome::AlreadyPlaying);
        }

        let engine = self.engine().clone();
        if !engine.is_available() {
            return Err(self.fail(PlaybackError::EngineUnavailable));
        }

        let generation = self.lifecycle.generation();
        if engine.context_state() != ContextState::Running {
            if let Err(e) = engine.resume().await {
                return Err(self.fail(e.into()));
            }
        }
        if self.lifecycle.generation() != generation {
            tracing::debug!("[Controller] play superseded during engine start");
            return Ok(PlayOutcome::Superseded);
        }

        let (source, rebuilt) = {
            // Held through the rebuild so a tempo change cannot slip between
            // reading the tempo and the pipeline becoming Loading
            let state = self.state.read();
            let source = check_preconditions(state.source.as_ref(), state.graph.is_connected())?
                .clone();
            let chain = self.chain_for(&state);
            let rebuilt = self.lifecycle.rebuild(&CompileRequest {
                source: &source,
                chain: &chain,
                bpm: state.bpm,
            });
            (source, rebuilt)
        };
        let rebuilt = match rebuilt {
            Ok(rebuilt) => rebuilt,
            Err(e) => return Err(self.fail(e)),
        };
        self.emit(LifecycleEvent::Loading {
            pipeline_id: rebuilt.pipeline_id,
        });

        if let Err(e) = engine.load(rebuilt.player).await {
            if self.lifecycle.discard(rebuilt.generation) {
                return Err(self.fail(e.into()));
            }
            tracing::debug!("[Controller] load of superseded pipeline failed: {}", e);
            return Ok(PlayOutcome::Superseded);
        }

        let Some(armed) = self.lifecycle.arm(rebuilt.generation, engine.now()) else {
            tracing::debug!(
                "[Controller] discarding stale load of {}",
                rebuilt.pipeline_id
            );
            return Ok(PlayOutcome::Superseded);
        };

        let effects_text = if armed.effects > 0 {
            format!(" with {} effect(s)", armed.effects)
        } else {
            String::new()
        };
        self.set_status(format!(
            "Playing: {}{} at {} BPM (looping)",
            source.display_name(),
            effects_text,
            armed.bpm
        ));
        self.emit(LifecycleEvent::Armed {
            pipeline_id: armed.pipeline_id,
            bpm: armed.bpm,
            effects: armed.effects,
        });
        Ok(PlayOutcome::Armed)
    }

    fn check_play(&self) -> Result<(), PlaybackError> {
        let state = self.state.read();
        check_preconditions(state.source.as_ref(), state.graph.is_connected()).map(|_| ())
    }

    /// Tear down after a failed Play and report it
    fn fail(&self, error: PlaybackError) -> PlaybackError {
        self.lifecycle.teardown();
        tracing::error!("[Controller] Error playing audio: {}", error);
        self.set_status(STATUS_ERROR.to_string());
        self.emit(LifecycleEvent::Failed {
            error: error.clone(),
        });
        error
    }

    /// Stop playback, including a Play that is still loading
    pub fn stop(&self) {
        self.invalidate(StopReason::Explicit);
    }

    // --- Snapshots ---

    pub fn snapshot(&self) -> PatchDto {
        let state = self.state.read();
        PatchDto::capture(&state.graph, &state.params, state.source.clone(), state.bpm)
    }

    pub fn status_dto(&self) -> StatusDto {
        let (connected, has_source, bpm) = {
            let state = self.state.read();
            (state.graph.is_connected(), state.source.is_some(), state.bpm)
        };
        StatusDto {
            text: self.status(),
            state: self.lifecycle.state().into(),
            connected,
            has_source,
            bpm,
            pipeline_id: self.lifecycle.pipeline_id().map(|id| id.to_string()),
            effects: self.chain().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::NodeParamsDto;
    use crate::audio::effect::{DelayParams, FilterParams, PitchShiftParams};
    use crate::audio::{Transport, VirtualEngine};

    fn controller() -> (Arc<VirtualEngine>, PatchController<VirtualEngine>) {
        let engine = Arc::new(VirtualEngine::new());
        let transport = Arc::new(parking_lot::Mutex::new(Transport::new()));
        let controller =
            PatchController::with_transport(engine.clone(), transport, AppConfig::default());
        (engine, controller)
    }

    fn ends(controller: &PatchController<VirtualEngine>) -> (NodeId, NodeId) {
        controller.with_graph(|g| (g.find_source().unwrap(), g.find_sink().unwrap()))
    }

    #[test]
    fn test_idle_status_follows_patch() {
        let (_engine, controller) = controller();
        assert_eq!(controller.status(), STATUS_DISCONNECTED);

        let (source, sink) = ends(&controller);
        controller.connect(source, sink).unwrap();
        assert_eq!(controller.status(), STATUS_SELECT_SONG);

        controller.select_source(Some(SourceDescriptor::from_url("mem://a.mp3")));
        assert_eq!(controller.status(), STATUS_READY);
    }

    #[test]
    fn test_chain_is_memoized_per_version() {
        let (_engine, controller) = controller();
        let (source, sink) = ends(&controller);
        let fx = controller.add_effect_node(EffectKind::Delay);
        controller.connect(source, fx).unwrap();
        controller.connect(fx, sink).unwrap();
        assert!(controller.chain().is_empty());

        controller
            .set_effect_params(fx, EffectDescriptor::Delay(DelayParams::default()))
            .unwrap();
        assert_eq!(
            controller.chain(),
            vec![EffectDescriptor::Delay(DelayParams::default())]
        );
        assert_eq!(controller.chain().len(), 1);
    }

    #[test]
    fn test_params_are_validated_and_clamped() {
        let (_engine, controller) = controller();
        let (source, _sink) = ends(&controller);
        let fx = controller.add_effect_node(EffectKind::PitchShift);

        assert_eq!(
            controller.set_effect_params(source, EffectDescriptor::PitchShift(PitchShiftParams::default())),
            Err(PatchError::NotAnEffect(source))
        );
        assert_eq!(
            controller.set_effect_params(fx, EffectDescriptor::HighPass(FilterParams::default())),
            Err(PatchError::KindMismatch {
                expected: EffectKind::PitchShift,
                actual: EffectKind::HighPass,
            })
        );
        assert_eq!(
            controller.set_effect_params(
                NodeId::from_raw(99),
                EffectDescriptor::PitchShift(PitchShiftParams::default())
            ),
            Err(PatchError::UnknownNode(NodeId::from_raw(99)))
        );

        controller
            .set_effect_params(fx, EffectDescriptor::PitchShift(PitchShiftParams { semitones: 40 }))
            .unwrap();
        assert_eq!(
            controller.effect_params(fx),
            Some(EffectDescriptor::PitchShift(PitchShiftParams { semitones: 10 }))
        );
    }

    #[test]
    fn test_tempo_is_clamped() {
        let (_engine, controller) = controller();
        assert_eq!(controller.bpm(), 120.0);
        assert_eq!(controller.set_tempo(20.0), 60.0);
        assert_eq!(controller.set_tempo(480.0), 200.0);
    }

    #[test]
    fn test_remove_node_drops_params() {
        let (_engine, controller) = controller();
        let fx = controller.add_effect_node(EffectKind::LowPass);
        controller
            .set_effect_params(fx, EffectDescriptor::LowPass(FilterParams::default()))
            .unwrap();
        assert!(controller.remove_node(fx));
        assert!(controller.effect_params(fx).is_none());

        let (source, sink) = ends(&controller);
        assert!(!controller.remove_node(source));
        assert!(!controller.remove_node(sink));
    }

    #[test]
    fn test_snapshot_restore() {
        let (_engine, controller) = controller();
        let (source, sink) = ends(&controller);
        let fx = controller.add_effect_node(EffectKind::HighPass);
        controller.connect(source, fx).unwrap();
        controller.connect(fx, sink).unwrap();
        controller
            .set_effect_params(fx, EffectDescriptor::HighPass(FilterParams { frequency_hz: 440.0 }))
            .unwrap();
        controller.set_tempo(90.0);
        let saved = controller.snapshot();

        let (_engine, other) = self::controller();
        other.restore(&saved);
        assert_eq!(other.chain(), controller.chain());
        assert_eq!(other.bpm(), 90.0);
        assert!(other.is_connected());
    }

    #[test]
    fn test_restore_drops_mismatched_params() {
        let (_engine, controller) = controller();
        let (source, sink) = ends(&controller);
        let fx = controller.add_effect_node(EffectKind::HighPass);
        controller.connect(source, fx).unwrap();
        controller.connect(fx, sink).unwrap();
        let mut saved = controller.snapshot();
        saved.params = vec![
            NodeParamsDto {
                node: fx,
                params: EffectDescriptor::Delay(DelayParams::default()),
            },
            NodeParamsDto {
                node: source,
                params: EffectDescriptor::HighPass(FilterParams::default()),
            },
            NodeParamsDto {
                node: NodeId::from_raw(77),
                params: EffectDescriptor::HighPass(FilterParams::default()),
            },
        ];

        let (_engine, other) = self::controller();
        other.restore(&saved);
        assert!(other.effect_params(fx).is_none());
        assert!(other.effect_params(source).is_none());
        assert!(other.effect_params(NodeId::from_raw(77)).is_none());
        assert!(other.chain().is_empty());
    }

    #[test]
    fn test_restore_moves_graph_version_forward() {
        let (_engine, controller) = controller();
        for _ in 0..5 {
            controller.add_effect_node(EffectKind::Reverb);
        }
        let before = controller.with_graph(|g| g.version());

        let (_engine, fresh) = self::controller();
        controller.restore(&fresh.snapshot());
        assert!(controller.with_graph(|g| g.version()) > before);
    }
}
