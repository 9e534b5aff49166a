//! Virtual Engine - headless `AudioEngine` that renders nothing
//!
//! Records every unit, connection, start, stop and disposal so the graph
//! side can run offline. Loads complete immediately unless held open with
//! [`VirtualEngine::hold_loads`].

use super::engine::{AudioEngine, ContextState, UnitId, UnitSpec};
use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct VirtualUnit {
    spec: UnitSpec,
    outputs: Vec<UnitId>,
    to_destination: bool,
    loaded: bool,
    disposed: bool,
    starts: Vec<f64>,
    stops: usize,
}

#[derive(Debug)]
struct EngineState {
    available: bool,
    context: ContextState,
    resume_fails: bool,
    fail_loads: Option<String>,
    now: f64,
    next_unit_id: u64,
    units: BTreeMap<UnitId, VirtualUnit>,
}

impl EngineState {
    fn live_mut(&mut self, id: UnitId) -> Result<&mut VirtualUnit, EngineError> {
        self.units
            .get_mut(&id)
            .filter(|u| !u.disposed)
            .ok_or(EngineError::UnknownUnit(id))
    }

    fn reaches_destination(&self, from: UnitId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(unit) = self.units.get(&id).filter(|u| !u.disposed) else {
                continue;
            };
            if unit.to_destination {
                return true;
            }
            stack.extend(unit.outputs.iter().copied());
        }
        false
    }
}

pub struct VirtualEngine {
    state: Mutex<EngineState>,
    /// `true` while loads may complete
    loads_open: watch::Sender<bool>,
}

impl std::fmt::Debug for VirtualEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualEngine")
            .field("state", &*self.state.lock())
            .field("loads_open", &*self.loads_open.borrow())
            .finish()
    }
}

impl VirtualEngine {
    /// Available engine with a suspended context at time 0
    pub fn new() -> Self {
        let (loads_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(EngineState {
                available: true,
                context: ContextState::Suspended,
                resume_fails: false,
                fail_loads: None,
                now: 0.0,
                next_unit_id: 1,
                units: BTreeMap::new(),
            }),
            loads_open,
        }
    }

    /// Engine that reports itself as not loaded
    pub fn unavailable() -> Self {
        let engine = Self::new();
        engine.set_available(false);
        engine
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Make every later `resume` fail
    pub fn set_resume_fails(&self, fails: bool) {
        self.state.lock().resume_fails = fails;
    }

    /// Make every later load fail with `message`; `None` restores success
    pub fn set_fail_loads(&self, message: Option<&str>) {
        self.state.lock().fail_loads = message.map(str::to_string);
    }

    pub fn set_now(&self, now: f64) {
        self.state.lock().now = now;
    }

    pub fn advance(&self, seconds: f64) -> f64 {
        let mut state = self.state.lock();
        state.now += seconds;
        state.now
    }

    /// Keep loads pending until `release_loads`
    pub fn hold_loads(&self) {
        self.loads_open.send_replace(false);
    }

    pub fn release_loads(&self) {
        self.loads_open.send_replace(true);
    }

    // Inspection

    /// Units created and not yet disposed
    pub fn live_units(&self) -> Vec<UnitId> {
        let state = self.state.lock();
        state
            .units
            .iter()
            .filter(|(_, u)| !u.disposed)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn live_players(&self) -> Vec<UnitId> {
        let state = self.state.lock();
        state
            .units
            .iter()
            .filter(|(_, u)| !u.disposed && u.spec.is_player())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Live players with a path to the destination
    pub fn wired_players(&self) -> Vec<UnitId> {
        let state = self.state.lock();
        state
            .units
            .iter()
            .filter(|(_, u)| !u.disposed && u.spec.is_player())
            .map(|(id, _)| *id)
            .filter(|id| state.reaches_destination(*id))
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().units.len()
    }

    pub fn unit_spec(&self, id: UnitId) -> Option<UnitSpec> {
        self.state.lock().units.get(&id).map(|u| u.spec.clone())
    }

    pub fn outputs(&self, id: UnitId) -> Vec<UnitId> {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| u.outputs.clone())
            .unwrap_or_default()
    }

    pub fn is_wired_to_destination(&self, id: UnitId) -> bool {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| !u.disposed && u.to_destination)
            .unwrap_or(false)
    }

    pub fn is_disposed(&self, id: UnitId) -> bool {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| u.disposed)
            .unwrap_or(false)
    }

    pub fn is_loaded(&self, id: UnitId) -> bool {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| u.loaded)
            .unwrap_or(false)
    }

    /// Clock times at which a player was (re)started
    pub fn player_starts(&self, id: UnitId) -> Vec<f64> {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| u.starts.clone())
            .unwrap_or_default()
    }

    /// Player starts across every unit ever created
    pub fn total_starts(&self) -> usize {
        self.state.lock().units.values().map(|u| u.starts.len()).sum()
    }

    pub fn stop_count(&self, id: UnitId) -> usize {
        self.state
            .lock()
            .units
            .get(&id)
            .map(|u| u.stops)
            .unwrap_or(0)
    }
}

impl Default for VirtualEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for VirtualEngine {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    fn context_state(&self) -> ContextState {
        self.state.lock().context
    }

    async fn resume(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.available || state.resume_fails {
            return Err(EngineError::Unavailable);
        }
        state.context = ContextState::Running;
        Ok(())
    }

    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn create_unit(&self, spec: &UnitSpec) -> Result<UnitId, EngineError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(EngineError::Unavailable);
        }
        let id = UnitId::new(state.next_unit_id);
        state.next_unit_id += 1;
        state.units.insert(
            id,
            VirtualUnit {
                spec: spec.clone(),
                outputs: Vec::new(),
                to_destination: false,
                loaded: !spec.is_player(),
                disposed: false,
                starts: Vec::new(),
                stops: 0,
            },
        );
        Ok(id)
    }

    fn connect(&self, from: UnitId, to: UnitId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.live_mut(to)?;
        let unit = state.live_mut(from)?;
        if !unit.outputs.contains(&to) {
            unit.outputs.push(to);
        }
        Ok(())
    }

    fn connect_to_destination(&self, unit: UnitId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.live_mut(unit)?.to_destination = true;
        Ok(())
    }

    async fn load(&self, player: UnitId) -> Result<(), EngineError> {
        let mut open = self.loads_open.subscribe();
        // The sender lives in `self`, so this only returns once loads open
        let _ = open.wait_for(|open| *open).await;

        let mut state = self.state.lock();
        if let Some(message) = &state.fail_loads {
            return Err(EngineError::Load(message.clone()));
        }
        state.live_mut(player)?.loaded = true;
        Ok(())
    }

    fn start_player(&self, player: UnitId, at: f64) {
        let mut state = self.state.lock();
        if let Ok(unit) = state.live_mut(player) {
            unit.starts.push(at);
        }
    }

    fn stop_player(&self, player: UnitId) {
        let mut state = self.state.lock();
        if let Ok(unit) = state.live_mut(player) {
            unit.stops += 1;
        }
    }

    fn dispose(&self, id: UnitId) {
        let mut state = self.state.lock();
        if let Some(unit) = state.units.get_mut(&id) {
            unit.disposed = true;
            unit.outputs.clear();
            unit.to_destination = false;
        }
        for unit in state.units.values_mut() {
            unit.outputs.retain(|out| *out != id);
        }
    }
}
