//! Playback Scheduler - tempo-adjusted looping driven by the transport
//!
//! Looping does not use the player's own loop flag: a changed playback rate
//! changes the buffer's natural duration, so the player is retriggered once
//! per bar from a transport repeat instead.

use super::engine::{AudioEngine, UnitId};
use super::transport::{RepeatId, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tempo at which the source material plays at normal speed
pub const REFERENCE_BPM: f64 = 120.0;

/// Beats per loop bar
pub const BEATS_PER_BAR: u32 = 4;

/// Loop timing derived from a tempo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    pub bpm: f64,
    /// bpm / REFERENCE_BPM
    pub playback_rate: f64,
    /// One bar at the reference tempo, in seconds
    pub bar_duration_at_reference: f64,
    /// One bar at the chosen tempo, in seconds
    pub adjusted_bar_duration: f64,
}

impl LoopTiming {
    pub fn for_tempo(bpm: f64) -> Self {
        let playback_rate = bpm / REFERENCE_BPM;
        let bar_duration_at_reference = (60.0 / REFERENCE_BPM) * BEATS_PER_BAR as f64;
        Self {
            bpm,
            playback_rate,
            bar_duration_at_reference,
            adjusted_bar_duration: bar_duration_at_reference / playback_rate,
        }
    }
}

/// Arm looping playback of `player` on the transport.
///
/// Sets the transport to `bpm`, clears any previous repeats, registers one
/// repeat per bar that restarts the player at the firing's scheduled time,
/// and starts the transport at `now`. `started` is raised on the first
/// firing. `bpm` differs from `timing.bpm` when the tempo moved after the
/// pipeline was compiled.
pub fn arm<E: AudioEngine>(
    transport: &mut Transport,
    engine: Arc<E>,
    player: UnitId,
    timing: &LoopTiming,
    bpm: f64,
    started: Arc<AtomicBool>,
    now: f64,
) -> RepeatId {
    transport.set_bpm(bpm);
    transport.cancel();

    let id = transport.schedule_repeat(
        Box::new(move |time| {
            engine.start_player(player, time);
            started.store(true, Ordering::Release);
        }),
        timing.adjusted_bar_duration,
    );

    transport.start(now);
    id
}

/// Clear every repeat and stop the transport
pub fn disarm(transport: &mut Transport) {
    transport.cancel();
    transport.stop();
}
