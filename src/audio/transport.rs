//! Transport - the shared tempo clock
//!
//! Time is counted in ticks (PPQ per beat). Repeats are scheduled with an
//! interval in seconds that is converted to ticks at the tempo in effect at
//! scheduling time, so a later tempo change speeds up or slows down repeats
//! that are already in flight. The clock itself is driven from outside via
//! [`Transport::advance_to`] with the engine's current time.

use parking_lot::Mutex;
use std::sync::{Arc, LazyLock};

/// Ticks per quarter note
pub const PPQ: f64 = 192.0;

/// Default tempo
pub const DEFAULT_BPM: f64 = 120.0;

/// Callback invoked with the exact scheduled time of each firing
pub type RepeatCallback = Box<dyn FnMut(f64) + Send>;

/// Handle of a scheduled repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepeatId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
}

struct Repeat {
    id: RepeatId,
    start_tick: f64,
    interval_ticks: f64,
    next_tick: f64,
    callback: RepeatCallback,
}

pub struct Transport {
    bpm: f64,
    state: TransportState,
    /// Clock time of the latest advance
    clock: f64,
    /// Tick position at `clock`
    ticks: f64,
    repeats: Vec<Repeat>,
    next_repeat_id: u64,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("bpm", &self.bpm)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("ticks", &self.ticks)
            .field("repeats", &self.repeats.len())
            .finish()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            state: TransportState::Stopped,
            clock: 0.0,
            ticks: 0.0,
            repeats: Vec::new(),
            next_repeat_id: 1,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change the tempo from the latest clock position onward
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() && bpm > 0.0 {
            self.bpm = bpm;
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == TransportState::Started
    }

    /// Tick position at the latest advance
    pub fn position_ticks(&self) -> f64 {
        self.ticks
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.bpm / 60.0 * PPQ
    }

    pub fn repeat_count(&self) -> usize {
        self.repeats.len()
    }

    /// Schedule a callback every `interval_seconds`, starting at tick 0
    pub fn schedule_repeat(&mut self, callback: RepeatCallback, interval_seconds: f64) -> RepeatId {
        let interval_ticks = (interval_seconds * self.ticks_per_second()).max(1.0);
        let id = RepeatId(self.next_repeat_id);
        self.next_repeat_id += 1;
        self.repeats.push(Repeat {
            id,
            start_tick: 0.0,
            interval_ticks,
            next_tick: 0.0,
            callback,
        });
        id
    }

    /// Remove one repeat
    pub fn clear(&mut self, id: RepeatId) -> bool {
        let len_before = self.repeats.len();
        self.repeats.retain(|r| r.id != id);
        self.repeats.len() < len_before
    }

    /// Remove every scheduled repeat
    pub fn cancel(&mut self) {
        self.repeats.clear();
    }

    /// Start at clock time `at` from tick 0. No-op while already started.
    pub fn start(&mut self, at: f64) {
        if self.is_started() {
            return;
        }
        self.state = TransportState::Started;
        self.clock = at;
        self.ticks = 0.0;
        for repeat in &mut self.repeats {
            repeat.next_tick = repeat.start_tick;
        }
    }

    /// Stop and rewind to tick 0
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.ticks = 0.0;
    }

    /// Advance the clock to `now`, firing every repeat due up to and
    /// including that time in tick order. Returns the number of firings.
    pub fn advance_to(&mut self, now: f64) -> usize {
        if !self.is_started() {
            self.clock = now;
            return 0;
        }
        if now < self.clock {
            return 0;
        }

        let tps = self.ticks_per_second();
        let end_ticks = self.ticks + (now - self.clock) * tps;
        let mut fired = 0;

        loop {
            let due = self
                .repeats
                .iter_mut()
                .filter(|r| r.next_tick <= end_ticks)
                .min_by(|a, b| a.next_tick.total_cmp(&b.next_tick));
            let Some(repeat) = due else {
                break;
            };
            let time = self.clock + (repeat.next_tick - self.ticks) / tps;
            (repeat.callback)(time);
            repeat.next_tick += repeat.interval_ticks;
            fired += 1;
        }

        self.ticks = end_ticks;
        self.clock = now;
        fired
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport shared between the scheduler and the lifecycle manager
pub type SharedTransport = Arc<Mutex<Transport>>;

static TRANSPORT: LazyLock<SharedTransport> =
    LazyLock::new(|| Arc::new(Mutex::new(Transport::new())));

/// Get the process-wide transport
pub fn shared_transport() -> SharedTransport {
    TRANSPORT.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, RepeatCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, Box::new(move |t| sink.lock().push(t)))
    }

    fn assert_times(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn test_repeat_fires_at_scheduled_times() {
        let mut transport = Transport::new();
        let (log, cb) = recorder();
        transport.schedule_repeat(cb, 2.0);
        transport.start(10.0);

        assert_eq!(transport.advance_to(10.0), 1);
        transport.advance_to(11.3);
        transport.advance_to(15.0);
        assert_times(&log.lock(), &[10.0, 12.0, 14.0]);
    }

    #[test]
    fn test_tempo_change_rescales_inflight_repeat() {
        let mut transport = Transport::new();
        let (log, cb) = recorder();
        transport.schedule_repeat(cb, 2.0);
        transport.start(0.0);
        transport.advance_to(3.0);

        // Double tempo at t=3: the bar (768 ticks) now lasts 1s
        transport.set_bpm(240.0);
        transport.advance_to(6.0);
        assert_times(&log.lock(), &[0.0, 2.0, 3.5, 4.5, 5.5]);
    }

    #[test]
    fn test_stopped_transport_never_fires() {
        let mut transport = Transport::new();
        let (log, cb) = recorder();
        transport.schedule_repeat(cb, 1.0);
        transport.advance_to(5.0);
        assert!(log.lock().is_empty());

        transport.start(5.0);
        transport.advance_to(5.0);
        transport.stop();
        transport.advance_to(9.0);
        assert_times(&log.lock(), &[5.0]);
    }

    #[test]
    fn test_cancel_and_clear() {
        let mut transport = Transport::new();
        let (log_a, a) = recorder();
        let (log_b, b) = recorder();
        let id_a = transport.schedule_repeat(a, 1.0);
        transport.schedule_repeat(b, 1.0);
        assert!(transport.clear(id_a));
        assert!(!transport.clear(id_a));

        transport.start(0.0);
        transport.advance_to(0.5);
        assert!(log_a.lock().is_empty());
        assert_eq!(log_b.lock().len(), 1);

        transport.cancel();
        assert_eq!(transport.repeat_count(), 0);
        transport.advance_to(4.0);
        assert_eq!(log_b.lock().len(), 1);
    }

    #[test]
    fn test_restart_rewinds_repeats() {
        let mut transport = Transport::new();
        let (log, cb) = recorder();
        transport.schedule_repeat(cb, 2.0);
        transport.start(0.0);
        transport.advance_to(3.0);
        transport.stop();

        transport.start(20.0);
        transport.advance_to(20.0);
        assert_times(&log.lock(), &[0.0, 2.0, 20.0]);
    }

    #[test]
    fn test_rejects_invalid_bpm() {
        let mut transport = Transport::new();
        transport.set_bpm(0.0);
        transport.set_bpm(f64::NAN);
        assert_eq!(transport.bpm(), DEFAULT_BPM);
    }
}
