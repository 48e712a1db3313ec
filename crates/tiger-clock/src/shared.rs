//! The clock state shared by a master and its slaves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tiger_time::MediaTime;

/// Snapshot of clock state: a media time anchored to a system time, plus
/// run/tick flags and playback speed. Kept in plain microseconds internally;
/// [`MediaTime`] only appears at the public boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClockInt {
    pub(crate) media_time_us: i64,
    pub(crate) system_time: Instant,
    pub(crate) started: bool,
    pub(crate) ticking: bool,
    pub(crate) speed: f64,
}

impl Default for ClockInt {
    fn default() -> Self {
        Self {
            media_time_us: 0,
            system_time: Instant::now(),
            started: false,
            ticking: false,
            speed: 1.0,
        }
    }
}

/// Projects `state`'s media time forward to now if the clock is started and
/// ticking; otherwise returns the anchored media time unchanged. Mirrors the
/// original's `get_l()`/`getInt()`.
pub(crate) fn project(state: &ClockInt) -> i64 {
    if !state.started || !state.ticking {
        return state.media_time_us;
    }
    state.media_time_us + state.system_time.elapsed().as_micros() as i64
}

/// Clock state transitions a listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// The clock started (or resumed) ticking.
    Ticking,
    /// `set()` moved the media time without changing run state.
    TimeChanged,
    /// The clock paused.
    Paused,
}

/// Opaque key for a registered listener, scoped to one [`crate::Clock`]
/// instance so re-registering replaces rather than duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Clock state shared between one master [`crate::Clock`] and any number of
/// slaves. All mutation goes through a single lock; a generation counter lets
/// slaves skip the lock entirely when nothing has changed.
pub struct SharedClock {
    pub(crate) state: Mutex<ClockInt>,
    pub(crate) generation: AtomicU64,
    pub(crate) master_count: AtomicU8,
    listeners: Mutex<HashMap<ListenerId, Box<dyn Fn(ClockState) + Send>>>,
    next_listener_id: AtomicU64,
}

impl SharedClock {
    /// Builds a fresh, paused, unstarted clock at media time zero.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockInt::default()),
            generation: AtomicU64::new(0),
            master_count: AtomicU8::new(0),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Starts the clock without altering its media time. If a master clock
    /// exists, ticking is left for the master's own `start()`/`update()` to
    /// establish; otherwise this clock starts ticking immediately.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.started {
            return;
        }
        if self.master_count.load(Ordering::Acquire) == 0 {
            state.system_time = Instant::now();
            state.ticking = true;
        }
        state.started = true;
        drop(state);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify_listeners(ClockState::Ticking);
    }

    /// Sets the media time without altering run state.
    pub fn set(&self, t: MediaTime) {
        {
            let mut state = self.state.lock();
            state.media_time_us = t.as_micros();
            state.system_time = Instant::now();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify_listeners(ClockState::TimeChanged);
    }

    /// Replaces the entire state wholesale, bumping the generation. Used by
    /// a master [`crate::Clock`] to publish its own projected state. Does
    /// not notify listeners, matching the original: only `start`/`set`/
    /// `pause` are observable transitions, `update` is a continuous tick.
    pub(crate) fn update(&self, new_state: ClockInt) {
        *self.state.lock() = new_state;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current media time, including playback speed.
    pub fn get(&self) -> MediaTime {
        let state = self.state.lock();
        let us = project(&state);
        MediaTime::from_micros((us as f64 * state.speed) as i64)
    }

    /// Pauses the clock. Tracks may still be draining in-flight buffers, so
    /// the clock keeps reporting a frozen time rather than jumping; state
    /// only actually freezes here if there is no master clock to do it on
    /// this clock's behalf later.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if !state.started {
            return;
        }
        if self.master_count.load(Ordering::Acquire) == 0 {
            let frozen = project(&state);
            state.media_time_us = frozen;
            state.system_time = Instant::now();
            state.ticking = false;
        }
        state.started = false;
        drop(state);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify_listeners(ClockState::Paused);
    }

    /// Whether the clock is currently paused (not started).
    pub fn is_paused(&self) -> bool {
        !self.state.lock().started
    }

    /// Sets playback speed (1.0 = normal).
    pub fn set_speed(&self, speed: f64) {
        self.state.lock().speed = speed;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current playback speed.
    pub fn speed(&self) -> f64 {
        self.state.lock().speed
    }

    pub(crate) fn snapshot(&self) -> (ClockInt, u64) {
        let state = self.state.lock();
        (*state, self.generation.load(Ordering::Acquire))
    }

    pub(crate) fn alloc_listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_listener(&self, id: ListenerId, cb: Box<dyn Fn(ClockState) + Send>) {
        self.listeners.lock().insert(id, cb);
    }

    pub(crate) fn unregister_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    pub(crate) fn notify_listeners(&self, state: ClockState) {
        for cb in self.listeners.lock().values() {
            cb(state);
        }
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_ticking_with_no_master() {
        let clock = SharedClock::new();
        clock.start();
        assert!(!clock.is_paused());
        assert!(clock.get().as_micros() >= 0);
    }

    #[test]
    fn pause_freezes_time() {
        let clock = SharedClock::new();
        clock.set(MediaTime::from_micros(1_000_000));
        clock.start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        clock.pause();
        let t1 = clock.get();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let t2 = clock.get();
        assert_eq!(t1, t2);
        assert!(clock.is_paused());
    }

    #[test]
    fn set_does_not_change_run_state() {
        let clock = SharedClock::new();
        clock.start();
        clock.set(MediaTime::from_micros(5_000_000));
        assert!(!clock.is_paused());
    }
}
