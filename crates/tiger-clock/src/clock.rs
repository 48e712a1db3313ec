//! A master or slave handle onto a [`SharedClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tiger_time::MediaTime;

use crate::shared::{project, ClockInt, ClockState, ListenerId, SharedClock};

/// Whether a [`Clock`] drives the shared state (master) or only observes it
/// (slave). Exactly one master is allowed per [`SharedClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRole {
    /// Drives the shared clock's media time forward.
    Master,
    /// Observes the shared clock; cannot call `update`.
    Slave,
}

/// A handle onto a [`SharedClock`], playing either the master or a slave
/// role. Reads go through a shadow copy refreshed only when the shared
/// generation has advanced, so a slave checking the time on every render
/// tick does not contend a lock in the common case.
pub struct Clock {
    shared: Arc<SharedClock>,
    role: ClockRole,
    id: ListenerId,
    shadow: Mutex<ClockInt>,
    shadow_generation: AtomicU64,
}

impl Clock {
    /// Attaches a new handle to `shared` under `role`.
    ///
    /// # Panics
    /// If `role` is [`ClockRole::Master`] and a master handle already exists
    /// for `shared`.
    pub fn new(shared: Arc<SharedClock>, role: ClockRole) -> Self {
        if role == ClockRole::Master {
            let prev = shared.master_count.fetch_add(1, Ordering::SeqCst);
            assert_eq!(prev, 0, "only one master clock allowed per SharedClock");
        }
        let id = shared.alloc_listener_id();
        let (state, generation) = shared.snapshot();
        Self {
            shared,
            role,
            id,
            shadow: Mutex::new(state),
            shadow_generation: AtomicU64::new(generation),
        }
    }

    /// This handle's role.
    pub fn role(&self) -> ClockRole {
        self.role
    }

    fn reload(&self) {
        let gen = self.shared.generation.load(Ordering::Acquire);
        if gen == self.shadow_generation.load(Ordering::Acquire) {
            return;
        }
        let (state, generation) = self.shared.snapshot();
        *self.shadow.lock() = state;
        self.shadow_generation.store(generation, Ordering::Release);
    }

    /// Registers a listener for clock state transitions, replacing any
    /// previously registered listener on this handle.
    pub fn set_listener(&self, listener: impl Fn(ClockState) + Send + 'static) {
        self.shared.register_listener(self.id, Box::new(listener));
    }

    /// Removes this handle's listener, if any.
    pub fn clear_listener(&self) {
        self.shared.unregister_listener(self.id);
    }

    /// Starts the clock. A no-op for slave handles — only the master drives
    /// ticking.
    pub fn start(&self) {
        if self.role != ClockRole::Master {
            return;
        }
        self.reload();
        let mut shadow = self.shadow.lock();
        shadow.system_time = std::time::Instant::now();
        shadow.ticking = true;
        shadow.started = true;
        self.shared.update(*shadow);
        self.shared.notify_listeners(ClockState::Ticking);
    }

    /// Pauses the clock. A no-op for slave handles.
    pub fn pause(&self) {
        if self.role != ClockRole::Master {
            return;
        }
        self.reload();
        let mut shadow = self.shadow.lock();
        let frozen = project(&shadow);
        shadow.media_time_us = frozen;
        shadow.system_time = std::time::Instant::now();
        shadow.ticking = false;
        shadow.started = false;
        self.shared.update(*shadow);
        self.shared.notify_listeners(ClockState::Paused);
    }

    /// Jumps the clock to `t` without changing run state, e.g. on seek.
    /// Notifies listeners with [`ClockState::TimeChanged`].
    ///
    /// # Panics
    /// If this handle is not the master.
    pub fn set(&self, t: MediaTime) {
        assert_eq!(self.role, ClockRole::Master, "only the master clock can set");
        self.shared.set(t);
        self.reload();
    }

    /// Advances the clock to (at least) `t`. The delta is clamped to
    /// non-negative — a master clock's media time can only increase.
    ///
    /// # Panics
    /// If this handle is not the master, or if the clock is not already
    /// ticking.
    pub fn update(&self, t: MediaTime) {
        assert_eq!(self.role, ClockRole::Master, "only the master clock can update");
        self.reload();
        let mut shadow = self.shadow.lock();
        assert!(shadow.ticking, "update() requires the clock to already be ticking");
        let current = project(&shadow);
        let delta = (t.as_micros() - current).max(0);
        shadow.media_time_us += delta;
        self.shared.update(*shadow);
    }

    /// Whether the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.reload();
        !self.shadow.lock().started
    }

    /// Current playback speed.
    pub fn speed(&self) -> f64 {
        self.reload();
        self.shadow.lock().speed
    }

    /// Current media time without speed applied.
    fn get_int(&self) -> i64 {
        self.reload();
        project(&self.shadow.lock())
    }

    /// Current media time, with speed applied.
    pub fn get(&self) -> MediaTime {
        let us = self.get_int();
        let speed = self.shadow.lock().speed;
        MediaTime::from_micros((us as f64 * speed) as i64)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.clear_listener();
        if self.role == ClockRole::Master {
            self.shared.master_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_update_advances_slave_view() {
        let shared = Arc::new(SharedClock::new());
        let master = Clock::new(shared.clone(), ClockRole::Master);
        let slave = Clock::new(shared, ClockRole::Slave);
        master.start();
        master.update(MediaTime::from_micros(500_000));
        assert_eq!(slave.get(), MediaTime::from_micros(500_000));
    }

    #[test]
    #[should_panic(expected = "only one master clock allowed")]
    fn second_master_panics() {
        let shared = Arc::new(SharedClock::new());
        let _m1 = Clock::new(shared.clone(), ClockRole::Master);
        let _m2 = Clock::new(shared, ClockRole::Master);
    }

    #[test]
    fn master_slot_is_released_on_drop() {
        let shared = Arc::new(SharedClock::new());
        {
            let _m1 = Clock::new(shared.clone(), ClockRole::Master);
        }
        let _m2 = Clock::new(shared, ClockRole::Master);
    }

    #[test]
    fn update_clamps_backward_delta_to_zero() {
        let shared = Arc::new(SharedClock::new());
        let master = Clock::new(shared, ClockRole::Master);
        master.start();
        master.update(MediaTime::from_micros(1_000_000));
        let before = master.get();
        master.update(MediaTime::from_micros(10));
        assert!(master.get() >= before);
    }

    #[test]
    #[should_panic(expected = "only the master clock can update")]
    fn slave_cannot_update() {
        let shared = Arc::new(SharedClock::new());
        let _master = Clock::new(shared.clone(), ClockRole::Master);
        let slave = Clock::new(shared, ClockRole::Slave);
        slave.update(MediaTime::from_micros(0));
    }
}
