//! # tiger-clock Component
//!
//! The shared playback clock that keeps audio, video, and subtitle render
//! sessions in sync. One [`SharedClock`] is created per player track group;
//! each track attaches a [`Clock`] handle in either the master or a slave
//! role. Exactly one master drives the media time forward; slaves only ever
//! read it.
//!
//! # Overview
//!
//! - [`SharedClock`] — the state: media time anchored to a system time, plus
//!   run/tick flags, speed, and a listener registry.
//! - [`Clock`], [`ClockRole`] — a master or slave handle with a lock-free
//!   read fast path driven by a shared generation counter.
//! - [`ClockState`] — the transitions listeners observe (`Ticking`,
//!   `TimeChanged`, `Paused`).

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod clock;
mod shared;

pub use clock::{Clock, ClockRole};
pub use shared::{ClockState, ListenerId, SharedClock};
