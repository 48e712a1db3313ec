//! # tiger-dispatch Component
//!
//! The single-threaded cooperative executor every session runs on, plus the
//! generation-tagged request/reply plumbing sessions use to talk to each
//! other across dispatcher threads.
//!
//! # Overview
//!
//! - **Dispatcher**: [`Dispatcher`], [`JobHandle`], [`Job`] — one dedicated
//!   OS thread per dispatcher, a deadline-ordered job queue, no session
//!   handler ever runs concurrently with another handler on the same
//!   dispatcher.
//! - **Event plumbing**: [`Reply`], [`PacketRequest`], [`FrameRequest`],
//!   [`Generation`], [`GenerationCounter`], [`GenTagged`],
//!   [`PacketRequestEvent`], [`FrameRequestEvent`]

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod dispatcher;
mod event;

pub use dispatcher::{Dispatcher, Job, JobHandle};
pub use event::{
    FrameKind, FrameRequest, FrameRequestEvent, GenTagged, Generation, GenerationCounter,
    PacketKind, PacketRequest, PacketRequestEvent, RequestToken, Reply,
};
