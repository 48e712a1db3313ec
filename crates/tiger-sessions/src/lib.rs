//! # tiger-sessions Component
//!
//! The three session state machines that make up one track's playback
//! pipeline: a [`SourceSession`] demuxes packets, a [`CodecSession`] decodes
//! them, and a [`RenderSession`] paces the decoded frames against a shared
//! clock and drives a sink.
//!
//! # Overview
//!
//! - [`source`] — reads packets out of a `MediaFile`, one small queue per
//!   track, refilling on demand.
//! - [`codec`] — decodes packets through a `MediaDevice`, answering frame
//!   requests as output becomes available.
//! - [`render`] — the hardest component: paces frames against a `Clock`,
//!   drives a sink `MediaDevice` (or an external frame callback), and, as
//!   clock master, anchors the clock to the first presented frame.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod render;
pub mod source;

pub use codec::{CodecSession, PacketSource, MIN_PACKETS};
pub use render::{RenderSession, MIN_COUNT};
pub use source::SourceSession;
