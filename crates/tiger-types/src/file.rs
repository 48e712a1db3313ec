//! The `MediaFile` trait: the demuxer-facing abstraction over containers.

use tiger_time::MediaTime;

use crate::error::MediaError;
use crate::frame::{Frame, TrackIndex};
use crate::session_info::TrackFormat;

/// Formats a `MediaFile` offers, one entry per enumerated track.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFormats {
    /// Per-track format descriptors, in container track order.
    pub tracks: Vec<TrackFormat>,
}

/// Configuration message sent to a file before reading, selecting which
/// track(s) are active.
#[derive(Debug, Clone, PartialEq)]
pub struct FileConfig {
    /// Tracks to enable; a disabled track's packets are never returned by
    /// `read` and the file may skip demuxing its data entirely.
    pub enabled_tracks: Vec<TrackIndex>,
}

/// How a `read` call should position itself before returning a packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadMode {
    /// Continue reading forward from the current position.
    Next,
    /// Seek to the sync point at or before the given timestamp.
    ClosestSync,
    /// Seek to the sync point at or before the current position (re-sync
    /// without changing target time, used when resuming after an error).
    LastSync,
    /// Seek to the sync point strictly after the given timestamp.
    NextSync,
    /// Return the next packet without advancing the read position.
    Peek,
    /// Seek to an exact container-defined sample index.
    Index(u64),
}

/// A demuxer: something that reads compressed packets out of a container.
pub trait MediaFile: Send {
    /// Per-track formats this file offers.
    fn formats(&self) -> FileFormats;

    /// Reconfigures which tracks are active.
    fn configure(&mut self, msg: FileConfig) -> Result<(), MediaError>;

    /// Reads the next packet per `mode`/`ts`. Returns `None` at end of
    /// stream for the currently enabled tracks.
    fn read(&mut self, mode: ReadMode, ts: Option<MediaTime>) -> Option<Frame>;
}
