//! Status events emitted by sessions toward the player.

use bytes::Bytes;

use crate::error::MediaError;
use crate::frame::{MediaFormat, TrackIndex, TrackKind};

/// One track's negotiated format, as reported by a `SourceSession` once per
/// prepare cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFormat {
    /// Track this descriptor is for.
    pub track: TrackIndex,
    /// Coarse track kind, used for render-device and clock-master selection.
    pub kind: TrackKind,
    /// Negotiated audio or image format.
    pub format: MediaFormat,
    /// Codec identifier string (e.g. `"avc1.640028"`, `"mp4a.40.2"`).
    pub codec: String,
    /// Codec-specific data blob (avcC/hvcC/ESDS), opaque to this crate.
    pub codec_private: Option<Bytes>,
}

/// Payload of a [`SessionInfo::Ready`] event. A `SourceSession` reports the
/// full per-track format list it discovered; a `CodecSession` or
/// `RenderSession` reports the single negotiated format it settled on.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyInfo {
    /// Per-track formats discovered by a source session.
    Source(Vec<TrackFormat>),
    /// Negotiated output format of a codec or render session.
    Format(MediaFormat),
}

/// Status event a session emits toward whatever is supervising it (a
/// `CodecSession` supervising a `SourceSession`, or the `Player` supervising
/// top-level sessions).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInfo {
    /// The session has finished preparing and reports its negotiated format.
    /// Emitted at most once per prepare cycle (including after a seek).
    Ready(ReadyInfo),
    /// The session has exhausted its input; no more frames will follow.
    End,
    /// The session hit a terminal error; the affected track is torn down.
    Error(MediaError),
}
