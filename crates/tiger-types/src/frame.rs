//! The unified packet/frame type that flows between sessions.
//!
//! A demuxed packet and a decoded frame are the same shape at this layer —
//! both carry a timecode, optional duration, a format tag, and up to three
//! planes of data. Only the `format`/`planes` contents differ by stage.

use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;

use tiger_time::{AudioFormat, ImageFormat, MediaTime};

bitflags! {
    /// Per-frame flags carried from the container or set by a decoder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        /// A sync/key frame: decoding can start here without a preceding GOP.
        const SYNC = 1 << 0;
        /// Reference-only; never scheduled for presentation.
        const REFERENCE_ONLY = 1 << 1;
        /// May be dropped under resource pressure without breaking decode.
        const DISPOSABLE = 1 << 2;
        /// Presented before the frame(s) it depends on in decode order.
        const LEADING = 1 << 3;
        /// Depends on an earlier frame only (P-frame-like).
        const PREDICTED = 1 << 4;
        /// Depends on both earlier and later frames (B-frame-like).
        const BIDIRECTIONAL = 1 << 5;
    }
}

/// Index of a track within a `MediaFile`, stable for the lifetime of that
/// file's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackIndex(pub u32);

/// Coarse classification of a track, used for render-device selection and
/// clock master assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track; the default clock master when present.
    Audio,
    /// Video track.
    Video,
    /// Subtitle/caption track.
    Subtitle,
}

/// Format tag carried by a `MediaFrame`, distinguishing which of
/// [`AudioFormat`] or [`ImageFormat`] the planes are shaped as. Compressed
/// packets (pre-decode) carry the format of the track they came from, same
/// as the frames decoded from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaFormat {
    /// Audio track/frame format.
    Audio(AudioFormat),
    /// Video track/frame format.
    Image(ImageFormat),
}

/// Up to three planes of frame data, shared via `Bytes` so consumers can hold
/// a reference without copying. Compressed packets use a single plane;
/// planar pixel formats use up to three.
#[derive(Debug, Clone, Default)]
pub struct PlaneData {
    planes: Vec<Bytes>,
}

impl PlaneData {
    /// Wraps a single contiguous buffer — the common case for compressed
    /// packets and packed pixel/audio formats.
    pub fn single(data: Bytes) -> Self {
        Self { planes: vec![data] }
    }

    /// Wraps one buffer per plane, in plane order (e.g. Y, U, V).
    pub fn planar(planes: Vec<Bytes>) -> Self {
        debug_assert!(planes.len() <= 3, "MediaFrame supports at most 3 planes");
        Self { planes }
    }

    /// The planes, in order.
    pub fn planes(&self) -> &[Bytes] {
        &self.planes
    }

    /// Total bytes across all planes.
    pub fn total_len(&self) -> usize {
        self.planes.iter().map(Bytes::len).sum()
    }
}

/// Backend-defined handle riding alongside frame data without this crate
/// interpreting it — e.g. a hardware decoder's surface pool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueHandle(pub u64);

/// A compressed packet or a decoded frame, depending on pipeline stage.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    /// Track this frame belongs to.
    pub track: TrackIndex,
    /// Flags describing this frame's role in the decode/display order.
    pub flags: FrameFlags,
    /// Presentation (or decode, pre-sync) timestamp.
    pub timecode: MediaTime,
    /// Duration, when known.
    pub duration: Option<MediaTime>,
    /// Audio or image format of the data in `planes`.
    pub format: MediaFormat,
    /// Frame payload.
    pub planes: PlaneData,
    /// Opaque backend handle, if any.
    pub opaque: Option<OpaqueHandle>,
}

/// Reference-counted handle to a [`MediaFrame`], the unit actually passed
/// between sessions so a frame can be held by more than one consumer (e.g. a
/// render queue and a frame-drop statistic) without copying.
pub type Frame = Arc<MediaFrame>;

impl MediaFrame {
    /// Whether this frame is a sync point.
    pub fn is_sync(&self) -> bool {
        self.flags.contains(FrameFlags::SYNC)
    }
}
