//! Top-level orchestration surface for the Tiger media engine.
//!
//! A [`Player`] turns a URL into a running session graph — source, codec and
//! render sessions per selected track, sharing one clock — and exposes the
//! five operations a host actually needs: add media, prepare, start, pause,
//! seek. Everything else (demuxing, decoding, pacing, clocking) lives in
//! `tiger-sessions`/`tiger-clock`; this crate only wires those pieces
//! together and tracks per-media state.

mod instance;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use tiger_time::MediaTime;
use tiger_types::{Frame, MediaError, TrackFormat};

use instance::Instance;

/// Identifies one `add_media` call's session graph. Opaque, stable for the
/// lifetime of the `Player` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaId(Uuid);

impl MediaId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Coarse playback state for one piece of media, mirroring the original's
/// `Init -> Prepare -> Ready -> Decoding -> ... -> Stopped` progression
/// collapsed to the states a host actually needs to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Tracks selected, codec sessions starting up; no render session ready yet.
    Init,
    /// Every selected track's renderer has negotiated a format.
    Ready,
    /// The shared clock is running.
    Playing,
    /// The shared clock is paused.
    Paused,
    /// Every selected track has reached end of stream, or every track failed.
    Stopped,
}

/// Events a [`Player`] reports back to its host, one stream per [`MediaId`].
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Every selected track is ready to render; carries the negotiated
    /// per-track formats (an enrichment over a bare marker: a host needs
    /// these to size its own display/audio surfaces before the first frame
    /// arrives).
    Ready(Vec<TrackFormat>),
    /// The shared clock started running.
    Playing,
    /// The shared clock paused.
    Paused,
    /// Every selected track reached end of stream.
    End,
    /// Either a single fatal open error, or every selected track has failed.
    Error(MediaError),
}

/// Host callback for [`PlayerEvent`]s. Called from whichever dispatcher
/// thread produced the event — never from inside a `Player` method call.
pub type PlayerInfoSender = Box<dyn Fn(MediaId, PlayerEvent) + Send + Sync>;

/// Per-track sinks supplied by the host for `add_media`. Video/audio frames
/// are handed to these callbacks instead of a built-in device when present;
/// omitting one leaves that track's frames undelivered (a no-op sink, same
/// as an unselected subtitle track).
#[derive(Default)]
pub struct AddMediaOptions {
    /// Receives every decoded video frame once the video render session is
    /// built, in presentation order.
    pub video_frame_event: Option<Box<dyn Fn(Frame) + Send + Sync>>,
    /// Receives every decoded audio frame once the audio render session is
    /// built, in presentation order.
    pub audio_frame_event: Option<Box<dyn Fn(Frame) + Send + Sync>>,
}

/// Tunables that apply across every media a [`Player`] manages.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Seeks within this distance of the current clock position are dropped
    /// rather than re-preparing every track. Matches the original's
    /// `MIN_SEEK_TIME` (200ms).
    pub min_seek: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_seek: Duration::from_millis(200),
        }
    }
}

/// State shared between the public [`Player`] handle and every dispatcher
/// callback its session graphs fire into. Cheap to clone (it's an `Arc`);
/// every method that mutates media state takes `&Arc<Self>` so callbacks can
/// re-enter it from any thread.
pub(crate) struct PlayerShared {
    registry: registry::Registry,
    media: Mutex<HashMap<MediaId, Instance>>,
    info: PlayerInfoSender,
    config: PlayerConfig,
}

/// Entry point: one `Player` manages any number of concurrently open media,
/// each identified by the [`MediaId`] `add_media` returns.
pub struct Player {
    shared: Arc<PlayerShared>,
}

impl Player {
    /// Builds a player reporting events to `info_event`, drawing device and
    /// file factories from the process-wide registry installed via
    /// [`registry::install`].
    ///
    /// # Panics
    /// If [`registry::install`] has not been called yet.
    pub fn new(info_event: PlayerInfoSender) -> Self {
        Self::with_config(info_event, PlayerConfig::default())
    }

    /// As [`Player::new`], with non-default tunables (currently just
    /// [`PlayerConfig::min_seek`]).
    pub fn with_config(info_event: PlayerInfoSender, config: PlayerConfig) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                registry: registry::global().clone(),
                media: Mutex::new(HashMap::new()),
                info: info_event,
                config,
            }),
        }
    }

    /// Opens `url`, selects one track per kind, and starts its codec
    /// sessions. Fires [`PlayerEvent::Ready`] once every selected track's
    /// renderer has negotiated a format.
    pub fn add_media(&mut self, url: &str, opts: AddMediaOptions) -> Result<MediaId, MediaError> {
        let id = MediaId::new();
        let instance = Instance::build(&self.shared, url, opts, id)?;
        self.shared.media.lock().insert(id, instance);
        Ok(id)
    }

    /// Pre-seeks every selected track to `ts` before playback begins.
    /// `ts = None` is a no-op — preparation already starts in
    /// [`Player::add_media`], this exists only to let a host pick a
    /// non-zero starting position before the first `start`.
    pub fn prepare(&mut self, id: MediaId, ts: Option<MediaTime>) -> Result<(), MediaError> {
        self.shared.do_prepare(id, ts)
    }

    /// Starts (or resumes) the shared clock. A no-op if already running.
    pub fn start(&mut self, id: MediaId) -> Result<(), MediaError> {
        self.shared.do_start(id)
    }

    /// Pauses the shared clock. A no-op if already paused.
    pub fn pause(&mut self, id: MediaId) -> Result<(), MediaError> {
        self.shared.do_pause(id)
    }

    /// Seeks to `ts`, debounced by [`PlayerConfig::min_seek`]. Restarts
    /// playback automatically if it was running before the call.
    pub fn seek(&mut self, id: MediaId, ts: MediaTime) -> Result<(), MediaError> {
        self.shared.do_seek(id, ts)
    }

    /// Current coarse state of `id`, or [`PlayerState::Stopped`] if `id` is
    /// unknown (e.g. already removed after an error).
    pub fn state(&self, id: MediaId) -> PlayerState {
        self.shared
            .media
            .lock()
            .get(&id)
            .map(Instance::state)
            .unwrap_or_else(|| {
                warn!("player: state() on unknown media id");
                PlayerState::Stopped
            })
    }

    /// Negotiated per-track formats for `id`, available once
    /// [`PlayerEvent::Ready`] has fired (empty before then, or if `id` is
    /// unknown).
    pub fn formats(&self, id: MediaId) -> Vec<TrackFormat> {
        self.shared
            .media
            .lock()
            .get(&id)
            .map(|instance| instance.formats().to_vec())
            .unwrap_or_default()
    }
}
