//! Per-media orchestration: track selection, clock-role assignment, and the
//! ready/end bookkeeping that turns session-level events into player-level
//! ones.
//!
//! Grounded directly in the original player's `onInitDecoders`/
//! `onInitRenderer`/`onRendererReady`/`onRendererEnd`/`onTrackError` chain:
//! every selected track gets a codec session immediately; its render session
//! is only created once that codec reports its negotiated output format.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use tracing::{debug, info, warn};

use tiger_clock::{Clock, ClockRole, SharedClock};
use tiger_dispatch::{Dispatcher, FrameRequestEvent, JobHandle};
use tiger_sessions::{CodecSession, PacketSource, RenderSession, SourceSession};
use tiger_time::MediaTime;
use tiger_types::{DeviceConfig, Frame, MediaError, MediaFormat, ReadyInfo, SessionInfo, TrackFormat, TrackKind};

use crate::{MediaId, PlayerEvent, PlayerShared, PlayerState};

/// How long the deferred restart after a seek waits before resuming ticking
/// — enough for render sessions to refill past `MIN_COUNT` first. Distinct
/// from `PlayerConfig::min_seek`, which debounces *accepting* a seek.
const SEEK_RESTART_DEFER: Duration = Duration::from_millis(500);
const RESTART_HANDLE: JobHandle = JobHandle(0);

struct TrackContext {
    kind: TrackKind,
    codec: CodecSession,
    // Kept alive only; this session manages its own clock listener and
    // render-tick loop once built, nothing here calls back into it.
    _render: Option<RenderSession>,
    /// Held between `on_decoder_info`'s first call and the render session
    /// being built; `RenderSession::new` takes ownership of it from there.
    pending_frame_token: Option<FrameRequestEvent>,
}

/// One `add_media` call's worth of session graph: a shared source, one
/// codec/render pair per selected track, and the clock they render against.
pub(crate) struct Instance {
    clock: Arc<SharedClock>,
    control: Dispatcher,
    codec_dispatcher: Dispatcher,
    render_dispatcher: Dispatcher,
    video_frame_event: Option<Arc<dyn Fn(Frame) + Send + Sync>>,
    audio_frame_event: Option<Arc<dyn Fn(Frame) + Send + Sync>>,
    tracks: HashMap<u32, TrackContext>,
    ready_pending: HashSet<u32>,
    end_pending: HashSet<u32>,
    total_selected: usize,
    state: PlayerState,
    formats: Vec<TrackFormat>,
}

impl Instance {
    /// Opens `url`, selects one track per [`TrackKind`] (first-of-each-kind
    /// wins; later tracks of an already-selected kind are disabled
    /// immediately by dropping their packet token), and builds a codec
    /// session per selected track.
    pub(crate) fn build(
        shared: &Arc<PlayerShared>,
        url: &str,
        opts: crate::AddMediaOptions,
        id: MediaId,
    ) -> Result<Instance, MediaError> {
        let file = shared.registry.open(url)?;

        let formats_cell: Arc<PlMutex<Option<Vec<TrackFormat>>>> = Arc::new(PlMutex::new(None));
        let formats_cell2 = formats_cell.clone();
        let (source, tokens) = SourceSession::new(file, move |info| {
            if let SessionInfo::Ready(ReadyInfo::Source(tracks)) = info {
                *formats_cell2.lock() = Some(tracks);
            }
        });
        let source = Arc::new(source);
        let formats = formats_cell
            .lock()
            .take()
            .expect("SourceSession reports Ready synchronously on construction");

        let codec_dispatcher = Dispatcher::new();
        let render_dispatcher = Dispatcher::new();

        let mut selected_kinds: HashSet<TrackKind> = HashSet::new();
        let mut tracks: HashMap<u32, TrackContext> = HashMap::new();

        for (track_format, token) in formats.iter().cloned().zip(tokens) {
            if !selected_kinds.insert(track_format.kind) {
                info!(track = track_format.track.0, "player: extra track of this kind, disabling");
                drop(token);
                continue;
            }

            let decoder = match shared.registry.devices().create_decoder(DeviceConfig {
                format: track_format.format,
                codec: Some(track_format.codec.clone()),
            }) {
                Ok(device) => device,
                Err(err) => {
                    warn!(?err, track = track_format.track.0, "player: failed to create decoder");
                    continue;
                }
            };

            let track_index = track_format.track;
            let source_for_packets = source.clone();
            let packet_source = PacketSource::new(move |ts, reply| source_for_packets.on_request_packet(track_index, reply, ts));

            let shared_for_info = shared.clone();
            let (codec, frame_token) = CodecSession::new(
                codec_dispatcher.clone(),
                decoder,
                packet_source,
                Some(token),
                track_format.format,
                move |info| {
                    shared_for_info.on_decoder_info(id, track_index, info);
                },
            );

            tracks.insert(
                track_format.track.0,
                TrackContext {
                    kind: track_format.kind,
                    codec,
                    _render: None,
                    pending_frame_token: Some(frame_token),
                },
            );
        }

        if tracks.is_empty() {
            return Err(MediaError::NotSupported("no playable track in media".into()));
        }

        let ready_pending: HashSet<u32> = tracks.keys().copied().collect();
        let total_selected = tracks.len();

        Ok(Instance {
            clock: Arc::new(SharedClock::new()),
            control: Dispatcher::new(),
            codec_dispatcher,
            render_dispatcher,
            video_frame_event: opts.video_frame_event.map(Arc::from),
            audio_frame_event: opts.audio_frame_event.map(Arc::from),
            tracks,
            ready_pending,
            end_pending: HashSet::new(),
            total_selected,
            state: PlayerState::Init,
            formats,
        })
    }

    pub(crate) fn state(&self) -> PlayerState {
        self.state
    }

    pub(crate) fn formats(&self) -> &[TrackFormat] {
        &self.formats
    }
}

impl PlayerShared {
    /// Routes a decoder's status event: a negotiated format builds that
    /// track's render session, an error tears the track down, `End` is
    /// unreachable here (codecs report `End` through `request_frame`
    /// replies, not this channel, once decode genuinely starts).
    pub(crate) fn on_decoder_info(self: &Arc<Self>, id: MediaId, track: tiger_types::TrackIndex, info: SessionInfo) {
        match info {
            SessionInfo::Error(err) => {
                warn!(?err, track = track.0, "player: decoder error");
                self.on_track_error(id, track.0);
            }
            SessionInfo::Ready(ReadyInfo::Format(format)) => self.on_init_renderer(id, track.0, format),
            SessionInfo::Ready(ReadyInfo::Source(_)) => {}
            SessionInfo::End => {}
        }
    }

    /// Builds the render session for `track` now that its codec has
    /// negotiated `format`. Assigns the clock master role to the audio
    /// track, or to the sole selected track if there is no audio — mirrors
    /// the original's `kCodecTypeAudio == type || mTracks.size() == 1` rule.
    fn on_init_renderer(self: &Arc<Self>, id: MediaId, track: u32, format: MediaFormat) {
        let mut media = self.media.lock();
        let Some(instance) = media.get_mut(&id) else { return };

        let Some(kind) = instance.tracks.get(&track).map(|ctx| ctx.kind) else { return };
        let is_master = kind == TrackKind::Audio || instance.total_selected == 1;
        let role = if is_master { ClockRole::Master } else { ClockRole::Slave };
        let clock = Clock::new(instance.clock.clone(), role);
        let render_dispatcher = instance.render_dispatcher.clone();

        let devices = self.registry.devices().clone();
        let make_sink: Option<Box<dyn Fn(MediaFormat) -> Result<Box<dyn tiger_types::MediaDevice>, MediaError> + Send>> =
            if kind == TrackKind::Subtitle {
                None
            } else {
                Some(Box::new(move |fmt: MediaFormat| {
                    devices.create_sink(DeviceConfig { format: fmt, codec: None })
                }))
            };

        let on_frame: Option<Box<dyn Fn(Frame) + Send>> = match kind {
            TrackKind::Video => instance
                .video_frame_event
                .clone()
                .map(|cb| Box::new(move |f: Frame| cb(f)) as Box<dyn Fn(Frame) + Send>),
            TrackKind::Audio => instance
                .audio_frame_event
                .clone()
                .map(|cb| Box::new(move |f: Frame| cb(f)) as Box<dyn Fn(Frame) + Send>),
            TrackKind::Subtitle => None,
        };

        let Some(ctx) = instance.tracks.get_mut(&track) else { return };
        let frame_token = ctx.pending_frame_token.take();
        let codec = ctx.codec.clone();
        let frame_source = move |_gen: tiger_dispatch::Generation, reply: tiger_dispatch::Reply<Option<Frame>>| {
            codec.request_frame(reply);
        };

        let shared = self.clone();
        let render = RenderSession::new(
            render_dispatcher,
            Some(clock),
            Some(format),
            make_sink,
            on_frame,
            frame_token,
            frame_source,
            move |info| shared.on_renderer_info(id, track, info),
        );
        ctx._render = Some(render);
        instance.end_pending.insert(track);
    }

    fn on_renderer_info(self: &Arc<Self>, id: MediaId, track: u32, info: SessionInfo) {
        match info {
            SessionInfo::Ready(_) => self.on_renderer_ready(id, track),
            SessionInfo::End => self.on_renderer_end(id, track),
            SessionInfo::Error(err) => {
                warn!(?err, track, "player: renderer error");
                self.on_track_error(id, track);
            }
        }
    }

    fn on_renderer_ready(self: &Arc<Self>, id: MediaId, track: u32) {
        let mut media = self.media.lock();
        let Some(instance) = media.get_mut(&id) else { return };
        instance.ready_pending.remove(&track);
        if instance.ready_pending.is_empty() && instance.state == PlayerState::Init {
            instance.state = PlayerState::Ready;
            let formats = instance.formats.clone();
            drop(media);
            (self.info)(id, PlayerEvent::Ready(formats));
        }
    }

    fn on_renderer_end(self: &Arc<Self>, id: MediaId, track: u32) {
        let mut media = self.media.lock();
        let Some(instance) = media.get_mut(&id) else { return };
        instance.end_pending.remove(&track);
        if instance.end_pending.is_empty() {
            instance.state = PlayerState::Stopped;
            instance.clock.pause();
            drop(media);
            (self.info)(id, PlayerEvent::End);
        }
    }

    fn on_track_error(self: &Arc<Self>, id: MediaId, track: u32) {
        let mut media = self.media.lock();
        let Some(instance) = media.get_mut(&id) else { return };
        instance.tracks.remove(&track);
        instance.ready_pending.remove(&track);
        instance.end_pending.remove(&track);
        if instance.tracks.is_empty() {
            instance.state = PlayerState::Stopped;
            drop(media);
            (self.info)(id, PlayerEvent::Error(MediaError::InvalidOperation("all tracks failed".into())));
        }
    }

    /// Pre-seeks every selected track to `ts` ahead of the first `do_start`.
    /// `ts = None` only validates `id` exists — by the time a host can call
    /// this, `Instance::build` has already kicked off decode from the start
    /// of the file, so there is nothing further to do.
    pub(crate) fn do_prepare(self: &Arc<Self>, id: MediaId, ts: Option<MediaTime>) -> Result<(), MediaError> {
        let mut media = self.media.lock();
        let instance = media.get_mut(&id).ok_or_else(not_found)?;
        let Some(ts) = ts else { return Ok(()) };

        for ctx in instance.tracks.values() {
            ctx.codec.prepare(ts);
        }
        instance.clock.set(ts);
        instance.end_pending = instance.tracks.keys().copied().collect();
        Ok(())
    }

    pub(crate) fn do_start(self: &Arc<Self>, id: MediaId) -> Result<(), MediaError> {
        let mut media = self.media.lock();
        let instance = media.get_mut(&id).ok_or_else(not_found)?;
        if !instance.clock.is_paused() {
            debug!("player: already started");
            return Ok(());
        }
        instance.control.remove(RESTART_HANDLE);
        instance.clock.start();
        instance.state = PlayerState::Playing;
        drop(media);
        (self.info)(id, PlayerEvent::Playing);
        Ok(())
    }

    pub(crate) fn do_pause(self: &Arc<Self>, id: MediaId) -> Result<(), MediaError> {
        let mut media = self.media.lock();
        let instance = media.get_mut(&id).ok_or_else(not_found)?;
        if instance.clock.is_paused() {
            debug!("player: already paused");
            return Ok(());
        }
        instance.control.remove(RESTART_HANDLE);
        instance.clock.pause();
        instance.state = PlayerState::Paused;
        drop(media);
        (self.info)(id, PlayerEvent::Paused);
        Ok(())
    }

    /// Debounced seek: a request within `min_seek` of the last one is
    /// dropped. Pauses, re-prepares every track at `ts`, jumps the clock
    /// (which synchronously re-primes every render session's listener via
    /// `ClockState::TimeChanged`), then restarts after a fixed defer so
    /// render queues have time to refill before presentation resumes.
    pub(crate) fn do_seek(self: &Arc<Self>, id: MediaId, ts: MediaTime) -> Result<(), MediaError> {
        let mut media = self.media.lock();
        let instance = media.get_mut(&id).ok_or_else(not_found)?;

        let now = instance.clock.get();
        let delta = (ts.as_micros() - now.as_micros()).abs();
        if delta < self.config.min_seek.as_micros() as i64 {
            debug!("player: seek within debounce window, ignoring");
            return Ok(());
        }

        let was_playing = !instance.clock.is_paused();
        if was_playing {
            instance.clock.pause();
        }
        for ctx in instance.tracks.values() {
            ctx.codec.prepare(ts);
        }
        instance.clock.set(ts);
        instance.end_pending = instance.tracks.keys().copied().collect();
        instance.state = PlayerState::Paused;

        if was_playing {
            let shared = self.clone();
            instance.control.dispatch(
                RESTART_HANDLE,
                SEEK_RESTART_DEFER,
                Box::new(move || {
                    let _ = shared.do_start(id);
                }),
            );
        }
        Ok(())
    }
}

fn not_found() -> MediaError {
    MediaError::InvalidOperation("unknown media id".into())
}
