//! End-to-end playback through `Player` against `tiger-devices`'s scripted
//! fixtures — no real container or codec involved. All scenarios share one
//! process-wide registry (installed once via [`registry`]) holding several
//! named fixtures side by side, dispatched by URL, the way a real registry
//! serves many `add_media` calls from one process.

use std::sync::mpsc;
use std::sync::{Arc, Once};
use std::time::Duration;

use tiger_devices::testing::{frame, track_format, ScriptedDeviceFactory, ScriptedFileFactory, ScriptedMedia};
use tiger_player::registry::Registry;
use tiger_player::{AddMediaOptions, MediaId, Player, PlayerConfig, PlayerEvent, PlayerState};
use tiger_time::{AudioFormat, AudioSampleFormat, ImageFormat, MediaTime, PixelFormat};
use tiger_types::{MediaFormat, TrackFormat, TrackKind};

const AUDIO_ONLY: &str = "scripted://audio-only";
const AUDIO_VIDEO: &str = "scripted://audio-video";
const TWO_VIDEO_TRACKS: &str = "scripted://two-video-tracks";
const NO_TRACKS: &str = "scripted://empty-container";
const BUSY_DECODER: &str = "scripted://busy-decoder";

fn audio_format() -> MediaFormat {
    MediaFormat::Audio(AudioFormat::packed(AudioSampleFormat::S16, 2, 48_000))
}

fn video_format() -> MediaFormat {
    MediaFormat::Image(ImageFormat::new(PixelFormat::Yuv420, 640, 360))
}

/// Builds `count` frames at `step` micros apart, the first and every
/// `sync_every`th frame marked as a sync point.
fn frame_run(track: u32, format: MediaFormat, count: i64, step_us: i64, sync_every: i64) -> Vec<tiger_types::Frame> {
    (0..count)
        .map(|i| frame(track, MediaTime::from_micros(i * step_us), format, i % sync_every == 0))
        .collect()
}

fn install_once() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let mut registry = Registry::new(Arc::new(ScriptedDeviceFactory));

        // A 2-second mono-track audio fixture — the sole track is master
        // regardless of kind, per `on_init_renderer`'s rule.
        let audio_tracks = vec![track_format(0, TrackKind::Audio, audio_format())];
        let audio_frames = frame_run(0, audio_format(), 40, 50_000, 5);
        registry.register_file_factory(Arc::new(ScriptedFileFactory::for_url(
            AUDIO_ONLY,
            ScriptedMedia::new(audio_tracks, audio_frames),
        )));

        // An audio+video fixture: audio is master since both kinds are
        // present, per the same rule.
        let mut av_tracks = vec![
            track_format(0, TrackKind::Audio, audio_format()),
            track_format(1, TrackKind::Video, video_format()),
        ];
        av_tracks[0].codec = "mp4a.40.2".into();
        av_tracks[1].codec = "avc1.640028".into();
        let mut av_frames = frame_run(0, audio_format(), 30, 50_000, 5);
        av_frames.extend(frame_run(1, video_format(), 30, 50_000, 10));
        registry.register_file_factory(Arc::new(ScriptedFileFactory::for_url(
            AUDIO_VIDEO,
            ScriptedMedia::new(av_tracks, av_frames),
        )));

        // Two video tracks of the same kind: only the first is selected, the
        // second's packet token is dropped immediately by `Instance::build`.
        let two_video_tracks = vec![
            track_format(0, TrackKind::Video, video_format()),
            track_format(1, TrackKind::Video, video_format()),
        ];
        let mut two_video_frames = frame_run(0, video_format(), 20, 50_000, 5);
        two_video_frames.extend(frame_run(1, video_format(), 20, 50_000, 5));
        registry.register_file_factory(Arc::new(ScriptedFileFactory::for_url(
            TWO_VIDEO_TRACKS,
            ScriptedMedia::new(two_video_tracks, two_video_frames),
        )));

        // A container with no tracks at all — `Instance::build` must reject
        // this before any session graph is built.
        registry.register_file_factory(Arc::new(ScriptedFileFactory::for_url(
            NO_TRACKS,
            ScriptedMedia::new(Vec::<TrackFormat>::new(), Vec::new()),
        )));

        // An audio track whose decoder replies `ResourceBusy` twice before
        // accepting, driven by the `busy:N` marker in its codec string (see
        // `ScriptedDeviceFactory`).
        let mut busy_tracks = vec![track_format(0, TrackKind::Audio, audio_format())];
        busy_tracks[0].codec = "pcm-busy:2".into();
        let busy_frames = frame_run(0, audio_format(), 20, 50_000, 5);
        registry.register_file_factory(Arc::new(ScriptedFileFactory::for_url(
            BUSY_DECODER,
            ScriptedMedia::new(busy_tracks, busy_frames),
        )));

        tiger_player::registry::install(registry);
    });
}

/// Drains `rx` until `want(event)` matches an event for `id`, or `timeout`
/// elapses.
fn wait_for(rx: &mpsc::Receiver<(MediaId, PlayerEvent)>, id: MediaId, timeout: Duration, want: impl Fn(&PlayerEvent) -> bool) -> PlayerEvent {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        assert!(!remaining.is_zero(), "timed out waiting for expected player event");
        let (event_id, event) = rx.recv_timeout(remaining).expect("player event channel closed unexpectedly");
        if event_id == id && want(&event) {
            return event;
        }
    }
}

fn new_player() -> (Player, mpsc::Receiver<(MediaId, PlayerEvent)>) {
    install_once();
    let (tx, rx) = mpsc::channel();
    let player = Player::with_config(
        Box::new(move |id, event| {
            let _ = tx.send((id, event));
        }),
        PlayerConfig {
            min_seek: Duration::from_millis(200),
        },
    );
    (player, rx)
}

#[test]
fn audio_only_reaches_ready_then_end() {
    let (mut player, rx) = new_player();
    let id = player.add_media(AUDIO_ONLY, AddMediaOptions::default()).unwrap();

    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));
    assert_eq!(player.state(id), PlayerState::Ready);

    player.start(id).unwrap();
    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
    assert_eq!(player.state(id), PlayerState::Stopped);
}

#[test]
fn pause_holds_state_without_a_spurious_end() {
    let (mut player, rx) = new_player();
    let id = player.add_media(AUDIO_ONLY, AddMediaOptions::default()).unwrap();
    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));

    player.start(id).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    player.pause(id).unwrap();
    assert_eq!(player.state(id), PlayerState::Paused);

    // A paused clock must stop the render sessions from ever reporting End on
    // their own — sitting idle for longer than the fixture's total length
    // must not produce one.
    std::thread::sleep(Duration::from_millis(2_500));
    assert_eq!(player.state(id), PlayerState::Paused);
}

#[test]
fn audio_video_reports_all_track_formats_and_a_single_ready_end() {
    let (mut player, rx) = new_player();
    let id = player.add_media(AUDIO_VIDEO, AddMediaOptions::default()).unwrap();

    let ready = wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));
    let PlayerEvent::Ready(formats) = ready else { unreachable!() };
    assert_eq!(formats.len(), 2);
    assert_eq!(player.formats(id).len(), 2);

    player.start(id).unwrap();
    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
}

#[test]
fn extra_track_of_an_already_selected_kind_does_not_block_readiness() {
    let (mut player, rx) = new_player();
    let id = player.add_media(TWO_VIDEO_TRACKS, AddMediaOptions::default()).unwrap();

    // Only the first video track is selected; `ready_pending` therefore has
    // exactly one entry and `Ready` must still fire.
    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));
    player.start(id).unwrap();
    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
}

#[test]
fn empty_container_is_rejected_before_any_session_is_built() {
    let (mut player, _rx) = new_player();
    let err = player.add_media(NO_TRACKS, AddMediaOptions::default()).unwrap_err();
    assert!(matches!(err, tiger_types::MediaError::NotSupported(_)));
}

#[test]
fn resource_busy_retries_transparently() {
    let (mut player, rx) = new_player();
    let id = player.add_media(BUSY_DECODER, AddMediaOptions::default()).unwrap();
    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));

    player.start(id).unwrap();
    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
}

#[test]
fn seek_past_debounce_window_is_accepted_and_playback_resumes() {
    let (mut player, rx) = new_player();
    let id = player.add_media(AUDIO_ONLY, AddMediaOptions::default()).unwrap();
    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));

    player.start(id).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    // Well past `min_seek` (200ms), so this seek must be accepted rather
    // than debounced away.
    player.seek(id, MediaTime::from_micros(1_000_000)).unwrap();
    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
}

#[test]
fn seek_within_debounce_window_is_ignored() {
    let (mut player, rx) = new_player();
    let id = player.add_media(AUDIO_ONLY, AddMediaOptions::default()).unwrap();
    wait_for(&rx, id, Duration::from_secs(2), |e| matches!(e, PlayerEvent::Ready(_)));
    player.start(id).unwrap();

    player.seek(id, MediaTime::from_micros(500_000)).unwrap();
    // Immediately within the 200ms debounce window of the clock's current
    // position: this second seek must be a no-op, not a second prepare.
    player.seek(id, MediaTime::from_micros(500_050)).unwrap();
    assert_eq!(player.state(id), PlayerState::Paused);

    wait_for(&rx, id, Duration::from_secs(5), |e| matches!(e, PlayerEvent::End));
}
