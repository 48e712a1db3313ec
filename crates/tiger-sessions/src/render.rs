//! Render session: paces decoded frames against a [`Clock`] and drives a
//! sink [`MediaDevice`], or an external frame-ready callback.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tiger_clock::{Clock, ClockState};
use tiger_dispatch::{Dispatcher, FrameRequestEvent, GenTagged, Generation, GenerationCounter, JobHandle, Reply};
use tiger_time::MediaTime;
use tiger_types::{DeviceConfig, Frame, MediaDevice, MediaError, MediaFormat, SessionInfo};

/// Frames buffered before a render session reports itself prepared.
pub const MIN_COUNT: usize = 16;
/// Tolerance either side of the clock before a render tick defers or logs
/// underrun, rather than presenting a frame.
const JITTER: Duration = Duration::from_millis(5);
/// Period of the render tick job while rendering or idling in prepare.
const REFRESH_INTERVAL: Duration = Duration::from_millis(10);

const TICK_HANDLE: JobHandle = JobHandle(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Prepare,
    PrepareInt,
    Ready,
    Rendering,
    Paused,
}

/// Either an owned sink device, or an external callback frames are handed
/// to instead — the "external `FrameReadyEvent`" path from the render
/// session's initialization.
enum Sink {
    None,
    Device(Box<dyn MediaDevice>),
    External(Box<dyn Fn(Frame) + Send>),
}

impl Sink {
    fn is_present(&self) -> bool {
        !matches!(self, Sink::None)
    }

    fn push(&mut self, frame: Frame) -> Result<(), MediaError> {
        match self {
            Sink::None => Ok(()),
            Sink::Device(device) => device.push(Some(frame)).map_err(|err| match err {
                tiger_types::PushError::ResourceBusy => MediaError::InvalidOperation("sink busy".into()),
                tiger_types::PushError::Fatal(err) => err,
            }),
            Sink::External(cb) => {
                cb(frame);
                Ok(())
            }
        }
    }

    fn push_eos(&mut self) {
        if let Sink::Device(device) = self {
            let _ = device.push(None);
        }
    }
}

struct Inner {
    state: State,
    sink: Sink,
    sink_latency: MediaTime,
    clock: Option<Clock>,
    clock_updated: bool,
    output_queue: VecDeque<Frame>,
    input_eos: bool,
    ever_received: bool,
    last_frame_time: MediaTime,
    rendered_count: u64,
    reported_prepare: bool,
    reported_end: bool,
    ticking: bool,
    // Retained only when the track's format wasn't known up front; built
    // from the first real frame's format in `on_frame_ready`, then dropped.
    pending_make_sink: Option<Box<dyn Fn(MediaFormat) -> Result<Box<dyn MediaDevice>, MediaError> + Send>>,
    frame_source: Option<Arc<dyn Fn(Generation, Reply<Option<Frame>>) + Send + Sync>>,
    info: Box<dyn Fn(SessionInfo) + Send>,
    generation: GenerationCounter,
    // Held only to keep the codec's frame interest alive for as long as this
    // render session exists; dropped (disabling that codec) when this
    // session is torn down.
    _frame_token: Option<FrameRequestEvent>,
}

/// Drives a sink device (or external callback) from decoded frames pulled on
/// demand, pacing presentation against an optional shared [`Clock`].
#[derive(Clone)]
pub struct RenderSession {
    inner: Arc<Mutex<Inner>>,
    dispatcher: Dispatcher,
}

impl RenderSession {
    /// Builds a render session. `make_sink` is called lazily, once the
    /// track's format is known (either up front, if `known_format` is
    /// `Some`, or on the first real frame otherwise), to construct the sink
    /// device. Pass `None` for `make_sink` to run in external-frame mode,
    /// forwarding decoded frames to `on_frame` instead of an owned sink.
    pub fn new(
        dispatcher: Dispatcher,
        clock: Option<Clock>,
        known_format: Option<MediaFormat>,
        make_sink: Option<Box<dyn Fn(MediaFormat) -> Result<Box<dyn MediaDevice>, MediaError> + Send>>,
        on_frame: Option<Box<dyn Fn(Frame) + Send>>,
        frame_token: Option<FrameRequestEvent>,
        frame_source: impl Fn(Generation, Reply<Option<Frame>>) + Send + Sync + 'static,
        info: impl Fn(SessionInfo) + Send + 'static,
    ) -> Self {
        let eager = on_frame.is_none();
        let (sink, pending_make_sink) = match (known_format, make_sink, eager) {
            (Some(format), Some(make_sink), true) => match make_sink(format) {
                Ok(device) => (Sink::Device(device), None),
                Err(err) => {
                    warn!(?err, "render: failed to create sink eagerly");
                    (Sink::None, None)
                }
            },
            (None, Some(make_sink), true) => (Sink::None, Some(make_sink)),
            _ => (Sink::None, None),
        };
        let external = on_frame.map(Sink::External);

        let session = Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Init,
                sink: external.unwrap_or(sink),
                sink_latency: MediaTime::from_micros(0),
                clock,
                clock_updated: false,
                output_queue: VecDeque::new(),
                input_eos: false,
                ever_received: false,
                last_frame_time: MediaTime::BEGIN,
                rendered_count: 0,
                reported_prepare: false,
                reported_end: false,
                ticking: false,
                pending_make_sink,
                frame_source: Some(Arc::new(frame_source)),
                info: Box::new(info),
                generation: GenerationCounter::new(),
                _frame_token: frame_token,
            })),
            dispatcher,
        };

        session.install_clock_listener();
        session.start_prepare();
        session
    }

    fn install_clock_listener(&self) {
        let inner = self.inner.lock();
        let Some(clock) = inner.clock.as_ref() else {
            return;
        };
        let this = self.clone();
        clock.set_listener(move |state| this.on_clock_event(state));
        let already_ticking = !clock.is_paused();
        drop(inner);
        // A track's render session can attach after the clock is already
        // running (e.g. a video track added once audio has started); sync
        // to the current state instead of waiting for the next transition.
        if already_ticking {
            self.on_start_renderer();
        }
    }

    fn start_prepare(&self) {
        let mut inner = self.inner.lock();
        inner.state = State::Prepare;
        let freewheel = inner.clock.is_none();
        drop(inner);
        self.request_frame();
        if freewheel {
            self.arm_tick(Duration::from_millis(0));
        }
    }

    fn on_clock_event(&self, state: ClockState) {
        match state {
            ClockState::Ticking => self.on_start_renderer(),
            ClockState::Paused => self.on_pause_renderer(),
            ClockState::TimeChanged => self.on_prepare_renderer(),
        }
    }

    fn on_start_renderer(&self) {
        info!("render: clock ticking, starting renderer");
        let mut inner = self.inner.lock();
        if inner.state == State::Ready {
            inner.state = State::Rendering;
        }
        inner.ticking = true;
        drop(inner);
        self.arm_tick(Duration::from_millis(0));
    }

    fn on_pause_renderer(&self) {
        info!("render: clock paused, pausing renderer");
        let mut inner = self.inner.lock();
        inner.ticking = false;
        if inner.state == State::Rendering {
            inner.state = State::Paused;
        }
        drop(inner);
        self.dispatcher.remove(TICK_HANDLE);
    }

    fn on_prepare_renderer(&self) {
        info!("render: clock time changed, re-preparing");
        self.dispatcher.remove(TICK_HANDLE);
        let mut inner = self.inner.lock();
        inner.ticking = false;
        inner.state = State::PrepareInt;
        inner.output_queue.clear();
        inner.clock_updated = false;
        let generation = inner.generation.bump();
        drop(inner);
        debug!(generation = generation.0, "render: reprepare generation bump");
        self.request_frame();
    }

    /// Requests the render session drop everything and restart at `ts`,
    /// mirroring the seek path triggered by a `FrameRequest` carrying a
    /// timestamp.
    pub fn seek(&self, ts: MediaTime) {
        self.dispatcher.remove(TICK_HANDLE);
        let mut inner = self.inner.lock();
        inner.state = State::PrepareInt;
        inner.output_queue.clear();
        inner.input_eos = false;
        inner.clock_updated = false;
        inner.reported_prepare = false;
        let generation = inner.generation.bump();
        if let Sink::Device(device) = &mut inner.sink {
            let _ = device.reset();
        }
        drop(inner);
        debug!(generation = generation.0, seconds = ts.as_seconds_f64(), "render: seek");
        self.request_frame();
    }

    fn request_frame(&self) {
        let inner = self.inner.lock();
        let Some(source) = inner.frame_source.clone() else {
            return;
        };
        let generation = inner.generation.current();
        let counter = inner.generation.clone();
        drop(inner);

        let this = self.clone();
        let tagged = GenTagged::new(counter, move |frame| this.on_frame_ready(frame, generation));
        let reply = Reply::new(self.dispatcher.clone(), move |frame| tagged.call(frame));
        source(generation, reply);
    }

    fn on_frame_ready(&self, frame: Option<Frame>, gen: Generation) {
        let mut inner = self.inner.lock();
        if gen != inner.generation.current() {
            debug!("render: dropping frame from stale generation");
            return;
        }

        let Some(frame) = frame else {
            info!("render: input eos");
            inner.input_eos = true;
            if !inner.ever_received {
                (inner.info)(SessionInfo::End);
                inner.reported_end = true;
                return;
            }
            // A short track may never accumulate MIN_COUNT frames; eos
            // still completes prepare with however many queued.
            self.complete_prepare_if_needed(&mut inner);
            return;
        };
        inner.ever_received = true;

        if !frame.timecode.is_valid() {
            warn!("render: frame with invalid timecode, presenting best-effort");
        }

        if !inner.sink.is_present() {
            if let Some(make_sink) = inner.pending_make_sink.take() {
                debug!("render: lazy sink init on first real frame");
                match make_sink(frame.format) {
                    Ok(device) => inner.sink = Sink::Device(device),
                    Err(err) => warn!(?err, "render: failed to create sink lazily"),
                }
            }
        }

        let is_first_video_frame = !inner.clock_updated && inner.rendered_count == 0 && inner.output_queue.is_empty();
        let clock_now = inner.clock.as_ref().map(|c| c.get());
        if let Some(now) = clock_now {
            if !is_first_video_frame && frame.timecode < now {
                debug!("render: dropping late frame at ingestion");
                inner.last_frame_time = frame.timecode;
                drop(inner);
                self.request_frame();
                return;
            }
        }

        inner.last_frame_time = frame.timecode;
        inner.output_queue.push_back(frame);

        if inner.output_queue.len() >= MIN_COUNT {
            self.complete_prepare_if_needed(&mut inner);
            return;
        }
        drop(inner);
        self.request_frame();
    }

    /// In `Prepare`/`PrepareInt`, transitions to `Ready`/`Rendering` and
    /// fires the `Ready` event once enough frames are buffered (or eos has
    /// made buffering more of them impossible). A no-op outside those
    /// states or if prepare already completed.
    fn complete_prepare_if_needed(&self, inner: &mut Inner) {
        if !matches!(inner.state, State::Prepare | State::PrepareInt) {
            return;
        }
        let is_prepare_int = inner.state == State::PrepareInt;
        inner.state = if is_prepare_int { State::Rendering } else { State::Ready };
        if !inner.reported_prepare {
            inner.reported_prepare = true;
            let format = frame_format(inner);
            (inner.info)(SessionInfo::Ready(tiger_types::ReadyInfo::Format(format)));
        }
        let should_tick = inner.ticking || inner.clock.is_none();
        if should_tick {
            self.arm_tick(Duration::from_millis(0));
        }
    }

    fn arm_tick(&self, delay: Duration) {
        let this = self.clone();
        self.dispatcher
            .dispatch(TICK_HANDLE, delay, Box::new(move || this.on_render_tick()));
    }

    fn on_render_tick(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, State::Paused | State::Init) {
            drop(inner);
            return;
        }
        if matches!(inner.state, State::Prepare | State::PrepareInt) {
            drop(inner);
            self.arm_tick(REFRESH_INTERVAL);
            return;
        }

        if inner.input_eos && inner.output_queue.is_empty() {
            info!("render: output drained at eos");
            inner.sink.push_eos();
            if !inner.reported_end {
                inner.reported_end = true;
                (inner.info)(SessionInfo::End);
            }
            drop(inner);
            return;
        }

        if inner.output_queue.is_empty() {
            debug!("render: underrun, output queue empty");
            drop(inner);
            self.arm_tick(REFRESH_INTERVAL);
            return;
        }

        let delay = render_current(&mut inner);
        match delay {
            Ok(delay) => {
                drop(inner);
                self.arm_tick(delay);
            }
            Err(err) => {
                warn!(?err, "render: sink push failed");
                inner.state = State::Paused;
                (inner.info)(SessionInfo::Error(err));
            }
        }
    }
}

/// Reports the format of the first queued frame, used only to populate the
/// `Ready` event's payload.
fn frame_format(inner: &Inner) -> MediaFormat {
    inner
        .output_queue
        .front()
        .map(|f| f.format)
        .unwrap_or(MediaFormat::Audio(tiger_time::AudioFormat::packed(
            tiger_time::AudioSampleFormat::S16,
            1,
            48_000,
        )))
}

/// Presents (or defers) the head-of-queue frame. Returns the delay to the
/// next tick, or the sink error if the push failed.
fn render_current(inner: &mut Inner) -> Result<Duration, MediaError> {
    let is_master = matches!(inner.clock.as_ref().map(Clock::role), Some(tiger_clock::ClockRole::Master));
    let head = inner.output_queue.front().expect("checked non-empty by caller").clone();

    let skip_comparison = is_master && !inner.clock_updated;
    if !skip_comparison {
        if let Some(clock) = &inner.clock {
            let now = clock.get();
            let early = head.timecode.as_micros() - now.as_micros() - inner.sink_latency.as_micros();
            let jitter_us = JITTER.as_micros() as i64;
            if early > jitter_us {
                return Ok(Duration::from_micros(early as u64));
            }
            if early < -jitter_us {
                debug!(early, "render: underrun past jitter tolerance, presenting anyway");
            }
        }
    }

    inner.sink.push(head.clone())?;
    inner.output_queue.pop_front();
    inner.rendered_count += 1;

    if is_master && !inner.clock_updated {
        if let Some(clock) = &inner.clock {
            let anchor = head.timecode - inner.sink_latency;
            clock.update(anchor);
        }
        inner.clock_updated = true;
    }

    let next_delay = match inner.output_queue.front() {
        Some(next) => {
            let now = inner.clock.as_ref().map(|c| c.get()).unwrap_or(MediaTime::from_micros(0));
            let delta = next.timecode.as_micros() - now.as_micros();
            Duration::from_micros(delta.max(0) as u64)
        }
        None => REFRESH_INTERVAL,
    };
    Ok(next_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use bytes::Bytes;
    use tiger_clock::SharedClock;
    use tiger_types::{FrameFlags, MediaFrame, PlaneData, TrackIndex};

    fn audio_format() -> tiger_time::AudioFormat {
        tiger_time::AudioFormat::packed(tiger_time::AudioSampleFormat::S16, 1, 1_000)
    }

    fn frame(ts_ms: i64) -> Frame {
        Arc::new(MediaFrame {
            track: TrackIndex(0),
            flags: FrameFlags::SYNC,
            timecode: MediaTime::new(ts_ms, 1_000),
            duration: None,
            format: MediaFormat::Audio(audio_format()),
            planes: PlaneData::single(Bytes::from_static(b"x")),
            opaque: None,
        })
    }

    struct CountingSink {
        pushes: Arc<std::sync::atomic::AtomicU64>,
    }

    impl MediaDevice for CountingSink {
        fn formats(&self) -> tiger_types::DeviceFormats {
            tiger_types::DeviceFormats { accepted: vec![] }
        }
        fn configure(&mut self, _msg: DeviceConfig) -> Result<(), MediaError> {
            Ok(())
        }
        fn push(&mut self, frame: Option<Frame>) -> Result<(), tiger_types::PushError> {
            if frame.is_some() {
                self.pushes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(())
        }
        fn pull(&mut self) -> Option<Frame> {
            None
        }
        fn reset(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
    }

    #[test]
    fn freewheel_without_clock_renders_frames() {
        let dispatcher = Dispatcher::new();
        let pushes = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let sink_pushes = pushes.clone();
        let mut remaining = 3u64;
        let source = move |_gen: Generation, reply: Reply<Option<Frame>>| {
            if remaining > 0 {
                remaining -= 1;
                reply.fire(Some(frame(0)));
            } else {
                reply.fire(None);
            }
        };

        let _session = RenderSession::new(
            dispatcher,
            None,
            Some(MediaFormat::Audio(audio_format())),
            Some(Box::new(move |_fmt| {
                Ok(Box::new(CountingSink {
                    pushes: sink_pushes.clone(),
                }) as Box<dyn MediaDevice>)
            })),
            None,
            None,
            source,
            |_info| {},
        );

        std::thread::sleep(Duration::from_millis(200));
        assert!(pushes.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    fn external_frame_sink_receives_frames() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        let mut remaining = 2u64;
        let source = move |_gen: Generation, reply: Reply<Option<Frame>>| {
            if remaining > 0 {
                remaining -= 1;
                reply.fire(Some(frame(0)));
            } else {
                reply.fire(None);
            }
        };

        let _session = RenderSession::new(
            dispatcher,
            None,
            None,
            None,
            Some(Box::new(move |f: Frame| tx.send(f).unwrap())),
            None,
            source,
            |_info| {},
        );

        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn master_clock_anchors_on_first_frame() {
        let shared = Arc::new(SharedClock::new());
        let clock = Clock::new(shared, tiger_clock::ClockRole::Master);
        clock.start();

        let dispatcher = Dispatcher::new();
        let pushes = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let sink_pushes = pushes.clone();
        let mut remaining = 1u64;
        let source = move |_gen: Generation, reply: Reply<Option<Frame>>| {
            if remaining > 0 {
                remaining -= 1;
                reply.fire(Some(frame(0)));
            } else {
                reply.fire(None);
            }
        };

        let _session = RenderSession::new(
            dispatcher,
            Some(clock),
            Some(MediaFormat::Audio(audio_format())),
            Some(Box::new(move |_fmt| {
                Ok(Box::new(CountingSink {
                    pushes: sink_pushes.clone(),
                }) as Box<dyn MediaDevice>)
            })),
            None,
            None,
            source,
            |_info| {},
        );

        std::thread::sleep(Duration::from_millis(200));
        assert!(pushes.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[test]
    fn deferred_format_builds_sink_from_first_frame() {
        let dispatcher = Dispatcher::new();
        let pushes = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let sink_pushes = pushes.clone();
        let mut remaining = 2u64;
        let source = move |_gen: Generation, reply: Reply<Option<Frame>>| {
            if remaining > 0 {
                remaining -= 1;
                reply.fire(Some(frame(0)));
            } else {
                reply.fire(None);
            }
        };

        let _session = RenderSession::new(
            dispatcher,
            None,
            None,
            Some(Box::new(move |_fmt| {
                Ok(Box::new(CountingSink {
                    pushes: sink_pushes.clone(),
                }) as Box<dyn MediaDevice>)
            })),
            None,
            None,
            source,
            |_info| {},
        );

        std::thread::sleep(Duration::from_millis(200));
        assert!(pushes.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }
}
