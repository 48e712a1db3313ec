//! Codec session: pulls packets from a packet source, feeds them through a
//! [`MediaDevice`] decoder, and answers frame requests as decoded output
//! becomes available.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tiger_dispatch::{Dispatcher, FrameRequestEvent, PacketRequestEvent, Reply};
use tiger_time::MediaTime;
use tiger_types::{
    AudioSampleFormat, DeviceConfig, Frame, MediaDevice, MediaFormat, MediaFrame, PushError, ReadyInfo,
    SessionInfo,
};

const MAX_PENDING_PACKETS: usize = 8;
/// Packets pre-requested at construction (and after every `prepare`) so the
/// input queue is already warm before the first frame request ever arrives.
pub const MIN_PACKETS: usize = 2;

/// Something that can answer a packet request — a closure over a
/// `SourceSession::on_request_packet` call bound to one track.
#[derive(Clone)]
pub struct PacketSource {
    request: Arc<dyn Fn(Option<MediaTime>, Reply<Option<Frame>>) + Send + Sync>,
}

impl PacketSource {
    /// Wraps `f` as a packet source.
    pub fn new(f: impl Fn(Option<MediaTime>, Reply<Option<Frame>>) + Send + Sync + 'static) -> Self {
        Self { request: Arc::new(f) }
    }

    fn request(&self, ts: Option<MediaTime>, reply: Reply<Option<Frame>>) {
        (self.request)(ts, reply);
    }
}

struct Inner {
    device: Box<dyn MediaDevice>,
    input_queue: VecDeque<Frame>,
    input_eos: bool,
    signaled_codec_eos: bool,
    output_eos: bool,
    disabled: bool,
    last_packet_time: MediaTime,
    frame_requests: VecDeque<Reply<Option<Frame>>>,
    packets_received: u64,
    packets_consumed: u64,
    frames_decoded: u64,
    // Held only to keep the source's packet interest alive for as long as
    // this codec session exists; dropped (and the track disabled upstream)
    // when the session is torn down.
    _packet_token: Option<PacketRequestEvent>,
}

/// Decodes packets on demand. Mirrors the producer/consumer shape of
/// [`crate::source::SourceSession`]: packets flow in as they're requested
/// from upstream, frames flow out as they're requested from downstream.
#[derive(Clone)]
pub struct CodecSession {
    inner: Arc<Mutex<Inner>>,
    dispatcher: Dispatcher,
    packet_source: PacketSource,
}

impl CodecSession {
    /// Builds a codec session around `device`, pulling packets through
    /// `packet_source`. `packet_token`, if given, is held for the lifetime
    /// of this session — dropping the session releases it, which disables
    /// the track upstream once nothing else still holds a clone. `format`
    /// is the track's declared output format, known the moment the device
    /// exists rather than after the first decode — reported via `info`
    /// immediately, so a render session can be built without ever having to
    /// make a downstream frame request first. Returns the session plus a
    /// fresh [`FrameRequestEvent`]: whoever ends up holding decoded frame
    /// requests against this session (normally a `RenderSession`) should
    /// keep it; dropping the last clone tears this codec session's input
    /// down the same way a dropped packet token disables a source track.
    pub fn new(
        dispatcher: Dispatcher,
        device: Box<dyn MediaDevice>,
        packet_source: PacketSource,
        packet_token: Option<PacketRequestEvent>,
        format: MediaFormat,
        info: impl Fn(SessionInfo) + Send + 'static,
    ) -> (Self, FrameRequestEvent) {
        let session = Self {
            inner: Arc::new(Mutex::new(Inner {
                device,
                input_queue: VecDeque::new(),
                input_eos: false,
                signaled_codec_eos: false,
                output_eos: false,
                disabled: false,
                last_packet_time: MediaTime::INVALID,
                frame_requests: VecDeque::new(),
                packets_received: 0,
                packets_consumed: 0,
                frames_decoded: 0,
                _packet_token: packet_token,
            })),
            dispatcher: dispatcher.clone(),
            packet_source,
        };

        // Fired through the dispatcher, like every other reply, so it lands
        // on the caller's thread only once whoever is wiring this session in
        // has finished doing so, rather than reentering them mid-construction.
        Reply::new(dispatcher.clone(), move |_: ()| info(SessionInfo::Ready(ReadyInfo::Format(format)))).fire(());

        // Warms the input queue immediately, independent of any downstream
        // frame request, instead of waiting for `request_frame` to trigger
        // the very first packet fetch.
        for _ in 0..MIN_PACKETS {
            session.request_packet(None);
        }

        let weak = Arc::downgrade(&session.inner);
        let token = FrameRequestEvent::new(move || {
            if let Some(inner) = weak.upgrade() {
                disable(&inner);
            }
        });
        (session, token)
    }

    /// Prepares (or re-prepares, after a seek) the decoder at `ts`: flushes
    /// all decoder state and requests fresh packets starting from the
    /// nearest sync point at or before `ts`.
    pub fn prepare(&self, ts: MediaTime) {
        info!("codec: prepare decoder");
        let mut inner = self.inner.lock();
        inner.input_eos = false;
        inner.output_eos = false;
        inner.signaled_codec_eos = false;
        inner.input_queue.clear();
        let _ = inner.device.reset();
        inner.last_packet_time = MediaTime::BEGIN;
        inner.packets_received = 0;
        inner.packets_consumed = 0;
        inner.frames_decoded = 0;
        drop(inner);
        self.request_packet(Some(ts));
    }

    /// Flushes buffered packets and frames without tearing the session down;
    /// used when a downstream consumer stops without a full reprepare.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        info!(queued = inner.input_queue.len(), "codec: flush");
        inner.frame_requests.clear();
        inner.input_queue.clear();
        let _ = inner.device.reset();
    }

    fn request_packet(&self, ts: Option<MediaTime>) {
        let mut inner = self.inner.lock();
        if inner.input_eos || inner.disabled {
            return;
        }
        if inner.input_queue.len() >= MAX_PENDING_PACKETS {
            debug!("codec: input queue full");
            return;
        }
        drop(inner);

        let this = self.clone();
        let reply = Reply::new(self.dispatcher.clone(), move |packet| this.on_packet_ready(packet));
        self.packet_source.request(ts, reply);
    }

    fn on_packet_ready(&self, packet: Option<Frame>) {
        let mut inner = self.inner.lock();
        match packet {
            None => {
                info!("codec: input eos detected");
                inner.input_eos = true;
            }
            Some(packet) => {
                inner.packets_received += 1;
                if packet.timecode < inner.last_packet_time {
                    warn!(
                        ts = packet.timecode.as_micros(),
                        last = inner.last_packet_time.as_micros(),
                        "codec: unordered packet"
                    );
                }
                inner.last_packet_time = packet.timecode;
                inner.input_queue.push_back(packet);
            }
        }

        while !inner.frame_requests.is_empty() && (inner.input_eos || !inner.input_queue.is_empty()) {
            if decode_one(&mut inner) {
                break;
            }
        }
        let keep_filling = !inner.input_eos && !inner.disabled;
        drop(inner);
        if keep_filling {
            self.request_packet(None);
        }
    }

    /// Requests the next decoded frame. `None` is delivered once the
    /// decoder is fully drained after input eos.
    pub fn request_frame(&self, reply: Reply<Option<Frame>>) {
        let mut inner = self.inner.lock();
        if inner.disabled {
            reply.fire(None);
            return;
        }
        if inner.output_eos {
            warn!("codec: frame requested at eos");
            reply.fire(None);
            return;
        }
        inner.frame_requests.push_back(reply);
        let ready_to_decode = inner.input_eos || !inner.input_queue.is_empty();
        drop(inner);
        if ready_to_decode {
            let mut inner = self.inner.lock();
            decode_one(&mut inner);
        } else {
            self.request_packet(None);
        }
    }
}

/// Tears down input processing once the last [`FrameRequestEvent`] clone
/// drops: no more packets are requested, and any still-pending frame
/// requests are answered with `None` rather than left to hang. Mirrors
/// `source::disable_track`'s role one layer up the pipeline.
fn disable(inner: &Mutex<Inner>) {
    let mut inner = inner.lock();
    if inner.disabled {
        return;
    }
    info!("codec: disabling, last FrameRequestEvent dropped");
    inner.disabled = true;
    inner.input_queue.clear();
    for reply in inner.frame_requests.drain(..) {
        reply.fire(None);
    }
}

/// Pushes one packet into the device (if any is queued), signals eos once
/// the input is drained, then pulls and answers the oldest pending request.
/// Returns `true` if no request could be answered yet (decoder still
/// warming up) and the caller should stop looping.
fn decode_one(inner: &mut Inner) -> bool {
    if let Some(packet) = inner.input_queue.front().cloned() {
        match inner.device.push(Some(packet)) {
            Ok(()) => {
                inner.input_queue.pop_front();
                inner.packets_consumed += 1;
            }
            Err(PushError::ResourceBusy) => {
                debug!("codec: device busy, will retry after drain");
            }
            Err(PushError::Fatal(err)) => {
                warn!(?err, "codec: write packet failed");
                inner.input_queue.pop_front();
            }
        }
    } else if !inner.signaled_codec_eos {
        debug_assert!(inner.input_eos);
        let _ = inner.device.push(None);
        inner.signaled_codec_eos = true;
    }

    let frame = inner.device.pull();
    let Some(reply) = inner.frame_requests.pop_front() else {
        return true;
    };

    if frame.is_none() && !inner.input_eos {
        warn!("codec: decoder still initializing");
        inner.frame_requests.push_front(reply);
        return true;
    }

    let frame = frame.map(backfill_audio_duration);
    if frame.is_some() {
        inner.frames_decoded += 1;
    } else {
        info!("codec: output eos detected");
        inner.output_eos = true;
    }

    let output_eos = inner.output_eos;
    reply.fire(frame);
    if output_eos {
        inner.frame_requests.clear();
    }
    false
}

/// If `frame` is an audio frame with no duration, computes one from sample
/// count and sample rate rather than leaving it `None`.
fn backfill_audio_duration(frame: Frame) -> Frame {
    if frame.duration.is_some() {
        return frame;
    }
    let MediaFormat::Audio(fmt) = frame.format else {
        return frame;
    };
    let bytes_per_frame = fmt.bytes_per_frame().max(1);
    let total_bytes = frame.planes.total_len();
    let sample_count = total_bytes / bytes_per_frame;
    let micros = (sample_count as i64 * 1_000_000) / fmt.sample_rate as i64;
    let mut updated = (*frame).clone();
    updated.duration = Some(MediaTime::from_micros(micros));
    Arc::new(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use bytes::Bytes;
    use tiger_types::{DeviceFormats, FrameFlags, PlaneData, TrackIndex};

    fn audio_format() -> tiger_time::AudioFormat {
        tiger_time::AudioFormat::packed(AudioSampleFormat::S16, 1, 1_000)
    }

    fn format() -> MediaFormat {
        MediaFormat::Audio(audio_format())
    }

    fn packet(ts: i64) -> Frame {
        Arc::new(MediaFrame {
            track: TrackIndex(0),
            flags: FrameFlags::SYNC,
            timecode: MediaTime::new(ts, 1000),
            duration: None,
            format: MediaFormat::Audio(audio_format()),
            planes: PlaneData::single(Bytes::from_static(b"abcd")),
            opaque: None,
        })
    }

    /// A pass-through decoder: whatever is pushed comes back out pull(),
    /// one in one out, no internal latency.
    struct PassThroughDevice {
        queue: VecDeque<Option<Frame>>,
    }

    impl PassThroughDevice {
        fn new() -> Self {
            Self { queue: VecDeque::new() }
        }
    }

    impl MediaDevice for PassThroughDevice {
        fn formats(&self) -> DeviceFormats {
            DeviceFormats { accepted: vec![] }
        }
        fn configure(&mut self, _msg: DeviceConfig) -> Result<(), tiger_types::MediaError> {
            Ok(())
        }
        fn push(&mut self, frame: Option<Frame>) -> Result<(), PushError> {
            self.queue.push_back(frame);
            Ok(())
        }
        fn pull(&mut self) -> Option<Frame> {
            self.queue.pop_front().flatten()
        }
        fn reset(&mut self) -> Result<(), tiger_types::MediaError> {
            self.queue.clear();
            Ok(())
        }
    }

    fn make_session() -> (CodecSession, mpsc::Receiver<Option<MediaTime>>) {
        let dispatcher = Dispatcher::new();
        let (req_tx, req_rx) = mpsc::channel();
        let source = PacketSource::new(move |ts, reply| {
            req_tx.send(ts).unwrap();
            reply.fire(Some(packet(0)));
        });
        let (session, _frame_token) =
            CodecSession::new(dispatcher, Box::new(PassThroughDevice::new()), source, None, format(), |_| {});
        (session, req_rx)
    }

    #[test]
    fn requests_packet_on_prepare() {
        let (session, req_rx) = make_session();
        session.prepare(MediaTime::from_micros(0));
        assert!(req_rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn request_frame_returns_decoded_frame() {
        let dispatcher = Dispatcher::new();
        let source = PacketSource::new(move |_ts, reply| reply.fire(Some(packet(0))));
        let (session, _frame_token) =
            CodecSession::new(dispatcher.clone(), Box::new(PassThroughDevice::new()), source, None, format(), |_| {});

        let (tx, rx) = mpsc::channel();
        session.request_frame(Reply::new(dispatcher, move |f: Option<Frame>| tx.send(f).unwrap()));
        let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn backfills_missing_audio_duration() {
        let f = packet(0);
        let backfilled = backfill_audio_duration(f);
        assert!(backfilled.duration.is_some());
    }

    #[test]
    fn dropping_frame_token_disables_session() {
        let dispatcher = Dispatcher::new();
        let source = PacketSource::new(move |_ts, reply| reply.fire(Some(packet(0))));
        let (session, frame_token) =
            CodecSession::new(dispatcher.clone(), Box::new(PassThroughDevice::new()), source, None, format(), |_| {});
        drop(frame_token);

        let (tx, rx) = mpsc::channel();
        session.request_frame(Reply::new(dispatcher, move |f: Option<Frame>| tx.send(f).unwrap()));
        let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn reports_ready_and_prefetches_packets_at_construction() {
        let dispatcher = Dispatcher::new();
        let (req_tx, req_rx) = mpsc::channel();
        let source = PacketSource::new(move |ts, reply| {
            req_tx.send(ts).unwrap();
            reply.fire(Some(packet(0)));
        });
        let (ready_tx, ready_rx) = mpsc::channel();
        let (_session, _frame_token) = CodecSession::new(dispatcher, Box::new(PassThroughDevice::new()), source, None, format(), move |info| {
            ready_tx.send(info).unwrap();
        });

        for _ in 0..MIN_PACKETS {
            assert!(req_rx.recv_timeout(Duration::from_secs(1)).is_ok());
        }
        match ready_rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            SessionInfo::Ready(ReadyInfo::Format(got)) => assert_eq!(got, format()),
            other => panic!("expected Ready(Format(_)), got {other:?}"),
        }
    }
}
