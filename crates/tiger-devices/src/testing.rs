//! In-memory `MediaFile`/`MediaDevice` doubles driving `tiger-player`
//! integration tests without a real container or codec.
//!
//! A [`ScriptedMedia`] is a fixed, in-order list of frames tagged by track;
//! wrapping it in a [`ScriptedFile`] (via [`ScriptedFileFactory`]) and
//! registering a [`ScriptedDeviceFactory`] gives a `Registry` that can open
//! any URL and decode/render it through pass-through devices.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use tiger_time::MediaTime;
use tiger_types::{
    DeviceConfig, DeviceFormats, FileConfig, FileFormats, Frame, MediaDevice, MediaError, MediaFile, MediaFormat,
    MediaFrame, PlaneData, PushError, ReadMode, TrackFormat, TrackIndex,
};

/// A fixed script: per-track formats plus the frames a [`ScriptedFile`]
/// replays, in file order (interleaved across tracks the way a real
/// container would be).
#[derive(Clone)]
pub struct ScriptedMedia {
    tracks: Vec<TrackFormat>,
    frames: Arc<Vec<Frame>>,
}

impl ScriptedMedia {
    /// Builds a script from its track list and frame sequence.
    pub fn new(tracks: Vec<TrackFormat>, frames: Vec<Frame>) -> Self {
        Self {
            tracks,
            frames: Arc::new(frames),
        }
    }
}

/// Builds a minimal [`TrackFormat`] for a test fixture; `codec` and
/// `codec_private` are rarely load-bearing in a scripted test so this fills
/// in placeholder values.
pub fn track_format(track: u32, kind: tiger_types::TrackKind, format: MediaFormat) -> TrackFormat {
    TrackFormat {
        track: TrackIndex(track),
        kind,
        format,
        codec: "test".to_string(),
        codec_private: None,
    }
}

/// Builds a [`Frame`] carrying no real payload (an empty plane) — enough to
/// drive session bookkeeping, which never inspects plane contents.
pub fn frame(track: u32, timecode: MediaTime, format: MediaFormat, sync: bool) -> Frame {
    let mut flags = tiger_types::FrameFlags::empty();
    if sync {
        flags |= tiger_types::FrameFlags::SYNC;
    }
    Arc::new(MediaFrame {
        track: TrackIndex(track),
        flags,
        timecode,
        duration: None,
        format,
        planes: PlaneData::single(Bytes::new()),
        opaque: None,
    })
}

/// Replays a [`ScriptedMedia`]'s frames as a [`MediaFile`]. Tracks not in
/// [`FileConfig::enabled_tracks`] (set via `configure`, or the script's own
/// track list on construction) are skipped during `read`.
pub struct ScriptedFile {
    tracks: Vec<TrackFormat>,
    frames: Arc<Vec<Frame>>,
    enabled: Vec<TrackIndex>,
    pos: usize,
}

impl ScriptedFile {
    /// Replays `media` from its first frame.
    pub fn new(media: ScriptedMedia) -> Self {
        let enabled = media.tracks.iter().map(|t| t.track).collect();
        Self {
            tracks: media.tracks,
            frames: media.frames,
            enabled,
            pos: 0,
        }
    }

    fn is_enabled(&self, frame: &Frame) -> bool {
        self.enabled.contains(&frame.track)
    }

    fn next_index_from(&self, start: usize) -> Option<usize> {
        (start..self.frames.len()).find(|&i| self.is_enabled(&self.frames[i]))
    }

    fn advance(&mut self) -> Option<Frame> {
        let idx = self.next_index_from(self.pos)?;
        self.pos = idx + 1;
        Some(self.frames[idx].clone())
    }

    fn peek(&self) -> Option<Frame> {
        let idx = self.next_index_from(self.pos)?;
        Some(self.frames[idx].clone())
    }

    /// Repositions `self.pos` at the nearest sync frame. `ts = None` resyncs
    /// backward from the current position (`LastSync`); `ts = Some(t)` seeks
    /// to the sync point before (`ClosestSync`) or strictly after
    /// (`strictly_after`) `t`.
    fn seek_sync(&mut self, ts: Option<MediaTime>, strictly_after: bool) {
        let candidates: Vec<usize> = (0..self.frames.len())
            .filter(|&i| self.is_enabled(&self.frames[i]) && self.frames[i].is_sync())
            .collect();

        let target = match ts {
            None => candidates.iter().rev().find(|&&i| i <= self.pos).copied(),
            Some(t) if strictly_after => candidates.iter().find(|&&i| self.frames[i].timecode > t).copied(),
            Some(t) => candidates.iter().rev().find(|&&i| self.frames[i].timecode <= t).copied(),
        };

        if let Some(idx) = target {
            self.pos = idx;
        }
    }
}

impl MediaFile for ScriptedFile {
    fn formats(&self) -> FileFormats {
        FileFormats {
            tracks: self.tracks.clone(),
        }
    }

    fn configure(&mut self, msg: FileConfig) -> Result<(), MediaError> {
        self.enabled = msg.enabled_tracks;
        Ok(())
    }

    fn read(&mut self, mode: ReadMode, ts: Option<MediaTime>) -> Option<Frame> {
        match mode {
            ReadMode::Next => self.advance(),
            ReadMode::Peek => self.peek(),
            ReadMode::ClosestSync => {
                self.seek_sync(ts, false);
                self.advance()
            }
            ReadMode::LastSync => {
                self.seek_sync(None, false);
                self.advance()
            }
            ReadMode::NextSync => {
                self.seek_sync(ts, true);
                self.advance()
            }
            ReadMode::Index(idx) => {
                self.pos = (idx as usize).min(self.frames.len());
                self.advance()
            }
        }
    }
}

/// [`tiger_player::registry::MediaFileFactory`] replaying a fixed
/// [`ScriptedMedia`] — a fixture stands in for "the file at this URL".
///
/// Matches every URL unless built with [`ScriptedFileFactory::for_url`], in
/// which case it only claims that one URL — several can share one
/// [`tiger_player::registry::Registry`], each serving a different scripted
/// scenario by URL, the way a real registry dispatches by scheme/extension.
pub struct ScriptedFileFactory {
    url: Option<String>,
    media: ScriptedMedia,
}

impl ScriptedFileFactory {
    /// Wraps `media` so every `open` call replays it from the start,
    /// regardless of the URL requested.
    pub fn new(media: ScriptedMedia) -> Self {
        Self { url: None, media }
    }

    /// As [`ScriptedFileFactory::new`], but only claims `url` exactly —
    /// lets a registry hold several scripted fixtures side by side.
    pub fn for_url(url: impl Into<String>, media: ScriptedMedia) -> Self {
        Self {
            url: Some(url.into()),
            media,
        }
    }
}

impl tiger_player::registry::MediaFileFactory for ScriptedFileFactory {
    fn can_open(&self, url: &str) -> bool {
        match &self.url {
            Some(expected) => expected == url,
            None => true,
        }
    }

    fn open(&self, _url: &str) -> Result<Box<dyn MediaFile>, MediaError> {
        Ok(Box::new(ScriptedFile::new(self.media.clone())))
    }
}

/// Pass-through `MediaDevice`: every pushed frame becomes pullable
/// unchanged, after an optional run of scripted `ResourceBusy` replies.
pub struct ScriptedDevice {
    formats: DeviceFormats,
    queue: VecDeque<Frame>,
    busy_remaining: usize,
    fail: bool,
}

impl ScriptedDevice {
    /// A device that accepts `format` and never fails or stalls.
    pub fn new(format: MediaFormat) -> Self {
        Self {
            formats: DeviceFormats { accepted: vec![format] },
            queue: VecDeque::new(),
            busy_remaining: 0,
            fail: false,
        }
    }

    /// As [`ScriptedDevice::new`], replying `ResourceBusy` to the first
    /// `busy_pushes` calls to `push` before accepting normally.
    pub fn with_busy(format: MediaFormat, busy_pushes: usize) -> Self {
        Self {
            busy_remaining: busy_pushes,
            ..Self::new(format)
        }
    }

    /// A device whose every `push` returns a fatal error.
    pub fn failing(format: MediaFormat) -> Self {
        Self {
            fail: true,
            ..Self::new(format)
        }
    }
}

impl MediaDevice for ScriptedDevice {
    fn formats(&self) -> DeviceFormats {
        self.formats.clone()
    }

    fn configure(&mut self, msg: DeviceConfig) -> Result<(), MediaError> {
        self.formats = DeviceFormats { accepted: vec![msg.format] };
        Ok(())
    }

    fn push(&mut self, frame: Option<Frame>) -> Result<(), PushError> {
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return Err(PushError::ResourceBusy);
        }

        if self.fail {
            warn!("scripted device: failing push as configured");
            return Err(PushError::Fatal(MediaError::Unknown("scripted device failure".into())));
        }
        if let Some(frame) = frame {
            self.queue.push_back(frame);
        }
        Ok(())
    }

    fn pull(&mut self) -> Option<Frame> {
        self.queue.pop_front()
    }

    fn reset(&mut self) -> Result<(), MediaError> {
        self.queue.clear();
        Ok(())
    }
}

/// [`tiger_player::registry::DeviceFactory`] producing plain pass-through
/// [`ScriptedDevice`]s for both decoders and sinks.
///
/// A decoder whose [`TrackFormat::codec`] string contains `"busy:N"` replies
/// `ResourceBusy` to its first `N` pushes before accepting normally; one
/// containing `"failing"` fails every push fatally. Sinks are always plain
/// pass-through, since a `DeviceConfig` built for a sink carries no codec
/// string to key behavior off of.
pub struct ScriptedDeviceFactory;

impl tiger_player::registry::DeviceFactory for ScriptedDeviceFactory {
    fn create_decoder(&self, config: DeviceConfig) -> Result<Box<dyn MediaDevice>, MediaError> {
        let codec = config.codec.as_deref().unwrap_or("");
        if codec.contains("failing") {
            return Ok(Box::new(ScriptedDevice::failing(config.format)));
        }
        if let Some(count) = parse_busy_count(codec) {
            return Ok(Box::new(ScriptedDevice::with_busy(config.format, count)));
        }
        Ok(Box::new(ScriptedDevice::new(config.format)))
    }

    fn create_sink(&self, config: DeviceConfig) -> Result<Box<dyn MediaDevice>, MediaError> {
        Ok(Box::new(ScriptedDevice::new(config.format)))
    }
}

fn parse_busy_count(codec: &str) -> Option<usize> {
    codec.split_once("busy:")?.1.split(|c: char| !c.is_ascii_digit()).next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiger_types::{MediaFormat, TrackKind};

    fn format() -> MediaFormat {
        MediaFormat::Audio(tiger_time::AudioFormat::packed(tiger_time::AudioSampleFormat::S16, 1, 48_000))
    }

    fn scripted(sync_every: i64) -> ScriptedFile {
        let tracks = vec![track_format(0, TrackKind::Audio, format())];
        let frames = (0..10)
            .map(|i| frame(0, MediaTime::new(i * 100_000, 1_000_000), format(), i % sync_every == 0))
            .collect();
        ScriptedFile::new(ScriptedMedia::new(tracks, frames))
    }

    #[test]
    fn next_replays_in_order() {
        let mut file = scripted(2);
        let first = file.read(ReadMode::Next, None).unwrap();
        let second = file.read(ReadMode::Next, None).unwrap();
        assert_eq!(first.timecode.as_micros(), 0);
        assert_eq!(second.timecode.as_micros(), 100_000);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut file = scripted(2);
        let peeked = file.read(ReadMode::Peek, None).unwrap();
        let next = file.read(ReadMode::Next, None).unwrap();
        assert_eq!(peeked.timecode.as_micros(), next.timecode.as_micros());
    }

    #[test]
    fn closest_sync_lands_on_or_before_target() {
        let mut file = scripted(4);
        let frame = file.read(ReadMode::ClosestSync, Some(MediaTime::new(950_000, 1_000_000))).unwrap();
        assert_eq!(frame.timecode.as_micros(), 800_000);
        assert!(frame.is_sync());
    }

    #[test]
    fn next_sync_lands_strictly_after_target() {
        let mut file = scripted(4);
        let frame = file.read(ReadMode::NextSync, Some(MediaTime::new(100_000, 1_000_000))).unwrap();
        assert_eq!(frame.timecode.as_micros(), 400_000);
        assert!(frame.is_sync());
    }

    #[test]
    fn disabled_track_is_skipped() {
        let mut file = scripted(2);
        file.configure(FileConfig { enabled_tracks: vec![] }).unwrap();
        assert!(file.read(ReadMode::Next, None).is_none());
    }

    #[test]
    fn busy_count_parses_from_codec_string() {
        assert_eq!(parse_busy_count("aac-busy:2"), Some(2));
        assert_eq!(parse_busy_count("aac-busy:10-extra"), Some(10));
        assert_eq!(parse_busy_count("mp4a.40.2"), None);
    }
}
