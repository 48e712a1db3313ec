//! The `MediaDevice` trait: the sink/decoder-facing abstraction over codecs
//! and render backends.

use crate::error::{MediaError, PushError};
use crate::frame::{Frame, MediaFormat};

/// Formats a device can accept, reported once after construction and again
/// whenever `configure` changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFormats {
    /// Formats the device will accept via `push`, in preference order.
    pub accepted: Vec<MediaFormat>,
}

/// Configuration message sent to a device before or during use (e.g. the
/// negotiated input format and any codec-specific data).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Format the device should expect on `push` after this call returns.
    pub format: MediaFormat,
    /// Codec identifier, when the device decodes rather than renders.
    pub codec: Option<String>,
}

/// A codec or sink: something that accepts frames via `push` and yields
/// frames (or nothing, for pure sinks) via `pull`.
///
/// Implemented by decoders (compressed frame in, decoded frame out) and by
/// render devices (decoded frame in, nothing out — presentation is a side
/// effect).
pub trait MediaDevice: Send {
    /// Formats this device currently accepts.
    fn formats(&self) -> DeviceFormats;

    /// Reconfigures the device, e.g. after a format change mid-stream.
    fn configure(&mut self, msg: DeviceConfig) -> Result<(), MediaError>;

    /// Pushes a frame for processing. `None` signals end-of-stream and
    /// triggers drain-then-flush behavior in the device.
    ///
    /// `PushError::ResourceBusy` means the device's input queue is full;
    /// the caller should `pull` and retry rather than treat this as fatal.
    fn push(&mut self, frame: Option<Frame>) -> Result<(), PushError>;

    /// Pulls the next available output frame, if any. Decoders yield decoded
    /// frames; pure sinks always return `None`.
    fn pull(&mut self) -> Option<Frame>;

    /// Drops all buffered state (e.g. after a seek). The device remains
    /// configured and ready to accept new input afterward.
    fn reset(&mut self) -> Result<(), MediaError>;
}
