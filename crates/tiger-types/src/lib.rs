//! # tiger-types Component
//!
//! Common types, errors, and traits used across every Tiger media engine
//! component.
//!
//! # Overview
//!
//! - **Frames**: [`MediaFrame`], [`Frame`], [`FrameFlags`], [`PlaneData`],
//!   [`MediaFormat`], [`TrackIndex`], [`TrackKind`]
//! - **Errors**: [`MediaError`], [`PushError`]
//! - **Session status**: [`SessionInfo`], [`ReadyInfo`], [`TrackFormat`]
//! - **Traits**: [`MediaDevice`], [`MediaFile`]

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod device;
mod error;
mod file;
mod frame;
mod session_info;

pub use device::{DeviceConfig, DeviceFormats, MediaDevice};
pub use error::{MediaError, MediaResult, PushError};
pub use file::{FileConfig, FileFormats, MediaFile, ReadMode};
pub use frame::{Frame, FrameFlags, MediaFormat, MediaFrame, OpaqueHandle, PlaneData, TrackIndex, TrackKind};
pub use session_info::{ReadyInfo, SessionInfo, TrackFormat};
