//! # tiger-time Component
//!
//! Rational media timestamps and the audio/image format enumerations that
//! travel alongside them through the rest of the Tiger media engine.
//!
//! # Overview
//!
//! - **Timestamps**: [`MediaTime`], a `value/scale` rational that compares by
//!   cross-multiplication and rescales to a common denominator on add/sub,
//!   so a 1/3s timestamp never rounds away before it needs to.
//! - **Audio formats**: [`AudioSampleFormat`], [`SampleLayout`], [`AudioFormat`]
//! - **Video formats**: [`PixelFormat`], [`Rotation`], [`CropRect`], [`ImageFormat`]
//!
//! # Examples
//!
//! ```
//! use tiger_time::MediaTime;
//!
//! let a = MediaTime::new(1, 2);
//! let b = MediaTime::new(1, 3);
//! assert_eq!(a + b, MediaTime::new(5, 6));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod formats;
mod time;

pub use formats::{AudioFormat, AudioSampleFormat, CropRect, ImageFormat, PixelFormat, Rotation, SampleLayout};
pub use time::MediaTime;
