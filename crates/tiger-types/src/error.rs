//! Error types for media engine operations.

use thiserror::Error;

/// Media engine error types.
///
/// # Examples
///
/// ```
/// use tiger_types::MediaError;
///
/// let error = MediaError::BadFormat("unrecognized container signature".to_string());
/// println!("{error}");
/// ```
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    /// The container or stream is not a recognized format.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// The format was recognized but the content is malformed or corrupt.
    #[error("bad content: {0}")]
    BadContent(String),

    /// A recognized feature or codec is not supported by this build.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The device cannot accept input right now; retry after draining output.
    /// Never surfaces past `tiger-sessions::codec`'s decode loop.
    #[error("resource busy")]
    ResourceBusy,

    /// The source is exhausted; no more data will ever be produced.
    #[error("no more data")]
    NoMoreData,

    /// The caller invoked an operation invalid for the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An error from a device or file implementation that doesn't fit the
    /// other variants.
    #[error("unknown device error: {0}")]
    Unknown(String),
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Error returned by [`crate::MediaDevice::push`]. A superset of
/// [`MediaError`] with a `ResourceBusy` fast path that callers are expected
/// to retry on rather than treat as fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PushError {
    /// The device's input queue is full; retry after the next `pull`.
    #[error("resource busy")]
    ResourceBusy,
    /// A fatal device error; the track should be torn down.
    #[error(transparent)]
    Fatal(#[from] MediaError),
}
