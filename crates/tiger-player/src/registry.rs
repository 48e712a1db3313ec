//! Factory registry the player consults to open files and construct
//! decoder/sink devices. Populated once at startup and read-only thereafter
//! — the only global-ish state this engine has (spec: "no global state
//! beyond device factory registries").
//!
//! Container parsing and codec/sink implementations are deliberately out of
//! scope for this crate; `Registry` is the seam where an embedder plugs
//! those collaborators in.

use std::sync::{Arc, OnceLock};

use tiger_types::{DeviceConfig, MediaDevice, MediaError, MediaFile};

/// Opens a [`MediaFile`] for a URL this factory recognizes.
pub trait MediaFileFactory: Send + Sync {
    /// Whether this factory can open `url` (e.g. by scheme or extension).
    fn can_open(&self, url: &str) -> bool;

    /// Opens `url`, returning a ready-to-use demuxer.
    fn open(&self, url: &str) -> Result<Box<dyn MediaFile>, MediaError>;
}

/// Constructs decoder and sink devices for negotiated formats.
pub trait DeviceFactory: Send + Sync {
    /// Builds a decoder for `config` (codec + expected input format).
    fn create_decoder(&self, config: DeviceConfig) -> Result<Box<dyn MediaDevice>, MediaError>;

    /// Builds a sink for `config` (negotiated output format from a codec).
    fn create_sink(&self, config: DeviceConfig) -> Result<Box<dyn MediaDevice>, MediaError>;
}

/// Read-only set of collaborators the player draws on to turn a URL into a
/// running session graph. Cloning shares the same factories.
#[derive(Clone)]
pub struct Registry {
    files: Vec<Arc<dyn MediaFileFactory>>,
    devices: Arc<dyn DeviceFactory>,
}

impl Registry {
    /// Builds a registry with no file factories registered yet and `devices`
    /// as the sole device factory.
    pub fn new(devices: Arc<dyn DeviceFactory>) -> Self {
        Self {
            files: Vec::new(),
            devices,
        }
    }

    /// Registers a file factory, tried in registration order by
    /// [`Registry::open`].
    pub fn register_file_factory(&mut self, factory: Arc<dyn MediaFileFactory>) {
        self.files.push(factory);
    }

    /// Opens `url` with the first registered factory that claims it.
    pub fn open(&self, url: &str) -> Result<Box<dyn MediaFile>, MediaError> {
        for factory in &self.files {
            if factory.can_open(url) {
                return factory.open(url);
            }
        }
        Err(MediaError::NotSupported(format!("no file factory for {url}")))
    }

    /// The device factory used for both decoders and sinks.
    pub fn devices(&self) -> &Arc<dyn DeviceFactory> {
        &self.devices
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Installs the process-wide registry `Player::new` draws on. Call once at
/// startup, before constructing any `Player`; later calls are ignored.
pub fn install(registry: Registry) {
    let _ = GLOBAL.set(registry);
}

/// The installed registry.
///
/// # Panics
/// If [`install`] has not been called yet.
pub(crate) fn global() -> &'static Registry {
    GLOBAL
        .get()
        .expect("tiger_player::registry::install must run before constructing a Player")
}
