//! Audio transport abstraction.
//!
//! A [`BackendProvider`] lists the transports available on this system and
//! creates a shared [`Backend`] context for one of them. The context enumerates
//! devices and opens [`BackendDevice`]s, which run a real-time callback wired to
//! a [`DeviceIo`](crate::pipeline::DeviceIo) ring end.
//!
//! Two implementations ship with the crate:
//! - [`CpalProvider`]: the platform audio hosts exposed by cpal
//! - [`MockProvider`]: a software device driven by a clock thread

mod cpal_host;
mod mock;

pub use cpal_host::{CpalBackend, CpalProvider};
pub use mock::{MockBackend, MockLog, MockProvider};

use std::fmt;
use std::sync::Arc;

use crate::format::SampleFormat;
use crate::pipeline::{DeviceIo, DeviceStatus};
use crate::{BackendError, GaudioError};

/// Name of an audio transport, such as `"ALSA"` or `"WASAPI"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(String);

impl BackendId {
    /// Creates a backend id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The backend name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Backend-specific identity of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Direction of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Output to speakers.
    Playback,
    /// Input from a microphone or line in.
    Capture,
    /// Simultaneous input and output. Not supported.
    Duplex,
    /// Capture of what an output device is playing.
    Loopback,
}

impl DeviceKind {
    /// Maps a host type code (1 playback, 2 capture, 3 duplex, 4 loopback).
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedDevice` for any other code.
    pub fn from_code(code: u16) -> Result<Self, GaudioError> {
        match code {
            1 => Ok(Self::Playback),
            2 => Ok(Self::Capture),
            3 => Ok(Self::Duplex),
            4 => Ok(Self::Loopback),
            _ => Err(GaudioError::UnsupportedDevice),
        }
    }

    /// The host type code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Playback => 1,
            Self::Capture => 2,
            Self::Duplex => 3,
            Self::Loopback => 4,
        }
    }

    /// Returns `true` if the application writes frames to this device.
    #[must_use]
    pub fn is_playback(self) -> bool {
        self == Self::Playback
    }

    /// Returns `true` if the application reads frames from this device.
    #[must_use]
    pub fn is_capture(self) -> bool {
        matches!(self, Self::Capture | Self::Loopback)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Playback => "playback",
            Self::Capture => "capture",
            Self::Duplex => "duplex",
            Self::Loopback => "loopback",
        })
    }
}

/// Whether other applications may use the device at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareMode {
    /// Mixed with other applications by the system.
    #[default]
    Shared,
    /// Exclusive access with the device's own format.
    Exclusive,
}

/// One entry of a device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Identity to pass back when configuring.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Whether this is the system default for its kind.
    pub is_default: bool,
}

/// Stream parameters a device actually runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSpec {
    /// Sample format of the callback buffers.
    pub format: SampleFormat,
    /// Channel count of the callback buffers.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per callback.
    pub period_frames: u32,
    /// Share mode granted by the backend.
    pub share_mode: ShareMode,
}

/// What to open. `None` fields take the device default.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    /// Device to open; `None` is the system default.
    pub device: Option<DeviceId>,
    /// Direction.
    pub kind: DeviceKind,
    /// Sample format.
    pub format: Option<SampleFormat>,
    /// Channel count.
    pub channels: Option<u16>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Frames per callback.
    pub period_frames: Option<u32>,
    /// Share mode.
    pub share_mode: ShareMode,
}

/// Creates backend contexts.
pub trait BackendProvider: Send + Sync {
    /// Backends usable on this system, default first.
    fn available(&self) -> Vec<BackendId>;

    /// Creates a context for `backend`, or for the default backend if `None`.
    ///
    /// Dropping the returned context releases it.
    fn init(&self, backend: Option<&BackendId>) -> Result<Box<dyn Backend>, BackendError>;
}

/// A live backend context shared by every configured device.
pub trait Backend: Send + Sync {
    /// Which backend this context belongs to.
    fn id(&self) -> &BackendId;

    /// Devices of `kind`; loopback lists playback devices.
    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, BackendError>;

    /// Name of one device.
    fn device_name(&self, kind: DeviceKind, id: &DeviceId) -> Result<String, BackendError> {
        self.devices(kind)?
            .into_iter()
            .find(|d| &d.id == id)
            .map(|d| d.name)
            .ok_or_else(|| BackendError::new(BackendError::NO_DEVICE, format!("no device {id}")))
    }

    /// Opens a device without starting it.
    ///
    /// The backend may set `status` to [`DeviceState::Stopped`] from its own
    /// threads when the device is lost.
    ///
    /// [`DeviceState::Stopped`]: crate::pipeline::DeviceState::Stopped
    fn open(
        &self,
        request: &DeviceRequest,
        status: Arc<DeviceStatus>,
    ) -> Result<Box<dyn BackendDevice>, BackendError>;
}

/// An opened device. Dropping it releases the device.
pub trait BackendDevice: Send {
    /// Parameters the device runs with.
    fn native(&self) -> NativeSpec;

    /// Connects the real-time callback to a ring end laid out as [`native`].
    ///
    /// Called once, before the first start.
    ///
    /// [`native`]: BackendDevice::native
    fn attach(&mut self, io: DeviceIo) -> Result<(), BackendError>;

    /// Starts the callback.
    fn start(&mut self) -> Result<(), BackendError>;

    /// Stops the callback; buffered frames stay in the ring.
    fn stop(&mut self) -> Result<(), BackendError>;

    /// Master volume in `[0, 1]`.
    fn volume(&self) -> Result<f32, BackendError>;

    /// Sets the master volume; `volume` is already within `[0, 1]`.
    fn set_volume(&mut self, volume: f32) -> Result<(), BackendError>;
}
