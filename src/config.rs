//! Configuration types for the engine, devices and file writers.

use std::time::Duration;

use crate::backend::{BackendId, DeviceId, DeviceKind, ShareMode};
use crate::format::SampleFormat;

/// Engine-wide behavior.
///
/// Use [`EngineConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use gaudio::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig {
///     io_timeout: Some(Duration::from_secs(5)),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound between device-state checks while a call is blocked.
    ///
    /// Blocked calls also wake as soon as the real-time callback moves data.
    /// Default: 1ms
    pub poll_interval: Duration,

    /// Maximum time a blocked playback, capture or wait call makes no progress
    /// before returning [`GaudioError::Timeout`].
    ///
    /// `None` blocks until data or space is available or the device stops.
    /// Default: `None`
    ///
    /// [`GaudioError::Timeout`]: crate::GaudioError::Timeout
    pub io_timeout: Option<Duration>,

    /// Maximum number of live handles per resource kind.
    ///
    /// Default: `i32::MAX`
    pub handle_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            io_timeout: None,
            handle_limit: i32::MAX as usize,
        }
    }
}

/// Requested device configuration.
///
/// Fields left as `None` take the device's native value.
///
/// # Example
///
/// ```
/// use gaudio::{DeviceConfig, DeviceKind, SampleFormat};
///
/// let config = DeviceConfig::new(DeviceKind::Playback)
///     .with_channels(2)
///     .with_sample_rate(48000)
///     .with_format(SampleFormat::I16)
///     .with_buffer_frames(4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Backend to open the device on; `None` selects the default backend.
    pub backend: Option<BackendId>,
    /// Device to open; `None` selects the system default.
    pub device: Option<DeviceId>,
    /// Direction of the device.
    pub kind: DeviceKind,
    /// Channel count.
    pub channels: Option<u16>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Sample format of the device stream.
    pub format: Option<SampleFormat>,
    /// Shared or exclusive access.
    pub share_mode: ShareMode,
    /// Requested period size in frames; `None` lets the backend decide.
    pub period_frames: Option<u32>,
    /// Ring buffer capacity in frames.
    ///
    /// This is also the largest single playback or capture request.
    /// Default: 4096
    pub buffer_frames: usize,
}

impl DeviceConfig {
    /// Creates a configuration for the default device of `kind`.
    #[must_use]
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Selects a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendId) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Selects a device.
    #[must_use]
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the channel count.
    #[must_use]
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Sets the device sample format.
    #[must_use]
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Requests exclusive or shared mode.
    #[must_use]
    pub fn with_share_mode(mut self, share_mode: ShareMode) -> Self {
        self.share_mode = share_mode;
        self
    }

    /// Requests a period size.
    #[must_use]
    pub fn with_period_frames(mut self, period_frames: u32) -> Self {
        self.period_frames = Some(period_frames);
        self
    }

    /// Sets the ring buffer capacity.
    #[must_use]
    pub fn with_buffer_frames(mut self, buffer_frames: usize) -> Self {
        self.buffer_frames = buffer_frames;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: None,
            device: None,
            kind: DeviceKind::Playback,
            channels: None,
            sample_rate: None,
            format: None,
            share_mode: ShareMode::Shared,
            period_frames: None,
            buffer_frames: 4096,
        }
    }
}

/// Sample encoding used in a WAV data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    /// Integer PCM (format tag 1).
    #[default]
    Pcm,
    /// IEEE float (format tag 3).
    Float,
}

/// Container layout of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavContainer {
    /// Classic RIFF/WAVE with 32-bit chunk sizes.
    #[default]
    Riff,
    /// Sony Wave64: GUID chunk ids and 64-bit sizes.
    W64,
    /// EBU RF64: RIFF layout with a `ds64` chunk carrying 64-bit sizes.
    Rf64,
}

impl WavContainer {
    /// Matches the first four bytes of a file.
    #[must_use]
    pub fn from_signature(signature: &[u8]) -> Option<Self> {
        match signature {
            [b'R', b'I', b'F', b'F', ..] => Some(Self::Riff),
            [b'r', b'i', b'f', b'f', ..] => Some(Self::W64),
            [b'R', b'F', b'6', b'4', ..] => Some(Self::Rf64),
            _ => None,
        }
    }
}

/// Options for writing WAV files.
///
/// # Example
///
/// ```
/// use gaudio::{WavContainer, WavEncoding, WavOptions};
///
/// let options = WavOptions {
///     container: WavContainer::Rf64,
///     encoding: WavEncoding::Float,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavOptions {
    /// File layout.
    pub container: WavContainer,
    /// Sample encoding of the data chunk.
    pub encoding: WavEncoding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.io_timeout, None);
        assert_eq!(config.handle_limit, i32::MAX as usize);
    }

    #[test]
    fn test_device_config_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.kind, DeviceKind::Playback);
        assert_eq!(config.share_mode, ShareMode::Shared);
        assert_eq!(config.buffer_frames, 4096);
        assert!(config.channels.is_none());
        assert!(config.format.is_none());
    }

    #[test]
    fn test_device_config_builder() {
        let config = DeviceConfig::new(DeviceKind::Capture)
            .with_channels(1)
            .with_sample_rate(16000)
            .with_format(SampleFormat::F32)
            .with_share_mode(ShareMode::Exclusive)
            .with_buffer_frames(1024);

        assert_eq!(config.kind, DeviceKind::Capture);
        assert_eq!(config.channels, Some(1));
        assert_eq!(config.sample_rate, Some(16000));
        assert_eq!(config.format, Some(SampleFormat::F32));
        assert_eq!(config.share_mode, ShareMode::Exclusive);
        assert_eq!(config.buffer_frames, 1024);
    }

    #[test]
    fn test_wav_options_default_to_riff_pcm() {
        let options = WavOptions::default();
        assert_eq!(options.encoding, WavEncoding::Pcm);
        assert_eq!(options.container, WavContainer::Riff);
    }

    #[test]
    fn test_wav_container_signatures() {
        assert_eq!(WavContainer::from_signature(b"RIFF"), Some(WavContainer::Riff));
        assert_eq!(WavContainer::from_signature(b"riff"), Some(WavContainer::W64));
        assert_eq!(WavContainer::from_signature(b"RF64"), Some(WavContainer::Rf64));
        assert_eq!(WavContainer::from_signature(b"RIF"), None);
    }
}
