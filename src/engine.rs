//! The `Gaudio` service object.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::backend::{
    Backend, BackendId, BackendProvider, CpalProvider, DeviceDescriptor, DeviceId, DeviceKind,
};
use crate::codec::{self, AudioDecoder, AudioEncoder, FileInfo, WriteSpec};
use crate::config::{DeviceConfig, EngineConfig, WavOptions};
use crate::device::{Configured, ConfiguredDevice, DeviceSession, Pacing};
use crate::file::{BasicInfo, FileSession};
use crate::format::{PcmBuffer, SampleFormat, SampleSlice};
use crate::handle::{Handle, HandleTable, ResourceKind};
use crate::pipeline::{DeviceState, StreamStats};
use crate::GaudioError;

/// Most devices listed per kind.
pub const MAX_LISTED_DEVICES: usize = 32;

/// Owner of every file session, configured device and the shared backend
/// context.
///
/// All operations take `&self`; share a `Gaudio` between threads with an
/// `Arc`. Dropping it clears every device and the backend context.
///
/// # Example
///
/// ```no_run
/// use gaudio::{DeviceConfig, DeviceKind, Gaudio, SampleFormat, SampleSlice};
///
/// # fn main() -> Result<(), gaudio::GaudioError> {
/// let audio = Gaudio::new();
/// let device = audio.configure_device(DeviceConfig::new(DeviceKind::Playback))?;
///
/// let tone: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.05).sin() * 0.2).collect();
/// audio.playback(device.handle, SampleSlice::F32(&tone), 1)?;
/// audio.wait_playback(device.handle)?;
/// audio.clear_device(device.handle)?;
/// # Ok(())
/// # }
/// ```
pub struct Gaudio {
    config: EngineConfig,
    provider: Box<dyn BackendProvider>,
    context: Mutex<Option<Arc<dyn Backend>>>,
    files: HandleTable<FileSession>,
    devices: HandleTable<DeviceSession>,
}

impl Gaudio {
    /// Creates a service backed by the system audio hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_provider(EngineConfig::default(), CpalProvider::new())
    }

    /// Creates a service backed by `provider`.
    pub fn with_provider(config: EngineConfig, provider: impl BackendProvider + 'static) -> Self {
        Self {
            files: HandleTable::with_limit(ResourceKind::File, config.handle_limit),
            devices: HandleTable::with_limit(ResourceKind::Device, config.handle_limit),
            config,
            provider: Box::new(provider),
            context: Mutex::new(None),
        }
    }

    /// The configuration this service was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- files ----

    /// Opens `path` for reading, picking the codec from its first bytes.
    ///
    /// # Errors
    ///
    /// `UnsupportedCodec` for an unknown signature, `FileError` if the file
    /// cannot be read, `DecoderError` if the codec rejects it and
    /// `RefnumExhausted` if no handle is free. No handle is allocated on error.
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<Handle, GaudioError> {
        let path = path.as_ref();
        let decoder = codec::open_decoder(path)?;
        let handle = self.files.allocate(FileSession::reader(decoder, Some(path)))?;
        tracing::info!(handle = %handle, path = %path.display(), "opened file for reading");
        Ok(handle)
    }

    /// Creates `path` for writing.
    ///
    /// # Errors
    ///
    /// `UnsupportedCodec` for a codec that cannot be written, `InvalidArgument`
    /// for a format the codec cannot store and `FileError` if the file cannot
    /// be created.
    pub fn open_file_write(
        &self,
        path: impl AsRef<Path>,
        spec: WriteSpec,
        options: Option<WavOptions>,
    ) -> Result<Handle, GaudioError> {
        let path = path.as_ref();
        let encoder = codec::open_encoder(path, spec, options)?;
        let handle = self.files.allocate(FileSession::writer(encoder, Some(path)))?;
        tracing::info!(handle = %handle, path = %path.display(), "opened file for writing");
        Ok(handle)
    }

    /// Registers a caller-supplied decoder as a read session.
    ///
    /// # Errors
    ///
    /// `RefnumExhausted` if no handle is free.
    pub fn attach_decoder(&self, decoder: Box<dyn AudioDecoder>) -> Result<Handle, GaudioError> {
        let handle = self.files.allocate(FileSession::reader(decoder, None))?;
        tracing::info!(handle = %handle, "attached decoder");
        Ok(handle)
    }

    /// Registers a caller-supplied encoder as a write session.
    ///
    /// # Errors
    ///
    /// `RefnumExhausted` if no handle is free.
    pub fn attach_encoder(&self, encoder: Box<dyn AudioEncoder>) -> Result<Handle, GaudioError> {
        let handle = self.files.allocate(FileSession::writer(encoder, None))?;
        tracing::info!(handle = %handle, "attached encoder");
        Ok(handle)
    }

    /// Reads up to `frames` frames as `format`. Fewer frames come back only at
    /// the end of the stream.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `WrongMode` on a write session, or a codec error.
    pub fn read(&self, handle: Handle, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        self.files.get(handle)?.read(frames, format)
    }

    /// Appends interleaved samples, returning the frames written.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `WrongMode` on a read session, or a codec error.
    pub fn write(&self, handle: Handle, samples: SampleSlice<'_>) -> Result<usize, GaudioError> {
        self.files.get(handle)?.write(samples)
    }

    /// Moves the read position, returning the new frame offset.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `WrongMode` on a write session, or `DecoderError`.
    pub fn seek(&self, handle: Handle, frame: u64) -> Result<u64, GaudioError> {
        self.files.get(handle)?.seek(frame)
    }

    /// Layout and read position of a read session.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or `WrongMode` on a write session.
    pub fn file_basic_info(&self, handle: Handle) -> Result<BasicInfo, GaudioError> {
        self.files.get(handle)?.basic_info()
    }

    /// Retires `handle` and closes its codec, finishing any file being
    /// written.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the handle is not live; otherwise any error from
    /// finishing the file. The handle is retired either way.
    pub fn close(&self, handle: Handle) -> Result<(), GaudioError> {
        let session = self.files.take(handle)?;
        let result = session.close();
        tracing::info!(
            handle = %handle,
            mode = ?session.mode(),
            codec = ?session.codec(),
            path = ?session.path(),
            "closed file"
        );
        result
    }

    /// Stream properties of `path` without opening a session.
    ///
    /// # Errors
    ///
    /// Same as [`open_file`](Self::open_file), minus handle exhaustion.
    pub fn file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo, GaudioError> {
        codec::file_info(path.as_ref())
    }

    /// Decodes all of `path` into one interleaved buffer.
    ///
    /// # Errors
    ///
    /// Same as [`file_info`](Self::file_info), plus decode failures.
    pub fn load_file(
        &self,
        path: impl AsRef<Path>,
        format: SampleFormat,
    ) -> Result<(FileInfo, PcmBuffer), GaudioError> {
        codec::load_file(path.as_ref(), format)
    }

    // ---- backends ----

    /// Backends usable on this system, default first.
    pub fn backends(&self) -> Vec<BackendId> {
        self.provider.available()
    }

    /// Lists up to [`MAX_LISTED_DEVICES`] devices of `kind` on `backend`.
    ///
    /// # Errors
    ///
    /// `UnsupportedDevice` for duplex, or a backend error.
    pub fn devices(
        &self,
        backend: Option<&BackendId>,
        kind: DeviceKind,
    ) -> Result<Vec<DeviceDescriptor>, GaudioError> {
        if kind == DeviceKind::Duplex {
            return Err(GaudioError::UnsupportedDevice);
        }
        let mut devices = self.with_backend(backend, |b| b.devices(kind))?;
        devices.truncate(MAX_LISTED_DEVICES);
        Ok(devices)
    }

    /// Human-readable name of one device.
    ///
    /// # Errors
    ///
    /// `UnsupportedDevice` for duplex, or a backend error if the device is
    /// unknown.
    pub fn device_name(
        &self,
        backend: Option<&BackendId>,
        kind: DeviceKind,
        id: &DeviceId,
    ) -> Result<String, GaudioError> {
        if kind == DeviceKind::Duplex {
            return Err(GaudioError::UnsupportedDevice);
        }
        self.with_backend(backend, |b| b.device_name(kind, id))
    }

    /// Runs `f` on the live context if it matches `backend`, otherwise on a
    /// temporary one.
    fn with_backend<R>(
        &self,
        backend: Option<&BackendId>,
        f: impl FnOnce(&dyn Backend) -> Result<R, crate::BackendError>,
    ) -> Result<R, GaudioError> {
        let active = self.context.lock().clone();
        if let Some(active) = active.filter(|a| backend.map_or(true, |id| id == a.id())) {
            return Ok(f(active.as_ref())?);
        }
        let temporary = self.provider.init(backend)?;
        Ok(f(temporary.as_ref())?)
    }

    /// Returns the live context, creating it on first use.
    fn context_for(
        &self,
        context: &mut MutexGuard<'_, Option<Arc<dyn Backend>>>,
        backend: Option<&BackendId>,
    ) -> Result<Arc<dyn Backend>, GaudioError> {
        if let Some(active) = context.as_ref() {
            if let Some(requested) = backend.filter(|id| *id != active.id()) {
                return Err(GaudioError::ContextBackendMismatch {
                    active: active.id().to_string(),
                    requested: requested.to_string(),
                });
            }
            return Ok(Arc::clone(active));
        }

        let created: Arc<dyn Backend> = Arc::from(self.provider.init(backend)?);
        tracing::info!(backend = %created.id(), "backend context created");
        **context = Some(Arc::clone(&created));
        Ok(created)
    }

    /// Clears every device, then releases the backend context.
    ///
    /// # Errors
    ///
    /// Currently infallible; teardown failures are logged.
    pub fn clear_backend(&self) -> Result<(), GaudioError> {
        let mut context = self.context.lock();
        for handle in self.devices.handles() {
            if let Some(session) = self.devices.remove(handle) {
                session.teardown();
                tracing::info!(handle = %handle, "device cleared");
            }
        }
        if let Some(backend) = context.take() {
            tracing::info!(backend = %backend.id(), "backend context released");
        }
        Ok(())
    }

    // ---- devices ----

    /// Opens a device and its ring. The device starts on the first transfer.
    ///
    /// # Errors
    ///
    /// `UnsupportedDevice` for duplex, `ContextBackendMismatch` if the live
    /// context belongs to another backend, `InvalidArgument` for an empty
    /// buffer, or a backend error. Nothing stays open on error.
    pub fn configure_device(&self, config: DeviceConfig) -> Result<Configured, GaudioError> {
        if config.kind == DeviceKind::Duplex {
            return Err(GaudioError::UnsupportedDevice);
        }

        let mut context = self.context.lock();
        let backend = self.context_for(&mut context, config.backend.as_ref())?;
        let pacing = Pacing {
            poll_interval: self.config.poll_interval,
            io_timeout: self.config.io_timeout,
        };
        let (session, warning) = DeviceSession::open(backend.as_ref(), &config, pacing)?;
        let info = session.info();
        let handle = self.devices.allocate(session)?;
        drop(context);

        tracing::info!(
            handle = %handle,
            backend = %backend.id(),
            kind = %info.kind,
            format = ?info.format,
            channels = info.channels,
            sample_rate = info.sample_rate,
            buffer_frames = info.buffer_frames,
            "device configured"
        );
        Ok(Configured { handle, warning })
    }

    /// Starts the device; a no-op if it is running.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or a backend error.
    pub fn start_device(&self, handle: Handle) -> Result<(), GaudioError> {
        self.devices.get(handle)?.start()
    }

    /// Stops the device; a no-op if it is stopped. Queued frames stay queued.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or a backend error.
    pub fn stop_device(&self, handle: Handle) -> Result<(), GaudioError> {
        self.devices.get(handle)?.stop()
    }

    /// Retires `handle`, stops the device and releases it.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the handle is not live.
    pub fn clear_device(&self, handle: Handle) -> Result<(), GaudioError> {
        let session = self.devices.take(handle)?;
        session.teardown();
        tracing::info!(handle = %handle, "device cleared");
        Ok(())
    }

    /// Queues interleaved `samples` with `channels` channels for playback,
    /// blocking until all of them are in the ring. Starts the device if
    /// needed.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `WrongMode` on a capture device, `BufferSizeExceeded`
    /// if the request is larger than the ring, `DeviceStopped` if the device
    /// stops first, or `Timeout` when an I/O timeout is configured.
    pub fn playback(&self, handle: Handle, samples: SampleSlice<'_>, channels: u16) -> Result<(), GaudioError> {
        self.devices.get(handle)?.playback(samples, channels)
    }

    /// Captures `frames` frames (a full ring if 0) converted to `format`,
    /// blocking until they arrive. The result has the device's channel count.
    ///
    /// # Errors
    ///
    /// As for [`playback`](Self::playback), with `WrongMode` on a playback
    /// device.
    pub fn capture(&self, handle: Handle, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        self.devices.get(handle)?.capture(frames, format)
    }

    /// Blocks until every queued playback frame has been handed to the device,
    /// or the device stops.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `WrongMode` on a capture device, or `Timeout`.
    pub fn wait_playback(&self, handle: Handle) -> Result<(), GaudioError> {
        self.devices.get(handle)?.wait_playback()
    }

    /// Parameters the device runs with.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`.
    pub fn device_info(&self, handle: Handle) -> Result<ConfiguredDevice, GaudioError> {
        Ok(self.devices.get(handle)?.info())
    }

    /// Current run state.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`.
    pub fn device_state(&self, handle: Handle) -> Result<DeviceState, GaudioError> {
        Ok(self.devices.get(handle)?.state())
    }

    /// Underrun and overflow counters.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`.
    pub fn device_stats(&self, handle: Handle) -> Result<StreamStats, GaudioError> {
        Ok(self.devices.get(handle)?.stats())
    }

    /// Master volume in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or a backend error.
    pub fn device_volume(&self, handle: Handle) -> Result<f32, GaudioError> {
        self.devices.get(handle)?.volume()
    }

    /// Sets the master volume, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle`, `InvalidArgument` for NaN, or a backend error.
    pub fn set_device_volume(&self, handle: Handle, volume: f32) -> Result<(), GaudioError> {
        self.devices.get(handle)?.set_volume(volume)
    }
}

impl Default for Gaudio {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Gaudio {
    fn drop(&mut self) {
        if let Err(e) = self.clear_backend() {
            tracing::warn!("failed to clear backend on drop: {e}");
        }
    }
}

impl std::fmt::Debug for Gaudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gaudio")
            .field("config", &self.config)
            .field("files", &self.files)
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}
