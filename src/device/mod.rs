//! Device sessions.
//!
//! A [`DeviceSession`] owns one opened backend device and the application end
//! of its PCM ring. The backend's real-time callback owns the other end.
//!
//! Two locks guard a session. The device lock serializes backend calls
//! (start, stop, volume, teardown). The ring lock serializes blocking
//! transfers. Because a blocked `playback` holds only the ring lock, `stop` or
//! `clear` from another thread can still reach the backend and wake it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{
    Backend, BackendDevice, DeviceId, DeviceKind, DeviceRequest, NativeSpec, ShareMode,
};
use crate::config::DeviceConfig;
use crate::error::{BackendError, ModeMismatch, Warning};
use crate::format::{convert, remix, PcmBuffer, SampleFormat, SampleSlice};
use crate::handle::Handle;
use crate::pipeline::{
    pcm_ring, CaptureSink, DeviceIo, DeviceState, DeviceStatus, PcmConsumer, PcmProducer,
    PlaybackFeed, StreamStats,
};
use crate::GaudioError;

/// Result of configuring a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configured {
    /// Handle of the new device.
    pub handle: Handle,
    /// Set when the configuration works but is likely to glitch.
    pub warning: Option<Warning>,
}

/// Parameters a configured device runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredDevice {
    /// Direction.
    pub kind: DeviceKind,
    /// Device identity requested at configuration; `None` is the default.
    pub device: Option<DeviceId>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count on the device side.
    pub channels: u16,
    /// Sample format on the device side.
    pub format: SampleFormat,
    /// Share mode granted by the backend.
    pub share_mode: ShareMode,
    /// Ring capacity in frames.
    pub buffer_frames: usize,
    /// Frames per backend callback.
    pub period_frames: u32,
}

/// How blocked transfers wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pacing {
    pub poll_interval: Duration,
    pub io_timeout: Option<Duration>,
}

enum AppEnd {
    Playback(PcmProducer),
    Capture(PcmConsumer),
}

pub(crate) struct DeviceSession {
    kind: DeviceKind,
    identity: Option<DeviceId>,
    native: NativeSpec,
    capacity_frames: usize,
    pacing: Pacing,
    status: Arc<DeviceStatus>,
    device: Mutex<Option<Box<dyn BackendDevice>>>,
    app: Mutex<AppEnd>,
}

impl DeviceSession {
    /// Opens a device on `backend` and wires its ring.
    ///
    /// On failure everything opened so far is released before returning.
    pub(crate) fn open(
        backend: &dyn Backend,
        config: &DeviceConfig,
        pacing: Pacing,
    ) -> Result<(Self, Option<Warning>), GaudioError> {
        if config.kind == DeviceKind::Duplex {
            return Err(GaudioError::UnsupportedDevice);
        }
        if config.buffer_frames == 0 {
            return Err(GaudioError::invalid_argument("buffer_frames must be positive"));
        }

        let request = DeviceRequest {
            device: config.device.clone(),
            kind: config.kind,
            format: config.format,
            channels: config.channels,
            sample_rate: config.sample_rate,
            period_frames: config.period_frames,
            share_mode: config.share_mode,
        };
        let status = Arc::new(DeviceStatus::new());
        let mut device = backend.open(&request, Arc::clone(&status))?;
        let native = device.native();

        let (producer, consumer) = pcm_ring(native.format, native.channels, config.buffer_frames)?;
        let (io, app) = if config.kind.is_playback() {
            (
                DeviceIo::Playback(PlaybackFeed::new(consumer, Arc::clone(&status))),
                AppEnd::Playback(producer),
            )
        } else {
            (
                DeviceIo::Capture(CaptureSink::new(producer, Arc::clone(&status))),
                AppEnd::Capture(consumer),
            )
        };
        device.attach(io)?;

        let period_frames = native.period_frames as usize;
        let warning = (config.buffer_frames < period_frames).then(|| {
            tracing::warn!(
                buffer_frames = config.buffer_frames,
                period_frames,
                "device buffer is smaller than its period"
            );
            Warning::BufferSmallerThanPeriod {
                buffer_frames: config.buffer_frames,
                period_frames,
            }
        });

        let session = Self {
            kind: config.kind,
            identity: config.device.clone(),
            native,
            capacity_frames: config.buffer_frames,
            pacing,
            status,
            device: Mutex::new(Some(device)),
            app: Mutex::new(app),
        };
        Ok((session, warning))
    }

    pub(crate) fn info(&self) -> ConfiguredDevice {
        ConfiguredDevice {
            kind: self.kind,
            device: self.identity.clone(),
            sample_rate: self.native.sample_rate,
            channels: self.native.channels,
            format: self.native.format,
            share_mode: self.native.share_mode,
            buffer_frames: self.capacity_frames,
            period_frames: self.native.period_frames,
        }
    }

    pub(crate) fn state(&self) -> DeviceState {
        self.status.state()
    }

    pub(crate) fn stats(&self) -> StreamStats {
        self.status.stats()
    }

    /// Starts the device unless it is already running.
    pub(crate) fn start(&self) -> Result<(), GaudioError> {
        let mut guard = self.device.lock();
        let device = guard.as_mut().ok_or_else(released)?;

        if !self.status.transition(DeviceState::Stopped, DeviceState::Starting) {
            return Ok(());
        }
        if let Err(err) = device.start() {
            self.status.set_state(DeviceState::Stopped);
            return Err(err.into());
        }
        // The backend may already have reported the device lost
        self.status
            .transition(DeviceState::Starting, DeviceState::Started);
        tracing::debug!(kind = %self.kind, "device started");
        Ok(())
    }

    /// Stops the device. Frames left in the ring stay there.
    pub(crate) fn stop(&self) -> Result<(), GaudioError> {
        let mut guard = self.device.lock();
        let Some(device) = guard.as_mut() else {
            return Ok(());
        };

        if !self.status.transition(DeviceState::Started, DeviceState::Stopping) {
            return Ok(());
        }
        if let Err(err) = device.stop() {
            self.status.set_state(DeviceState::Started);
            return Err(err.into());
        }
        self.status.set_state(DeviceState::Stopped);
        tracing::debug!(kind = %self.kind, "device stopped");
        Ok(())
    }

    /// Stops the device if running and releases it.
    ///
    /// Blocked transfers wake up and report the device stopped.
    pub(crate) fn teardown(&self) {
        let mut guard = self.device.lock();
        if let Some(mut device) = guard.take() {
            if self.status.transition(DeviceState::Started, DeviceState::Stopping) {
                if let Err(err) = device.stop() {
                    tracing::warn!(error = %err, "failed to stop device during teardown");
                }
            }
            drop(device);
        }
        self.status.set_state(DeviceState::Uninitialized);
    }

    pub(crate) fn volume(&self) -> Result<f32, GaudioError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or_else(released)?;
        Ok(device.volume()?)
    }

    pub(crate) fn set_volume(&self, volume: f32) -> Result<(), GaudioError> {
        if volume.is_nan() {
            return Err(GaudioError::invalid_argument("volume is not a number"));
        }
        let mut guard = self.device.lock();
        let device = guard.as_mut().ok_or_else(released)?;
        Ok(device.set_volume(volume.clamp(0.0, 1.0))?)
    }

    /// Queues `samples` for playback, blocking until all of it is in the ring.
    ///
    /// `samples` is interleaved with `channels` channels in any sample format;
    /// it is converted to the device layout first.
    pub(crate) fn playback(&self, samples: SampleSlice<'_>, channels: u16) -> Result<(), GaudioError> {
        if !self.kind.is_playback() {
            return Err(GaudioError::WrongMode(ModeMismatch::PlaybackOnCaptureDevice));
        }
        let frames = frame_count(samples.len(), channels)?;
        if frames > self.capacity_frames {
            return Err(GaudioError::BufferSizeExceeded {
                requested: frames,
                capacity: self.capacity_frames,
            });
        }

        let converted;
        let mut device_samples = samples;
        if samples.format() != self.native.format {
            converted = convert(samples, self.native.format);
            device_samples = converted.as_slice();
        }
        let remixed;
        if channels != self.native.channels {
            remixed = remix(device_samples, channels, self.native.channels)?;
            device_samples = remixed.as_slice();
        }
        let bytes = device_samples.as_bytes();

        self.start()?;

        let mut app = self.app.lock();
        let AppEnd::Playback(producer) = &mut *app else {
            return Err(GaudioError::WrongMode(ModeMismatch::PlaybackOnCaptureDevice));
        };
        let stride = producer.stride();
        let since = Instant::now();
        let mut written = 0;

        while written < frames {
            if !self.status.is_running() {
                return Err(GaudioError::DeviceStopped { transferred: written });
            }
            let mut grant = producer.acquire_write(frames - written);
            if grant.frames() == 0 {
                drop(grant);
                self.block(written, since)?;
                continue;
            }
            let copied = grant.write(&bytes[written * stride..]);
            grant.commit(copied)?;
            written += copied;
        }

        tracing::trace!(frames, "playback queued");
        Ok(())
    }

    /// Captures `frames` frames (the whole ring if 0) converted to `format`.
    ///
    /// The result keeps the device channel count.
    pub(crate) fn capture(&self, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        if !self.kind.is_capture() {
            return Err(GaudioError::WrongMode(ModeMismatch::CaptureOnPlaybackDevice));
        }
        let frames = if frames == 0 { self.capacity_frames } else { frames };
        if frames > self.capacity_frames {
            return Err(GaudioError::BufferSizeExceeded {
                requested: frames,
                capacity: self.capacity_frames,
            });
        }

        self.start()?;

        let mut app = self.app.lock();
        let AppEnd::Capture(consumer) = &mut *app else {
            return Err(GaudioError::WrongMode(ModeMismatch::CaptureOnPlaybackDevice));
        };
        let stride = consumer.stride();
        let mut captured =
            PcmBuffer::silence(self.native.format, frames * usize::from(self.native.channels));
        let out = captured.as_bytes_mut();
        let since = Instant::now();
        let mut read = 0;

        while read < frames {
            if !self.status.is_running() {
                return Err(GaudioError::DeviceStopped { transferred: read });
            }
            let popped = consumer.pop_frames(&mut out[read * stride..frames * stride]);
            if popped == 0 {
                self.block(read, since)?;
                continue;
            }
            read += popped;
        }

        tracing::trace!(frames, "capture drained");
        if format == self.native.format {
            Ok(captured)
        } else {
            Ok(convert(captured.as_slice(), format))
        }
    }

    /// Blocks until every queued playback frame has left the ring or the
    /// device stops.
    pub(crate) fn wait_playback(&self) -> Result<(), GaudioError> {
        if !self.kind.is_playback() {
            return Err(GaudioError::WrongMode(ModeMismatch::PlaybackOnCaptureDevice));
        }
        let app = self.app.lock();
        let AppEnd::Playback(producer) = &*app else {
            return Err(GaudioError::WrongMode(ModeMismatch::PlaybackOnCaptureDevice));
        };
        let since = Instant::now();

        while producer.available_read() > 0 && self.status.is_running() {
            self.check_timeout(since)?;
            self.status.wait(self.pacing.poll_interval);
        }
        Ok(())
    }

    /// One wait step of a blocked transfer that has moved `transferred`
    /// frames so far.
    fn block(&self, transferred: usize, since: Instant) -> Result<(), GaudioError> {
        if !self.status.is_running() {
            return Err(GaudioError::DeviceStopped { transferred });
        }
        self.check_timeout(since)?;
        self.status.wait(self.pacing.poll_interval);
        Ok(())
    }

    fn check_timeout(&self, since: Instant) -> Result<(), GaudioError> {
        match self.pacing.io_timeout {
            Some(limit) if since.elapsed() >= limit => Err(GaudioError::Timeout {
                waited: since.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

fn frame_count(samples: usize, channels: u16) -> Result<usize, GaudioError> {
    if channels == 0 {
        return Err(GaudioError::invalid_argument("channel count must be positive"));
    }
    let channels = usize::from(channels);
    if samples % channels != 0 {
        return Err(GaudioError::invalid_argument(format!(
            "{samples} samples is not a whole number of {channels}-channel frames"
        )));
    }
    Ok(samples / channels)
}

fn released() -> GaudioError {
    BackendError::new(BackendError::DEVICE_NOT_INITIALIZED, "device has been cleared").into()
}
