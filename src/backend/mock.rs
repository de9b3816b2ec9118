//! Software backend for testing without hardware.
//!
//! Every opened device runs a clock thread that moves one period per tick
//! between the ring and an in-memory "device": playback frames are recorded in
//! a [`MockLog`], capture frames are a constant signal.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    Backend, BackendDevice, BackendId, BackendProvider, DeviceDescriptor, DeviceId, DeviceKind,
    DeviceRequest, NativeSpec, ShareMode,
};
use crate::format::{convert, SampleFormat, SampleSlice};
use crate::pipeline::{DeviceIo, DeviceState, DeviceStatus};
use crate::BackendError;

#[derive(Debug, Clone)]
struct MockSettings {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
    period_frames: u32,
    tick: Duration,
    silent: bool,
    capture_value: f64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            format: SampleFormat::F32,
            channels: 2,
            sample_rate: 48000,
            period_frames: 480,
            tick: Duration::from_millis(1),
            silent: false,
            capture_value: 0.5,
        }
    }
}

#[derive(Default)]
struct LogInner {
    backend_calls: AtomicUsize,
    live_contexts: AtomicUsize,
    live_devices: AtomicUsize,
    played: Mutex<Vec<u8>>,
    statuses: Mutex<Vec<Weak<DeviceStatus>>>,
}

/// Observations shared by every context and device of one [`MockProvider`].
#[derive(Clone, Default)]
pub struct MockLog {
    inner: Arc<LogInner>,
}

impl MockLog {
    /// Calls made on backend contexts and devices, including opens.
    pub fn backend_calls(&self) -> usize {
        self.inner.backend_calls.load(Ordering::SeqCst)
    }

    /// Contexts currently alive.
    pub fn live_contexts(&self) -> usize {
        self.inner.live_contexts.load(Ordering::SeqCst)
    }

    /// Devices currently open.
    pub fn live_devices(&self) -> usize {
        self.inner.live_devices.load(Ordering::SeqCst)
    }

    /// Bytes every playback device has pulled from its ring, in order.
    pub fn played(&self) -> Vec<u8> {
        self.inner.played.lock().clone()
    }

    /// Marks every open device as lost, as a hardware unplug would.
    pub fn disconnect_all(&self) {
        for status in self.inner.statuses.lock().iter().filter_map(Weak::upgrade) {
            status.set_state(DeviceState::Stopped);
        }
    }

    fn call(&self) {
        self.inner.backend_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MockLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLog")
            .field("backend_calls", &self.backend_calls())
            .field("live_contexts", &self.live_contexts())
            .field("live_devices", &self.live_devices())
            .finish_non_exhaustive()
    }
}

/// Provides software backends.
///
/// # Example
///
/// ```
/// use gaudio::{Gaudio, EngineConfig, MockProvider, SampleFormat};
///
/// let provider = MockProvider::new()
///     .with_format(SampleFormat::I16)
///     .with_channels(1);
/// let log = provider.log();
/// let audio = Gaudio::with_provider(EngineConfig::default(), provider);
/// assert_eq!(audio.backends().len(), 1);
/// assert_eq!(log.live_contexts(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    backends: Vec<BackendId>,
    settings: MockSettings,
    log: MockLog,
}

impl MockProvider {
    /// Creates a provider with a single backend named `"mock"`.
    pub fn new() -> Self {
        Self {
            backends: vec![BackendId::from("mock")],
            settings: MockSettings::default(),
            log: MockLog::default(),
        }
    }

    /// Replaces the backend list; the first entry is the default.
    #[must_use]
    pub fn with_backends(mut self, names: &[&str]) -> Self {
        self.backends = names.iter().map(|&name| BackendId::from(name)).collect();
        self
    }

    /// Native sample format for requests that leave it open.
    #[must_use]
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.settings.format = format;
        self
    }

    /// Native channel count for requests that leave it open.
    #[must_use]
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.settings.channels = channels;
        self
    }

    /// Native sample rate for requests that leave it open.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.settings.sample_rate = sample_rate;
        self
    }

    /// Period size for requests that leave it open.
    #[must_use]
    pub fn with_period_frames(mut self, period_frames: u32) -> Self {
        self.settings.period_frames = period_frames;
        self
    }

    /// Time between periods. Default: 1ms.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.settings.tick = tick;
        self
    }

    /// Devices report as started but never move data.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.settings.silent = true;
        self
    }

    /// Value of every captured sample, in `[-1, 1]`. Default: 0.5.
    #[must_use]
    pub fn with_capture_value(mut self, value: f64) -> Self {
        self.settings.capture_value = value;
        self
    }

    /// The shared observation log.
    pub fn log(&self) -> MockLog {
        self.log.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendProvider for MockProvider {
    fn available(&self) -> Vec<BackendId> {
        self.backends.clone()
    }

    fn init(&self, backend: Option<&BackendId>) -> Result<Box<dyn Backend>, BackendError> {
        let id = match backend {
            None => self.backends.first(),
            Some(wanted) => self.backends.iter().find(|id| *id == wanted),
        }
        .cloned()
        .ok_or_else(|| BackendError::new(BackendError::NO_BACKEND, "no such mock backend"))?;

        self.log.call();
        self.log.inner.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBackend {
            id,
            settings: self.settings.clone(),
            log: self.log.clone(),
        }))
    }
}

/// A software backend context.
pub struct MockBackend {
    id: BackendId,
    settings: MockSettings,
    log: MockLog,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.log.inner.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

fn descriptor(id: &str, name: &str, is_default: bool) -> DeviceDescriptor {
    DeviceDescriptor {
        id: DeviceId::from(id),
        name: name.to_string(),
        is_default,
    }
}

impl Backend for MockBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, BackendError> {
        self.log.call();
        match kind {
            DeviceKind::Playback | DeviceKind::Loopback => Ok(vec![
                descriptor("mock-out-0", "Mock Speakers", true),
                descriptor("mock-out-1", "Mock Headphones", false),
            ]),
            DeviceKind::Capture => Ok(vec![descriptor("mock-in-0", "Mock Microphone", true)]),
            DeviceKind::Duplex => Err(BackendError::new(
                BackendError::DEVICE_TYPE_NOT_SUPPORTED,
                "duplex devices are not supported",
            )),
        }
    }

    fn open(
        &self,
        request: &DeviceRequest,
        status: Arc<DeviceStatus>,
    ) -> Result<Box<dyn BackendDevice>, BackendError> {
        let known = self.devices(request.kind)?;
        if let Some(id) = &request.device {
            if !known.iter().any(|d| &d.id == id) {
                return Err(BackendError::new(
                    BackendError::NO_DEVICE,
                    format!("no {} device {id}", request.kind),
                ));
            }
        }

        let channels = request.channels.unwrap_or(self.settings.channels);
        if channels == 0 {
            return Err(BackendError::new(
                BackendError::INVALID_ARGS,
                "zero channels",
            ));
        }
        let native = NativeSpec {
            format: request.format.unwrap_or(self.settings.format),
            channels,
            sample_rate: request.sample_rate.unwrap_or(self.settings.sample_rate),
            period_frames: request.period_frames.unwrap_or(self.settings.period_frames),
            share_mode: request.share_mode,
        };

        self.log.inner.statuses.lock().push(Arc::downgrade(&status));
        self.log.inner.live_devices.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            native,
            settings: self.settings.clone(),
            log: self.log.clone(),
            shared: Arc::new(DeviceShared {
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                volume: AtomicU32::new(1.0f32.to_bits()),
            }),
            clock: None,
        }))
    }
}

struct DeviceShared {
    running: AtomicBool,
    shutdown: AtomicBool,
    volume: AtomicU32,
}

struct MockDevice {
    native: NativeSpec,
    settings: MockSettings,
    log: MockLog,
    shared: Arc<DeviceShared>,
    clock: Option<JoinHandle<()>>,
}

impl MockDevice {
    fn spawn_clock(&self, mut io: DeviceIo) -> Result<JoinHandle<()>, BackendError> {
        let stride = io.stride();
        let period_bytes = self.native.period_frames as usize * stride;
        let shared = Arc::clone(&self.shared);
        let log = self.log.clone();
        let settings = self.settings.clone();

        let samples = self.native.period_frames as usize * usize::from(self.native.channels);
        let signal = vec![settings.capture_value; samples];
        let capture_block = convert(SampleSlice::F64(&signal), self.native.format);
        let capture_block = capture_block.as_bytes().to_vec();

        thread::Builder::new()
            .name("gaudio-mock-clock".to_string())
            .spawn(move || {
                let mut period = vec![0u8; period_bytes];
                while !shared.shutdown.load(Ordering::Acquire) {
                    if shared.running.load(Ordering::Acquire) && !settings.silent {
                        match &mut io {
                            DeviceIo::Playback(feed) => {
                                let frames = feed.fill(&mut period);
                                log.inner
                                    .played
                                    .lock()
                                    .extend_from_slice(&period[..frames * stride]);
                            }
                            DeviceIo::Capture(sink) => {
                                sink.push(&capture_block);
                            }
                        }
                    }
                    thread::sleep(settings.tick);
                }
            })
            .map_err(|e| BackendError::new(BackendError::GENERIC, e.to_string()))
    }
}

impl BackendDevice for MockDevice {
    fn native(&self) -> NativeSpec {
        self.native
    }

    fn attach(&mut self, io: DeviceIo) -> Result<(), BackendError> {
        self.log.call();
        if self.clock.is_some() {
            return Err(BackendError::new(
                BackendError::INVALID_OPERATION,
                "device already attached",
            ));
        }
        self.clock = Some(self.spawn_clock(io)?);
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.log.call();
        if self.clock.is_none() {
            return Err(BackendError::new(
                BackendError::FAILED_TO_START,
                "device has no ring attached",
            ));
        }
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.log.call();
        self.shared.running.store(false, Ordering::Release);
        Ok(())
    }

    fn volume(&self) -> Result<f32, BackendError> {
        self.log.call();
        Ok(f32::from_bits(self.shared.volume.load(Ordering::Relaxed)))
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), BackendError> {
        self.log.call();
        self.shared.volume.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(clock) = self.clock.take() {
            let _ = clock.join();
        }
        self.log.inner.live_devices.fetch_sub(1, Ordering::SeqCst);
    }
}
