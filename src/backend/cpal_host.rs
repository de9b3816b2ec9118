//! cpal hosts as backends.
//!
//! A cpal `Stream` cannot leave the thread that built it, so every opened
//! device gets a driver thread that owns its stream and executes start/stop
//! commands sent over a channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, HostId, SizedSample, Stream, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::{
    Backend, BackendDevice, BackendId, BackendProvider, DeviceDescriptor, DeviceId, DeviceKind,
    DeviceRequest, NativeSpec, ShareMode,
};
use crate::format::SampleFormat;
use crate::pipeline::{DeviceIo, DeviceState, DeviceStatus};
use crate::BackendError;

/// Period used when the host does not report one: 10ms of audio.
const DEFAULT_PERIOD_DIVISOR: u32 = 100;

/// Unity gain stored as raw `f32` bits.
const UNITY_GAIN: u32 = 0x3f80_0000;

/// Provides every cpal host compiled into this build.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalProvider;

impl CpalProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

impl BackendProvider for CpalProvider {
    fn available(&self) -> Vec<BackendId> {
        let default = cpal::default_host().id();
        let mut hosts = cpal::available_hosts();
        hosts.sort_by_key(|id| *id != default);
        hosts.into_iter().map(|id| BackendId::new(id.name())).collect()
    }

    fn init(&self, backend: Option<&BackendId>) -> Result<Box<dyn Backend>, BackendError> {
        let host_id = match backend {
            None => cpal::default_host().id(),
            Some(wanted) => cpal::available_hosts()
                .into_iter()
                .find(|id| id.name() == wanted.as_str())
                .ok_or_else(|| {
                    BackendError::new(BackendError::NO_BACKEND, format!("no cpal host {wanted}"))
                })?,
        };

        // Fail here rather than on first device open
        cpal::host_from_id(host_id)
            .map_err(|e| BackendError::new(BackendError::NO_BACKEND, e.to_string()))?;

        tracing::debug!(backend = host_id.name(), "cpal host available");
        Ok(Box::new(CpalBackend {
            host: host_id,
            id: BackendId::new(host_id.name()),
        }))
    }
}

/// Context for one cpal host.
pub struct CpalBackend {
    host: HostId,
    id: BackendId,
}

impl Backend for CpalBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, BackendError> {
        let host = host(self.host)?;
        let (devices, default) = match kind {
            DeviceKind::Capture => (
                host.input_devices().map_err(generic)?.collect::<Vec<_>>(),
                host.default_input_device(),
            ),
            DeviceKind::Playback | DeviceKind::Loopback => (
                host.output_devices().map_err(generic)?.collect::<Vec<_>>(),
                host.default_output_device(),
            ),
            DeviceKind::Duplex => return Err(duplex_unsupported()),
        };
        let default_name = default.and_then(|d| d.name().ok());

        Ok(devices
            .iter()
            .filter_map(|d| d.name().ok())
            .map(|name| DeviceDescriptor {
                id: DeviceId::new(name.clone()),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect())
    }

    fn open(
        &self,
        request: &DeviceRequest,
        status: Arc<DeviceStatus>,
    ) -> Result<Box<dyn BackendDevice>, BackendError> {
        if request.kind == DeviceKind::Duplex {
            return Err(duplex_unsupported());
        }
        if request.share_mode == ShareMode::Exclusive {
            return Err(BackendError::new(
                BackendError::SHARE_MODE_NOT_SUPPORTED,
                "cpal devices only run in shared mode",
            ));
        }

        let gain = Arc::new(AtomicU32::new(UNITY_GAIN));
        let (commands, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let driver = Driver {
            host: self.host,
            request: request.clone(),
            status,
            gain: Arc::clone(&gain),
        };
        let worker = thread::Builder::new()
            .name("gaudio-cpal".to_string())
            .spawn(move || driver.run(&command_rx, &ready_tx))
            .map_err(|e| BackendError::new(BackendError::GENERIC, e.to_string()))?;

        let native = match ready_rx.recv() {
            Ok(Ok(native)) => native,
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(driver_gone());
            }
        };

        Ok(Box::new(CpalDevice {
            kind: request.kind,
            native,
            gain,
            commands: Some(commands),
            worker: Some(worker),
        }))
    }
}

type Reply = Sender<Result<(), BackendError>>;

enum Command {
    Attach(DeviceIo, Reply),
    Start(Reply),
    Stop(Reply),
}

/// Handle to a device living on its driver thread.
struct CpalDevice {
    kind: DeviceKind,
    native: NativeSpec,
    gain: Arc<AtomicU32>,
    commands: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalDevice {
    fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), BackendError> {
        let commands = self.commands.as_ref().ok_or_else(driver_gone)?;
        let (reply_tx, reply_rx) = bounded(1);
        commands.send(command(reply_tx)).map_err(|_| driver_gone())?;
        reply_rx.recv().map_err(|_| driver_gone())?
    }
}

impl BackendDevice for CpalDevice {
    fn native(&self) -> NativeSpec {
        self.native
    }

    fn attach(&mut self, io: DeviceIo) -> Result<(), BackendError> {
        self.request(|reply| Command::Attach(io, reply))
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.request(Command::Start)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.request(Command::Stop)
    }

    fn volume(&self) -> Result<f32, BackendError> {
        Ok(f32::from_bits(self.gain.load(Ordering::Relaxed)))
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), BackendError> {
        if !self.kind.is_playback() {
            return Err(BackendError::new(
                BackendError::INVALID_OPERATION,
                "volume applies to playback devices only",
            ));
        }
        self.gain.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        // Closing the channel ends the driver loop, which drops the stream
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("cpal driver thread panicked");
            }
        }
    }
}

/// Everything the driver thread needs to build and run one stream.
struct Driver {
    host: HostId,
    request: DeviceRequest,
    status: Arc<DeviceStatus>,
    gain: Arc<AtomicU32>,
}

impl Driver {
    fn run(self, commands: &Receiver<Command>, ready: &Sender<Result<NativeSpec, BackendError>>) {
        let resolved = self.resolve();
        let (device, config, native) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        if ready.send(Ok(native)).is_err() {
            return;
        }

        let mut stream: Option<Stream> = None;
        while let Ok(command) = commands.recv() {
            match command {
                Command::Attach(io, reply) => {
                    let result = self.build(&device, &config, native.format, io);
                    let _ = reply.send(result.map(|built| {
                        stream = Some(built);
                    }));
                }
                Command::Start(reply) => {
                    let result = match &stream {
                        Some(s) => s.play().map_err(|e| {
                            BackendError::new(BackendError::FAILED_TO_START, e.to_string())
                        }),
                        None => Err(not_attached()),
                    };
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    let result = match &stream {
                        Some(s) => s.pause().map_err(|e| {
                            BackendError::new(BackendError::FAILED_TO_STOP, e.to_string())
                        }),
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
            }
        }

        tracing::debug!(kind = %self.request.kind, "cpal driver exiting");
    }

    fn resolve(&self) -> Result<(cpal::Device, StreamConfig, NativeSpec), BackendError> {
        let host = host(self.host)?;
        let device = find_device(&host, self.request.kind, self.request.device.as_ref())?;

        let supported = match self.request.kind {
            DeviceKind::Capture => device.default_input_config(),
            _ => device.default_output_config(),
        }
        .map_err(|e| BackendError::new(BackendError::FORMAT_NOT_SUPPORTED, e.to_string()))?;

        let format = self
            .request
            .format
            .or_else(|| from_cpal_format(supported.sample_format()))
            .unwrap_or(SampleFormat::F32);
        let channels = self.request.channels.unwrap_or_else(|| supported.channels());
        let sample_rate = self
            .request
            .sample_rate
            .unwrap_or_else(|| supported.sample_rate().0);

        let default_period = (sample_rate / DEFAULT_PERIOD_DIVISOR).max(1);
        let period_frames = self.request.period_frames.unwrap_or(match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } => default_period.clamp(*min, *max),
            SupportedBufferSize::Unknown => default_period,
        });

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match self.request.period_frames {
                Some(frames) => BufferSize::Fixed(frames),
                None => BufferSize::Default,
            },
        };
        let native = NativeSpec {
            format,
            channels,
            sample_rate,
            period_frames,
            share_mode: ShareMode::Shared,
        };

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            ?format,
            channels,
            sample_rate,
            period_frames,
            "resolved cpal stream"
        );
        Ok((device, config, native))
    }

    fn build(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        format: SampleFormat,
        io: DeviceIo,
    ) -> Result<Stream, BackendError> {
        match format {
            SampleFormat::U8 => self.build_typed::<u8>(device, config, io),
            SampleFormat::I16 => self.build_typed::<i16>(device, config, io),
            SampleFormat::I32 => self.build_typed::<i32>(device, config, io),
            SampleFormat::F32 => self.build_typed::<f32>(device, config, io),
            SampleFormat::F64 => self.build_typed::<f64>(device, config, io),
        }
    }

    fn build_typed<T>(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        io: DeviceIo,
    ) -> Result<Stream, BackendError>
    where
        T: SizedSample + bytemuck::Pod + Gain,
    {
        let status = Arc::clone(&self.status);
        let error_callback = move |err: cpal::StreamError| {
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                status.set_state(DeviceState::Stopped);
            }
            tracing::error!("Audio stream error: {}", err);
        };

        let stream = match io {
            DeviceIo::Playback(mut feed) => {
                let gain = Arc::clone(&self.gain);
                device.build_output_stream(
                    config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        feed.fill(bytemuck::cast_slice_mut(&mut *data));
                        let gain = gain.load(Ordering::Relaxed);
                        if gain != UNITY_GAIN {
                            let gain = f32::from_bits(gain);
                            for sample in data.iter_mut() {
                                *sample = sample.scale(gain);
                            }
                        }
                    },
                    error_callback,
                    None,
                )
            }
            DeviceIo::Capture(mut sink) => device.build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    sink.push(bytemuck::cast_slice(data));
                },
                error_callback,
                None,
            ),
        }
        .map_err(|e| BackendError::new(BackendError::FORMAT_NOT_SUPPORTED, e.to_string()))?;

        // Some hosts start streams on creation
        stream
            .pause()
            .map_err(|e| BackendError::new(BackendError::FAILED_TO_STOP, e.to_string()))?;
        Ok(stream)
    }
}

/// Software gain for one sample type.
trait Gain: Copy {
    fn scale(self, gain: f32) -> Self;
}

impl Gain for u8 {
    fn scale(self, gain: f32) -> Self {
        ((f32::from(self) - 128.0) * gain + 128.0) as u8
    }
}

impl Gain for i16 {
    fn scale(self, gain: f32) -> Self {
        (f32::from(self) * gain) as i16
    }
}

impl Gain for i32 {
    fn scale(self, gain: f32) -> Self {
        (f64::from(self) * f64::from(gain)) as i32
    }
}

impl Gain for f32 {
    fn scale(self, gain: f32) -> Self {
        self * gain
    }
}

impl Gain for f64 {
    fn scale(self, gain: f32) -> Self {
        self * f64::from(gain)
    }
}

fn host(id: HostId) -> Result<cpal::Host, BackendError> {
    cpal::host_from_id(id).map_err(|e| BackendError::new(BackendError::NO_BACKEND, e.to_string()))
}

fn find_device(
    host: &cpal::Host,
    kind: DeviceKind,
    id: Option<&DeviceId>,
) -> Result<cpal::Device, BackendError> {
    let capture = kind == DeviceKind::Capture;
    let Some(id) = id else {
        let default = if capture {
            host.default_input_device()
        } else {
            host.default_output_device()
        };
        return default.ok_or_else(|| {
            BackendError::new(BackendError::NO_DEVICE, format!("no default {kind} device"))
        });
    };

    let mut devices = if capture {
        host.input_devices().map_err(generic)?
    } else {
        host.output_devices().map_err(generic)?
    };
    devices
        .find(|d| d.name().is_ok_and(|name| name == id.as_str()))
        .ok_or_else(|| BackendError::new(BackendError::NO_DEVICE, format!("no {kind} device {id}")))
}

fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::I16),
        cpal::SampleFormat::I32 => Some(SampleFormat::I32),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32),
        cpal::SampleFormat::F64 => Some(SampleFormat::F64),
        _ => None,
    }
}

fn generic(err: impl std::fmt::Display) -> BackendError {
    BackendError::new(BackendError::GENERIC, err.to_string())
}

fn duplex_unsupported() -> BackendError {
    BackendError::new(
        BackendError::DEVICE_TYPE_NOT_SUPPORTED,
        "duplex devices are not supported",
    )
}

fn driver_gone() -> BackendError {
    BackendError::new(
        BackendError::DEVICE_NOT_INITIALIZED,
        "cpal driver thread is gone",
    )
}

fn not_attached() -> BackendError {
    BackendError::new(
        BackendError::INVALID_OPERATION,
        "device has no stream attached",
    )
}
