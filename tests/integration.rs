//! Integration tests for gaudio.
//!
//! Device tests run against the software backend from [`MockProvider`].
//! Tests that require actual audio hardware are marked with `#[ignore]` and
//! should be run manually.

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use gaudio::codec::{sniff_codec, AudioDecoder};
use gaudio::{
    codes, BackendId, CodecKind, DeviceConfig, DeviceKind, DeviceState, EngineConfig, FileInfo,
    Gaudio, GaudioError, MockProvider, ModeMismatch, PcmBuffer, SampleFormat, SampleSlice,
    WavContainer, WavOptions, WriteSpec,
};

fn mock_service(provider: MockProvider) -> Gaudio {
    Gaudio::with_provider(EngineConfig::default(), provider)
}

fn wav_spec(channels: u16) -> WriteSpec {
    WriteSpec {
        channels,
        sample_rate: 44100,
        bits_per_sample: 16,
        codec: CodecKind::Wav,
    }
}

/// Decoder that records overlapping calls instead of decoding anything.
struct ReentrancyProbe {
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl AudioDecoder for ReentrancyProbe {
    fn info(&self) -> FileInfo {
        FileInfo {
            frames: 1_000_000,
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            codec: CodecKind::Mp3,
        }
    }

    fn read_offset(&self) -> u64 {
        0
    }

    fn seek(&mut self, frame: u64) -> Result<u64, GaudioError> {
        Ok(frame)
    }

    fn read(&mut self, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(1));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
        Ok(PcmBuffer::silence(format, frames))
    }
}

// ---- file sessions ----

#[test]
fn test_wav_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let audio = mock_service(MockProvider::new());

    let samples: Vec<i16> = (0..2000).map(|i| ((i * 37) % 20000 - 10000) as i16).collect();

    let writer = audio.open_file_write(&path, wav_spec(2), None).unwrap();
    assert_eq!(audio.write(writer, SampleSlice::I16(&samples[..1000])).unwrap(), 500);
    assert_eq!(audio.write(writer, SampleSlice::I16(&samples[1000..])).unwrap(), 500);
    audio.close(writer).unwrap();

    let reader = audio.open_file(&path).unwrap();
    let info = audio.file_basic_info(reader).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.read_offset, 0);

    let mut decoded = Vec::new();
    loop {
        let chunk = audio.read(reader, 300, SampleFormat::I16).unwrap();
        if chunk.is_empty() {
            break;
        }
        let PcmBuffer::I16(values) = chunk else {
            panic!("expected i16 samples");
        };
        decoded.extend(values);
    }
    assert_eq!(decoded, samples);
    assert_eq!(audio.file_basic_info(reader).unwrap().read_offset, 1000);

    assert_eq!(audio.seek(reader, 250).unwrap(), 250);
    let PcmBuffer::I16(values) = audio.read(reader, 1, SampleFormat::I16).unwrap() else {
        panic!("expected i16 samples");
    };
    assert_eq!(values, &samples[500..502]);
    audio.close(reader).unwrap();
}

#[test]
fn test_file_info_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    let audio = mock_service(MockProvider::new());

    let writer = audio.open_file_write(&path, wav_spec(1), None).unwrap();
    audio
        .write(writer, SampleSlice::I16(&[0, 16384, -16384, 32767]))
        .unwrap();
    audio.close(writer).unwrap();

    let info = audio.file_info(&path).unwrap();
    assert_eq!(info.codec, CodecKind::Wav);
    assert_eq!(info.channels, 1);
    assert_eq!(info.bits_per_sample, 16);

    let (loaded, samples) = audio.load_file(&path, SampleFormat::F32).unwrap();
    assert_eq!(loaded.frames, 4);
    let PcmBuffer::F32(values) = samples else {
        panic!("expected f32 samples");
    };
    assert!((values[1] - 0.5).abs() < 1e-6);
    assert!((values[2] + 0.5).abs() < 1e-6);
}

#[test]
fn test_signature_dispatch() {
    let dir = tempfile::tempdir().unwrap();

    let flac = dir.path().join("track.flac");
    std::fs::write(&flac, b"fLaC\0\0\0\x22not really flac").unwrap();
    assert_eq!(sniff_codec(&flac).unwrap(), CodecKind::Flac);

    let wav = dir.path().join("track.wav");
    let audio = mock_service(MockProvider::new());
    let writer = audio.open_file_write(&wav, wav_spec(1), None).unwrap();
    audio.write(writer, SampleSlice::I16(&[1, 2, 3])).unwrap();
    audio.close(writer).unwrap();
    assert_eq!(sniff_codec(&wav).unwrap(), CodecKind::Wav);
    assert_eq!(audio.file_info(&wav).unwrap().codec, CodecKind::Wav);
}

#[test]
fn test_unknown_signature_allocates_no_handle() {
    let dir = tempfile::tempdir().unwrap();
    let unknown = dir.path().join("song.mid");
    let mut file = std::fs::File::create(&unknown).unwrap();
    file.write_all(b"MThd\0\0\0\x06").unwrap();

    let wav = dir.path().join("ok.wav");
    let seed = mock_service(MockProvider::new());
    let writer = seed.open_file_write(&wav, wav_spec(1), None).unwrap();
    seed.write(writer, SampleSlice::I16(&[0; 64])).unwrap();
    seed.close(writer).unwrap();

    let audio = mock_service(MockProvider::new());
    let err = audio.open_file(&unknown).unwrap_err();
    assert!(matches!(err, GaudioError::UnsupportedCodec));
    assert_eq!(err.code(), codes::UNSUPPORTED);
    let after_failure = audio.open_file(&wav).unwrap();

    let fresh = mock_service(MockProvider::new());
    let first = fresh.open_file(&wav).unwrap();
    assert_eq!(after_failure, first);
}

#[test]
fn test_undecodable_wav_containers_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let audio = mock_service(MockProvider::new());

    for (name, container, signature) in [
        ("sony.w64", WavContainer::W64, &b"riff"[..]),
        ("big.wav", WavContainer::Rf64, &b"RF64"[..]),
    ] {
        let path = dir.path().join(name);
        let options = WavOptions {
            container,
            ..WavOptions::default()
        };
        let writer = audio.open_file_write(&path, wav_spec(2), Some(options)).unwrap();
        audio.write(writer, SampleSlice::I16(&[0; 64])).unwrap();
        audio.close(writer).unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[..4], signature);

        assert!(matches!(
            audio.open_file(&path),
            Err(GaudioError::UnsupportedCodec)
        ));
        assert!(matches!(
            audio.file_info(&path),
            Err(GaudioError::UnsupportedCodec)
        ));
    }
}

#[test]
fn test_24_bit_wav_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deep.wav");
    let audio = mock_service(MockProvider::new());

    let spec = WriteSpec {
        bits_per_sample: 24,
        ..wav_spec(1)
    };
    let samples = [0x1234_5600, -0x0100_0000, 0, 0x7FFF_FF00];
    let writer = audio.open_file_write(&path, spec, None).unwrap();
    audio.write(writer, SampleSlice::I32(&samples)).unwrap();
    audio.close(writer).unwrap();

    let info = audio.file_info(&path).unwrap();
    assert_eq!(info.bits_per_sample, 24);
    assert_eq!(info.frames, 4);

    let reader = audio.open_file(&path).unwrap();
    let read = audio.read(reader, 4, SampleFormat::I32).unwrap();
    assert_eq!(read, PcmBuffer::I32(samples.to_vec()));
}

#[test]
fn test_concurrent_reads_are_serialized() {
    let busy = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let audio = mock_service(MockProvider::new());

    let handle = audio
        .attach_decoder(Box::new(ReentrancyProbe {
            busy,
            overlaps: Arc::clone(&overlaps),
            calls: Arc::clone(&calls),
        }))
        .unwrap();

    let barrier = Barrier::new(4);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..20 {
                    audio.read(handle, 64, SampleFormat::I16).unwrap();
                }
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 80);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_allocation_is_unique() {
    let audio = mock_service(MockProvider::new());
    let barrier = Barrier::new(8);

    let handles: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    (0..50)
                        .map(|_| {
                            audio
                                .attach_decoder(Box::new(ReentrancyProbe {
                                    busy: Arc::default(),
                                    overlaps: Arc::default(),
                                    calls: Arc::default(),
                                }))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = handles.iter().collect();
    assert_eq!(handles.len(), 400);
    assert_eq!(unique.len(), 400);
}

#[test]
fn test_file_mode_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");
    let audio = mock_service(MockProvider::new());

    let writer = audio.open_file_write(&path, wav_spec(1), None).unwrap();
    let err = audio.read(writer, 10, SampleFormat::I16).unwrap_err();
    assert!(matches!(
        err,
        GaudioError::WrongMode(ModeMismatch::ReadOnWriteSession)
    ));
    assert_eq!(err.code(), codes::READ_MODE);
    audio.close(writer).unwrap();

    let reader = audio.open_file(&path).unwrap();
    let err = audio.write(reader, SampleSlice::I16(&[0])).unwrap_err();
    assert_eq!(err.code(), codes::WRITE_MODE);
}

#[test]
fn test_close_twice_is_invalid_handle() {
    let dir = tempfile::tempdir().unwrap();
    let audio = mock_service(MockProvider::new());
    let handle = audio
        .open_file_write(dir.path().join("x.wav"), wav_spec(1), None)
        .unwrap();

    audio.close(handle).unwrap();
    let err = audio.close(handle).unwrap_err();
    assert!(matches!(err, GaudioError::InvalidHandle { .. }));
    assert_eq!(err.code(), codes::REFNUM);
    assert!(audio.read(handle, 1, SampleFormat::I16).is_err());
}

// ---- devices ----

#[test]
fn test_playback_larger_than_buffer_is_rejected() {
    let provider = MockProvider::new().with_channels(2);
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback).with_buffer_frames(4096))
        .unwrap();
    let calls = log.backend_calls();

    let samples = vec![0i16; 8192 * 2];
    let err = audio
        .playback(device.handle, SampleSlice::I16(&samples), 2)
        .unwrap_err();
    assert!(matches!(
        err,
        GaudioError::BufferSizeExceeded {
            requested: 8192,
            capacity: 4096
        }
    ));
    assert_eq!(err.code(), codes::BUFFER_SIZE);
    assert_eq!(log.backend_calls(), calls);
}

#[test]
fn test_capture_on_playback_device_skips_backend() {
    let provider = MockProvider::new();
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback))
        .unwrap();
    let calls = log.backend_calls();

    let err = audio
        .capture(device.handle, 16, SampleFormat::F32)
        .unwrap_err();
    assert!(matches!(
        err,
        GaudioError::WrongMode(ModeMismatch::CaptureOnPlaybackDevice)
    ));
    assert_eq!(err.code(), codes::CAPTURE_MODE);
    assert_eq!(log.backend_calls(), calls);
    assert_eq!(audio.device_state(device.handle).unwrap(), DeviceState::Stopped);
}

#[test]
fn test_playback_reaches_device() {
    let provider = MockProvider::new()
        .with_format(SampleFormat::I16)
        .with_channels(1);
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback))
        .unwrap();
    assert!(device.warning.is_none());

    let samples: Vec<i16> = (1..=480).collect();
    audio
        .playback(device.handle, SampleSlice::I16(&samples), 1)
        .unwrap();
    audio.wait_playback(device.handle).unwrap();

    let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let deadline = Instant::now() + Duration::from_secs(2);
    while log.played().len() < expected.len() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(log.played(), expected);

    audio.stop_device(device.handle).unwrap();
    assert_eq!(audio.device_state(device.handle).unwrap(), DeviceState::Stopped);
}

#[test]
fn test_capture_returns_requested_format() {
    let provider = MockProvider::new()
        .with_format(SampleFormat::F32)
        .with_channels(2)
        .with_capture_value(0.5);
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Capture))
        .unwrap();

    let PcmBuffer::F64(values) = audio
        .capture(device.handle, 256, SampleFormat::F64)
        .unwrap()
    else {
        panic!("expected f64 samples");
    };
    assert_eq!(values.len(), 512);
    assert!(values.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    assert_eq!(audio.device_state(device.handle).unwrap(), DeviceState::Started);
}

#[test]
fn test_stop_is_idempotent_and_clear_retires() {
    let provider = MockProvider::new();
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Capture))
        .unwrap();
    audio.stop_device(device.handle).unwrap();
    audio.start_device(device.handle).unwrap();
    audio.start_device(device.handle).unwrap();
    audio.stop_device(device.handle).unwrap();
    audio.stop_device(device.handle).unwrap();

    audio.clear_device(device.handle).unwrap();
    assert_eq!(log.live_devices(), 0);
    for result in [
        audio.clear_device(device.handle),
        audio.stop_device(device.handle),
        audio.start_device(device.handle),
    ] {
        assert!(matches!(result, Err(GaudioError::InvalidHandle { .. })));
    }
}

#[test]
fn test_context_backend_mismatch() {
    let provider = MockProvider::new().with_backends(&["mock", "null"]);
    let log = provider.log();
    let audio = mock_service(provider);
    assert_eq!(audio.backends().len(), 2);

    audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback))
        .unwrap();
    let err = audio
        .configure_device(
            DeviceConfig::new(DeviceKind::Playback).with_backend(BackendId::new("null")),
        )
        .unwrap_err();
    assert!(matches!(err, GaudioError::ContextBackendMismatch { .. }));
    assert_eq!(err.code(), codes::CONTEXT_BACKEND);

    audio.clear_backend().unwrap();
    assert_eq!(log.live_contexts(), 0);
    audio
        .configure_device(
            DeviceConfig::new(DeviceKind::Playback).with_backend(BackendId::new("null")),
        )
        .unwrap();
}

#[test]
fn test_stop_from_another_thread_unblocks_playback() {
    let provider = MockProvider::new().with_channels(1).silent();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback).with_buffer_frames(64))
        .unwrap();
    let block = vec![0.0f32; 64];
    audio
        .playback(device.handle, SampleSlice::F32(&block), 1)
        .unwrap();

    let err = thread::scope(|s| {
        let blocked = s.spawn(|| audio.playback(device.handle, SampleSlice::F32(&block), 1));
        thread::sleep(Duration::from_millis(50));
        audio.stop_device(device.handle).unwrap();
        blocked.join().unwrap().unwrap_err()
    });

    assert!(matches!(err, GaudioError::DeviceStopped { transferred: 0 }));
    assert_eq!(err.code(), codes::DEVICE_STOPPED);
}

#[test]
fn test_clear_device_unblocks_playback() {
    let provider = MockProvider::new().with_channels(1).silent();
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback).with_buffer_frames(64))
        .unwrap();
    let block = vec![0.0f32; 64];
    audio
        .playback(device.handle, SampleSlice::F32(&block), 1)
        .unwrap();

    let err = thread::scope(|s| {
        let blocked = s.spawn(|| audio.playback(device.handle, SampleSlice::F32(&block), 1));
        thread::sleep(Duration::from_millis(50));
        audio.clear_device(device.handle).unwrap();
        blocked.join().unwrap().unwrap_err()
    });

    assert!(matches!(err, GaudioError::DeviceStopped { transferred: 0 }));
    assert_eq!(log.live_devices(), 0);
    assert!(matches!(
        audio.device_state(device.handle),
        Err(GaudioError::InvalidHandle { .. })
    ));
}

#[test]
fn test_clear_backend_unblocks_capture() {
    let provider = MockProvider::new().silent();
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Capture))
        .unwrap();

    let err = thread::scope(|s| {
        let blocked = s.spawn(|| audio.capture(device.handle, 32, SampleFormat::I16));
        thread::sleep(Duration::from_millis(50));
        audio.clear_backend().unwrap();
        blocked.join().unwrap().unwrap_err()
    });

    assert!(matches!(err, GaudioError::DeviceStopped { transferred: 0 }));
    assert_eq!(log.live_devices(), 0);
    assert_eq!(log.live_contexts(), 0);
}

#[test]
fn test_lost_device_unblocks_capture() {
    let provider = MockProvider::new().silent();
    let log = provider.log();
    let audio = mock_service(provider);

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Capture))
        .unwrap();

    let err = thread::scope(|s| {
        let blocked = s.spawn(|| audio.capture(device.handle, 32, SampleFormat::I16));
        thread::sleep(Duration::from_millis(50));
        log.disconnect_all();
        blocked.join().unwrap().unwrap_err()
    });
    assert!(matches!(err, GaudioError::DeviceStopped { .. }));
}

#[test]
fn test_silent_device_times_out() {
    let config = EngineConfig {
        io_timeout: Some(Duration::from_millis(30)),
        ..EngineConfig::default()
    };
    let audio = Gaudio::with_provider(config, MockProvider::new().silent());

    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Capture))
        .unwrap();
    let err = audio
        .capture(device.handle, 0, SampleFormat::F32)
        .unwrap_err();
    assert!(matches!(err, GaudioError::Timeout { .. }));
    assert_eq!(err.code(), codes::TIMEOUT);
}

#[test]
fn test_unknown_handles_are_rejected() {
    let audio = mock_service(MockProvider::new());
    let handle = gaudio::Handle::from_raw(42);

    assert!(matches!(
        audio.playback(handle, SampleSlice::I16(&[0]), 1),
        Err(GaudioError::InvalidHandle { .. })
    ));
    assert!(matches!(
        audio.seek(handle, 0),
        Err(GaudioError::InvalidHandle { .. })
    ));
    assert!(matches!(
        audio.device_info(handle),
        Err(GaudioError::InvalidHandle { .. })
    ));
}

#[test]
#[ignore = "requires audio hardware"]
fn test_default_output_plays() {
    let audio = Gaudio::new();
    let device = audio
        .configure_device(DeviceConfig::new(DeviceKind::Playback))
        .unwrap();
    let info = audio.device_info(device.handle).unwrap();
    let silence = vec![0.0f32; info.sample_rate as usize / 10 * usize::from(info.channels)];
    audio
        .playback(device.handle, SampleSlice::F32(&silence), info.channels)
        .unwrap();
    audio.wait_playback(device.handle).unwrap();
}
