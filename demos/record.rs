//! Simple recording example.
//!
//! Records audio from the default input device to a WAV file.
//!
//! Run with: cargo run --example record

use std::time::{Duration, Instant};

use gaudio::{CodecKind, DeviceConfig, DeviceKind, Gaudio, SampleFormat, WriteSpec};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output (RUST_LOG=gaudio=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let audio = Gaudio::new();

    // 16kHz mono, the usual transcription format
    let device = audio.configure_device(
        DeviceConfig::new(DeviceKind::Capture)
            .with_channels(1)
            .with_sample_rate(16000)
            .with_buffer_frames(16000),
    )?;
    let info = audio.device_info(device.handle)?;

    let file = audio.open_file_write(
        "recording.wav",
        WriteSpec {
            channels: info.channels,
            sample_rate: info.sample_rate,
            bits_per_sample: 16,
            codec: CodecKind::Wav,
        },
        None,
    )?;

    println!("Recording to recording.wav for 5 seconds...");

    // Capture a tenth of a second at a time
    let chunk_frames = info.sample_rate as usize / 10;
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        let samples = audio.capture(device.handle, chunk_frames, SampleFormat::I16)?;
        audio.write(file, samples.as_slice())?;
    }

    // Get stats before clearing the device
    let stats = audio.device_stats(device.handle)?;

    // Stop and finalize the WAV file
    audio.clear_device(device.handle)?;
    audio.close(file)?;

    println!("Recording saved to recording.wav");
    println!("Stats: {stats:?}");

    Ok(())
}
