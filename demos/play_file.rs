//! File playback example.
//!
//! Streams an audio file to the default output device.
//!
//! Run with: cargo run --example play_file -- path/to/track.flac

use gaudio::{DeviceConfig, DeviceKind, Gaudio, SampleFormat};
use tracing_subscriber::EnvFilter;

/// Frames read from the file per playback call.
const CHUNK_FRAMES: usize = 2048;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output (RUST_LOG=gaudio=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: play_file <path>")?;

    let audio = Gaudio::new();
    let file = audio.open_file(&path)?;
    let info = audio.file_basic_info(file)?;
    println!(
        "Playing {path} ({} channels, {} Hz)",
        info.channels, info.sample_rate
    );

    // Match the file rate so no resampling is needed
    let device = audio.configure_device(
        DeviceConfig::new(DeviceKind::Playback)
            .with_sample_rate(info.sample_rate)
            .with_buffer_frames(CHUNK_FRAMES * 4),
    )?;
    if let Some(warning) = device.warning {
        println!("Warning: {warning:?}");
    }

    loop {
        let chunk = audio.read(file, CHUNK_FRAMES, SampleFormat::F32)?;
        if chunk.is_empty() {
            break;
        }
        audio.playback(device.handle, chunk.as_slice(), info.channels)?;
    }

    // Let the queued tail play out before tearing down
    audio.wait_playback(device.handle)?;
    let stats = audio.device_stats(device.handle)?;

    audio.close(file)?;
    audio.clear_device(device.handle)?;

    println!("Done");
    println!("Stats: {stats:?}");

    Ok(())
}
