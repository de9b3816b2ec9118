//! # gaudio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Handle-addressed audio file sessions and real-time device streaming.
//!
//! `gaudio` hands out small integer handles for open audio files and
//! configured audio devices, so a host across a call boundary can drive them
//! with plain numbers. Device audio flows through a lock-free ring between the
//! backend's real-time callback and blocking `playback`/`capture` calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gaudio::{DeviceConfig, DeviceKind, Gaudio, SampleFormat};
//!
//! # fn main() -> Result<(), gaudio::GaudioError> {
//! let audio = Gaudio::new();
//!
//! // Decode a file in chunks
//! let file = audio.open_file("track.flac")?;
//! let info = audio.file_basic_info(file)?;
//!
//! // Stream it to the default output
//! let device = audio.configure_device(DeviceConfig::new(DeviceKind::Playback))?;
//! loop {
//!     let chunk = audio.read(file, 1024, SampleFormat::F32)?;
//!     if chunk.is_empty() {
//!         break;
//!     }
//!     audio.playback(device.handle, chunk.as_slice(), info.channels)?;
//! }
//!
//! audio.wait_playback(device.handle)?;
//! audio.close(file)?;
//! audio.clear_device(device.handle)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Every call resolves its handle in a per-kind [`HandleTable`], then runs
//! under the resource's own lock:
//!
//! - **Backend Thread**: real-time callback that only touches the ring and atomics
//! - **Ring Buffer**: lock-free SPSC queue sized in frames, in the device's native layout
//! - **Caller Threads**: block on a condition variable until the ring has room or
//!   data, re-checking the device state on every wakeup
//!
//! Sample format and channel conversion happen on the caller's thread, never in
//! the callback.

// unsafe_code lint is configured in Cargo.toml as "deny" so the ring commit path can opt in
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect are only used in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
pub mod codec;
mod config;
mod device;
mod engine;
mod error;
mod file;
pub mod format;
mod handle;
pub mod pipeline;

pub use backend::{
    BackendId, BackendProvider, CpalProvider, DeviceDescriptor, DeviceId, DeviceKind, MockLog,
    MockProvider, ShareMode,
};
pub use codec::{CodecKind, FileInfo, WriteSpec};
pub use config::{DeviceConfig, EngineConfig, WavContainer, WavEncoding, WavOptions};
pub use device::{Configured, ConfiguredDevice};
pub use engine::{Gaudio, MAX_LISTED_DEVICES};
pub use error::{codes, BackendError, GaudioError, ModeMismatch, Warning};
pub use file::BasicInfo;
pub use format::{PcmBuffer, SampleFormat, SampleSlice};
pub use handle::{Handle, HandleTable, ResourceKind};
pub use pipeline::{DeviceState, StreamStats};
