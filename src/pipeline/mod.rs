//! Streaming pipeline between a device callback and blocking calls.
//!
//! ```text
//! playback:  app thread → PcmProducer → ring → PlaybackFeed → device callback
//! capture:   device callback → CaptureSink → ring → PcmConsumer → app thread
//! ```
//!
//! - **Ring Buffer**: lock-free SPSC queue of frames with acquire/commit access
//! - **Bridge**: the callback's end of the ring; pads silence or drops on pressure
//! - **Status**: device state flag and the wakeup signal blocked calls wait on
//!
//! The device callback never blocks.

mod bridge;
mod ring_buffer;
mod status;

pub use bridge::{CaptureSink, DeviceIo, PlaybackFeed};
pub use ring_buffer::{pcm_ring, PcmConsumer, PcmProducer, ReadGrant, WriteGrant};
pub use status::{DeviceState, DeviceStatus, StreamStats};
