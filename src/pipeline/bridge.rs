//! Real-time ends of a device ring.
//!
//! A backend receives exactly one of these per device and calls it from its
//! audio callback. Both ends only touch the ring and atomics and never
//! allocate or log. A caller parked on the device is woken only when the ring
//! actually moved; see [`DeviceStatus`] for what that wakeup costs.

use std::sync::Arc;

use super::ring_buffer::{PcmConsumer, PcmProducer};
use super::status::DeviceStatus;

/// Playback side: drains the ring into the device buffer.
pub struct PlaybackFeed {
    consumer: PcmConsumer,
    status: Arc<DeviceStatus>,
}

impl PlaybackFeed {
    pub(crate) fn new(consumer: PcmConsumer, status: Arc<DeviceStatus>) -> Self {
        Self { consumer, status }
    }

    /// Bytes per frame the device buffer is expected to hold.
    pub fn stride(&self) -> usize {
        self.consumer.stride()
    }

    /// Fills `out` from the ring, padding any shortfall with silence.
    ///
    /// Returns the number of frames taken from the ring.
    pub fn fill(&mut self, out: &mut [u8]) -> usize {
        let stride = self.consumer.stride();
        let read = self.consumer.pop_frames(out);
        let filled = read * stride;

        if filled < out.len() {
            out[filled..].fill(self.consumer.silence_byte());
            self.status.record_underrun((out.len() - filled) / stride);
        }

        if read > 0 {
            self.status.notify();
        }
        read
    }
}

/// Capture side: pushes device input into the ring.
pub struct CaptureSink {
    producer: PcmProducer,
    status: Arc<DeviceStatus>,
}

impl CaptureSink {
    pub(crate) fn new(producer: PcmProducer, status: Arc<DeviceStatus>) -> Self {
        Self { producer, status }
    }

    /// Bytes per frame the device buffer is expected to hold.
    pub fn stride(&self) -> usize {
        self.producer.stride()
    }

    /// Pushes `input` into the ring, dropping frames that do not fit.
    ///
    /// Returns the number of frames stored.
    pub fn push(&mut self, input: &[u8]) -> usize {
        let frames = input.len() / self.producer.stride();
        let written = self.producer.push_frames(input);

        if written < frames {
            self.status.record_overflow(frames - written);
        }

        if written > 0 {
            self.status.notify();
        }
        written
    }
}

/// The real-time end handed to a backend when a device is opened.
pub enum DeviceIo {
    /// Output device: the callback pulls frames.
    Playback(PlaybackFeed),
    /// Input or loopback device: the callback pushes frames.
    Capture(CaptureSink),
}

impl DeviceIo {
    /// Bytes per frame on the device side of the ring.
    pub fn stride(&self) -> usize {
        match self {
            Self::Playback(feed) => feed.stride(),
            Self::Capture(sink) => sink.stride(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::format::SampleFormat;
    use crate::pipeline::pcm_ring;

    #[test]
    fn test_fill_pads_u8_silence_on_underrun() {
        let status = Arc::new(DeviceStatus::new());
        let (mut producer, consumer) = pcm_ring(SampleFormat::U8, 1, 8).unwrap();
        let mut feed = PlaybackFeed::new(consumer, Arc::clone(&status));

        producer.push_frames(&[1, 2, 3]);
        let mut out = [0u8; 6];
        assert_eq!(feed.fill(&mut out), 3);
        assert_eq!(out, [1, 2, 3, 0x80, 0x80, 0x80]);
        assert_eq!(status.stats().underrun_frames, 3);
    }

    #[test]
    fn test_fill_pads_zero_for_signed_formats() {
        let status = Arc::new(DeviceStatus::new());
        let (_producer, consumer) = pcm_ring(SampleFormat::I16, 2, 8).unwrap();
        let mut feed = PlaybackFeed::new(consumer, status);

        let mut out = [0xAAu8; 8];
        assert_eq!(feed.fill(&mut out), 0);
        assert_eq!(out, [0u8; 8]);
    }

    #[test]
    fn test_fill_wakes_blocked_writer() {
        let status = Arc::new(DeviceStatus::new());
        let (mut producer, consumer) = pcm_ring(SampleFormat::U8, 1, 4).unwrap();
        let mut feed = PlaybackFeed::new(consumer, Arc::clone(&status));
        producer.push_frames(&[1, 2, 3, 4]);

        let writer = {
            let status = Arc::clone(&status);
            std::thread::spawn(move || {
                let start = Instant::now();
                while producer.available_write() == 0 && start.elapsed() < Duration::from_secs(5) {
                    status.wait(Duration::from_secs(5));
                }
                start.elapsed()
            })
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        while status.waiters() == 0 && Instant::now() < deadline {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(20));
        let mut out = [0u8; 2];
        assert_eq!(feed.fill(&mut out), 2);

        assert!(writer.join().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_push_counts_dropped_frames() {
        let status = Arc::new(DeviceStatus::new());
        let (producer, consumer) = pcm_ring(SampleFormat::U8, 1, 4).unwrap();
        let mut sink = CaptureSink::new(producer, Arc::clone(&status));

        assert_eq!(sink.push(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(status.stats().overflow_frames, 2);
        assert_eq!(consumer.available_read(), 4);
    }
}
