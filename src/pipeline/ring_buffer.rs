//! PCM ring buffer with acquire/commit access on both sides.
//!
//! The ring stores raw bytes but is addressed in frames: every cursor moves by
//! whole frames, so each contiguous region handed out is frame-aligned.
//! One [`PcmProducer`] and one [`PcmConsumer`] exist per ring and may live on
//! different threads; neither side locks.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::format::SampleFormat;
use crate::GaudioError;

/// Creates a ring holding `capacity_frames` frames of `channels` samples each.
///
/// # Errors
///
/// Returns `InvalidArgument` for a zero capacity or channel count, and
/// `MemoryError` if the byte size does not fit in memory.
pub fn pcm_ring(
    format: SampleFormat,
    channels: u16,
    capacity_frames: usize,
) -> Result<(PcmProducer, PcmConsumer), GaudioError> {
    if capacity_frames == 0 {
        return Err(GaudioError::invalid_argument("ring capacity must be at least one frame"));
    }
    if channels == 0 {
        return Err(GaudioError::invalid_argument("ring needs at least one channel"));
    }

    let stride = format.bytes_per_frame(channels);
    let bytes = capacity_frames
        .checked_mul(stride)
        .filter(|&b| b <= isize::MAX as usize)
        .ok_or(GaudioError::MemoryError)?;

    let (producer, consumer) = HeapRb::<u8>::new(bytes).split();
    Ok((
        PcmProducer {
            inner: producer,
            stride,
            capacity: capacity_frames,
        },
        PcmConsumer {
            inner: consumer,
            stride,
            capacity: capacity_frames,
            silence: format.silence_byte(),
        },
    ))
}

/// Write side of a PCM ring.
pub struct PcmProducer {
    inner: HeapProd<u8>,
    stride: usize,
    capacity: usize,
}

impl PcmProducer {
    /// Ring capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    /// Bytes per frame.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Frames that can be written right now.
    pub fn available_write(&self) -> usize {
        self.inner.vacant_len() / self.stride
    }

    /// Frames waiting to be read.
    pub fn available_read(&self) -> usize {
        self.inner.occupied_len() / self.stride
    }

    /// Reserves up to `frames` frames of contiguous space.
    ///
    /// Never blocks; the grant is empty when the ring is full. Only one grant
    /// can be outstanding because it borrows the producer.
    pub fn acquire_write(&mut self, frames: usize) -> WriteGrant<'_> {
        let contiguous = self.inner.vacant_slices_mut().0.len() / self.stride;
        WriteGrant {
            frames: frames.min(contiguous),
            filled: 0,
            producer: self,
        }
    }

    /// Copies as many whole frames of `bytes` as fit, wrapping as needed.
    ///
    /// Returns the number of frames written. Safe to call from a real-time
    /// thread: no allocation, no locking.
    pub fn push_frames(&mut self, bytes: &[u8]) -> usize {
        let stride = self.stride;
        let mut frames_total = bytes.len() / stride;
        let mut written = 0;

        while frames_total > 0 {
            let mut grant = self.acquire_write(frames_total);
            if grant.frames() == 0 {
                break;
            }
            let copied = grant.write(&bytes[written * stride..]);
            // A grant never rejects the frames it just filled
            let _ = grant.commit(copied);
            written += copied;
            frames_total -= copied;
        }

        written
    }
}

/// Reserved write space handed out by [`PcmProducer::acquire_write`].
///
/// Dropping a grant without committing commits nothing.
pub struct WriteGrant<'a> {
    producer: &'a mut PcmProducer,
    frames: usize,
    filled: usize,
}

impl WriteGrant<'_> {
    /// Frames reserved by this grant.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Frames filled so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Copies whole frames from `bytes` into the reserved space after any
    /// frames already written, returning how many frames were copied.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let stride = self.producer.stride;
        let frames = (bytes.len() / stride).min(self.frames - self.filled);
        let start = self.filled * stride;
        let len = frames * stride;

        let region = self.producer.inner.vacant_slices_mut().0;
        for (slot, &byte) in region[start..start + len].iter_mut().zip(&bytes[..len]) {
            slot.write(byte);
        }

        self.filled += frames;
        frames
    }

    /// Publishes the first `frames` written frames to the consumer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `frames` exceeds what was granted or
    /// written; nothing is published in that case.
    #[allow(unsafe_code)]
    pub fn commit(self, frames: usize) -> Result<(), GaudioError> {
        if frames > self.frames || frames > self.filled {
            return Err(GaudioError::invalid_argument(format!(
                "commit of {frames} frames exceeds grant of {} ({} written)",
                self.frames, self.filled
            )));
        }
        if frames > 0 {
            // SAFETY: `write` initialized `filled * stride` bytes at the start
            // of the vacant region, and `frames <= filled`.
            unsafe {
                self.producer
                    .inner
                    .advance_write_index(frames * self.producer.stride);
            }
        }
        Ok(())
    }
}

/// Read side of a PCM ring.
pub struct PcmConsumer {
    inner: HeapCons<u8>,
    stride: usize,
    capacity: usize,
    silence: u8,
}

impl PcmConsumer {
    /// Ring capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    /// Bytes per frame.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Byte value of silence in the ring's sample format.
    pub fn silence_byte(&self) -> u8 {
        self.silence
    }

    /// Frames waiting to be read.
    pub fn available_read(&self) -> usize {
        self.inner.occupied_len() / self.stride
    }

    /// Frames that can be written right now.
    pub fn available_write(&self) -> usize {
        self.inner.vacant_len() / self.stride
    }

    /// Exposes up to `frames` frames of contiguous readable data.
    pub fn acquire_read(&mut self, frames: usize) -> ReadGrant<'_> {
        let contiguous = self.inner.as_slices().0.len() / self.stride;
        ReadGrant {
            frames: frames.min(contiguous),
            consumer: self,
        }
    }

    /// Moves as many whole frames as fit into `out`, wrapping as needed.
    ///
    /// Returns the number of frames read. Safe to call from a real-time
    /// thread: no allocation, no locking.
    pub fn pop_frames(&mut self, out: &mut [u8]) -> usize {
        let stride = self.stride;
        let mut frames_total = out.len() / stride;
        let mut read = 0;

        while frames_total > 0 {
            let grant = self.acquire_read(frames_total);
            let frames = grant.frames();
            if frames == 0 {
                break;
            }
            let len = frames * stride;
            let start = read * stride;
            out[start..start + len].copy_from_slice(grant.bytes());
            let _ = grant.commit(frames);
            read += frames;
            frames_total -= frames;
        }

        read
    }
}

/// Readable data handed out by [`PcmConsumer::acquire_read`].
///
/// Dropping a grant without committing leaves the data in the ring.
pub struct ReadGrant<'a> {
    consumer: &'a mut PcmConsumer,
    frames: usize,
}

impl ReadGrant<'_> {
    /// Frames exposed by this grant.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The exposed frames as bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.consumer.inner.as_slices().0[..self.frames * self.consumer.stride]
    }

    /// Releases the first `frames` frames back to the producer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `frames` exceeds the grant; nothing is
    /// released in that case.
    pub fn commit(self, frames: usize) -> Result<(), GaudioError> {
        if frames > self.frames {
            return Err(GaudioError::invalid_argument(format!(
                "commit of {frames} frames exceeds grant of {}",
                self.frames
            )));
        }
        self.consumer.inner.skip(frames * self.consumer.stride);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(values: &[i16]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(pcm_ring(SampleFormat::I16, 2, 0).is_err());
        assert!(pcm_ring(SampleFormat::I16, 0, 16).is_err());
    }

    #[test]
    fn test_new_ring_is_empty() {
        let (producer, consumer) = pcm_ring(SampleFormat::F32, 2, 64).unwrap();
        assert_eq!(producer.available_write(), 64);
        assert_eq!(consumer.available_read(), 0);
        assert_eq!(producer.stride(), 8);
    }

    #[test]
    fn test_acquire_commit_roundtrip() {
        let (mut producer, mut consumer) = pcm_ring(SampleFormat::I16, 1, 8).unwrap();

        let mut grant = producer.acquire_write(4);
        assert_eq!(grant.frames(), 4);
        assert_eq!(grant.write(&frame_bytes(&[1, 2, 3, 4])), 4);
        grant.commit(4).unwrap();

        let grant = consumer.acquire_read(8);
        assert_eq!(grant.frames(), 4);
        assert_eq!(grant.bytes(), frame_bytes(&[1, 2, 3, 4]).as_slice());
        grant.commit(4).unwrap();
        assert_eq!(consumer.available_read(), 0);
    }

    #[test]
    fn test_grant_is_clamped_when_full() {
        let (mut producer, _consumer) = pcm_ring(SampleFormat::U8, 1, 4).unwrap();
        assert_eq!(producer.push_frames(&[1, 2, 3, 4]), 4);

        let grant = producer.acquire_write(2);
        assert_eq!(grant.frames(), 0);
        grant.commit(0).unwrap();
    }

    #[test]
    fn test_over_commit_is_rejected() {
        let (mut producer, consumer) = pcm_ring(SampleFormat::I16, 1, 8).unwrap();

        let mut grant = producer.acquire_write(2);
        grant.write(&frame_bytes(&[7, 8]));
        assert!(grant.commit(3).is_err());
        assert_eq!(consumer.available_read(), 0);

        let grant = producer.acquire_write(4);
        // Granted but never written
        assert!(grant.commit(1).is_err());
        assert_eq!(producer.available_read(), 0);
    }

    #[test]
    fn test_read_over_commit_is_rejected() {
        let (mut producer, mut consumer) = pcm_ring(SampleFormat::I16, 1, 8).unwrap();
        producer.push_frames(&frame_bytes(&[1, 2]));

        let grant = consumer.acquire_read(8);
        assert_eq!(grant.frames(), 2);
        assert!(grant.commit(3).is_err());
        assert_eq!(consumer.available_read(), 2);
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let (mut producer, mut consumer) = pcm_ring(SampleFormat::I16, 2, 4).unwrap();
        let mut out = vec![0u8; 4 * 4];

        producer.push_frames(&frame_bytes(&[1, 1, 2, 2, 3, 3]));
        assert_eq!(consumer.pop_frames(&mut out[..8]), 2);

        // Wraps past the end of storage
        assert_eq!(producer.push_frames(&frame_bytes(&[4, 4, 5, 5, 6, 6])), 3);
        assert_eq!(consumer.pop_frames(&mut out), 4);
        assert_eq!(out, frame_bytes(&[3, 3, 4, 4, 5, 5, 6, 6]));
    }

    #[test]
    fn test_partial_frames_are_ignored() {
        let (mut producer, consumer) = pcm_ring(SampleFormat::I16, 2, 4).unwrap();
        // 6 bytes is one and a half stereo frames
        assert_eq!(producer.push_frames(&[0u8; 6]), 1);
        assert_eq!(consumer.available_read(), 1);
    }

    #[test]
    fn test_available_sum_equals_capacity() {
        let (mut producer, mut consumer) = pcm_ring(SampleFormat::I32, 2, 32).unwrap();
        let chunk = vec![0u8; 8 * 7];
        let mut sink = vec![0u8; 8 * 5];

        for _ in 0..20 {
            producer.push_frames(&chunk);
            assert_eq!(
                producer.available_read() + producer.available_write(),
                producer.capacity_frames()
            );
            consumer.pop_frames(&mut sink);
            assert_eq!(
                consumer.available_read() + consumer.available_write(),
                consumer.capacity_frames()
            );
        }
    }

    #[test]
    fn test_spsc_across_threads_delivers_in_order() {
        const TOTAL: i16 = 5000;
        let (mut producer, mut consumer) = pcm_ring(SampleFormat::I16, 1, 64).unwrap();

        let writer = std::thread::spawn(move || {
            let samples: Vec<i16> = (0..TOTAL).collect();
            let bytes = frame_bytes(&samples);
            let mut offset = 0;
            while offset < bytes.len() {
                offset += producer.push_frames(&bytes[offset..]) * 2;
                std::thread::yield_now();
            }
        });

        let mut received = Vec::with_capacity(TOTAL as usize);
        let mut buf = vec![0u8; 2 * 16];
        while received.len() < TOTAL as usize {
            let frames = consumer.pop_frames(&mut buf);
            received.extend(bytemuck::cast_slice::<u8, i16>(&buf[..frames * 2]).iter().copied());
            std::thread::yield_now();
        }
        writer.join().unwrap();

        assert!(received.iter().copied().eq(0..TOTAL));
    }
}
