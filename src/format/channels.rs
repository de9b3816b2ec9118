//! Channel count conversion.
//!
//! Simple mixing rules: mono is copied to every output channel, anything is
//! averaged down to mono, and otherwise channels are mapped by position with
//! extra input channels dropped and extra output channels silent.

use super::{PcmBuffer, SampleSlice};
use crate::GaudioError;

/// Sample types that can be mixed without changing representation.
trait MixSample: Copy {
    const SILENCE: Self;

    fn average(frame: &[Self]) -> Self;
}

impl MixSample for u8 {
    const SILENCE: Self = 0x80;

    fn average(frame: &[Self]) -> Self {
        let sum: u32 = frame.iter().map(|&s| u32::from(s)).sum();
        (sum / frame.len() as u32) as u8
    }
}

impl MixSample for i16 {
    const SILENCE: Self = 0;

    fn average(frame: &[Self]) -> Self {
        let sum: i64 = frame.iter().map(|&s| i64::from(s)).sum();
        (sum / frame.len() as i64) as i16
    }
}

impl MixSample for i32 {
    const SILENCE: Self = 0;

    fn average(frame: &[Self]) -> Self {
        let sum: i64 = frame.iter().map(|&s| i64::from(s)).sum();
        (sum / frame.len() as i64) as i32
    }
}

impl MixSample for f32 {
    const SILENCE: Self = 0.0;

    fn average(frame: &[Self]) -> Self {
        frame.iter().sum::<f32>() / frame.len() as f32
    }
}

impl MixSample for f64 {
    const SILENCE: Self = 0.0;

    fn average(frame: &[Self]) -> Self {
        frame.iter().sum::<f64>() / frame.len() as f64
    }
}

fn remix_frames<T: MixSample>(src: &[T], from: usize, to: usize) -> Vec<T> {
    let frames = src.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in src.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(T::average(frame));
        } else {
            out.extend((0..to).map(|ch| frame.get(ch).copied().unwrap_or(T::SILENCE)));
        }
    }

    out
}

/// Converts interleaved samples from `from` channels to `to` channels.
///
/// The sample format is preserved.
///
/// # Errors
///
/// Returns `InvalidArgument` if either channel count is zero or the sample
/// count is not a whole number of `from`-channel frames.
pub fn remix(src: SampleSlice<'_>, from: u16, to: u16) -> Result<PcmBuffer, GaudioError> {
    if from == 0 || to == 0 {
        return Err(GaudioError::invalid_argument("channel count must be non-zero"));
    }
    if src.len() % usize::from(from) != 0 {
        return Err(GaudioError::invalid_argument(format!(
            "{} samples is not a whole number of {from}-channel frames",
            src.len()
        )));
    }

    let (from, to) = (usize::from(from), usize::from(to));
    Ok(match src {
        SampleSlice::U8(s) => PcmBuffer::U8(remix_frames(s, from, to)),
        SampleSlice::I16(s) => PcmBuffer::I16(remix_frames(s, from, to)),
        SampleSlice::I32(s) => PcmBuffer::I32(remix_frames(s, from, to)),
        SampleSlice::F32(s) => PcmBuffer::F32(remix_frames(s, from, to)),
        SampleSlice::F64(s) => PcmBuffer::F64(remix_frames(s, from, to)),
    })
}
