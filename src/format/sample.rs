//! PCM sample representations and interleaved buffers.

use crate::GaudioError;

/// Supported PCM sample representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 128.
    U8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// 32-bit float in `[-1, 1]`.
    F32,
    /// 64-bit float in `[-1, 1]`.
    F64,
}

impl SampleFormat {
    /// Maps a boundary type code (1 = u8, 2 = i16, 3 = i32, 4 = f32, 5 = f64).
    ///
    /// # Errors
    ///
    /// Returns `InvalidType` for any other code.
    pub fn from_code(code: u16) -> Result<Self, GaudioError> {
        match code {
            1 => Ok(Self::U8),
            2 => Ok(Self::I16),
            3 => Ok(Self::I32),
            4 => Ok(Self::F32),
            5 => Ok(Self::F64),
            _ => Err(GaudioError::InvalidType { code }),
        }
    }

    /// Returns the boundary type code for this format.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 => 3,
            Self::F32 => 4,
            Self::F64 => 5,
        }
    }

    /// Size of one sample in bytes.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Size of one frame of `channels` samples in bytes.
    #[must_use]
    pub const fn bytes_per_frame(self, channels: u16) -> usize {
        self.bytes_per_sample() * channels as usize
    }

    /// Byte value that encodes silence in every byte of a sample.
    #[must_use]
    pub const fn silence_byte(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0,
        }
    }

    /// Returns `true` for the floating-point formats.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// Borrowed interleaved samples of one format.
#[derive(Debug, Clone, Copy)]
pub enum SampleSlice<'a> {
    /// Unsigned 8-bit samples.
    U8(&'a [u8]),
    /// Signed 16-bit samples.
    I16(&'a [i16]),
    /// Signed 32-bit samples.
    I32(&'a [i32]),
    /// 32-bit float samples.
    F32(&'a [f32]),
    /// 64-bit float samples.
    F64(&'a [f64]),
}

impl SampleSlice<'_> {
    /// Returns the sample format.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::U8(_) => SampleFormat::U8,
            Self::I16(_) => SampleFormat::I16,
            Self::I32(_) => SampleFormat::I32,
            Self::F32(_) => SampleFormat::F32,
            Self::F64(_) => SampleFormat::F64,
        }
    }

    /// Returns the number of samples (not frames).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::I16(s) => s.len(),
            Self::I32(s) => s.len(),
            Self::F32(s) => s.len(),
            Self::F64(s) => s.len(),
        }
    }

    /// Returns `true` if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Views the samples as native-endian bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match *self {
            Self::U8(s) => s,
            Self::I16(s) => bytemuck::cast_slice(s),
            Self::I32(s) => bytemuck::cast_slice(s),
            Self::F32(s) => bytemuck::cast_slice(s),
            Self::F64(s) => bytemuck::cast_slice(s),
        }
    }
}

impl<'a> From<&'a [u8]> for SampleSlice<'a> {
    fn from(samples: &'a [u8]) -> Self {
        Self::U8(samples)
    }
}

impl<'a> From<&'a [i16]> for SampleSlice<'a> {
    fn from(samples: &'a [i16]) -> Self {
        Self::I16(samples)
    }
}

impl<'a> From<&'a [i32]> for SampleSlice<'a> {
    fn from(samples: &'a [i32]) -> Self {
        Self::I32(samples)
    }
}

impl<'a> From<&'a [f32]> for SampleSlice<'a> {
    fn from(samples: &'a [f32]) -> Self {
        Self::F32(samples)
    }
}

impl<'a> From<&'a [f64]> for SampleSlice<'a> {
    fn from(samples: &'a [f64]) -> Self {
        Self::F64(samples)
    }
}

/// Mutable interleaved samples of one format, used as a conversion target.
#[derive(Debug)]
pub enum SampleSliceMut<'a> {
    /// Unsigned 8-bit samples.
    U8(&'a mut [u8]),
    /// Signed 16-bit samples.
    I16(&'a mut [i16]),
    /// Signed 32-bit samples.
    I32(&'a mut [i32]),
    /// 32-bit float samples.
    F32(&'a mut [f32]),
    /// 64-bit float samples.
    F64(&'a mut [f64]),
}

impl SampleSliceMut<'_> {
    /// Returns the sample format.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::U8(_) => SampleFormat::U8,
            Self::I16(_) => SampleFormat::I16,
            Self::I32(_) => SampleFormat::I32,
            Self::F32(_) => SampleFormat::F32,
            Self::F64(_) => SampleFormat::F64,
        }
    }

    /// Returns the number of samples (not frames).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::I16(s) => s.len(),
            Self::I32(s) => s.len(),
            Self::F32(s) => s.len(),
            Self::F64(s) => s.len(),
        }
    }

    /// Returns `true` if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned interleaved samples of one format.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmBuffer {
    /// Unsigned 8-bit samples.
    U8(Vec<u8>),
    /// Signed 16-bit samples.
    I16(Vec<i16>),
    /// Signed 32-bit samples.
    I32(Vec<i32>),
    /// 32-bit float samples.
    F32(Vec<f32>),
    /// 64-bit float samples.
    F64(Vec<f64>),
}

impl PcmBuffer {
    /// Allocates `samples` samples of silence in `format`.
    #[must_use]
    pub fn silence(format: SampleFormat, samples: usize) -> Self {
        match format {
            SampleFormat::U8 => Self::U8(vec![0x80; samples]),
            SampleFormat::I16 => Self::I16(vec![0; samples]),
            SampleFormat::I32 => Self::I32(vec![0; samples]),
            SampleFormat::F32 => Self::F32(vec![0.0; samples]),
            SampleFormat::F64 => Self::F64(vec![0.0; samples]),
        }
    }

    /// Returns an empty buffer of `format`.
    #[must_use]
    pub fn empty(format: SampleFormat) -> Self {
        Self::silence(format, 0)
    }

    /// Returns the sample format.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        self.as_slice().format()
    }

    /// Returns the number of samples (not frames).
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the samples.
    #[must_use]
    pub fn as_slice(&self) -> SampleSlice<'_> {
        match self {
            Self::U8(v) => SampleSlice::U8(v),
            Self::I16(v) => SampleSlice::I16(v),
            Self::I32(v) => SampleSlice::I32(v),
            Self::F32(v) => SampleSlice::F32(v),
            Self::F64(v) => SampleSlice::F64(v),
        }
    }

    /// Borrows the samples mutably.
    pub fn as_mut_slice(&mut self) -> SampleSliceMut<'_> {
        match self {
            Self::U8(v) => SampleSliceMut::U8(v),
            Self::I16(v) => SampleSliceMut::I16(v),
            Self::I32(v) => SampleSliceMut::I32(v),
            Self::F32(v) => SampleSliceMut::F32(v),
            Self::F64(v) => SampleSliceMut::F64(v),
        }
    }

    /// Views the samples as native-endian bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U8(v) => v.as_slice(),
            Self::I16(v) => bytemuck::cast_slice(v),
            Self::I32(v) => bytemuck::cast_slice(v),
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::F64(v) => bytemuck::cast_slice(v),
        }
    }

    /// Views the samples as mutable native-endian bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::U8(v) => v.as_mut_slice(),
            Self::I16(v) => bytemuck::cast_slice_mut(v),
            Self::I32(v) => bytemuck::cast_slice_mut(v),
            Self::F32(v) => bytemuck::cast_slice_mut(v),
            Self::F64(v) => bytemuck::cast_slice_mut(v),
        }
    }

    /// Shortens the buffer to `samples` samples.
    pub fn truncate(&mut self, samples: usize) {
        match self {
            Self::U8(v) => v.truncate(samples),
            Self::I16(v) => v.truncate(samples),
            Self::I32(v) => v.truncate(samples),
            Self::F32(v) => v.truncate(samples),
            Self::F64(v) => v.truncate(samples),
        }
    }

    /// Removes the first `samples` samples (at most all of them) and returns
    /// them as a new buffer.
    pub fn drain_front(&mut self, samples: usize) -> PcmBuffer {
        let n = samples.min(self.len());
        match self {
            Self::U8(v) => Self::U8(v.drain(..n).collect()),
            Self::I16(v) => Self::I16(v.drain(..n).collect()),
            Self::I32(v) => Self::I32(v.drain(..n).collect()),
            Self::F32(v) => Self::F32(v.drain(..n).collect()),
            Self::F64(v) => Self::F64(v.drain(..n).collect()),
        }
    }

    /// Appends the samples of `other`, which must have the same format.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the formats differ.
    pub fn extend_from(&mut self, other: &PcmBuffer) -> Result<(), GaudioError> {
        match (self, other) {
            (Self::U8(a), Self::U8(b)) => a.extend_from_slice(b),
            (Self::I16(a), Self::I16(b)) => a.extend_from_slice(b),
            (Self::I32(a), Self::I32(b)) => a.extend_from_slice(b),
            (Self::F32(a), Self::F32(b)) => a.extend_from_slice(b),
            (Self::F64(a), Self::F64(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(GaudioError::invalid_argument(format!(
                    "cannot append {:?} samples to a {:?} buffer",
                    other.format(),
                    this.format()
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes_roundtrip() {
        for format in [
            SampleFormat::U8,
            SampleFormat::I16,
            SampleFormat::I32,
            SampleFormat::F32,
            SampleFormat::F64,
        ] {
            assert_eq!(SampleFormat::from_code(format.code()).unwrap(), format);
        }
    }

    #[test]
    fn test_unknown_format_code_is_invalid_type() {
        let err = SampleFormat::from_code(9).unwrap_err();
        assert!(matches!(err, GaudioError::InvalidType { code: 9 }));
        assert_eq!(err.code(), crate::error::codes::INVALID_TYPE);
    }

    #[test]
    fn test_bytes_per_frame() {
        assert_eq!(SampleFormat::I16.bytes_per_frame(2), 4);
        assert_eq!(SampleFormat::F64.bytes_per_frame(6), 48);
        assert_eq!(SampleFormat::U8.bytes_per_frame(1), 1);
    }

    #[test]
    fn test_u8_silence_is_midpoint() {
        let buffer = PcmBuffer::silence(SampleFormat::U8, 4);
        assert_eq!(buffer, PcmBuffer::U8(vec![128; 4]));
        assert!(buffer
            .as_bytes()
            .iter()
            .all(|&b| b == SampleFormat::U8.silence_byte()));
    }

    #[test]
    fn test_as_bytes_length() {
        let samples = [1i16, -1, 2];
        let slice = SampleSlice::from(&samples[..]);
        assert_eq!(slice.as_bytes().len(), 6);
        assert_eq!(slice.format(), SampleFormat::I16);
    }

    #[test]
    fn test_drain_front_splits_buffer() {
        let mut buffer = PcmBuffer::F64(vec![0.1, 0.2, 0.3]);
        assert_eq!(buffer.drain_front(2), PcmBuffer::F64(vec![0.1, 0.2]));
        assert_eq!(buffer, PcmBuffer::F64(vec![0.3]));
        assert_eq!(buffer.drain_front(5), PcmBuffer::F64(vec![0.3]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_extend_rejects_mixed_formats() {
        let mut buffer = PcmBuffer::I16(vec![1, 2]);
        buffer.extend_from(&PcmBuffer::I16(vec![3])).unwrap();
        assert_eq!(buffer, PcmBuffer::I16(vec![1, 2, 3]));
        assert!(buffer.extend_from(&PcmBuffer::F32(vec![0.5])).is_err());
    }
}
