//! Sample format conversion.
//!
//! Every conversion uses fixed-point constants rather than generic scaling so
//! results are bit-identical to the reference codecs. Integer widenings are
//! exact; narrowing and float quantizing paths lose at most one LSB.

use super::{PcmBuffer, SampleFormat, SampleSlice, SampleSliceMut};
use crate::GaudioError;

/// Scale from an unsigned 8-bit value (0..=255) to 0..=2.
const U8_TO_FLOAT: f64 = 0.007_843_137_254_901_960_78;
/// Scale from a signed 16-bit value to `[-1, 1)`.
const I16_TO_FLOAT: f64 = 0.000_030_517_578_125;
/// Divisor from a signed 32-bit value to `[-1, 1)`.
const I32_DIVISOR: f64 = 2_147_483_648.0;

/// Converts an unsigned 8-bit sample to signed 16-bit.
#[inline]
pub fn u8_to_i16(sample: u8) -> i16 {
    ((i32::from(sample) << 8) - 32768) as i16
}

/// Converts an unsigned 8-bit sample to signed 32-bit.
#[inline]
pub fn u8_to_i32(sample: u8) -> i32 {
    ((i64::from(sample) << 24) - 2_147_483_648) as i32
}

/// Converts an unsigned 8-bit sample to f32.
#[inline]
pub fn u8_to_f32(sample: u8) -> f32 {
    f32::from(sample) * U8_TO_FLOAT as f32 - 1.0
}

/// Converts an unsigned 8-bit sample to f64.
#[inline]
pub fn u8_to_f64(sample: u8) -> f64 {
    f64::from(sample) * U8_TO_FLOAT - 1.0
}

/// Converts a signed 16-bit sample to unsigned 8-bit.
#[inline]
pub fn i16_to_u8(sample: i16) -> u8 {
    ((i32::from(sample) + 32768) >> 8) as u8
}

/// Converts a signed 16-bit sample to signed 32-bit.
#[inline]
pub fn i16_to_i32(sample: i16) -> i32 {
    i32::from(sample) << 16
}

/// Converts a signed 16-bit sample to f32.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) * I16_TO_FLOAT as f32
}

/// Converts a signed 16-bit sample to f64.
#[inline]
pub fn i16_to_f64(sample: i16) -> f64 {
    f64::from(sample) * I16_TO_FLOAT
}

/// Converts a signed 32-bit sample to unsigned 8-bit.
#[inline]
pub fn i32_to_u8(sample: i32) -> u8 {
    ((i64::from(sample) + 2_147_483_648) >> 24) as u8
}

/// Converts a signed 32-bit sample to signed 16-bit.
#[inline]
pub fn i32_to_i16(sample: i32) -> i16 {
    (sample >> 16) as i16
}

/// Converts a signed 32-bit sample to f32.
#[inline]
pub fn i32_to_f32(sample: i32) -> f32 {
    sample as f32 / I32_DIVISOR as f32
}

/// Converts a signed 32-bit sample to f64.
#[inline]
pub fn i32_to_f64(sample: i32) -> f64 {
    f64::from(sample) / I32_DIVISOR
}

/// Converts an f32 sample to unsigned 8-bit.
///
/// Values outside [-1.0, 1.0] are clamped.
#[inline]
pub fn f32_to_u8(sample: f32) -> u8 {
    ((sample.clamp(-1.0, 1.0) + 1.0) * 127.5) as u8
}

/// Converts an f32 sample to signed 16-bit.
///
/// Values outside [-1.0, 1.0] are clamped, then the range is re-biased so
/// -1.0 maps to -32768 and 1.0 to 32767.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (((sample.clamp(-1.0, 1.0) + 1.0) * 32767.5) as i32 - 32768) as i16
}

/// Converts an f32 sample to signed 32-bit.
///
/// Values outside [-1.0, 1.0] are clamped. The scaling runs in f64 since f32
/// cannot represent the 32-bit range.
#[inline]
pub fn f32_to_i32(sample: f32) -> i32 {
    f64_to_i32(f64::from(sample))
}

/// Converts an f64 sample to unsigned 8-bit.
#[inline]
pub fn f64_to_u8(sample: f64) -> u8 {
    ((sample.clamp(-1.0, 1.0) + 1.0) * 127.5) as u8
}

/// Converts an f64 sample to signed 16-bit.
#[inline]
pub fn f64_to_i16(sample: f64) -> i16 {
    (((sample.clamp(-1.0, 1.0) + 1.0) * 32767.5) as i32 - 32768) as i16
}

/// Converts an f64 sample to signed 32-bit.
#[inline]
pub fn f64_to_i32(sample: f64) -> i32 {
    (((sample.clamp(-1.0, 1.0) + 1.0) * 2_147_483_647.5) as i64 - 2_147_483_648) as i32
}

#[inline]
fn map_into<S: Copy, D>(src: &[S], dst: &mut [D], convert: impl Fn(S) -> D) {
    for (out, &sample) in dst.iter_mut().zip(src) {
        *out = convert(sample);
    }
}

/// Converts `src` into the caller-supplied `dst`, which fixes the target format.
///
/// # Errors
///
/// Returns `InvalidArgument` if the two buffers hold a different number of
/// samples.
pub fn convert_into(src: SampleSlice<'_>, dst: SampleSliceMut<'_>) -> Result<(), GaudioError> {
    if src.len() != dst.len() {
        return Err(GaudioError::invalid_argument(format!(
            "conversion needs equal lengths, got {} and {}",
            src.len(),
            dst.len()
        )));
    }

    match (src, dst) {
        (SampleSlice::U8(s), SampleSliceMut::U8(d)) => d.copy_from_slice(s),
        (SampleSlice::U8(s), SampleSliceMut::I16(d)) => map_into(s, d, u8_to_i16),
        (SampleSlice::U8(s), SampleSliceMut::I32(d)) => map_into(s, d, u8_to_i32),
        (SampleSlice::U8(s), SampleSliceMut::F32(d)) => map_into(s, d, u8_to_f32),
        (SampleSlice::U8(s), SampleSliceMut::F64(d)) => map_into(s, d, u8_to_f64),

        (SampleSlice::I16(s), SampleSliceMut::U8(d)) => map_into(s, d, i16_to_u8),
        (SampleSlice::I16(s), SampleSliceMut::I16(d)) => d.copy_from_slice(s),
        (SampleSlice::I16(s), SampleSliceMut::I32(d)) => map_into(s, d, i16_to_i32),
        (SampleSlice::I16(s), SampleSliceMut::F32(d)) => map_into(s, d, i16_to_f32),
        (SampleSlice::I16(s), SampleSliceMut::F64(d)) => map_into(s, d, i16_to_f64),

        (SampleSlice::I32(s), SampleSliceMut::U8(d)) => map_into(s, d, i32_to_u8),
        (SampleSlice::I32(s), SampleSliceMut::I16(d)) => map_into(s, d, i32_to_i16),
        (SampleSlice::I32(s), SampleSliceMut::I32(d)) => d.copy_from_slice(s),
        (SampleSlice::I32(s), SampleSliceMut::F32(d)) => map_into(s, d, i32_to_f32),
        (SampleSlice::I32(s), SampleSliceMut::F64(d)) => map_into(s, d, i32_to_f64),

        (SampleSlice::F32(s), SampleSliceMut::U8(d)) => map_into(s, d, f32_to_u8),
        (SampleSlice::F32(s), SampleSliceMut::I16(d)) => map_into(s, d, f32_to_i16),
        (SampleSlice::F32(s), SampleSliceMut::I32(d)) => map_into(s, d, f32_to_i32),
        (SampleSlice::F32(s), SampleSliceMut::F32(d)) => d.copy_from_slice(s),
        (SampleSlice::F32(s), SampleSliceMut::F64(d)) => map_into(s, d, f64::from),

        (SampleSlice::F64(s), SampleSliceMut::U8(d)) => map_into(s, d, f64_to_u8),
        (SampleSlice::F64(s), SampleSliceMut::I16(d)) => map_into(s, d, f64_to_i16),
        (SampleSlice::F64(s), SampleSliceMut::I32(d)) => map_into(s, d, f64_to_i32),
        (SampleSlice::F64(s), SampleSliceMut::F32(d)) => map_into(s, d, |x| x as f32),
        (SampleSlice::F64(s), SampleSliceMut::F64(d)) => d.copy_from_slice(s),
    }

    Ok(())
}

/// Converts `src` into a newly allocated buffer of `format`.
#[must_use]
pub fn convert(src: SampleSlice<'_>, format: SampleFormat) -> PcmBuffer {
    let mut out = PcmBuffer::silence(format, src.len());
    // Lengths match by construction
    let _ = convert_into(src, out.as_mut_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_to_i16_endpoints() {
        assert_eq!(u8_to_i16(0), -32768);
        assert_eq!(u8_to_i16(128), 0);
        assert_eq!(u8_to_i16(255), 32512);
    }

    #[test]
    fn test_u8_to_i32_endpoints() {
        assert_eq!(u8_to_i32(0), i32::MIN);
        assert_eq!(u8_to_i32(128), 0);
        assert_eq!(u8_to_i32(255), 0x7F00_0000);
    }

    #[test]
    fn test_u8_to_float_range() {
        assert_eq!(u8_to_f64(0), -1.0);
        assert!((u8_to_f64(255) - 1.0).abs() < 1e-12);
        assert!((u8_to_f32(255) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_i16_to_u8_rebias() {
        assert_eq!(i16_to_u8(i16::MIN), 0);
        assert_eq!(i16_to_u8(0), 128);
        assert_eq!(i16_to_u8(i16::MAX), 255);
    }

    #[test]
    fn test_i16_i32_shift() {
        assert_eq!(i16_to_i32(1), 65536);
        assert_eq!(i16_to_i32(-1), -65536);
        assert_eq!(i32_to_i16(-65536), -1);
        // Arithmetic shift floors toward negative infinity
        assert_eq!(i32_to_i16(-1), -1);
    }

    #[test]
    fn test_i16_to_f32_full_range() {
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert_eq!(i16_to_f32(0), 0.0);
        assert!((i16_to_f32(i16::MAX) - 0.999_97).abs() < 0.001);
    }

    #[test]
    fn test_i32_to_float_range() {
        assert_eq!(i32_to_f64(i32::MIN), -1.0);
        assert_eq!(i32_to_f32(0), 0.0);
        assert!(i32_to_f64(i32::MAX) < 1.0);
    }

    #[test]
    fn test_float_to_int_endpoints() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(f64_to_i16(1.0), 32767);
        assert_eq!(f64_to_i16(-1.0), -32768);
        assert_eq!(f32_to_u8(-1.0), 0);
        assert_eq!(f32_to_u8(1.0), 255);
        assert_eq!(f64_to_i32(-1.0), i32::MIN);
        assert_eq!(f64_to_i32(1.0), i32::MAX);
        assert_eq!(f32_to_i32(1.0), i32::MAX);
    }

    #[test]
    fn test_float_clamping() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
        assert_eq!(f64_to_u8(7.5), 255);
        assert_eq!(f64_to_u8(-7.5), 0);
    }

    #[test]
    fn test_u8_i16_roundtrip_is_exact() {
        for original in 0..=255u8 {
            assert_eq!(i16_to_u8(u8_to_i16(original)), original);
        }
    }

    #[test]
    fn test_i16_i32_roundtrip_is_exact() {
        for &original in &[i16::MIN, -1000, -1, 0, 1, 1000, i16::MAX] {
            assert_eq!(i32_to_i16(i16_to_i32(original)), original);
        }
    }

    #[test]
    fn test_i16_float_roundtrip_within_one_lsb() {
        for original in (i16::MIN..=i16::MAX).step_by(97) {
            let back = f32_to_i16(i16_to_f32(original));
            assert!((i32::from(original) - i32::from(back)).abs() <= 1, "{original} -> {back}");

            let back = f64_to_i16(i16_to_f64(original));
            assert!((i32::from(original) - i32::from(back)).abs() <= 1, "{original} -> {back}");
        }
    }

    #[test]
    fn test_u8_float_roundtrip_within_one_lsb() {
        for original in 0..=255u8 {
            let back = f64_to_u8(u8_to_f64(original));
            assert!((i16::from(original) - i16::from(back)).abs() <= 1);
        }
    }

    #[test]
    fn test_f32_f64_plain_cast() {
        let src = [0.25f32, -0.5, 1.5];
        let out = convert(SampleSlice::F32(&src), SampleFormat::F64);
        assert_eq!(out, PcmBuffer::F64(vec![0.25, -0.5, 1.5]));
    }

    #[test]
    fn test_convert_into_rejects_length_mismatch() {
        let src = [1i16, 2, 3];
        let mut dst = [0.0f32; 2];
        let result = convert_into(SampleSlice::I16(&src), SampleSliceMut::F32(&mut dst));
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_conversion() {
        let src = [0.0f32, 0.5, -0.5, 1.0];
        let out = convert(SampleSlice::F32(&src), SampleFormat::I16);

        assert_eq!(out, PcmBuffer::I16(vec![-1, 16383, -16385, 32767]));
    }
}
