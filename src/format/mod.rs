//! Audio format conversion utilities.
//!
//! This module provides:
//! - Sample representations ([`SampleFormat`], [`SampleSlice`], [`PcmBuffer`])
//! - Sample format conversion between u8, i16, i32, f32 and f64
//! - Channel count conversion

mod channels;
mod convert;
mod sample;

pub use channels::remix;
pub use convert::{
    convert, convert_into, f32_to_i16, f32_to_i32, f32_to_u8, f64_to_i16, f64_to_i32, f64_to_u8,
    i16_to_f32, i16_to_f64, i16_to_i32, i16_to_u8, i32_to_f32, i32_to_f64, i32_to_i16, i32_to_u8,
    u8_to_f32, u8_to_f64, u8_to_i16, u8_to_i32,
};
pub use sample::{PcmBuffer, SampleFormat, SampleSlice, SampleSliceMut};
