//! WAV file writer.
//!
//! The header layout is fixed once the format is known, so a placeholder is
//! written on creation and rewritten in place with the real sizes on finish.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{AudioEncoder, WriteSpec};
use crate::config::{WavContainer, WavEncoding, WavOptions};
use crate::format::{convert, PcmBuffer, SampleFormat, SampleSlice};
use crate::GaudioError;

// WAV file format constants
// See: http://soundfile.sapp.org/doc/WaveFormat/

/// Audio format code for integer PCM.
const WAV_FORMAT_PCM: u16 = 1;

/// Audio format code for IEEE float.
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;

/// Audio format code for `WAVE_FORMAT_EXTENSIBLE`.
const WAV_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Bytes following `cbSize` in an extensible fmt chunk.
const EXTENSIBLE_EXTRA: u16 = 22;

/// Shared tail of the `KSDATAFORMAT_SUBTYPE_*` GUIDs; the first four bytes
/// hold the plain format code.
const SUBTYPE_GUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Size of the `ds64` chunk body in RF64 files.
const DS64_SIZE: u32 = 28;

/// Wave64 chunk ids.
const W64_RIFF: [u8; 16] = [
    0x72, 0x69, 0x66, 0x66, 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00,
];
const W64_WAVE: [u8; 16] = [
    0x77, 0x61, 0x76, 0x65, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
const W64_FMT: [u8; 16] = [
    0x66, 0x6D, 0x74, 0x20, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
const W64_DATA: [u8; 16] = [
    0x64, 0x61, 0x74, 0x61, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

/// Wave64 chunk header: GUID plus 64-bit size.
const W64_CHUNK_HEADER: u64 = 24;

/// Writes WAVE files in RIFF, RF64 or Wave64 layout.
///
/// A placeholder header is written on creation and patched with the real
/// sizes by [`finish`](AudioEncoder::finish).
pub struct WavEncoder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    spec: WriteSpec,
    layout: Layout,
    stored: SampleFormat,
    data_bytes: u64,
}

impl WavEncoder {
    /// Creates `path` and writes the header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a sample width the encoding cannot store
    /// or a frame size or byte rate too large for the fmt chunk, and
    /// `FileError` if the file cannot be created.
    pub fn create(path: &Path, spec: WriteSpec, options: WavOptions) -> Result<Self, GaudioError> {
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(GaudioError::invalid_argument(
                "wav needs at least one channel and a non-zero sample rate",
            ));
        }
        let stored = match (options.encoding, spec.bits_per_sample) {
            (WavEncoding::Pcm, 8) => SampleFormat::U8,
            (WavEncoding::Pcm, 16) => SampleFormat::I16,
            (WavEncoding::Pcm, 24 | 32) => SampleFormat::I32,
            (WavEncoding::Float, 32) => SampleFormat::F32,
            (WavEncoding::Float, 64) => SampleFormat::F64,
            (encoding, bits) => {
                return Err(GaudioError::invalid_argument(format!(
                    "wav cannot store {bits}-bit {encoding:?} samples"
                )))
            }
        };
        let layout = Layout::new(&spec, options)?;

        let file = File::create(path).map_err(|e| GaudioError::file_error(path, e))?;
        let mut writer = BufWriter::new(file);

        // Placeholder sizes, patched on finish
        writer
            .write_all(&layout.header(0))
            .map_err(|e| GaudioError::file_error(path, e))?;

        tracing::debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            container = ?options.container,
            "created wav file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            spec,
            layout,
            stored,
            data_bytes: 0,
        })
    }
}

/// Header shape for one file; sizes are filled in by [`Layout::header`].
struct Layout {
    options: WavOptions,
    fmt: Vec<u8>,
    fact: bool,
    block_align: u16,
}

impl Layout {
    fn new(spec: &WriteSpec, options: WavOptions) -> Result<Self, GaudioError> {
        let too_large = || {
            GaudioError::invalid_argument(format!(
                "{} channels at {} Hz overflow the wav fmt chunk",
                spec.channels, spec.sample_rate
            ))
        };
        let bytes_per_sample = spec.bits_per_sample / 8;
        let block_align = spec
            .channels
            .checked_mul(bytes_per_sample)
            .ok_or_else(too_large)?;
        let byte_rate = spec
            .sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(too_large)?;

        let format_tag = match options.encoding {
            WavEncoding::Pcm => WAV_FORMAT_PCM,
            WavEncoding::Float => WAV_FORMAT_IEEE_FLOAT,
        };
        let extensible =
            spec.channels > 2 || (options.encoding == WavEncoding::Pcm && spec.bits_per_sample > 16);

        let mut fmt = Vec::with_capacity(40);
        let tag = if extensible { WAV_FORMAT_EXTENSIBLE } else { format_tag };
        fmt.extend_from_slice(&tag.to_le_bytes());
        fmt.extend_from_slice(&spec.channels.to_le_bytes());
        fmt.extend_from_slice(&spec.sample_rate.to_le_bytes());
        fmt.extend_from_slice(&byte_rate.to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&spec.bits_per_sample.to_le_bytes());
        if extensible {
            fmt.extend_from_slice(&EXTENSIBLE_EXTRA.to_le_bytes());
            fmt.extend_from_slice(&spec.bits_per_sample.to_le_bytes());
            fmt.extend_from_slice(&channel_mask(spec.channels).to_le_bytes());
            fmt.extend_from_slice(&u32::from(format_tag).to_le_bytes());
            fmt.extend_from_slice(&SUBTYPE_GUID_TAIL);
        } else if options.encoding == WavEncoding::Float {
            // Non-PCM formats carry cbSize even when it is zero
            fmt.extend_from_slice(&0u16.to_le_bytes());
        }

        Ok(Self {
            options,
            fmt,
            fact: options.encoding == WavEncoding::Float,
            block_align,
        })
    }

    fn fact_len(&self) -> u64 {
        if self.fact {
            12
        } else {
            0
        }
    }

    /// Pad bytes written after the data chunk.
    fn padding(&self, data_bytes: u64) -> u64 {
        match self.options.container {
            WavContainer::Riff | WavContainer::Rf64 => data_bytes % 2,
            WavContainer::W64 => align8(data_bytes) - data_bytes,
        }
    }

    /// Largest data chunk the container can describe.
    fn max_data_bytes(&self) -> u64 {
        match self.options.container {
            // RIFF size counts everything after its own header, pad byte included
            WavContainer::Riff => {
                u64::from(u32::MAX) - (self.header(0).len() as u64 - 8) - 1
            }
            WavContainer::W64 | WavContainer::Rf64 => u64::MAX / 2,
        }
    }

    /// Complete header for a data chunk of `data_bytes`.
    fn header(&self, data_bytes: u64) -> Vec<u8> {
        let frames = data_bytes / u64::from(self.block_align);
        let pad = self.padding(data_bytes);
        let fmt_len = self.fmt.len() as u64;
        let mut out = Vec::with_capacity(128);

        match self.options.container {
            WavContainer::Riff => {
                let riff_size = 4 + 8 + fmt_len + self.fact_len() + 8 + data_bytes + pad;
                out.extend_from_slice(b"RIFF");
                out.extend_from_slice(&(riff_size as u32).to_le_bytes());
                out.extend_from_slice(b"WAVE");
                self.riff_chunks(&mut out, frames as u32, data_bytes as u32);
            }
            WavContainer::Rf64 => {
                let riff_size = 4
                    + 8
                    + u64::from(DS64_SIZE)
                    + 8
                    + fmt_len
                    + self.fact_len()
                    + 8
                    + data_bytes
                    + pad;
                out.extend_from_slice(b"RF64");
                out.extend_from_slice(&u32::MAX.to_le_bytes());
                out.extend_from_slice(b"WAVE");
                out.extend_from_slice(b"ds64");
                out.extend_from_slice(&DS64_SIZE.to_le_bytes());
                out.extend_from_slice(&riff_size.to_le_bytes());
                out.extend_from_slice(&data_bytes.to_le_bytes());
                out.extend_from_slice(&frames.to_le_bytes());
                // No extra chunk-size table
                out.extend_from_slice(&0u32.to_le_bytes());
                let fact_frames = u32::try_from(frames).unwrap_or(u32::MAX);
                self.riff_chunks(&mut out, fact_frames, u32::MAX);
            }
            WavContainer::W64 => {
                let fmt_chunk = W64_CHUNK_HEADER + fmt_len;
                let fmt_pad = align8(fmt_chunk) - fmt_chunk;
                let total = 16 + 8 + 16 + fmt_chunk + fmt_pad + W64_CHUNK_HEADER + data_bytes + pad;
                out.extend_from_slice(&W64_RIFF);
                out.extend_from_slice(&total.to_le_bytes());
                out.extend_from_slice(&W64_WAVE);
                out.extend_from_slice(&W64_FMT);
                out.extend_from_slice(&fmt_chunk.to_le_bytes());
                out.extend_from_slice(&self.fmt);
                out.resize(out.len() + fmt_pad as usize, 0);
                out.extend_from_slice(&W64_DATA);
                out.extend_from_slice(&(W64_CHUNK_HEADER + data_bytes).to_le_bytes());
            }
        }
        out
    }

    /// fmt, optional fact and data chunk headers in RIFF form.
    fn riff_chunks(&self, out: &mut Vec<u8>, fact_frames: u32, data_size: u32) {
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&(self.fmt.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.fmt);
        if self.fact {
            out.extend_from_slice(b"fact");
            out.extend_from_slice(&4u32.to_le_bytes());
            out.extend_from_slice(&fact_frames.to_le_bytes());
        }
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_size.to_le_bytes());
    }
}

fn align8(n: u64) -> u64 {
    (n + 7) & !7
}

/// Speaker mask with exactly `channels` positions set.
fn channel_mask(channels: u16) -> u32 {
    match channels {
        1 => 0x4,
        2 => 0x3,
        3 => 0x7,
        4 => 0x33,
        5 => 0x37,
        6 => 0x3F,
        7 => 0x13F,
        8 => 0x63F,
        n if n <= 18 => (1u32 << n) - 1,
        _ => 0,
    }
}

/// Writes the trailing pad and the final header, then flushes.
fn finalize(writer: &mut BufWriter<File>, pad: u64, header: &[u8]) -> std::io::Result<()> {
    writer.write_all(&[0u8; 8][..pad as usize])?;
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(header)?;
    writer.seek(SeekFrom::End(0))?;
    writer.flush()
}

fn write_samples(writer: &mut impl Write, samples: &PcmBuffer, bits: u16) -> std::io::Result<()> {
    match samples {
        PcmBuffer::U8(v) => writer.write_all(v),
        PcmBuffer::I16(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        // 24-bit keeps the top three bytes
        PcmBuffer::I32(v) if bits == 24 => v
            .iter()
            .try_for_each(|s| writer.write_all(&s.to_le_bytes()[1..])),
        PcmBuffer::I32(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        PcmBuffer::F32(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        PcmBuffer::F64(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
    }
}

impl AudioEncoder for WavEncoder {
    fn spec(&self) -> WriteSpec {
        self.spec
    }

    fn write(&mut self, samples: SampleSlice<'_>) -> Result<usize, GaudioError> {
        let channels = usize::from(self.spec.channels);
        if samples.len() % channels != 0 {
            return Err(GaudioError::invalid_argument(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        let frames = samples.len() / channels;
        let bytes = frames as u64 * u64::from(self.layout.block_align);
        match self.data_bytes.checked_add(bytes) {
            Some(total) if total <= self.layout.max_data_bytes() => {}
            _ => return Err(GaudioError::invalid_argument("wav data chunk is full")),
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(GaudioError::invalid_argument("wav file already finished"));
        };

        let stored = if samples.format() == self.stored {
            None
        } else {
            Some(convert(samples, self.stored))
        };
        let result = match &stored {
            Some(buffer) => write_samples(writer, buffer, self.spec.bits_per_sample),
            None => write_borrowed(writer, samples, self.spec.bits_per_sample),
        };
        result.map_err(|e| GaudioError::file_error(&self.path, e))?;

        self.data_bytes += bytes;
        tracing::trace!(frames, "wav write");
        Ok(frames)
    }

    fn finish(&mut self) -> Result<(), GaudioError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        let pad = self.layout.padding(self.data_bytes);
        let header = self.layout.header(self.data_bytes);
        finalize(&mut writer, pad, &header).map_err(|e| GaudioError::file_error(&self.path, e))?;

        tracing::debug!(
            path = %self.path.display(),
            data_bytes = self.data_bytes,
            encoding = ?self.layout.options.encoding,
            "finished wav file"
        );
        Ok(())
    }
}

fn write_borrowed(writer: &mut impl Write, samples: SampleSlice<'_>, bits: u16) -> std::io::Result<()> {
    match samples {
        SampleSlice::U8(v) => writer.write_all(v),
        SampleSlice::I16(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        SampleSlice::I32(v) if bits == 24 => v
            .iter()
            .try_for_each(|s| writer.write_all(&s.to_le_bytes()[1..])),
        SampleSlice::I32(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        SampleSlice::F32(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
        SampleSlice::F64(v) => v.iter().try_for_each(|s| writer.write_all(&s.to_le_bytes())),
    }
}

impl Drop for WavEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("failed to finish wav file on drop: {e}");
        }
    }
}
