//! Decoding via symphonia.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioDecoder, CodecKind, FileInfo};
use crate::format::{convert, PcmBuffer, SampleFormat};
use crate::GaudioError;

/// Bits reported for codecs without a stored sample width.
const LOSSY_BITS_PER_SAMPLE: u16 = 16;

/// Decoder for every codec symphonia was built with.
///
/// Integer sources are held as `i32` and float sources as `f64` between
/// packets, so 8-, 16- and 32-bit integer and float streams convert to their
/// own format without loss.
pub struct SymphoniaDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: FileInfo,
    int_buf: Option<SampleBuffer<i32>>,
    float_buf: Option<SampleBuffer<f64>>,
    pending: Option<PcmBuffer>,
    skip_frames: u64,
    position: u64,
    finished: bool,
}

impl SymphoniaDecoder {
    /// Opens `path`, expecting `kind`.
    ///
    /// # Errors
    ///
    /// Returns `FileError` if the file cannot be opened and `DecoderError` if
    /// no audio track can be decoded.
    pub fn open(path: &Path, kind: CodecKind) -> Result<Self, GaudioError> {
        let file = File::open(path).map_err(|e| GaudioError::file_error(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension(kind.extension());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| GaudioError::decoder(format!("probe failed: {e}")))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| GaudioError::decoder("no audio track"))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| GaudioError::decoder(format!("decoder init failed: {e}")))?;

        let info = FileInfo {
            frames: params.n_frames.unwrap_or(0),
            channels: params.channels.map_or(0, |c| c.count() as u16),
            sample_rate: params.sample_rate.unwrap_or(0),
            bits_per_sample: params
                .bits_per_sample
                .map_or(LOSSY_BITS_PER_SAMPLE, |bits| bits as u16),
            codec: kind,
        };

        let mut this = Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            info,
            int_buf: None,
            float_buf: None,
            pending: None,
            skip_frames: 0,
            position: 0,
            finished: false,
        };

        // Some containers only reveal the signal layout in the first packet
        while (this.info.channels == 0 || this.info.sample_rate == 0) && !this.finished {
            this.decode_next()?;
        }
        if this.info.channels == 0 || this.info.sample_rate == 0 {
            return Err(GaudioError::decoder("stream has no channels or sample rate"));
        }

        tracing::debug!(
            path = %this.path.display(),
            codec = ?kind,
            channels = this.info.channels,
            sample_rate = this.info.sample_rate,
            frames = this.info.frames,
            "opened decoder"
        );
        Ok(this)
    }

    fn channels(&self) -> usize {
        usize::from(self.info.channels.max(1))
    }

    fn pending_samples(&self) -> usize {
        self.pending.as_ref().map_or(0, PcmBuffer::len)
    }

    /// Decodes packets until one yields audio or the stream ends.
    fn decode_next(&mut self) -> Result<(), GaudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(GaudioError::decoder(format!("read packet failed: {e}"))),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio) => {
                    let decoded = interleave(
                        audio,
                        &mut self.info,
                        &mut self.int_buf,
                        &mut self.float_buf,
                    );
                    self.append(decoded)?;
                    return Ok(());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!(path = %self.path.display(), "skipping bad packet: {e}");
                }
                Err(SymphoniaError::ResetRequired) => self.decoder.reset(),
                Err(e) => return Err(GaudioError::decoder(format!("decode failed: {e}"))),
            }
        }
    }

    fn append(&mut self, mut decoded: PcmBuffer) -> Result<(), GaudioError> {
        if self.skip_frames > 0 {
            let frames = (decoded.len() / self.channels()) as u64;
            let skip = self.skip_frames.min(frames);
            decoded.drain_front(skip as usize * self.channels());
            self.skip_frames -= skip;
        }

        let Some(pending) = self.pending.as_mut() else {
            self.pending = Some(decoded);
            return Ok(());
        };
        if pending.format() != decoded.format() {
            decoded = convert(decoded.as_slice(), pending.format());
        }
        pending.extend_from(&decoded)
    }
}

/// Copies one decoded packet into an interleaved buffer, filling in any
/// layout the container did not declare.
fn interleave(
    audio: AudioBufferRef<'_>,
    info: &mut FileInfo,
    int_buf: &mut Option<SampleBuffer<i32>>,
    float_buf: &mut Option<SampleBuffer<f64>>,
) -> PcmBuffer {
    let spec = SignalSpec::new(audio.spec().rate, audio.spec().channels);
    if info.channels == 0 {
        info.channels = spec.channels.count() as u16;
    }
    if info.sample_rate == 0 {
        info.sample_rate = spec.rate;
    }

    // SampleBuffer capacity counts samples, the packet counts frames
    let duration = audio.capacity() as u64;
    let needed = audio.capacity() * spec.channels.count();
    if matches!(audio, AudioBufferRef::F32(_) | AudioBufferRef::F64(_)) {
        if float_buf.as_ref().is_some_and(|buf| buf.capacity() < needed) {
            *float_buf = None;
        }
        let buf = float_buf.get_or_insert_with(|| SampleBuffer::new(duration, spec));
        buf.copy_interleaved_ref(audio);
        PcmBuffer::F64(buf.samples().to_vec())
    } else {
        if int_buf.as_ref().is_some_and(|buf| buf.capacity() < needed) {
            *int_buf = None;
        }
        let buf = int_buf.get_or_insert_with(|| SampleBuffer::new(duration, spec));
        buf.copy_interleaved_ref(audio);
        PcmBuffer::I32(buf.samples().to_vec())
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn info(&self) -> FileInfo {
        self.info
    }

    fn read_offset(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> Result<u64, GaudioError> {
        if self.info.frames > 0 && frame > self.info.frames {
            return Err(GaudioError::decoder(format!(
                "seek to frame {frame} past end of {} frames",
                self.info.frames
            )));
        }

        self.pending = None;
        self.skip_frames = 0;
        self.decoder.reset();

        if self.info.frames > 0 && frame == self.info.frames {
            self.finished = true;
            self.position = frame;
            return Ok(frame);
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| GaudioError::decoder(format!("seek failed: {e}")))?;

        self.finished = false;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.position = seeked.required_ts;
        tracing::debug!(
            path = %self.path.display(),
            requested = frame,
            landed = seeked.actual_ts,
            "seek"
        );
        Ok(self.position)
    }

    fn read(&mut self, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        let channels = self.channels();
        let wanted = frames.saturating_mul(channels);

        while self.pending_samples() < wanted && !self.finished {
            self.decode_next()?;
        }

        let available = self.pending_samples() / channels * channels;
        let take = wanted.min(available);
        let chunk = match self.pending.as_mut() {
            Some(pending) => pending.drain_front(take),
            None => return Ok(PcmBuffer::empty(format)),
        };
        self.position += (take / channels) as u64;

        tracing::trace!(frames = take / channels, ?format, "decoded");
        Ok(if chunk.format() == format {
            chunk
        } else {
            convert(chunk.as_slice(), format)
        })
    }
}
