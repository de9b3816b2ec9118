//! File sessions.
//!
//! A [`FileSession`] owns one decoder or encoder. Every codec call runs under
//! the session's own mutex, so calls on one handle are serialized while calls
//! on different handles run independently.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::codec::{AudioDecoder, AudioEncoder, CodecKind};
use crate::error::ModeMismatch;
use crate::format::{PcmBuffer, SampleFormat, SampleSlice};
use crate::GaudioError;

/// Direction a file session was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMode {
    /// Decoding an existing file.
    Read,
    /// Encoding a new file.
    Write,
}

/// Stream position and layout of an open read session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicInfo {
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frame index the next read starts at.
    pub read_offset: u64,
}

enum Codec {
    Decoder(Box<dyn AudioDecoder>),
    Encoder(Box<dyn AudioEncoder>),
    Closed,
}

/// One open audio file.
pub(crate) struct FileSession {
    mode: FileMode,
    codec: CodecKind,
    path: Option<PathBuf>,
    inner: Mutex<Codec>,
}

impl FileSession {
    pub(crate) fn reader(decoder: Box<dyn AudioDecoder>, path: Option<&Path>) -> Self {
        Self {
            mode: FileMode::Read,
            codec: decoder.info().codec,
            path: path.map(Path::to_path_buf),
            inner: Mutex::new(Codec::Decoder(decoder)),
        }
    }

    pub(crate) fn writer(encoder: Box<dyn AudioEncoder>, path: Option<&Path>) -> Self {
        Self {
            mode: FileMode::Write,
            codec: encoder.spec().codec,
            path: path.map(Path::to_path_buf),
            inner: Mutex::new(Codec::Encoder(encoder)),
        }
    }

    pub(crate) fn mode(&self) -> FileMode {
        self.mode
    }

    pub(crate) fn codec(&self) -> CodecKind {
        self.codec
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` on the decoder under the session lock.
    fn with_decoder<R>(
        &self,
        f: impl FnOnce(&mut dyn AudioDecoder) -> Result<R, GaudioError>,
    ) -> Result<R, GaudioError> {
        match &mut *self.inner.lock() {
            Codec::Decoder(decoder) => f(decoder.as_mut()),
            Codec::Encoder(_) => Err(GaudioError::WrongMode(ModeMismatch::ReadOnWriteSession)),
            Codec::Closed => Err(closed()),
        }
    }

    pub(crate) fn read(&self, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError> {
        self.with_decoder(|decoder| {
            let samples = decoder.read(frames, format)?;
            tracing::trace!(requested = frames, samples = samples.len(), "file read");
            Ok(samples)
        })
    }

    pub(crate) fn seek(&self, frame: u64) -> Result<u64, GaudioError> {
        self.with_decoder(|decoder| {
            let offset = decoder.seek(frame)?;
            tracing::debug!(requested = frame, offset, "file seek");
            Ok(offset)
        })
    }

    pub(crate) fn basic_info(&self) -> Result<BasicInfo, GaudioError> {
        self.with_decoder(|decoder| {
            let info = decoder.info();
            Ok(BasicInfo {
                channels: info.channels,
                sample_rate: info.sample_rate,
                read_offset: decoder.read_offset(),
            })
        })
    }

    pub(crate) fn write(&self, samples: SampleSlice<'_>) -> Result<usize, GaudioError> {
        match &mut *self.inner.lock() {
            Codec::Encoder(encoder) => {
                let frames = encoder.write(samples)?;
                tracing::trace!(frames, "file write");
                Ok(frames)
            }
            Codec::Decoder(_) => Err(GaudioError::WrongMode(ModeMismatch::WriteOnReadSession)),
            Codec::Closed => Err(closed()),
        }
    }

    /// Finishes and releases the codec.
    ///
    /// Callers retire the handle first, so only a caller that looked the
    /// session up before the retirement can still reach it; it then sees a
    /// closed session.
    pub(crate) fn close(&self) -> Result<(), GaudioError> {
        let mut inner = self.inner.lock();
        let result = match &mut *inner {
            Codec::Encoder(encoder) => encoder.finish(),
            Codec::Decoder(_) | Codec::Closed => Ok(()),
        };
        *inner = Codec::Closed;
        result
    }
}

fn closed() -> GaudioError {
    GaudioError::invalid_argument("file session is closed")
}
