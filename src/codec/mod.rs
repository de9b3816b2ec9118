//! Codec abstraction for file sessions.
//!
//! A file opened for reading is matched to a [`CodecKind`] by its first four
//! bytes and decoded through an [`AudioDecoder`]. Files opened for writing name
//! their codec explicitly; only WAV can be written.
//!
//! WAV is written in RIFF, RF64 or Wave64 layout, but only RIFF files decode.
//! The other two are recognised by signature and refused before a session is
//! created.

mod decode;
mod wav;

pub use decode::SymphoniaDecoder;
pub use wav::WavEncoder;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::{WavContainer, WavOptions};
use crate::format::{PcmBuffer, SampleFormat, SampleSlice};
use crate::GaudioError;

/// Container/codec families recognised by signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Free Lossless Audio Codec.
    Flac,
    /// MPEG-1/2 Layer III.
    Mp3,
    /// Vorbis in an Ogg container.
    Vorbis,
    /// WAVE in a RIFF, RF64 or Wave64 container.
    Wav,
}

impl CodecKind {
    /// Maps a host codec code (0 flac, 1 mp3, 2 vorbis, 3 wav).
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedCodec` for any other code.
    pub fn from_code(code: u16) -> Result<Self, GaudioError> {
        match code {
            0 => Ok(Self::Flac),
            1 => Ok(Self::Mp3),
            2 => Ok(Self::Vorbis),
            3 => Ok(Self::Wav),
            _ => Err(GaudioError::UnsupportedCodec),
        }
    }

    /// The host codec code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Flac => 0,
            Self::Mp3 => 1,
            Self::Vorbis => 2,
            Self::Wav => 3,
        }
    }

    /// Typical file extension, used as a probe hint.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Vorbis => "ogg",
            Self::Wav => "wav",
        }
    }

    /// Matches a file's leading bytes.
    #[must_use]
    pub fn from_signature(signature: &[u8]) -> Option<Self> {
        match signature {
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            [b'I', b'D', b'3', ..] | [0xFF, 0xFB | 0xF3 | 0xF2, ..] => Some(Self::Mp3),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Vorbis),
            _ => WavContainer::from_signature(signature).map(|_| Self::Wav),
        }
    }
}

/// Reads the first four bytes of `path` and picks a codec.
///
/// # Errors
///
/// Returns `FileError` if the file cannot be read and `UnsupportedCodec` if
/// the signature is not recognised or names a WAV container that cannot be
/// decoded.
pub fn sniff_codec(path: &Path) -> Result<CodecKind, GaudioError> {
    let file = File::open(path).map_err(|e| GaudioError::file_error(path, e))?;
    let mut signature = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut signature)
        .map_err(|e| GaudioError::file_error(path, e))?;

    let kind = CodecKind::from_signature(&signature).ok_or(GaudioError::UnsupportedCodec)?;
    if let Some(container @ (WavContainer::W64 | WavContainer::Rf64)) =
        WavContainer::from_signature(&signature)
    {
        tracing::debug!(path = %path.display(), ?container, "wav container cannot be decoded");
        return Err(GaudioError::UnsupportedCodec);
    }
    tracing::debug!(path = %path.display(), codec = ?kind, "codec selected by signature");
    Ok(kind)
}

/// Stream properties of an audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Total frames, or 0 if the container does not say.
    pub frames: u64,
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Stored bits per sample; 16 for lossy codecs.
    pub bits_per_sample: u16,
    /// Codec the file was opened with.
    pub codec: CodecKind,
}

/// Format of a file being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSpec {
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Stored bits per sample.
    pub bits_per_sample: u16,
    /// Codec to write with.
    pub codec: CodecKind,
}

/// Decodes one file.
///
/// Implementations need not be thread-safe beyond `Send`; file sessions
/// serialize every call.
pub trait AudioDecoder: Send {
    /// Stream properties.
    fn info(&self) -> FileInfo;

    /// Frame index the next read starts at.
    fn read_offset(&self) -> u64;

    /// Moves the read position to `frame`, returning the new offset.
    fn seek(&mut self, frame: u64) -> Result<u64, GaudioError>;

    /// Reads up to `frames` interleaved frames converted to `format`.
    ///
    /// Returns fewer frames only at end of stream.
    fn read(&mut self, frames: usize, format: SampleFormat) -> Result<PcmBuffer, GaudioError>;
}

/// Encodes one file.
pub trait AudioEncoder: Send {
    /// Format being written.
    fn spec(&self) -> WriteSpec;

    /// Appends interleaved samples, returning the frames written.
    fn write(&mut self, samples: SampleSlice<'_>) -> Result<usize, GaudioError>;

    /// Completes the file. Later calls are no-ops.
    fn finish(&mut self) -> Result<(), GaudioError>;
}

/// Opens `path` for reading with the codec its signature names.
///
/// # Errors
///
/// See [`sniff_codec`]; decoder setup failures are `DecoderError`.
pub fn open_decoder(path: &Path) -> Result<Box<dyn AudioDecoder>, GaudioError> {
    let kind = sniff_codec(path)?;
    Ok(Box::new(SymphoniaDecoder::open(path, kind)?))
}

/// Creates `path` for writing.
///
/// # Errors
///
/// Returns `UnsupportedCodec` for any codec but WAV, `InvalidArgument` for a
/// format the codec cannot store and `FileError` if the file cannot be created.
pub fn open_encoder(
    path: &Path,
    spec: WriteSpec,
    options: Option<WavOptions>,
) -> Result<Box<dyn AudioEncoder>, GaudioError> {
    match spec.codec {
        CodecKind::Wav => Ok(Box::new(WavEncoder::create(
            path,
            spec,
            options.unwrap_or_default(),
        )?)),
        CodecKind::Flac | CodecKind::Mp3 | CodecKind::Vorbis => Err(GaudioError::UnsupportedCodec),
    }
}

/// Reads the stream properties of `path` without keeping it open.
///
/// # Errors
///
/// Same as [`open_decoder`].
pub fn file_info(path: &Path) -> Result<FileInfo, GaudioError> {
    Ok(open_decoder(path)?.info())
}

/// Frames decoded per step when loading a whole file.
const LOAD_CHUNK_FRAMES: usize = 4096;

/// Decodes all of `path` into one buffer of `format`.
///
/// # Errors
///
/// Same as [`open_decoder`], plus any decode failure.
pub fn load_file(path: &Path, format: SampleFormat) -> Result<(FileInfo, PcmBuffer), GaudioError> {
    let mut decoder = open_decoder(path)?;
    let info = decoder.info();
    let mut samples = PcmBuffer::empty(format);

    loop {
        let chunk = decoder.read(LOAD_CHUNK_FRAMES, format)?;
        if chunk.is_empty() {
            break;
        }
        samples.extend_from(&chunk)?;
    }

    let channels = usize::from(info.channels.max(1));
    let info = FileInfo {
        frames: (samples.len() / channels) as u64,
        ..info
    };
    tracing::debug!(path = %path.display(), frames = info.frames, "loaded file");
    Ok((info, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_signatures() {
        assert_eq!(CodecKind::from_signature(b"fLaC"), Some(CodecKind::Flac));
        assert_eq!(CodecKind::from_signature(b"ID3\x04"), Some(CodecKind::Mp3));
        assert_eq!(CodecKind::from_signature(&[0xFF, 0xFB, 0x90, 0x00]), Some(CodecKind::Mp3));
        assert_eq!(CodecKind::from_signature(&[0xFF, 0xF3, 0x00, 0x00]), Some(CodecKind::Mp3));
        assert_eq!(CodecKind::from_signature(b"OggS"), Some(CodecKind::Vorbis));
        assert_eq!(CodecKind::from_signature(b"RIFF"), Some(CodecKind::Wav));
        assert_eq!(CodecKind::from_signature(b"riff"), Some(CodecKind::Wav));
        assert_eq!(CodecKind::from_signature(b"RF64"), Some(CodecKind::Wav));
    }

    #[test]
    fn test_unknown_signatures() {
        assert_eq!(CodecKind::from_signature(b"MThd"), None);
        assert_eq!(CodecKind::from_signature(&[0xFF, 0xFA, 0, 0]), None);
        assert_eq!(CodecKind::from_signature(b"fL"), None);
        assert_eq!(CodecKind::from_signature(&[]), None);
    }

    #[test]
    fn test_codec_codes() {
        for kind in [CodecKind::Flac, CodecKind::Mp3, CodecKind::Vorbis, CodecKind::Wav] {
            assert_eq!(CodecKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(matches!(
            CodecKind::from_code(4),
            Err(GaudioError::UnsupportedCodec)
        ));
    }

    #[test]
    fn test_sniff_reads_file_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fLaC\0\0\0\x22").unwrap();
        assert_eq!(sniff_codec(file.path()).unwrap(), CodecKind::Flac);
    }

    #[test]
    fn test_sniff_short_file_is_unsupported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RI").unwrap();
        assert!(matches!(
            sniff_codec(file.path()),
            Err(GaudioError::UnsupportedCodec)
        ));
    }

    #[test]
    fn test_sniff_refuses_undecodable_wav_containers() {
        for signature in [&b"riff"[..], b"RF64"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(signature).unwrap();
            file.write_all(&[0; 60]).unwrap();
            assert!(matches!(
                sniff_codec(file.path()),
                Err(GaudioError::UnsupportedCodec)
            ));
        }
    }

    #[test]
    fn test_sniff_missing_file_is_file_error() {
        let err = sniff_codec(Path::new("/nonexistent/track.flac")).unwrap_err();
        assert!(matches!(err, GaudioError::FileError { .. }));
    }

    #[test]
    fn test_only_wav_can_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let spec = WriteSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            codec: CodecKind::Flac,
        };
        let result = open_encoder(&dir.path().join("out.flac"), spec, None);
        assert!(matches!(result, Err(GaudioError::UnsupportedCodec)));
        assert!(!dir.path().join("out.flac").exists());
    }
}
