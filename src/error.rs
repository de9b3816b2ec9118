//! Error types for gaudio.
//!
//! Errors come in two layers:
//! - **Crate errors** ([`GaudioError`]): returned synchronously by every handle
//!   operation, each mapping to a stable numeric result code
//! - **Backend errors** ([`BackendError`]): raised by the audio transport and
//!   passed through with their own code, shifted by [`codes::BACKEND_ERROR_OFFSET`]
//!
//! Non-fatal results are reported separately as a [`Warning`].

use std::path::PathBuf;
use std::time::Duration;

use crate::handle::ResourceKind;

/// Numeric result codes shared with hosts across the call boundary.
pub mod codes {
    /// The operation succeeded.
    pub const SUCCESS: i32 = 0;
    /// Unclassified failure, including rejected arguments.
    pub const GENERIC: i32 = -1;
    /// An allocation failed.
    pub const MEMORY: i32 = -2;
    /// No codec or device implementation for the request.
    pub const UNSUPPORTED: i32 = -3;
    /// The file could not be opened, created or written.
    pub const FILE: i32 = -4;
    /// The codec rejected the stream.
    pub const DECODER: i32 = -5;
    /// Unknown or retired handle.
    pub const REFNUM: i32 = -6;
    /// A read-side operation was called on a write session.
    pub const READ_MODE: i32 = -7;
    /// A write was called on a read session.
    pub const WRITE_MODE: i32 = -8;
    /// Unknown sample type code.
    pub const INVALID_TYPE: i32 = -9;
    /// The handle space of a resource kind is exhausted.
    pub const REFNUM_LIMIT: i32 = -10;
    /// The shared backend context was created for a different backend.
    pub const CONTEXT_BACKEND: i32 = -11;
    /// The device stopped while a call was blocked on it.
    pub const DEVICE_STOPPED: i32 = -12;
    /// The request exceeds the configured ring capacity.
    pub const BUFFER_SIZE: i32 = -13;
    /// Playback was called on a capture or loopback device.
    pub const PLAYBACK_MODE: i32 = -14;
    /// Capture was called on a playback device.
    pub const CAPTURE_MODE: i32 = -15;
    /// A blocked call hit the configured I/O timeout.
    pub const TIMEOUT: i32 = -16;
    /// Backend codes are returned as `backend_code + BACKEND_ERROR_OFFSET`.
    pub const BACKEND_ERROR_OFFSET: i32 = -1000;
}

/// Which side of a mode check a call landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModeMismatch {
    /// Read, seek or info requested on a file opened for writing.
    #[error("file session is open for writing")]
    ReadOnWriteSession,
    /// Write requested on a file opened for reading.
    #[error("file session is open for reading")]
    WriteOnReadSession,
    /// Capture requested on a playback device.
    #[error("device is not configured for capture")]
    CaptureOnPlaybackDevice,
    /// Playback requested on a capture or loopback device.
    #[error("device is not configured for playback")]
    PlaybackOnCaptureDevice,
}

impl ModeMismatch {
    /// Returns the numeric result code for this mismatch.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::ReadOnWriteSession => codes::READ_MODE,
            Self::WriteOnReadSession => codes::WRITE_MODE,
            Self::CaptureOnPlaybackDevice => codes::CAPTURE_MODE,
            Self::PlaybackOnCaptureDevice => codes::PLAYBACK_MODE,
        }
    }
}

/// An error raised by the audio transport.
///
/// `code` is the backend's own (negative) result code; it is kept as-is and
/// only shifted when converted to a crate result code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    /// Backend result code.
    pub code: i32,
    /// Human-readable description from the backend.
    pub message: String,
}

impl BackendError {
    /// Unclassified backend failure.
    pub const GENERIC: i32 = -1;
    /// The backend rejected an argument.
    pub const INVALID_ARGS: i32 = -2;
    /// The operation is not valid in the device's current state.
    pub const INVALID_OPERATION: i32 = -3;
    /// The device cannot run in the requested sample format.
    pub const FORMAT_NOT_SUPPORTED: i32 = -200;
    /// The backend cannot open this kind of device.
    pub const DEVICE_TYPE_NOT_SUPPORTED: i32 = -201;
    /// The backend cannot honour the requested share mode.
    pub const SHARE_MODE_NOT_SUPPORTED: i32 = -202;
    /// The requested backend is not available on this system.
    pub const NO_BACKEND: i32 = -203;
    /// No matching device exists.
    pub const NO_DEVICE: i32 = -204;
    /// The device was lost or its worker is gone.
    pub const DEVICE_NOT_INITIALIZED: i32 = -300;
    /// The device refused to start.
    pub const FAILED_TO_START: i32 = -303;
    /// The device refused to stop.
    pub const FAILED_TO_STOP: i32 = -304;

    /// Creates a backend error with the given code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by gaudio operations.
#[derive(Debug, thiserror::Error)]
pub enum GaudioError {
    /// The handle is unknown or has been retired.
    #[error("invalid {kind} handle {handle}")]
    InvalidHandle {
        /// Resource kind the handle was looked up in.
        kind: ResourceKind,
        /// The raw handle value.
        handle: i32,
    },

    /// The call does not match the mode the resource was opened in.
    #[error("wrong mode: {0}")]
    WrongMode(ModeMismatch),

    /// No unused handle value is left for this resource kind.
    #[error("{kind} handle space exhausted")]
    RefnumExhausted {
        /// Resource kind whose table is full.
        kind: ResourceKind,
    },

    /// No codec is available for the file or the requested write format.
    #[error("unsupported codec")]
    UnsupportedCodec,

    /// The requested device kind cannot be configured.
    #[error("unsupported device type")]
    UnsupportedDevice,

    /// More frames were requested than the device ring can hold.
    #[error("{requested} frames exceed the configured buffer of {capacity} frames")]
    BufferSizeExceeded {
        /// Frames in the request.
        requested: usize,
        /// Configured ring capacity in frames.
        capacity: usize,
    },

    /// The device stopped while the call was waiting on it.
    ///
    /// Frames moved before the stop are not rolled back.
    #[error("device stopped after {transferred} frames")]
    DeviceStopped {
        /// Frames transferred before the stop was observed.
        transferred: usize,
    },

    /// The shared backend context was created for another backend.
    #[error("backend context is bound to {active}, requested {requested}")]
    ContextBackendMismatch {
        /// Backend of the live context.
        active: String,
        /// Backend named by the request.
        requested: String,
    },

    /// The sample type code is not one of the supported representations.
    #[error("invalid sample type code {code}")]
    InvalidType {
        /// The rejected type code.
        code: u16,
    },

    /// An argument was rejected before any resource was touched.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A buffer could not be allocated.
    #[error("out of memory")]
    MemoryError,

    /// The codec failed to decode, encode or seek.
    #[error("codec error: {reason}")]
    DecoderError {
        /// Description from the codec.
        reason: String,
    },

    /// File I/O failed.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blocked call gave up after the configured I/O timeout.
    #[error("timed out after {waited:?}")]
    Timeout {
        /// How long the call waited.
        waited: Duration,
    },

    /// Error passed through from the audio transport.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GaudioError {
    /// Creates an invalid argument error with the given reason.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates a codec error with the given reason.
    pub fn decoder(reason: impl std::fmt::Display) -> Self {
        Self::DecoderError {
            reason: reason.to_string(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }

    /// Returns the numeric result code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidHandle { .. } => codes::REFNUM,
            Self::WrongMode(mismatch) => mismatch.code(),
            Self::RefnumExhausted { .. } => codes::REFNUM_LIMIT,
            Self::UnsupportedCodec | Self::UnsupportedDevice => codes::UNSUPPORTED,
            Self::BufferSizeExceeded { .. } => codes::BUFFER_SIZE,
            Self::DeviceStopped { .. } => codes::DEVICE_STOPPED,
            Self::ContextBackendMismatch { .. } => codes::CONTEXT_BACKEND,
            Self::InvalidType { .. } => codes::INVALID_TYPE,
            Self::InvalidArgument { .. } => codes::GENERIC,
            Self::MemoryError => codes::MEMORY,
            Self::DecoderError { .. } => codes::DECODER,
            Self::FileError { .. } => codes::FILE,
            Self::Timeout { .. } => codes::TIMEOUT,
            Self::Backend(err) => err.code + codes::BACKEND_ERROR_OFFSET,
        }
    }
}

/// Non-fatal conditions reported alongside a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// The ring holds fewer frames than one device period, so the device will
    /// underrun or overflow between calls.
    BufferSmallerThanPeriod {
        /// Configured ring capacity in frames.
        buffer_frames: usize,
        /// Device period in frames.
        period_frames: usize,
    },
}

impl Warning {
    /// Returns the positive numeric code for this warning.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::BufferSmallerThanPeriod { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handle_display() {
        let err = GaudioError::InvalidHandle {
            kind: ResourceKind::Device,
            handle: 7,
        };
        assert_eq!(err.to_string(), "invalid device handle 7");
        assert_eq!(err.code(), codes::REFNUM);
    }

    #[test]
    fn test_mode_mismatch_codes() {
        assert_eq!(
            GaudioError::WrongMode(ModeMismatch::ReadOnWriteSession).code(),
            -7
        );
        assert_eq!(
            GaudioError::WrongMode(ModeMismatch::WriteOnReadSession).code(),
            -8
        );
        assert_eq!(
            GaudioError::WrongMode(ModeMismatch::PlaybackOnCaptureDevice).code(),
            -14
        );
        assert_eq!(
            GaudioError::WrongMode(ModeMismatch::CaptureOnPlaybackDevice).code(),
            -15
        );
    }

    #[test]
    fn test_backend_code_is_offset() {
        let err = GaudioError::from(BackendError::new(BackendError::NO_DEVICE, "gone"));
        assert_eq!(err.code(), -1204);
        assert_eq!(err.to_string(), "backend error -204: gone");
    }

    #[test]
    fn test_backend_codes_never_collide_with_crate_codes() {
        let err = GaudioError::from(BackendError::new(BackendError::GENERIC, "x"));
        assert!(err.code() <= codes::BACKEND_ERROR_OFFSET);
        assert!(GaudioError::UnsupportedCodec.code() > codes::BACKEND_ERROR_OFFSET);
    }

    #[test]
    fn test_file_error_contains_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = GaudioError::file_error("/tmp/track.flac", io_err);
        assert!(err.to_string().contains("/tmp/track.flac"));
        assert_eq!(err.code(), codes::FILE);
    }

    #[test]
    fn test_device_stopped_reports_progress() {
        let err = GaudioError::DeviceStopped { transferred: 480 };
        assert_eq!(err.to_string(), "device stopped after 480 frames");
    }

    #[test]
    fn test_warning_code() {
        let warning = Warning::BufferSmallerThanPeriod {
            buffer_frames: 64,
            period_frames: 480,
        };
        assert_eq!(warning.code(), 1);
    }
}
