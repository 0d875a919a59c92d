//! Error types shared by every mediaflow stage.
//!
//! Stage operations return [`Result`]. Errors are grouped by what the caller
//! can do about them: pick another format or codec, fix an argument, fix the
//! order of calls, or give up on the data.

use thiserror::Error;

/// Main error type for mediaflow.
#[derive(Error, Debug)]
pub enum Error {
    /// No registered demuxer, muxer, codec or filter matches the request.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed or out-of-range option, parameter or input unit.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation called in the wrong lifecycle state.
    #[error("Sequence violation: {0}")]
    SequenceViolation(String),

    /// Codec errors (encoding/decoding).
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Container structure errors (demuxing/muxing).
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Source or sink I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An offloaded blocking task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Create an unsupported-format error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedFormat(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a sequence-violation error.
    pub fn sequence(msg: impl Into<String>) -> Self {
        Error::SequenceViolation(msg.into())
    }

    /// Returns true for lifecycle-order failures.
    #[must_use]
    pub fn is_sequence_violation(&self) -> bool {
        matches!(self, Error::SequenceViolation(_))
    }

    /// Returns true if the error came from an unexpected end of input data.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            Error::Container(ContainerError::Truncated { .. }) => true,
            _ => false,
        }
    }
}

/// Container structure errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// File or record magic did not match.
    #[error("Bad magic at offset {offset}: expected {expected:?}")]
    BadMagic { offset: u64, expected: &'static str },

    /// Record ended before its declared size.
    #[error("Truncated record at offset {offset}")]
    Truncated { offset: u64 },

    /// Stream not found in container.
    #[error("Stream {index} not found")]
    StreamNotFound { index: usize },

    /// Seek index is missing or inconsistent.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Generic container error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for ContainerError {
    fn from(s: String) -> Self {
        ContainerError::Other(s)
    }
}

impl From<&str> for ContainerError {
    fn from(s: &str) -> Self {
        ContainerError::Other(s.to_string())
    }
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Payload could not be parsed at all.
    #[error("Invalid bitstream: {0}")]
    InvalidBitstream(String),

    /// Encoder configuration error.
    #[error("Encoder configuration error: {0}")]
    EncoderConfig(String),

    /// Decoder configuration error.
    #[error("Decoder configuration error: {0}")]
    DecoderConfig(String),

    /// Backend emitted packets whose dts went backwards.
    #[error("Non-monotonic dts: {dts} after {last}")]
    NonMonotonicDts { dts: i64, last: i64 },

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

/// Result type for mediaflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal outcome of applying a set of options.
///
/// Returned by operations that take a free-form option map. Options that
/// could not be applied are listed by name in `unset`; the operation itself
/// still succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct OptionReport {
    /// Names of options that were not applied.
    pub unset: Vec<String>,
}

impl OptionReport {
    /// True when every option was applied.
    pub fn is_complete(&self) -> bool {
        self.unset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument("width must be non-zero");
        assert_eq!(err.to_string(), "Invalid argument: width must be non-zero");

        let err = Error::sequence("write_header called twice");
        assert_eq!(
            err.to_string(),
            "Sequence violation: write_header called twice"
        );
    }

    #[test]
    fn test_error_from_codec() {
        let codec_err = CodecError::InvalidBitstream("unknown frame type 7".into());
        let err: Error = codec_err.into();
        assert!(matches!(err, Error::Codec(_)));
        assert!(err.to_string().contains("unknown frame type 7"));
    }

    #[test]
    fn test_is_sequence_violation() {
        assert!(Error::sequence("x").is_sequence_violation());
        assert!(!Error::unsupported("x").is_sequence_violation());
    }

    #[test]
    fn test_is_eof() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(Error::from(io).is_eof());
        assert!(Error::from(ContainerError::Truncated { offset: 12 }).is_eof());
        assert!(!Error::invalid_argument("x").is_eof());
    }

    #[test]
    fn test_option_report() {
        let report = OptionReport::default();
        assert!(report.is_complete());
        let report = OptionReport {
            unset: vec!["fragment_size".into()],
        };
        assert!(!report.is_complete());
    }
}
