//! Error types shared across the VC-2 workspace.

use thiserror::Error;

/// Main error type for VC-2 encoding and decoding.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid codec configuration (kernel, depth, slice geometry, rate).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The input bytes do not form a valid VC-2 stream.
    #[error("Malformed stream: {0}")]
    Stream(#[from] StreamError),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,
}

/// Stream-level parsing errors.
///
/// All of these indicate that the byte stream is not (or is no longer) a
/// well-formed VC-2 sequence. Decoders may resynchronise on the parse-info
/// prefix and continue with the next data unit.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream ended in the middle of a code or fixed-width field.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// A variable-length code ran past any representable value.
    #[error("Variable-length code overflow")]
    VlcOverflow,

    /// A parse-info offset field is inconsistent with the framing rules.
    #[error("Invalid parse offset: {0}")]
    InvalidParseOffset(u32),

    /// Unknown wavelet index in a picture preamble.
    #[error("Unknown wavelet index: {0}")]
    UnknownWaveletIndex(u32),

    /// Unknown frame-rate index in a sequence header.
    #[error("Unknown frame rate index: {0}")]
    UnknownFrameRateIndex(u32),

    /// Unknown base video format index in a sequence header.
    #[error("Unknown base video format: {0}")]
    UnknownBaseVideoFormat(u32),

    /// Unknown signal-range (bit depth) index in a sequence header.
    #[error("Unknown signal range index: {0}")]
    UnknownSignalRange(u32),

    /// An optional-feature flag this implementation does not support.
    #[error("Unsupported flag set: {0}")]
    UnsupportedFlag(&'static str),

    /// A slice declares more payload than its byte budget allows.
    #[error("Slice overruns its byte budget: {used} > {budget}")]
    SliceOverrun { used: usize, budget: usize },

    /// A picture data unit arrived before any sequence header.
    #[error("Picture data unit before sequence header")]
    MissingSequenceHeader,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this is an end-of-stream error.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            Error::EndOfStream | Error::Stream(StreamError::UnexpectedEnd)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("depth too deep");
        assert_eq!(err.to_string(), "Configuration error: depth too deep");
    }

    #[test]
    fn test_stream_error_conversion() {
        let err: Error = StreamError::UnexpectedEnd.into();
        assert!(matches!(err, Error::Stream(StreamError::UnexpectedEnd)));
        assert!(err.is_eof());
    }

    #[test]
    fn test_unsupported_flag_display() {
        let err: Error = StreamError::UnsupportedFlag("custom_quant_matrix").into();
        assert!(err.to_string().contains("custom_quant_matrix"));
    }
}
