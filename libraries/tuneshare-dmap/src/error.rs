//! Error types for the DMAP codec

use crate::code::{ContentCode, ValueType};
use thiserror::Error;

/// Codec errors
///
/// Every decode error is fatal for the stream that produced it: the decoder
/// never tries to skip or repair a malformed chunk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DmapError {
    /// Content code is not in the registry
    #[error("Unknown content code: {0}")]
    UnknownCode(ContentCode),

    /// Value does not match the type registered for the code
    #[error("Type mismatch for {code}: registered as {expected:?}, got {actual:?}")]
    TypeMismatch {
        code: ContentCode,
        expected: ValueType,
        actual: ValueType,
    },

    /// Input ended before a complete header or payload was read
    #[error("Truncated data: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Payload length does not match the fixed width of the registered type
    #[error("Length mismatch for {code}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        code: ContentCode,
        expected: usize,
        actual: usize,
    },

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(ContentCode),

    /// Bytes left over after a complete chunk
    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),

    /// Date cannot be represented as u32 POSIX seconds
    #[error("Date out of range for {0}")]
    DateOutOfRange(ContentCode),

    /// Encoded payload would not fit a u32 length field
    #[error("Payload too large for {code}: {len} bytes")]
    PayloadTooLarge { code: ContentCode, len: usize },

    /// Container nesting exceeds the decoder limit
    #[error("Container nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Registry table is inconsistent
    #[error("Invalid registry: {0}")]
    Registry(String),

    /// I/O error from a framed stream
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DmapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, DmapError>;
