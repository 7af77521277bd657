//! Error types for eltm-core.

use thiserror::Error;

/// Result type alias for eltm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure category shared by every crate in the workspace.
///
/// Batch drivers report per-bitstring failures by kind without matching
/// on crate-specific error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Payload text is not valid hexadecimal.
    InvalidHex,
    /// Buffer exhausted in the middle of a field.
    TruncatedInput,
    /// Structurally invalid decoded value.
    DecodeRange,
    /// Bits left over after the full layout was consumed.
    LayoutMismatch,
    /// Block structure violation in the input text.
    MalformedBlock,
    /// Array dimensions disagree with the instrument definition.
    DimensionMismatch,
    /// Value cannot be represented in the target layout.
    Encode,
    /// Invalid configuration.
    Config,
    /// Unreadable or malformed external file.
    Format,
    /// Operating system I/O failure.
    Io,
}

impl ErrorKind {
    /// Stable short name for reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidHex => "invalid-hex",
            ErrorKind::TruncatedInput => "truncated-input",
            ErrorKind::DecodeRange => "decode-range",
            ErrorKind::LayoutMismatch => "layout-mismatch",
            ErrorKind::MalformedBlock => "malformed-block",
            ErrorKind::DimensionMismatch => "dimension-mismatch",
            ErrorKind::Encode => "encode",
            ErrorKind::Config => "config",
            ErrorKind::Format => "format",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error types for eltm operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An array does not have the shape fixed by the instrument definition.
    #[error("dimension mismatch in {array}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Name of the offending array.
        array: &'static str,
        /// Shape required by the instrument definition.
        expected: Vec<usize>,
        /// Shape actually present.
        actual: Vec<usize>,
    },

    /// A per-cycle entry carries the wrong cycle number.
    #[error("{array}[{position}] is labelled cycle {cycle}")]
    CycleMismatch {
        /// Name of the offending array.
        array: &'static str,
        /// Position in the array.
        position: usize,
        /// Cycle number found at that position.
        cycle: usize,
    },

    /// Flat buffer length disagrees with the declared shape.
    #[error("invalid array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Timestamp outside the renderable calendar range.
    #[error("timestamp {0} ms is outside the representable range")]
    InvalidTimestamp(u64),

    /// Text is not an ISO-8601 timestamp.
    #[error("invalid ISO-8601 timestamp: {0}")]
    InvalidIsoText(String),
}

impl Error {
    /// Failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DimensionMismatch { .. } | Error::CycleMismatch { .. } | Error::Shape(_) => {
                ErrorKind::DimensionMismatch
            }
            Error::InvalidTimestamp(_) => ErrorKind::DecodeRange,
            Error::InvalidIsoText(_) => ErrorKind::Format,
        }
    }
}
