//! Decoding error types.

use eltm_core::ErrorKind;
use thiserror::Error;

use crate::layout::LayoutVersion;

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Decoding error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Payload text is not hexadecimal or has odd length.
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Buffer exhausted in the middle of a field.
    #[error(
        "truncated input in {}: requested {requested_bits} bits at byte {byte_offset}, {remaining_bits} bits remaining",
        .field.unwrap_or("record")
    )]
    TruncatedInput {
        /// Field being read, if known.
        field: Option<&'static str>,
        /// Byte offset of the failed read.
        byte_offset: usize,
        /// Width of the requested read.
        requested_bits: u32,
        /// Bits left in the buffer.
        remaining_bits: usize,
    },

    /// Structurally invalid decoded value.
    #[error("invalid value {value} in {field} at {position:?}: {reason}")]
    DecodeRange {
        /// Field name.
        field: &'static str,
        /// Canonical multi-index of the value.
        position: Vec<usize>,
        /// Decoded value.
        value: f64,
        /// Violated requirement.
        reason: &'static str,
    },

    /// Bits left over after the full layout was consumed.
    #[error("layout {layout} consumed, {remaining_bits} bits left over")]
    LayoutMismatch {
        /// Layout used for decoding.
        layout: LayoutVersion,
        /// Unaccounted bits.
        remaining_bits: usize,
    },

    /// Block structure violation in multi-bitstring text.
    #[error("malformed block at line {line}: {reason}")]
    MalformedBlock {
        /// 1-based line number.
        line: usize,
        /// Violated rule.
        reason: String,
    },

    /// Value not representable in the target layout.
    #[error("cannot encode {value} in {}: {reason}", .field.unwrap_or("field"))]
    Encode {
        /// Field being written, if known.
        field: Option<&'static str>,
        /// Offending value.
        value: f64,
        /// Why the value does not fit.
        reason: &'static str,
    },

    /// Invalid decoder configuration or layout table.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] eltm_core::Error),
}

impl Error {
    /// Failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHex(_) => ErrorKind::InvalidHex,
            Error::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            Error::DecodeRange { .. } => ErrorKind::DecodeRange,
            Error::LayoutMismatch { .. } => ErrorKind::LayoutMismatch,
            Error::MalformedBlock { .. } => ErrorKind::MalformedBlock,
            Error::Encode { .. } => ErrorKind::Encode,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Format,
            Error::Core(e) => e.kind(),
        }
    }

    /// Attaches a field name to cursor-level errors that lack one.
    #[must_use]
    pub fn with_field(self, name: &'static str) -> Self {
        match self {
            Error::TruncatedInput {
                field: None,
                byte_offset,
                requested_bits,
                remaining_bits,
            } => Error::TruncatedInput {
                field: Some(name),
                byte_offset,
                requested_bits,
                remaining_bits,
            },
            Error::Encode {
                field: None,
                value,
                reason,
            } => Error::Encode {
                field: Some(name),
                value,
                reason,
            },
            other => other,
        }
    }
}
