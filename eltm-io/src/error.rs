//! I/O error types.

use eltm_core::ErrorKind;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Decoder error.
    #[error("decode error: {0}")]
    Decode(#[from] eltm_l1::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] eltm_core::Error),
}

impl Error {
    /// Failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidFormat(_) | Error::Json(_) => ErrorKind::Format,
            #[cfg(feature = "hdf5")]
            Error::Hdf5(_) => ErrorKind::Format,
            Error::Decode(e) => e.kind(),
            Error::Core(e) => e.kind(),
        }
    }
}
