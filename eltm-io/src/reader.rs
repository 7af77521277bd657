//! Memory-mapped telemetry text readers.
//!

use crate::{Error, Result};
use eltm_l1::{split, BatchDecoder, BatchReport, BlockSplitter, DecoderConfig};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without copying the whole file
/// into memory.
pub struct MappedFileReader {
    mmap: Option<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // Zero-length files cannot be mapped on every platform.
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            // This is the standard safety contract for memory mapping.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            Some(mmap)
        };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Returns the file contents as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the file is not valid UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes()).map_err(|e| {
            Error::InvalidFormat(format!("{} is not UTF-8 text: {e}", self.path.display()))
        })
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// A multi-bitstring telemetry text file.
pub struct TelemetryFileReader {
    reader: MappedFileReader,
    config: DecoderConfig,
}

impl TelemetryFileReader {
    /// Opens a telemetry file with default configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DecoderConfig::default())
    }

    /// Opens a telemetry file with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DecoderConfig) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            config,
        })
    }

    /// Decoder configuration in use.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Lazily splits the file into blocks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the file is not UTF-8.
    pub fn blocks(&self) -> Result<BlockSplitter<'_>> {
        Ok(split(self.reader.as_text()?, self.config.index_policy))
    }

    /// Splits and decodes every block.
    ///
    /// # Errors
    /// Returns an error if the file is not UTF-8 or the configured layout is
    /// invalid. Per-bitstring failures are reported inside the [`BatchReport`].
    pub fn decode(&self) -> Result<BatchReport> {
        let text = self.reader.as_text()?;
        let batch = BatchDecoder::new(self.config.clone())?;
        log::info!(
            "decoding {} ({} bytes, layout {})",
            self.reader.path().display(),
            self.reader.len(),
            self.config.layout
        );
        Ok(batch.decode_text(text))
    }
}

/// Opens, splits and decodes a telemetry file.
///
/// # Errors
/// See [`TelemetryFileReader::decode`].
pub fn decode_file<P: AsRef<Path>>(path: P, config: DecoderConfig) -> Result<BatchReport> {
    TelemetryFileReader::open_with_config(path, config)?.decode()
}
