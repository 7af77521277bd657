//! eltm-io: file adapters for eltm datasets.
//!
//! Telemetry text is read through memory-mapped files via memmap2. Decoded
//! datasets and reduced records are written as JSON, CSV or (with the
//! `hdf5` feature) HDF5. None of the adapters add decoding logic.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod json;
mod reader;
mod writer;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{read_l1_hdf5, read_l2_hdf5, write_l1_hdf5, write_l2_hdf5, Hdf5WriteOptions, L2Archive};
pub use json::{read_l1_json, read_l2_json, write_l1_json, write_l2_json};
pub use reader::{decode_file, MappedFileReader, TelemetryFileReader};
pub use writer::{write_l2_csv, L2CsvWriter, L2_CSV_HEADER};
