//! eltm-l1: bit-exact decoding of electron spectrometer telemetry.
//!
//! This crate turns hex-encoded telemetry records into canonical
//! [`Dataset`](eltm_core::Dataset)s.
//!
//! # Key Components
//!
//! - [`BitCursor`] / [`BitWriter`] - MSB-first bit-level reader and writer
//! - [`RecordLayout`] - versioned, declarative field tables ([`LayoutVersion`])
//! - [`TelemetryDecoder`] - one hex payload to one dataset
//! - [`BlockSplitter`] - lazy `Bitstring <N>:` block splitting
//! - [`BatchDecoder`] - parallel decoding with per-bitstring error reporting
//! - [`encode`] / [`SyntheticGenerator`] - inverse encoding and test data
//!
//! # Processing Pipeline
//!
//! 1. **Split (sequential)**: recognise marker lines, validate declared indices
//! 2. **Decode (parallel)**: each block independently, on the rayon pool
//! 3. **Collate**: restore ascending declared index

pub mod batch;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod encode;
mod error;
pub mod layout;
pub mod splitter;
pub mod synth;

pub use batch::{BatchDecoder, BatchReport, DecodeOutcome};
pub use config::DecoderConfig;
pub use cursor::{BitCursor, BitWriter};
pub use decoder::{TelemetryDecoder, HV_RELATIVE_TOLERANCE};
pub use encode::{encode, encode_hex};
pub use error::{Error, Result};
pub use layout::{DecodeRule, FieldSpec, LayoutVersion, RecordLayout, Target, LAYOUT_V1, LAYOUT_V2};
pub use splitter::{split, Block, BlockSplitter, IndexPolicy};
pub use synth::SyntheticGenerator;
