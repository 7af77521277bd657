//! eltm-core: Core types for electron spectrometer telemetry processing.
//!
//! This crate provides the fixed instrument geometry and the canonical L1
//! [`Dataset`] and L2 [`ReducedDataset`] records shared by the decoder, the
//! aggregator and the format adapters. Multi-dimensional quantities are
//! `ndarray` arrays in standard (row-major) layout.

pub mod dataset;
pub mod dims;
pub mod error;
pub mod reduced;

pub use dataset::{
    AnomalyKind, Dataset, Epoch, GlobalAttributes, RangeAnomaly, COUNTS_AXES, COUNTS_SHAPE,
    ENERGY_AXES, ENERGY_SHAPE, HV_AXES, HV_SHAPE,
};
pub use dims::{
    Axis, Electrode, ENERGY_STEPS_EV, NUM_AZIMUTHAL, NUM_CYCLES, NUM_ELECTRODE, NUM_ENERGY,
    NUM_INCIDENT, PLANE_SIZE,
};
pub use error::{Error, ErrorKind, Result};
pub use ndarray::{Array2, Array4};
pub use reduced::ReducedDataset;
