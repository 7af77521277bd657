//! Per-energy, per-cycle reduction of electron counts.

#![allow(clippy::cast_precision_loss)]

use eltm_core::{Dataset, Error, ReducedDataset, Result, COUNTS_SHAPE, PLANE_SIZE};
use log::debug;
use ndarray::Axis;
use rayon::prelude::*;

const AZIMUTHAL_AXIS: Axis = Axis(1);
const INCIDENT_AXIS: Axis = Axis(2);

/// Reduces L1 datasets to L2.
#[derive(Debug, Clone, Copy)]
pub struct L2Aggregator {
    parallel: bool,
}

impl Default for L2Aggregator {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl L2Aggregator {
    /// Creates an aggregator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether batches are reduced on the rayon pool.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reduces one dataset.
    ///
    /// # Errors
    /// Returns [`eltm_core::Error::DimensionMismatch`] if the count array or
    /// timing arrays disagree with the instrument dimensions.
    pub fn aggregate(&self, dataset: &Dataset) -> Result<ReducedDataset> {
        let shape = dataset.electron_counts.shape();
        if shape != COUNTS_SHAPE {
            return Err(Error::DimensionMismatch {
                array: "electron_counts",
                expected: COUNTS_SHAPE.to_vec(),
                actual: shape.to_vec(),
            });
        }

        // Widen before summing; the incident axis goes first so the azimuthal
        // axis keeps its index.
        let total = dataset
            .electron_counts
            .mapv(u64::from)
            .sum_axis(INCIDENT_AXIS)
            .sum_axis(AZIMUTHAL_AXIS);
        let mean = total.mapv(|t| t as f64 / PLANE_SIZE as f64);

        let reduced = ReducedDataset {
            index: dataset.index,
            total_counts_per_energy: total,
            mean_counts_per_energy: mean,
            epoch: dataset.timing_epochs().to_vec(),
            duration: dataset.data_time_duration.clone(),
        };
        reduced.validate_dimensions()?;
        debug!("aggregated bitstring {}", dataset.index);
        Ok(reduced)
    }

    /// Reduces a batch, one result per input in input order.
    pub fn aggregate_all(&self, datasets: &[Dataset]) -> Vec<Result<ReducedDataset>> {
        if self.parallel {
            datasets.par_iter().map(|d| self.aggregate(d)).collect()
        } else {
            datasets.iter().map(|d| self.aggregate(d)).collect()
        }
    }
}

/// Reduces one dataset with default settings.
///
/// # Errors
/// See [`L2Aggregator::aggregate`].
pub fn aggregate(dataset: &Dataset) -> Result<ReducedDataset> {
    L2Aggregator::new().aggregate(dataset)
}

/// Reduces a batch in parallel, preserving input order.
pub fn aggregate_all(datasets: &[Dataset]) -> Vec<Result<ReducedDataset>> {
    L2Aggregator::new().aggregate_all(datasets)
}
