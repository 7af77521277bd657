//! L2 reduced dataset.

use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dataset::{expect_cycles, expect_shape, Epoch, ENERGY_SHAPE};
use crate::dims::NUM_CYCLES;
use crate::{Error, Result};

/// Per-energy, per-cycle reduction of one bitstring's electron counts.
///
/// Both count arrays are indexed `(energy, cycle)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReducedDataset {
    /// Index of the source bitstring.
    pub index: u32,
    /// Sum of electron counts over the azimuthal x incident plane.
    pub total_counts_per_energy: Array2<u64>,
    /// Total divided by the plane size.
    pub mean_counts_per_energy: Array2<f64>,
    /// Per-cycle start time.
    pub epoch: Vec<Epoch>,
    /// Per-cycle duration in seconds.
    pub duration: Vec<f64>,
}

impl ReducedDataset {
    /// Asserts the fixed L2 shapes and the cycle labels of `epoch`.
    ///
    /// # Errors
    /// - [`Error::DimensionMismatch`] for the first array whose shape differs.
    /// - [`Error::CycleMismatch`] for an epoch stored under the wrong cycle.
    pub fn validate_dimensions(&self) -> Result<()> {
        expect_shape(
            "total_counts_per_energy",
            self.total_counts_per_energy.shape(),
            &ENERGY_SHAPE,
        )?;
        expect_shape(
            "mean_counts_per_energy",
            self.mean_counts_per_energy.shape(),
            &ENERGY_SHAPE,
        )?;
        expect_cycles("epoch", &self.epoch)?;
        if self.duration.len() != NUM_CYCLES {
            return Err(Error::DimensionMismatch {
                array: "duration",
                expected: vec![NUM_CYCLES],
                actual: vec![self.duration.len()],
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduced() -> ReducedDataset {
        let epoch = (0..NUM_CYCLES)
            .map(|c| Epoch::new(c, 80_000 * c as u64).unwrap())
            .collect();
        ReducedDataset {
            index: 1,
            total_counts_per_energy: Array2::zeros(ENERGY_SHAPE),
            mean_counts_per_energy: Array2::zeros(ENERGY_SHAPE),
            epoch,
            duration: vec![70.0; NUM_CYCLES],
        }
    }

    #[test]
    fn test_validate_dimensions() {
        let mut l2 = reduced();
        assert!(l2.validate_dimensions().is_ok());
        l2.duration.pop();
        let err = l2.validate_dimensions().unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { array: "duration", .. }));
    }

    #[test]
    fn test_validate_dimensions_checks_epoch_cycles() {
        let mut l2 = reduced();
        l2.epoch.rotate_left(1);
        assert!(matches!(
            l2.validate_dimensions(),
            Err(Error::CycleMismatch {
                array: "epoch",
                position: 0,
                cycle: 1
            })
        ));
    }

    #[test]
    fn test_validate_dimensions_checks_totals_shape() {
        let mut l2 = reduced();
        l2.total_counts_per_energy = Array2::zeros([NUM_CYCLES, 16]);
        assert!(matches!(
            l2.validate_dimensions(),
            Err(Error::DimensionMismatch {
                array: "total_counts_per_energy",
                ..
            })
        ));
    }
}
