//! Fixed instrument geometry.
//!
//! The cardinal dimensions are constants of the instrument definition.
//! Every stage asserts them against the arrays it receives instead of
//! inferring sizes from data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of energy sweep steps.
pub const NUM_ENERGY: usize = 16;
/// Number of azimuthal angle bins.
pub const NUM_AZIMUTHAL: usize = 7;
/// Number of incident angle bins.
pub const NUM_INCIDENT: usize = 6;
/// Number of sampling cycles per bitstring.
pub const NUM_CYCLES: usize = 45;
/// Number of high-voltage electrodes.
pub const NUM_ELECTRODE: usize = 3;

/// Size of one azimuthal x incident plane.
pub const PLANE_SIZE: usize = NUM_AZIMUTHAL * NUM_INCIDENT;

/// Sweep energies in eV, indexed by energy step.
pub const ENERGY_STEPS_EV: [f64; NUM_ENERGY] = [
    100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0, 2000.0, 3000.0, 4000.0,
    5000.0, 6000.0, 7000.0,
];

/// An axis of a decoded array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Axis {
    /// Energy step.
    Energy,
    /// Azimuthal angle bin.
    Azimuthal,
    /// Incident angle bin.
    Incident,
    /// Sampling cycle.
    Cycle,
    /// High-voltage electrode.
    Electrode,
}

impl Axis {
    /// Fixed length of this axis.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Axis::Energy => NUM_ENERGY,
            Axis::Azimuthal => NUM_AZIMUTHAL,
            Axis::Incident => NUM_INCIDENT,
            Axis::Cycle => NUM_CYCLES,
            Axis::Electrode => NUM_ELECTRODE,
        }
    }

    /// Axis name as used in adapter metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Axis::Energy => "energy",
            Axis::Azimuthal => "azimuthal",
            Axis::Incident => "incident",
            Axis::Cycle => "cycle",
            Axis::Electrode => "electrode",
        }
    }
}

/// High-voltage electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Electrode {
    /// Upper electrode, held at 0 V.
    Upper,
    /// Middle electrode.
    Middle,
    /// Lower electrode.
    Lower,
}

impl Electrode {
    /// All electrodes in axis order.
    pub const ALL: [Electrode; NUM_ELECTRODE] = [Electrode::Upper, Electrode::Middle, Electrode::Lower];

    /// Position on the electrode axis.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Electrode::Upper => 0,
            Electrode::Middle => 1,
            Electrode::Lower => 2,
        }
    }

    /// Electrode name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Electrode::Upper => "upper",
            Electrode::Middle => "middle",
            Electrode::Lower => "lower",
        }
    }

    /// Ratio of output voltage to sweep energy (V per eV).
    #[must_use]
    pub const fn hv_factor(self) -> f64 {
        match self {
            Electrode::Upper => 0.0,
            Electrode::Middle => 0.46,
            Electrode::Lower => 0.16,
        }
    }

    /// Nominal output voltage at an energy step.
    ///
    /// Returns `None` for an energy index outside the sweep table.
    #[must_use]
    pub fn nominal_hv(self, energy_idx: usize) -> Option<f64> {
        ENERGY_STEPS_EV
            .get(energy_idx)
            .map(|energy| energy * self.hv_factor())
    }
}
