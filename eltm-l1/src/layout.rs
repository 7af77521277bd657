//! Versioned wire layouts of one telemetry record.
//!
//! A layout is an ordered table of field descriptors. Each descriptor names
//! the destination array, the bit width and decode rule of every element,
//! and the order in which the instrument transmits the element axes. The
//! decoder places every element at its canonical position, so a layout may
//! transmit axes in any permutation of the destination array's axes.

use std::fmt;
use std::str::FromStr;

use eltm_core::{Axis, COUNTS_AXES, ENERGY_AXES, HV_AXES};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Explicit layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutVersion {
    /// Byte-aligned layout of the ground-segment telemetry generator.
    #[default]
    V1,
    /// Fixed-point layout with non-byte-aligned widths.
    V2,
}

impl LayoutVersion {
    /// Every known version.
    pub const ALL: [LayoutVersion; 2] = [LayoutVersion::V1, LayoutVersion::V2];

    /// Static layout table of this version.
    #[must_use]
    pub fn layout(self) -> &'static RecordLayout {
        match self {
            LayoutVersion::V1 => &LAYOUT_V1,
            LayoutVersion::V2 => &LAYOUT_V2,
        }
    }

    /// Short tag, `v1` or `v2`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LayoutVersion::V1 => "v1",
            LayoutVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(LayoutVersion::V1),
            "v2" | "2" => Ok(LayoutVersion::V2),
            other => Err(Error::Config(format!("unknown layout version '{other}'"))),
        }
    }
}

/// How raw bits map to a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeRule {
    /// Unsigned integer.
    Unsigned,
    /// IEEE-754 binary32 or binary64, by field width.
    Ieee754,
    /// Unsigned integer mapped to `raw * scale + offset`.
    Scaled {
        /// Physical units per raw step.
        scale: f64,
        /// Physical value of raw 0.
        offset: f64,
    },
}

/// Destination array of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Nominal per-cycle epoch, ms since the Unix epoch.
    Epochs,
    /// Electron counts.
    ElectronCounts,
    /// Background counts.
    BgCounts,
    /// Measured energy, eV.
    MeasureEnergy,
    /// Electrode output voltage, V.
    OutputHv,
    /// Per-cycle data-taking start, ms since the Unix epoch.
    DatatakingTimeStart,
    /// Per-cycle data-taking duration, s.
    DataTimeDuration,
    /// Per-sample quality flag.
    DataQuality,
}

impl Target {
    /// Name of the destination array.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Target::Epochs => "epochs",
            Target::ElectronCounts => "electron_counts",
            Target::BgCounts => "bg_counts",
            Target::MeasureEnergy => "measure_energy",
            Target::OutputHv => "output_hv",
            Target::DatatakingTimeStart => "datataking_time_start",
            Target::DataTimeDuration => "data_time_duration",
            Target::DataQuality => "data_quality",
        }
    }

    /// Canonical axis order of the destination array.
    #[must_use]
    pub const fn axes(self) -> &'static [Axis] {
        match self {
            Target::Epochs | Target::DatatakingTimeStart | Target::DataTimeDuration => {
                &[Axis::Cycle]
            }
            Target::ElectronCounts | Target::BgCounts | Target::DataQuality => &COUNTS_AXES,
            Target::MeasureEnergy => &ENERGY_AXES,
            Target::OutputHv => &HV_AXES,
        }
    }

    /// Whether elements are stored as integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Target::Epochs
                | Target::DatatakingTimeStart
                | Target::ElectronCounts
                | Target::BgCounts
                | Target::DataQuality
        )
    }
}

/// Descriptor of one field of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Destination array.
    pub target: Target,
    /// Width of one element in bits.
    pub bits: u32,
    /// Numeric interpretation.
    pub rule: DecodeRule,
    /// Transmitted axis order, outer to inner.
    pub wire_axes: &'static [Axis],
    /// Advisory physical range; values outside are recorded, not rejected.
    pub nominal: Option<(f64, f64)>,
}

impl FieldSpec {
    /// Field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.target.name()
    }

    /// Number of elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.wire_axes.iter().map(|axis| axis.len()).product()
    }

    /// Width of the whole field in bits.
    #[must_use]
    pub fn total_bits(&self) -> usize {
        self.count() * self.bits as usize
    }

    /// Canonical flat offset of every element, in transmission order.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the wire axes are not a permutation of
    /// the destination axes.
    pub fn placement(&self) -> Result<Vec<usize>> {
        let canonical = self.target.axes();
        if !is_permutation(self.wire_axes, canonical) {
            return Err(Error::Config(format!(
                "{}: wire axes {:?} do not permute {:?}",
                self.name(),
                self.wire_axes,
                canonical
            )));
        }

        let canonical_shape: Vec<usize> = canonical.iter().map(|axis| axis.len()).collect();
        let canonical_strides = row_major_strides(&canonical_shape);
        let wire_shape: Vec<usize> = self.wire_axes.iter().map(|axis| axis.len()).collect();
        let wire_strides: Vec<usize> = self
            .wire_permutation()
            .into_iter()
            .map(|pos| canonical_strides[pos])
            .collect();

        let total = self.count();
        let mut offsets = Vec::with_capacity(total);
        let mut index = vec![0usize; wire_shape.len()];
        let mut offset = 0usize;
        for _ in 0..total {
            offsets.push(offset);
            for axis in (0..wire_shape.len()).rev() {
                index[axis] += 1;
                offset += wire_strides[axis];
                if index[axis] < wire_shape[axis] {
                    break;
                }
                offset -= wire_strides[axis] * wire_shape[axis];
                index[axis] = 0;
            }
        }
        Ok(offsets)
    }

    /// Canonical axis position of each wire axis, outer to inner.
    ///
    /// Permuting a canonical array by this order yields a view whose
    /// logical iteration order is the transmission order.
    #[must_use]
    pub fn wire_permutation(&self) -> Vec<usize> {
        let canonical = self.target.axes();
        self.wire_axes
            .iter()
            .filter_map(|axis| canonical.iter().position(|c| c == axis))
            .collect()
    }

    /// Canonical multi-index of a flat offset.
    #[must_use]
    pub fn position(&self, offset: usize) -> Vec<usize> {
        let axes = self.target.axes();
        let mut position = vec![0; axes.len()];
        let mut rest = offset;
        for (slot, axis) in position.iter_mut().zip(axes).rev() {
            *slot = rest % axis.len();
            rest /= axis.len();
        }
        position
    }

    fn validate(&self) -> Result<()> {
        if self.bits == 0 || self.bits > 64 {
            return Err(Error::Config(format!(
                "{}: width {} outside 1..=64",
                self.name(),
                self.bits
            )));
        }
        match self.rule {
            DecodeRule::Ieee754 if self.bits != 32 && self.bits != 64 => {
                Err(Error::Config(format!(
                    "{}: IEEE-754 width must be 32 or 64, got {}",
                    self.name(),
                    self.bits
                )))
            }
            DecodeRule::Ieee754 | DecodeRule::Scaled { .. } if self.target.is_integer() => {
                Err(Error::Config(format!(
                    "{}: integer array requires an unsigned rule",
                    self.name()
                )))
            }
            DecodeRule::Scaled { scale, offset } if !scale.is_finite() || !offset.is_finite() => {
                Err(Error::Config(format!(
                    "{}: scale and offset must be finite",
                    self.name()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Ordered field table of one layout version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordLayout {
    /// Version tag.
    pub version: LayoutVersion,
    /// Fields in decode order.
    pub fields: &'static [FieldSpec],
}

impl RecordLayout {
    /// Exact record length in bits.
    #[must_use]
    pub fn total_bits(&self) -> usize {
        self.fields.iter().map(FieldSpec::total_bits).sum()
    }

    /// Record length in whole bytes; the final byte may carry zero padding.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bits().div_ceil(8)
    }

    /// Descriptor of a destination array, if the layout transmits it.
    #[must_use]
    pub fn field(&self, target: Target) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.target == target)
    }

    /// Checks widths, rules and axis permutations of every field.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            field.validate()?;
            field.placement()?;
            if seen.contains(&field.target) {
                return Err(Error::Config(format!(
                    "layout {}: {} listed twice",
                    self.version,
                    field.name()
                )));
            }
            seen.push(field.target);
        }
        for required in [Target::Epochs, Target::ElectronCounts] {
            if !seen.contains(&required) {
                return Err(Error::Config(format!(
                    "layout {}: missing {}",
                    self.version,
                    required.name()
                )));
            }
        }
        Ok(())
    }
}

fn is_permutation(wire: &[Axis], canonical: &[Axis]) -> bool {
    wire.len() == canonical.len()
        && canonical.iter().all(|axis| wire.contains(axis))
        && wire.iter().all(|axis| canonical.contains(axis))
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

const CYCLE: &[Axis] = &[Axis::Cycle];
const INCIDENT_MAJOR: &[Axis] = &[Axis::Incident, Axis::Azimuthal, Axis::Energy, Axis::Cycle];

const COUNTS_NOMINAL: Option<(f64, f64)> = Some((0.0, 1000.0));
const BG_NOMINAL: Option<(f64, f64)> = Some((0.0, 100.0));
const ENERGY_NOMINAL: Option<(f64, f64)> = Some((100.0, 7000.0));
const HV_NOMINAL: Option<(f64, f64)> = Some((0.0, 3500.0));
const DURATION_NOMINAL: Option<(f64, f64)> = Some((60.0, 100.0));

/// Layout of the ground-segment telemetry generator, 206 820 bytes.
pub static LAYOUT_V1: RecordLayout = RecordLayout {
    version: LayoutVersion::V1,
    fields: &[
        FieldSpec {
            target: Target::Epochs,
            bits: 64,
            rule: DecodeRule::Unsigned,
            wire_axes: CYCLE,
            nominal: None,
        },
        FieldSpec {
            target: Target::ElectronCounts,
            bits: 16,
            rule: DecodeRule::Unsigned,
            wire_axes: INCIDENT_MAJOR,
            nominal: COUNTS_NOMINAL,
        },
        FieldSpec {
            target: Target::BgCounts,
            bits: 16,
            rule: DecodeRule::Unsigned,
            wire_axes: INCIDENT_MAJOR,
            nominal: BG_NOMINAL,
        },
        FieldSpec {
            target: Target::MeasureEnergy,
            bits: 32,
            rule: DecodeRule::Ieee754,
            wire_axes: &ENERGY_AXES,
            nominal: ENERGY_NOMINAL,
        },
        FieldSpec {
            target: Target::OutputHv,
            bits: 32,
            rule: DecodeRule::Ieee754,
            wire_axes: &HV_AXES,
            nominal: HV_NOMINAL,
        },
        FieldSpec {
            target: Target::DatatakingTimeStart,
            bits: 64,
            rule: DecodeRule::Unsigned,
            wire_axes: CYCLE,
            nominal: None,
        },
        FieldSpec {
            target: Target::DataTimeDuration,
            bits: 32,
            rule: DecodeRule::Ieee754,
            wire_axes: CYCLE,
            nominal: DURATION_NOMINAL,
        },
        FieldSpec {
            target: Target::DataQuality,
            bits: 8,
            rule: DecodeRule::Unsigned,
            wire_axes: &COUNTS_AXES,
            nominal: None,
        },
    ],
};

/// Fixed-point layout in canonical axis order, 1 056 960 bits.
pub static LAYOUT_V2: RecordLayout = RecordLayout {
    version: LayoutVersion::V2,
    fields: &[
        FieldSpec {
            target: Target::Epochs,
            bits: 64,
            rule: DecodeRule::Unsigned,
            wire_axes: CYCLE,
            nominal: None,
        },
        FieldSpec {
            target: Target::ElectronCounts,
            bits: 10,
            rule: DecodeRule::Unsigned,
            wire_axes: &COUNTS_AXES,
            nominal: COUNTS_NOMINAL,
        },
        FieldSpec {
            target: Target::BgCounts,
            bits: 7,
            rule: DecodeRule::Unsigned,
            wire_axes: &COUNTS_AXES,
            nominal: BG_NOMINAL,
        },
        FieldSpec {
            target: Target::MeasureEnergy,
            bits: 13,
            rule: DecodeRule::Scaled {
                scale: 1.0,
                offset: 100.0,
            },
            wire_axes: &ENERGY_AXES,
            nominal: ENERGY_NOMINAL,
        },
        FieldSpec {
            target: Target::OutputHv,
            bits: 22,
            rule: DecodeRule::Scaled {
                scale: 0.001,
                offset: 0.0,
            },
            wire_axes: &HV_AXES,
            nominal: HV_NOMINAL,
        },
        FieldSpec {
            target: Target::DatatakingTimeStart,
            bits: 64,
            rule: DecodeRule::Unsigned,
            wire_axes: CYCLE,
            nominal: None,
        },
        FieldSpec {
            target: Target::DataTimeDuration,
            bits: 16,
            rule: DecodeRule::Scaled {
                scale: 0.01,
                offset: 0.0,
            },
            wire_axes: CYCLE,
            nominal: DURATION_NOMINAL,
        },
        FieldSpec {
            target: Target::DataQuality,
            bits: 8,
            rule: DecodeRule::Unsigned,
            wire_axes: &COUNTS_AXES,
            nominal: None,
        },
    ],
};
