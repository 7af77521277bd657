//! Canonical L1 dataset decoded from one telemetry bitstring.

use chrono::{DateTime, SecondsFormat, Utc};
use ndarray::{Array2, Array4};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dims::{Axis, Electrode, NUM_AZIMUTHAL, NUM_CYCLES, NUM_ELECTRODE, NUM_ENERGY, NUM_INCIDENT};
use crate::{Error, Result};

/// Shape of the count-like arrays (energy, azimuthal, incident, cycle).
pub const COUNTS_SHAPE: [usize; 4] = [NUM_ENERGY, NUM_AZIMUTHAL, NUM_INCIDENT, NUM_CYCLES];
/// Axis order of the count-like arrays.
pub const COUNTS_AXES: [Axis; 4] = [Axis::Energy, Axis::Azimuthal, Axis::Incident, Axis::Cycle];
/// Shape of `measure_energy` (energy, cycle).
pub const ENERGY_SHAPE: [usize; 2] = [NUM_ENERGY, NUM_CYCLES];
/// Axis order of `measure_energy`.
pub const ENERGY_AXES: [Axis; 2] = [Axis::Energy, Axis::Cycle];
/// Shape of `output_hv` (electrode, energy, incident, cycle).
pub const HV_SHAPE: [usize; 4] = [NUM_ELECTRODE, NUM_ENERGY, NUM_INCIDENT, NUM_CYCLES];
/// Axis order of `output_hv`.
pub const HV_AXES: [Axis; 4] = [Axis::Electrode, Axis::Energy, Axis::Incident, Axis::Cycle];

/// A per-cycle timestamp in milliseconds since the Unix epoch (UTC).
///
/// The ISO-8601 text is derived from `timestamp_ms` on demand and is never
/// stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawEpoch"))]
pub struct Epoch {
    /// Cycle number.
    pub cycle: usize,
    /// Milliseconds since 1970-01-01T00:00:00Z.
    pub timestamp_ms: u64,
}

impl Epoch {
    /// Creates an epoch, checking that the timestamp can be rendered.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimestamp`] if the timestamp is outside the calendar range.
    pub fn new(cycle: usize, timestamp_ms: u64) -> Result<Self> {
        let epoch = Self { cycle, timestamp_ms };
        epoch.datetime()?;
        Ok(epoch)
    }

    /// Timestamp as a UTC date-time.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimestamp`] if the timestamp is outside the calendar range.
    pub fn datetime(&self) -> Result<DateTime<Utc>> {
        i64::try_from(self.timestamp_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or(Error::InvalidTimestamp(self.timestamp_ms))
    }

    /// ISO-8601 rendering with millisecond precision, e.g. `2024-05-01T12:00:00.250Z`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimestamp`] if the timestamp is outside the calendar range.
    pub fn iso_text(&self) -> Result<String> {
        Ok(self
            .datetime()?
            .to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Recovers an epoch from its ISO-8601 rendering.
    ///
    /// # Errors
    /// Returns [`Error::InvalidIsoText`] if the text is not RFC 3339 or predates 1970.
    pub fn from_iso_text(cycle: usize, text: &str) -> Result<Self> {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| Error::InvalidIsoText(format!("{text}: {e}")))?;
        let timestamp_ms = u64::try_from(parsed.timestamp_millis())
            .map_err(|_| Error::InvalidIsoText(format!("{text}: before 1970-01-01")))?;
        Ok(Self { cycle, timestamp_ms })
    }
}

/// Wire form of an [`Epoch`]; `iso_format` is derived and ignored on input.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawEpoch {
    cycle: usize,
    timestamp_ms: u64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawEpoch> for Epoch {
    type Error = Error;

    fn try_from(raw: RawEpoch) -> Result<Self> {
        Epoch::new(raw.cycle, raw.timestamp_ms)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Epoch {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::{Error as _, SerializeStruct};

        let iso = self.iso_text().map_err(S::Error::custom)?;
        let mut state = serializer.serialize_struct("Epoch", 3)?;
        state.serialize_field("cycle", &self.cycle)?;
        state.serialize_field("timestamp_ms", &self.timestamp_ms)?;
        state.serialize_field("iso_format", &iso)?;
        state.end()
    }
}

/// Provenance metadata carried through decoding unchanged.
///
/// Keys keep their insertion order; inserting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalAttributes {
    entries: Vec<(String, String)>,
}

impl GlobalAttributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Inserts an attribute only if the key is absent.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.entries.push((key, value.into()));
        }
    }

    /// Value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GlobalAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Self::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

#[cfg(feature = "serde")]
impl Serialize for GlobalAttributes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for GlobalAttributes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AttrVisitor;

        impl<'de> serde::de::Visitor<'de> for AttrVisitor {
            type Value = GlobalAttributes;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of string attributes")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut attrs = GlobalAttributes::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    attrs.insert(k, v);
                }
                Ok(attrs)
            }
        }

        deserializer.deserialize_map(AttrVisitor)
    }
}

/// Why a decoded value was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AnomalyKind {
    /// Outside the field's nominal physical range.
    OutOfNominalRange,
    /// Timestamp not strictly later than the previous cycle.
    NonIncreasingTime,
    /// Measured energy not above the previous energy step.
    NonIncreasingEnergy,
    /// High voltage off the electrode's linear energy scaling.
    HvScaling,
}

/// An advisory observation about a decoded value.
///
/// Anomalies never abort decoding; structurally invalid values do.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangeAnomaly {
    /// Field name.
    pub field: String,
    /// Canonical multi-index of the value.
    pub position: Vec<usize>,
    /// Observed value.
    pub value: f64,
    /// Lower bound of the accepted range.
    pub nominal_min: f64,
    /// Upper bound of the accepted range.
    pub nominal_max: f64,
    /// Category of the observation.
    pub kind: AnomalyKind,
}

/// Decoded contents of one bitstring.
///
/// Count-like arrays are indexed `(energy, azimuthal, incident, cycle)`,
/// `measure_energy` is `(energy, cycle)` and `output_hv` is
/// `(electrode, energy, incident, cycle)`, all in standard (row-major) layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dataset {
    /// 1-based ordinal of the bitstring in the input.
    pub index: u32,
    /// Number of cycles; always [`NUM_CYCLES`].
    pub cycle_count: usize,
    /// Nominal epoch of each cycle.
    pub epochs: Vec<Epoch>,
    /// Electron counts.
    pub electron_counts: Array4<u32>,
    /// Background counts.
    pub bg_counts: Array4<u32>,
    /// Measured energy in eV.
    pub measure_energy: Array2<f64>,
    /// Electrode output voltage in V.
    pub output_hv: Array4<f64>,
    /// Start of data taking per cycle, if transmitted.
    #[cfg_attr(feature = "serde", serde(default))]
    pub datataking_time_start: Option<Vec<Epoch>>,
    /// Data-taking duration per cycle in seconds.
    pub data_time_duration: Vec<f64>,
    /// Quality flag per sample; 0 is good.
    pub data_quality: Array4<u8>,
    /// Provenance metadata.
    #[cfg_attr(feature = "serde", serde(default))]
    pub global_attributes: GlobalAttributes,
    /// Advisory range observations recorded during decoding.
    #[cfg_attr(feature = "serde", serde(default))]
    pub anomalies: Vec<RangeAnomaly>,
}

impl Dataset {
    /// Creates a zero-filled dataset with the instrument's fixed shapes.
    #[must_use]
    pub fn zeroed(index: u32) -> Self {
        let epochs: Vec<Epoch> = (0..NUM_CYCLES)
            .map(|cycle| Epoch {
                cycle,
                timestamp_ms: 0,
            })
            .collect();
        Self {
            index,
            cycle_count: NUM_CYCLES,
            datataking_time_start: Some(epochs.clone()),
            epochs,
            electron_counts: Array4::zeros(COUNTS_SHAPE),
            bg_counts: Array4::zeros(COUNTS_SHAPE),
            measure_energy: Array2::zeros(ENERGY_SHAPE),
            output_hv: Array4::zeros(HV_SHAPE),
            data_time_duration: vec![0.0; NUM_CYCLES],
            data_quality: Array4::zeros(COUNTS_SHAPE),
            global_attributes: GlobalAttributes::new(),
            anomalies: Vec::new(),
        }
    }

    /// Asserts every array against the fixed instrument dimensions.
    ///
    /// Per-cycle epochs must also sit at the position of their cycle number.
    ///
    /// # Errors
    /// - [`Error::DimensionMismatch`] for the first array whose shape differs.
    /// - [`Error::CycleMismatch`] for an epoch stored under the wrong cycle.
    pub fn validate_dimensions(&self) -> Result<()> {
        if self.cycle_count != NUM_CYCLES {
            return Err(Error::DimensionMismatch {
                array: "cycle_count",
                expected: vec![NUM_CYCLES],
                actual: vec![self.cycle_count],
            });
        }
        expect_cycles("epochs", &self.epochs)?;
        if let Some(start) = &self.datataking_time_start {
            expect_cycles("datataking_time_start", start)?;
        }
        expect_len("data_time_duration", self.data_time_duration.len())?;
        expect_shape("electron_counts", self.electron_counts.shape(), &COUNTS_SHAPE)?;
        expect_shape("bg_counts", self.bg_counts.shape(), &COUNTS_SHAPE)?;
        expect_shape("measure_energy", self.measure_energy.shape(), &ENERGY_SHAPE)?;
        expect_shape("output_hv", self.output_hv.shape(), &HV_SHAPE)?;
        expect_shape("data_quality", self.data_quality.shape(), &COUNTS_SHAPE)?;
        Ok(())
    }

    /// Per-cycle times used for L2 products: data-taking start if present, else epochs.
    #[must_use]
    pub fn timing_epochs(&self) -> &[Epoch] {
        self.datataking_time_start
            .as_deref()
            .unwrap_or(self.epochs.as_slice())
    }

    /// Output voltage of one electrode.
    #[must_use]
    pub fn output_hv_at(
        &self,
        electrode: Electrode,
        energy_idx: usize,
        incident_idx: usize,
        cycle: usize,
    ) -> Option<f64> {
        self.output_hv
            .get([electrode.index(), energy_idx, incident_idx, cycle])
            .copied()
    }

    /// Number of samples whose quality flag is non-zero.
    #[must_use]
    pub fn flagged_samples(&self) -> usize {
        self.data_quality.iter().filter(|&&q| q != 0).count()
    }
}

pub(crate) fn expect_shape(array: &'static str, actual: &[usize], expected: &[usize]) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            array,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

pub(crate) fn expect_cycles(array: &'static str, epochs: &[Epoch]) -> Result<()> {
    expect_len(array, epochs.len())?;
    match epochs.iter().enumerate().find(|(c, epoch)| epoch.cycle != *c) {
        Some((position, epoch)) => Err(Error::CycleMismatch {
            array,
            position,
            cycle: epoch.cycle,
        }),
        None => Ok(()),
    }
}

fn expect_len(array: &'static str, len: usize) -> Result<()> {
    if len == NUM_CYCLES {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            array,
            expected: vec![NUM_CYCLES],
            actual: vec![len],
        })
    }
}
