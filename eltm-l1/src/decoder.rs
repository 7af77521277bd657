//! Telemetry record decoder.

#![allow(clippy::cast_precision_loss)]

use eltm_core::{
    AnomalyKind, Dataset, Electrode, Epoch, GlobalAttributes, RangeAnomaly, NUM_ENERGY,
};
use log::{debug, warn};
use ndarray::{s, ArrayViewMut, ArrayViewMut1, Dimension, IxDyn};

use crate::cursor::BitCursor;
use crate::layout::{DecodeRule, FieldSpec, LayoutVersion, RecordLayout, Target};
use crate::{DecoderConfig, Error, Result};

/// Relative tolerance of the electrode voltage scaling check.
pub const HV_RELATIVE_TOLERANCE: f64 = 1e-4;

/// Decodes hex payloads of one layout version into [`Dataset`]s.
///
/// Placement tables are computed once; a decoder is immutable afterwards
/// and can be shared across threads.
#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    layout: &'static RecordLayout,
    plans: Vec<FieldPlan>,
    attributes: GlobalAttributes,
}

/// Precomputed wire-to-canonical mapping of one field.
#[derive(Debug, Clone)]
struct FieldPlan {
    field: &'static FieldSpec,
    placement: Vec<usize>,
    permutation: IxDyn,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    raw: u64,
    value: f64,
}

impl TelemetryDecoder {
    /// Creates a decoder for a layout version.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the layout table is inconsistent.
    pub fn new(version: LayoutVersion) -> Result<Self> {
        let layout = version.layout();
        layout.validate()?;
        let plans = layout
            .fields
            .iter()
            .map(|field| {
                Ok(FieldPlan {
                    field,
                    placement: field.placement()?,
                    permutation: IxDyn(&field.wire_permutation()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layout,
            plans,
            attributes: GlobalAttributes::new(),
        })
    }

    /// Creates a decoder from a configuration.
    ///
    /// # Errors
    /// Same as [`TelemetryDecoder::new`].
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        Ok(Self::new(config.layout)?.with_attributes(config.global_attributes.clone()))
    }

    /// Sets the global attributes copied into every decoded dataset.
    #[must_use]
    pub fn with_attributes(mut self, attributes: GlobalAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Layout table in use.
    #[must_use]
    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    /// Global attributes copied into every decoded dataset.
    #[must_use]
    pub fn attributes(&self) -> &GlobalAttributes {
        &self.attributes
    }

    /// Decodes one hex payload.
    ///
    /// # Errors
    /// - [`Error::InvalidHex`] for non-hex characters or odd length.
    /// - [`Error::TruncatedInput`] if the payload ends inside a field.
    /// - [`Error::DecodeRange`] for structurally invalid values.
    /// - [`Error::LayoutMismatch`] if bits remain after the last field.
    pub fn decode(&self, hex_payload: &str, index: u32) -> Result<Dataset> {
        let bytes = hex::decode(hex_payload)?;
        self.decode_bytes(&bytes, index)
    }

    /// Decodes one raw record.
    ///
    /// # Errors
    /// Same as [`TelemetryDecoder::decode`], minus hex errors.
    pub fn decode_bytes(&self, bytes: &[u8], index: u32) -> Result<Dataset> {
        let mut cursor = BitCursor::new(bytes);
        let mut dataset = Dataset::zeroed(index);
        let mut anomalies = Vec::new();

        for plan in &self.plans {
            let mut reader = FieldReader {
                cursor: &mut cursor,
                plan,
                anomalies: &mut anomalies,
            };
            match plan.field.target {
                Target::Epochs => {
                    reader.fill(ArrayViewMut1::from(dataset.epochs.as_mut_slice()), timestamp)?;
                }
                Target::DatatakingTimeStart => {
                    let start = dataset
                        .datataking_time_start
                        .get_or_insert_with(|| dataset.epochs.clone());
                    reader.fill(ArrayViewMut1::from(start.as_mut_slice()), timestamp)?;
                }
                Target::ElectronCounts => reader.fill(dataset.electron_counts.view_mut(), count)?,
                Target::BgCounts => reader.fill(dataset.bg_counts.view_mut(), count)?,
                Target::DataQuality => reader.fill(dataset.data_quality.view_mut(), |_, sample| {
                    u8::try_from(sample.raw).map_err(|_| "flag exceeds 8 bits")
                })?,
                Target::MeasureEnergy => reader.fill(dataset.measure_energy.view_mut(), value)?,
                Target::OutputHv => reader.fill(dataset.output_hv.view_mut(), value)?,
                Target::DataTimeDuration => reader.fill(
                    ArrayViewMut1::from(dataset.data_time_duration.as_mut_slice()),
                    value,
                )?,
            }
        }

        let remaining_bits = cursor.remaining_bits();
        // Only the zero padding of the final partial byte may remain.
        let padding = self.layout.total_bytes() * 8 - self.layout.total_bits();
        if remaining_bits > padding {
            return Err(Error::LayoutMismatch {
                layout: self.layout.version,
                remaining_bits,
            });
        }

        if self.layout.field(Target::DatatakingTimeStart).is_none() {
            dataset.datataking_time_start = None;
        }
        check_time_order("epochs", &dataset.epochs, &mut anomalies);
        if let Some(start) = &dataset.datataking_time_start {
            check_time_order("datataking_time_start", start, &mut anomalies);
        }
        check_energy_order(&dataset, &mut anomalies);
        check_hv_scaling(&dataset, &mut anomalies);

        dataset.validate_dimensions()?;
        dataset.global_attributes = self.attributes.clone();

        debug!(
            "decoded bitstring {index} ({} bytes, layout {})",
            bytes.len(),
            self.layout.version
        );
        if !anomalies.is_empty() {
            warn!(
                "bitstring {index}: {} values outside nominal range or scaling",
                anomalies.len()
            );
        }
        dataset.anomalies = anomalies;
        Ok(dataset)
    }
}

/// Reads the elements of one field into their canonical positions.
struct FieldReader<'r, 'b> {
    cursor: &'r mut BitCursor<'b>,
    plan: &'r FieldPlan,
    anomalies: &'r mut Vec<RangeAnomaly>,
}

impl FieldReader<'_, '_> {
    /// Fills `target` in transmission order.
    ///
    /// The target is viewed with its axes permuted into wire order, so
    /// sequential reads land at their canonical positions. `convert` turns a
    /// sample at a canonical flat offset into the stored element.
    fn fill<T, D: Dimension>(
        &mut self,
        target: ArrayViewMut<'_, T, D>,
        convert: impl Fn(usize, Sample) -> std::result::Result<T, &'static str>,
    ) -> Result<()> {
        let field = self.plan.field;
        let mut wire = target.into_dyn().permuted_axes(self.plan.permutation.clone());
        for (slot, &offset) in wire.iter_mut().zip(&self.plan.placement) {
            let sample = read_sample(self.cursor, field).map_err(|e| e.with_field(field.name()))?;
            check_structure(field, offset, sample)?;
            if let Some((min, max)) = field.nominal {
                if sample.value < min || sample.value > max {
                    self.anomalies.push(RangeAnomaly {
                        field: field.name().to_string(),
                        position: field.position(offset),
                        value: sample.value,
                        nominal_min: min,
                        nominal_max: max,
                        kind: AnomalyKind::OutOfNominalRange,
                    });
                }
            }
            *slot = convert(offset, sample).map_err(|reason| Error::DecodeRange {
                field: field.name(),
                position: field.position(offset),
                value: sample.value,
                reason,
            })?;
        }
        Ok(())
    }
}

fn timestamp(cycle: usize, sample: Sample) -> std::result::Result<Epoch, &'static str> {
    Epoch::new(cycle, sample.raw).map_err(|_| "timestamp outside calendar range")
}

fn count(_: usize, sample: Sample) -> std::result::Result<u32, &'static str> {
    u32::try_from(sample.raw).map_err(|_| "count exceeds 32 bits")
}

#[allow(clippy::unnecessary_wraps)]
fn value(_: usize, sample: Sample) -> std::result::Result<f64, &'static str> {
    Ok(sample.value)
}

fn read_sample(cursor: &mut BitCursor<'_>, field: &FieldSpec) -> Result<Sample> {
    match field.rule {
        DecodeRule::Unsigned => {
            let raw = cursor.read_uint(field.bits)?;
            Ok(Sample {
                raw,
                value: raw as f64,
            })
        }
        DecodeRule::Ieee754 => {
            let value = cursor.read_ieee(field.bits)?;
            Ok(Sample { raw: 0, value })
        }
        DecodeRule::Scaled { scale, offset } => {
            let raw = cursor.read_uint(field.bits)?;
            Ok(Sample {
                raw,
                value: raw as f64 * scale + offset,
            })
        }
    }
}

fn check_structure(field: &FieldSpec, offset: usize, sample: Sample) -> Result<()> {
    let reason = if !sample.value.is_finite() {
        Some("not a finite number")
    } else if sample.value < 0.0 {
        Some("negative value")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::DecodeRange {
            field: field.name(),
            position: field.position(offset),
            value: sample.value,
            reason,
        }),
        None => Ok(()),
    }
}

fn check_time_order(field: &str, epochs: &[Epoch], anomalies: &mut Vec<RangeAnomaly>) {
    for pair in epochs.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.timestamp_ms <= prev.timestamp_ms {
            anomalies.push(RangeAnomaly {
                field: field.to_string(),
                position: vec![next.cycle],
                value: next.timestamp_ms as f64,
                nominal_min: prev.timestamp_ms as f64,
                nominal_max: f64::MAX,
                kind: AnomalyKind::NonIncreasingTime,
            });
        }
    }
}

fn check_energy_order(dataset: &Dataset, anomalies: &mut Vec<RangeAnomaly>) {
    for (cycle, sweep) in dataset.measure_energy.columns().into_iter().enumerate() {
        for e in 1..sweep.len() {
            let (prev, value) = (sweep[e - 1], sweep[e]);
            if value <= prev {
                anomalies.push(RangeAnomaly {
                    field: "measure_energy".to_string(),
                    position: vec![e, cycle],
                    value,
                    nominal_min: prev,
                    nominal_max: f64::MAX,
                    kind: AnomalyKind::NonIncreasingEnergy,
                });
            }
        }
    }
}

fn check_hv_scaling(dataset: &Dataset, anomalies: &mut Vec<RangeAnomaly>) {
    for electrode in Electrode::ALL {
        for e in 0..NUM_ENERGY {
            let Some(expected) = electrode.nominal_hv(e) else {
                continue;
            };
            let tolerance = HV_RELATIVE_TOLERANCE * expected.abs().max(1.0);
            let plane = dataset.output_hv.slice(s![electrode.index(), e, .., ..]);
            for ((i, c), &value) in plane.indexed_iter() {
                if (value - expected).abs() > tolerance {
                    anomalies.push(RangeAnomaly {
                        field: "output_hv".to_string(),
                        position: vec![electrode.index(), e, i, c],
                        value,
                        nominal_min: expected - tolerance,
                        nominal_max: expected + tolerance,
                        kind: AnomalyKind::HvScaling,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::BitWriter;
    use eltm_core::{NUM_CYCLES, NUM_INCIDENT};

    /// All-zero v1 record with element `n` of `target` replaced by `write`.
    fn v1_record_with(target: Target, n: usize, write: impl Fn(&mut BitWriter, u32)) -> Vec<u8> {
        let layout = LayoutVersion::V1.layout();
        let mut writer = BitWriter::with_capacity(layout.total_bits());
        for field in layout.fields {
            for m in 0..field.count() {
                if field.target == target && m == n {
                    write(&mut writer, field.bits);
                } else {
                    writer.write_uint(0, field.bits).unwrap();
                }
            }
        }
        writer.into_bytes()
    }

    fn zero_payload(version: LayoutVersion) -> String {
        "00".repeat(version.layout().total_bytes())
    }

    #[test]
    fn test_all_zero_v2_record() {
        let decoder = TelemetryDecoder::new(LayoutVersion::V2).unwrap();
        let dataset = decoder.decode(&zero_payload(LayoutVersion::V2), 1).unwrap();

        assert_eq!(dataset.index, 1);
        assert!(dataset.electron_counts.iter().all(|&c| c == 0));
        assert!(dataset.bg_counts.iter().all(|&c| c == 0));
        for c in 0..NUM_CYCLES {
            assert_eq!(dataset.measure_energy.get([0, c]), Some(&100.0));
        }
        for e in 0..NUM_ENERGY {
            for i in 0..NUM_INCIDENT {
                for c in 0..NUM_CYCLES {
                    assert_eq!(dataset.output_hv_at(Electrode::Upper, e, i, c), Some(0.0));
                }
            }
        }
    }

    #[test]
    fn test_all_zero_v1_record_flags_anomalies() {
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let dataset = decoder.decode(&zero_payload(LayoutVersion::V1), 7).unwrap();
        assert_eq!(dataset.index, 7);
        assert!(dataset
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::NonIncreasingTime && a.field == "epochs"));
        assert!(dataset
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::OutOfNominalRange && a.field == "data_time_duration"));
        assert!(dataset.anomalies.iter().all(|a| a.field != "electron_counts"));
    }

    #[test]
    fn test_empty_payload_truncated_on_first_field() {
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let err = decoder.decode("", 1).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedInput {
                field: Some("epochs"),
                byte_offset: 0,
                requested_bits: 64,
                remaining_bits: 0
            }
        ));
    }

    #[test]
    fn test_invalid_hex() {
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        assert!(matches!(decoder.decode("0g", 1), Err(Error::InvalidHex(_))));
        assert!(matches!(decoder.decode("000", 1), Err(Error::InvalidHex(_))));
    }

    #[test]
    fn test_negative_float_is_structural_failure() {
        let bytes = v1_record_with(Target::MeasureEnergy, 3, |w, bits| {
            w.write_ieee(-5.0, bits).unwrap();
        });
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let err = decoder.decode_bytes(&bytes, 1).unwrap_err();
        match err {
            Error::DecodeRange {
                field, position, ..
            } => {
                assert_eq!(field, "measure_energy");
                assert_eq!(position, vec![0, 3]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_attributes_passed_through() {
        let attrs: GlobalAttributes = [("Mission", "Test"), ("PI_name", "Nobody")]
            .into_iter()
            .collect();
        let decoder = TelemetryDecoder::new(LayoutVersion::V2)
            .unwrap()
            .with_attributes(attrs.clone());
        let dataset = decoder.decode(&zero_payload(LayoutVersion::V2), 2).unwrap();
        assert_eq!(dataset.global_attributes, attrs);
    }

    #[test]
    fn test_unrenderable_epoch_is_structural_failure() {
        let bytes = v1_record_with(Target::Epochs, 3, |w, bits| {
            w.write_uint(u64::MAX, bits).unwrap();
        });
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        match decoder.decode_bytes(&bytes, 1).unwrap_err() {
            Error::DecodeRange {
                field,
                position,
                reason,
                ..
            } => {
                assert_eq!(field, "epochs");
                assert_eq!(position, vec![3]);
                assert_eq!(reason, "timestamp outside calendar range");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unrenderable_start_time_is_structural_failure() {
        let bytes = v1_record_with(Target::DatatakingTimeStart, 44, |w, bits| {
            w.write_uint(u64::MAX, bits).unwrap();
        });
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let err = decoder.decode_bytes(&bytes, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::DecodeRange {
                field: "datataking_time_start",
                ..
            }
        ));
        assert_eq!(err.kind(), eltm_core::ErrorKind::DecodeRange);
    }

    #[test]
    fn test_non_finite_float_is_structural_failure() {
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();

        // (energy 1, cycle 2) sits at offset 1 * 45 + 2 in the energy-major wire order.
        let nan = v1_record_with(Target::MeasureEnergy, 47, |w, bits| {
            w.write_ieee(f64::NAN, bits).unwrap();
        });
        match decoder.decode_bytes(&nan, 1).unwrap_err() {
            Error::DecodeRange {
                field,
                position,
                value,
                reason,
            } => {
                assert_eq!(field, "measure_energy");
                assert_eq!(position, vec![1, 2]);
                assert!(value.is_nan());
                assert_eq!(reason, "not a finite number");
            }
            other => panic!("unexpected error: {other}"),
        }

        let inf = v1_record_with(Target::OutputHv, 0, |w, bits| {
            w.write_uint(0x7f80_0000, bits).unwrap();
        });
        match decoder.decode_bytes(&inf, 1).unwrap_err() {
            Error::DecodeRange {
                field, position, ..
            } => {
                assert_eq!(field, "output_hv");
                assert_eq!(position, vec![0, 0, 0, 0]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_incident_major_counts_land_canonically() {
        // Wire element (incident 1, azimuthal 0, energy 0, cycle 0) of the v1 counts.
        let bytes = v1_record_with(Target::ElectronCounts, 7 * 16 * 45, |w, bits| {
            w.write_uint(321, bits).unwrap();
        });
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let dataset = decoder.decode_bytes(&bytes, 1).unwrap();
        assert_eq!(dataset.electron_counts[[0, 0, 1, 0]], 321);
        assert_eq!(dataset.electron_counts.iter().map(|&c| u64::from(c)).sum::<u64>(), 321);
    }
}
