//! Record encoder, the exact inverse of [`TelemetryDecoder`](crate::TelemetryDecoder).

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use eltm_core::Dataset;
use ndarray::{ArrayView, ArrayView1, Dimension, IxDyn};

use crate::cursor::BitWriter;
use crate::layout::{DecodeRule, FieldSpec, LayoutVersion, Target};
use crate::{Error, Result};

/// Encodes a dataset into one raw record.
///
/// Values are written in each field's wire order. Scaled values are rounded
/// to the nearest raw step.
///
/// # Errors
/// - [`Error::Core`] if the dataset does not have the instrument shapes.
/// - [`Error::Config`] if the layout table is inconsistent.
/// - [`Error::Encode`] if a value is negative, not finite, or too wide for its field.
pub fn encode(dataset: &Dataset, version: LayoutVersion) -> Result<Vec<u8>> {
    dataset.validate_dimensions()?;
    let layout = version.layout();
    layout.validate()?;
    let mut writer = BitWriter::with_capacity(layout.total_bits());
    for field in layout.fields {
        write_field(&mut writer, dataset, field).map_err(|e| e.with_field(field.name()))?;
    }
    Ok(writer.into_bytes())
}

/// Encodes a dataset into a lowercase hex payload.
///
/// # Errors
/// Same as [`encode`].
pub fn encode_hex(dataset: &Dataset, version: LayoutVersion) -> Result<String> {
    encode(dataset, version).map(hex::encode)
}

fn write_field(writer: &mut BitWriter, dataset: &Dataset, field: &FieldSpec) -> Result<()> {
    let bits = field.bits;
    match field.target {
        Target::Epochs | Target::DatatakingTimeStart => {
            let epochs = if field.target == Target::Epochs {
                dataset.epochs.as_slice()
            } else {
                dataset.timing_epochs()
            };
            let ms: Vec<u64> = epochs.iter().map(|e| e.timestamp_ms).collect();
            for_each_wire(ArrayView1::from(ms.as_slice()), field, |&v| writer.write_uint(v, bits))
        }
        Target::ElectronCounts => for_each_wire(dataset.electron_counts.view(), field, |&v| {
            writer.write_uint(u64::from(v), bits)
        }),
        Target::BgCounts => for_each_wire(dataset.bg_counts.view(), field, |&v| {
            writer.write_uint(u64::from(v), bits)
        }),
        Target::DataQuality => for_each_wire(dataset.data_quality.view(), field, |&v| {
            writer.write_uint(u64::from(v), bits)
        }),
        Target::MeasureEnergy => {
            for_each_wire(dataset.measure_energy.view(), field, |&v| write_float(writer, field, v))
        }
        Target::OutputHv => {
            for_each_wire(dataset.output_hv.view(), field, |&v| write_float(writer, field, v))
        }
        Target::DataTimeDuration => for_each_wire(
            ArrayView1::from(dataset.data_time_duration.as_slice()),
            field,
            |&v| write_float(writer, field, v),
        ),
    }
}

/// Visits the elements of a canonical array in the field's wire order.
fn for_each_wire<T, D: Dimension>(
    array: ArrayView<'_, T, D>,
    field: &FieldSpec,
    write: impl FnMut(&T) -> Result<()>,
) -> Result<()> {
    let wire = array
        .into_dyn()
        .permuted_axes(IxDyn(&field.wire_permutation()));
    wire.iter().try_for_each(write)
}

fn write_float(writer: &mut BitWriter, field: &FieldSpec, value: f64) -> Result<()> {
    match field.rule {
        DecodeRule::Ieee754 => writer.write_ieee(value, field.bits),
        DecodeRule::Unsigned => writer.write_uint(to_raw(value, 1.0, 0.0)?, field.bits),
        DecodeRule::Scaled { scale, offset } => {
            writer.write_uint(to_raw(value, scale, offset)?, field.bits)
        }
    }
}

fn to_raw(value: f64, scale: f64, offset: f64) -> Result<u64> {
    let raw = ((value - offset) / scale).round();
    if !raw.is_finite() {
        return Err(Error::Encode {
            field: None,
            value,
            reason: "not a finite number",
        });
    }
    if raw < 0.0 {
        return Err(Error::Encode {
            field: None,
            value,
            reason: "below the field's representable range",
        });
    }
    if raw >= u64::MAX as f64 {
        return Err(Error::Encode {
            field: None,
            value,
            reason: "value wider than field",
        });
    }
    Ok(raw as u64)
}
