//! JSON documents for L1 and L2 datasets.
//!
//! Arrays use ndarray's serde form, `{"v": 1, "dim": [...], "data": [...]}`
//! with `data` in row-major order. Each document header carries an
//! `axis_order` table naming the axes of every array.

use crate::{Error, Result};
use eltm_core::{Axis, Dataset, ReducedDataset, COUNTS_AXES, ENERGY_AXES, HV_AXES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Format tag of L1 documents.
pub const L1_FORMAT: &str = "eltm-l1";
/// Format tag of L2 documents.
pub const L2_FORMAT: &str = "eltm-l2";

type AxisOrder = BTreeMap<&'static str, Vec<&'static str>>;

fn names(axes: &[Axis]) -> Vec<&'static str> {
    axes.iter().map(|a| a.name()).collect()
}

fn l1_axis_order() -> AxisOrder {
    let mut order = BTreeMap::new();
    for field in ["electron_counts", "bg_counts", "data_quality"] {
        order.insert(field, names(&COUNTS_AXES));
    }
    order.insert("measure_energy", names(&ENERGY_AXES));
    order.insert("output_hv", names(&HV_AXES));
    order
}

fn l2_axis_order() -> AxisOrder {
    let mut order = BTreeMap::new();
    order.insert("total_counts_per_energy", names(&ENERGY_AXES));
    order.insert("mean_counts_per_energy", names(&ENERGY_AXES));
    order
}

#[derive(Serialize)]
struct L1DocumentOut<'a> {
    format: &'static str,
    axis_order: AxisOrder,
    bitstrings: &'a [Dataset],
}

#[derive(Deserialize)]
struct L1DocumentIn {
    format: String,
    #[serde(default)]
    bitstrings: Vec<Dataset>,
}

#[derive(Serialize)]
struct L2DocumentOut<'a> {
    format: &'static str,
    axis_order: AxisOrder,
    records: &'a [ReducedDataset],
}

#[derive(Deserialize)]
struct L2DocumentIn {
    format: String,
    #[serde(default)]
    records: Vec<ReducedDataset>,
}

fn check_format(found: &str, expected: &str) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::InvalidFormat(format!(
            "expected a {expected} document, found {found:?}"
        )))
    }
}

fn write_document<P: AsRef<Path>, T: Serialize>(path: P, document: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes L1 datasets as one JSON document.
///
/// # Errors
/// Returns an error if the file cannot be written or a timestamp cannot be
/// rendered.
pub fn write_l1_json<P: AsRef<Path>>(path: P, datasets: &[Dataset]) -> Result<()> {
    write_document(
        path,
        &L1DocumentOut {
            format: L1_FORMAT,
            axis_order: l1_axis_order(),
            bitstrings: datasets,
        },
    )?;
    log::info!("wrote {} L1 datasets as JSON", datasets.len());
    Ok(())
}

/// Reads L1 datasets written by [`write_l1_json`].
///
/// # Errors
/// Returns an error if the file is not an L1 document or any dataset has
/// the wrong dimensions.
pub fn read_l1_json<P: AsRef<Path>>(path: P) -> Result<Vec<Dataset>> {
    let document: L1DocumentIn = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    check_format(&document.format, L1_FORMAT)?;
    for dataset in &document.bitstrings {
        dataset.validate_dimensions()?;
    }
    Ok(document.bitstrings)
}

/// Writes L2 records as one JSON document.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_l2_json<P: AsRef<Path>>(path: P, records: &[ReducedDataset]) -> Result<()> {
    write_document(
        path,
        &L2DocumentOut {
            format: L2_FORMAT,
            axis_order: l2_axis_order(),
            records,
        },
    )?;
    log::info!("wrote {} L2 records as JSON", records.len());
    Ok(())
}

/// Reads L2 records written by [`write_l2_json`].
///
/// # Errors
/// Returns an error if the file is not an L2 document or any record has
/// the wrong dimensions.
pub fn read_l2_json<P: AsRef<Path>>(path: P) -> Result<Vec<ReducedDataset>> {
    let document: L2DocumentIn = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    check_format(&document.format, L2_FORMAT)?;
    for record in &document.records {
        record.validate_dimensions()?;
    }
    Ok(document.records)
}
