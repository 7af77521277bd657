//! Flat CSV output for L2 records.

use crate::{Error, Result};
use eltm_core::{ReducedDataset, NUM_CYCLES, NUM_ENERGY};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header row of L2 CSV files.
pub const L2_CSV_HEADER: &str = "bitstring_index,cycle,energy_idx,epoch_ms,duration_s,total,mean";

/// Writer for L2 records, one row per (bitstring, cycle, energy).
pub struct L2CsvWriter {
    writer: BufWriter<File>,
    rows: usize,
}

impl L2CsvWriter {
    /// Creates the file and writes the header row.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{L2_CSV_HEADER}")?;
        Ok(Self { writer, rows: 0 })
    }

    /// Appends the rows of one record.
    ///
    /// # Errors
    /// Returns an error if the record has the wrong dimensions or the write fails.
    pub fn write_reduced(&mut self, record: &ReducedDataset) -> Result<()> {
        record.validate_dimensions()?;
        let totals = &record.total_counts_per_energy;
        let means = &record.mean_counts_per_energy;

        for c in 0..NUM_CYCLES {
            let epoch_ms = record.epoch[c].timestamp_ms;
            let duration = record.duration[c];
            for e in 0..NUM_ENERGY {
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{},{}",
                    record.index, c, e, epoch_ms, duration, totals[[e, c]], means[[e, c]]
                )?;
            }
        }
        self.rows += NUM_CYCLES * NUM_ENERGY;
        Ok(())
    }

    /// Appends every record in order.
    ///
    /// # Errors
    /// See [`L2CsvWriter::write_reduced`].
    pub fn write_all(&mut self, records: &[ReducedDataset]) -> Result<()> {
        records.iter().try_for_each(|r| self.write_reduced(r))
    }

    /// Data rows written so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::from)
    }
}

/// Writes L2 records to a CSV file.
///
/// # Errors
/// See [`L2CsvWriter::write_reduced`].
pub fn write_l2_csv<P: AsRef<Path>>(path: P, records: &[ReducedDataset]) -> Result<()> {
    let mut writer = L2CsvWriter::create(path)?;
    writer.write_all(records)?;
    writer.flush()?;
    log::info!("wrote {} L2 CSV rows", writer.rows());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eltm_core::{Array2, Dataset, ENERGY_SHAPE};
    use tempfile::NamedTempFile;

    fn reduced(index: u32) -> ReducedDataset {
        let dataset = Dataset::zeroed(index);
        let mut total = Array2::zeros(ENERGY_SHAPE);
        total[[2, 1]] = 84;
        let mut mean = Array2::zeros(ENERGY_SHAPE);
        mean[[2, 1]] = 2.0;
        ReducedDataset {
            index,
            total_counts_per_energy: total,
            mean_counts_per_energy: mean,
            epoch: dataset.epochs,
            duration: vec![72.5; NUM_CYCLES],
        }
    }

    #[test]
    fn test_write_csv_rows() {
        let file = NamedTempFile::new().unwrap();
        write_l2_csv(file.path(), &[reduced(1), reduced(2)]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], L2_CSV_HEADER);
        assert_eq!(lines.len(), 1 + 2 * NUM_CYCLES * NUM_ENERGY);
        assert_eq!(lines[1], "1,0,0,0,72.5,0,0");
        // cycle 1 block starts after 16 energy rows of cycle 0
        assert_eq!(lines[1 + NUM_ENERGY + 2], "1,1,2,0,72.5,84,2");
    }

    #[test]
    fn test_wrong_dimensions_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = L2CsvWriter::create(file.path()).unwrap();
        let mut bad = reduced(1);
        bad.duration.pop();
        assert!(matches!(writer.write_reduced(&bad), Err(Error::Core(_))));
        assert_eq!(writer.rows(), 0);
    }
}
