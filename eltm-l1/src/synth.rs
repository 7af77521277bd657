//! Seeded synthetic telemetry.
//!
//! Produces records with the statistics of the ground-segment telemetry
//! generator: counts 100-1000, background 0-100, the fixed energy sweep,
//! electrode voltages on their linear scaling, durations 70-75 s and a few
//! percent of non-zero quality flags.

use std::fmt::Write as _;

use eltm_core::{Dataset, Electrode, Epoch, ENERGY_STEPS_EV, NUM_CYCLES, NUM_ENERGY};
use ndarray::s;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::encode::encode_hex;
use crate::layout::LayoutVersion;
use crate::{Error, Result};

/// Nominal spacing between cycle epochs.
pub const CYCLE_PERIOD_MS: u64 = 80_000;

/// Deterministic generator of synthetic records.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    rng: StdRng,
    start_ms: u64,
    quality_fraction: f64,
}

impl SyntheticGenerator {
    /// Creates a generator; equal seeds give identical output.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            // 2024-05-01T00:00:00Z
            start_ms: 1_714_521_600_000,
            quality_fraction: 0.05,
        }
    }

    /// Sets the epoch of the first cycle of the next record.
    #[must_use]
    pub fn with_start_ms(mut self, start_ms: u64) -> Self {
        self.start_ms = start_ms;
        self
    }

    /// Sets the probability of a non-zero quality flag per sample.
    #[must_use]
    pub fn with_quality_fraction(mut self, fraction: f64) -> Self {
        self.quality_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Generates one record; the next record starts one cycle after this one ends.
    ///
    /// # Errors
    /// - [`Error::Config`] if the epochs overflow the millisecond counter.
    /// - [`Error::Core`] if the epochs run past the calendar range.
    pub fn dataset(&mut self, index: u32) -> Result<Dataset> {
        let mut dataset = Dataset::zeroed(index);

        let mut epochs = Vec::with_capacity(NUM_CYCLES);
        for cycle in 0..NUM_CYCLES {
            let ms = self.cycle_start_ms(cycle)?;
            epochs.push(Epoch::new(cycle, ms)?);
        }
        self.start_ms = self.cycle_start_ms(NUM_CYCLES)?;
        dataset.datataking_time_start = Some(epochs.clone());
        dataset.epochs = epochs;

        for count in &mut dataset.electron_counts {
            *count = self.rng.gen_range(100..=1000);
        }
        for count in &mut dataset.bg_counts {
            *count = self.rng.gen_range(0..=100);
        }

        let sweeps = dataset.measure_energy.rows_mut();
        for (mut sweep, energy) in sweeps.into_iter().zip(ENERGY_STEPS_EV) {
            sweep.fill(energy);
        }

        for electrode in Electrode::ALL {
            for e in 0..NUM_ENERGY {
                if let Some(hv) = electrode.nominal_hv(e) {
                    dataset
                        .output_hv
                        .slice_mut(s![electrode.index(), e, .., ..])
                        .fill(hv);
                }
            }
        }

        for duration in &mut dataset.data_time_duration {
            *duration = self.rng.gen_range(70.0..75.0);
        }

        for flag in &mut dataset.data_quality {
            if self.rng.gen_bool(self.quality_fraction) {
                *flag = self.rng.gen_range(1..=255);
            }
        }

        Ok(dataset)
    }

    fn cycle_start_ms(&self, cycle: usize) -> Result<u64> {
        u64::try_from(cycle)
            .ok()
            .and_then(|cycle| CYCLE_PERIOD_MS.checked_mul(cycle))
            .and_then(|offset| self.start_ms.checked_add(offset))
            .ok_or_else(|| {
                Error::Config(format!(
                    "cycle {cycle} after start {} ms overflows the millisecond counter",
                    self.start_ms
                ))
            })
    }

    /// Renders `count` records as multi-bitstring text.
    ///
    /// Each block is `Bitstring <N>:`, the hex payload and a blank line.
    ///
    /// # Errors
    /// Returns an error if a record cannot be encoded in `version`.
    pub fn text(&mut self, count: u32, version: LayoutVersion) -> Result<String> {
        let mut out = String::new();
        for index in 1..=count {
            let dataset = self.dataset(index)?;
            let hex = encode_hex(&dataset, version)?;
            let _ = write!(out, "Bitstring {index}:\n{hex}\n\n");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{split, IndexPolicy, TelemetryDecoder};

    #[test]
    fn test_seeded_output_is_deterministic() {
        let a = SyntheticGenerator::new(42).dataset(1).unwrap();
        let b = SyntheticGenerator::new(42).dataset(1).unwrap();
        assert_eq!(a, b);
        let c = SyntheticGenerator::new(43).dataset(1).unwrap();
        assert_ne!(a.electron_counts, c.electron_counts);
    }

    #[test]
    fn test_value_ranges() {
        let dataset = SyntheticGenerator::new(7).dataset(1).unwrap();
        assert!(dataset
            .electron_counts
            .iter()
            .all(|c| (100..=1000).contains(c)));
        assert!(dataset.bg_counts.iter().all(|&c| c <= 100));
        assert!(dataset
            .data_time_duration
            .iter()
            .all(|d| (70.0..75.0).contains(d)));
        assert_eq!(dataset.output_hv_at(Electrode::Middle, 15, 2, 9), Some(3220.0));
        assert_eq!(dataset.output_hv_at(Electrode::Upper, 15, 2, 9), Some(0.0));
        let flagged = dataset.flagged_samples();
        assert!(flagged > 0 && flagged < dataset.data_quality.len() / 10);
    }

    #[test]
    fn test_text_decodes_without_anomalies() {
        let text = SyntheticGenerator::new(1).text(2, LayoutVersion::V1).unwrap();
        let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
        let blocks: Vec<_> = split(&text, IndexPolicy::Consecutive)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
        for block in blocks {
            let dataset = decoder.decode(&block.payload, block.declared_index).unwrap();
            assert!(dataset.anomalies.is_empty(), "{:?}", &dataset.anomalies[..1]);
        }
    }

    #[test]
    fn test_records_follow_each_other_in_time() {
        let mut generator = SyntheticGenerator::new(3).with_start_ms(0);
        let first = generator.dataset(1).unwrap();
        let second = generator.dataset(2).unwrap();
        assert_eq!(first.epochs[0].timestamp_ms, 0);
        assert_eq!(
            second.epochs[0].timestamp_ms,
            first.epochs[44].timestamp_ms + CYCLE_PERIOD_MS
        );
    }

    #[test]
    fn test_start_near_counter_limit_is_an_error() {
        let mut generator = SyntheticGenerator::new(3).with_start_ms(u64::MAX - 10);
        assert!(generator.dataset(1).is_err());
        assert!(matches!(
            generator.cycle_start_ms(1),
            Err(Error::Config(_))
        ));
        assert!(SyntheticGenerator::new(3)
            .with_start_ms(u64::MAX - 10)
            .text(1, LayoutVersion::V1)
            .is_err());
    }
}
