#![allow(clippy::float_cmp, clippy::cast_precision_loss)]
use approx::assert_relative_eq;
use eltm_core::{NUM_AZIMUTHAL, NUM_CYCLES, NUM_ENERGY, NUM_INCIDENT};
use eltm_l1::{encode, LayoutVersion, SyntheticGenerator, TelemetryDecoder};
use eltm_l2::{aggregate, aggregate_all, L2Aggregator};

#[test]
fn total_is_plane_sum_and_mean_is_exact_ratio() {
    let dataset = SyntheticGenerator::new(99).dataset(1).unwrap();
    let reduced = aggregate(&dataset).unwrap();

    for e in 0..NUM_ENERGY {
        for c in 0..NUM_CYCLES {
            let mut sum = 0u64;
            for a in 0..NUM_AZIMUTHAL {
                for i in 0..NUM_INCIDENT {
                    sum += u64::from(dataset.electron_counts[[e, a, i, c]]);
                }
            }
            let total = reduced.total_counts_per_energy[[e, c]];
            assert_eq!(total, sum);
            assert_eq!(
                reduced.mean_counts_per_energy[[e, c]],
                total as f64 / 42.0
            );
        }
    }
}

#[test]
fn aggregation_is_deterministic() {
    let dataset = SyntheticGenerator::new(100).dataset(2).unwrap();
    assert_eq!(aggregate(&dataset).unwrap(), aggregate(&dataset).unwrap());
}

#[test]
fn decoded_records_aggregate_with_timing() {
    let mut generator = SyntheticGenerator::new(101);
    let decoder = TelemetryDecoder::new(LayoutVersion::V1).unwrap();
    let datasets: Vec<_> = (1..=3)
        .map(|index| {
            let bytes = encode(&generator.dataset(index).unwrap(), LayoutVersion::V1).unwrap();
            decoder.decode_bytes(&bytes, index).unwrap()
        })
        .collect();

    let reduced: Vec<_> = aggregate_all(&datasets)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(reduced.len(), 3);
    for (l1, l2) in datasets.iter().zip(&reduced) {
        assert_eq!(l1.index, l2.index);
        assert_eq!(l2.epoch.as_slice(), l1.timing_epochs());
        for (d1, d2) in l1.data_time_duration.iter().zip(&l2.duration) {
            assert_relative_eq!(*d1, *d2);
        }
    }

    let sequential: Vec<_> = L2Aggregator::new()
        .with_parallel(false)
        .aggregate_all(&datasets)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(sequential, reduced);
}
