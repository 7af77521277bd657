use eltm_core::NUM_CYCLES;
use eltm_io::{decode_file, read_l1_json, read_l2_json, write_l1_json, write_l2_csv, write_l2_json};
use eltm_l1::{DecoderConfig, LayoutVersion, SyntheticGenerator};
use eltm_l2::aggregate_all;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn telemetry_file(count: u32, version: LayoutVersion) -> NamedTempFile {
    let text = SyntheticGenerator::new(42).text(count, version).unwrap();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn text_to_l1_to_l2_pipeline() {
    let input = telemetry_file(3, LayoutVersion::V1);
    let dir = tempdir().unwrap();

    let mut attributes = eltm_core::GlobalAttributes::new();
    attributes.insert("Mission", "test");
    let config = DecoderConfig::new().with_global_attributes(attributes);
    let report = decode_file(input.path(), config).unwrap();
    assert!(report.is_complete());
    let datasets = report.into_datasets();
    assert_eq!(datasets.len(), 3);
    assert_eq!(datasets[0].global_attributes.get("Mission"), Some("test"));

    let l1_path = dir.path().join("l1.json");
    write_l1_json(&l1_path, &datasets).unwrap();
    let reloaded = read_l1_json(&l1_path).unwrap();
    assert_eq!(reloaded, datasets);

    let records: Vec<_> = aggregate_all(&reloaded)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let l2_path = dir.path().join("l2.json");
    write_l2_json(&l2_path, &records).unwrap();
    assert_eq!(read_l2_json(&l2_path).unwrap(), records);

    let csv_path = dir.path().join("l2.csv");
    write_l2_csv(&csv_path, &records).unwrap();
    let rows = std::fs::read_to_string(&csv_path).unwrap().lines().count();
    assert_eq!(rows, 1 + 3 * NUM_CYCLES * 16);
}

#[test]
fn failed_bitstring_does_not_abort_file() {
    let text = SyntheticGenerator::new(7).text(2, LayoutVersion::V2).unwrap();
    // Corrupt the first payload's leading hex digit pair.
    let corrupted = text.replacen("Bitstring 1:\n", "Bitstring 1:\nzz", 1);
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(corrupted.as_bytes()).unwrap();

    let config = DecoderConfig::new().with_layout(LayoutVersion::V2);
    let report = decode_file(file.path(), config).unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.datasets().next().unwrap().index, 2);
}
