//! Energy files laid out as GROMACS writes them (version 5, plain XDR
//! term names, running sums from the second frame, one frame carrying a
//! string and a double sub-block).

use std::path::PathBuf;

use md_monitor::parsers::{energy_since, read_energy_file, Precision};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn terms(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_single_precision_fixture_header_and_frames() {
    let file = read_energy_file(&fixture("ala2_single.edr")).expect("decode");
    assert_eq!(file.version, 5);
    assert_eq!(file.precision, Some(Precision::Single));
    assert!(!file.truncated);

    let names: Vec<&str> = file.terms.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Bond", "Potential", "Kinetic En.", "Temperature", "Pressure"]
    );
    assert_eq!(file.terms[3].unit, "K");
    assert_eq!(file.terms[4].unit, "bar");

    let steps: Vec<i64> = file.frames.iter().map(|f| f.step).collect();
    assert_eq!(steps, vec![0, 500, 1000]);
    assert!((file.frames[1].time - 1.0).abs() < 1e-12);
    assert_eq!(
        file.frames[2].values,
        vec![12.75, -1236.25, 902.0, 300.5, 0.25]
    );
}

#[test]
fn test_double_precision_fixture_matches_single() {
    let single = read_energy_file(&fixture("ala2_single.edr")).expect("decode");
    let double = read_energy_file(&fixture("ala2_double.edr")).expect("decode");
    assert_eq!(double.precision, Some(Precision::Double));
    assert_eq!(double.terms, single.terms);
    assert_eq!(double.frames, single.frames);
}

#[test]
fn test_fixture_series_after_step() {
    let series = energy_since(
        &fixture("ala2_single.edr"),
        &terms(&["Potential", "Temperature"]),
        Some(0),
    )
    .expect("read");
    assert_eq!(series.keys().copied().collect::<Vec<_>>(), vec![500, 1000]);
    assert!((series[&500]["Potential"] + 1240.0).abs() < f64::EPSILON);
    assert!((series[&1000]["Temperature"] - 300.5).abs() < f64::EPSILON);
}

#[test]
fn test_fixture_cut_inside_block_payload() {
    let bytes = std::fs::read(fixture("ala2_single.edr")).expect("read fixture");
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("md.edr");
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let file = read_energy_file(&path).expect("decode");
    assert!(file.truncated);
    assert_eq!(file.frames.iter().map(|f| f.step).collect::<Vec<_>>(), vec![0, 500]);
}
