//! CSV persistence of acquisitions.

#![cfg(feature = "storage_csv")]

use rust_vna::instrument::SimulatedVna;
use rust_vna::measurement::{assemble, parse_parameters, Acquisition, MeasurementParameter, TraceData};
use rust_vna::session::{MeasurementSession, SessionConfig};
use rust_vna::storage::{read_csv, write_csv, CsvWriter};
use tempfile::tempdir;

fn p(label: &str) -> MeasurementParameter {
    label.parse().unwrap()
}

#[test]
fn test_header_and_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let dataset = assemble(
        vec![1e6, 2e6],
        vec![
            TraceData::new(p("S11"), vec![0.5, 0.25], vec![-0.5, 0.0]),
            TraceData::new(p("S21"), vec![1.0, 0.75], vec![0.125, -0.125]),
        ],
    )
    .unwrap();

    write_csv(&path, &dataset, None).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Freq,S11_real,S11_imag,S21_real,S21_imag");
    assert_eq!(lines[1], "1000000,0.5,-0.5,1,0.125");
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_acquisition_round_trip() {
    let mut session =
        MeasurementSession::new(SimulatedVna::new().with_sweep(10e6, 2e9, 21), SessionConfig::default())
            .unwrap();
    session.connect(None).unwrap();
    session
        .configure(&parse_parameters(&["S11", "S21", "S12", "S22"]).unwrap())
        .unwrap();
    let acquisition = session.acquire().unwrap();

    let dir = tempdir().unwrap();
    let writer = CsvWriter::new(dir.path().join("nested").join("data"));
    let path = writer.write(&acquisition).unwrap();
    assert!(path.starts_with(writer.output_dir()));

    let stored = read_csv(&path).unwrap();
    assert_eq!(stored.dataset, acquisition.dataset);
    assert_eq!(stored.metadata.as_ref(), Some(&acquisition.metadata));
}

#[test]
fn test_same_second_writes_do_not_collide() {
    let dataset = assemble(
        vec![1.0],
        vec![TraceData::new(p("S11"), vec![0.0], vec![0.0])],
    )
    .unwrap();
    let acquisition = Acquisition::new(dataset, None, None);

    let dir = tempdir().unwrap();
    let writer = CsvWriter::new(dir.path());
    let first = writer.write(&acquisition).unwrap();
    let second = writer.write(&acquisition).unwrap();
    assert_ne!(first, second);
    assert!(second.to_string_lossy().ends_with("_1.csv"));
}

#[test]
fn test_named_write() {
    let dataset = assemble(
        vec![1.0],
        vec![TraceData::new(p("S21"), vec![0.5], vec![0.25])],
    )
    .unwrap();
    let acquisition = Acquisition::new(dataset, None, None);

    let dir = tempdir().unwrap();
    let writer = CsvWriter::new(dir.path());
    let first = writer.write_as(&acquisition, "dut_a").unwrap();
    assert_eq!(first, dir.path().join("dut_a.csv"));
    let second = writer.write_as(&acquisition, "dut_a.csv").unwrap();
    assert_eq!(second, dir.path().join("dut_a_1.csv"));
    assert_eq!(read_csv(&second).unwrap().dataset, acquisition.dataset);

    assert!(writer.write_as(&acquisition, "../escape").is_err());
    assert!(writer.write_as(&acquisition, ".csv").is_err());
}
