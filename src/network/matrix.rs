//! Assembly of per-frequency parameter matrices from measured datasets.

use super::transform::ParameterMatrix;
use crate::error::{VnaError, VnaResult};
use crate::measurement::{assemble, MeasurementDataset, MeasurementParameter, TraceData};
use num_complex::Complex64;
use std::collections::HashMap;

/// Build one `n_ports x n_ports` matrix per stimulus point.
///
/// Parameter labels are interpreted as matrix coordinates here and nowhere
/// else. Every element must be present; labels outside the requested port
/// count are ignored, so a 2-port sub-network can be taken from a 4-port
/// dataset.
pub fn sweep_from_dataset(
    dataset: &MeasurementDataset,
    n_ports: usize,
) -> VnaResult<Vec<ParameterMatrix>> {
    if n_ports == 0 {
        return Err(VnaError::DimensionMismatch {
            expected: "at least one port".into(),
            found: "0 ports".into(),
        });
    }

    let prefix = dataset
        .parameters()
        .next()
        .and_then(|p| p.as_str().chars().next())
        .unwrap_or('S');

    let mut elements: HashMap<(usize, usize), Vec<Complex64>> = HashMap::new();
    for parameter in dataset.parameters() {
        if let Some((row, col)) = parameter.port_indices() {
            if row < n_ports && col < n_ports {
                if let Some(values) = dataset.complex(parameter) {
                    elements.insert((row, col), values);
                }
            }
        }
    }

    for row in 0..n_ports {
        for col in 0..n_ports {
            if !elements.contains_key(&(row, col)) {
                return Err(VnaError::MissingParameter(
                    MeasurementParameter::for_element(prefix, row, col).to_string(),
                ));
            }
        }
    }

    Ok((0..dataset.len())
        .map(|point| {
            ParameterMatrix::from_fn(n_ports, n_ports, |row, col| elements[&(row, col)][point])
        })
        .collect())
}

/// Flatten a sweep of matrices into a dataset, elements in row-major order.
///
/// `prefix` names the representation, e.g. `'Z'` yields `Z11, Z12, Z21, Z22`.
pub fn dataset_from_sweep(
    stimulus: Vec<f64>,
    sweep: &[ParameterMatrix],
    prefix: char,
) -> VnaResult<MeasurementDataset> {
    if sweep.len() != stimulus.len() {
        return Err(VnaError::LengthMismatch {
            column: "matrices".into(),
            expected: stimulus.len(),
            found: sweep.len(),
        });
    }
    let n = match sweep.first() {
        Some(m) => m.nrows(),
        None => {
            return Err(VnaError::DimensionMismatch {
                expected: "at least one sweep point".into(),
                found: "empty sweep".into(),
            })
        }
    };
    if let Some(bad) = sweep.iter().find(|m| m.shape() != (n, n)) {
        return Err(VnaError::DimensionMismatch {
            expected: format!("{}x{} matrix", n, n),
            found: format!("{}x{} matrix", bad.nrows(), bad.ncols()),
        });
    }

    let mut traces = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            let (real, imag): (Vec<f64>, Vec<f64>) = sweep
                .iter()
                .map(|m| (m[(row, col)].re, m[(row, col)].im))
                .unzip();
            traces.push(TraceData::new(
                MeasurementParameter::for_element(prefix, row, col),
                real,
                imag,
            ));
        }
    }
    assemble(stimulus, traces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: &str) -> MeasurementParameter {
        label.parse().unwrap()
    }

    fn two_port_dataset() -> MeasurementDataset {
        assemble(
            vec![1e9, 2e9],
            vec![
                TraceData::new(p("S11"), vec![0.1, 0.2], vec![0.0, 0.0]),
                TraceData::new(p("S12"), vec![0.3, 0.4], vec![0.0, 0.1]),
                TraceData::new(p("S21"), vec![0.5, 0.6], vec![0.2, 0.0]),
                TraceData::new(p("S22"), vec![0.7, 0.8], vec![0.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_sweep_places_elements_by_label() {
        let sweep = sweep_from_dataset(&two_port_dataset(), 2).unwrap();
        assert_eq!(sweep.len(), 2);
        assert_eq!(sweep[0][(0, 1)], Complex64::new(0.3, 0.0));
        assert_eq!(sweep[0][(1, 0)], Complex64::new(0.5, 0.2));
        assert_eq!(sweep[1][(1, 1)], Complex64::new(0.8, 0.0));
    }

    #[test]
    fn test_sub_network_extraction() {
        let sweep = sweep_from_dataset(&two_port_dataset(), 1).unwrap();
        assert_eq!(sweep[1][(0, 0)], Complex64::new(0.2, 0.0));
    }

    #[test]
    fn test_missing_element_named() {
        let dataset = assemble(
            vec![1.0],
            vec![
                TraceData::new(p("S11"), vec![0.1], vec![0.0]),
                TraceData::new(p("S21"), vec![0.1], vec![0.0]),
            ],
        )
        .unwrap();
        match sweep_from_dataset(&dataset, 2) {
            Err(VnaError::MissingParameter(label)) => assert_eq!(label, "S12"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_dataset_from_sweep_row_major() {
        let sweep = sweep_from_dataset(&two_port_dataset(), 2).unwrap();
        let z = dataset_from_sweep(vec![1e9, 2e9], &sweep, 'Z').unwrap();
        let labels: Vec<&str> = z.parameters().map(|p| p.as_str()).collect();
        assert_eq!(labels, ["Z11", "Z12", "Z21", "Z22"]);
        assert_eq!(z.component(&p("Z21"), crate::measurement::Component::Imag), Some(&[0.2, 0.0][..]));
    }

    #[test]
    fn test_dataset_from_sweep_length_checked() {
        let sweep = sweep_from_dataset(&two_port_dataset(), 2).unwrap();
        assert!(matches!(
            dataset_from_sweep(vec![1e9], &sweep, 'Z'),
            Err(VnaError::LengthMismatch { .. })
        ));
    }
}
