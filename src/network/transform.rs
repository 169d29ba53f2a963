//! S-parameter / Z-parameter conversion.
//!
//! Both directions use the power-wave normalization with per-port reference
//! impedances `z_i`:
//!
//! ```text
//! D = diag(sqrt(z_i))      Z = D (I + S) (I - S)^-1 D
//! Y = diag(1/sqrt(z_i))    S = (Y Z Y - I) (Y Z Y + I)^-1
//! ```
//!
//! The two functions are mutual inverses wherever both inversions exist.
//! They hold no state and never retry: a singular intermediate is reported
//! as [`VnaError::SingularMatrix`].

use super::ports::PortImpedances;
use crate::error::{VnaError, VnaResult};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Square complex matrix of S- or Z-parameters at one frequency point.
pub type ParameterMatrix = DMatrix<Complex64>;

/// Convert an S-parameter matrix to Z-parameters.
///
/// # Errors
/// - [`VnaError::DimensionMismatch`] if `s` is empty, not square, or its
///   size differs from the number of ports
/// - [`VnaError::NonFiniteInput`] if `s` contains NaN or infinity
/// - [`VnaError::SingularMatrix`] if `I - S` is not invertible
pub fn s_to_z(s: &ParameterMatrix, ports: &PortImpedances) -> VnaResult<ParameterMatrix> {
    let n = check_input(s, ports)?;
    let identity = ParameterMatrix::identity(n, n);
    let d = diagonal(ports, |z| z.sqrt());

    let inv = invert(&identity - s, "s_to_z")?;
    Ok(&d * (&identity + s) * inv * &d)
}

/// Convert a Z-parameter matrix to S-parameters.
///
/// # Errors
/// - [`VnaError::DimensionMismatch`] if `z` is empty, not square, or its
///   size differs from the number of ports
/// - [`VnaError::NonFiniteInput`] if `z` contains NaN or infinity
/// - [`VnaError::SingularMatrix`] if `Y Z Y + I` is not invertible
pub fn z_to_s(z: &ParameterMatrix, ports: &PortImpedances) -> VnaResult<ParameterMatrix> {
    let n = check_input(z, ports)?;
    let identity = ParameterMatrix::identity(n, n);
    let y = diagonal(ports, |z| z.sqrt().inv());

    let normalized = &y * z * &y;
    let inv = invert(&normalized + &identity, "z_to_s")?;
    Ok((normalized - identity) * inv)
}

/// Convert every point of an S-parameter sweep to Z-parameters.
///
/// Fails with [`VnaError::SweepPoint`] carrying the index of the first
/// point that could not be converted.
pub fn s_to_z_sweep(
    sweep: &[ParameterMatrix],
    ports: &PortImpedances,
) -> VnaResult<Vec<ParameterMatrix>> {
    convert_sweep(sweep, ports, s_to_z)
}

/// Convert every point of a Z-parameter sweep to S-parameters.
pub fn z_to_s_sweep(
    sweep: &[ParameterMatrix],
    ports: &PortImpedances,
) -> VnaResult<Vec<ParameterMatrix>> {
    convert_sweep(sweep, ports, z_to_s)
}

fn convert_sweep(
    sweep: &[ParameterMatrix],
    ports: &PortImpedances,
    convert: fn(&ParameterMatrix, &PortImpedances) -> VnaResult<ParameterMatrix>,
) -> VnaResult<Vec<ParameterMatrix>> {
    sweep
        .iter()
        .enumerate()
        .map(|(index, m)| {
            convert(m, ports).map_err(|e| VnaError::SweepPoint {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

fn check_input(m: &ParameterMatrix, ports: &PortImpedances) -> VnaResult<usize> {
    let (rows, cols) = m.shape();
    if rows != cols || rows == 0 {
        return Err(VnaError::DimensionMismatch {
            expected: "non-empty square matrix".into(),
            found: format!("{}x{} matrix", rows, cols),
        });
    }
    if ports.len() != rows {
        return Err(VnaError::DimensionMismatch {
            expected: format!("{} port impedances", rows),
            found: format!("{} port impedances", ports.len()),
        });
    }
    for col in 0..cols {
        for row in 0..rows {
            let v = m[(row, col)];
            if !v.re.is_finite() || !v.im.is_finite() {
                return Err(VnaError::NonFiniteInput { row, col });
            }
        }
    }
    Ok(rows)
}

fn diagonal(ports: &PortImpedances, f: impl Fn(Complex64) -> Complex64) -> ParameterMatrix {
    let diag = DVector::from_iterator(ports.len(), ports.iter().map(|&z| f(z)));
    ParameterMatrix::from_diagonal(&diag)
}

fn invert(m: ParameterMatrix, operation: &'static str) -> VnaResult<ParameterMatrix> {
    let inv = m
        .try_inverse()
        .ok_or(VnaError::SingularMatrix { operation })?;
    // Near-singular LU can still overflow instead of failing outright.
    if inv.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
        return Err(VnaError::SingularMatrix { operation });
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_matched_load_is_reference_impedance() {
        // S11 = 0 means the port sees exactly its reference impedance.
        let s = ParameterMatrix::from_element(1, 1, c(0.0, 0.0));
        let ports = PortImpedances::from_real(&[50.0]).unwrap();
        let z = s_to_z(&s, &ports).unwrap();
        assert_relative_eq!(z[(0, 0)].re, 50.0, epsilon = 1e-12);
        assert_relative_eq!(z[(0, 0)].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_one_port_reflection() {
        // Z = 50 (1 + 1/3) / (1 - 1/3) = 100 ohm
        let s = ParameterMatrix::from_element(1, 1, c(1.0 / 3.0, 0.0));
        let ports = PortImpedances::from_real(&[50.0]).unwrap();
        let z = s_to_z(&s, &ports).unwrap();
        assert_relative_eq!(z[(0, 0)].re, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_series_element_has_no_z_matrix() {
        // A 100 ohm series resistor between two 50 ohm ports:
        // S11 = S22 = 1/2, S21 = S12 = 1/2, so I - S is singular.
        let s = ParameterMatrix::from_element(2, 2, c(0.5, 0.0));
        let ports = PortImpedances::uniform(2, 50.0).unwrap();
        assert!(matches!(
            s_to_z(&s, &ports),
            Err(VnaError::SingularMatrix { operation: "s_to_z" })
        ));
    }

    #[test]
    fn test_shunt_resistor_two_port() {
        // A 50 ohm shunt resistor: Z11 = Z12 = Z21 = Z22 = 50
        let z = ParameterMatrix::from_element(2, 2, c(50.0, 0.0));
        let ports = PortImpedances::uniform(2, 50.0).unwrap();
        let s = z_to_s(&z, &ports).unwrap();
        assert_relative_eq!(s[(0, 0)].re, -1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(s[(1, 0)].re, 2.0 / 3.0, epsilon = 1e-12);

        let back = s_to_z(&s, &ports).unwrap();
        for (a, b) in back.iter().zip(z.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_non_square_rejected() {
        let s = ParameterMatrix::zeros(2, 3);
        let ports = PortImpedances::uniform(2, 50.0).unwrap();
        assert!(matches!(
            s_to_z(&s, &ports),
            Err(VnaError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut s = ParameterMatrix::zeros(2, 2);
        s[(1, 0)] = c(f64::NAN, 0.0);
        let ports = PortImpedances::uniform(2, 50.0).unwrap();
        assert!(matches!(
            s_to_z(&s, &ports),
            Err(VnaError::NonFiniteInput { row: 1, col: 0 })
        ));
    }

    #[test]
    fn test_negative_reference_z_to_s_is_singular() {
        // Y Z Y + I = 0 when Z equals minus the reference impedance
        let z = ParameterMatrix::from_element(1, 1, c(-4.0, 0.0));
        let ports = PortImpedances::from_real(&[4.0]).unwrap();
        assert!(matches!(
            z_to_s(&z, &ports),
            Err(VnaError::SingularMatrix { operation: "z_to_s" })
        ));
    }

    #[test]
    fn test_sweep_reports_failing_index() {
        let ports = PortImpedances::from_real(&[50.0]).unwrap();
        let sweep = vec![
            ParameterMatrix::from_element(1, 1, c(0.2, 0.1)),
            ParameterMatrix::from_element(1, 1, c(1.0, 0.0)),
        ];
        match s_to_z_sweep(&sweep, &ports) {
            Err(VnaError::SweepPoint { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
