//! Per-port reference impedances.

use crate::error::{VnaError, VnaResult};
use num_complex::Complex64;

/// Ordered reference impedances, one per port, in ohms.
///
/// Every entry is finite with a non-zero magnitude; a zero reference makes
/// the Z to S normalization singular.
#[derive(Debug, Clone, PartialEq)]
pub struct PortImpedances(Vec<Complex64>);

impl PortImpedances {
    /// Build from complex impedances (generalized ports).
    pub fn new(impedances: Vec<Complex64>) -> VnaResult<Self> {
        if impedances.is_empty() {
            return Err(VnaError::InvalidImpedance(
                "at least one port impedance is required".into(),
            ));
        }
        for (port, z) in impedances.iter().enumerate() {
            if !z.re.is_finite() || !z.im.is_finite() {
                return Err(VnaError::InvalidImpedance(format!(
                    "port {} impedance {} is not finite",
                    port + 1,
                    z
                )));
            }
            if z.norm() == 0.0 {
                return Err(VnaError::InvalidImpedance(format!(
                    "port {} impedance is zero",
                    port + 1
                )));
            }
        }
        Ok(Self(impedances))
    }

    /// Build from real impedances.
    pub fn from_real(impedances: &[f64]) -> VnaResult<Self> {
        Self::new(impedances.iter().map(|&z| Complex64::new(z, 0.0)).collect())
    }

    /// `n` ports sharing the same real reference impedance.
    pub fn uniform(n: usize, z0: f64) -> VnaResult<Self> {
        Self::from_real(&vec![z0; n])
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated value; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the impedances in port order.
    pub fn iter(&self) -> impl Iterator<Item = &Complex64> {
        self.0.iter()
    }

    /// Impedances as a slice.
    pub fn as_slice(&self) -> &[Complex64] {
        &self.0
    }
}
