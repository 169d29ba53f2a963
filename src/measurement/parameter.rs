//! Measurement parameter labels, trace components and trace descriptors.

use crate::error::{VnaError, VnaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label of one scalar element of a network-parameter matrix, e.g. `S21`.
///
/// The label is opaque to the session. It is only interpreted as matrix
/// coordinates when a sweep of matrices is assembled from a dataset, see
/// [`MeasurementParameter::port_indices`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementParameter(String);

impl MeasurementParameter {
    /// Create a parameter label. Empty or whitespace-containing labels are rejected.
    pub fn new(label: impl Into<String>) -> VnaResult<Self> {
        let label = label.into();
        if label.is_empty() || label.chars().any(char::is_whitespace) {
            return Err(VnaError::InvalidParameters(format!(
                "invalid parameter label {:?}",
                label
            )));
        }
        Ok(Self(label))
    }

    /// Label for the matrix element at 0-based `(row, col)` with the given prefix.
    ///
    /// Ports below 10 use the compact `S21` form, larger ports `S_12_3`.
    pub fn for_element(prefix: char, row: usize, col: usize) -> Self {
        let (r, c) = (row + 1, col + 1);
        if r < 10 && c < 10 {
            Self(format!("{}{}{}", prefix, r, c))
        } else {
            Self(format!("{}_{}_{}", prefix, r, c))
        }
    }

    /// The raw label.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the label as 0-based `(receive port, excitation port)`.
    ///
    /// Accepts `Xij` with single-digit ports and `X_i_j` for any port number,
    /// where `X` is a single letter (`S`, `Z`, ...). Returns `None` for labels
    /// that do not name a matrix element.
    pub fn port_indices(&self) -> Option<(usize, usize)> {
        let mut chars = self.0.chars();
        let kind = chars.next()?;
        if !kind.is_ascii_alphabetic() {
            return None;
        }
        let rest = chars.as_str();

        let (row, col) = if let Some(stripped) = rest.strip_prefix('_') {
            let (r, c) = stripped.split_once('_')?;
            (r.parse::<usize>().ok()?, c.parse::<usize>().ok()?)
        } else {
            let digits: Vec<u32> = rest.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
            if digits.len() != 2 {
                return None;
            }
            (digits[0] as usize, digits[1] as usize)
        };

        if row == 0 || col == 0 {
            return None;
        }
        Some((row - 1, col - 1))
    }
}

impl fmt::Display for MeasurementParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MeasurementParameter {
    type Err = VnaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

/// Parse a list of labels, rejecting an empty list and duplicates.
pub fn parse_parameters<S: AsRef<str>>(labels: &[S]) -> VnaResult<Vec<MeasurementParameter>> {
    let parameters = labels
        .iter()
        .map(|l| l.as_ref().parse())
        .collect::<VnaResult<Vec<MeasurementParameter>>>()?;
    check_unique(&parameters)?;
    Ok(parameters)
}

/// Reject empty lists and labels given more than once.
pub(crate) fn check_unique(parameters: &[MeasurementParameter]) -> VnaResult<()> {
    if parameters.is_empty() {
        return Err(VnaError::InvalidParameters(
            "at least one parameter is required".into(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for p in parameters {
        if !seen.insert(p) {
            return Err(VnaError::InvalidParameters(format!(
                "parameter '{}' given more than once",
                p
            )));
        }
    }
    Ok(())
}

/// Which part of a complex measurement a trace exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    /// Real part.
    Real,
    /// Imaginary part.
    Imag,
}

impl Component {
    /// Both components in trace-creation order.
    pub const ALL: [Component; 2] = [Component::Real, Component::Imag];

    /// Instrument display format selecting this component.
    pub fn format_name(self) -> &'static str {
        match self {
            Component::Real => "REAL",
            Component::Imag => "IMAG",
        }
    }

    /// Suffix used in dataset column names.
    pub fn suffix(self) -> &'static str {
        match self {
            Component::Real => "real",
            Component::Imag => "imag",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A trace as created on the instrument during configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSpec {
    /// Instrument-side trace name.
    pub name: String,
    /// Measured parameter.
    pub parameter: MeasurementParameter,
    /// Component exposed by the trace.
    pub component: Component,
    /// Display slot the trace is fed to.
    pub display_slot: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_indices_compact() {
        let p: MeasurementParameter = "S21".parse().unwrap();
        assert_eq!(p.port_indices(), Some((1, 0)));
    }

    #[test]
    fn test_port_indices_long_form() {
        let p: MeasurementParameter = "S_12_3".parse().unwrap();
        assert_eq!(p.port_indices(), Some((11, 2)));
    }

    #[test]
    fn test_port_indices_rejects_non_element() {
        for label in ["S0", "S123", "S01", "Trc1", "21"] {
            let p: MeasurementParameter = label.parse().unwrap();
            assert_eq!(p.port_indices(), None, "{}", label);
        }
    }

    #[test]
    fn test_for_element_roundtrips() {
        assert_eq!(MeasurementParameter::for_element('Z', 0, 1).as_str(), "Z12");
        assert_eq!(MeasurementParameter::for_element('S', 9, 0).as_str(), "S_10_1");
        assert_eq!(
            MeasurementParameter::for_element('S', 9, 0).port_indices(),
            Some((9, 0))
        );
    }

    #[test]
    fn test_parse_parameters_rejects_duplicates() {
        let err = parse_parameters(&["S11", "S21", "S11"]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_parse_parameters_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(parse_parameters(&empty).is_err());
        assert!(parse_parameters(&[""]).is_err());
    }
}
