//! Result assembly: merging stimulus and per-trace vectors into one dataset.
//!
//! A [`MeasurementDataset`] is only ever produced by [`assemble`], which checks
//! that every sequence has the stimulus length. Once built it is immutable, so
//! consumers (CSV writer, matrix assembly, plotting code outside this crate)
//! can rely on one real and one imaginary sequence per parameter, all aligned
//! to the stimulus vector.

use super::parameter::{check_unique, Component, MeasurementParameter};
use crate::error::{VnaError, VnaResult};
use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Composite dataset key: parameter plus component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    /// Measured parameter.
    pub parameter: MeasurementParameter,
    /// Real or imaginary part.
    pub component: Component,
}

impl DatasetKey {
    /// Build a key.
    pub fn new(parameter: MeasurementParameter, component: Component) -> Self {
        Self {
            parameter,
            component,
        }
    }

    /// Column name, e.g. `S21_imag`.
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.parameter, self.component.suffix())
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.parameter, self.component.suffix())
    }
}

/// Real and imaginary sequences of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ParameterSeries {
    parameter: MeasurementParameter,
    real: Vec<f64>,
    imag: Vec<f64>,
}

/// Raw trace data for one parameter, as handed to [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct TraceData {
    /// Measured parameter.
    pub parameter: MeasurementParameter,
    /// Real-component samples.
    pub real: Vec<f64>,
    /// Imaginary-component samples.
    pub imag: Vec<f64>,
}

impl TraceData {
    /// Bundle real and imaginary samples for a parameter.
    pub fn new(parameter: MeasurementParameter, real: Vec<f64>, imag: Vec<f64>) -> Self {
        Self {
            parameter,
            real,
            imag,
        }
    }
}

/// Frequency-domain dataset keyed by `(parameter, component)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDataset {
    stimulus: Vec<f64>,
    series: Vec<ParameterSeries>,
}

/// Merge a stimulus vector and per-parameter traces into a dataset.
///
/// Fails with [`VnaError::LengthMismatch`] naming the first column whose
/// length differs from the stimulus, and with [`VnaError::InvalidParameters`]
/// when the trace list is empty or names a parameter twice.
pub fn assemble(stimulus: Vec<f64>, traces: Vec<TraceData>) -> VnaResult<MeasurementDataset> {
    let parameters: Vec<MeasurementParameter> =
        traces.iter().map(|t| t.parameter.clone()).collect();
    check_unique(&parameters)?;

    let expected = stimulus.len();
    for trace in &traces {
        for (component, values) in [(Component::Real, &trace.real), (Component::Imag, &trace.imag)]
        {
            if values.len() != expected {
                return Err(VnaError::LengthMismatch {
                    column: DatasetKey::new(trace.parameter.clone(), component).column_name(),
                    expected,
                    found: values.len(),
                });
            }
        }
    }

    let series = traces
        .into_iter()
        .map(|t| ParameterSeries {
            parameter: t.parameter,
            real: t.real,
            imag: t.imag,
        })
        .collect();

    Ok(MeasurementDataset { stimulus, series })
}

impl MeasurementDataset {
    /// Stimulus frequencies in Hz.
    pub fn stimulus(&self) -> &[f64] {
        &self.stimulus
    }

    /// Stimulus frequencies converted to `unit`.
    pub fn stimulus_in(&self, unit: FrequencyUnit) -> Vec<f64> {
        let scale = unit.hz_per_unit();
        self.stimulus.iter().map(|f| f / scale).collect()
    }

    /// Number of sweep points.
    pub fn len(&self) -> usize {
        self.stimulus.len()
    }

    /// True when the sweep has no points.
    pub fn is_empty(&self) -> bool {
        self.stimulus.is_empty()
    }

    /// Parameters in configured order.
    pub fn parameters(&self) -> impl Iterator<Item = &MeasurementParameter> {
        self.series.iter().map(|s| &s.parameter)
    }

    /// Number of real-valued sequences (two per parameter).
    pub fn sequence_count(&self) -> usize {
        self.series.len() * 2
    }

    /// Samples of one component of a parameter.
    pub fn component(&self, parameter: &MeasurementParameter, component: Component) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| &s.parameter == parameter)
            .map(|s| match component {
                Component::Real => s.real.as_slice(),
                Component::Imag => s.imag.as_slice(),
            })
    }

    /// Samples for a composite key.
    pub fn get(&self, key: &DatasetKey) -> Option<&[f64]> {
        self.component(&key.parameter, key.component)
    }

    /// Complex samples of a parameter.
    pub fn complex(&self, parameter: &MeasurementParameter) -> Option<Vec<Complex64>> {
        self.series
            .iter()
            .find(|s| &s.parameter == parameter)
            .map(|s| {
                s.real
                    .iter()
                    .zip(&s.imag)
                    .map(|(&re, &im)| Complex64::new(re, im))
                    .collect()
            })
    }

    /// All sequences in column order: parameter order, real before imaginary.
    pub fn columns(&self) -> impl Iterator<Item = (DatasetKey, &[f64])> {
        self.series.iter().flat_map(|s| {
            [
                (
                    DatasetKey::new(s.parameter.clone(), Component::Real),
                    s.real.as_slice(),
                ),
                (
                    DatasetKey::new(s.parameter.clone(), Component::Imag),
                    s.imag.as_slice(),
                ),
            ]
        })
    }
}

/// Display unit for stimulus frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FrequencyUnit {
    /// Hertz.
    #[default]
    Hz,
    /// Kilohertz.
    KHz,
    /// Megahertz.
    MHz,
    /// Gigahertz.
    GHz,
}

impl FrequencyUnit {
    fn hz_per_unit(self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::GHz => 1e9,
        }
    }
}

/// Metadata describing one acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    /// Unique id of this acquisition.
    pub run_id: Uuid,
    /// Time the acquisition completed.
    pub timestamp: DateTime<Utc>,
    /// Instrument resource the data came from, if known.
    pub resource: Option<String>,
    /// Instrument identity (`*IDN?`), if known.
    pub identity: Option<String>,
    /// Parameters in configured order.
    pub parameters: Vec<MeasurementParameter>,
    /// Number of sweep points.
    pub points: usize,
}

/// A completed acquisition: dataset plus run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    /// Run metadata.
    pub metadata: AcquisitionMetadata,
    /// Assembled data.
    pub dataset: MeasurementDataset,
}

impl Acquisition {
    /// Wrap a dataset with freshly generated metadata.
    pub fn new(dataset: MeasurementDataset, resource: Option<String>, identity: Option<String>) -> Self {
        let metadata = AcquisitionMetadata {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            resource,
            identity,
            parameters: dataset.parameters().cloned().collect(),
            points: dataset.len(),
        };
        Self { metadata, dataset }
    }
}
