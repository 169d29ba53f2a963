//! Measurement data model and result assembly.
//!
//! - [`parameter`] holds the opaque parameter labels, trace components and
//!   trace descriptors.
//! - [`dataset`] merges stimulus and trace vectors into a length-checked
//!   [`MeasurementDataset`].

pub mod dataset;
pub mod parameter;

pub use dataset::{
    assemble, Acquisition, AcquisitionMetadata, DatasetKey, FrequencyUnit, MeasurementDataset,
    TraceData,
};
pub use parameter::{parse_parameters, Component, MeasurementParameter, TraceSpec};
