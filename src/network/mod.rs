//! Network-parameter representations and conversions.
//!
//! Everything in this module is pure and stateless; it can be used on any
//! dataset at any time, independently of an instrument session.

pub mod matrix;
pub mod ports;
pub mod transform;

pub use matrix::{dataset_from_sweep, sweep_from_dataset};
pub use ports::PortImpedances;
pub use transform::{s_to_z, s_to_z_sweep, z_to_s, z_to_s_sweep, ParameterMatrix};
