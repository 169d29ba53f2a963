//! Core library for the rust_vna application.
//!
//! This library acquires S-parameters from a vector network analyzer and
//! converts between scattering (S) and impedance (Z) representations. It is
//! used by the `rust_vna` command-line tool.
//!
//! - [`network`]: pure S↔Z matrix transforms and sweep helpers
//! - [`instrument`]: the command channel contract and its implementations
//! - [`session`]: the trace configuration and acquisition state machine
//! - [`measurement`]: parameters, traces and dataset assembly
//! - [`storage`]: CSV persistence of acquisitions
//!
//! # Example
//!
//! ```
//! use rust_vna::instrument::SimulatedVna;
//! use rust_vna::measurement::parse_parameters;
//! use rust_vna::session::{MeasurementSession, SessionConfig};
//!
//! let mut session = MeasurementSession::new(SimulatedVna::new(), SessionConfig::default())?;
//! session.connect(None)?;
//! session.configure(&parse_parameters(&["S11", "S21"])?)?;
//! let acquisition = session.acquire()?;
//! assert_eq!(acquisition.dataset.sequence_count(), 4);
//! # Ok::<(), rust_vna::error::VnaError>(())
//! ```

pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod measurement;
pub mod network;
pub mod session;
pub mod storage;
