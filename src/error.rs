//! Custom error types for the application.
//!
//! This module defines the two error types used throughout the crate. Both are
//! built with `thiserror` so that callers can match on the failure kind instead
//! of inspecting message strings.
//!
//! ## Error Hierarchy
//!
//! - **`ChannelError`**: failures of the instrument command channel itself
//!   (transport dropped, timeout, unparsable response, missing VISA support).
//!   Channels return nothing else.
//! - **`VnaError`**: the crate-level error. It wraps `ChannelError` and adds
//!   the session failures (`Setup`, `Acquisition`, `InvalidState`), the
//!   data-shape and numerical-domain failures of the matrix transform and
//!   result assembly (`DimensionMismatch`, `SingularMatrix`, `LengthMismatch`,
//!   ...) and the ambient failures (configuration, I/O, storage, features
//!   compiled out).
//!
//! Nothing in the crate retries on error. A `Setup` error carries the list of
//! traces that were already created on the instrument when the sequence
//! aborted, because the instrument is mutated incrementally.

use crate::measurement::TraceSpec;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type VnaResult<T> = std::result::Result<T, VnaError>;

/// Failure reported by an instrument command channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// No resource is open.
    #[error("Channel is not connected to an instrument")]
    NotConnected,

    /// A scan returned no resources.
    #[error("No instrument resources found")]
    NoResources,

    /// Transport failure while sending or reading.
    #[error("I/O error on '{command}': {message}")]
    Io {
        /// Command being executed.
        command: String,
        /// Backend message.
        message: String,
    },

    /// No response arrived in time.
    #[error("Timeout waiting for response to '{command}'")]
    Timeout {
        /// Query that timed out.
        command: String,
    },

    /// Response could not be parsed.
    #[error("Malformed response to '{command}': {response:?}")]
    MalformedResponse {
        /// Query that was answered.
        command: String,
        /// Raw response text.
        response: String,
    },

    /// Error reported by the backend or the instrument.
    #[error("Instrument backend error: {0}")]
    Backend(String),

    /// Backend compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(&'static str),
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum VnaError {
    /// Channel failure outside setup and acquisition.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Trace configuration aborted part way.
    #[error("Setup failed at step '{step}' after creating {} trace(s): {source}", traces_created.len())]
    Setup {
        /// Label of the failed step.
        step: String,
        /// Traces defined on the instrument before the failure.
        traces_created: Vec<TraceSpec>,
        /// Underlying channel failure.
        #[source]
        source: ChannelError,
    },

    /// A stimulus or trace query failed.
    #[error("Acquisition failed reading '{trace}': {source}")]
    Acquisition {
        /// Trace name, or `stimulus`.
        trace: String,
        /// Underlying channel failure.
        #[source]
        source: ChannelError,
    },

    /// Matrix and port count disagree.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected shape.
        expected: String,
        /// Actual shape.
        found: String,
    },

    /// The matrix to invert is singular.
    #[error("Singular matrix in {operation}")]
    SingularMatrix {
        /// Conversion that failed.
        operation: &'static str,
    },

    /// A conversion failed inside a sweep.
    #[error("Conversion failed at sweep point {index}: {source}")]
    SweepPoint {
        /// Index of the failing point.
        index: usize,
        /// Point-level error.
        #[source]
        source: Box<VnaError>,
    },

    /// NaN or infinite matrix entry.
    #[error("Non-finite entry at ({row}, {col})")]
    NonFiniteInput {
        /// Row index.
        row: usize,
        /// Column index.
        col: usize,
    },

    /// A sequence does not match the stimulus length.
    #[error("Length mismatch in column '{column}': expected {expected}, found {found}")]
    LengthMismatch {
        /// Column name, e.g. `S21_imag`.
        column: String,
        /// Stimulus length.
        expected: usize,
        /// Sequence length.
        found: usize,
    },

    /// Reference impedance is zero, non-finite or missing.
    #[error("Invalid port impedance: {0}")]
    InvalidImpedance(String),

    /// Parameter list is empty, duplicated or otherwise unusable.
    #[error("Invalid measurement parameters: {0}")]
    InvalidParameters(String),

    /// A matrix element has no data in the dataset.
    #[error("Missing parameter '{0}' for matrix assembly")]
    MissingParameter(String),

    /// Operation called in a state that does not allow it.
    #[error("Operation '{operation}' is not valid in state {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// Current session state.
        state: String,
    },

    /// Invalid configuration or command template.
    #[error("Configuration validation error: {0}")]
    Config(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage or instrument backend compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}
