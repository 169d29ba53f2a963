//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/vna.toml` (optional base configuration)
//! 2. Environment variables prefixed with `RUST_VNA_`
//!
//! Every field has a default, so an empty or missing file yields a complete
//! working configuration.
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! RUST_VNA_APPLICATION__LOG_LEVEL=debug
//! RUST_VNA_INSTRUMENT__RESOURCE="TCPIP0::192.168.1.40::inst0::INSTR"
//! RUST_VNA_MEASUREMENT__DISPLAY_SLOT_BASE=21
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rust_vna::config::VnaConfig;
//!
//! let config = VnaConfig::load().unwrap();
//! println!("Parameters: {:?}", config.measurement.parameters);
//! ```

use crate::error::VnaError;
use crate::instrument::CommandSet;
use crate::measurement::{parse_parameters, MeasurementParameter};
use crate::network::PortImpedances;
use crate::session::{prefixed_naming, SessionConfig, DEFAULT_PREFIX_IMAG, DEFAULT_PREFIX_REAL};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/vna.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for VnaError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::LoadError(e) => VnaError::Config(e.to_string()),
            ConfigError::ValidationError(msg) => VnaError::Config(msg),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VnaConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument connection settings
    pub instrument: InstrumentConfig,
    /// Trace configuration and command set
    pub measurement: MeasurementConfig,
    /// Output settings
    pub storage: StorageConfig,
    /// Reference impedances for S/Z conversion
    pub ports: PortsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Optional base directory; relative output paths are resolved against it
    pub data_dir: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust_vna".into(),
            log_level: "info".into(),
            data_dir: None,
        }
    }
}

/// Instrument connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// VISA resource string; the first scanned resource is used when absent
    pub resource: Option<String>,
    /// I/O timeout in milliseconds
    pub timeout_ms: u32,
    /// Terminator appended to every command
    pub write_terminator: String,
    /// Read `*IDN?` after connecting
    pub query_identity: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: None,
            timeout_ms: 5000,
            write_terminator: "\n".into(),
            query_identity: true,
        }
    }
}

/// Measurement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Parameters to configure, in trace-creation order
    pub parameters: Vec<String>,
    /// Prefix of real-part trace names
    pub trace_prefix_real: String,
    /// Prefix of imaginary-part trace names
    pub trace_prefix_imag: String,
    /// Display slot of the first real trace
    pub display_slot_base: u32,
    /// Sweep type to set during configuration (e.g. LIN, LOG)
    pub sweep_type: Option<String>,
    /// Averaging state to set during configuration
    pub averaging: Option<bool>,
    /// Reset the instrument before configuring traces
    pub reset_on_configure: bool,
    /// Switch the display window on after configuration
    pub enable_window: bool,
    /// SCPI command templates
    pub commands: CommandSet,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            parameters: ["S11", "S12", "S21", "S22"].map(String::from).to_vec(),
            trace_prefix_real: DEFAULT_PREFIX_REAL.into(),
            trace_prefix_imag: DEFAULT_PREFIX_IMAG.into(),
            display_slot_base: 11,
            sweep_type: None,
            averaging: None,
            reset_on_configure: false,
            enable_window: true,
            commands: CommandSet::default(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory for acquisition files
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

/// Port reference impedances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Real reference impedance per port, in ohms
    pub reference_impedances: Vec<f64>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            reference_impedances: vec![50.0, 50.0],
        }
    }
}

impl VnaConfig {
    /// Load configuration from `config/vna.toml` and environment variables.
    ///
    /// Precedence, highest first: environment (`RUST_VNA_`), file, defaults.
    /// The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUST_VNA_").split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Parameters are non-empty and unique
    /// - Display slots for every trace fit in `u32`
    /// - Trace prefixes are non-empty and differ
    /// - Timeout is positive
    /// - Reference impedances are positive and finite
    /// - Command templates render
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let parameters = self
            .parameters()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let m = &self.measurement;
        let last_slot = u32::try_from(2 * parameters.len() - 1)
            .ok()
            .and_then(|span| m.display_slot_base.checked_add(span));
        if last_slot.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "display_slot_base {} leaves no room for {} traces",
                m.display_slot_base,
                2 * parameters.len()
            )));
        }
        if m.trace_prefix_real.is_empty() || m.trace_prefix_imag.is_empty() {
            return Err(ConfigError::ValidationError(
                "Trace prefixes cannot be empty".into(),
            ));
        }
        if m.trace_prefix_real == m.trace_prefix_imag {
            return Err(ConfigError::ValidationError(format!(
                "Real and imaginary trace prefixes must differ (both '{}')",
                m.trace_prefix_real
            )));
        }
        m.commands
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.instrument.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid timeout_ms 0. Must be > 0".into(),
            ));
        }

        if let Some(bad) = self
            .ports
            .reference_impedances
            .iter()
            .find(|z| !z.is_finite() || **z <= 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid reference impedance {}. Must be positive and finite",
                bad
            )));
        }

        Ok(())
    }

    /// Configured parameters, parsed.
    pub fn parameters(&self) -> Result<Vec<MeasurementParameter>, VnaError> {
        parse_parameters(&self.measurement.parameters[..])
    }

    /// Reference impedances for `n_ports` ports.
    ///
    /// A single configured value applies to every port.
    pub fn port_impedances(&self, n_ports: usize) -> Result<PortImpedances, VnaError> {
        match self.ports.reference_impedances.as_slice() {
            [z0] => PortImpedances::uniform(n_ports, *z0),
            zs => PortImpedances::from_real(zs),
        }
    }

    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        let m = &self.measurement;
        SessionConfig {
            naming: prefixed_naming(m.trace_prefix_real.clone(), m.trace_prefix_imag.clone()),
            commands: m.commands.clone(),
            display_slot_base: m.display_slot_base,
            sweep_type: m.sweep_type.clone(),
            averaging: m.averaging,
            reset_on_configure: m.reset_on_configure,
            enable_window: m.enable_window,
            query_identity: self.instrument.query_identity,
        }
    }

    /// Output directory, resolved against `application.data_dir` when relative.
    pub fn output_dir(&self) -> PathBuf {
        match &self.application.data_dir {
            Some(base) if self.storage.output_dir.is_relative() => {
                base.join(&self.storage.output_dir)
            }
            _ => self.storage.output_dir.clone(),
        }
    }
}
