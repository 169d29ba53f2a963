//! Software vector network analyzer.
//!
//! `SimulatedVna` answers the default Rohde & Schwarz command set with data
//! synthesized from a fixed two-port T-network:
//!
//! ```text
//!   port 1 ──[ R1 + jωL1 ]──┬──[ R2 + jωL2 ]── port 2
//!                           │
//!                      [ R3 + 1/jωC ]
//!                           │
//!                          gnd
//! ```
//!
//! The network is specified in Z and converted to S through the crate's own
//! transform, so converting a simulated measurement back to Z reproduces the
//! element values above. It keeps a trace table the way the real instrument
//! does: `SDEF` creates a trace and makes it active, `FORM` sets the active
//! trace's format, `DEL:ALL` and `*RST` clear the table.

use super::channel::Channel;
use crate::error::ChannelError;
use crate::measurement::{Component, MeasurementParameter};
use crate::network::{z_to_s, ParameterMatrix, PortImpedances};
use num_complex::Complex64;
use once_cell::sync::Lazy;
use regex::Regex;
use std::f64::consts::PI;
use tracing::debug;

/// Resource address reported by [`SimulatedVna::scan`](Channel::scan).
pub const SIMULATED_RESOURCE: &str = "SIM::VNA::INSTR";

static DEFINE_TRACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^CALC1:PAR:SDEF\s+'([^']+)'\s*,\s*'([^']+)'$").expect("valid regex")
});
static SET_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CALC1:FORM\s+(\w+)$").expect("valid regex"));
static FEED_DISPLAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^DISP1:WIND:TRAC(\d+):FEED\s+'([^']+)'$").expect("valid regex")
});
static SWEEP_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SENS1:SWE:TYPE\s+(\w+)$").expect("valid regex"));
static AVERAGING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SENS1:AVER\s+(ON|OFF)$").expect("valid regex"));
static TRACE_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^CALC1:DATA:TRAC\?\s+'([^']+)'\s*,\s*FDAT$").expect("valid regex")
});

#[derive(Debug, Clone)]
struct SimTrace {
    name: String,
    row: usize,
    col: usize,
    format: Option<Component>,
}

/// Two-port analyzer simulation.
#[derive(Debug, Clone)]
pub struct SimulatedVna {
    identity: String,
    start_hz: f64,
    stop_hz: f64,
    points: usize,
    resource: Option<String>,
    traces: Vec<SimTrace>,
    active: Option<usize>,
    displayed: Vec<(u32, String)>,
    window_on: bool,
    averaging: bool,
    sweep_type: String,
}

impl Default for SimulatedVna {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVna {
    /// 201-point linear sweep from 10 MHz to 3 GHz.
    pub fn new() -> Self {
        Self {
            identity: "Rohde-Schwarz,ZVA-SIM,000000,1.0".into(),
            start_hz: 10e6,
            stop_hz: 3e9,
            points: 201,
            resource: None,
            traces: Vec::new(),
            active: None,
            displayed: Vec::new(),
            window_on: false,
            averaging: false,
            sweep_type: "LIN".into(),
        }
    }

    /// Set the simulated sweep. `points` is clamped to at least one.
    pub fn with_sweep(mut self, start_hz: f64, stop_hz: f64, points: usize) -> Self {
        self.start_hz = start_hz;
        self.stop_hz = stop_hz;
        self.points = points.max(1);
        self
    }

    /// Names of the traces currently defined, in creation order.
    pub fn trace_names(&self) -> Vec<&str> {
        self.traces.iter().map(|t| t.name.as_str()).collect()
    }

    /// Display slots currently fed, with the trace bound to each.
    pub fn displayed(&self) -> &[(u32, String)] {
        &self.displayed
    }

    /// Whether averaging was last switched on.
    pub fn averaging(&self) -> bool {
        self.averaging
    }

    /// Last sweep type written.
    pub fn sweep_type(&self) -> &str {
        &self.sweep_type
    }

    /// Stimulus frequencies of the simulated sweep.
    pub fn frequencies(&self) -> Vec<f64> {
        if self.points == 1 {
            return vec![self.start_hz];
        }
        let step = (self.stop_hz - self.start_hz) / (self.points - 1) as f64;
        (0..self.points)
            .map(|i| self.start_hz + step * i as f64)
            .collect()
    }

    /// Z-matrix of the simulated network at `freq_hz`.
    pub fn z_matrix(freq_hz: f64) -> ParameterMatrix {
        let omega = 2.0 * PI * freq_hz;
        let series_1 = Complex64::new(10.0, omega * 5e-9);
        let series_2 = Complex64::new(20.0, omega * 2e-9);
        let shunt = Complex64::new(25.0, 0.0) + Complex64::new(0.0, omega * 2e-12).inv();
        ParameterMatrix::from_row_slice(
            2,
            2,
            &[series_1 + shunt, shunt, shunt, series_2 + shunt],
        )
    }

    fn reset_traces(&mut self) {
        self.traces.clear();
        self.active = None;
        self.displayed.clear();
        self.window_on = false;
    }

    fn backend(command: &str, reason: &str) -> ChannelError {
        ChannelError::Backend(format!("{}: {}", reason, command))
    }

    fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.resource.is_none() {
            return Err(ChannelError::NotConnected);
        }
        Ok(())
    }

    fn trace_values(&self, command: &str, name: &str) -> Result<Vec<f64>, ChannelError> {
        let trace = self
            .traces
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Self::backend(command, "unknown trace"))?;
        let format = trace
            .format
            .ok_or_else(|| Self::backend(command, "trace format not set"))?;

        let ports = PortImpedances::uniform(2, 50.0)
            .map_err(|e| ChannelError::Backend(e.to_string()))?;
        self.frequencies()
            .into_iter()
            .map(|f| {
                let s = z_to_s(&Self::z_matrix(f), &ports)
                    .map_err(|e| ChannelError::Backend(e.to_string()))?;
                let value = s[(trace.row, trace.col)];
                Ok(match format {
                    Component::Real => value.re,
                    Component::Imag => value.im,
                })
            })
            .collect()
    }
}

fn format_list(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.12e}", v))
        .collect::<Vec<_>>()
        .join(",")
}

impl Channel for SimulatedVna {
    fn scan(&mut self) -> Result<Vec<String>, ChannelError> {
        Ok(vec![SIMULATED_RESOURCE.to_string()])
    }

    fn open(&mut self, address: &str) -> Result<(), ChannelError> {
        if address != SIMULATED_RESOURCE {
            return Err(ChannelError::Backend(format!(
                "resource not found: {}",
                address
            )));
        }
        self.resource = Some(address.to_string());
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), ChannelError> {
        self.ensure_connected()?;
        let command = command.trim();
        debug!(command, "simulated write");

        if command == "*RST" || command == "CALC1:PAR:DEL:ALL" {
            self.reset_traces();
        } else if command == "DISP1:WIND:STAT ON" {
            self.window_on = true;
        } else if let Some(caps) = DEFINE_TRACE.captures(command) {
            let name = caps[1].to_string();
            let parameter: MeasurementParameter = caps[2]
                .parse()
                .map_err(|_| Self::backend(command, "invalid parameter"))?;
            let (row, col) = parameter
                .port_indices()
                .filter(|&(r, c)| parameter.as_str().starts_with('S') && r < 2 && c < 2)
                .ok_or_else(|| Self::backend(command, "unsupported parameter"))?;
            if self.traces.iter().any(|t| t.name == name) {
                return Err(Self::backend(command, "trace already exists"));
            }
            self.traces.push(SimTrace {
                name,
                row,
                col,
                format: None,
            });
            self.active = Some(self.traces.len() - 1);
        } else if let Some(caps) = SET_FORMAT.captures(command) {
            let format = match &caps[1] {
                "REAL" => Component::Real,
                "IMAG" => Component::Imag,
                _ => return Err(Self::backend(command, "unsupported format")),
            };
            let active = self
                .active
                .ok_or_else(|| Self::backend(command, "no active trace"))?;
            self.traces[active].format = Some(format);
        } else if let Some(caps) = FEED_DISPLAY.captures(command) {
            let slot: u32 = caps[1]
                .parse()
                .map_err(|_| Self::backend(command, "invalid display slot"))?;
            let name = caps[2].to_string();
            if !self.traces.iter().any(|t| t.name == name) {
                return Err(Self::backend(command, "unknown trace"));
            }
            self.displayed.retain(|(s, _)| *s != slot);
            self.displayed.push((slot, name));
        } else if let Some(caps) = SWEEP_TYPE.captures(command) {
            self.sweep_type = caps[1].to_string();
        } else if let Some(caps) = AVERAGING.captures(command) {
            self.averaging = &caps[1] == "ON";
        } else {
            return Err(Self::backend(command, "unrecognized command"));
        }
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, ChannelError> {
        self.ensure_connected()?;
        let command = command.trim();
        debug!(command, "simulated query");

        if command == "*IDN?" {
            Ok(self.identity.clone())
        } else if command == "TRAC:STIM? CH1DATA" {
            Ok(format_list(&self.frequencies()))
        } else if let Some(caps) = TRACE_DATA.captures(command) {
            Ok(format_list(&self.trace_values(command, &caps[1])?))
        } else {
            Err(Self::backend(command, "unrecognized query"))
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.resource = None;
        Ok(())
    }

    fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}
