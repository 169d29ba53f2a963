//! SCPI command templates used by the measurement session.
//!
//! Templates are plain strings with named `{placeholders}` rendered through
//! `strfmt`, so a different analyzer family can be driven by configuration
//! alone. The defaults target the Rohde & Schwarz ZVA/ZNB command set.
//!
//! | Template | Placeholders |
//! |---|---|
//! | `define_trace` | `trace`, `parameter` |
//! | `set_format` | `format` |
//! | `feed_display` | `slot`, `trace` |
//! | `sweep_type` | `sweep_type` |
//! | `averaging` | `state` |
//! | `trace_data` | `trace` |

use crate::error::{VnaError, VnaResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strfmt::strfmt;

/// Command templates for one analyzer family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSet {
    /// Instrument reset.
    pub reset: String,
    /// Identity query.
    pub identify: String,
    /// Deletes every trace on the channel.
    pub delete_all_traces: String,
    /// Defines a trace for a parameter.
    pub define_trace: String,
    /// Sets the format of the active trace.
    pub set_format: String,
    /// Binds a trace to a display slot.
    pub feed_display: String,
    /// Switches the display window on.
    pub window_on: String,
    /// Selects the sweep type.
    pub sweep_type: String,
    /// Turns averaging on or off.
    pub averaging: String,
    /// Queries the stimulus frequencies.
    pub stimulus: String,
    /// Queries the data of one trace.
    pub trace_data: String,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            reset: "*RST".into(),
            identify: "*IDN?".into(),
            delete_all_traces: "CALC1:PAR:DEL:ALL".into(),
            define_trace: "CALC1:PAR:SDEF '{trace}', '{parameter}'".into(),
            set_format: "CALC1:FORM {format}".into(),
            feed_display: "DISP1:WIND:TRAC{slot}:FEED '{trace}'".into(),
            window_on: "DISP1:WIND:STAT ON".into(),
            sweep_type: "SENS1:SWE:TYPE {sweep_type}".into(),
            averaging: "SENS1:AVER {state}".into(),
            stimulus: "TRAC:STIM? CH1DATA".into(),
            trace_data: "CALC1:DATA:TRAC? '{trace}', FDAT".into(),
        }
    }
}

impl CommandSet {
    /// Trace definition command.
    pub fn define_trace(&self, trace: &str, parameter: &str) -> VnaResult<String> {
        render(&self.define_trace, &[("trace", trace), ("parameter", parameter)])
    }

    /// Display format command for the active trace.
    pub fn set_format(&self, format: &str) -> VnaResult<String> {
        render(&self.set_format, &[("format", format)])
    }

    /// Display feed command binding `trace` to `slot`.
    pub fn feed_display(&self, slot: u32, trace: &str) -> VnaResult<String> {
        render(&self.feed_display, &[("slot", &slot.to_string()), ("trace", trace)])
    }

    /// Sweep type command.
    pub fn sweep_type(&self, sweep_type: &str) -> VnaResult<String> {
        render(&self.sweep_type, &[("sweep_type", sweep_type)])
    }

    /// Averaging on/off command.
    pub fn averaging(&self, enabled: bool) -> VnaResult<String> {
        render(&self.averaging, &[("state", if enabled { "ON" } else { "OFF" })])
    }

    /// Trace data query.
    pub fn trace_data(&self, trace: &str) -> VnaResult<String> {
        render(&self.trace_data, &[("trace", trace)])
    }

    /// Render every template with sample values to catch typos before any
    /// command reaches the instrument.
    pub fn validate(&self) -> VnaResult<()> {
        self.define_trace("T", "S11")?;
        self.set_format("REAL")?;
        self.feed_display(1, "T")?;
        self.sweep_type("LIN")?;
        self.averaging(true)?;
        self.trace_data("T")?;
        for (name, fixed) in [
            ("reset", &self.reset),
            ("identify", &self.identify),
            ("delete_all_traces", &self.delete_all_traces),
            ("window_on", &self.window_on),
            ("stimulus", &self.stimulus),
        ] {
            if fixed.trim().is_empty() {
                return Err(VnaError::Config(format!("command '{}' is empty", name)));
            }
        }
        Ok(())
    }
}

fn render(template: &str, vars: &[(&str, &str)]) -> VnaResult<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    strfmt(template, &vars)
        .map_err(|e| VnaError::Config(format!("bad command template {:?}: {}", template, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands_render() {
        let cmds = CommandSet::default();
        assert_eq!(
            cmds.define_trace("TRC_REAL_S11", "S11").unwrap(),
            "CALC1:PAR:SDEF 'TRC_REAL_S11', 'S11'"
        );
        assert_eq!(
            cmds.feed_display(12, "TRC_IMAG_S11").unwrap(),
            "DISP1:WIND:TRAC12:FEED 'TRC_IMAG_S11'"
        );
        assert_eq!(
            cmds.trace_data("TRC_REAL_S21").unwrap(),
            "CALC1:DATA:TRAC? 'TRC_REAL_S21', FDAT"
        );
        assert_eq!(cmds.averaging(false).unwrap(), "SENS1:AVER OFF");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let cmds = CommandSet {
            trace_data: "CALC1:DATA:TRAC? '{name}', FDAT".into(),
            ..Default::default()
        };
        assert!(cmds.validate().is_err());
    }

    #[test]
    fn test_default_set_validates() {
        assert!(CommandSet::default().validate().is_ok());
    }
}
