//! VISA command channel.
//!
//! This module provides a `Channel` implementation for analyzers reachable
//! through a VISA library (USB, LAN/VXI-11, HiSLIP, GPIB). It uses the
//! `visa-rs` crate, which links against the vendor VISA shared library at
//! runtime, so it is compiled only with the `instrument_visa` feature.
//! Without the feature every operation returns
//! [`ChannelError::FeatureNotEnabled`].
//!
//! ## Configuration
//!
//! ```toml
//! [instrument]
//! resource = "TCPIP0::192.168.1.40::inst0::INSTR"
//! timeout_ms = 5000
//! write_terminator = "\n"
//! ```
//!
//! - `resource`: VISA resource string. When omitted the first resource found
//!   by a scan is used.
//! - `timeout_ms`: I/O timeout applied to the session after it opens.
//! - `write_terminator`: appended to every command.

use super::channel::Channel;
use crate::error::ChannelError;

/// Default I/O timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// `Channel` backed by a VISA resource manager session.
pub struct VisaChannel {
    timeout_ms: u32,
    write_terminator: String,
    resource: Option<String>,
    #[cfg(feature = "instrument_visa")]
    session: Option<backend::Session>,
}

impl Default for VisaChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisaChannel")
            .field("timeout_ms", &self.timeout_ms)
            .field("write_terminator", &self.write_terminator)
            .field("resource", &self.resource)
            .finish()
    }
}

impl VisaChannel {
    /// Create an unopened channel with default timeout and `\n` terminator.
    pub fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            write_terminator: "\n".into(),
            resource: None,
            #[cfg(feature = "instrument_visa")]
            session: None,
        }
    }

    /// Set the I/O timeout used for sessions opened afterwards.
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the terminator appended to each command.
    pub fn with_write_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.write_terminator = terminator.into();
        self
    }

    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    fn terminated(&self, command: &str) -> String {
        format!("{}{}", command, self.write_terminator)
    }
}

#[cfg(feature = "instrument_visa")]
mod backend {
    use crate::error::ChannelError;
    use std::ffi::CString;
    use std::io::{BufRead, BufReader, Write};
    use tracing::warn;
    use visa_rs::prelude::*;

    pub(super) struct Session {
        _rm: DefaultRM,
        instr: Instrument,
    }

    fn backend_err(e: impl std::fmt::Display) -> ChannelError {
        ChannelError::Backend(e.to_string())
    }

    fn visa_string(s: &str) -> Result<VisaString, ChannelError> {
        CString::new(s)
            .map(VisaString::from)
            .map_err(|e| ChannelError::Backend(format!("invalid resource string {:?}: {}", s, e)))
    }

    pub(super) fn scan() -> Result<Vec<String>, ChannelError> {
        let rm = DefaultRM::new().map_err(backend_err)?;
        let mut list = rm
            .find_res_list(&visa_string("?*INSTR")?)
            .map_err(backend_err)?;
        let mut found = Vec::new();
        while let Some(res) = list.find_next().map_err(backend_err)? {
            found.push(res.to_string());
        }
        Ok(found)
    }

    pub(super) fn open(address: &str, timeout_ms: u32) -> Result<Session, ChannelError> {
        let rm = DefaultRM::new().map_err(backend_err)?;
        let instr = rm
            .open(&visa_string(address)?, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(backend_err)?;
        match attribute::AttrTmoValue::new_checked(timeout_ms) {
            Some(tmo) => instr.set_attr(tmo).map_err(backend_err)?,
            None => warn!(timeout_ms, "timeout out of range, keeping VISA default"),
        }
        Ok(Session { _rm: rm, instr })
    }

    impl Session {
        pub(super) fn write(&mut self, command: &str, data: &str) -> Result<(), ChannelError> {
            (&self.instr)
                .write_all(data.as_bytes())
                .map_err(|e| io_error(command, e))
        }

        pub(super) fn read_line(&mut self, command: &str) -> Result<String, ChannelError> {
            let mut line = String::new();
            BufReader::new(&self.instr)
                .read_line(&mut line)
                .map_err(|e| io_error(command, e))?;
            Ok(line)
        }
    }

    fn io_error(command: &str, e: std::io::Error) -> ChannelError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            ChannelError::Timeout {
                command: command.to_string(),
            }
        } else {
            ChannelError::Io {
                command: command.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(feature = "instrument_visa")]
impl Channel for VisaChannel {
    fn scan(&mut self) -> Result<Vec<String>, ChannelError> {
        backend::scan()
    }

    fn open(&mut self, address: &str) -> Result<(), ChannelError> {
        self.session = None;
        self.resource = None;
        let session = backend::open(address, self.timeout_ms)?;
        tracing::info!(resource = address, "VISA session opened");
        self.session = Some(session);
        self.resource = Some(address.to_string());
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), ChannelError> {
        let data = self.terminated(command);
        let session = self.session.as_mut().ok_or(ChannelError::NotConnected)?;
        session.write(command, &data)
    }

    fn query(&mut self, command: &str) -> Result<String, ChannelError> {
        let data = self.terminated(command);
        let session = self.session.as_mut().ok_or(ChannelError::NotConnected)?;
        session.write(command, &data)?;
        let line = session.read_line(command)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        if self.session.take().is_some() {
            tracing::info!(resource = ?self.resource, "VISA session closed");
        }
        self.resource = None;
        Ok(())
    }

    fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

#[cfg(not(feature = "instrument_visa"))]
impl Channel for VisaChannel {
    fn scan(&mut self) -> Result<Vec<String>, ChannelError> {
        Err(ChannelError::FeatureNotEnabled("instrument_visa"))
    }

    fn open(&mut self, _address: &str) -> Result<(), ChannelError> {
        Err(ChannelError::FeatureNotEnabled("instrument_visa"))
    }

    fn write(&mut self, _command: &str) -> Result<(), ChannelError> {
        Err(ChannelError::FeatureNotEnabled("instrument_visa"))
    }

    fn query(&mut self, _command: &str) -> Result<String, ChannelError> {
        Err(ChannelError::FeatureNotEnabled("instrument_visa"))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.resource = None;
        Ok(())
    }

    fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings() {
        let channel = VisaChannel::new()
            .with_timeout(2000)
            .with_write_terminator("\r\n");
        assert_eq!(channel.timeout_ms, 2000);
        assert_eq!(channel.terminated("*IDN?"), "*IDN?\r\n");
        assert!(!channel.is_connected());
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_feature_disabled() {
        let mut channel = VisaChannel::new();
        assert_eq!(
            channel.scan(),
            Err(ChannelError::FeatureNotEnabled("instrument_visa"))
        );
        assert!(channel.open("TCPIP0::1.2.3.4::INSTR").is_err());
        assert!(channel.close().is_ok());
    }
}
