//! Instrument command channel contract.
//!
//! A channel is an opaque, blocking command/response link to one instrument.
//! The session consumes only this trait; transports (VISA, simulation, test
//! doubles) live behind it.
//!
//! The `OK`/`ERROR` status of every call is the `Result`: callers must branch
//! on it at each call site (`?`), never assume success.

use crate::error::ChannelError;

/// Blocking command/response link to an instrument.
///
/// Every method blocks the calling thread until the instrument answers or the
/// channel's own timeout expires. There is no cancellation mid-call.
pub trait Channel: Send {
    /// List addresses of reachable instruments.
    fn scan(&mut self) -> Result<Vec<String>, ChannelError>;

    /// Open the instrument at `address`, replacing any open connection.
    fn open(&mut self, address: &str) -> Result<(), ChannelError>;

    /// Send a command that produces no response.
    fn write(&mut self, command: &str) -> Result<(), ChannelError>;

    /// Send a command and read its response, trimmed of terminators.
    fn query(&mut self, command: &str) -> Result<String, ChannelError>;

    /// Release the connection. Closing a closed channel is a no-op.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Address of the open instrument, if any.
    fn resource(&self) -> Option<&str>;

    /// True while an instrument is open.
    fn is_connected(&self) -> bool {
        self.resource().is_some()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn scan(&mut self) -> Result<Vec<String>, ChannelError> {
        (**self).scan()
    }

    fn open(&mut self, address: &str) -> Result<(), ChannelError> {
        (**self).open(address)
    }

    fn write(&mut self, command: &str) -> Result<(), ChannelError> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String, ChannelError> {
        (**self).query(command)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }

    fn resource(&self) -> Option<&str> {
        (**self).resource()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Parse a comma-separated list of reals as returned by trace and stimulus queries.
pub fn parse_real_list(command: &str, response: &str) -> Result<Vec<f64>, ChannelError> {
    let malformed = || ChannelError::MalformedResponse {
        command: command.to_string(),
        response: response.to_string(),
    };

    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(malformed());
    }
    trimmed
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| malformed()))
        .collect()
}
