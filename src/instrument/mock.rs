//! Scripted channel for testing sessions without an instrument.
//!
//! This channel provides:
//! - Canned responses keyed by exact command string
//! - Controllable failure injection (next call, or any command matching a pattern)
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep a handle while the session owns
//! the channel.

use super::channel::Channel;
use crate::error::ChannelError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    resources: Vec<String>,
    responses: HashMap<String, String>,
    fail_next: bool,
    fail_pattern: Option<String>,
    call_log: Vec<String>,
}

/// Scripted command channel.
///
/// # Example
///
/// ```
/// use rust_vna::instrument::{Channel, MockChannel};
///
/// let mut channel = MockChannel::new().with_response("*IDN?", "Mock,VNA,0,1.0");
/// channel.open("MOCK::INSTR").unwrap();
/// assert_eq!(channel.query("*IDN?").unwrap(), "Mock,VNA,0,1.0");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    resource: Option<String>,
}

impl MockChannel {
    /// Create a mock that reports a single resource `MOCK::INSTR`.
    pub fn new() -> Self {
        Self::with_resources(vec!["MOCK::INSTR".to_string()])
    }

    /// Create a mock that reports the given resources on scan.
    pub fn with_resources(resources: Vec<String>) -> Self {
        let mock = Self::default();
        mock.lock().resources = resources;
        mock
    }

    /// Register the response to an exact query string.
    pub fn with_response(self, command: &str, response: &str) -> Self {
        self.set_response(command, response);
        self
    }

    /// Register or replace the response to an exact query string.
    pub fn set_response(&self, command: &str, response: &str) {
        self.lock()
            .responses
            .insert(command.to_string(), response.to_string());
    }

    /// Inject a failure for the next operation.
    pub fn inject_next_failure(&self) {
        self.lock().fail_next = true;
    }

    /// Fail every write or query whose command contains `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.lock().fail_pattern = Some(pattern.to_string());
    }

    /// Stop failing on a pattern.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_pattern = None;
        state.fail_next = false;
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<String> {
        self.lock().call_log.clone()
    }

    /// Commands passed to `write`, in order.
    pub fn written_commands(&self) -> Vec<String> {
        self.call_log()
            .into_iter()
            .filter_map(|c| c.strip_prefix("write: ").map(str::to_string))
            .collect()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.lock().call_log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, call: String, command: &str) -> Result<MutexGuard<'_, MockState>, ChannelError> {
        let mut state = self.lock();
        state.call_log.push(call);

        let pattern_hit = state
            .fail_pattern
            .as_deref()
            .is_some_and(|p| command.contains(p));
        if std::mem::take(&mut state.fail_next) || pattern_hit {
            return Err(ChannelError::Io {
                command: command.to_string(),
                message: "Injected failure".into(),
            });
        }
        Ok(state)
    }

    fn check_connected(&self, call: String, command: &str) -> Result<MutexGuard<'_, MockState>, ChannelError> {
        if self.resource.is_none() {
            self.lock().call_log.push(call);
            return Err(ChannelError::NotConnected);
        }
        self.check(call, command)
    }
}

impl Channel for MockChannel {
    fn scan(&mut self) -> Result<Vec<String>, ChannelError> {
        let state = self.check("scan".into(), "")?;
        Ok(state.resources.clone())
    }

    fn open(&mut self, address: &str) -> Result<(), ChannelError> {
        // The previous resource is released even if this open fails
        self.resource = None;
        self.check(format!("open: {}", address), "")?;
        self.resource = Some(address.to_string());
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), ChannelError> {
        self.check_connected(format!("write: {}", command), command)?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, ChannelError> {
        let state = self.check_connected(format!("query: {}", command), command)?;
        state
            .responses
            .get(command)
            .cloned()
            .ok_or_else(|| ChannelError::Timeout {
                command: command.to_string(),
            })
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.lock().call_log.push("close".into());
        self.resource = None;
        Ok(())
    }

    fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}
