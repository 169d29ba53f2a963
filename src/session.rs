//! Measurement session: trace configuration and acquisition over a channel.
//!
//! A [`MeasurementSession`] owns its [`Channel`] exclusively and walks the
//! following state machine:
//!
//! ```text
//!                 configure ok              acquire ok
//! Uninitialized ─────────────► Configured ─────────────► Idle ──┐
//!       ▲                         │  ▲                    │ ▲   │ acquire ok
//!       │ configure fails         │  └── configure ok ────┘ └───┘
//!       └─────────────────────────┘
//!
//!  close() from any state ──► Closed (terminal)
//! ```
//!
//! `Acquiring` is held only while `acquire` runs. A failed acquisition
//! returns the session to the state it was in before the call and leaves
//! earlier acquisitions untouched. A failed configuration returns the session
//! to `Uninitialized` and reports which traces were already defined on the
//! instrument, since configuration mutates the instrument step by step.
//!
//! All calls block the caller for the duration of the channel I/O. Nothing
//! is retried.

use crate::error::{ChannelError, VnaError, VnaResult};
use crate::instrument::{parse_real_list, Channel, CommandSet};
use crate::measurement::parameter::check_unique;
use crate::measurement::{assemble, Acquisition, Component, MeasurementParameter, TraceData, TraceSpec};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps a parameter and component to the instrument-side trace name.
pub type TraceNamingScheme = Arc<dyn Fn(&MeasurementParameter, Component) -> String + Send + Sync>;

/// Default real-part trace name prefix.
pub const DEFAULT_PREFIX_REAL: &str = "TRC_REAL_";
/// Default imaginary-part trace name prefix.
pub const DEFAULT_PREFIX_IMAG: &str = "TRC_IMAG_";

/// Naming scheme `"{real}{parameter}"` / `"{imag}{parameter}"`.
pub fn prefixed_naming(real: impl Into<String>, imag: impl Into<String>) -> TraceNamingScheme {
    let real = real.into();
    let imag = imag.into();
    Arc::new(move |parameter: &MeasurementParameter, component: Component| match component {
        Component::Real => format!("{}{}", real, parameter),
        Component::Imag => format!("{}{}", imag, parameter),
    })
}

/// Lifecycle state of a [`MeasurementSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No valid trace configuration on the instrument.
    Uninitialized,
    /// Traces configured, nothing acquired yet.
    Configured,
    /// An acquisition is in progress.
    Acquiring,
    /// At least one acquisition completed since the last configuration.
    Idle,
    /// Channel released. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Configured => "Configured",
            SessionState::Acquiring => "Acquiring",
            SessionState::Idle => "Idle",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Session behaviour knobs.
#[derive(Clone)]
pub struct SessionConfig {
    /// Trace naming scheme.
    pub naming: TraceNamingScheme,
    /// SCPI templates.
    pub commands: CommandSet,
    /// Display slot of the first parameter's real trace.
    pub display_slot_base: u32,
    /// Sweep type written during configuration, if any.
    pub sweep_type: Option<String>,
    /// Averaging state written during configuration, if any.
    pub averaging: Option<bool>,
    /// Send a device reset before configuring.
    pub reset_on_configure: bool,
    /// Switch the display window on after feeding traces.
    pub enable_window: bool,
    /// Read the instrument identity after connecting.
    pub query_identity: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            naming: prefixed_naming(DEFAULT_PREFIX_REAL, DEFAULT_PREFIX_IMAG),
            commands: CommandSet::default(),
            display_slot_base: 11,
            sweep_type: None,
            averaging: None,
            reset_on_configure: false,
            enable_window: true,
            query_identity: true,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("commands", &self.commands)
            .field("display_slot_base", &self.display_slot_base)
            .field("sweep_type", &self.sweep_type)
            .field("averaging", &self.averaging)
            .field("reset_on_configure", &self.reset_on_configure)
            .field("enable_window", &self.enable_window)
            .field("query_identity", &self.query_identity)
            .finish_non_exhaustive()
    }
}

/// One write of the configuration sequence.
struct SetupStep {
    label: String,
    command: String,
    defines: Option<TraceSpec>,
}

/// Measurement session over an exclusively owned channel.
pub struct MeasurementSession<C: Channel> {
    channel: C,
    config: SessionConfig,
    state: SessionState,
    parameters: Vec<MeasurementParameter>,
    traces: Vec<TraceSpec>,
    identity: Option<String>,
    last: Option<Arc<Acquisition>>,
}

impl<C: Channel> fmt::Debug for MeasurementSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementSession")
            .field("state", &self.state)
            .field("resource", &self.channel.resource())
            .field("parameters", &self.parameters)
            .field("traces", &self.traces.len())
            .finish_non_exhaustive()
    }
}

impl<C: Channel> MeasurementSession<C> {
    /// Take ownership of `channel`. Command templates are checked here so a
    /// bad template never reaches the instrument.
    pub fn new(channel: C, config: SessionConfig) -> VnaResult<Self> {
        config.commands.validate()?;
        Ok(Self {
            channel,
            config,
            state: SessionState::Uninitialized,
            parameters: Vec::new(),
            traces: Vec::new(),
            identity: None,
            last: None,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Traces defined by the last successful configuration, in creation order.
    pub fn traces(&self) -> &[TraceSpec] {
        &self.traces
    }

    /// Parameters of the last successful configuration.
    pub fn parameters(&self) -> &[MeasurementParameter] {
        &self.parameters
    }

    /// Instrument identity read on connect.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Address of the connected instrument.
    pub fn resource(&self) -> Option<&str> {
        self.channel.resource()
    }

    /// Most recent successful acquisition.
    pub fn last_acquisition(&self) -> Option<Arc<Acquisition>> {
        self.last.clone()
    }

    /// Borrow the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the instrument at `address`, or the first scanned resource.
    ///
    /// Connecting discards any trace configuration the session knew about,
    /// even when opening the new resource fails.
    pub fn connect(&mut self, address: Option<&str>) -> VnaResult<()> {
        self.require(
            &[
                SessionState::Uninitialized,
                SessionState::Configured,
                SessionState::Idle,
            ],
            "connect",
        )?;

        let address = match address {
            Some(a) => a.to_string(),
            None => {
                let resources = self.channel.scan()?;
                let first = resources.into_iter().next().ok_or(ChannelError::NoResources)?;
                warn!(resource = %first, "No resource given, opening first instrument found");
                first
            }
        };

        self.transition(SessionState::Uninitialized);
        self.parameters.clear();
        self.traces.clear();
        self.identity = None;
        self.channel.open(&address)?;
        info!(resource = %address, "Connected");

        if self.config.query_identity {
            let command = self.config.commands.identify.clone();
            match self.channel.query(&command) {
                Ok(idn) => {
                    let idn = idn.trim().to_string();
                    info!(identity = %idn, "Instrument identified");
                    self.identity = Some(idn);
                }
                Err(e) => warn!(error = %e, "Instrument did not answer identity query"),
            }
        }
        Ok(())
    }

    /// Define a real and an imaginary trace per parameter on the instrument.
    ///
    /// On success the session is `Configured` and the trace table is
    /// returned. On a channel failure the session is `Uninitialized` and the
    /// error lists the traces that already exist on the instrument.
    pub fn configure(&mut self, parameters: &[MeasurementParameter]) -> VnaResult<&[TraceSpec]> {
        self.require(
            &[
                SessionState::Uninitialized,
                SessionState::Configured,
                SessionState::Idle,
            ],
            "configure",
        )?;
        check_unique(parameters)?;

        let plan = self.plan_traces(parameters)?;
        let steps = self.setup_steps(&plan)?;

        self.transition(SessionState::Uninitialized);
        self.parameters.clear();
        self.traces.clear();

        let mut created = Vec::new();
        for step in steps {
            debug!(step = %step.label, command = %step.command, "Setup write");
            if let Err(source) = self.channel.write(&step.command) {
                warn!(
                    step = %step.label,
                    traces_created = created.len(),
                    error = %source,
                    "Configuration aborted"
                );
                return Err(VnaError::Setup {
                    step: step.label,
                    traces_created: created,
                    source,
                });
            }
            if let Some(trace) = step.defines {
                created.push(trace);
            }
        }

        self.parameters = parameters.to_vec();
        self.traces = plan;
        self.transition(SessionState::Configured);
        info!(
            parameters = ?self.parameters.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            traces = self.traces.len(),
            "Traces configured"
        );
        Ok(&self.traces)
    }

    /// Read the stimulus and every configured trace into a new acquisition.
    pub fn acquire(&mut self) -> VnaResult<Arc<Acquisition>> {
        self.require(&[SessionState::Configured, SessionState::Idle], "acquire")?;

        let previous = self.state;
        self.transition(SessionState::Acquiring);
        match self.read_dataset() {
            Ok(acquisition) => {
                let acquisition = Arc::new(acquisition);
                self.last = Some(Arc::clone(&acquisition));
                self.transition(SessionState::Idle);
                info!(
                    run_id = %acquisition.metadata.run_id,
                    points = acquisition.dataset.len(),
                    "Acquisition complete"
                );
                Ok(acquisition)
            }
            Err(e) => {
                self.transition(previous);
                warn!(error = %e, "Acquisition failed");
                Err(e)
            }
        }
    }

    /// Release the channel. Calling this again is a no-op.
    pub fn close(&mut self) -> VnaResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.transition(SessionState::Closed);
        self.traces.clear();
        self.channel.close()?;
        Ok(())
    }

    fn require(&self, allowed: &[SessionState], operation: &'static str) -> VnaResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(VnaError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Session state change");
            self.state = next;
        }
    }

    fn plan_traces(&self, parameters: &[MeasurementParameter]) -> VnaResult<Vec<TraceSpec>> {
        let base = self.config.display_slot_base;
        let mut plan = Vec::with_capacity(parameters.len() * 2);
        for (idx, parameter) in parameters.iter().enumerate() {
            for (offset, component) in Component::ALL.into_iter().enumerate() {
                let display_slot = u32::try_from(2 * idx + offset)
                    .ok()
                    .and_then(|n| base.checked_add(n))
                    .ok_or_else(|| {
                        VnaError::InvalidParameters(format!(
                            "display slot base {} leaves no room for {} traces",
                            base,
                            parameters.len() * 2
                        ))
                    })?;
                plan.push(TraceSpec {
                    name: (self.config.naming)(parameter, component),
                    parameter: parameter.clone(),
                    component,
                    display_slot,
                });
            }
        }
        Ok(plan)
    }

    /// Render the full write sequence before anything is sent.
    fn setup_steps(&self, plan: &[TraceSpec]) -> VnaResult<Vec<SetupStep>> {
        let mut names = HashSet::new();
        if let Some(dup) = plan.iter().find(|t| !names.insert(t.name.as_str())) {
            return Err(VnaError::InvalidParameters(format!(
                "trace name '{}' generated more than once",
                dup.name
            )));
        }

        let cmds = &self.config.commands;
        let step = |label: &str, command: String| SetupStep {
            label: label.to_string(),
            command,
            defines: None,
        };

        let mut steps = Vec::new();
        if self.config.reset_on_configure {
            steps.push(step("reset", cmds.reset.clone()));
        }
        steps.push(step("delete traces", cmds.delete_all_traces.clone()));
        if let Some(sweep_type) = &self.config.sweep_type {
            steps.push(step("sweep type", cmds.sweep_type(sweep_type)?));
        }
        if let Some(averaging) = self.config.averaging {
            steps.push(step("averaging", cmds.averaging(averaging)?));
        }
        for trace in plan {
            steps.push(SetupStep {
                label: format!("define {}", trace.name),
                command: cmds.define_trace(&trace.name, trace.parameter.as_str())?,
                defines: Some(trace.clone()),
            });
            steps.push(step(
                &format!("format {}", trace.name),
                cmds.set_format(trace.component.format_name())?,
            ));
            steps.push(step(
                &format!("feed {}", trace.name),
                cmds.feed_display(trace.display_slot, &trace.name)?,
            ));
        }
        if self.config.enable_window {
            steps.push(step("window on", cmds.window_on.clone()));
        }
        Ok(steps)
    }

    fn read_dataset(&mut self) -> VnaResult<Acquisition> {
        let stimulus_command = self.config.commands.stimulus.clone();
        let stimulus = query_values(&mut self.channel, "stimulus", &stimulus_command)?;

        let mut data = Vec::with_capacity(self.parameters.len());
        for pair in self.traces.chunks_exact(2) {
            let [real, imag] = pair else { continue };
            let mut values = [Vec::new(), Vec::new()];
            for (slot, trace) in values.iter_mut().zip([real, imag]) {
                let command = self.config.commands.trace_data(&trace.name)?;
                *slot = query_values(&mut self.channel, &trace.name, &command)?;
            }
            let [re, im] = values;
            data.push(TraceData::new(real.parameter.clone(), re, im));
        }

        let dataset = assemble(stimulus, data)?;
        Ok(Acquisition::new(
            dataset,
            self.channel.resource().map(str::to_string),
            self.identity.clone(),
        ))
    }
}

fn query_values<C: Channel>(channel: &mut C, trace: &str, command: &str) -> VnaResult<Vec<f64>> {
    debug!(trace, command, "Trace query");
    channel
        .query(command)
        .and_then(|response| parse_real_list(command, &response))
        .map_err(|source| VnaError::Acquisition {
            trace: trace.to_string(),
            source,
        })
}

impl<C: Channel> Drop for MeasurementSession<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close channel on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::MockChannel;
    use tracing_test::traced_test;

    fn params(labels: &[&str]) -> Vec<MeasurementParameter> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    fn connected_session() -> (MeasurementSession<MockChannel>, MockChannel) {
        let mock = MockChannel::new().with_response("*IDN?", "Mock,VNA,1,0");
        let handle = mock.clone();
        let mut session = MeasurementSession::new(mock, SessionConfig::default()).unwrap();
        session.connect(None).unwrap();
        (session, handle)
    }

    #[test]
    fn test_connect_scans_first_resource() {
        let (session, handle) = connected_session();
        assert_eq!(session.resource(), Some("MOCK::INSTR"));
        assert_eq!(session.identity(), Some("Mock,VNA,1,0"));
        assert_eq!(handle.call_log()[..2], ["scan", "open: MOCK::INSTR"]);
    }

    #[test]
    #[traced_test]
    fn test_scan_fallback_is_logged() {
        let (_session, _) = connected_session();
        assert!(logs_contain("No resource given"));
        assert!(logs_contain("Instrument identified"));
    }

    #[test]
    fn test_connect_without_resources() {
        let mock = MockChannel::with_resources(Vec::new());
        let mut session = MeasurementSession::new(mock, SessionConfig::default()).unwrap();
        assert!(matches!(
            session.connect(None),
            Err(VnaError::Channel(ChannelError::NoResources))
        ));
    }

    #[test]
    fn test_identity_failure_is_not_fatal() {
        let mock = MockChannel::new();
        let mut session = MeasurementSession::new(mock, SessionConfig::default()).unwrap();
        session.connect(Some("MOCK::INSTR")).unwrap();
        assert_eq!(session.identity(), None);
    }

    #[test]
    fn test_failed_reconnect_drops_configuration() {
        let (mut session, handle) = connected_session();
        session.configure(&params(&["S11"])).unwrap();
        assert_eq!(session.state(), SessionState::Configured);

        handle.inject_next_failure();
        assert!(matches!(
            session.connect(Some("MOCK::OTHER")),
            Err(VnaError::Channel(ChannelError::Io { .. }))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.traces().is_empty());
        assert!(session.parameters().is_empty());
        assert_eq!(session.identity(), None);
        assert_eq!(session.resource(), None);
        assert!(matches!(
            session.acquire(),
            Err(VnaError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_display_slots_consecutive() {
        let (mut session, _) = connected_session();
        let traces = session.configure(&params(&["S11", "S21"])).unwrap();
        let slots: Vec<u32> = traces.iter().map(|t| t.display_slot).collect();
        assert_eq!(slots, [11, 12, 13, 14]);
    }

    #[test]
    fn test_display_slot_overflow_rejected_before_io() {
        let config = SessionConfig {
            display_slot_base: u32::MAX,
            ..Default::default()
        };
        let mock = MockChannel::new();
        let handle = mock.clone();
        let mut session = MeasurementSession::new(mock, config).unwrap();
        session.connect(Some("MOCK::INSTR")).unwrap();
        handle.clear_log();

        assert!(matches!(
            session.configure(&params(&["S11"])),
            Err(VnaError::InvalidParameters(_))
        ));
        assert!(handle.call_log().is_empty());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_last_display_slot_may_be_u32_max() {
        let config = SessionConfig {
            display_slot_base: u32::MAX - 1,
            ..Default::default()
        };
        let mut session = MeasurementSession::new(MockChannel::new(), config).unwrap();
        session.connect(Some("MOCK::INSTR")).unwrap();
        let traces = session.configure(&params(&["S11"])).unwrap();
        assert_eq!(traces[1].display_slot, u32::MAX);
    }

    #[test]
    fn test_duplicate_parameters_rejected_before_io() {
        let (mut session, handle) = connected_session();
        handle.clear_log();
        assert!(matches!(
            session.configure(&params(&["S11", "S11"])),
            Err(VnaError::InvalidParameters(_))
        ));
        assert!(handle.call_log().is_empty());
    }

    #[test]
    fn test_colliding_trace_names_rejected() {
        let config = SessionConfig {
            naming: Arc::new(|p: &MeasurementParameter, _: Component| p.to_string()),
            ..Default::default()
        };
        let mut session = MeasurementSession::new(MockChannel::new(), config).unwrap();
        session.connect(None).unwrap();
        assert!(matches!(
            session.configure(&params(&["S11"])),
            Err(VnaError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_optional_steps_follow_config() {
        let config = SessionConfig {
            reset_on_configure: true,
            sweep_type: Some("LOG".into()),
            averaging: Some(false),
            enable_window: false,
            ..Default::default()
        };
        let mock = MockChannel::new();
        let handle = mock.clone();
        let mut session = MeasurementSession::new(mock, config).unwrap();
        session.connect(Some("MOCK::INSTR")).unwrap();
        session.configure(&params(&["S11"])).unwrap();

        let written = handle.written_commands();
        assert_eq!(
            written[..4],
            ["*RST", "CALC1:PAR:DEL:ALL", "SENS1:SWE:TYPE LOG", "SENS1:AVER OFF"]
        );
        assert!(!written.iter().any(|c| c == "DISP1:WIND:STAT ON"));
    }

    #[test]
    fn test_setup_failure_reports_created_traces() {
        let (mut session, handle) = connected_session();
        handle.fail_on("FEED 'TRC_REAL_S21'");
        match session.configure(&params(&["S11", "S21"])) {
            Err(VnaError::Setup {
                step,
                traces_created,
                ..
            }) => {
                assert_eq!(step, "feed TRC_REAL_S21");
                let names: Vec<&str> = traces_created.iter().map(|t| t.name.as_str()).collect();
                assert_eq!(names, ["TRC_REAL_S11", "TRC_IMAG_S11", "TRC_REAL_S21"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.traces().is_empty());
        assert!(matches!(
            session.acquire(),
            Err(VnaError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_close_is_terminal() {
        let (mut session, _) = connected_session();
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.configure(&params(&["S11"])),
            Err(VnaError::InvalidState { operation: "configure", .. })
        ));
        assert!(session.connect(None).is_err());
    }

    #[test]
    fn test_bad_template_rejected_on_new() {
        let config = SessionConfig {
            commands: CommandSet {
                define_trace: "CALC1:PAR:SDEF '{name}'".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            MeasurementSession::new(MockChannel::new(), config),
            Err(VnaError::Config(_))
        ));
    }
}
