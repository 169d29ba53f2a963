//! Measurement session behaviour against a scripted channel.

use rust_vna::error::{ChannelError, VnaError};
use rust_vna::instrument::MockChannel;
use rust_vna::measurement::{parse_parameters, Component, MeasurementParameter};
use rust_vna::session::{MeasurementSession, SessionConfig, SessionState};

const STIMULUS: &str = "1E6,2E6,3E6,4E6,5E6";

fn trace_query(trace: &str) -> String {
    format!("CALC1:DATA:TRAC? '{}', FDAT", trace)
}

/// Mock answering the stimulus and every trace of `labels`.
fn scripted_mock(labels: &[&str]) -> MockChannel {
    let mock = MockChannel::new().with_response("TRAC:STIM? CH1DATA", STIMULUS);
    for (i, label) in labels.iter().enumerate() {
        let real: Vec<String> = (0..5).map(|k| format!("{}.{}", i, k)).collect();
        let imag: Vec<String> = (0..5).map(|k| format!("-{}.{}", i, k)).collect();
        mock.set_response(&trace_query(&format!("TRC_REAL_{}", label)), &real.join(","));
        mock.set_response(&trace_query(&format!("TRC_IMAG_{}", label)), &imag.join(","));
    }
    mock
}

fn session_for(mock: &MockChannel) -> MeasurementSession<MockChannel> {
    let mut session = MeasurementSession::new(mock.clone(), SessionConfig::default()).unwrap();
    session.connect(Some("MOCK::INSTR")).unwrap();
    session
}

fn params(labels: &[&str]) -> Vec<MeasurementParameter> {
    parse_parameters(labels).unwrap()
}

#[test]
fn test_configure_creates_traces_in_order() {
    let mock = scripted_mock(&["S11", "S21"]);
    let mut session = session_for(&mock);
    mock.clear_log();

    let traces = session.configure(&params(&["S11", "S21"])).unwrap();
    let table: Vec<(&str, Component, u32)> = traces
        .iter()
        .map(|t| (t.name.as_str(), t.component, t.display_slot))
        .collect();
    assert_eq!(
        table,
        [
            ("TRC_REAL_S11", Component::Real, 11),
            ("TRC_IMAG_S11", Component::Imag, 12),
            ("TRC_REAL_S21", Component::Real, 13),
            ("TRC_IMAG_S21", Component::Imag, 14),
        ]
    );

    assert_eq!(
        mock.written_commands(),
        [
            "CALC1:PAR:DEL:ALL",
            "CALC1:PAR:SDEF 'TRC_REAL_S11', 'S11'",
            "CALC1:FORM REAL",
            "DISP1:WIND:TRAC11:FEED 'TRC_REAL_S11'",
            "CALC1:PAR:SDEF 'TRC_IMAG_S11', 'S11'",
            "CALC1:FORM IMAG",
            "DISP1:WIND:TRAC12:FEED 'TRC_IMAG_S11'",
            "CALC1:PAR:SDEF 'TRC_REAL_S21', 'S21'",
            "CALC1:FORM REAL",
            "DISP1:WIND:TRAC13:FEED 'TRC_REAL_S21'",
            "CALC1:PAR:SDEF 'TRC_IMAG_S21', 'S21'",
            "CALC1:FORM IMAG",
            "DISP1:WIND:TRAC14:FEED 'TRC_IMAG_S21'",
            "DISP1:WIND:STAT ON",
        ]
    );
    assert_eq!(session.state(), SessionState::Configured);
}

#[test]
fn test_acquire_returns_complete_dataset() {
    let mock = scripted_mock(&["S11", "S21"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11", "S21"])).unwrap();

    let acquisition = session.acquire().unwrap();
    let dataset = &acquisition.dataset;
    assert_eq!(dataset.len(), 5);
    assert_eq!(dataset.sequence_count(), 4);
    for (_, values) in dataset.columns() {
        assert_eq!(values.len(), 5);
    }
    let s21: MeasurementParameter = "S21".parse().unwrap();
    assert_eq!(
        dataset.component(&s21, Component::Imag),
        Some(&[-1.0, -1.1, -1.2, -1.3, -1.4][..])
    );
    assert_eq!(acquisition.metadata.resource.as_deref(), Some("MOCK::INSTR"));
    assert_eq!(acquisition.metadata.points, 5);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_acquire_queries_stimulus_then_traces() {
    let mock = scripted_mock(&["S11"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();
    mock.clear_log();

    session.acquire().unwrap();
    assert_eq!(
        mock.call_log(),
        [
            "query: TRAC:STIM? CH1DATA",
            "query: CALC1:DATA:TRAC? 'TRC_REAL_S11', FDAT",
            "query: CALC1:DATA:TRAC? 'TRC_IMAG_S11', FDAT",
        ]
    );
}

#[test]
fn test_failed_trace_isolated() {
    let mock = scripted_mock(&["S11", "S21"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11", "S21"])).unwrap();
    let first = session.acquire().unwrap();

    mock.fail_on("TRC_IMAG_S21");
    match session.acquire() {
        Err(VnaError::Acquisition { trace, source }) => {
            assert_eq!(trace, "TRC_IMAG_S21");
            assert!(matches!(source, ChannelError::Io { .. }));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let last = session.last_acquisition().unwrap();
    assert_eq!(last.metadata.run_id, first.metadata.run_id);
    assert_eq!(last.dataset, first.dataset);
    assert_eq!(session.state(), SessionState::Idle);

    mock.clear_failures();
    let third = session.acquire().unwrap();
    assert_ne!(third.metadata.run_id, first.metadata.run_id);
}

#[test]
fn test_failure_before_first_acquisition_keeps_configured() {
    let mock = scripted_mock(&["S11"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();

    mock.fail_on("TRAC:STIM?");
    assert!(matches!(
        session.acquire(),
        Err(VnaError::Acquisition { ref trace, .. }) if trace == "stimulus"
    ));
    assert_eq!(session.state(), SessionState::Configured);
    assert!(session.last_acquisition().is_none());
}

#[test]
fn test_length_mismatch_rejected() {
    let mock = scripted_mock(&["S11"]);
    mock.set_response(&trace_query("TRC_IMAG_S11"), "0,0,0");
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();

    match session.acquire() {
        Err(VnaError::LengthMismatch {
            column,
            expected,
            found,
        }) => {
            assert_eq!(column, "S11_imag");
            assert_eq!((expected, found), (5, 3));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_malformed_trace_data() {
    let mock = scripted_mock(&["S11"]);
    mock.set_response(&trace_query("TRC_REAL_S11"), "0.1,NaN?,0.3");
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();

    assert!(matches!(
        session.acquire(),
        Err(VnaError::Acquisition {
            source: ChannelError::MalformedResponse { .. },
            ..
        })
    ));
}

#[test]
fn test_configure_retry_after_setup_failure() {
    let mock = scripted_mock(&["S11", "S21"]);
    let mut session = session_for(&mock);

    mock.fail_on("FORM IMAG");
    assert!(matches!(
        session.configure(&params(&["S11", "S21"])),
        Err(VnaError::Setup { .. })
    ));
    assert_eq!(session.state(), SessionState::Uninitialized);

    mock.clear_failures();
    mock.clear_log();
    let traces = session.configure(&params(&["S11", "S21"])).unwrap();
    assert_eq!(traces.len(), 4);
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(
        mock.written_commands().first().map(String::as_str),
        Some("CALC1:PAR:DEL:ALL")
    );

    let acquisition = session.acquire().unwrap();
    assert_eq!(acquisition.dataset.sequence_count(), 4);
}

#[test]
fn test_acquire_before_configure() {
    let mock = scripted_mock(&["S11"]);
    let mut session = session_for(&mock);
    assert!(matches!(
        session.acquire(),
        Err(VnaError::InvalidState {
            operation: "acquire",
            ..
        })
    ));
}

#[test]
fn test_reconfigure_replaces_traces() {
    let mock = scripted_mock(&["S11", "S22"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();
    session.acquire().unwrap();

    session.configure(&params(&["S22"])).unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    let acquisition = session.acquire().unwrap();
    let labels: Vec<&str> = acquisition.dataset.parameters().map(|p| p.as_str()).collect();
    assert_eq!(labels, ["S22"]);
}

#[test]
fn test_close_idempotent_and_terminal() {
    let mock = scripted_mock(&["S11"]);
    let mut session = session_for(&mock);
    session.configure(&params(&["S11"])).unwrap();

    session.close().unwrap();
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(mock.call_log().iter().filter(|c| *c == "close").count(), 1);
    assert!(matches!(
        session.acquire(),
        Err(VnaError::InvalidState { .. })
    ));
}

#[test]
fn test_drop_closes_channel() {
    let mock = scripted_mock(&["S11"]);
    {
        let _session = session_for(&mock);
    }
    assert_eq!(mock.call_log().last().map(String::as_str), Some("close"));
}
