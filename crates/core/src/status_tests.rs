// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;
use ServerStatus::*;

#[parameterized(
    start_accepted = { Stopped, Starting },
    done_marker = { Starting, Running },
    early_exit = { Starting, Crashed },
    cancelled_start = { Starting, Stopping },
    graceful_stop = { Running, Stopping },
    crash_while_running = { Running, Crashed },
    orderly_exit = { Stopping, Stopped },
    dirty_exit = { Stopping, Crashed },
    operator_clear = { Crashed, Stopped },
)]
fn legal_edges(from: ServerStatus, to: ServerStatus) {
    assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
    assert_eq!(from.transition_to(to), Ok(to));
}

#[parameterized(
    stopped_to_running = { Stopped, Running },
    stopped_to_stopping = { Stopped, Stopping },
    running_to_starting = { Running, Starting },
    running_to_stopped = { Running, Stopped },
    crashed_to_running = { Crashed, Running },
    self_edge = { Running, Running },
    stopping_to_running = { Stopping, Running },
)]
fn illegal_edges(from: ServerStatus, to: ServerStatus) {
    assert!(!from.can_transition_to(to));
    let err = from.transition_to(to).unwrap_err();
    assert_eq!(err, TransitionError { from, to });
    assert!(err.to_string().contains("illegal transition"));
}

#[test]
fn crashed_persists_as_error() {
    assert_eq!(Crashed.as_db_str(), "error");
    assert_eq!(ServerStatus::from_db_str("error"), Crashed);
}

#[test]
fn db_round_trip() {
    for status in [Stopped, Starting, Running, Stopping, Crashed] {
        assert_eq!(ServerStatus::from_db_str(status.as_db_str()), status);
    }
}

#[test]
fn unknown_db_value_degrades_to_stopped() {
    assert_eq!(ServerStatus::from_db_str("garbage"), Stopped);
}

#[test]
fn startable_states() {
    assert!(Stopped.is_startable());
    assert!(Crashed.is_startable());
    assert!(!Running.is_startable());
    assert!(!Starting.is_startable());
    assert!(!Stopping.is_startable());
}

#[test]
fn serde_uses_db_names() {
    let json = serde_json::to_string(&Crashed).unwrap();
    assert_eq!(json, "\"error\"");
    let parsed: ServerStatus = serde_json::from_str("\"stopping\"").unwrap();
    assert_eq!(parsed, Stopping);
}
