//! Bring-up: identification, registration and all-or-nothing teardown.

use super::*;
use anyio_common::llio::interface::LlioError;
use anyio_common::llio::types::DeviceProfile;
use anyio_eth::EthError;
use anyio_eth::registry::KNOWN_BOARDS;
use anyio_eth::session::SessionState;

fn run(
    connector: &mut SimConnector,
    requests: &[BoardRequest],
    registrar: &mut RecordingRegistrar,
    guard: &RecordingGuard,
) -> Result<EthSession, EthError> {
    bring_up().run(requests, connector, registrar, Box::new(guard.clone()))
}

#[test]
fn test_every_known_board_gets_its_table_profile() {
    let boards: Vec<(u8, &str)> = KNOWN_BOARDS
        .iter()
        .enumerate()
        .map(|(i, entry)| (10 + i as u8, entry.prefix))
        .collect();
    let (_connector, session) = active_session(&boards);

    for (summary, entry) in session.summaries().iter().zip(KNOWN_BOARDS.iter()) {
        assert!(summary.recognized, "{} not recognized", entry.prefix);
        assert_eq!(summary.profile, entry.profile());
        assert!(summary.name.starts_with(&format!("hm2_{}.", entry.short_name)));
    }

    // Four 7I80 variants share one counter.
    let names: Vec<String> = session.summaries().into_iter().map(|s| s.name).collect();
    assert_eq!(
        &names[..4],
        &["hm2_7i80.0", "hm2_7i80.1", "hm2_7i80.2", "hm2_7i80.3"]
    );
}

#[test]
fn test_unknown_board_is_described_by_idrom() {
    let mut connector = SimConnector::new();
    connector.add_board(ip(10), SimHandle::with_idrom("UNKNOWNBOARD", mac(10), 3, 24));
    let mut registrar = RecordingRegistrar::default();
    let guard = RecordingGuard::default();

    let session = run(&mut connector, &[request(10)], &mut registrar, &guard).unwrap();
    let summary = &session.summaries()[0];
    assert_eq!(summary.name, "hm2_unkn.0");
    assert_eq!(summary.board_name, "UNKNOWNBOARD");
    assert!(!summary.recognized);
    assert_eq!(summary.profile, DeviceProfile::placeholder(3, 24));
    assert_eq!(summary.profile.total_pins(), 72);
}

#[test]
fn test_registrar_sees_summaries_and_configs_in_order() {
    let mut connector = network(&[(10, "7I92"), (11, "7I76E-16")]);
    let mut registrar = RecordingRegistrar::default();
    let guard = RecordingGuard::default();

    let session = run(
        &mut connector,
        &[request(10), request(11)],
        &mut registrar,
        &guard,
    )
    .unwrap();

    let seen: Vec<(&str, &str)> = registrar
        .seen
        .iter()
        .map(|(s, c)| (s.name.as_str(), c.as_str()))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("hm2_7i92.0", "num_encoders=10"),
            ("hm2_7i76e.0", "num_encoders=11")
        ]
    );
    assert_eq!(registrar.seen[0].0.hw_addr, mac(10));
    assert_eq!(registrar.seen[1].0.address, ip(11));
    assert!(session.gate().is_open());
    for handle in session.handles() {
        assert_eq!(session.state(handle).unwrap(), SessionState::Active);
    }
}

#[test]
fn test_hardware_address_is_pinned() {
    let (connector, session) = active_session(&[(10, "7I92")]);
    let handle = connector.board(ip(10)).unwrap();
    assert_eq!(handle.pinned(), Some(mac(10)));
    drop(session);
    assert_eq!(handle.pinned(), None);
    assert!(!handle.is_open());
}

#[test]
fn test_shared_interface_is_protected_once() {
    let mut connector = network(&[(10, "7I92"), (11, "7I92"), (12, "7I92")]);
    let guard = RecordingGuard::default();
    let session = run(
        &mut connector,
        &[request(10), request(11), request(12)],
        &mut RecordingRegistrar::default(),
        &guard,
    )
    .unwrap();

    let log = guard.log();
    assert_eq!(log.prepared, 1);
    assert_eq!(log.protected, vec!["sim0".to_string()]);
    assert_eq!(log.released, 0);

    drop(session);
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_missing_board_closes_earlier_boards() {
    let mut connector = network(&[(10, "7I92")]);
    let mut registrar = RecordingRegistrar::default();
    let guard = RecordingGuard::default();

    let result = run(
        &mut connector,
        &[request(10), request(11)],
        &mut registrar,
        &guard,
    );
    assert!(matches!(result, Err(EthError::Transport { ip: failed, .. }) if failed == ip(11)));

    let first = connector.board(ip(10)).unwrap();
    assert!(!first.is_open());
    assert_eq!(first.calls().closes, 1);
    assert!(registrar.seen.is_empty());
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_pin_failure_aborts_bring_up() {
    let mut connector = network(&[(10, "7I92"), (11, "7I92")]);
    connector.board(ip(11)).unwrap().set_fail_pin(true);
    let guard = RecordingGuard::default();

    let result = run(
        &mut connector,
        &[request(10), request(11)],
        &mut RecordingRegistrar::default(),
        &guard,
    );
    assert!(matches!(result, Err(EthError::Identify { ip: failed, .. }) if failed == ip(11)));

    for last in [10, 11] {
        let handle = connector.board(ip(last)).unwrap();
        assert!(!handle.is_open(), "board {last} left open");
        assert_eq!(handle.calls().closes, 1);
    }
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_registration_rejection_closes_every_board() {
    let mut connector = network(&[(10, "7I92"), (11, "7I92")]);
    let mut registrar = RecordingRegistrar {
        reject: Some("hm2_7i92.1".to_string()),
        ..Default::default()
    };
    let guard = RecordingGuard::default();

    let result = run(
        &mut connector,
        &[request(10), request(11)],
        &mut registrar,
        &guard,
    );
    assert!(matches!(result, Err(EthError::Register(ref e)) if e.code == -22));
    assert_eq!(registrar.seen.len(), 2);

    for last in [10, 11] {
        assert!(!connector.board(ip(last)).unwrap().is_open());
    }
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_guard_refusal_touches_no_board() {
    let mut connector = network(&[(10, "7I92")]);
    let guard = RecordingGuard {
        refuse: true,
        ..Default::default()
    };

    let result = run(
        &mut connector,
        &[request(10)],
        &mut RecordingRegistrar::default(),
        &guard,
    );
    assert!(matches!(result, Err(EthError::Guard(_))));

    let handle = connector.board(ip(10)).unwrap();
    assert_eq!(handle.calls().socket_calls(), 0);
    assert!(!handle.is_open());
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_silent_board_fails_identification() {
    let mut connector = network(&[(10, "7I92")]);
    connector.board(ip(10)).unwrap().set_drop_all(true);
    let guard = RecordingGuard::default();

    let result = BringUp::new(TransportTiming::default(), Duration::from_millis(20)).run(
        &[request(10)],
        &mut connector,
        &mut RecordingRegistrar::default(),
        Box::new(guard.clone()),
    );
    assert!(matches!(
        result,
        Err(EthError::Identify {
            source: LlioError::Timeout { .. },
            ..
        })
    ));
    assert!(!connector.board(ip(10)).unwrap().is_open());
    assert_eq!(guard.log().released, 1);
}

#[test]
fn test_instance_names_stay_unique_across_sessions() {
    let mut connector = network(&[(10, "7I92")]);
    let mut driver = bring_up();

    let mut names = Vec::new();
    for _ in 0..3 {
        let mut session = driver
            .run(
                &[request(10)],
                &mut connector,
                &mut RecordingRegistrar::default(),
                Box::new(RecordingGuard::default()),
            )
            .unwrap();
        names.push(session.summaries()[0].name.clone());
        session.shutdown();
    }
    assert_eq!(names, vec!["hm2_7i92.0", "hm2_7i92.1", "hm2_7i92.2"]);
}
