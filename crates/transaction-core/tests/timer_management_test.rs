//! Timer behavior observed through the engine: retransmission
//! schedules, the T2 cap, scaled settings, reliable-transport
//! suppression, and the message-before-timer ordering inside one
//! processing pass.


use transaction_test_utils::*;

use std::net::SocketAddr;
use std::time::Duration;

use ringline_sip_transport::TransportKind;
use ringline_transaction_core::{EngineConfig, TimerSettings, TransactionEvent};

fn silent_peer() -> SocketAddr {
    "192.0.2.9:5060".parse().unwrap()
}

#[test]
fn test_invite_client_retransmission_schedule() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    rig.handle
        .send_request(invite_request("z9hG4bK-tm-1"), silent_peer(), TransportKind::Udp)
        .unwrap();
    rig.process_at(0);

    // Timer A doubles without a cap; Timer B ends the transaction in
    // the same pass as the last would-be retransmission.
    let offsets = walk_timers(&mut rig, 60_000);
    assert_eq!(offsets, vec![500, 1_000, 2_000, 4_000, 8_000, 16_000, 32_000]);
    assert_eq!(rig.transport.sent_count(), 7, "initial send plus six retransmissions");
    assert_eq!(rig.engine.transaction_count(), 0);

    let events = rig.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTimeout { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTerminated { .. })));
}

#[test]
fn test_non_invite_schedule_caps_at_t2() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    rig.handle
        .send_request(options_request("z9hG4bK-tm-2"), silent_peer(), TransportKind::Udp)
        .unwrap();
    rig.process_at(0);

    let offsets = walk_timers(&mut rig, 60_000);
    assert_eq!(
        offsets,
        vec![500, 1_000, 2_000, 4_000, 8_000, 12_000, 16_000, 20_000, 24_000, 28_000, 32_000]
    );
    assert_eq!(rig.transport.sent_count(), 11);
    assert_eq!(rig.engine.transaction_count(), 0);
}

#[test]
fn test_scaled_settings_scale_the_schedule() {
    init_logging();
    let settings = TimerSettings {
        t1: Duration::from_millis(50),
        t2: Duration::from_millis(400),
        transaction_timeout: Duration::from_millis(3_200),
        ..TimerSettings::default()
    };
    let mut rig = EngineRig::with_settings(
        TransportKind::Udp,
        "192.0.2.1:5060",
        settings,
        EngineConfig::default(),
    );
    rig.handle
        .send_request(options_request("z9hG4bK-tm-3"), silent_peer(), TransportKind::Udp)
        .unwrap();
    rig.process_at(0);

    let offsets = walk_timers(&mut rig, 10_000);
    assert_eq!(
        offsets,
        vec![50, 100, 200, 400, 800, 1_200, 1_600, 2_000, 2_400, 2_800, 3_200]
    );
    assert_eq!(rig.transport.sent_count(), 11);
    assert_eq!(rig.engine.transaction_count(), 0);
}

#[test]
fn test_reliable_transport_skips_retransmission() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Tcp, "192.0.2.1:5060");
    rig.handle
        .send_request(
            options_request_via("z9hG4bK-tm-4", "TCP"),
            silent_peer(),
            TransportKind::Tcp,
        )
        .unwrap();
    rig.process_at(0);
    assert_eq!(rig.transport.sent_count(), 1);

    // Only the timeout guard is armed over TCP.
    let offsets = walk_timers(&mut rig, 60_000);
    assert_eq!(offsets, vec![32_000]);
    assert_eq!(rig.transport.sent_count(), 1);
    assert!(rig
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTimeout { .. })));
}

#[test]
fn test_message_beats_timer_at_same_deadline() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    let options = options_request("z9hG4bK-tm-5");
    rig.handle
        .send_request(options.clone(), silent_peer(), TransportKind::Udp)
        .unwrap();
    rig.process_at(0);

    // The 486 arrives in the same pass where Timer E is due. Messages
    // drain first, so the transaction completes and the retransmission
    // never goes out.
    let busy = response_for(&options, ringline_sip_core::StatusCode::BusyHere, Some("tag-busy"));
    rig.deliver_from(silent_peer(), busy.encode());
    rig.process_at(500);

    assert_eq!(rig.transport.sent_count(), 1);
    assert!(rig
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::FailureResponse { .. })));

    assert_eq!(walk_timers(&mut rig, 10_000), vec![5_500]);
    assert_eq!(rig.engine.transaction_count(), 0);
}

#[test]
fn test_idle_engine_reports_no_work() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    assert!(!rig.process_at(0));
    assert!(rig.engine.next_deadline().is_none());

    rig.handle
        .send_request(options_request("z9hG4bK-tm-6"), silent_peer(), TransportKind::Udp)
        .unwrap();
    assert!(rig.process_at(0), "the queued command is work");
    assert!(rig.engine.next_deadline().is_some());
    assert!(!rig.process_at(10), "nothing due before Timer E");

    walk_timers(&mut rig, 60_000);
    assert!(rig.engine.next_deadline().is_none());
}
