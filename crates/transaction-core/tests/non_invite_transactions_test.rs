//! Non-INVITE flows: an OPTIONS exchange between two linked engines,
//! retransmission absorption on the server side, and the client-side
//! schedule when the peer stays silent.


use transaction_test_utils::*;

use ringline_sip_core::{Method, StatusCode};
use ringline_sip_transport::TransportKind;
use ringline_transaction_core::TransactionEvent;

#[test]
fn test_options_exchange_completes() {
    init_logging();
    let (mut alice, mut bob) = EngineRig::pair(TransportKind::Udp);

    let options = options_request("z9hG4bK-nt-1");
    alice
        .handle
        .send_request(options.clone(), bob.transport.local(), TransportKind::Udp)
        .unwrap();
    settle(&mut alice, &mut bob, 0);

    // Non-INVITE requests get no automatic 100 Trying; the TU answers.
    let bob_events = bob.drain_events();
    assert_eq!(bob_events.len(), 1);
    let key = match &bob_events[0] {
        TransactionEvent::NewRequest { key, request, .. } => {
            assert_eq!(request.method, Method::Options);
            key.clone()
        }
        other => panic!("expected NewRequest, got {other:?}"),
    };
    assert_eq!(bob.transport.sent_count(), 0);

    let ok = response_for(&options, StatusCode::Ok, Some("tag-opt"));
    bob.handle.send_response(key, ok).unwrap();
    settle(&mut alice, &mut bob, 100);

    assert!(alice
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::SuccessResponse { .. })));
    assert_eq!(alice.transport.sent_count(), 1, "final beat the first retransmission");

    // Timer K clears the client, Timer J the server.
    assert_eq!(walk_timers(&mut alice, 10_000), vec![5_100]);
    assert_eq!(alice.engine.transaction_count(), 0);
    assert_eq!(walk_timers(&mut bob, 40_000), vec![32_100]);
    assert_eq!(bob.engine.transaction_count(), 0);
}

#[test]
fn test_retransmitted_options_replays_the_final() {
    init_logging();
    let mut rig = EngineRig::new(TransportKind::Udp, "192.0.2.2:5060");
    let peer = "192.0.2.1:5060".parse().unwrap();

    let options = options_request("z9hG4bK-nt-2");
    rig.deliver_from(peer, options.encode());
    rig.process_at(0);
    let key = match &rig.drain_events()[0] {
        TransactionEvent::NewRequest { key, .. } => key.clone(),
        other => panic!("expected NewRequest, got {other:?}"),
    };
    assert_eq!(rig.transport.sent_count(), 0);

    let not_found = response_for(&options, StatusCode::NotFound, Some("tag-404"));
    rig.handle.send_response(key, not_found).unwrap();
    rig.process_at(50);
    assert_eq!(rig.transport.sent_count(), 1);

    // The retransmitted request is answered from the cache without
    // involving the TU again.
    rig.deliver_from(peer, options.encode());
    rig.process_at(200);
    let payloads = rig.transport.sent_payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0], payloads[1]);
    assert!(rig
        .drain_events()
        .iter()
        .all(|e| !matches!(e, TransactionEvent::NewRequest { .. })));

    assert_eq!(walk_timers(&mut rig, 40_000), vec![32_050]);
    assert_eq!(rig.engine.transaction_count(), 0);
}

#[test]
fn test_options_keeps_retransmitting_through_proceeding() {
    init_logging();
    let mut alice = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    let peer: std::net::SocketAddr = "192.0.2.9:5060".parse().unwrap();

    let options = options_request("z9hG4bK-nt-3");
    alice
        .handle
        .send_request(options.clone(), peer, TransportKind::Udp)
        .unwrap();
    alice.process_at(0);
    assert_eq!(alice.transport.sent_count(), 1);

    assert_eq!(walk_timers(&mut alice, 2_000), vec![500, 1_000, 2_000]);
    assert_eq!(alice.transport.sent_count(), 4);

    // A 100 moves the transaction to Proceeding but does not stop the
    // retransmissions; only a final would.
    let trying = response_for(&options, StatusCode::Trying, None);
    alice.deliver_from(peer, trying.encode());
    alice.process_at(2_500);
    assert!(alice
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::ProvisionalResponse { .. })));

    assert_eq!(
        walk_timers(&mut alice, 40_000),
        vec![4_000, 8_000, 12_000, 16_000, 20_000, 24_000, 28_000, 32_000]
    );
    assert_eq!(alice.transport.sent_count(), 11);
    let events = alice.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTimeout { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTerminated { .. })));
    assert_eq!(alice.engine.transaction_count(), 0);
}

#[test]
fn test_late_response_after_timeout_is_unmatched() {
    init_logging();
    let mut alice = EngineRig::new(TransportKind::Udp, "192.0.2.1:5060");
    let peer: std::net::SocketAddr = "192.0.2.9:5060".parse().unwrap();

    let options = options_request("z9hG4bK-nt-4");
    alice
        .handle
        .send_request(options.clone(), peer, TransportKind::Udp)
        .unwrap();
    alice.process_at(0);
    walk_timers(&mut alice, 40_000);
    assert_eq!(alice.engine.transaction_count(), 0);
    alice.drain_events();

    let late = response_for(&options, StatusCode::Ok, Some("tag-late"));
    alice.deliver_from(peer, late.encode());
    alice.process_at(45_000);

    let events = alice.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        TransactionEvent::UnmatchedMessage { message, source } => {
            assert!(message.is_response());
            assert_eq!(*source, peer);
        }
        other => panic!("expected UnmatchedMessage, got {other:?}"),
    }
}
